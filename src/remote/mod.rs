//! The seam between this crate and the remote analytics service.
//!
//! Transport is out of scope: everything goes through [`AnalyticsClient`], which
//! an SDK-backed client or the directory-backed [`LocalStore`] implements.

use crate::definition::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod client;
pub mod local;
pub mod retry;

pub use client::{AnalyticsClient, ClientProvider};
pub use local::{LocalProvider, LocalStore};
pub use retry::{Backoff, RetryPolicy, RetryingExecutor};

/// The asset types this crate can manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AssetKind {
    Analysis,
    Dashboard,
    #[serde(alias = "dataset")]
    DataSet,
}

impl AssetKind {
    /// The top-level field a create/update request for this kind must carry.
    pub fn required_field(self) -> &'static str {
        match self {
            AssetKind::Analysis | AssetKind::Dashboard => crate::definition::vocabulary::DEFINITION,
            AssetKind::DataSet => crate::definition::vocabulary::PHYSICAL_TABLE_MAP,
        }
    }

    /// Path segment used in resource ARNs.
    pub fn resource_type(self) -> &'static str {
        match self {
            AssetKind::Analysis => "analysis",
            AssetKind::Dashboard => "dashboard",
            AssetKind::DataSet => "dataset",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Analysis => write!(f, "Analysis"),
            AssetKind::Dashboard => write!(f, "Dashboard"),
            AssetKind::DataSet => write!(f, "DataSet"),
        }
    }
}

/// The account and region a deployment targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub account_id: String,
    pub region: String,
}

impl Destination {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    pub fn arn(&self, kind: AssetKind, asset_id: &str) -> String {
        format!(
            "arn:aws:quicksight:{}:{}:{}/{}",
            self.region,
            self.account_id,
            kind.resource_type(),
            asset_id
        )
    }
}

/// Name and ARN of an existing asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSummary {
    pub name: String,
    pub arn: String,
}

/// The payload of a create or update call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub asset_id: String,
    pub name: String,
    /// Type-specific fields: `Definition` for analyses and dashboards,
    /// `PhysicalTableMap` and friends for datasets.
    pub body: Node,
}

/// A principal and the actions it is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub principal: String,
    pub actions: Vec<String>,
}

/// Processing status of one dashboard version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    CreationInProgress,
    CreationSuccessful,
    CreationFailed,
    UpdateInProgress,
    UpdateSuccessful,
    UpdateFailed,
    Deleted,
}

impl VersionStatus {
    pub fn is_successful(self) -> bool {
        matches!(
            self,
            VersionStatus::CreationSuccessful | VersionStatus::UpdateSuccessful
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(
            self,
            VersionStatus::CreationFailed | VersionStatus::UpdateFailed | VersionStatus::Deleted
        )
    }

    pub fn is_terminal(self) -> bool {
        self.is_successful() || self.is_failed()
    }
}

/// The answer to a describe-version call.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDescription {
    pub version: u64,
    pub status: VersionStatus,
    pub errors: Vec<crate::error::VersionError>,
}
