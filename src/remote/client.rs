use super::{
    AssetKind, AssetRequest, AssetSummary, Destination, PermissionGrant, VersionDescription,
};
use crate::definition::Node;
use crate::error::RemoteError;
use async_trait::async_trait;
use std::sync::Arc;

/// Every remote call the repair and deployment code makes.
///
/// Implementations report a missing asset as [`RemoteError::NotFound`] and rate
/// limiting as [`RemoteError::Throttled`]; callers rely on both for control flow.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    async fn describe_asset(
        &self,
        kind: AssetKind,
        asset_id: &str,
    ) -> Result<AssetSummary, RemoteError>;

    /// Returns the asset's definition response. For analyses and dashboards the
    /// definition sits under `Definition`; datasets return their fields at the top.
    async fn describe_definition(&self, kind: AssetKind, asset_id: &str)
    -> Result<Node, RemoteError>;

    /// Returns the raw create response, which carries a version reference for dashboards.
    async fn create_asset(
        &self,
        kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError>;

    async fn update_asset(
        &self,
        kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError>;

    async fn delete_asset(&self, kind: AssetKind, asset_id: &str) -> Result<(), RemoteError>;

    async fn describe_version(
        &self,
        asset_id: &str,
        version: u64,
    ) -> Result<VersionDescription, RemoteError>;

    async fn publish_version(&self, asset_id: &str, version: u64) -> Result<(), RemoteError>;

    async fn update_permissions(
        &self,
        kind: AssetKind,
        asset_id: &str,
        grants: &[PermissionGrant],
    ) -> Result<(), RemoteError>;

    async fn tag_resource(&self, arn: &str, tags: &[(String, String)]) -> Result<(), RemoteError>;
}

/// Resolves the client that talks to a given destination.
pub trait ClientProvider: Send + Sync {
    fn client_for(&self, destination: &Destination)
    -> Result<Arc<dyn AnalyticsClient>, RemoteError>;
}

impl<F> ClientProvider for F
where
    F: Fn(&Destination) -> Result<Arc<dyn AnalyticsClient>, RemoteError> + Send + Sync,
{
    fn client_for(
        &self,
        destination: &Destination,
    ) -> Result<Arc<dyn AnalyticsClient>, RemoteError> {
        self(destination)
    }
}
