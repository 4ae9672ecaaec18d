use super::record::DeploymentRecord;
use super::spec::{PreparedAsset, data_source_arns};
use super::version::extract_version;
use crate::assets::{AssetManager, described_fields, request_body};
use crate::definition::Node;
use crate::error::{AssetError, DeployError, RemoteError};
use crate::remote::retry::{Halt, Step};
use crate::remote::{AssetKind, PermissionGrant, RetryPolicy};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Field path compared after a dataset deployment.
const DATA_SOURCE_FIELD: &str = "PhysicalTableMap.*.DataSourceArn";

/// Stages of one reconciliation, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Probe,
    Submit,
    Polling,
    Validation,
    Publish,
    Access,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Probe => "probe",
            Phase::Submit => "submit",
            Phase::Polling => "polling",
            Phase::Validation => "validation",
            Phase::Publish => "publish",
            Phase::Access => "access",
            Phase::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Whether the destination already held the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
}

/// A deployment that reached its terminal success state.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployed {
    pub asset_id: String,
    pub kind: AssetKind,
    pub action: Action,
    /// The version created by the submit, when the response carried one.
    pub version: Option<u64>,
    /// Polling record of a dashboard version.
    pub record: Option<DeploymentRecord>,
}

/// What happened to the destination after a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackStatus {
    /// The failure happened before the destination changed.
    NotRequired,
    /// The newly created asset was deleted.
    Deleted,
    /// The definition captured during the probe was submitted again.
    Restored,
    Failed(DeployError),
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackStatus::NotRequired => write!(f, "not required"),
            RollbackStatus::Deleted => write!(f, "created asset deleted"),
            RollbackStatus::Restored => write!(f, "previous definition restored"),
            RollbackStatus::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// A failed deployment. The rollback outcome is reported next to the original
/// error and never replaces it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Deployment of '{asset_id}' failed: {error} (rollback: {rollback})")]
pub struct DeployFailure {
    pub asset_id: String,
    pub error: DeployError,
    pub rollback: RollbackStatus,
}

impl DeployFailure {
    /// A failure that left the destination untouched.
    pub fn unchanged(asset_id: impl Into<String>, error: DeployError) -> Self {
        Self {
            asset_id: asset_id.into(),
            error,
            rollback: RollbackStatus::NotRequired,
        }
    }
}

/// The asset found by the probe.
#[derive(Debug, Clone)]
struct Existing {
    name: String,
    described: Node,
}

/// Drives one prepared asset from probe to a terminal state in one destination.
pub struct Reconciler {
    assets: AssetManager,
    poll_policy: RetryPolicy,
}

impl Reconciler {
    pub fn new(assets: AssetManager, poll_policy: RetryPolicy) -> Self {
        Self {
            assets,
            poll_policy,
        }
    }

    /// Creates or updates the asset, waits for it to settle and verifies it.
    ///
    /// Any failure after the submit rolls the destination back before the
    /// failure is returned. Permission and tag failures leave the new definition
    /// in place.
    #[instrument(skip_all, fields(asset_id = %prepared.request.asset_id, kind = %prepared.kind))]
    pub async fn reconcile(
        &self,
        prepared: &PreparedAsset,
        grants: &[PermissionGrant],
        tags: &[(String, String)],
    ) -> Result<Deployed, DeployFailure> {
        let asset_id = prepared.request.asset_id.as_str();
        let kind = prepared.kind;
        let unchanged = |error| DeployFailure::unchanged(asset_id, error);

        let field = kind.required_field();
        if !prepared.request.body.contains_key(field) {
            return Err(unchanged(DeployError::InvalidDefinition {
                kind,
                asset_id: asset_id.to_string(),
                field,
            }));
        }

        info!(phase = %Phase::Probe, "describing destination asset");
        let existing = self.probe(asset_id).await.map_err(unchanged)?;
        let action = match existing {
            Some(_) => Action::Updated,
            None => Action::Created,
        };

        info!(phase = %Phase::Submit, ?action, "submitting definition");
        let submitted = match action {
            Action::Created => self.assets.create_asset(&prepared.request).await,
            Action::Updated => {
                self.assets
                    .update_asset(asset_id, &prepared.request.name, prepared.request.body.clone())
                    .await
            }
        };
        let response = submitted.map_err(|source| {
            unchanged(DeployError::Submit {
                kind,
                asset_id: asset_id.to_string(),
                source,
            })
        })?;

        let (version, record) = match self.settle(prepared, &response).await {
            Ok(settled) => settled,
            Err(error) => {
                warn!(phase = %Phase::Rollback, %error, "deployment failed, rolling back");
                let rollback = self.roll_back(asset_id, existing.as_ref()).await;
                return Err(DeployFailure {
                    asset_id: asset_id.to_string(),
                    error,
                    rollback,
                });
            }
        };

        info!(phase = %Phase::Access, "applying permissions and tags");
        self.apply_access(asset_id, grants, tags)
            .await
            .map_err(unchanged)?;

        info!(?action, version, "deployment complete");
        Ok(Deployed {
            asset_id: asset_id.to_string(),
            kind,
            action,
            version,
            record,
        })
    }

    async fn probe(&self, asset_id: &str) -> Result<Option<Existing>, DeployError> {
        let probe_error = |source| DeployError::Probe {
            kind: self.assets.kind(),
            asset_id: asset_id.to_string(),
            source,
        };
        let described = match self.assets.get_definition(asset_id).await {
            Ok(described) => described,
            Err(e) if e.is_not_found() => {
                debug!("asset does not exist yet");
                return Ok(None);
            }
            Err(e) => return Err(probe_error(e)),
        };
        let name = match described_fields(self.assets.kind(), &described).get_str("Name") {
            Some(name) => name.to_string(),
            None => self.assets.get_name(asset_id).await.map_err(probe_error)?,
        };
        Ok(Some(Existing { name, described }))
    }

    /// Everything between submit and success that can still trigger a rollback.
    async fn settle(
        &self,
        prepared: &PreparedAsset,
        response: &Node,
    ) -> Result<(Option<u64>, Option<DeploymentRecord>), DeployError> {
        let asset_id = prepared.request.asset_id.as_str();
        match prepared.kind {
            AssetKind::Analysis => Ok((extract_version(response), None)),
            AssetKind::DataSet => {
                self.validate_dataset(prepared).await?;
                Ok((None, None))
            }
            AssetKind::Dashboard => {
                let version = extract_version(response).ok_or_else(|| {
                    DeployError::VersionExtraction {
                        asset_id: asset_id.to_string(),
                        response: response.to_json_pretty(),
                    }
                })?;
                let record = self.wait_for_version(asset_id, version).await?;

                info!(phase = %Phase::Publish, version, "publishing version");
                self.assets
                    .publish_version(asset_id, version)
                    .await
                    .map_err(|source| DeployError::Publish {
                        asset_id: asset_id.to_string(),
                        version,
                        source,
                    })?;
                Ok((Some(version), Some(record)))
            }
        }
    }

    /// Polls a dashboard version until it succeeds, fails or the budget runs out.
    async fn wait_for_version(
        &self,
        asset_id: &str,
        version: u64,
    ) -> Result<DeploymentRecord, DeployError> {
        info!(phase = %Phase::Polling, version, "waiting for version");
        let assets = &self.assets;
        let timed_out = |attempts| DeployError::PollingTimeout {
            asset_id: asset_id.to_string(),
            version,
            attempts,
        };

        let outcome = self
            .poll_policy
            .run(|attempt| async move {
                match assets.describe_version(asset_id, version).await {
                    Ok(description) if description.status.is_successful() => {
                        Step::Done((attempt + 1, description))
                    }
                    Ok(description) if description.status.is_failed() => {
                        Step::Fail(DeployError::CreationFailed {
                            asset_id: asset_id.to_string(),
                            version,
                            errors: description.errors,
                        })
                    }
                    Ok(description) => {
                        debug!(attempt, status = ?description.status, "version still processing");
                        Step::Retry(timed_out(attempt + 1))
                    }
                    // The version can lag behind the submit response.
                    Err(e) if e.is_not_found() => {
                        debug!(attempt, "version not visible yet");
                        Step::Retry(timed_out(attempt + 1))
                    }
                    Err(source) => Step::Fail(DeployError::Polling {
                        asset_id: asset_id.to_string(),
                        version,
                        source,
                    }),
                }
            })
            .await;

        match outcome {
            Ok((polls, description)) => {
                let mut record = DeploymentRecord::new(asset_id, version);
                record.polls = polls;
                record.observe(&description);
                Ok(record)
            }
            Err(Halt::Failed(error)) => Err(error),
            Err(Halt::Exhausted { attempts, .. }) => Err(timed_out(attempts)),
        }
    }

    async fn validate_dataset(&self, prepared: &PreparedAsset) -> Result<(), DeployError> {
        let asset_id = prepared.request.asset_id.as_str();
        let expected = &prepared.expected_data_sources;
        if expected.is_empty() {
            debug!("no data source expectation, skipping validation");
            return Ok(());
        }

        info!(phase = %Phase::Validation, "comparing data sources");
        let described = self.assets.get_definition(asset_id).await.map_err(|source| {
            DeployError::Probe {
                kind: prepared.kind,
                asset_id: asset_id.to_string(),
                source,
            }
        })?;
        let actual = data_source_arns(described_fields(AssetKind::DataSet, &described));
        if &actual != expected {
            return Err(DeployError::ValidationMismatch {
                asset_id: asset_id.to_string(),
                field: DATA_SOURCE_FIELD.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    async fn apply_access(
        &self,
        asset_id: &str,
        grants: &[PermissionGrant],
        tags: &[(String, String)],
    ) -> Result<(), DeployError> {
        let grant_error = |source| DeployError::Grant {
            asset_id: asset_id.to_string(),
            source,
        };
        self.assets
            .grant(asset_id, grants)
            .await
            .map_err(grant_error)?;
        if !tags.is_empty() {
            let arn = self.assets.get_arn(asset_id).await.map_err(grant_error)?;
            self.assets.tag(&arn, tags).await.map_err(grant_error)?;
        }
        Ok(())
    }

    async fn roll_back(&self, asset_id: &str, existing: Option<&Existing>) -> RollbackStatus {
        let (action, result, done) = match existing {
            None => {
                warn!("deleting the newly created asset");
                let result = self.assets.delete_asset(asset_id).await;
                ("delete", result, RollbackStatus::Deleted)
            }
            Some(existing) => {
                warn!("restoring the previous definition");
                let result = self.restore(asset_id, existing).await;
                ("restore", result, RollbackStatus::Restored)
            }
        };
        match result {
            Ok(()) => done,
            Err(source) => {
                warn!(action, %source, "rollback failed");
                RollbackStatus::Failed(DeployError::RollbackFailed {
                    asset_id: asset_id.to_string(),
                    action,
                    source,
                })
            }
        }
    }

    async fn restore(&self, asset_id: &str, existing: &Existing) -> Result<(), RemoteError> {
        let body = request_body(self.assets.kind(), asset_id, &existing.described).map_err(
            |e| match e {
                AssetError::Remote(remote) => remote,
                other => RemoteError::InvalidRequest(other.to_string()),
            },
        )?;
        self.assets
            .update_asset(asset_id, &existing.name, body)
            .await
            .map(|_| ())
    }
}
