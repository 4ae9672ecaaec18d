//! Cross-environment deployment.
//!
//! A [`DeploymentSpec`] names a source definition and a destination. The
//! deployer prepares the definition (substitutions, repair, identifier
//! remapping), resolves a client for the destination and hands the result to a
//! [`Reconciler`], which probes, submits, waits and verifies, rolling back when
//! verification fails.

use crate::assets::AssetManager;
use crate::config::Config;
use crate::error::DeployError;
use crate::remote::ClientProvider;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

pub mod reconciler;
pub mod record;
pub mod spec;
pub mod version;

pub use reconciler::{Action, DeployFailure, Deployed, Phase, Reconciler, RollbackStatus};
pub use record::{DeploymentRecord, RecordStatus};
pub use spec::{DefinitionSource, DeploymentSpec, PreparedAsset, Substitution, data_source_arns};
pub use version::extract_version;

/// Deploys specs to whatever destinations they name.
#[derive(Clone)]
pub struct Deployer {
    provider: Arc<dyn ClientProvider>,
    config: Config,
}

impl Deployer {
    pub fn new(provider: impl ClientProvider + 'static, config: Config) -> Self {
        Self {
            provider: Arc::new(provider),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[instrument(skip_all, fields(asset_id = %spec.asset_id, kind = %spec.kind, account = %spec.destination.account_id))]
    pub async fn deploy(&self, spec: &DeploymentSpec) -> Result<Deployed, DeployFailure> {
        let prepared = spec
            .prepare()
            .map_err(|e| DeployFailure::unchanged(&spec.asset_id, DeployError::Spec(e)))?;

        let client = self.provider.client_for(&spec.destination).map_err(|source| {
            DeployFailure::unchanged(
                &spec.asset_id,
                DeployError::Destination {
                    account_id: spec.destination.account_id.clone(),
                    region: spec.destination.region.clone(),
                    source,
                },
            )
        })?;

        let assets = AssetManager::new(client, spec.kind, self.config.executor());
        let reconciler = Reconciler::new(assets, self.config.poll_policy());
        reconciler
            .reconcile(&prepared, &spec.permissions, &spec.tag_pairs())
            .await
    }

    /// Deploys every spec, at most `concurrency` at a time. Results come back in
    /// the order of `specs`; one failure does not stop the others.
    pub async fn deploy_all(&self, specs: &[DeploymentSpec]) -> Vec<Result<Deployed, DeployFailure>> {
        info!(count = specs.len(), concurrency = self.config.concurrency, "deploying");
        let permits = Semaphore::new(self.config.concurrency);
        let deployments = specs.iter().map(|spec| {
            let permits = &permits;
            async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = permits.acquire().await.ok();
                self.deploy(spec).await
            }
        });
        join_all(deployments).await
    }
}
