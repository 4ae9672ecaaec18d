use super::client::{AnalyticsClient, ClientProvider};
use super::{
    AssetKind, AssetRequest, AssetSummary, Destination, PermissionGrant, VersionDescription,
    VersionStatus,
};
use crate::definition::{Mapping, Node};
use crate::error::RemoteError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// An asset as persisted on disk.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredAsset {
    name: String,
    arn: String,
    body: Node,
    #[serde(default)]
    versions: Vec<StoredVersion>,
    #[serde(default)]
    published_version: Option<u64>,
    #[serde(default)]
    permissions: Vec<PermissionGrant>,
    #[serde(default)]
    tags: IndexMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredVersion {
    version: u64,
    status: VersionStatus,
}

/// A directory-backed stand-in for the analytics service.
///
/// Assets live under `<root>/<account>/<region>/<type>/<id>.json`. Versions are
/// processed synchronously, so every version reads back as successful. Useful for
/// dry runs of a deployment and for repairing exported definitions offline.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    destination: Destination,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, destination: Destination) -> Self {
        Self {
            root: root.into(),
            destination,
            lock: Mutex::new(()),
        }
    }

    /// A provider that opens one store per destination below `root`.
    pub fn provider(root: impl Into<PathBuf>) -> LocalProvider {
        LocalProvider { root: root.into() }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    fn asset_path(&self, kind: AssetKind, asset_id: &str) -> PathBuf {
        self.root
            .join(&self.destination.account_id)
            .join(&self.destination.region)
            .join(kind.resource_type())
            .join(format!("{}.json", asset_id))
    }

    async fn load(&self, kind: AssetKind, asset_id: &str) -> Result<StoredAsset, RemoteError> {
        let path = self.asset_path(kind, asset_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::NotFound {
                    kind,
                    asset_id: asset_id.to_string(),
                });
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_str(&content).map_err(|e| {
            RemoteError::Transport(format!("Corrupt asset file '{}': {}", path.display(), e))
        })
    }

    async fn save(
        &self,
        kind: AssetKind,
        asset_id: &str,
        asset: &StoredAsset,
    ) -> Result<(), RemoteError> {
        let path = self.asset_path(kind, asset_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let json = serde_json::to_string_pretty(asset)
            .map_err(|e| RemoteError::Transport(format!("Serialization failed: {}", e)))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), "asset written");
        Ok(())
    }

    fn check_required_field(kind: AssetKind, request: &AssetRequest) -> Result<(), RemoteError> {
        if request.body.contains_key(kind.required_field()) {
            Ok(())
        } else {
            Err(RemoteError::InvalidRequest(format!(
                "{} '{}' requires field '{}'",
                kind,
                request.asset_id,
                kind.required_field()
            )))
        }
    }

    /// Builds the create/update response for the given version.
    fn submit_response(kind: AssetKind, asset_id: &str, arn: &str, version: u64) -> Node {
        let mut response = Mapping::new();
        response.insert("Arn".to_string(), Node::string(arn));
        response.insert(id_field(kind).to_string(), Node::string(asset_id));
        if kind != AssetKind::DataSet {
            response.insert(
                "VersionArn".to_string(),
                Node::string(format!("{}/version/{}", arn, version)),
            );
            response.insert(
                "CreationStatus".to_string(),
                Node::string("CREATION_SUCCESSFUL"),
            );
        }
        Node::Mapping(response)
    }

    fn kind_from_arn(arn: &str) -> Option<(AssetKind, &str)> {
        let resource = arn.rsplit(':').next()?;
        let (resource_type, asset_id) = resource.split_once('/')?;
        let kind = [AssetKind::Analysis, AssetKind::Dashboard, AssetKind::DataSet]
            .into_iter()
            .find(|kind| kind.resource_type() == resource_type)?;
        Some((kind, asset_id))
    }
}

/// Resolves every destination to a [`LocalStore`] below one root directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
}

impl ClientProvider for LocalProvider {
    fn client_for(
        &self,
        destination: &Destination,
    ) -> Result<Arc<dyn AnalyticsClient>, RemoteError> {
        Ok(Arc::new(LocalStore::new(self.root.clone(), destination.clone())))
    }
}

fn id_field(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Analysis => "AnalysisId",
        AssetKind::Dashboard => "DashboardId",
        AssetKind::DataSet => "DataSetId",
    }
}

fn io_error(path: &Path, e: std::io::Error) -> RemoteError {
    RemoteError::Transport(format!("I/O error on '{}': {}", path.display(), e))
}

#[async_trait]
impl AnalyticsClient for LocalStore {
    async fn describe_asset(
        &self,
        kind: AssetKind,
        asset_id: &str,
    ) -> Result<AssetSummary, RemoteError> {
        let asset = self.load(kind, asset_id).await?;
        Ok(AssetSummary {
            name: asset.name,
            arn: asset.arn,
        })
    }

    async fn describe_definition(
        &self,
        kind: AssetKind,
        asset_id: &str,
    ) -> Result<Node, RemoteError> {
        let asset = self.load(kind, asset_id).await?;
        let mut response = Mapping::new();
        response.insert(id_field(kind).to_string(), Node::string(asset_id));
        response.insert("Name".to_string(), Node::string(asset.name));
        response.insert("Arn".to_string(), Node::string(asset.arn));
        if let Node::Mapping(body) = asset.body {
            response.extend(body);
        }
        Ok(Node::Mapping(response))
    }

    async fn create_asset(
        &self,
        kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError> {
        Self::check_required_field(kind, request)?;
        let _guard = self.lock.lock().await;
        match self.load(kind, &request.asset_id).await {
            Ok(_) => {
                return Err(RemoteError::InvalidRequest(format!(
                    "ResourceExistsException: {} '{}' already exists",
                    kind, request.asset_id
                )));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let arn = self.destination.arn(kind, &request.asset_id);
        let asset = StoredAsset {
            name: request.name.clone(),
            arn: arn.clone(),
            body: request.body.clone(),
            versions: vec![StoredVersion {
                version: 1,
                status: VersionStatus::CreationSuccessful,
            }],
            published_version: None,
            permissions: Vec::new(),
            tags: IndexMap::new(),
        };
        self.save(kind, &request.asset_id, &asset).await?;
        Ok(Self::submit_response(kind, &request.asset_id, &arn, 1))
    }

    async fn update_asset(
        &self,
        kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError> {
        Self::check_required_field(kind, request)?;
        let _guard = self.lock.lock().await;
        let mut asset = self.load(kind, &request.asset_id).await?;
        let version = asset.versions.last().map_or(1, |v| v.version + 1);
        asset.name = request.name.clone();
        asset.body = request.body.clone();
        asset.versions.push(StoredVersion {
            version,
            status: VersionStatus::CreationSuccessful,
        });
        self.save(kind, &request.asset_id, &asset).await?;
        Ok(Self::submit_response(
            kind,
            &request.asset_id,
            &asset.arn,
            version,
        ))
    }

    async fn delete_asset(&self, kind: AssetKind, asset_id: &str) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let path = self.asset_path(kind, asset_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RemoteError::NotFound {
                kind,
                asset_id: asset_id.to_string(),
            }),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn describe_version(
        &self,
        asset_id: &str,
        version: u64,
    ) -> Result<VersionDescription, RemoteError> {
        let asset = self.load(AssetKind::Dashboard, asset_id).await?;
        asset
            .versions
            .iter()
            .find(|v| v.version == version)
            .map(|v| VersionDescription {
                version: v.version,
                status: v.status,
                errors: Vec::new(),
            })
            .ok_or_else(|| RemoteError::NotFound {
                kind: AssetKind::Dashboard,
                asset_id: format!("{}/version/{}", asset_id, version),
            })
    }

    async fn publish_version(&self, asset_id: &str, version: u64) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let mut asset = self.load(AssetKind::Dashboard, asset_id).await?;
        let ready = asset
            .versions
            .iter()
            .any(|v| v.version == version && v.status.is_successful());
        if !ready {
            return Err(RemoteError::InvalidRequest(format!(
                "Version {} of dashboard '{}' is not in a publishable state",
                version, asset_id
            )));
        }
        asset.published_version = Some(version);
        self.save(AssetKind::Dashboard, asset_id, &asset).await
    }

    async fn update_permissions(
        &self,
        kind: AssetKind,
        asset_id: &str,
        grants: &[PermissionGrant],
    ) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let mut asset = self.load(kind, asset_id).await?;
        for grant in grants {
            asset.permissions.retain(|g| g.principal != grant.principal);
            asset.permissions.push(grant.clone());
        }
        self.save(kind, asset_id, &asset).await
    }

    async fn tag_resource(&self, arn: &str, tags: &[(String, String)]) -> Result<(), RemoteError> {
        let (kind, asset_id) = Self::kind_from_arn(arn)
            .ok_or_else(|| RemoteError::InvalidRequest(format!("Unrecognized ARN '{}'", arn)))?;
        let _guard = self.lock.lock().await;
        let mut asset = self.load(kind, asset_id).await?;
        asset.tags.extend(tags.iter().cloned());
        self.save(kind, asset_id, &asset).await
    }
}
