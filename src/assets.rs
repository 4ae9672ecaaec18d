use crate::definition::vocabulary::DEFINITION;
use crate::definition::{Mapping, Node};
use crate::error::{AssetError, RemoteError};
use crate::remote::{
    AnalyticsClient, AssetKind, AssetRequest, PermissionGrant, RetryingExecutor,
    VersionDescription,
};
use crate::repair::{RepairOutcome, repair};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Describe-response fields the service sets itself and rejects on submit.
const READ_ONLY_FIELDS: &[&str] = &[
    "Arn",
    "AnalysisId",
    "DashboardId",
    "DataSetId",
    "Name",
    "CreatedTime",
    "LastUpdatedTime",
    "ConsumedSpiceCapacityInBytes",
    "OutputColumns",
    "RequestId",
    "Status",
    "ResourceStatus",
    "Errors",
];

/// Key wrapping the fields of a raw describe-data-set response.
const DATA_SET_WRAPPER: &str = "DataSet";

/// The node holding an asset's own fields. Dataset describe responses may wrap
/// them in `{"DataSet": {...}}`; other shapes are returned as given.
pub fn described_fields(kind: AssetKind, described: &Node) -> &Node {
    match (kind, described.get(DATA_SET_WRAPPER)) {
        (AssetKind::DataSet, Some(inner)) if inner.as_mapping().is_some() => inner,
        _ => described,
    }
}

/// Turns a describe response into the body of a create/update request for `kind`.
pub fn request_body(kind: AssetKind, asset_id: &str, described: &Node) -> Result<Node, AssetError> {
    let missing = || AssetError::MissingField {
        kind,
        asset_id: asset_id.to_string(),
        field: kind.required_field(),
    };
    match kind {
        AssetKind::Analysis | AssetKind::Dashboard => {
            let definition = described.get(DEFINITION).ok_or_else(missing)?;
            let mut body = Mapping::new();
            body.insert(DEFINITION.to_string(), definition.clone());
            Ok(Node::Mapping(body))
        }
        AssetKind::DataSet => {
            let fields = described_fields(kind, described)
                .as_mapping()
                .ok_or_else(missing)?;
            let body: Mapping = fields
                .iter()
                .filter(|(key, _)| !READ_ONLY_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if !body.contains_key(kind.required_field()) {
                return Err(missing());
            }
            Ok(Node::Mapping(body))
        }
    }
}

/// Per-asset-type access to the remote service. Every call goes through the
/// retrying executor.
#[derive(Clone)]
pub struct AssetManager {
    client: Arc<dyn AnalyticsClient>,
    kind: AssetKind,
    executor: RetryingExecutor,
}

impl AssetManager {
    pub fn new(client: Arc<dyn AnalyticsClient>, kind: AssetKind, executor: RetryingExecutor) -> Self {
        Self {
            client,
            kind,
            executor,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Fetches the describe response holding the asset's definition.
    pub async fn get_definition(&self, asset_id: &str) -> Result<Node, RemoteError> {
        self.executor
            .execute("DescribeDefinition", || {
                self.client.describe_definition(self.kind, asset_id)
            })
            .await
    }

    pub async fn get_name(&self, asset_id: &str) -> Result<String, RemoteError> {
        self.executor
            .execute("DescribeAsset", || self.client.describe_asset(self.kind, asset_id))
            .await
            .map(|summary| summary.name)
    }

    pub async fn get_arn(&self, asset_id: &str) -> Result<String, RemoteError> {
        self.executor
            .execute("DescribeAsset", || self.client.describe_asset(self.kind, asset_id))
            .await
            .map(|summary| summary.arn)
    }

    pub async fn create_asset(&self, request: &AssetRequest) -> Result<Node, RemoteError> {
        self.executor
            .execute("CreateAsset", || self.client.create_asset(self.kind, request))
            .await
    }

    /// Submits `body` as the new content of an existing asset.
    pub async fn update_asset(
        &self,
        asset_id: &str,
        name: &str,
        body: Node,
    ) -> Result<Node, RemoteError> {
        let request = AssetRequest {
            asset_id: asset_id.to_string(),
            name: name.to_string(),
            body,
        };
        self.executor
            .execute("UpdateAsset", || self.client.update_asset(self.kind, &request))
            .await
    }

    pub async fn delete_asset(&self, asset_id: &str) -> Result<(), RemoteError> {
        self.executor
            .execute("DeleteAsset", || self.client.delete_asset(self.kind, asset_id))
            .await
    }

    pub async fn describe_version(
        &self,
        asset_id: &str,
        version: u64,
    ) -> Result<VersionDescription, RemoteError> {
        self.executor
            .execute("DescribeVersion", || {
                self.client.describe_version(asset_id, version)
            })
            .await
    }

    pub async fn publish_version(&self, asset_id: &str, version: u64) -> Result<(), RemoteError> {
        self.executor
            .execute("PublishVersion", || self.client.publish_version(asset_id, version))
            .await
    }

    pub async fn grant(&self, asset_id: &str, grants: &[PermissionGrant]) -> Result<(), RemoteError> {
        if grants.is_empty() {
            return Ok(());
        }
        self.executor
            .execute("UpdatePermissions", || {
                self.client.update_permissions(self.kind, asset_id, grants)
            })
            .await
    }

    pub async fn tag(&self, arn: &str, tags: &[(String, String)]) -> Result<(), RemoteError> {
        if tags.is_empty() {
            return Ok(());
        }
        self.executor
            .execute("TagResource", || self.client.tag_resource(arn, tags))
            .await
    }

    /// Fetches the asset, strips dangling dataset references from its definition
    /// and submits the result if anything changed.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn remove_broken_references(&self, asset_id: &str) -> Result<RepairOutcome, AssetError> {
        let described = self.get_definition(asset_id).await?;
        let name = match described_fields(self.kind, &described).get_str("Name") {
            Some(name) => name.to_string(),
            None => self.get_name(asset_id).await?,
        };

        let mut body = request_body(self.kind, asset_id, &described)?;
        let outcome = repair(&mut body);
        match &outcome {
            RepairOutcome::Modified(report) => {
                info!(?report, "submitting repaired definition");
                self.update_asset(asset_id, &name, body).await?;
            }
            RepairOutcome::Unchanged => info!("no dangling references"),
            RepairOutcome::NoDeclarations { references } => {
                warn!(?references, "no declaration list; references left unchecked")
            }
        }
        Ok(outcome)
    }
}
