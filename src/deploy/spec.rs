use crate::assets::request_body;
use crate::definition::vocabulary::{DATA_SOURCE_ARN, DEFINITION, PHYSICAL_TABLE_MAP, definition_body};
use crate::definition::{Mapping, Node};
use crate::error::{AssetError, SpecError};
use crate::remote::{AssetKind, AssetRequest, Destination, PermissionGrant};
use crate::repair::{
    Declaration, IdMapping, RepairOutcome, apply_mapping, build_mapping, declarations, repair,
    replace_declarations,
};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the definition to deploy comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSource {
    /// The definition tree itself.
    Inline(Node),
    /// A JSON file, resolved relative to the spec file when loaded from disk.
    Path(PathBuf),
}

/// A plain string replacement applied to every string in the definition,
/// typically account ids or environment names inside ARNs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

fn default_repair() -> bool {
    true
}

/// Everything needed to materialize one asset in a destination environment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeploymentSpec {
    pub asset_id: String,
    /// Display name; defaults to the source's `Name`, then to the asset id.
    #[serde(default)]
    pub name: Option<String>,
    pub kind: AssetKind,
    pub source: DefinitionSource,
    pub destination: Destination,
    /// Replacement declarations, paired positionally with the source's own.
    #[serde(default)]
    pub declarations: Option<Vec<Declaration>>,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    /// The data source every physical table of a dataset must point at after
    /// deployment. Defaults to the data sources named by the prepared definition.
    #[serde(default)]
    pub expected_data_source_arn: Option<String>,
    /// Strip dangling references before submitting.
    #[serde(default = "default_repair")]
    pub repair: bool,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// A spec turned into a ready-to-submit request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAsset {
    pub kind: AssetKind,
    pub request: AssetRequest,
    pub mapping: IdMapping,
    pub repair: RepairOutcome,
    /// Sorted, de-duplicated data source ARNs a dataset must carry once deployed.
    pub expected_data_sources: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecFile {
    Many(Vec<DeploymentSpec>),
    One(Box<DeploymentSpec>),
}

impl DeploymentSpec {
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        serde_json::from_str(json).map_err(|e| SpecError::Parse(e.to_string()))
    }

    /// Loads a spec file holding one spec or an array of them.
    pub fn from_file(path: &str) -> Result<Vec<Self>, SpecError> {
        let content = fs::read_to_string(path).map_err(|e| SpecError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let parsed: SpecFile =
            serde_json::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?;
        let mut specs = match parsed {
            SpecFile::Many(specs) => specs,
            SpecFile::One(spec) => vec![*spec],
        };
        let base_dir = Path::new(path).parent().map(Path::to_path_buf);
        for spec in &mut specs {
            spec.base_dir = base_dir.clone();
        }
        Ok(specs)
    }

    /// Reads the source definition.
    pub fn load_source(&self) -> Result<Node, SpecError> {
        let tree = match &self.source {
            DefinitionSource::Inline(tree) => tree.clone(),
            DefinitionSource::Path(path) => {
                let resolved = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                let content = fs::read_to_string(&resolved).map_err(|e| SpecError::Io {
                    path: resolved.display().to_string(),
                    message: e.to_string(),
                })?;
                Node::from_json_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?
            }
        };
        if tree.as_mapping().is_none() {
            return Err(SpecError::NotAMapping(self.asset_id.clone()));
        }
        Ok(tree)
    }

    /// Loads the source and applies substitutions, repair and identifier remapping.
    pub fn prepare(&self) -> Result<PreparedAsset, SpecError> {
        let mut tree = self.load_source()?;
        let substituted = self.apply_substitutions(&mut tree);
        debug!(asset_id = %self.asset_id, substituted, "applied substitutions");

        let name = self
            .name
            .clone()
            .or_else(|| tree.get_str("Name").map(str::to_string))
            .unwrap_or_else(|| self.asset_id.clone());

        let prepared = match self.kind {
            AssetKind::Analysis | AssetKind::Dashboard => self.prepare_exploration(&tree, name),
            AssetKind::DataSet => self.prepare_dataset(&tree, name)?,
        };
        info!(
            asset_id = %self.asset_id,
            kind = %self.kind,
            repaired = prepared.repair.is_modified(),
            remapped = prepared.mapping.len(),
            "prepared definition"
        );
        Ok(prepared)
    }

    fn apply_substitutions(&self, tree: &mut Node) -> bool {
        if self.substitutions.is_empty() {
            return false;
        }
        tree.for_each_string_mut(&mut |value: &mut String| {
            let mut changed = false;
            for rule in &self.substitutions {
                if !rule.from.is_empty() && value.contains(&rule.from) {
                    *value = value.replace(&rule.from, &rule.to);
                    changed = true;
                }
            }
            changed
        })
    }

    fn prepare_exploration(&self, tree: &Node, name: String) -> PreparedAsset {
        let mut definition = definition_body(tree).clone();

        let repair_outcome = if self.repair {
            repair(&mut definition)
        } else {
            RepairOutcome::Unchanged
        };

        let mut mapping = IdMapping::new();
        if let Some(replacement) = &self.declarations {
            let original = declarations(&definition).unwrap_or_default();
            mapping = build_mapping(&original, replacement);
            replace_declarations(&mut definition, replacement);
            apply_mapping(&mut definition, &mapping);
        }

        let mut body = Mapping::new();
        body.insert(DEFINITION.to_string(), definition);
        PreparedAsset {
            kind: self.kind,
            request: AssetRequest {
                asset_id: self.asset_id.clone(),
                name,
                body: Node::Mapping(body),
            },
            mapping,
            repair: repair_outcome,
            expected_data_sources: Vec::new(),
        }
    }

    fn prepare_dataset(&self, tree: &Node, name: String) -> Result<PreparedAsset, SpecError> {
        // Accepts a raw describe-data-set response as well as the bare fields.
        let body = request_body(AssetKind::DataSet, &self.asset_id, tree).map_err(|e| match e {
            AssetError::MissingField { asset_id, field, .. } => SpecError::MissingField { asset_id, field },
            AssetError::Remote(remote) => SpecError::Parse(remote.to_string()),
        })?;

        let expected_data_sources = match &self.expected_data_source_arn {
            Some(arn) => vec![arn.clone()],
            None => data_source_arns(&body),
        };

        Ok(PreparedAsset {
            kind: self.kind,
            request: AssetRequest {
                asset_id: self.asset_id.clone(),
                name,
                body,
            },
            mapping: IdMapping::new(),
            repair: RepairOutcome::Unchanged,
            expected_data_sources,
        })
    }

    pub fn tag_pairs(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Every `DataSourceArn` named by a dataset's physical tables, sorted and de-duplicated.
///
/// Each physical table is wrapped by its type (`RelationalTable`, `CustomSql`,
/// `S3Source`), so the ARN sits one level below the table entry.
pub fn data_source_arns(dataset: &Node) -> Vec<String> {
    let Some(tables) = dataset.get(PHYSICAL_TABLE_MAP).and_then(Node::as_mapping) else {
        return Vec::new();
    };
    tables
        .values()
        .filter_map(Node::as_mapping)
        .flat_map(|table| table.values())
        .filter_map(|source| source.get_str(DATA_SOURCE_ARN))
        .map(str::to_string)
        .sorted()
        .dedup()
        .collect()
}
