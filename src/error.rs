use crate::remote::AssetKind;
use itertools::Itertools;
use thiserror::Error;

/// Errors returned by the remote analytics service (or a stand-in for it).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Request '{operation}' was throttled: {message}")]
    Throttled { operation: String, message: String },

    #[error("{kind} '{asset_id}' was not found")]
    NotFound { kind: AssetKind, asset_id: String },

    #[error("Request was rejected: {0}")]
    InvalidRequest(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Throttling is the only error class the retrying executor backs off on.
    pub fn is_throttling(&self) -> bool {
        matches!(self, RemoteError::Throttled { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

/// Errors raised by the per-asset façade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{kind} '{asset_id}' is missing required field '{field}'")]
    MissingField {
        kind: AssetKind,
        asset_id: String,
        field: &'static str,
    },
}

/// One entry of the error list the service attaches to a failed version.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VersionError {
    #[serde(rename = "Type", default)]
    pub error_type: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl std::fmt::Display for VersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// The failure taxonomy surfaced by a deployment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeployError {
    #[error("Deployment spec is invalid: {0}")]
    Spec(#[from] SpecError),

    #[error("Could not resolve a client for account '{account_id}' in '{region}': {source}")]
    Destination {
        account_id: String,
        region: String,
        source: RemoteError,
    },

    #[error("Probing {kind} '{asset_id}' failed: {source}")]
    Probe {
        kind: AssetKind,
        asset_id: String,
        source: RemoteError,
    },

    #[error("{kind} '{asset_id}' is missing required field '{field}'")]
    InvalidDefinition {
        kind: AssetKind,
        asset_id: String,
        field: &'static str,
    },

    #[error("Submitting {kind} '{asset_id}' failed: {source}")]
    Submit {
        kind: AssetKind,
        asset_id: String,
        source: RemoteError,
    },

    #[error("No version reference found in the response for '{asset_id}': {response}")]
    VersionExtraction { asset_id: String, response: String },

    #[error("Version {version} of '{asset_id}' did not finish after {attempts} polls")]
    PollingTimeout {
        asset_id: String,
        version: u64,
        attempts: u32,
    },

    #[error("Version {version} of '{asset_id}' failed: {}", format_version_errors(.errors))]
    CreationFailed {
        asset_id: String,
        version: u64,
        errors: Vec<VersionError>,
    },

    #[error("Polling version {version} of '{asset_id}' failed: {source}")]
    Polling {
        asset_id: String,
        version: u64,
        source: RemoteError,
    },

    #[error("Field '{field}' of '{asset_id}' is {actual:?}, expected {expected:?}")]
    ValidationMismatch {
        asset_id: String,
        field: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Applying permissions or tags to '{asset_id}' failed: {source}")]
    Grant { asset_id: String, source: RemoteError },

    #[error("Publishing version {version} of '{asset_id}' failed: {source}")]
    Publish {
        asset_id: String,
        version: u64,
        source: RemoteError,
    },

    #[error("Rolling back '{asset_id}' ({action}) failed: {source}")]
    RollbackFailed {
        asset_id: String,
        action: &'static str,
        source: RemoteError,
    },
}

fn format_version_errors(errors: &[VersionError]) -> String {
    if errors.is_empty() {
        return "no error details reported".to_string();
    }
    errors.iter().join("; ")
}

/// Errors from loading or preparing a deployment spec.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("Could not read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse deployment spec: {0}")]
    Parse(String),

    #[error("Source definition for '{0}' is not a JSON object")]
    NotAMapping(String),

    #[error("Source definition for '{asset_id}' is missing required field '{field}'")]
    MissingField {
        asset_id: String,
        field: &'static str,
    },
}

/// Errors from loading configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Could not read config file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
