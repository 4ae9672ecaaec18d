use crate::error::VersionError;
use crate::remote::VersionDescription;

/// Coarse processing state of a submitted version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    InProgress,
    Successful,
    Failed,
}

/// Tracks one submitted version from the create/update response until polling
/// sees a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRecord {
    pub asset_id: String,
    pub version_number: u64,
    pub status: RecordStatus,
    pub errors: Vec<VersionError>,
    pub polls: u32,
}

impl DeploymentRecord {
    pub fn new(asset_id: impl Into<String>, version_number: u64) -> Self {
        Self {
            asset_id: asset_id.into(),
            version_number,
            status: RecordStatus::InProgress,
            errors: Vec::new(),
            polls: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RecordStatus::InProgress
    }

    /// Folds a describe-version answer into the record. Terminal records do not change.
    pub fn observe(&mut self, description: &VersionDescription) {
        if self.is_terminal() {
            return;
        }
        if description.status.is_successful() {
            self.status = RecordStatus::Successful;
        } else if description.status.is_failed() {
            self.status = RecordStatus::Failed;
            self.errors = description.errors.clone();
        }
    }
}
