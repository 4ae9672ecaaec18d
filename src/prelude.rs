//! Prelude module for convenient imports
//!
//! Re-exports the types most callers need to repair or deploy definitions.
//!
//! ```rust,no_run
//! use dashkeeper::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let mut tree = Node::from_json_str(&std::fs::read_to_string("dashboard.json")?)?;
//! let diagnosis = Diagnosis::of(&tree);
//! println!("dangling: {:?}", diagnosis.dangling_sorted());
//! repair(&mut tree);
//! # Ok(())
//! # }
//! ```

// Definition trees
pub use crate::definition::{Mapping, Node, Scalar};

// Repair
pub use crate::repair::{Declaration, Diagnosis, IdSet, PruneReport, RepairOutcome, repair};

// Remote seam
pub use crate::remote::{
    AnalyticsClient, AssetKind, ClientProvider, Destination, LocalStore, PermissionGrant,
    RetryingExecutor,
};

// Assets and deployment
pub use crate::assets::AssetManager;
pub use crate::config::Config;
pub use crate::deploy::{Action, DeployFailure, Deployed, Deployer, DeploymentSpec, RollbackStatus};

// Error types
pub use crate::error::{AssetError, ConfigError, DeployError, RemoteError, SpecError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
