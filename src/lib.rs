//! # dashkeeper - Definition Repair and Deployment for Analytics Assets
//!
//! **dashkeeper** keeps the definitions of BI assets (analyses, dashboards and
//! datasets) consistent with the datasets they declare, and moves them between
//! accounts and regions.
//!
//! ## Core Workflow
//!
//! A definition is an arbitrarily deep JSON tree. It declares the datasets it may
//! use in `DataSetIdentifierDeclarations` and refers to them through
//! `DataSetIdentifier` keys inside filters, controls and visuals.
//!
//! 1.  **Diagnose**: [`repair::scan`] collects every reference and
//!     [`repair::valid_ids`] every declaration. References without a declaration
//!     are dangling.
//! 2.  **Repair**: [`repair::repair`] prunes the structures holding dangling
//!     references, cascading through filter groups and filter controls.
//! 3.  **Remap**: when deploying into another environment, declarations are
//!     replaced and every reference is rewritten positionally.
//! 4.  **Reconcile**: [`deploy::Deployer`] creates or updates the asset, waits for
//!     the new version to settle, verifies it and rolls back on failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashkeeper::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! // Offline repair of an exported definition.
//! let json = std::fs::read_to_string("analysis.json")?;
//! let mut tree = Node::from_json_str(&json)?;
//! if let RepairOutcome::Modified(report) = repair(&mut tree) {
//!     println!("removed {} filters", report.filters_removed);
//! }
//!
//! // Deployment against a directory-backed store.
//! let deployer = Deployer::new(LocalStore::provider("./store"), Config::default());
//! for spec in DeploymentSpec::from_file("deploy.json")? {
//!     match deployer.deploy(&spec).await {
//!         Ok(deployed) => println!("{} {:?}", deployed.asset_id, deployed.action),
//!         Err(failure) => eprintln!("{}", failure),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod config;
pub mod definition;
pub mod deploy;
pub mod error;
pub mod prelude;
pub mod remote;
pub mod repair;
