//! Reference-integrity repair for asset definitions.
//!
//! A definition declares the datasets it may use in `DataSetIdentifierDeclarations`
//! and refers to them through `DataSetIdentifier` keys scattered across filters,
//! controls and visuals. When a declaration disappears, every structure still
//! pointing at it is dangling and the service rejects the definition. The
//! functions here find those references and cut them out, cascading through
//! containers that become empty.

use crate::definition::Node;
use ahash::AHashSet;
use itertools::Itertools;
use tracing::{info, warn};

pub mod pruner;
pub mod remap;
pub mod scanner;
pub mod validity;

pub use pruner::{PruneReport, prune, prune_with_report};
pub use remap::{IdMapping, apply_mapping, build_mapping};
pub use scanner::{references_any, scan};
pub use validity::{Declaration, declarations, replace_declarations, valid_ids};

/// A set of dataset identifiers.
pub type IdSet = AHashSet<String>;

/// The reference picture of one definition before repair.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub references: IdSet,
    pub declared: IdSet,
    /// False when the definition carries no declaration list at all.
    pub has_declarations: bool,
}

impl Diagnosis {
    pub fn of(tree: &Node) -> Self {
        Self {
            references: scan(tree),
            declared: valid_ids(tree),
            has_declarations: declarations(tree).is_some(),
        }
    }

    /// References with no matching declaration.
    pub fn dangling(&self) -> IdSet {
        self.references
            .difference(&self.declared)
            .cloned()
            .collect()
    }

    /// Dangling identifiers in a stable order, for display.
    pub fn dangling_sorted(&self) -> Vec<String> {
        self.dangling().into_iter().sorted().collect()
    }
}

/// Result of a repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Modified(PruneReport),
    Unchanged,
    /// References exist but nothing is declared, so integrity cannot be judged.
    /// The definition is left as it was.
    NoDeclarations { references: Vec<String> },
}

impl RepairOutcome {
    pub fn is_modified(&self) -> bool {
        matches!(self, RepairOutcome::Modified(_))
    }
}

/// Removes every dangling reference from `tree` in place.
///
/// A definition with references but no declaration list is left alone and
/// reported as [`RepairOutcome::NoDeclarations`]: every reference would count
/// as dangling, and wiping them all is never what the caller wants.
pub fn repair(tree: &mut Node) -> RepairOutcome {
    let diagnosis = Diagnosis::of(tree);
    if !diagnosis.has_declarations {
        if diagnosis.references.is_empty() {
            return RepairOutcome::Unchanged;
        }
        warn!(
            references = diagnosis.references.len(),
            "definition has references but no declaration list; skipping repair"
        );
        return RepairOutcome::NoDeclarations {
            references: diagnosis.references.iter().cloned().sorted().collect(),
        };
    }

    let dangling = diagnosis.dangling();
    if dangling.is_empty() {
        return RepairOutcome::Unchanged;
    }
    info!(dangling = %diagnosis.dangling_sorted().join(", "), "removing dangling references");

    let report = prune_with_report(tree, &dangling);
    if report.modified() {
        RepairOutcome::Modified(report)
    } else {
        RepairOutcome::Unchanged
    }
}
