//! Extracting the version number from a create/update response.
//!
//! The service reports the new version in more than one shape. Each strategy
//! handles one shape; they are tried in order and the first hit wins. A response
//! no strategy understands is an error, never a guess.

use crate::definition::Node;

type Strategy = fn(&Node) -> Option<u64>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("VersionArn", from_version_arn),
    ("Version.VersionNumber", from_version_number),
    ("Version.Arn", from_nested_version_arn),
];

/// Returns the version number carried by `response`, if any strategy recognizes it.
pub fn extract_version(response: &Node) -> Option<u64> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let version = strategy(response)?;
        tracing::debug!(strategy = name, version, "extracted version number");
        Some(version)
    })
}

/// `arn:...:dashboard/sales/version/3` -> 3.
fn numeric_tail(arn: &str) -> Option<u64> {
    arn.rsplit('/').next()?.parse().ok()
}

fn from_version_arn(response: &Node) -> Option<u64> {
    response.get_str("VersionArn").and_then(numeric_tail)
}

fn from_version_number(response: &Node) -> Option<u64> {
    let number = response.get_path(&["Version", "VersionNumber"])?;
    number
        .as_u64()
        .or_else(|| number.as_str().and_then(|s| s.parse().ok()))
}

fn from_nested_version_arn(response: &Node) -> Option<u64> {
    let version = response.get("Version")?;
    version
        .get_str("Arn")
        .or_else(|| version.get_str("VersionArn"))
        .and_then(numeric_tail)
}
