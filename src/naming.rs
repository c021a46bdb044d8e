//! Deterministic artifact naming
//!
//! These names are a stable wire contract: downstream consumers discover
//! compiled artifacts purely by this naming convention. Change nothing here
//! without versioning the convention.

/// Fixed tag prefixed to every version-derived configuration name.
const VERSION_TAG: &str = "daffodil";

/// Derive the ivy-style configuration name for a target version: strip every
/// non-alphanumeric character and prefix the fixed tag.
///
/// `"3.10.0"` becomes `"daffodil3100"`.
pub fn ivy_config_name(version: &str) -> String {
    let stripped: String = version
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{VERSION_TAG}{stripped}")
}

/// The classifier embedded in an artifact's file name: the config name,
/// prefixed with the label when one is present.
pub fn classifier(label: Option<&str>, version: &str) -> String {
    match label {
        Some(label) => format!("{}-{}", label, ivy_config_name(version)),
        None => ivy_config_name(version),
    }
}

/// Output artifact file name:
/// `<project>-<project_version>[-<label>]-<config_name>.bin`.
pub fn artifact_file_name(
    project: &str,
    project_version: &str,
    label: Option<&str>,
    target_version: &str,
) -> String {
    format!(
        "{}-{}-{}.bin",
        project,
        project_version,
        classifier(label, target_version)
    )
}
