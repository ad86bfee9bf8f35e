//! Helpers for workspace-level consistency tests

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

/// Member crates, relative to the workspace root
pub const MEMBERS: &[&str] = &["intercept-common", "intercept-core", "intercept-agent"];

pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".."))
}

pub fn read_manifest(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    content
        .parse::<Value>()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn member_manifest(member: &str) -> Result<Value> {
    read_manifest(&workspace_root().join(member).join("Cargo.toml"))
}

/// Names declared in `[workspace.dependencies]`
pub fn workspace_dependencies(root: &Value) -> Vec<String> {
    root.get("workspace")
        .and_then(|workspace| workspace.get("dependencies"))
        .and_then(Value::as_table)
        .map(|table| table.keys().cloned().collect())
        .unwrap_or_default()
}

/// Every dependency of a crate manifest mapped to whether it inherits from
/// the workspace, across normal, dev and build sections
pub fn crate_dependencies(manifest: &Value) -> BTreeMap<String, bool> {
    let mut dependencies = BTreeMap::new();
    for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
        let Some(table) = manifest.get(section).and_then(Value::as_table) else {
            continue;
        };
        for (name, spec) in table {
            let inherits = spec
                .get("workspace")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            dependencies.insert(name.clone(), inherits);
        }
    }
    dependencies
}
