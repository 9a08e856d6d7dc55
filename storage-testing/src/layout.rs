//! Declarative device layouts, loaded from `resources/layouts`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storage_model::{DeviceNode, StorageConfig};

use crate::errors::{Result, TestingError};

/// One named device layout: the storage configuration plus the device
/// nodes a scan of the simulated machine reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub name: String,
    #[serde(default)]
    pub config: StorageConfig,
    pub devices: Vec<DeviceNode>,
}

pub fn workspace_root() -> PathBuf {
    if let Ok(value) = std::env::var("STORAGE_TESTING_WORKSPACE_ROOT") {
        return PathBuf::from(value);
    }

    if let Ok(current_dir) = std::env::current_dir()
        && current_dir.join("resources/layouts").exists()
    {
        return current_dir;
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn layouts_root() -> PathBuf {
    workspace_root().join("resources/layouts")
}

pub fn layout_path_for_name(layout_name: &str) -> PathBuf {
    layouts_root().join(format!("{}.toml", layout_name))
}

pub fn load_by_name(layout_name: &str) -> Result<LayoutSpec> {
    let path = layout_path_for_name(layout_name);
    if !path.exists() {
        return Err(TestingError::LayoutNotFound {
            layout_name: layout_name.to_string(),
        });
    }

    load_from_path(&path, layout_name)
}

fn load_from_path(path: &Path, layout_name: &str) -> Result<LayoutSpec> {
    let raw = fs::read_to_string(path).map_err(|error| TestingError::LayoutInvalid {
        layout_name: layout_name.to_string(),
        reason: error.to_string(),
    })?;

    let spec: LayoutSpec = toml::from_str(&raw).map_err(|error| TestingError::LayoutInvalid {
        layout_name: layout_name.to_string(),
        reason: error.to_string(),
    })?;

    validate(&spec)?;
    Ok(spec)
}

pub fn validate(spec: &LayoutSpec) -> Result<()> {
    if spec.name.is_empty() {
        return Err(TestingError::LayoutInvalid {
            layout_name: "<unknown>".to_string(),
            reason: "name must not be empty".to_string(),
        });
    }

    if spec.devices.is_empty() {
        return Err(TestingError::LayoutInvalid {
            layout_name: spec.name.clone(),
            reason: "devices must not be empty".to_string(),
        });
    }

    let mut names = BTreeSet::new();
    for device in &spec.devices {
        if !names.insert(device.name.as_str()) {
            return Err(TestingError::LayoutInvalid {
                layout_name: spec.name.clone(),
                reason: format!("duplicate device name '{}'", device.name),
            });
        }
    }

    for device in &spec.devices {
        for parent in &device.parents {
            if !names.contains(parent.as_str()) {
                return Err(TestingError::LayoutInvalid {
                    layout_name: spec.name.clone(),
                    reason: format!(
                        "device '{}' references unknown parent '{}'",
                        device.name, parent
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_model::DeviceNodeKind;

    fn minimal_spec() -> LayoutSpec {
        let devices: Vec<DeviceNode> = vec![serde_json::from_value(serde_json::json!({
            "name": "sda",
            "kind": "disk",
            "size": 1000,
        }))
        .unwrap()];
        assert_eq!(devices[0].kind, DeviceNodeKind::Disk);

        LayoutSpec {
            name: "minimal".to_string(),
            config: StorageConfig::default(),
            devices,
        }
    }

    #[test]
    fn valid_spec_passes_validation() {
        assert!(validate(&minimal_spec()).is_ok());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut spec = minimal_spec();
        spec.devices[0].parents = vec!["ghost".to_string()];
        assert!(validate(&spec).is_err());
    }
}
