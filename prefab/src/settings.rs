use std::path::{Path, PathBuf};

use redlilium_dom::Format;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::update_executor::DEFAULT_MAX_PROPAGATION_PASSES;

/// Text format used when saving templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Json,
    Ron,
}

impl SaveFormat {
    pub fn to_format(self) -> Format {
        match self {
            SaveFormat::Json => Format::Json,
            #[cfg(feature = "serialize-ron")]
            SaveFormat::Ron => Format::Ron,
            #[cfg(not(feature = "serialize-ron"))]
            SaveFormat::Ron => {
                log::warn!("RON support is disabled, saving as JSON");
                Format::Json
            }
        }
    }
}

/// Prefab system configuration, usually read from `prefab.toml`.
///
/// ```toml
/// storage_root = "assets/prefabs"
/// save_format = "ron"
/// pretty = true
/// max_propagation_passes = 32
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefabSettings {
    /// Root directory for [`FileSystemStorage`](crate::FileSystemStorage).
    pub storage_root: PathBuf,
    pub save_format: SaveFormat,
    pub pretty: bool,
    /// Bound on upward re-queue passes in one instance update.
    pub max_propagation_passes: usize,
    pub entity_alias_prefix: String,
    pub instance_alias_prefix: String,
}

impl Default for PrefabSettings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("prefabs"),
            save_format: SaveFormat::Json,
            pretty: true,
            max_propagation_passes: DEFAULT_MAX_PROPAGATION_PASSES,
            entity_alias_prefix: "Entity".into(),
            instance_alias_prefix: "Instance".into(),
        }
    }
}

impl PrefabSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        log::info!("Loaded prefab settings from {}", path.display());
        Ok(settings)
    }
}
