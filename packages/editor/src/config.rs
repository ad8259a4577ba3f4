use crate::errors::{EditorError, EditorResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Names of the roots created with the editor
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Element name of every root
    #[serde(default = "default_root_element")]
    pub root_element: String,

    #[serde(default)]
    pub undo: UndoConfig,

    #[serde(default)]
    pub replay: ReplayConfig,
}

fn default_roots() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_root_element() -> String {
    "$root".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoConfig {
    /// Maximum number of undo steps (0 = unlimited)
    #[serde(default = "default_undo_steps")]
    pub steps: usize,
}

fn default_undo_steps() -> usize {
    100
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            steps: default_undo_steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    /// Pause between replayed operations
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReplayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            root_element: default_root_element(),
            undo: UndoConfig::default(),
            replay: ReplayConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Load config from a directory, falling back to defaults when it has
    /// no config file
    pub fn load(dir: impl AsRef<Path>) -> EditorResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            Self::load_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_file(path: impl Into<PathBuf>) -> EditorResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|error| EditorError::Config {
            path,
            message: error.to_string(),
        })
    }
}
