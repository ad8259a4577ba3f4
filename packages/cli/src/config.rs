use anyhow::Result;
use folio_editor::EditorConfig;
use std::path::Path;

/// Values given on the command line that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<String>,
    pub interval_ms: Option<u64>,
}

/// Load the editor config from an explicit file or from `cwd`, then apply
/// command line overrides.
pub fn load(config_path: Option<&Path>, cwd: &Path, overrides: &Overrides) -> Result<EditorConfig> {
    let mut config = match config_path {
        Some(path) => EditorConfig::load_file(path)?,
        None => EditorConfig::load(cwd)?,
    };

    // The root to work on must exist in the editor
    if let Some(root) = &overrides.root {
        if !config.roots.contains(root) {
            config.roots.push(root.clone());
        }
    }
    if let Some(interval_ms) = overrides.interval_ms {
        config.replay.interval_ms = interval_ms;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_editor::DEFAULT_CONFIG_NAME;

    #[test]
    fn test_load_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(None, dir.path(), &Overrides::default()).unwrap();
        assert_eq!(config, EditorConfig::default());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "roots": ["main"], "replay": { "intervalMs": 250 } }"#,
        )
        .unwrap();

        let from_file = load(None, dir.path(), &Overrides::default()).unwrap();
        assert_eq!(from_file.replay.interval_ms, 250);

        let overrides = Overrides {
            root: Some("aside".to_string()),
            interval_ms: Some(5),
        };
        let config = load(None, dir.path(), &overrides).unwrap();
        assert_eq!(config.roots, vec!["main", "aside"]);
        assert_eq!(config.replay.interval_ms, 5);
    }

    #[test]
    fn test_explicit_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{ "rootElement": "body" }"#).unwrap();

        let config = load(Some(&path), Path::new("/nonexistent"), &Overrides::default()).unwrap();
        assert_eq!(config.root_element, "body");
        assert!(load(Some(&dir.path().join("missing.json")), dir.path(), &Overrides::default()).is_err());
    }
}
