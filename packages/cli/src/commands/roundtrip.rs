use anyhow::Result;
use clap::Args;
use folio_editor::{Editor, EditorConfig};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RoundtripArgs {
    /// HTML file to load
    pub input: PathBuf,

    /// Root to load the HTML into
    #[arg(long, default_value = "main")]
    pub root: String,
}

/// Loads HTML through the upcast pipeline and serializes it back.
pub async fn roundtrip(args: RoundtripArgs, config: EditorConfig) -> Result<String> {
    let html = tokio::fs::read_to_string(&args.input).await?;
    let mut editor = Editor::new(config)?;
    editor.set_data(&html, &args.root)?;
    Ok(editor.get_data(&args.root)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_normalizes_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.html");
        std::fs::write(&path, "<p>One</p>\n<!-- note -->Two").unwrap();

        let args = RoundtripArgs {
            input: path,
            root: "main".to_string(),
        };
        let data = roundtrip(args, EditorConfig::default()).await.unwrap();
        assert_eq!(data, "<p>One</p><p>Two</p>");
    }

    #[tokio::test]
    async fn test_roundtrip_missing_file() {
        let args = RoundtripArgs {
            input: PathBuf::from("/nonexistent/input.html"),
            root: "main".to_string(),
        };
        assert!(roundtrip(args, EditorConfig::default()).await.is_err());
    }
}
