use crate::config::Overrides;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use folio_editor::{Editor, EditorConfig, OperationReplayer, ReplayStatus};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Operation log to replay
    pub log: PathBuf,

    /// Pause between operations (overrides config)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Apply every operation at once
    #[arg(long)]
    pub all: bool,

    /// Root to print after replaying
    #[arg(long, default_value = "main")]
    pub root: String,
}

impl ReplayArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: Some(self.root.clone()),
            interval_ms: self.interval_ms,
        }
    }
}

/// Replays a log into a fresh editor and returns the data of the root.
/// Ctrl-C stops a timed replay after the current operation.
pub async fn replay(args: ReplayArgs, config: EditorConfig) -> Result<String> {
    let log = tokio::fs::read_to_string(&args.log).await?;
    let mut replayer = OperationReplayer::parse(&log)?;
    let interval = config.replay.interval();
    let mut editor = Editor::new(config)?;

    eprintln!(
        "▶ {} {} operations from {}",
        "Replaying".green().bold(),
        replayer.len(),
        args.log.display()
    );

    if args.all {
        replayer.apply_all(&mut editor)?;
    } else {
        let (cancel, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Received Ctrl-C");
                let _ = cancel.send(true);
            }
        });

        let outcome = replayer.play(&mut editor, interval, cancel_rx).await?;
        if outcome.status == ReplayStatus::Cancelled {
            eprintln!(
                "{} after {} of {} operations",
                "Cancelled".yellow().bold(),
                outcome.applied,
                replayer.len()
            );
        }
    }

    Ok(editor.get_data(&args.root)?)
}
