//! # Operation replay
//!
//! Records every operation applied to an editor and plays recorded logs
//! back, either all at once or one operation per tick.
//!
//! A log is the JSON of each operation, one entry per operation, joined
//! by a line holding [`LOG_SEPARATOR`].

use crate::editor::Editor;
use crate::errors::{EditorError, EditorResult};
use folio_model::{Batch, Operation};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub const LOG_SEPARATOR: &str = "-------";

/// Collects the operations of finished batches.
#[derive(Debug, Default)]
pub struct OperationRecorder {
    entries: Vec<String>,
}

impl OperationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, batch: &Batch) {
        for operation in &batch.operations {
            match serde_json::to_string(operation) {
                Ok(json) => self.entries.push(json),
                Err(error) => debug!(%error, "Skipping operation that cannot be serialized"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The recorded log.
    pub fn log(&self) -> String {
        self.entries.join(&format!("\n{LOG_SEPARATOR}\n"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub status: ReplayStatus,
    /// Operations applied by this call.
    pub applied: usize,
}

/// Plays a recorded log back into an editor.
#[derive(Debug, Clone, Default)]
pub struct OperationReplayer {
    operations: Vec<Operation>,
    next: usize,
}

impl OperationReplayer {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations, next: 0 }
    }

    /// Parses a log. Blank entries are skipped.
    pub fn parse(log: &str) -> EditorResult<Self> {
        let mut operations = Vec::new();
        for (index, entry) in log.split(LOG_SEPARATOR).map(str::trim).enumerate() {
            if entry.is_empty() {
                continue;
            }
            let operation = serde_json::from_str(entry).map_err(|error| EditorError::InvalidLogEntry {
                index,
                message: error.to_string(),
            })?;
            operations.push(operation);
        }
        debug!(operations = operations.len(), "Parsed operation log");
        Ok(Self::new(operations))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.operations.len() - self.next
    }

    /// Applies the next operation. Returns `true` once nothing is left.
    pub fn apply_next(&mut self, editor: &mut Editor) -> EditorResult<bool> {
        let Some(operation) = self.operations.get(self.next).cloned() else {
            return Ok(true);
        };
        editor.apply_operations(vec![operation])?;
        self.next += 1;
        Ok(false)
    }

    /// Applies every remaining operation in one batch.
    pub fn apply_all(&mut self, editor: &mut Editor) -> EditorResult<usize> {
        let operations = self.operations[self.next..].to_vec();
        let applied = operations.len();
        editor.apply_operations(operations)?;
        self.next = self.operations.len();
        info!(applied, "Replayed operations");
        Ok(applied)
    }

    /// Applies one operation per `interval` until the log ends or `cancel`
    /// turns `true`.
    pub async fn play(
        &mut self,
        editor: &mut Editor,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> EditorResult<ReplayOutcome> {
        let mut applied = 0;
        let mut cancel_open = true;
        loop {
            if *cancel.borrow() {
                info!(applied, "Replay cancelled");
                return Ok(ReplayOutcome {
                    status: ReplayStatus::Cancelled,
                    applied,
                });
            }
            if self.apply_next(editor)? {
                info!(applied, "Replay finished");
                return Ok(ReplayOutcome {
                    status: ReplayStatus::Finished,
                    applied,
                });
            }
            applied += 1;
            if self.remaining() == 0 {
                continue;
            }

            if cancel_open {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = cancel.changed() => {
                        // A dropped sender can never cancel.
                        if changed.is_err() {
                            cancel_open = false;
                            tokio::time::sleep(interval).await;
                        }
                    }
                }
            } else {
                tokio::time::sleep(interval).await;
            }
        }
    }
}
