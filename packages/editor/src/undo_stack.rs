//! # Undo/Redo Stack
//!
//! Tracks which batches can be undone and redone.
//!
//! ## Design
//!
//! - Every finished batch is routed by its type and origin
//! - Local undoable batches go on the undo stack and clear the redo stack
//! - Batches created by undo go on the redo stack
//! - Batches created by redo go back on the undo stack
//! - Transparent batches (data loading, remote changes) are not recorded
//!
//! Reverting a batch inverts it and rebases the inverse over everything
//! applied since. A batch that was itself reverted later, together with the
//! batch that reverted it, changes nothing outside the graveyard, so such
//! pairs are left out of the rebase.

use folio_model::{Batch, BatchOrigin, Document, Operation, OperationKind, Position, GRAVEYARD};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::debug;

const DEFAULT_MAX_LEVELS: usize = 100;

/// A batch and the undo or redo batch that reverted it
#[derive(Debug, Clone)]
struct Revert {
    /// Versions of the reverted batch's operations
    reverted: Range<u64>,

    /// Versions of the reverting batch's operations
    reverting: Range<u64>,

    /// What the pair leaves behind: content created by the reverted batch
    /// ends up at the graveyard start.
    residue: Vec<Operation>,
}

impl Revert {
    fn covers(&self, version: u64) -> bool {
        self.reverted.contains(&version) || self.reverting.contains(&version)
    }
}

/// Undo/redo stack for one editor
#[derive(Debug)]
pub struct UndoStack {
    /// Undoable batches, oldest first. The oldest are dropped past
    /// `max_levels`.
    undo_stack: VecDeque<Batch>,

    /// Batches created by undo that can be redone (most recent last)
    redo_stack: Vec<Batch>,

    /// Every revert done so far, in the order they happened
    reverts: Vec<Revert>,

    /// 0 keeps every batch
    max_levels: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_LEVELS)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            reverts: Vec::new(),
            max_levels,
        }
    }

    /// Record a finished batch
    pub fn record(&mut self, batch: &Batch) {
        if !batch.is_undoable() || batch.is_empty() {
            return;
        }
        match batch.origin {
            BatchOrigin::Local => {
                self.push_undo(batch.clone());
                self.redo_stack.clear();
            }
            BatchOrigin::Undo => self.redo_stack.push(batch.clone()),
            BatchOrigin::Redo => self.push_undo(batch.clone()),
            BatchOrigin::Remote => {}
        }
        debug!(
            batch = batch.id,
            origin = ?batch.origin,
            undo = self.undo_stack.len(),
            redo = self.redo_stack.len(),
            "Recorded batch"
        );
    }

    /// Record that the operations with versions in `reverting` reverted
    /// `batch`.
    pub fn record_revert(&mut self, batch: &Batch, reverting: Range<u64>) {
        let Some(base) = batch.base_version() else {
            return;
        };
        if reverting.is_empty() {
            return;
        }
        let residue = batch
            .operations
            .iter()
            .rev()
            .filter_map(|operation| match &operation.kind {
                OperationKind::Insert { nodes, .. } => Some(Operation::new(
                    OperationKind::Insert {
                        position: Position::at(GRAVEYARD, 0),
                        nodes: nodes.clone(),
                        should_receive_attributes: false,
                    },
                    None,
                )),
                _ => None,
            })
            .collect();
        self.reverts.push(Revert {
            reverted: base..base + batch.operations.len() as u64,
            reverting,
            residue,
        });
    }

    fn push_undo(&mut self, batch: Batch) {
        self.undo_stack.push_back(batch);
        while self.max_levels != 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.pop_front();
        }
    }

    pub fn pop_undo(&mut self) -> Option<Batch> {
        self.undo_stack.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<Batch> {
        self.redo_stack.pop()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_levels() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_levels() > 0
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.reverts.clear();
    }

    /// Operations that revert `batch` on the current document: the inverses
    /// of its operations in reverse order, rebased over everything applied
    /// after the batch.
    pub fn reverting_operations(&self, batch: &Batch, document: &Document) -> Vec<Operation> {
        let Some(base) = batch.base_version() else {
            return Vec::new();
        };
        let end = base + batch.operations.len() as u64;
        let inverses: Vec<Operation> = batch
            .operations
            .iter()
            .rev()
            .enumerate()
            .map(|(i, operation)| operation.inverse().with_base_version(Some(end + i as u64)))
            .collect();
        let applied = self.applied_since(end, document);
        debug!(
            batch = batch.id,
            from = end,
            to = document.version(),
            transformed_by = applied.len(),
            "Reverting batch"
        );
        document.rebase_operations_over(&inverses, &applied)
    }

    /// History since `version` with cancelled pairs replaced by their
    /// residue.
    fn applied_since(&self, version: u64, document: &Document) -> Vec<Operation> {
        let cancelled = self.cancelled_since(version);
        let mut applied = Vec::new();
        for operation in document.history().operations_since(version) {
            let Some(op_version) = operation.base_version else {
                applied.push(operation.clone());
                continue;
            };
            if let Some(revert) = cancelled.iter().find(|r| r.reverting.end == op_version + 1) {
                applied.extend(revert.residue.iter().cloned());
            } else if !cancelled.iter().any(|r| r.covers(op_version)) {
                applied.push(operation.clone());
            }
        }
        applied
    }

    /// Reverts after `version` that can be skipped as a whole: everything
    /// applied between a batch and its revert must be skipped too, and a
    /// batch takes part in at most one skipped pair.
    fn cancelled_since(&self, version: u64) -> Vec<&Revert> {
        let mut cancelled: Vec<&Revert> = Vec::new();
        let covered = |cancelled: &[&Revert], v: u64| cancelled.iter().any(|r| r.covers(v));
        while let Some(next) = self.reverts.iter().find(|revert| {
            revert.reverted.start >= version
                && !covered(&cancelled, revert.reverted.start)
                && !covered(&cancelled, revert.reverting.start)
                && (revert.reverted.end..revert.reverting.start).all(|v| covered(&cancelled, v))
        }) {
            cancelled.push(next);
        }
        cancelled
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
