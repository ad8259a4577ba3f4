//! Groups of operations that form one logical edit.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a batch takes part in undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchType {
    #[default]
    Default,
    /// Not recorded by undo, e.g. loading data or applying remote changes.
    Transparent,
}

/// Where the operations of a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchOrigin {
    #[default]
    Local,
    Undo,
    Redo,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: u64,
    pub batch_type: BatchType,
    pub origin: BatchOrigin,
    pub operations: Vec<Operation>,
}

impl Batch {
    pub fn new(batch_type: BatchType) -> Self {
        Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            batch_type,
            origin: BatchOrigin::Local,
            operations: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin: BatchOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn is_undoable(&self) -> bool {
        self.batch_type == BatchType::Default
    }

    /// Version of the document before the first operation of this batch.
    pub fn base_version(&self) -> Option<u64> {
        self.operations.iter().find_map(|op| op.base_version)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
