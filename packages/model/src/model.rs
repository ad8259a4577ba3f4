//! # Model
//!
//! Entry point for changing a document. All changes happen inside change
//! blocks, which hand out a [`Writer`] and collect the applied operations
//! into a [`Batch`].
//!
//! - `change`: runs a block. Nested blocks (through [`Writer::change`])
//!   join the outer batch.
//! - `enqueue_change`: runs a block in its own batch, after the current
//!   outermost block when called from inside one.
//!
//! Finished batches are kept until the owner takes them with
//! [`Model::take_completed_batches`], which is where undo and conversion
//! hook in.

use crate::batch::{Batch, BatchOrigin, BatchType};
use crate::document::Document;
use crate::error::ModelResult;
use crate::operation::Operation;
use crate::schema::Schema;
use crate::writer::Writer;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub(crate) type ChangeCallback = Box<dyn FnOnce(&mut Writer<'_>) -> ModelResult<()> + Send>;

pub(crate) struct PendingChange {
    pub batch_type: BatchType,
    pub origin: BatchOrigin,
    pub callback: ChangeCallback,
}

pub struct Model {
    pub(crate) document: Document,
    pub(crate) schema: Schema,
    pub(crate) current_batch: Option<Batch>,
    pub(crate) pending: VecDeque<PendingChange>,
    completed: Vec<Batch>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("version", &self.document.version())
            .field("pending", &self.pending.len())
            .field("completed", &self.completed.len())
            .finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_schema(Schema::with_base_items())
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            document: Document::new(),
            schema,
            current_batch: None,
            pending: VecDeque::new(),
            completed: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    /// Runs `callback` in a default batch.
    pub fn change<R>(&mut self, callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> ModelResult<R> {
        self.run_block(BatchType::Default, BatchOrigin::Local, callback)
    }

    /// Runs `callback` in a batch of its own with the given type.
    pub fn enqueue_change(
        &mut self,
        batch_type: BatchType,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>,
    ) -> ModelResult<()> {
        self.run_block(batch_type, BatchOrigin::Local, callback)
    }

    /// Like [`Model::enqueue_change`] but tags the batch with its origin.
    pub fn enqueue_change_from(
        &mut self,
        batch_type: BatchType,
        origin: BatchOrigin,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>,
    ) -> ModelResult<()> {
        self.run_block(batch_type, origin, callback)
    }

    /// Rebases operations received from elsewhere and applies them in one
    /// transparent batch.
    pub fn apply_remote_operations(&mut self, operations: &[Operation]) -> ModelResult<()> {
        let rebased = self.document.rebase_operations(operations);
        self.run_block(BatchType::Transparent, BatchOrigin::Remote, move |writer| {
            for operation in rebased {
                writer.apply_operation(operation)?;
            }
            Ok(())
        })
    }

    fn run_block<R>(
        &mut self,
        batch_type: BatchType,
        origin: BatchOrigin,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        self.current_batch = Some(Batch::new(batch_type).with_origin(origin));
        let result = callback(&mut Writer::new(self));
        self.finish_batch();

        let mut deferred = Ok(());
        while let Some(change) = self.pending.pop_front() {
            self.current_batch = Some(Batch::new(change.batch_type).with_origin(change.origin));
            let outcome = (change.callback)(&mut Writer::new(self));
            self.finish_batch();
            if let Err(error) = outcome {
                warn!(%error, "Enqueued change failed");
                if deferred.is_ok() {
                    deferred = Err(error);
                }
            }
        }

        let value = result?;
        deferred?;
        Ok(value)
    }

    fn finish_batch(&mut self) {
        let Some(batch) = self.current_batch.take() else {
            return;
        };
        if batch.is_empty() {
            return;
        }
        debug!(
            batch = batch.id,
            operations = batch.operations.len(),
            batch_type = ?batch.batch_type,
            origin = ?batch.origin,
            "Batch finished"
        );
        self.completed.push(batch);
    }

    pub fn has_completed_batches(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Batches finished since the last call, oldest first.
    pub fn take_completed_batches(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.completed)
    }
}
