//! # Editor
//!
//! Ties the model, the conversion pipelines, the editing view and the
//! commands together. Every change goes through [`Editor::change`] (or one
//! of its variants), after which finished batches are recorded for undo
//! and replay and the editing view is patched.

use crate::command::{CommandCollection, CommandState, ExecuteEvent, RedoCommand, UndoCommand};
use crate::config::EditorConfig;
use crate::data;
use crate::editing::EditingController;
use crate::errors::{EditorError, EditorResult};
use crate::replay::OperationRecorder;
use crate::undo_stack::UndoStack;
use folio_conversion::{Conversion, ViewElementDefinition};
use folio_model::{
    BatchOrigin, BatchType, Model, ModelResult, Operation, Position, Range, Schema, SchemaItemDefinition, Writer,
};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Initializing,
    Ready,
    Destroyed,
}

pub struct Editor {
    state: EditorState,
    config: EditorConfig,
    model: Model,
    conversion: Conversion,
    editing: EditingController,
    undo: UndoStack,
    recorder: Option<OperationRecorder>,
    commands: CommandCollection,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("state", &self.state)
            .field("roots", &self.config.roots)
            .field("version", &self.model.document().version())
            .field("commands", &self.commands)
            .finish()
    }
}

impl Editor {
    /// Creates an editor with a `paragraph` element, the configured roots
    /// and the `undo`/`redo` commands.
    pub fn new(config: EditorConfig) -> EditorResult<Self> {
        let mut editor = Self {
            state: EditorState::Initializing,
            undo: UndoStack::with_max_levels(config.undo.steps),
            config,
            model: Model::new(),
            conversion: Conversion::new(),
            editing: EditingController::new(),
            recorder: None,
            commands: CommandCollection::new(),
        };

        editor
            .model
            .schema_mut()
            .register("paragraph", SchemaItemDefinition::new().inherit_all_from("$block"));
        editor
            .conversion
            .element_to_element("paragraph", ViewElementDefinition::new("p"));

        for name in editor.config.roots.clone() {
            editor
                .model
                .document_mut()
                .create_root(&editor.config.root_element, &name)?;
            editor.editing.attach_root(&editor.model, &name)?;
        }

        editor.commands.add("undo", UndoCommand);
        editor.commands.add("redo", RedoCommand);
        editor.state = EditorState::Ready;
        info!(roots = ?editor.config.roots, "Editor ready");
        Ok(editor)
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        self.model.schema_mut()
    }

    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }

    pub fn conversion_mut(&mut self) -> &mut Conversion {
        &mut self.conversion
    }

    pub fn editing(&self) -> &EditingController {
        &self.editing
    }

    pub fn commands(&self) -> &CommandCollection {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandCollection {
        &mut self.commands
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub(crate) fn undo_stack_mut(&mut self) -> &mut UndoStack {
        &mut self.undo
    }

    fn ensure_ready(&self) -> EditorResult<()> {
        match self.state {
            EditorState::Destroyed => Err(EditorError::Destroyed),
            _ => Ok(()),
        }
    }

    /// Runs `callback` in a local undoable batch.
    pub fn change<R>(&mut self, callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> EditorResult<R> {
        self.ensure_ready()?;
        let result = self.model.change(callback);
        // Operations applied before a failure are still in the document.
        self.flush()?;
        Ok(result?)
    }

    pub fn enqueue_change(
        &mut self,
        batch_type: BatchType,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>,
    ) -> EditorResult<()> {
        self.enqueue_change_from(batch_type, BatchOrigin::Local, callback)
    }

    pub fn enqueue_change_from(
        &mut self,
        batch_type: BatchType,
        origin: BatchOrigin,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>,
    ) -> EditorResult<()> {
        self.ensure_ready()?;
        let result = self.model.enqueue_change_from(batch_type, origin, callback);
        self.flush()?;
        Ok(result?)
    }

    /// Applies serialized operations as they are, in one transparent batch.
    /// Base versions must line up with the document.
    pub fn apply_operations(&mut self, operations: Vec<Operation>) -> EditorResult<()> {
        self.enqueue_change(BatchType::Transparent, move |writer| {
            for operation in operations {
                writer.apply_operation(operation)?;
            }
            Ok(())
        })
    }

    /// Rebases operations made against an older version and applies them.
    pub fn apply_remote_operations(&mut self, operations: &[Operation]) -> EditorResult<()> {
        self.ensure_ready()?;
        let result = self.model.apply_remote_operations(operations);
        self.flush()?;
        Ok(result?)
    }

    fn flush(&mut self) -> EditorResult<()> {
        for batch in self.model.take_completed_batches() {
            self.undo.record(&batch);
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record(&batch);
            }
        }
        self.editing.convert_changes(&mut self.model, &self.conversion)
    }

    /// Replaces the content of `root` with parsed HTML. The change cannot
    /// be undone.
    pub fn set_data(&mut self, html: &str, root: &str) -> EditorResult<()> {
        self.ensure_ready()?;
        let document = self.model.document();
        let root_id = document
            .get_root(root)
            .ok_or_else(|| EditorError::UnknownRoot(root.to_string()))?;
        let context = document.tree().name(root_id).to_string();
        let nodes = data::parse(self.model.schema(), &self.conversion, html, &context)?;
        debug!(root, nodes = nodes.len(), "Setting data");

        let root_name = root.to_string();
        self.enqueue_change(BatchType::Transparent, move |writer| {
            let content = Range::in_element(writer.tree(), root_id)?;
            if !content.is_collapsed() {
                writer.remove(&content)?;
            }
            writer.insert(nodes, &Position::at(root_name, 0))?;
            Ok(())
        })
    }

    pub fn get_data(&self, root: &str) -> EditorResult<String> {
        self.ensure_ready()?;
        data::get_data(&self.model, &self.conversion, root)
    }

    pub fn command_state(&self, name: &str) -> EditorResult<CommandState> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| EditorError::UnknownCommand(name.to_string()))?;
        Ok(command.refresh(self))
    }

    /// Runs a command if it is enabled.
    pub fn execute(&mut self, name: &str, args: Value) -> EditorResult<()> {
        self.ensure_ready()?;
        let mut command = self.commands.take(name)?;
        let state = command.refresh(self);
        let result = if state.is_enabled {
            command.execute(self, &args)
        } else {
            Err(EditorError::CommandDisabled(name.to_string()))
        };
        self.commands.restore(name, command);
        result?;
        self.commands.fire_executed(ExecuteEvent {
            command: name.to_string(),
            args,
        });
        Ok(())
    }

    /// Starts collecting every applied operation.
    pub fn start_recording(&mut self) {
        self.recorder.get_or_insert_with(OperationRecorder::new);
    }

    pub fn recorder(&self) -> Option<&OperationRecorder> {
        self.recorder.as_ref()
    }

    pub fn stop_recording(&mut self) -> Option<OperationRecorder> {
        self.recorder.take()
    }

    /// Releases commands and history. Every later call fails with
    /// [`EditorError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.state == EditorState::Destroyed {
            return;
        }
        self.commands.clear();
        self.undo.clear();
        self.recorder = None;
        self.state = EditorState::Destroyed;
        info!("Editor destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_editor_has_configured_roots() {
        let config = EditorConfig {
            roots: vec!["main".into(), "aside".into()],
            ..EditorConfig::default()
        };
        let editor = Editor::new(config).unwrap();
        assert_eq!(editor.state(), EditorState::Ready);
        assert!(editor.editing().view().root("main").is_some());
        assert!(editor.editing().view().root("aside").is_some());
        assert_eq!(editor.get_data("aside").unwrap(), "");
    }

    #[test]
    fn test_execute_unknown_and_disabled_commands() {
        let mut editor = Editor::new(EditorConfig::default()).unwrap();
        assert!(matches!(
            editor.execute("bold", Value::Null),
            Err(EditorError::UnknownCommand(name)) if name == "bold"
        ));
        assert!(matches!(
            editor.execute("undo", Value::Null),
            Err(EditorError::CommandDisabled(name)) if name == "undo"
        ));
        assert!(editor.commands().get("undo").is_some());
    }
}
