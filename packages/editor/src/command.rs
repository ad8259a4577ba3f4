//! # Commands
//!
//! The write API features use to change the document. A command reports
//! whether it can run in the current state ([`Command::refresh`]) and
//! performs its change inside editor change blocks ([`Command::execute`]).
//!
//! Built in: `undo`, `redo` and [`AttributeCommand`] for toggling an
//! attribute on the selection.

use crate::editor::Editor;
use crate::errors::{EditorError, EditorResult};
use folio_common::{Emitter, ListenerId, Priority};
use folio_model::{BatchOrigin, BatchType, Item, Range, TEXT_NAME};
use folio_model::{SchemaContext, is_attribute_allowed_in};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Enabled flag and current value of a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandState {
    pub is_enabled: bool,
    pub value: Option<Value>,
}

impl CommandState {
    pub fn enabled(value: Option<Value>) -> Self {
        Self {
            is_enabled: true,
            value,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

pub trait Command: Send {
    /// Computes the state from the editor's schema and selection.
    fn refresh(&self, editor: &Editor) -> CommandState;

    fn execute(&mut self, editor: &mut Editor, args: &Value) -> EditorResult<()>;
}

/// Fired after a command ran successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteEvent {
    pub command: String,
    pub args: Value,
}

/// Commands of one editor, by name.
#[derive(Default)]
pub struct CommandCollection {
    commands: BTreeMap<String, Box<dyn Command>>,
    executed: Emitter<ExecuteEvent>,
}

impl std::fmt::Debug for CommandCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCollection")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. A command with the same name is replaced.
    pub fn add(&mut self, name: &str, command: impl Command + 'static) {
        self.commands.insert(name.to_string(), Box::new(command));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|command| command.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn on_execute(&mut self, priority: Priority, listener: impl FnMut(&ExecuteEvent) + Send + 'static) -> ListenerId {
        self.executed.on(priority, listener)
    }

    pub(crate) fn take(&mut self, name: &str) -> EditorResult<Box<dyn Command>> {
        self.commands
            .remove(name)
            .ok_or_else(|| EditorError::UnknownCommand(name.to_string()))
    }

    pub(crate) fn restore(&mut self, name: &str, command: Box<dyn Command>) {
        self.commands.entry(name.to_string()).or_insert(command);
    }

    pub(crate) fn fire_executed(&mut self, event: ExecuteEvent) {
        info!(command = %event.command, "Executed command");
        self.executed.fire(&event);
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// Reverts the most recent undoable batch.
#[derive(Debug, Default)]
pub struct UndoCommand;

impl Command for UndoCommand {
    fn refresh(&self, editor: &Editor) -> CommandState {
        if editor.undo_stack().can_undo() {
            CommandState::enabled(None)
        } else {
            CommandState::disabled()
        }
    }

    fn execute(&mut self, editor: &mut Editor, _args: &Value) -> EditorResult<()> {
        let Some(batch) = editor.undo_stack_mut().pop_undo() else {
            return Ok(());
        };
        debug!(batch = batch.id, "Undoing batch");
        revert(editor, &batch, BatchOrigin::Undo)
    }
}

/// Reverts the most recent undo.
#[derive(Debug, Default)]
pub struct RedoCommand;

impl Command for RedoCommand {
    fn refresh(&self, editor: &Editor) -> CommandState {
        if editor.undo_stack().can_redo() {
            CommandState::enabled(None)
        } else {
            CommandState::disabled()
        }
    }

    fn execute(&mut self, editor: &mut Editor, _args: &Value) -> EditorResult<()> {
        let Some(batch) = editor.undo_stack_mut().pop_redo() else {
            return Ok(());
        };
        debug!(batch = batch.id, "Redoing batch");
        revert(editor, &batch, BatchOrigin::Redo)
    }
}

fn revert(editor: &mut Editor, batch: &folio_model::Batch, origin: BatchOrigin) -> EditorResult<()> {
    let operations = editor.undo_stack().reverting_operations(batch, editor.model().document());
    let start = editor.model().document().version();
    editor.enqueue_change_from(BatchType::Default, origin, move |writer| {
        for operation in operations {
            writer.apply_operation(operation)?;
        }
        Ok(())
    })?;
    let end = editor.model().document().version();
    editor.undo_stack_mut().record_revert(batch, start..end);
    Ok(())
}

/// Toggles a boolean attribute on the selection.
///
/// The value is the attribute of the first selected item that may carry
/// it, or of the selection itself when collapsed. Executing sets the
/// attribute where the schema allows it when the value is not set and
/// removes it otherwise. `{"forceValue": bool}` picks the outcome.
#[derive(Debug, Clone)]
pub struct AttributeCommand {
    key: String,
}

impl AttributeCommand {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn current_value(&self, editor: &Editor) -> Option<Value> {
        let model = editor.model();
        let document = model.document();
        let tree = document.tree();
        let selection = document.selection();
        if selection.is_collapsed() {
            return selection.get_attribute(&self.key).cloned();
        }
        selection
            .ranges()
            .iter()
            .filter_map(|range| tree.items(range, true).ok())
            .flatten()
            .find(|item| allows(editor, item, &self.key))
            .and_then(|item| item.attributes(tree).get(&self.key).cloned())
    }
}

fn allows(editor: &Editor, item: &Item, key: &str) -> bool {
    let model = editor.model();
    let tree = model.document().tree();
    match item {
        Item::Element(id) => model.schema().check_attribute_on(tree, *id, key),
        Item::Text(proxy) => model
            .schema()
            .check_attribute(&SchemaContext::from_node(tree, proxy.parent).push(TEXT_NAME), key),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

impl Command for AttributeCommand {
    fn refresh(&self, editor: &Editor) -> CommandState {
        let model = editor.model();
        let document = model.document();
        let enabled = document
            .selection()
            .ranges()
            .iter()
            .any(|range| is_attribute_allowed_in(model.schema(), document.tree(), range, &self.key));
        CommandState {
            is_enabled: enabled,
            value: self.current_value(editor),
        }
    }

    fn execute(&mut self, editor: &mut Editor, args: &Value) -> EditorResult<()> {
        let set = match args.get("forceValue").and_then(Value::as_bool) {
            Some(force) => force,
            None => !is_truthy(self.current_value(editor).as_ref()),
        };
        let key = self.key.clone();

        let document = editor.model().document();
        let selection = document.selection();
        if selection.is_collapsed() {
            return editor.change(move |writer| {
                if set {
                    writer.set_selection_attribute(&key, Value::Bool(true));
                } else {
                    writer.remove_selection_attribute(&key);
                }
                Ok(())
            });
        }

        let mut elements = Vec::new();
        let mut texts: Vec<Range> = Vec::new();
        for range in selection.ranges() {
            for item in document.tree().items(range, true)? {
                if !allows(editor, &item, &key) {
                    continue;
                }
                match item {
                    Item::Element(id) => elements.push(id),
                    text => texts.push(text.range(document.tree())?),
                }
            }
        }

        editor.change(move |writer| {
            let value = set.then_some(Value::Bool(true));
            for id in elements {
                match &value {
                    Some(value) => writer.set_attribute_on(&key, value.clone(), id)?,
                    None => writer.remove_attribute_on(&key, id)?,
                }
            }
            // Attribute changes never move content, so the ranges stay valid.
            for range in texts {
                match &value {
                    Some(value) => writer.set_attribute(&key, value.clone(), &range)?,
                    None => writer.remove_attribute(&key, &range)?,
                }
            }
            Ok(())
        })
    }
}
