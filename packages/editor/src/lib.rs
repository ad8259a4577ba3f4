//! # Folio Editor
//!
//! Editor facade over the folio model, view and conversion crates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ commands: undo, redo, attribute toggles     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ model: change blocks → operations → batches │
//! └─────────────────────────────────────────────┘
//!           ↓                         ↓
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │ undo stack, recorder │  │ editing downcast     │
//! └──────────────────────┘  │ → editing view       │
//!                           └──────────────────────┘
//! ```
//!
//! Data goes in and out as HTML through the data pipeline, which never
//! touches the editing view.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_editor::{Editor, EditorConfig};
//!
//! let mut editor = Editor::new(EditorConfig::default())?;
//! editor.set_data("<p>Hello</p>", "main")?;
//! editor.change(|writer| {
//!     writer.insert_text(" world", Default::default(), &Position::new("main", vec![0, 5]))?;
//!     Ok(())
//! })?;
//! assert_eq!(editor.get_data("main")?, "<p>Hello world</p>");
//! editor.execute("undo", Value::Null)?;
//! ```

mod command;
mod config;
mod data;
mod editing;
mod editor;
mod errors;
mod replay;
mod undo_stack;

pub use command::{AttributeCommand, Command, CommandCollection, CommandState, ExecuteEvent, RedoCommand, UndoCommand};
pub use config::{EditorConfig, ReplayConfig, UndoConfig, DEFAULT_CONFIG_NAME};
pub use data::{get_data, parse, stringify};
pub use editing::{EditingController, VIEW_ROOT_ELEMENT};
pub use editor::{Editor, EditorState};
pub use errors::{EditorError, EditorResult};
pub use replay::{OperationRecorder, OperationReplayer, ReplayOutcome, ReplayStatus, LOG_SEPARATOR};
pub use undo_stack::UndoStack;
