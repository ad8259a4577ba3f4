//! Error types for the editor

use folio_common::ErrorCode;
use folio_conversion::ConversionError;
use folio_model::ModelError;
use folio_view::ViewError;
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("editor is destroyed")]
    Destroyed,

    #[error("command '{0}' is not registered")]
    UnknownCommand(String),

    #[error("command '{0}' is disabled")]
    CommandDisabled(String),

    #[error("root '{0}' does not exist")]
    UnknownRoot(String),

    #[error("operation {index} of the log is invalid: {message}")]
    InvalidLogEntry { index: usize, message: String },

    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for EditorError {
    fn code(&self) -> &'static str {
        match self {
            EditorError::Model(error) => error.code(),
            EditorError::View(error) => error.code(),
            EditorError::Conversion(error) => error.code(),
            EditorError::Destroyed => "editor-destroyed",
            EditorError::UnknownCommand(_) => "commandcollection-command-not-found",
            EditorError::CommandDisabled(_) => "command-disabled",
            EditorError::UnknownRoot(_) => "datacontroller-get-non-existent-root",
            EditorError::InvalidLogEntry { .. } => "operationreplayer-invalid-operation",
            EditorError::Config { .. } => "editor-config-invalid",
            EditorError::Io(_) => "editor-io",
        }
    }

    fn data(&self) -> Value {
        match self {
            EditorError::Model(error) => error.data(),
            EditorError::View(error) => error.data(),
            EditorError::Conversion(error) => error.data(),
            EditorError::UnknownCommand(name) | EditorError::CommandDisabled(name) => json!({ "commandName": name }),
            EditorError::UnknownRoot(root) => json!({ "rootName": root }),
            EditorError::InvalidLogEntry { index, .. } => json!({ "index": index }),
            EditorError::Config { path, .. } => json!({ "path": path.display().to_string() }),
            EditorError::Destroyed | EditorError::Io(_) => Value::Null,
        }
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
