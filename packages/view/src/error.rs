//! Error types for the view layer

use folio_common::ErrorCode;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("view node does not exist")]
    NodeNotFound,

    #[error("view root '{0}' does not exist")]
    RootNotFound(String),

    #[error("view root '{0}' already exists")]
    RootExists(String),

    #[error("offset {offset} is outside of its parent")]
    InvalidPosition { offset: usize },

    #[error("range boundaries must share a container element")]
    InvalidRangeContainer,

    #[error("cannot break attributes inside an empty, raw or UI element")]
    CannotBreakElement,

    #[error("only attribute elements can wrap content")]
    WrapInvalidAttribute,

    #[error("only attribute elements can be unwrapped")]
    UnwrapInvalidAttribute,

    #[error("nodes of this kind cannot be inserted here")]
    InsertInvalidNode,

    #[error("'{0}' cannot contain children")]
    ElementCannotHaveChildren(String),
}

impl ErrorCode for ViewError {
    fn code(&self) -> &'static str {
        match self {
            ViewError::NodeNotFound => "view-node-not-found",
            ViewError::RootNotFound(_) => "view-root-not-found",
            ViewError::RootExists(_) => "view-root-exists",
            ViewError::InvalidPosition { .. } => "view-position-invalid-offset",
            ViewError::InvalidRangeContainer => "view-writer-invalid-range-container",
            ViewError::CannotBreakElement => "view-writer-cannot-break-empty-element",
            ViewError::WrapInvalidAttribute => "view-writer-wrap-invalid-attribute",
            ViewError::UnwrapInvalidAttribute => "view-writer-unwrap-invalid-attribute",
            ViewError::InsertInvalidNode => "view-writer-insert-invalid-node",
            ViewError::ElementCannotHaveChildren(_) => "view-element-cannot-have-children",
        }
    }

    fn data(&self) -> Value {
        match self {
            ViewError::RootNotFound(name) | ViewError::RootExists(name) | ViewError::ElementCannotHaveChildren(name) => {
                json!({ "name": name })
            }
            ViewError::InvalidPosition { offset } => json!({ "offset": offset }),
            _ => Value::Null,
        }
    }
}

pub type ViewResult<T> = Result<T, ViewError>;
