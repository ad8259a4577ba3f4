//! Error types for the model

use folio_common::ErrorCode;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("operation base version {actual:?} does not match document version {expected}")]
    WrongVersion { expected: u64, actual: Option<u64> },

    #[error("position {path:?} in root '{root}' does not point into an element")]
    InvalidPosition { root: String, path: Vec<usize> },

    #[error("root '{0}' does not exist")]
    RootNotFound(String),

    #[error("insert position {path:?} in root '{root}' is invalid")]
    InsertPositionInvalid { root: String, path: Vec<usize> },

    #[error("cannot move {how_many} nodes from {path:?} in root '{root}', they do not exist")]
    MoveNodesDoNotExist { root: String, path: Vec<usize>, how_many: usize },

    #[error("move target {path:?} in root '{root}' is invalid")]
    MovePositionInvalid { root: String, path: Vec<usize> },

    #[error("cannot move a range into itself")]
    MoveRangeIntoItself,

    #[error("cannot move a node into itself")]
    MoveNodeIntoItself,

    #[error("attribute operation range must be flat")]
    AttributeRangeNotFlat,

    #[error("attribute '{key}' has value {actual} but {expected} was expected")]
    AttributeWrongOldValue { key: String, expected: Value, actual: Value },

    #[error("attribute '{key}' is already set")]
    AttributeExists { key: String },

    #[error("attribute '{key}' is not set")]
    AttributeAbsent { key: String },

    #[error("no element at rename position {path:?} in root '{root}'")]
    RenameWrongPosition { root: String, path: Vec<usize> },

    #[error("element is named '{actual}', expected '{expected}'")]
    RenameWrongName { expected: String, actual: String },

    #[error("root '{0}' is already attached")]
    RootAttached(String),

    #[error("root '{0}' is already detached")]
    RootDetached(String),

    #[error("root attribute '{key}' on '{root}' has value {actual} but {expected} was expected")]
    RootAttributeWrongOldValue {
        root: String,
        key: String,
        expected: Value,
        actual: Value,
    },

    #[error("node does not exist")]
    NodeNotFound,

    #[error("schema item '{0}' is not registered")]
    SchemaMissingItem(String),

    #[error("marker '{0}' already exists")]
    MarkerExists(String),

    #[error("marker '{0}' does not exist")]
    MarkerNotFound(String),

    #[error("range to move must be flat")]
    WriterMoveInvalidRange,

    #[error("range to wrap must be flat")]
    WriterWrapRangeNotFlat,

    #[error("wrapping element must be an empty element")]
    WriterWrapElementInvalid,

    #[error("element to split has no parent")]
    WriterSplitElementNoParent,

    #[error("split limit is not an ancestor of the split position")]
    WriterSplitInvalidLimit,

    #[error("no element before the merge position")]
    WriterMergeNoElementBefore,

    #[error("no element after the merge position")]
    WriterMergeNoElementAfter,

    #[error("element to unwrap has no parent")]
    WriterUnwrapElementNoParent,

    #[error("roots cannot be renamed")]
    WriterRenameRoot,

    #[error("only elements can be renamed")]
    WriterRenameNotElement,
}

impl ErrorCode for ModelError {
    fn code(&self) -> &'static str {
        match self {
            ModelError::WrongVersion { .. } => "model-document-applyOperation-wrong-version",
            ModelError::InvalidPosition { .. } => "model-position-path-incorrect",
            ModelError::RootNotFound(_) => "model-root-not-found",
            ModelError::InsertPositionInvalid { .. } => "insert-operation-position-invalid",
            ModelError::MoveNodesDoNotExist { .. } => "move-operation-nodes-do-not-exist",
            ModelError::MovePositionInvalid { .. } => "move-operation-position-invalid",
            ModelError::MoveRangeIntoItself => "move-operation-range-into-itself",
            ModelError::MoveNodeIntoItself => "move-operation-node-into-itself",
            ModelError::AttributeRangeNotFlat => "attribute-operation-range-not-flat",
            ModelError::AttributeWrongOldValue { .. } => "attribute-operation-wrong-old-value",
            ModelError::AttributeExists { .. } => "attribute-operation-attribute-exists",
            ModelError::AttributeAbsent { .. } => "attribute-operation-attribute-absent",
            ModelError::RenameWrongPosition { .. } => "rename-operation-wrong-position",
            ModelError::RenameWrongName { .. } => "rename-operation-wrong-name",
            ModelError::RootAttached(_) => "root-operation-root-attached",
            ModelError::RootDetached(_) => "root-operation-root-detached",
            ModelError::RootAttributeWrongOldValue { .. } => "rootattribute-operation-wrong-old-value",
            ModelError::NodeNotFound => "model-node-not-found",
            ModelError::SchemaMissingItem(_) => "schema-cannot-extend-missing-item",
            ModelError::MarkerExists(_) => "writer-addmarker-marker-exists",
            ModelError::MarkerNotFound(_) => "writer-updatemarker-marker-not-exists",
            ModelError::WriterMoveInvalidRange => "writer-move-invalid-range",
            ModelError::WriterWrapRangeNotFlat => "writer-wrap-range-not-flat",
            ModelError::WriterWrapElementInvalid => "writer-wrap-element-invalid",
            ModelError::WriterSplitElementNoParent => "writer-split-element-no-parent",
            ModelError::WriterSplitInvalidLimit => "writer-split-invalid-limit-element",
            ModelError::WriterMergeNoElementBefore => "writer-merge-no-element-before",
            ModelError::WriterMergeNoElementAfter => "writer-merge-no-element-after",
            ModelError::WriterUnwrapElementNoParent => "writer-unwrap-element-no-parent",
            ModelError::WriterRenameRoot => "writer-rename-root",
            ModelError::WriterRenameNotElement => "writer-rename-not-element-instance",
        }
    }

    fn data(&self) -> Value {
        match self {
            ModelError::WrongVersion { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
            ModelError::InvalidPosition { root, path }
            | ModelError::InsertPositionInvalid { root, path }
            | ModelError::MovePositionInvalid { root, path }
            | ModelError::RenameWrongPosition { root, path } => json!({ "root": root, "path": path }),
            ModelError::MoveNodesDoNotExist { root, path, how_many } => {
                json!({ "root": root, "path": path, "howMany": how_many })
            }
            ModelError::AttributeWrongOldValue { key, expected, actual } => {
                json!({ "key": key, "expected": expected, "actual": actual })
            }
            ModelError::AttributeExists { key } | ModelError::AttributeAbsent { key } => json!({ "key": key }),
            ModelError::RenameWrongName { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
            ModelError::RootNotFound(name)
            | ModelError::RootAttached(name)
            | ModelError::RootDetached(name)
            | ModelError::SchemaMissingItem(name)
            | ModelError::MarkerExists(name)
            | ModelError::MarkerNotFound(name) => json!({ "name": name }),
            ModelError::RootAttributeWrongOldValue {
                root,
                key,
                expected,
                actual,
            } => json!({ "root": root, "key": key, "expected": expected, "actual": actual }),
            _ => Value::Null,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
