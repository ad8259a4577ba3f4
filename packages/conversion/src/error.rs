//! Error types for conversion

use folio_common::ErrorCode;
use folio_model::ModelError;
use folio_view::ViewError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("unknown conversion group '{0}'")]
    UnknownGroup(String),

    #[error("attribute '{key}' can only be converted to a view attribute on elements")]
    AttributeToAttributeOnText { key: String },

    #[error("model root '{0}' is not bound to a view root")]
    RootNotBound(String),

    #[error("converter failed: {0}")]
    Converter(String),
}

impl ErrorCode for ConversionError {
    fn code(&self) -> &'static str {
        match self {
            ConversionError::Model(error) => error.code(),
            ConversionError::View(error) => error.code(),
            ConversionError::UnknownGroup(_) => "conversion-for-unknown-group",
            ConversionError::AttributeToAttributeOnText { .. } => "conversion-attribute-to-attribute-on-text",
            ConversionError::RootNotBound(_) => "conversion-root-not-bound",
            ConversionError::Converter(_) => "conversion-converter-failed",
        }
    }

    fn data(&self) -> Value {
        match self {
            ConversionError::Model(error) => error.data(),
            ConversionError::View(error) => error.data(),
            ConversionError::UnknownGroup(group) => json!({ "group": group }),
            ConversionError::AttributeToAttributeOnText { key } => json!({ "key": key }),
            ConversionError::RootNotBound(root) => json!({ "root": root }),
            ConversionError::Converter(_) => Value::Null,
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
