//! # Folio model
//!
//! The abstract document model: a schema-validated tree changed only by
//! invertible, serializable operations.
//!
//! ## Layers
//!
//! ```text
//! Position / Range      addressing and transformation under edits
//!        ↓
//! Tree + Schema         arena storage, structural rules
//!        ↓
//! Operation             atomic change with base version and inverse
//!        ↓
//! Document              apply pipeline, selection, markers, history, differ
//!        ↓
//! Model + Writer        change blocks, batches, high level edits
//! ```
//!
//! ## Example
//!
//! ```rust
//! use folio_model::{Model, Node, Position};
//!
//! let mut model = Model::new();
//! model.document_mut().create_root("$root", "main").unwrap();
//! model
//!     .change(|writer| {
//!         writer.insert(
//!             vec![Node::element("paragraph").with_child(Node::text("Hello"))],
//!             &Position::at("main", 0),
//!         )?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(model.document().version(), 1);
//! ```

pub mod batch;
pub mod content;
pub mod differ;
pub mod document;
pub mod error;
pub mod history;
pub mod markers;
pub mod model;
pub mod node;
pub mod operation;
pub mod position;
pub mod range;
pub mod schema;
pub mod selection;
pub mod transform;
pub mod tree;
pub mod writer;

pub use batch::{Batch, BatchOrigin, BatchType};
pub use content::{delete_content, delete_selection_content, insert_content, is_attribute_allowed_in, valid_ranges_for_attribute};
pub use differ::{Changes, DiffItem, Differ, MarkerChange, MarkerData, RootChange, RootState};
pub use document::{Document, DEFAULT_ROOT_ELEMENT};
pub use error::{ModelError, ModelResult};
pub use history::History;
pub use markers::{Marker, MarkerCollection};
pub use model::Model;
pub use node::{normalize_nodes, offset_size_of, Attributes, ElementNode, Node, TextNode, TEXT_NAME};
pub use operation::{Operation, OperationKind};
pub use position::{Position, PositionRelation};
pub use range::Range;
pub use schema::{Schema, SchemaContext, SchemaContextItem, SchemaItemDefinition};
pub use selection::Selection;
pub use transform::{transform, transform_sets};
pub use tree::{Item, NodeId, TextProxy, Tree, GRAVEYARD};
pub use writer::{SplitResult, Writer};
