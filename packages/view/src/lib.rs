//! # Folio view
//!
//! DOM-shaped tree that conversion renders the model into, and the HTML
//! data processor that turns it into (and back from) markup.
//!
//! ```text
//! ViewTree (arena)
//!   ├── DowncastWriter   insert / remove / wrap / unwrap / break / merge
//!   ├── Matcher          patterns for upcast converters
//!   └── html             parse + stringify
//! ```

pub mod error;
pub mod html;
pub mod matcher;
pub mod position;
pub mod tree;
pub mod writer;

pub use error::{ViewError, ViewResult};
pub use html::{is_void_element, parse, stringify, stringify_children};
pub use matcher::{MatchResult, Matcher, MatcherPattern};
pub use position::{ViewPosition, ViewRange, ViewSelection};
pub use tree::{parse_style, ElementKind, ViewElement, ViewNode, ViewNodeId, ViewTree, DEFAULT_PRIORITY};
pub use writer::DowncastWriter;
