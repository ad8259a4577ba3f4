//! Shared building blocks for the folio crates.
//!
//! - [`ErrorCode`]: stable, machine-readable error identifiers
//! - [`Priority`] / [`PriorityList`]: ordered listener registration
//! - [`Emitter`]: synchronous event emitter used by documents and commands

pub mod emitter;
pub mod error;
pub mod priority;

pub use emitter::*;
pub use error::*;
pub use priority::*;
