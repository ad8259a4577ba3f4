//! # Folio conversion
//!
//! Moves content between the model and the view.
//!
//! ```text
//!            downcast (editing + data)
//!   Model ─────────────────────────────▶ View
//!     ▲        Mapper keeps positions       │
//!     └──────────────── upcast ─────────────┘
//! ```
//!
//! Both directions are event driven. Converters are registered per event
//! name with a priority, and the first converter that consumes an event
//! wins. [`Conversion`] groups the dispatchers of an editor and offers
//! helpers for the usual converter shapes.

pub mod consumable;
pub mod downcast;
pub mod error;
pub mod helpers;
pub mod mapper;
pub mod registry;
pub mod upcast;

pub use consumable::{ConsumableItem, ModelConsumable, ViewConsumable};
pub use downcast::{
    convert_selection, insert_text_handler, remove_handler, DowncastApi, DowncastDispatcher, DowncastEvent,
    DowncastHandler, TriggerBy,
};
pub use error::{ConversionError, ConversionResult};
pub use helpers::{
    AttributeElementCreator, AttributeToAttribute, AttributeToElement, ElementToElement, MarkerElementCreator,
    MarkerToElement, ModelElementCreator, ModelValue, UpcastAttributeToAttribute, UpcastElementToAttribute,
    UpcastElementToElement, ViewAttribute, ViewElementCreator, ViewElementDefinition,
};
pub use mapper::{Mapper, ModelToViewHook, ViewToModelHook};
pub use registry::{Conversion, ConversionGroup, DowncastHelpers, HandlerTable, UpcastHelpers};
pub use upcast::{UpcastApi, UpcastData, UpcastDispatcher, UpcastHandler};
