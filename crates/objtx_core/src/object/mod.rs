//! Object identity, state and data.

mod data;
mod id;
mod state;

pub use data::{DataRecord, PropertyMap, PropertyValue};
pub use id::{ClassId, ObjectId};
pub use state::ObjectState;
