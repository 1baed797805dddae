//! Domain models shared across the operator.

pub mod asset;
pub mod event;
pub mod position;

pub use asset::Asset;
pub use event::{AssetAddEvent, PositionCreationEvent};
pub use position::Position;
