// State store contracts and the in-memory state engine

mod engine;
mod entity;
mod store;

pub use engine::StateEngine;
pub use entity::{EntityState, StateChange};
pub use store::{ChangeEvents, ChangeHandler, StateStore};
