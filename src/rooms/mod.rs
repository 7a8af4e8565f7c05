//! Room routing for connections

pub mod manager;

pub use manager::{RoomError, RoomManager};
