//! Game simulation modules

pub mod broadcast;
pub mod combat;
pub mod entities;
pub mod r#match;
pub mod room;
pub mod snapshot;
pub mod wave;
pub mod world;

pub use entities::ConnId;
pub use r#match::JoinOutcome;
pub use room::{Room, RoomCommand, RoomHandle, RoomRegistry};
