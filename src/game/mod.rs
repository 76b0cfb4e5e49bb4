//! Game simulation modules

pub mod physics;
pub mod registry;
pub mod snapshot;
pub mod state;

pub use registry::{Room, RoomRegistry, SessionHandle};
pub use state::{Direction, Side, LOCAL_ROOM_ID};
