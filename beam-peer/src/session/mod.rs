mod session;
mod session_command;
mod session_event;
mod session_handle;

pub use session::*;
pub use session_command::*;
pub use session_event::*;
pub use session_handle::*;

pub use crate::negotiation::Direction;
