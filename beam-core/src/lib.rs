//! Wire model shared by the beam peer runtime, the relay server and the CLI.

pub mod model;
pub mod relay;

pub use model::*;
pub use relay::{RelayFrame, SIGNAL_EVENT};
