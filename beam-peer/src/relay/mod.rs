mod memory_relay;
mod relay;
mod relay_adapter;
mod ws_relay;

pub use memory_relay::*;
pub use relay::*;
pub use relay_adapter::*;
pub use ws_relay::*;
