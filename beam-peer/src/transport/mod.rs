mod peer_transport;
mod transport_config;
mod transport_event;
mod transport_manager;
mod webrtc_transport;

pub use peer_transport::*;
pub use transport_config::*;
pub use transport_event::*;
pub use transport_manager::*;
pub use webrtc_transport::*;
