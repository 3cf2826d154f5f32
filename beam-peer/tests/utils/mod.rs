pub mod event_helpers;
pub mod mock_transport;

pub use event_helpers::*;
pub use mock_transport::*;
