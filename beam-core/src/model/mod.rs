mod file;
mod peer;
mod signaling;

pub use file::FileHeader;
pub use peer::{PeerId, PeerRecord};
pub use signaling::{
    FileOffer, IceCandidate, IceServerConfig, OfferSender, SdpKind, SessionDescription,
    SignalEnvelope, SignalPayload,
};
