use crate::negotiation::OfferId;
use crate::session::SessionError;
use crate::store::FileHandle;
use beam_core::{FileOffer, PeerId, PeerRecord};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests from a [`SessionHandle`](crate::session::SessionHandle) to the session loop.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Initiate {
        target: PeerId,
        file: FileHandle,
        reply: Reply<OfferId>,
    },
    Accept {
        from: PeerId,
        reply: Reply<FileOffer>,
    },
    Decline {
        from: PeerId,
        reply: Reply<()>,
    },
    Cancel {
        target: PeerId,
        reply: Reply<bool>,
    },
    Peers {
        reply: Reply<Vec<PeerRecord>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}
