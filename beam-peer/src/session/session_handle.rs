use crate::negotiation::{NegotiationError, OfferId};
use crate::relay::RelayError;
use crate::session::SessionCommand;
use crate::session::session_command::Reply;
use crate::store::FileHandle;
use beam_core::{FileOffer, PeerId, PeerRecord};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("peer {0} is not present")]
    UnknownPeer(PeerId),

    #[error("a transfer with {0} is still in progress")]
    TransferInProgress(PeerId),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("session is not running")]
    Closed,
}

/// Cloneable front door to a running [`Session`](crate::session::Session).
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Offer `file` to `target`. Completion is reported through session events.
    pub async fn initiate(
        &self,
        target: impl Into<PeerId>,
        file: FileHandle,
    ) -> Result<OfferId, SessionError> {
        let target = target.into();
        self.request(|reply| SessionCommand::Initiate {
            target,
            file,
            reply,
        })
        .await
    }

    pub async fn accept(&self, from: impl Into<PeerId>) -> Result<FileOffer, SessionError> {
        let from = from.into();
        self.request(|reply| SessionCommand::Accept { from, reply })
            .await
    }

    pub async fn decline(&self, from: impl Into<PeerId>) -> Result<(), SessionError> {
        let from = from.into();
        self.request(|reply| SessionCommand::Decline { from, reply })
            .await
    }

    /// Abandon the offer or transfer to `target`. Returns whether anything was cancelled.
    pub async fn cancel(&self, target: impl Into<PeerId>) -> Result<bool, SessionError> {
        let target = target.into();
        self.request(|reply| SessionCommand::Cancel { target, reply })
            .await
    }

    pub async fn peers(&self) -> Result<Vec<PeerRecord>, SessionError> {
        self.request(|reply| SessionCommand::Peers { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Shutdown { reply })
            .await
    }
}
