use crate::transport::ChannelMessage;
use beam_core::FileHeader;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("binary data arrived before the transfer header")]
    ChunkBeforeHeader,

    #[error("malformed transfer header: {0}")]
    MalformedHeader(String),

    #[error("chunk of {chunk} bytes overflows declared size {declared} ({received} already received)")]
    Overflow {
        declared: u64,
        received: u64,
        chunk: u64,
    },

    #[error("data arrived after the transfer completed")]
    AfterCompletion,
}

/// A file reconstructed from its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub header: FileHeader,
    pub data: Bytes,
}

/// Receiver-side progress of one transfer.
#[derive(Debug)]
pub struct TransferState {
    pub header: FileHeader,
    pub received_bytes: u64,
    chunks: Vec<Bytes>,
}

impl TransferState {
    fn new(header: FileHeader) -> Self {
        Self {
            header,
            received_bytes: 0,
            chunks: Vec::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn finalize(self) -> ReceivedFile {
        let mut data = BytesMut::with_capacity(self.received_bytes as usize);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        ReceivedFile {
            header: self.header,
            data: data.freeze(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Started(FileHeader),
    Progress { received: u64, total: u64 },
    Completed(ReceivedFile),
}

#[derive(Debug)]
enum Phase {
    AwaitingHeader,
    Receiving(TransferState),
    Finished,
}

/// Rebuilds one file from the messages of a single sub-channel.
///
/// Once a violation is reported or the file completes, every further message
/// is rejected.
#[derive(Debug)]
pub struct Reassembler {
    phase: Phase,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingHeader,
        }
    }

    pub fn transfer(&self) -> Option<&TransferState> {
        match &self.phase {
            Phase::Receiving(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    /// Whether a header arrived and the payload is still incomplete.
    pub fn in_progress(&self) -> bool {
        matches!(self.phase, Phase::Receiving(_))
    }

    pub fn push(&mut self, message: ChannelMessage) -> Result<ReceiveOutcome, ProtocolViolation> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Finished => Err(ProtocolViolation::AfterCompletion),

            Phase::AwaitingHeader => {
                if !message.is_text {
                    return Err(ProtocolViolation::ChunkBeforeHeader);
                }
                let header = FileHeader::from_json(&message.data)
                    .map_err(|e| ProtocolViolation::MalformedHeader(e.to_string()))?;
                debug!("Transfer header: {} ({} bytes)", header.name, header.size);

                if header.size == 0 {
                    return Ok(ReceiveOutcome::Completed(ReceivedFile {
                        header,
                        data: Bytes::new(),
                    }));
                }
                self.phase = Phase::Receiving(TransferState::new(header.clone()));
                Ok(ReceiveOutcome::Started(header))
            }

            Phase::Receiving(mut state) => {
                let chunk = message.data;
                let len = chunk.len() as u64;
                if state.received_bytes + len > state.header.size {
                    return Err(ProtocolViolation::Overflow {
                        declared: state.header.size,
                        received: state.received_bytes,
                        chunk: len,
                    });
                }

                state.received_bytes += len;
                if !chunk.is_empty() {
                    state.chunks.push(chunk);
                }

                if state.received_bytes == state.header.size {
                    return Ok(ReceiveOutcome::Completed(state.finalize()));
                }

                let outcome = ReceiveOutcome::Progress {
                    received: state.received_bytes,
                    total: state.header.size,
                };
                self.phase = Phase::Receiving(state);
                Ok(outcome)
            }
        }
    }
}
