//! Chunked transfer framing over an open sub-channel.
//!
//! The first message is a UTF-8 JSON [`FileHeader`](beam_core::FileHeader);
//! every following message is a raw binary chunk of at most `chunk_size`
//! bytes, in offset order.

mod file_sender;
mod reassembler;

pub use file_sender::*;
pub use reassembler::*;
