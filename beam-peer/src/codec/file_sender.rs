use crate::transport::ChannelSink;
use anyhow::{Context, Result, ensure};
use beam_core::FileHeader;
use bytes::Bytes;
use tracing::debug;

/// Number of chunks a payload of `size` bytes is split into.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    size.div_ceil(chunk_size as u64)
}

/// Zero-copy split of `payload` into consecutive chunks.
pub fn split_chunks(payload: &Bytes, chunk_size: usize) -> impl Iterator<Item = Bytes> + '_ {
    (0..payload.len())
        .step_by(chunk_size.max(1))
        .map(move |start| payload.slice(start..(start + chunk_size).min(payload.len())))
}

/// Streams `payload` over `sink`: header first, then chunks in offset order.
///
/// Chunk *n+1* is not submitted until the sink has accepted chunk *n* and
/// reports room for the next one. Chunks are cut down to the sink's message
/// size limit. `progress` is called with `(bytes_sent, total)` after every
/// chunk, and the call returns only once the sink has flushed.
pub async fn send_file<F>(
    sink: &dyn ChannelSink,
    header: &FileHeader,
    payload: Bytes,
    chunk_size: usize,
    mut progress: F,
) -> Result<u64>
where
    F: FnMut(u64, u64) + Send,
{
    ensure!(chunk_size > 0, "chunk size must be positive");
    ensure!(
        payload.len() as u64 == header.size,
        "payload is {} bytes but header declares {}",
        payload.len(),
        header.size
    );

    let chunk_size = match sink.max_message_size() {
        Some(max) if max < chunk_size => {
            debug!("Chunk size {} capped at {} by '{}'", chunk_size, max, sink.label());
            max
        }
        _ => chunk_size,
    };
    debug!(
        "Sending '{}' in {} chunks",
        header.name,
        chunk_count(header.size, chunk_size)
    );

    let header_json = header.to_json().context("Failed to encode transfer header")?;
    sink.ready_for(header_json.len()).await?;
    sink.send_text(&header_json)
        .await
        .context("Failed to send transfer header")?;

    let mut sent = 0u64;
    for (index, chunk) in split_chunks(&payload, chunk_size).enumerate() {
        let len = chunk.len();
        sink.ready_for(len).await?;
        sink.send_binary(chunk)
            .await
            .with_context(|| format!("Failed to send chunk {}", index))?;

        sent += len as u64;
        debug!("Sent chunk {} ({} bytes, {}/{})", index, len, sent, header.size);
        progress(sent, header.size);
    }

    sink.flush().await.context("Failed to flush the sub-channel")?;
    Ok(sent)
}
