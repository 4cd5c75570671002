//! Multi-frame message framing.
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────┬──────────────┬─────────┬───
//! │ frame count  │ frame 0 len  │ frame 0 │ frame 1 len  │ frame 1 │ ...
//! │ u32 BE       │ u32 BE       │ bytes   │ u32 BE       │ bytes   │
//! └──────────────┴──────────────┴─────────┴──────────────┴─────────┴───
//! ```
//!
//! Payload bytes are passed through untouched.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Result, TransportError};
use crate::packet::Frames;

/// Largest single frame accepted from a peer.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Largest frame count accepted in one message.
pub const MAX_FRAMES: usize = 1024;

/// Reject messages that exceed the frame count or frame size caps.
pub fn check(frames: &[Bytes]) -> Result<()> {
    if frames.len() > MAX_FRAMES {
        return Err(TransportError::TooManyFrames(frames.len()));
    }
    match frames.iter().find(|frame| frame.len() > MAX_FRAME_SIZE) {
        Some(frame) => Err(TransportError::FrameTooLarge(frame.len())),
        None => Ok(()),
    }
}

/// Encode a message into its wire form.
pub fn encode(frames: &[Bytes]) -> Result<Bytes> {
    check(frames)?;

    let body: usize = frames.iter().map(|f| 4 + f.len()).sum();
    let mut buf = BytesMut::with_capacity(4 + body);
    buf.put_u32(frames.len() as u32);
    for frame in frames {
        buf.put_u32(frame.len() as u32);
        buf.put_slice(frame);
    }
    Ok(buf.freeze())
}

/// Write one message.
pub async fn write_message<W>(writer: &mut W, frames: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode(frames)?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message.
///
/// Returns `Ok(None)` on a clean end of stream between messages. A stream
/// that ends partway through the count header is an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Frames>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {filled} header bytes"),
                )
                .into())
            }
            n => filled += n,
        }
    }
    let count = u32::from_be_bytes(header) as usize;
    if count > MAX_FRAMES {
        return Err(TransportError::TooManyFrames(count));
    }

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(len));
        }
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        frames.push(Bytes::from(frame));
    }

    Ok(Some(frames))
}
