//! Length-prefixed framing.
//!
//! ```text
//! | length (4, big-endian) | CBOR-encoded Message |
//! ```
//!
//! Blocking and async readers share the same format, so a client using
//! `std::net` talks to a replica running on tokio.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Message;
use shoplist_codec::{from_cbor, to_cbor};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encodes `msg` into a complete frame, prefix included.
///
/// # Errors
///
/// Encoding failures or a body above [`MAX_FRAME_SIZE`].
pub fn encode_frame(msg: &Message) -> ProtocolResult<Vec<u8>> {
    let body = to_cbor(msg)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    // Bounded by MAX_FRAME_SIZE above
    let len = body.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body (without prefix).
///
/// # Errors
///
/// The body is not a valid [`Message`].
pub fn decode_body(body: &[u8]) -> ProtocolResult<Message> {
    Ok(from_cbor(body)?)
}

fn check_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

fn truncated(err: io::Error) -> ProtocolError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::Truncated
    } else {
        ProtocolError::Io(err)
    }
}

/// Writes one frame to a blocking stream.
///
/// # Errors
///
/// Encoding or I/O errors.
pub fn write_frame<W: Write>(writer: &mut W, msg: &Message) -> ProtocolResult<()> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame from a blocking stream.
///
/// Returns `Ok(None)` if the stream ended cleanly at a frame boundary.
///
/// # Errors
///
/// I/O errors, an oversized or truncated frame, or an undecodable body.
pub fn read_frame<R: Read>(reader: &mut R) -> ProtocolResult<Option<Message>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(ProtocolError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = check_len(prefix)?;
    // Grow with the bytes that actually arrive, not with the announced length
    let mut body = Vec::new();
    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut body)
        .map_err(truncated)?;
    if body.len() != len {
        return Err(ProtocolError::Truncated);
    }
    decode_body(&body).map(Some)
}

/// Writes one frame to an async stream.
///
/// # Errors
///
/// Encoding or I/O errors.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> ProtocolResult<()> {
    let frame = encode_frame(msg)?;
    write_raw_frame_async(writer, &frame).await
}

/// Writes an already encoded frame to an async stream.
///
/// # Errors
///
/// I/O errors.
pub async fn write_raw_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> ProtocolResult<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame from an async stream.
///
/// Returns `Ok(None)` if the stream ended cleanly at a frame boundary.
///
/// # Errors
///
/// I/O errors, an oversized or truncated frame, or an undecodable body.
pub async fn read_frame_async<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> ProtocolResult<Option<Message>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::Truncated);
        }
        filled += n;
    }

    let len = check_len(prefix)?;
    let mut body = Vec::new();
    (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut body)
        .await
        .map_err(truncated)?;
    if body.len() != len {
        return Err(ProtocolError::Truncated);
    }
    decode_body(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_info::NodeInfo;
    use std::io::Cursor;

    fn sample() -> Message {
        Message::gossip_nodes(
            "n0",
            42,
            vec![NodeInfo {
                node_id: "n0".into(),
                host: "127.0.0.1".into(),
                shard_id: 1,
                client_port: 1,
                gossip_pull_port: 2,
                discovery_pull_port: 3,
                last_seen_ts: 42,
            }],
        )
    }

    #[test]
    fn frame_has_big_endian_prefix() {
        let frame = encode_frame(&sample()).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn blocking_stream_of_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &sample()).unwrap();
        write_frame(&mut buf, &Message::get_nodes("c", 1)).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(sample()));
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Some(Message::get_nodes("c", 1))
        );
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn truncated_body_is_reported() {
        let frame = encode_frame(&sample()).unwrap();
        let mut cursor = Cursor::new(frame[..frame.len() - 3].to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Truncated)
        ));

        let mut cursor = Cursor::new(frame[..2].to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn oversized_prefix_is_rejected_before_allocating() {
        let prefix = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        let mut cursor = Cursor::new(prefix.to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn short_body_behind_large_prefix_is_truncated() {
        let mut frame = (MAX_FRAME_SIZE as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 16]);
        let mut cursor = Cursor::new(frame);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Truncated)
        ));
    }

    #[tokio::test]
    async fn async_short_body_behind_large_prefix_is_truncated() {
        let mut frame = (MAX_FRAME_SIZE as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 16]);
        let mut reader = frame.as_slice();
        assert!(matches!(
            read_frame_async(&mut reader).await,
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn garbage_body_is_a_codec_error() {
        let mut frame = 3u32.to_be_bytes().to_vec();
        frame.extend_from_slice(&[0xff, 0xff, 0xff]);
        let mut cursor = Cursor::new(frame);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn async_and_blocking_share_format() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &sample()).unwrap();

        let mut reader = buf.as_slice();
        let msg = read_frame_async(&mut reader).await.unwrap();
        assert_eq!(msg, Some(sample()));
        assert_eq!(read_frame_async(&mut reader).await.unwrap(), None);

        let mut out = Vec::new();
        write_frame_async(&mut out, &sample()).await.unwrap();
        assert_eq!(out, buf);
    }
}
