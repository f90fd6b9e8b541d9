//! Length-prefixed framing of bus messages over a byte stream.
//!
//! Frame layout (big-endian):
//! ```text
//! ┌──────────────┬────────────────┬─────────┬───────────┐
//! │ topic_len u32│ payload_len u32│  topic  │  payload  │
//! └──────────────┴────────────────┴─────────┴───────────┘
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{BusError, Message, Result};

/// Upper bound on topic plus payload size of a single frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 8;

/// Write one message as a frame.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = message.topic.len() + message.payload.len();
    if len > MAX_FRAME_LEN {
        return Err(BusError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&(message.topic.len() as u32).to_be_bytes());
    header[4..].copy_from_slice(&(message.payload.len() as u32).to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&message.topic).await?;
    writer.write_all(&message.payload).await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream between frames. A stream that
/// ends mid-frame is an `UnexpectedEof` I/O error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} header bytes", filled, HEADER_LEN),
                )
                .into())
            }
            n => filled += n,
        }
    }

    let topic_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let payload_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let len = topic_len + payload_len;
    if len > MAX_FRAME_LEN {
        return Err(BusError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    let mut body: Bytes = body.freeze();
    let payload = body.split_off(topic_len);

    Ok(Some(Message {
        topic: body,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_read_back_in_order() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, &Message::new(&b"/a/"[..], &b"one"[..]))
            .await
            .unwrap();
        write_frame(&mut client, &Message::new(&b"/b/"[..], Bytes::new()))
            .await
            .unwrap();
        drop(client);

        let first = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&first.topic[..], b"/a/");
        assert_eq!(&first.payload[..], b"one");

        let second = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&second.topic[..], b"/b/");
        assert!(second.payload.is_empty());

        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        // Header announces 10 topic bytes, only 2 follow.
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        client.write_all(b"/a").await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, BusError::Io(_)));
    }

    #[tokio::test]
    async fn test_truncated_header_is_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[0u8, 0, 0]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        match err {
            BusError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, BusError::FrameTooLarge { .. }));
    }
}
