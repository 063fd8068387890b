//! Length-prefixed framing of link-layer frames on an ordered byte stream.
//!
//! ```text
//! offset 0: u16, little-endian  N = payload length (0..=65535)
//! offset 2: N bytes             raw link-layer frame
//! ```
//!
//! There is no magic number, version or trailer. A read that ends before the
//! length field or the payload is complete is a transport failure, never a
//! partial frame.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest frame the length prefix can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Append the wire encoding of `frame` to `dst`.
pub fn encode_into(frame: &[u8], dst: &mut BytesMut) -> Result<(), TransportError> {
    let len = u16::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
        len: frame.len(),
        limit: MAX_FRAME_LEN,
    })?;

    dst.reserve(LENGTH_PREFIX_LEN + frame.len());
    dst.put_u16_le(len);
    dst.extend_from_slice(frame);
    Ok(())
}

/// Encode a single frame into a new buffer.
pub fn encode(frame: &[u8]) -> Result<Bytes, TransportError> {
    let mut dst = BytesMut::with_capacity(LENGTH_PREFIX_LEN + frame.len());
    encode_into(frame, &mut dst)?;
    Ok(dst.freeze())
}

/// Read exactly one frame from `reader` into `buf`, replacing its contents.
///
/// Blocks until the whole message has arrived or the stream fails.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let read = read_full(reader, &mut prefix)
        .await
        .map_err(|e| TransportError::io("read from stream", e))?;
    if read < LENGTH_PREFIX_LEN {
        return Err(TransportError::ShortLengthRead { read });
    }

    let expected = u16::from_le_bytes(prefix) as usize;
    buf.clear();
    buf.resize(expected, 0);

    let read = read_full(reader, &mut buf[..])
        .await
        .map_err(|e| TransportError::io("read payload", e))?;
    if read < expected {
        return Err(TransportError::ShortPayloadRead { read, expected });
    }

    Ok(())
}

/// Read exactly one frame from `reader`.
pub async fn decode<R>(reader: &mut R) -> Result<Bytes, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::new();
    read_frame(reader, &mut buf).await?;
    Ok(buf.freeze())
}

/// Encode `frame` into `scratch` and write it to `writer` as one message.
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &[u8],
    scratch: &mut BytesMut,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    scratch.clear();
    encode_into(frame, scratch)?;

    writer
        .write_all(scratch)
        .await
        .map_err(|e| TransportError::io("write to stream", e))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::io("write to stream", e))
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF.
///
/// `read_exact` would hide the count, which the short-read errors report.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
