//! Length-prefixed typed frames.
//!
//! A frame is a `u32` big-endian length followed by a single type byte and
//! the payload. The length counts the type byte plus the payload, so an
//! empty payload still yields a length of 1.

use crate::error::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted frame body (type byte + payload) on a stream.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum payload that fits an unreliable datagram frame. One byte of the
/// 1200-byte datagram budget is reserved for the frame type.
pub const MAX_DATAGRAM_PAYLOAD: usize = 1199;

/// Frame type discriminator carried in the first payload byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Unrecognized frame; dropped by the dispatcher
    Unknown = 0,
    /// Mutual authentication challenge/response
    Handshake = 1,
    /// Flood-gossip envelope
    Gossip = 2,
    /// Liveness probe
    Ping = 3,
    /// End-to-end encrypted chat envelope
    ChatMessage = 4,
    /// Payload delivered over an unreliable datagram
    Datagram = 5,
    /// Peer directory request
    GetPeerRequest = 6,
    /// Peer directory response
    GetPeerResponse = 7,
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameType::Handshake,
            2 => FrameType::Gossip,
            3 => FrameType::Ping,
            4 => FrameType::ChatMessage,
            5 => FrameType::Datagram,
            6 => FrameType::GetPeerRequest,
            7 => FrameType::GetPeerResponse,
            _ => FrameType::Unknown,
        }
    }
}

/// Write one frame as a single contiguous write.
///
/// A torn frame would desynchronize the peer's length-prefix parser, so the
/// header and payload are assembled into one buffer before hitting the
/// stream.
pub async fn write_frame<W>(
    writer: &mut W,
    frame_type: FrameType,
    payload: &[u8],
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let body_len = payload.len() + 1;
    if body_len > MAX_FRAME_SIZE {
        return Err(WireError::Size(body_len));
    }

    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_u32(body_len as u32);
    buf.put_u8(frame_type as u8);
    buf.put_slice(payload);

    writer.write_all(&buf).await?;
    Ok(())
}

/// Read exactly one frame: block for the 4-byte length, then the body.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameType, Bytes), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;

    let body_len = u32::from_be_bytes(header) as usize;
    if body_len == 0 {
        return Err(WireError::Empty);
    }
    if body_len > MAX_FRAME_SIZE {
        return Err(WireError::Size(body_len));
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;

    let frame_type = FrameType::from(body[0]);
    let payload = Bytes::from(body).slice(1..);

    Ok((frame_type, payload))
}

/// Encode a frame for an unreliable datagram. Same layout as the stream
/// frame; payloads above [`MAX_DATAGRAM_PAYLOAD`] are refused so the frame
/// never fragments.
pub fn encode_datagram(frame_type: FrameType, payload: &[u8]) -> Result<Bytes, WireError> {
    if payload.len() > MAX_DATAGRAM_PAYLOAD {
        return Err(WireError::DatagramTooLarge(payload.len()));
    }

    let body_len = payload.len() + 1;
    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_u32(body_len as u32);
    buf.put_u8(frame_type as u8);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Decode a datagram frame received in a single packet.
pub fn decode_datagram(datagram: &[u8]) -> Result<(FrameType, Bytes), WireError> {
    if datagram.len() < 5 {
        return Err(WireError::Empty);
    }

    let body_len = u32::from_be_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]) as usize;
    if body_len == 0 || datagram.len() - 4 != body_len {
        return Err(WireError::Empty);
    }

    let frame_type = FrameType::from(datagram[4]);
    Ok((frame_type, Bytes::copy_from_slice(&datagram[5..])))
}
