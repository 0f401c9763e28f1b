//! Transport framing for the two channels.
//!
//! The reliable channel is a byte stream: each frame is a packet header
//! followed by the payload size it declares. The datagram channel carries
//! exactly one packet per datagram and enforces [`MAX_DATAGRAM_SIZE`].

use crate::error::ProtocolError;
use crate::packet::{Packet, PacketHeader};
use crate::{HEADER_LEN, MAX_DATAGRAM_SIZE, MAX_RELIABLE_PAYLOAD};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encodes a packet for the datagram channel, refusing anything over the ceiling.
pub fn encode_datagram(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let bytes = packet.encode()?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversize {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(bytes)
}

/// Decodes one datagram. Receive buffers should be `MAX_DATAGRAM_SIZE + 1`
/// bytes long so that a truncated oversize datagram is noticed here.
pub fn decode_datagram(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversize {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Packet::decode(bytes)
}

/// Ordered, reliable packet stream over any async byte stream.
#[derive(Debug)]
pub struct ReliableChannel<S> {
    stream: S,
}

impl<S> ReliableChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), ProtocolError> {
        let bytes = packet.encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads the next packet. `Ok(None)` means the peer closed the stream
    /// cleanly between frames.
    pub async fn recv(&mut self) -> Result<Option<Packet>, ProtocolError> {
        let mut frame = vec![0u8; HEADER_LEN];

        let first = self.stream.read(&mut frame).await?;
        if first == 0 {
            return Ok(None);
        }
        if first < HEADER_LEN {
            self.stream.read_exact(&mut frame[first..]).await?;
        }

        let header = PacketHeader::from_bytes(&frame)?;
        let payload_size = header.payload_size as usize;
        if payload_size > MAX_RELIABLE_PAYLOAD {
            return Err(ProtocolError::malformed(format!(
                "declared payload of {} bytes exceeds {}",
                payload_size, MAX_RELIABLE_PAYLOAD
            )));
        }

        frame.resize(HEADER_LEN + payload_size, 0);
        self.stream.read_exact(&mut frame[HEADER_LEN..]).await?;

        Packet::decode(&frame).map(Some)
    }

    /// Like [`recv`](Self::recv), but treats end-of-stream as a transport error.
    pub async fn recv_expected(&mut self) -> Result<Packet, ProtocolError> {
        self.recv().await?.ok_or_else(|| {
            ProtocolError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))
        })
    }
}
