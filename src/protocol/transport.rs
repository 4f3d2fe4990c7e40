use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use log::trace;
use thiserror::Error;

use super::MessageKind;

/// How long a receive blocks before giving up.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest datagram the radar sends.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no datagram received within the receive timeout")]
    ReceiveTimeout,
    #[error("failed to encode header: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode header: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Packet header; `[kind:u16][id:u16]` big-endian.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct Header {
    pub kind: u16,
    pub id: u16,
}

/// A raw received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: u16,
    pub id: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn is(&self, kind: MessageKind) -> bool {
        self.kind == kind.code()
    }
}

/// Datagram-oriented channel to a single peer.
///
/// Implemented by [`UdpSocket`]; tests substitute an in-memory queue.
pub trait Datagram {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Blocks until a datagram arrives. Timeouts surface as
    /// [`io::ErrorKind::WouldBlock`] or [`io::ErrorKind::TimedOut`].
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Datagram for UdpSocket {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

/// In-memory datagram queue. Everything sent is recorded, receives pop the
/// scripted inbox and time out once it is empty.
#[derive(Debug, Default)]
pub struct MemoryDatagram {
    pub inbox: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl Datagram for MemoryDatagram {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = self
            .inbox
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }
}

pub struct ProtocolTransport<D: Datagram> {
    channel: D,
    config: Configuration<BigEndian, Fixint>,
    buf: Vec<u8>,
}

impl ProtocolTransport<UdpSocket> {
    /// Binds an ephemeral local port and associates it with `peer`.
    pub fn connect(peer: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0_u8; 4], 0).into()
        } else {
            ([0_u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        socket.set_read_timeout(Some(RECEIVE_TIMEOUT))?;
        trace!("bound {} for peer {peer}", socket.local_addr()?);

        Ok(Self::new(socket))
    }
}

impl<D: Datagram> ProtocolTransport<D> {
    pub fn new(channel: D) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self {
            channel,
            config,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn channel(&self) -> &D {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut D {
        &mut self.channel
    }

    /// Frames `payload` behind the header and sends it as one datagram.
    pub fn send(&mut self, kind: u16, id: u16, payload: &[u8]) -> Result<usize, TransportError> {
        let mut packet = encode_to_vec(Header { kind, id }, self.config)?;
        packet.extend_from_slice(payload);

        let sent = self.channel.send_datagram(&packet)?;
        trace!("sent {kind:#06x} id={id} ({sent} bytes)");
        Ok(sent)
    }

    /// Receives one datagram, splitting off the header.
    pub fn receive(&mut self) -> Result<Packet, TransportError> {
        let len = match self.channel.recv_datagram(&mut self.buf) {
            Ok(len) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Err(TransportError::ReceiveTimeout);
            }
            Err(e) => return Err(e.into()),
        };

        let (header, read): (Header, usize) = decode_from_slice(&self.buf[..len], self.config)?;
        trace!("received {:#06x} id={} ({len} bytes)", header.kind, header.id);

        Ok(Packet {
            kind: header.kind,
            id: header.id,
            payload: self.buf[read..len].to_vec(),
        })
    }
}
