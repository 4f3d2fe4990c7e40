//! Radar control protocol.
//!
//! This module defines the binary protocol spoken by the radar module over UDP:
//! the catalog of message kinds, the field codec, the typed requests and
//! decoded records, the registry tying kinds to their codecs, and the
//! datagram transport.
//!
//! # Binary Format
//!
//! Every datagram carries exactly one packet:
//!
//! - A 4-byte header: the message kind and the message id, both `u16`.
//! - The payload, a concatenation of fixed-width fields laid out per message kind.
//! - All integers are big-endian two's-complement.
//!
//! Scan telemetry larger than one datagram is split by the radar itself; each
//! fragment carries its index and the fragment count in its payload. The
//! transport never splits or joins datagrams.
//!
//! # Key Components
//!
//! - [`MessageKind`]: wire code and symbolic name of every message.
//! - [`Request`] / [`Response`]: typed outgoing requests and decoded records.
//! - [`Registry`]: immutable table of encoders, decoders and expected confirmations.
//! - [`ProtocolTransport`]: header framing over a [`Datagram`] channel.
//!
//! # See Also
//!
//! - [`session`](crate::session): drives the protocol and reassembles telemetry.
pub mod codec;
mod kind;
mod registry;
mod request;
mod response;
mod transport;

pub use codec::CodecError;
pub use kind::MessageKind;
pub use registry::{KindKey, Registry, RegistryEntry};
pub use request::{
    CONTINUOUS_SCAN, Encoder, FilterConfig, RadarConfig, Request, SLEEP_MODE_ACTIVE, SLEEP_MODE_IDLE,
};
pub use response::{ConfigConfirm, Decoder, GenericError, Response, ScanInfo, StatusInfo};
pub use transport::{
    Datagram, Header, MAX_DATAGRAM_SIZE, MemoryDatagram, Packet, ProtocolTransport,
    RECEIVE_TIMEOUT, TransportError,
};
