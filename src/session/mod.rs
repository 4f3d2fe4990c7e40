//! Communication session with one radar.
//!
//! A [`Session`] owns the transport, a shared [`Registry`] and the reassembly
//! state, and runs the radar's two modes of exchange:
//!
//! - **Sync**: one request at a time, answered by exactly one correlated
//!   confirmation ([`Session::request_sync`]).
//! - **Async**: while a scan is running the radar streams fragmented telemetry;
//!   an external driver calls [`Session::pump_once`] repeatedly to pull one
//!   datagram at a time and collect completed [`Frame`]s.
//!
//! The session never spawns threads or loops on its own. The only blocking
//! point is the transport receive, bounded by the receive timeout. Waiting for
//! a confirmation is bounded by the same timeout in total, however many
//! unrelated datagrams arrive meanwhile.
//!
//! # Failure model
//!
//! Recoverable failures (timeouts, rejections, decode errors) are returned to
//! the caller. A radar fault or a broken id correlation latches the session
//! into a terminated state: every later call fails with
//! [`SessionError::Terminated`] until [`Session::reset`] is called.
mod reassembly;

use std::{
    collections::VecDeque,
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    time::Instant,
};

use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::protocol::{
    CONTINUOUS_SCAN, CodecError, ConfigConfirm, Datagram, MessageKind, Packet,
    ProtocolTransport, RECEIVE_TIMEOUT, RadarConfig, Registry, Request, Response,
    SLEEP_MODE_ACTIVE, SLEEP_MODE_IDLE, StatusInfo, TransportError,
};

pub use reassembly::{FragmentBucket, FragmentStore, Frame, Ingested, STALENESS_WINDOW};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("radar rejected message {target_kind:#06x} id={target_id}: error code {code}")]
    PeerRejected {
        target_kind: u16,
        target_id: u16,
        code: u32,
    },

    #[error("internal radar fault, error code {code}")]
    PeerFault { code: u32 },

    #[error("{kind} echoed id {received}, expected {expected}")]
    CorrelationMismatch {
        kind: MessageKind,
        expected: u16,
        received: u16,
    },

    #[error("request id={0} is still awaiting its confirmation")]
    RequestPending(u16),

    #[error("message ids exhausted, the session must be reset")]
    MessageIdsExhausted,

    #[error("session terminated: {0}")]
    Terminated(String),

    #[error("{kind} failed with status {status}")]
    CommandFailed { kind: MessageKind, status: u32 },

    #[error("invalid scan count {0}")]
    InvalidScanCount(u16),

    #[error("radar reports sleep mode {actual}, expected {expected}")]
    ModeNotApplied { expected: u32, actual: u32 },

    #[error("unexpected response {0:?}")]
    UnexpectedResponse(Option<MessageKind>),
}

impl SessionError {
    /// Unrecoverable errors end the session.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SessionError::PeerFault { .. }
                | SessionError::CorrelationMismatch { .. }
                | SessionError::Terminated(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Sync,
    Async,
}

/// The one outstanding synchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCorrelation {
    pub id: u16,
    pub expected: MessageKind,
}

pub struct Session<D: Datagram> {
    transport: ProtocolTransport<D>,
    registry: Arc<Registry>,
    mode: SessionMode,
    last_id: u16,
    pending: Option<PendingCorrelation>,
    fragments: FragmentStore,
    frames: VecDeque<Frame>,
    shutting_down: bool,
    ready_seen: bool,
    terminated: Option<String>,
}

impl Session<UdpSocket> {
    /// Opens a UDP session with the radar at `peer`.
    pub fn connect(peer: SocketAddr, registry: Arc<Registry>) -> Result<Self, SessionError> {
        info!("connecting to radar at {peer}");
        Ok(Self::new(ProtocolTransport::connect(peer)?, registry))
    }
}

impl<D: Datagram> Session<D> {
    pub fn new(transport: ProtocolTransport<D>, registry: Arc<Registry>) -> Self {
        Self {
            transport,
            registry,
            mode: SessionMode::Sync,
            last_id: 0,
            pending: None,
            fragments: FragmentStore::new(),
            frames: VecDeque::new(),
            shutting_down: false,
            ready_seen: false,
            terminated: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn pending(&self) -> Option<PendingCorrelation> {
        self.pending
    }

    /// A confirmation ending the scan arrived while streaming.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_some()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn transport(&self) -> &ProtocolTransport<D> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut ProtocolTransport<D> {
        &mut self.transport
    }

    /// Completed frames, in completion order.
    pub fn frames(&self) -> &VecDeque<Frame> {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<Frame> {
        self.frames.drain(..).collect()
    }

    pub fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    /// Clears all acquisition state and message ids and returns to Sync mode.
    /// This is the only way out of a terminated session.
    pub fn reset(&mut self) {
        info!(
            "resetting session; dropping {} frames and {} partial scans",
            self.frames.len(),
            self.fragments.len()
        );
        self.mode = SessionMode::Sync;
        self.last_id = 0;
        self.pending = None;
        self.fragments.clear();
        self.frames.clear();
        self.shutting_down = false;
        self.ready_seen = false;
        self.terminated = None;
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        match &self.terminated {
            Some(reason) => Err(SessionError::Terminated(reason.clone())),
            None => Ok(()),
        }
    }

    /// Latches the session if `err` is unrecoverable.
    fn fail(&mut self, err: SessionError) -> SessionError {
        if !err.is_recoverable() {
            error!("session terminated: {err}");
            self.terminated = Some(err.to_string());
        }
        err
    }

    fn next_id(&mut self) -> Result<u16, SessionError> {
        let id = self
            .last_id
            .checked_add(1)
            .ok_or(SessionError::MessageIdsExhausted)?;
        self.last_id = id;
        Ok(id)
    }

    /// Sends `request` and, unless `no_reply` is set or the kind expects no
    /// confirmation, blocks until the matching confirmation arrives.
    ///
    /// Only one request may await its confirmation at a time; a request left
    /// pending by a receive timeout must be resolved with
    /// [`Session::await_pending`] or dropped with [`Session::abandon_pending`].
    pub fn request_sync(
        &mut self,
        request: &Request,
        no_reply: bool,
    ) -> Result<Response, SessionError> {
        self.ensure_usable()?;
        if let Some(pending) = self.pending {
            return Err(SessionError::RequestPending(pending.id));
        }

        let kind = request.kind();
        let (encode, expected) = self.registry.outgoing(kind)?;
        let payload = encode(request)?;
        let id = self.next_id()?;

        self.transport.send(kind.code(), id, &payload)?;
        debug!("sent {kind} id={id}");

        match expected {
            Some(expected) if !no_reply => {
                self.pending = Some(PendingCorrelation { id, expected });
                self.await_pending()
            }
            _ => Ok(Response::Empty),
        }
    }

    /// Issues the request named `name` with its default parameters.
    pub fn request_named(&mut self, name: &str, no_reply: bool) -> Result<Response, SessionError> {
        let (kind, _) = self.registry.lookup(name)?;
        let request = Request::with_defaults(kind)?;
        self.request_sync(&request, no_reply)
    }

    /// Waits for the confirmation of the pending request. Packets of any other
    /// kind are discarded; generic error notifications are always inspected.
    ///
    /// Gives up with [`TransportError::ReceiveTimeout`] once the receive
    /// timeout has elapsed, leaving the request pending.
    pub fn await_pending(&mut self) -> Result<Response, SessionError> {
        self.ensure_usable()?;
        let Some(pending) = self.pending else {
            return Ok(Response::Empty);
        };

        let started = Instant::now();
        loop {
            if started.elapsed() >= RECEIVE_TIMEOUT {
                debug!("gave up awaiting {} id={}", pending.expected, pending.id);
                return Err(TransportError::ReceiveTimeout.into());
            }
            let packet = self.transport.receive()?;

            if packet.is(MessageKind::GenericError) {
                self.pending = None;
                return Err(self.generic_error(&packet, pending));
            }

            if packet.is(pending.expected) {
                self.pending = None;
                if packet.id != pending.id {
                    return Err(self.fail(SessionError::CorrelationMismatch {
                        kind: pending.expected,
                        expected: pending.id,
                        received: packet.id,
                    }));
                }
                debug!("received {} id={}", pending.expected, packet.id);
                return Ok(self.registry.decode(pending.expected, &packet.payload)?);
            }

            if packet.is(MessageKind::ReadyInfo) {
                self.ready_seen = true;
            }
            trace!(
                "discarding {:#06x} id={} while awaiting {}",
                packet.kind, packet.id, pending.expected
            );
        }
    }

    /// Forgets the pending request, returning it. A confirmation that still
    /// arrives for it will break correlation of the next request.
    pub fn abandon_pending(&mut self) -> Option<PendingCorrelation> {
        let pending = self.pending.take();
        if let Some(p) = pending {
            warn!("abandoned request id={} awaiting {}", p.id, p.expected);
        }
        pending
    }

    /// Converts a generic error notification received in place of a
    /// confirmation into the matching session error.
    fn generic_error(&mut self, packet: &Packet, pending: PendingCorrelation) -> SessionError {
        let error = match self.registry.decode(MessageKind::GenericError, &packet.payload) {
            Ok(Response::Error(error)) => error,
            Ok(other) => return SessionError::UnexpectedResponse(other.kind()),
            Err(e) => return e.into(),
        };

        if error.internal {
            return self.fail(SessionError::PeerFault { code: error.code });
        }
        if packet.id != pending.id {
            return self.fail(SessionError::CorrelationMismatch {
                kind: MessageKind::GenericError,
                expected: pending.id,
                received: packet.id,
            });
        }

        warn!(
            "radar rejected message {:#06x} id={} with error code {}",
            error.target_kind, error.target_id, error.code
        );
        SessionError::PeerRejected {
            target_kind: error.target_kind,
            target_id: error.target_id,
            code: error.code,
        }
    }

    /// Pulls at most one datagram while streaming and files it for
    /// reassembly. Returns `false` once the stream has gone quiet (receive
    /// timeout) or `max_frames` completed frames are queued.
    pub fn pump_once(&mut self, max_frames: usize) -> Result<bool, SessionError> {
        self.ensure_usable()?;
        if self.mode != SessionMode::Async {
            warn!("pump_once called outside of async mode");
            return Ok(false);
        }

        let packet = match self.transport.receive() {
            Ok(packet) => packet,
            Err(TransportError::ReceiveTimeout) => {
                debug!("telemetry stream went quiet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        match MessageKind::try_from(packet.kind) {
            Ok(MessageKind::ScanInfo) => {}
            Ok(MessageKind::SetSleepModeConfirm | MessageKind::ControlConfirm) => {
                debug!("scan ending; draining remaining telemetry");
                self.shutting_down = true;
                return Ok(true);
            }
            Ok(MessageKind::GenericError) => {
                match self.registry.decode(MessageKind::GenericError, &packet.payload) {
                    Ok(Response::Error(error)) if error.internal => {
                        return Err(self.fail(SessionError::PeerFault { code: error.code }));
                    }
                    Ok(Response::Error(error)) => warn!(
                        "radar rejected message {:#06x} id={} with error code {}",
                        error.target_kind, error.target_id, error.code
                    ),
                    other => warn!("unreadable error notification: {other:?}"),
                }
                return Ok(true);
            }
            _ => {
                trace!("ignoring {:#06x} while streaming", packet.kind);
                return Ok(true);
            }
        }

        let info = match self.registry.decode(MessageKind::ScanInfo, &packet.payload) {
            Ok(Response::Scan(info)) => info,
            other => {
                warn!("dropped malformed scan fragment: {other:?}");
                return Ok(true);
            }
        };

        if let Some(frame) = self.fragments.ingest(info).frame {
            trace!(
                "scan {} complete with {} samples",
                frame.timestamp,
                frame.samples.len()
            );
            self.frames.push_back(frame);
        }

        Ok(self.frames.len() < max_frames)
    }

    /// Starts scanning and switches to Async mode. A count of
    /// [`CONTINUOUS_SCAN`] scans until stopped.
    pub fn start_scan(&mut self, scan_count: u16, scan_interval: u32) -> Result<(), SessionError> {
        if scan_count == 0 {
            return Err(SessionError::InvalidScanCount(scan_count));
        }
        if scan_count == CONTINUOUS_SCAN {
            warn!("starting in continuous mode");
        }

        let response = self.request_sync(
            &Request::Control {
                scan_count,
                scan_interval,
            },
            false,
        )?;
        expect_success(MessageKind::ControlRequest, &response)?;

        info!("scanning: count={scan_count} interval={scan_interval}us");
        self.mode = SessionMode::Async;
        self.shutting_down = false;
        Ok(())
    }

    /// Pumps until [`Session::pump_once`] reports done, then returns to Sync
    /// mode whether or not pumping failed.
    fn pump_to_sync(&mut self, max_frames: usize) -> Result<(), SessionError> {
        let pumped = loop {
            match self.pump_once(max_frames) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.mode = SessionMode::Sync;
        self.shutting_down = false;
        pumped
    }

    /// Consumes in-flight datagrams until the receive timeout, keeping any
    /// frames they complete, then returns to Sync mode.
    pub fn drain(&mut self) -> Result<(), SessionError> {
        self.mode = SessionMode::Async;
        self.pump_to_sync(usize::MAX)?;
        debug!("drained; {} frames queued", self.frames.len());
        Ok(())
    }

    /// Stops a running scan with a zero-count control request and drains
    /// whatever is still in flight.
    pub fn stop_scan(&mut self) -> Result<(), SessionError> {
        self.mode = SessionMode::Sync;
        let response = self.request_sync(
            &Request::Control {
                scan_count: 0,
                scan_interval: 0,
            },
            false,
        )?;
        expect_success(MessageKind::ControlRequest, &response)?;

        info!("scan stopped");
        self.drain()
    }

    /// Runs a scan of `scan_count` scans to completion and returns the frames
    /// it produced.
    pub fn exec_scan(
        &mut self,
        scan_count: u16,
        scan_interval: u32,
    ) -> Result<Vec<Frame>, SessionError> {
        let target = self.frames.len() + scan_count as usize;
        self.start_scan(scan_count, scan_interval)?;
        self.pump_to_sync(target)?;

        info!("scan finished with {} frames", self.frames.len());
        Ok(self.take_frames())
    }

    /// Applies `config` and reads back what the radar actually uses.
    pub fn init_radar(&mut self, config: &RadarConfig) -> Result<ConfigConfirm, SessionError> {
        info!("setting configuration");
        let response = self.request_sync(&Request::SetConfig(config.clone()), false)?;
        expect_success(MessageKind::SetConfigRequest, &response)?;

        info!("reading back configuration");
        match self.request_sync(&Request::GetConfig, false)? {
            Response::Config(confirm) => Ok(confirm),
            other => Err(SessionError::UnexpectedResponse(other.kind())),
        }
    }

    pub fn status_info(&mut self) -> Result<StatusInfo, SessionError> {
        match self.request_sync(&Request::GetStatusInfo, false)? {
            Response::StatusInfo(info) => Ok(info),
            other => Err(SessionError::UnexpectedResponse(other.kind())),
        }
    }

    pub fn sleep(&mut self) -> Result<(), SessionError> {
        info!("putting radar to sleep");
        let response = self.request_sync(
            &Request::SetSleepMode {
                mode: SLEEP_MODE_IDLE,
            },
            false,
        )?;
        expect_success(MessageKind::SetSleepModeRequest, &response)?;
        self.confirm_sleep_mode(SLEEP_MODE_IDLE)
    }

    /// Wakes the radar and waits for its ready notification.
    pub fn wake(&mut self) -> Result<(), SessionError> {
        info!("waking radar");
        self.ready_seen = false;
        let response = self.request_sync(
            &Request::SetSleepMode {
                mode: SLEEP_MODE_ACTIVE,
            },
            false,
        )?;
        expect_success(MessageKind::SetSleepModeRequest, &response)?;

        // The ready notification can overtake the confirmation.
        let started = Instant::now();
        while !self.ready_seen {
            if started.elapsed() >= RECEIVE_TIMEOUT {
                return Err(TransportError::ReceiveTimeout.into());
            }
            let packet = self.transport.receive()?;
            if packet.is(MessageKind::ReadyInfo) {
                self.ready_seen = true;
            } else {
                trace!("discarding {:#06x} while awaiting ready", packet.kind);
            }
        }
        debug!("radar ready");

        self.confirm_sleep_mode(SLEEP_MODE_ACTIVE)
    }

    fn confirm_sleep_mode(&mut self, expected: u32) -> Result<(), SessionError> {
        match self.request_sync(&Request::GetSleepMode, false)? {
            Response::SleepMode { sleep_mode, .. } if sleep_mode == expected => Ok(()),
            Response::SleepMode { sleep_mode, .. } => Err(SessionError::ModeNotApplied {
                expected,
                actual: sleep_mode,
            }),
            other => Err(SessionError::UnexpectedResponse(other.kind())),
        }
    }
}

/// Fails with [`SessionError::CommandFailed`] unless the confirmation reports
/// status zero.
fn expect_success(kind: MessageKind, response: &Response) -> Result<(), SessionError> {
    match response.status() {
        Some(0) => Ok(()),
        Some(status) => Err(SessionError::CommandFailed { kind, status }),
        None => Err(SessionError::UnexpectedResponse(response.kind())),
    }
}

#[cfg(test)]
mod tests {
    use std::{io, thread, time::Duration};

    use crate::protocol::{GenericError, MemoryDatagram, ScanInfo};

    use super::*;

    /// Plays `inbox`, then keeps answering every receive with `tail`.
    struct Endless {
        inbox: VecDeque<Vec<u8>>,
        tail: io::Result<Vec<u8>>,
    }

    impl Datagram for Endless {
        fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let datagram = match (self.inbox.pop_front(), &self.tail) {
                (Some(datagram), _) => datagram,
                (None, Ok(datagram)) => {
                    thread::sleep(Duration::from_millis(5));
                    datagram.clone()
                }
                (None, Err(e)) => return Err(io::Error::from(e.kind())),
            };
            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok(datagram.len())
        }
    }

    fn endless(inbox: Vec<Vec<u8>>, tail: io::Result<Vec<u8>>) -> Session<Endless> {
        let channel = Endless {
            inbox: inbox.into(),
            tail,
        };
        Session::new(ProtocolTransport::new(channel), Arc::new(Registry::new()))
    }

    fn datagram(kind: MessageKind, id: u16, payload: Vec<u8>) -> Vec<u8> {
        let mut out = kind.code().to_be_bytes().to_vec();
        out.extend(id.to_be_bytes());
        out.extend(payload);
        out
    }

    fn status(kind: MessageKind, id: u16, status: u32) -> Vec<u8> {
        datagram(kind, id, status.to_be_bytes().to_vec())
    }

    fn fragment(timestamp: u32, index: u16, count: u16, samples: &[i32]) -> Vec<u8> {
        let info = Response::Scan(ScanInfo {
            timestamp,
            message_index: index,
            message_count: count,
            num_message_samples: samples.len() as u16,
            samples: samples.to_vec(),
            ..Default::default()
        });
        datagram(MessageKind::ScanInfo, 0, info.encode().unwrap())
    }

    fn error(id: u16, internal: bool) -> Vec<u8> {
        let payload = Response::Error(GenericError {
            target_kind: 0x1003,
            target_id: id,
            code: 9,
            internal,
        })
        .encode()
        .unwrap();
        datagram(MessageKind::GenericError, id, payload)
    }

    fn session(inbox: Vec<Vec<u8>>) -> Session<MemoryDatagram> {
        let channel = MemoryDatagram {
            inbox: inbox.into(),
            sent: Vec::new(),
        };
        Session::new(ProtocolTransport::new(channel), Arc::new(Registry::new()))
    }

    fn push(session: &mut Session<MemoryDatagram>, datagram: Vec<u8>) {
        session.transport_mut().channel_mut().inbox.push_back(datagram);
    }

    fn sent(session: &Session<MemoryDatagram>) -> &[Vec<u8>] {
        &session.transport().channel().sent
    }

    #[test]
    fn set_config_request_and_confirm() {
        let mut session = session(vec![status(MessageKind::SetConfigConfirm, 1, 0)]);
        let config = RadarConfig {
            scan_start: 1000,
            scan_end: 2000,
            ..Default::default()
        };

        let response = session
            .request_sync(&Request::SetConfig(config), false)
            .unwrap();
        assert_eq!(
            response,
            Response::Status {
                kind: MessageKind::SetConfigConfirm,
                status: 0
            }
        );

        let packet = &sent(&session)[0];
        assert_eq!(packet[0..4], [0x10, 0x01, 0x00, 0x01]);
        assert_eq!(packet[4..8], 5_u32.to_be_bytes());
        assert_eq!(packet[8..12], 1000_i32.to_be_bytes());
        assert_eq!(packet[12..16], 2000_i32.to_be_bytes());
        assert_eq!(session.pending(), None);
    }

    #[test]
    fn message_ids_increase_from_one() {
        let mut session = session(vec![
            status(MessageKind::RebootConfirm, 1, 0),
            status(MessageKind::RebootConfirm, 2, 0),
        ]);
        session.request_sync(&Request::Reboot, false).unwrap();
        session.request_sync(&Request::Reboot, false).unwrap();

        let ids: Vec<_> = sent(&session).iter().map(|p| [p[2], p[3]]).collect();
        assert_eq!(ids, vec![[0, 1], [0, 2]]);
    }

    #[test]
    fn unrelated_packets_are_discarded_while_waiting() {
        let mut session = session(vec![
            fragment(1, 0, 1, &[1]),
            datagram(MessageKind::ControlConfirm, 9, vec![0; 4]),
            status(MessageKind::SetSleepModeConfirm, 1, 0),
        ]);

        let response = session
            .request_sync(&Request::SetSleepMode { mode: 1 }, false)
            .unwrap();
        assert_eq!(response.status(), Some(0));
        assert!(session.frames().is_empty());
    }

    #[test]
    fn no_reply_returns_immediately() {
        let mut session = session(vec![status(MessageKind::RebootConfirm, 1, 0)]);

        let response = session.request_sync(&Request::Reboot, true).unwrap();
        assert_eq!(response, Response::Empty);
        assert_eq!(session.pending(), None);
        assert_eq!(session.transport().channel().inbox.len(), 1);
    }

    #[test]
    fn mismatched_id_terminates_session() {
        let mut session = session(vec![status(MessageKind::GetSleepModeConfirm, 2, 0)]);

        let err = session
            .request_sync(&Request::GetSleepMode, false)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::CorrelationMismatch {
                expected: 1,
                received: 2,
                ..
            }
        ));
        assert!(!err.is_recoverable());
        assert!(session.is_terminated());

        let err = session.request_sync(&Request::Reboot, true).unwrap_err();
        assert!(matches!(err, SessionError::Terminated(_)));
    }

    #[test]
    fn responses_in_reverse_order_are_never_misattributed() {
        let mut session = session(vec![
            status(MessageKind::RebootConfirm, 2, 0),
            status(MessageKind::RebootConfirm, 1, 0),
        ]);

        let err = session.request_sync(&Request::Reboot, false).unwrap_err();
        assert!(matches!(err, SessionError::CorrelationMismatch { .. }));
    }

    #[test]
    fn second_request_is_rejected_while_one_is_pending() {
        let mut session = session(Vec::new());

        let err = session.request_sync(&Request::GetConfig, false).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ReceiveTimeout)
        ));
        assert!(err.is_recoverable());

        let err = session.request_sync(&Request::Reboot, false).unwrap_err();
        assert!(matches!(err, SessionError::RequestPending(1)));
        assert_eq!(sent(&session).len(), 1);

        push(&mut session, status(MessageKind::SetConfigConfirm, 1, 0));
        push(&mut session, status(MessageKind::GetConfigConfirm, 1, 0));
        let err = session.await_pending().unwrap_err();
        assert!(matches!(err, SessionError::Codec(CodecError::DecodeTruncated { .. })));

        push(&mut session, status(MessageKind::RebootConfirm, 2, 0));
        assert!(session.request_sync(&Request::Reboot, false).is_ok());
    }

    #[test]
    fn abandoned_request_frees_the_slot() {
        let mut session = session(Vec::new());
        assert!(session.request_sync(&Request::GetSleepMode, false).is_err());

        let abandoned = session.abandon_pending().unwrap();
        assert_eq!(abandoned.id, 1);
        assert_eq!(abandoned.expected, MessageKind::GetSleepModeConfirm);
        assert!(session.request_sync(&Request::Reboot, true).is_ok());
    }

    #[test]
    fn rejection_is_recoverable() {
        let mut session = session(vec![error(1, false)]);

        let err = session
            .request_sync(
                &Request::Control {
                    scan_count: 1,
                    scan_interval: 0,
                },
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::PeerRejected {
                target_kind: 0x1003,
                target_id: 1,
                code: 9
            }
        ));
        assert!(!session.is_terminated());
        assert_eq!(session.pending(), None);
    }

    #[test]
    fn internal_fault_terminates_until_reset() {
        let mut session = session(vec![error(1, true)]);

        let err = session.request_sync(&Request::GetConfig, false).unwrap_err();
        assert!(matches!(err, SessionError::PeerFault { code: 9 }));
        assert!(session.is_terminated());

        session.reset();
        assert!(!session.is_terminated());
        push(&mut session, status(MessageKind::RebootConfirm, 1, 0));
        assert!(session.request_sync(&Request::Reboot, false).is_ok());
    }

    #[test]
    fn request_by_name_uses_defaults() {
        let mut session = session(vec![status(MessageKind::SetOpModeConfirm, 1, 0)]);
        session
            .request_named("MRM_SET_OPMODE_REQUEST", true)
            .unwrap();

        assert_eq!(sent(&session)[0], vec![0xF0, 0x03, 0x00, 0x01, 0, 0, 0, 1]);
        assert!(matches!(
            session.request_named("MRM_BOGUS", true),
            Err(SessionError::Codec(CodecError::UnknownMessageKind(_)))
        ));
    }

    #[test]
    fn exhausted_ids_require_reset() {
        let mut session = session(Vec::new());
        session.last_id = u16::MAX;

        assert!(matches!(
            session.request_sync(&Request::Reboot, true),
            Err(SessionError::MessageIdsExhausted)
        ));
        session.reset();
        session.request_sync(&Request::Reboot, true).unwrap();
        assert_eq!(sent(&session)[0][2..4], [0, 1]);
    }

    #[test]
    fn exec_scan_reassembles_out_of_order_fragments() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(42, 2, 3, &[7, 8]),
            fragment(42, 0, 3, &[1, 2]),
            fragment(42, 1, 3, &[4]),
        ]);

        let frames = session.exec_scan(1, 0).unwrap();
        assert_eq!(
            frames,
            vec![Frame {
                timestamp: 42,
                samples: vec![1, 2, 4, 7, 8]
            }]
        );
        assert_eq!(session.mode(), SessionMode::Sync);
        assert!(session.fragments().is_empty());
    }

    #[test]
    fn exec_scan_stops_when_stream_goes_quiet() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(100, 0, 1, &[1]),
            fragment(200, 0, 2, &[1]),
        ]);

        let frames = session.exec_scan(5, 0).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(session.fragments().len(), 1);
        assert_eq!(session.mode(), SessionMode::Sync);
    }

    #[test]
    fn zero_scan_count_is_rejected() {
        let mut session = session(Vec::new());
        assert!(matches!(
            session.exec_scan(0, 0),
            Err(SessionError::InvalidScanCount(0))
        ));
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn failed_control_keeps_sync_mode() {
        let mut session = session(vec![status(MessageKind::ControlConfirm, 1, 3)]);
        assert!(matches!(
            session.start_scan(10, 0),
            Err(SessionError::CommandFailed { status: 3, .. })
        ));
        assert_eq!(session.mode(), SessionMode::Sync);
    }

    #[test]
    fn pump_once_stops_at_max_frames() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(1, 0, 1, &[1]),
            fragment(2, 0, 1, &[2]),
            fragment(3, 0, 1, &[3]),
        ]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();

        assert!(session.pump_once(2).unwrap());
        assert!(!session.pump_once(2).unwrap());
        assert_eq!(session.frames().len(), 2);
        assert_eq!(session.mode(), SessionMode::Async);
    }

    #[test]
    fn pump_once_outside_async_mode_does_nothing() {
        let mut session = session(vec![fragment(1, 0, 1, &[1])]);
        assert!(!session.pump_once(10).unwrap());
        assert_eq!(session.transport().channel().inbox.len(), 1);
    }

    #[test]
    fn stale_scans_never_reach_the_queue() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(1000, 0, 2, &[1]),
            fragment(4000, 0, 1, &[2]),
            fragment(1000, 1, 2, &[3]),
        ]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();
        while session.pump_once(usize::MAX).unwrap() {}

        let timestamps: Vec<_> = session.frames().iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![4000]);
        assert_eq!(session.fragments().len(), 1);
    }

    #[test]
    fn stop_scan_drains_in_flight_fragments() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(5, 0, 1, &[5]),
        ]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();
        assert!(session.pump_once(usize::MAX).unwrap());

        push(&mut session, fragment(6, 0, 1, &[6]));
        push(&mut session, status(MessageKind::ControlConfirm, 2, 0));
        push(&mut session, fragment(7, 0, 1, &[7]));
        session.stop_scan().unwrap();

        let timestamps: Vec<_> = session.frames().iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![5, 7]);
        assert_eq!(session.mode(), SessionMode::Sync);
        assert_eq!(sent(&session)[1][4..6], [0, 0]);
    }

    #[test]
    fn sleep_confirm_marks_shutdown_while_streaming() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            status(MessageKind::SetSleepModeConfirm, 7, 0),
        ]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();

        assert!(session.pump_once(usize::MAX).unwrap());
        assert!(session.is_shutting_down());
    }

    #[test]
    fn internal_fault_while_streaming_terminates() {
        let mut session = session(vec![status(MessageKind::ControlConfirm, 1, 0), error(0, true)]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();

        assert!(matches!(
            session.pump_once(usize::MAX),
            Err(SessionError::PeerFault { .. })
        ));
        assert!(matches!(
            session.pump_once(usize::MAX),
            Err(SessionError::Terminated(_))
        ));
    }

    #[test]
    fn reset_clears_acquisition_state() {
        let mut session = session(vec![
            status(MessageKind::ControlConfirm, 1, 0),
            fragment(1, 0, 1, &[1]),
            fragment(2, 0, 2, &[1]),
        ]);
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();
        while session.pump_once(usize::MAX).unwrap() {}
        assert_eq!(session.frames().len(), 1);

        session.reset();
        assert!(session.frames().is_empty());
        assert!(session.fragments().is_empty());
        assert_eq!(session.mode(), SessionMode::Sync);
    }

    #[test]
    fn init_radar_returns_applied_config() {
        let config = RadarConfig {
            node_id: 6,
            scan_start: 26685,
            scan_end: 79419,
            ..Default::default()
        };
        let confirm = Response::Config(ConfigConfirm {
            config: config.clone(),
            timestamp: 77,
            status: 0,
        });
        let mut session = session(vec![
            status(MessageKind::SetConfigConfirm, 1, 0),
            datagram(MessageKind::GetConfigConfirm, 2, confirm.encode().unwrap()),
        ]);

        let applied = session.init_radar(&config).unwrap();
        assert_eq!(applied.config, config);
        assert_eq!(applied.timestamp, 77);
    }

    #[test]
    fn sleep_checks_reported_mode() {
        let mut session = session(vec![
            status(MessageKind::SetSleepModeConfirm, 1, 0),
            datagram(MessageKind::GetSleepModeConfirm, 2, vec![0, 0, 0, 0, 0, 0, 0, 0]),
        ]);

        assert!(matches!(
            session.sleep(),
            Err(SessionError::ModeNotApplied {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn wake_waits_for_ready() {
        let mut session = session(vec![
            status(MessageKind::SetSleepModeConfirm, 1, 0),
            fragment(1, 0, 1, &[1]),
            datagram(MessageKind::ReadyInfo, 0, Vec::new()),
            datagram(MessageKind::GetSleepModeConfirm, 2, vec![0; 8]),
        ]);
        session.wake().unwrap();
    }

    #[test]
    fn wake_accepts_ready_before_confirm() {
        let mut session = session(vec![
            datagram(MessageKind::ReadyInfo, 0, Vec::new()),
            status(MessageKind::SetSleepModeConfirm, 1, 0),
            datagram(MessageKind::GetSleepModeConfirm, 2, vec![0; 8]),
        ]);
        session.wake().unwrap();
    }

    #[test]
    fn stop_scan_gives_up_while_flooded() {
        let mut session = endless(
            vec![status(MessageKind::ControlConfirm, 1, 0)],
            Ok(fragment(9, 0, 2, &[1])),
        );
        session.start_scan(CONTINUOUS_SCAN, 0).unwrap();

        let started = Instant::now();
        let err = session.stop_scan().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ReceiveTimeout)
        ));
        assert!(started.elapsed() < RECEIVE_TIMEOUT * 3);
        assert_eq!(session.pending().map(|p| p.id), Some(2));
        assert!(!session.is_terminated());
    }

    #[test]
    fn wake_gives_up_while_flooded() {
        let mut session = endless(
            vec![status(MessageKind::SetSleepModeConfirm, 1, 0)],
            Ok(fragment(9, 0, 2, &[1])),
        );

        let started = Instant::now();
        assert!(matches!(
            session.wake(),
            Err(SessionError::Transport(TransportError::ReceiveTimeout))
        ));
        assert!(started.elapsed() < RECEIVE_TIMEOUT * 3);
    }

    #[test]
    fn failed_pump_returns_to_sync_mode() {
        let mut session = endless(
            vec![status(MessageKind::ControlConfirm, 1, 0)],
            Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        );

        assert!(matches!(
            session.exec_scan(1, 0),
            Err(SessionError::Transport(TransportError::Io(_)))
        ));
        assert_eq!(session.mode(), SessionMode::Sync);
    }

    #[test]
    fn wake_without_ready_times_out() {
        let mut session = session(vec![status(MessageKind::SetSleepModeConfirm, 1, 0)]);
        assert!(matches!(
            session.wake(),
            Err(SessionError::Transport(TransportError::ReceiveTimeout))
        ));
    }
}
