//! Radar peer simulator.
//!
//! [`RadarSimulator`] answers the control protocol the way a radar module
//! does, which makes it possible to exercise a [`Session`](crate::session::Session)
//! end to end over real UDP without hardware:
//!
//! - every catalog request is confirmed with the radar's current state;
//! - a control request streams synthetic scans, each split into fragments
//!   that are sent in reverse index order;
//! - waking from sleep is followed by the ready notification;
//! - unknown or malformed requests are answered with a generic error.
//!
//! The simulator serves whichever peer contacted it last.
use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{debug, info, trace, warn};

use crate::protocol::{
    CONTINUOUS_SCAN, ConfigConfirm, Datagram, FilterConfig, GenericError, MessageKind, Packet,
    ProtocolTransport, RadarConfig, Registry, RegistryEntry, Request, Response,
    SLEEP_MODE_ACTIVE, ScanInfo, StatusInfo, TransportError,
};

/// Receive timeout between scans while streaming.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Samples carried by one scan fragment.
pub const SAMPLES_PER_FRAGMENT: usize = 350;

/// Generic error code for a kind the radar does not accept.
pub const REJECT_UNKNOWN_KIND: u32 = 1;
/// Generic error code for a request whose payload could not be parsed.
pub const REJECT_MALFORMED: u32 = 2;
/// Generic error code for a configuration whose scans need more fragments than
/// the fragment header can number.
pub const REJECT_OUT_OF_RANGE: u32 = 3;

/// Picoseconds between two samples.
const SAMPLE_SPACING: i32 = 61;
/// Timestamp advance between scans.
const SCAN_PERIOD: u32 = 100;

/// Samples in one scan of the configured window, before padding.
fn scan_len(config: &RadarConfig) -> usize {
    let span = config.scan_end.saturating_sub(config.scan_start).max(0);
    ((span / SAMPLE_SPACING) as usize).max(1)
}

/// Fragments per scan, if the count fits the fragment header.
fn fragment_count(config: &RadarConfig) -> Option<u16> {
    u16::try_from(scan_len(config).div_ceil(SAMPLES_PER_FRAGMENT)).ok()
}

/// Unconnected socket answering the last peer heard from.
struct PeerSocket {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl Datagram for PeerSocket {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.peer {
            Some(peer) => self.socket.send_to(buf, peer),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no peer has contacted the simulator",
            )),
        }
    }

    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, from) = self.socket.recv_from(buf)?;
        self.peer = Some(from);
        Ok(len)
    }
}

pub struct RadarSimulator {
    transport: ProtocolTransport<PeerSocket>,
    registry: Registry,
    config: RadarConfig,
    filter: FilterConfig,
    op_mode: u32,
    sleep_mode: u32,
    timestamp: u32,
    scans_left: u32,
    continuous: bool,
}

impl RadarSimulator {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        Ok(Self {
            transport: ProtocolTransport::new(PeerSocket { socket, peer: None }),
            registry: Registry::new(),
            config: RadarConfig::default(),
            filter: FilterConfig::default(),
            op_mode: 1,
            sleep_mode: SLEEP_MODE_ACTIVE,
            timestamp: 0,
            scans_left: 0,
            continuous: false,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.transport.channel().socket.local_addr()?)
    }

    pub fn is_scanning(&self) -> bool {
        self.continuous || self.scans_left > 0
    }

    /// Serves requests until `running` is cleared.
    pub fn serve(&mut self, running: &AtomicBool) -> Result<(), TransportError> {
        info!("simulated radar listening at {}", self.local_addr()?);
        while running.load(Ordering::SeqCst) {
            self.step()?;
        }
        info!("simulated radar stopped");
        Ok(())
    }

    /// Emits the next scan if one is due, then handles at most one request.
    pub fn step(&mut self) -> Result<(), TransportError> {
        if self.is_scanning() {
            self.emit_scan()?;
        }

        match self.transport.receive() {
            Ok(packet) => self.handle(packet),
            Err(TransportError::ReceiveTimeout) => Ok(()),
            Err(TransportError::Deserialize(e)) => {
                warn!("dropped runt datagram: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn handle(&mut self, packet: Packet) -> Result<(), TransportError> {
        let outgoing = self
            .registry
            .lookup(packet.kind)
            .ok()
            .and_then(|(kind, entry)| match entry {
                RegistryEntry::Outgoing {
                    expected_confirm, ..
                } => Some((kind, *expected_confirm)),
                RegistryEntry::Incoming { .. } => None,
            });
        let Some((kind, confirm)) = outgoing else {
            warn!("rejecting unknown request {:#06x}", packet.kind);
            return self.reject(&packet, REJECT_UNKNOWN_KIND);
        };

        let request = match Request::decode(kind, &packet.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting malformed {kind}: {e}");
                return self.reject(&packet, REJECT_MALFORMED);
            }
        };
        debug!("received {request:?} id={}", packet.id);

        if matches!(&request, Request::SetConfig(config) if fragment_count(config).is_none()) {
            warn!("rejecting scan window too wide to fragment");
            return self.reject(&packet, REJECT_OUT_OF_RANGE);
        }

        let was_asleep = self.sleep_mode != SLEEP_MODE_ACTIVE;
        let response = self.answer(&request);
        if let Some(confirm) = confirm {
            self.reply(confirm, packet.id, &response)?;
        }

        if was_asleep && request == (Request::SetSleepMode { mode: SLEEP_MODE_ACTIVE }) {
            self.reply(MessageKind::ReadyInfo, 0, &Response::Ready)?;
        }
        Ok(())
    }

    /// Applies `request` to the simulated state and builds its confirmation.
    pub fn answer(&mut self, request: &Request) -> Response {
        let ok = |kind| Response::Status { kind, status: 0 };

        match request {
            Request::SetConfig(config) => {
                self.config = config.clone();
                ok(MessageKind::SetConfigConfirm)
            }
            Request::GetConfig => Response::Config(ConfigConfirm {
                config: self.config.clone(),
                timestamp: self.timestamp,
                status: 0,
            }),
            Request::Control {
                scan_count,
                scan_interval,
            } => {
                if self.sleep_mode != SLEEP_MODE_ACTIVE && *scan_count > 0 {
                    warn!("cannot scan while in sleep mode {}", self.sleep_mode);
                    return Response::Status {
                        kind: MessageKind::ControlConfirm,
                        status: 1,
                    };
                }
                debug!("scanning {scan_count} scans every {scan_interval}us");
                self.continuous = *scan_count == CONTINUOUS_SCAN;
                self.scans_left = if self.continuous {
                    0
                } else {
                    u32::from(*scan_count)
                };
                ok(MessageKind::ControlConfirm)
            }
            Request::ServerConnect { address } => {
                debug!("server connect to {address}");
                Response::ServerConnect {
                    connection_status: 0,
                }
            }
            Request::ServerDisconnect => ok(MessageKind::ServerDisconnectConfirm),
            Request::SetFilterConfig(filter) => {
                self.filter = *filter;
                ok(MessageKind::SetFilterConfigConfirm)
            }
            Request::GetFilterConfig => Response::FilterConfig {
                filter: self.filter,
                status: 0,
            },
            Request::GetStatusInfo => Response::StatusInfo(StatusInfo {
                mrm_version: (3, 0, 1),
                uwb_kernel_version: (3, 0, 0),
                serial_number: 100_001,
                board_type: 1,
                temperature: 2500,
                package_version: format!("uwbscan-sim {}", env!("CARGO_PKG_VERSION")),
                ..Default::default()
            }),
            Request::Reboot => {
                self.continuous = false;
                self.scans_left = 0;
                ok(MessageKind::RebootConfirm)
            }
            Request::SetOpMode { mode } => {
                self.op_mode = *mode;
                Response::OpMode {
                    op_mode: self.op_mode,
                    status: 0,
                }
            }
            Request::SetSleepMode { mode } => {
                self.sleep_mode = *mode;
                if *mode != SLEEP_MODE_ACTIVE {
                    self.continuous = false;
                    self.scans_left = 0;
                }
                ok(MessageKind::SetSleepModeConfirm)
            }
            Request::GetSleepMode => Response::SleepMode {
                sleep_mode: self.sleep_mode,
                status: 0,
            },
        }
    }

    fn reject(&mut self, packet: &Packet, code: u32) -> Result<(), TransportError> {
        let error = Response::Error(GenericError {
            target_kind: packet.kind,
            target_id: packet.id,
            code,
            internal: false,
        });
        self.reply(MessageKind::GenericError, packet.id, &error)
    }

    fn reply(&mut self, kind: MessageKind, id: u16, response: &Response) -> Result<(), TransportError> {
        match response.encode() {
            Ok(payload) => {
                self.transport.send(kind.code(), id, &payload)?;
            }
            Err(e) => warn!("could not encode {kind}: {e}"),
        }
        Ok(())
    }

    /// One scan of the configured window, zero padded to whole fragments.
    pub fn waveform(&self) -> Vec<i32> {
        let len = scan_len(&self.config);
        let padded = len.div_ceil(SAMPLES_PER_FRAGMENT) * SAMPLES_PER_FRAGMENT;
        let phase = (self.timestamp / SCAN_PERIOD) as usize;

        (0..padded)
            .map(|i| {
                if i < len {
                    1 + ((i + phase) % 1000) as i32
                } else {
                    0
                }
            })
            .collect()
    }

    fn emit_scan(&mut self) -> Result<(), TransportError> {
        let Some(count) = fragment_count(&self.config) else {
            warn!("scan window too wide to fragment, stopping");
            self.continuous = false;
            self.scans_left = 0;
            return Ok(());
        };
        let samples = self.waveform();

        for index in (0..count).rev() {
            let start = usize::from(index) * SAMPLES_PER_FRAGMENT;
            let chunk = &samples[start..start + SAMPLES_PER_FRAGMENT];
            let info = ScanInfo {
                source_id: self.config.node_id,
                timestamp: self.timestamp,
                scan_start: self.config.scan_start,
                scan_stop: self.config.scan_end,
                scan_step: self.config.scan_resolution as i16,
                antenna_id: self.config.antenna_mode,
                operational_mode: self.op_mode as u8,
                num_message_samples: chunk.len() as u16,
                num_total_samples: samples.len() as u32,
                message_index: index,
                message_count: count,
                samples: chunk.to_vec(),
                ..Default::default()
            };
            self.reply(MessageKind::ScanInfo, 0, &Response::Scan(info))?;
        }
        trace!("emitted scan {} in {count} fragments", self.timestamp);

        self.timestamp = self.timestamp.wrapping_add(SCAN_PERIOD);
        if !self.continuous {
            self.scans_left -= 1;
        }
        Ok(())
    }
}
