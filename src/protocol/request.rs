use std::net::{Ipv4Addr, SocketAddrV4};

use log::warn;

use super::{
    MessageKind,
    codec::{CodecError, Field, PayloadReader, Width, encode_fields},
};

/// Sleep mode that keeps the radar answering on Ethernet.
pub const SLEEP_MODE_ACTIVE: u32 = 0;
pub const SLEEP_MODE_IDLE: u32 = 1;

/// Scan count that makes the radar scan until told to stop.
pub const CONTINUOUS_SCAN: u16 = u16::MAX;

/// Size of the radar configuration block shared by the set request and
/// the get confirmation.
pub(crate) const CONFIG_BLOCK_SIZE: usize = 32;

/// Radar configuration block.
///
/// Scan bounds are expressed in picoseconds of round-trip time of flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarConfig {
    pub node_id: u32,
    pub scan_start: i32,
    pub scan_end: i32,
    pub scan_resolution: u16,
    pub base_integration_index: u16,
    pub segment_num_samples: [u16; 4],
    pub segment_integration_multiple: [u8; 4],
    pub antenna_mode: u8,
    pub transmit_gain: u8,
    pub code_channel: u8,
    pub persist_flag: u8,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            node_id: 5,
            scan_start: 0,
            scan_end: 5,
            scan_resolution: 32,
            base_integration_index: 6,
            segment_num_samples: [0; 4],
            segment_integration_multiple: [0; 4],
            antenna_mode: 2,
            transmit_gain: 60,
            code_channel: 7,
            persist_flag: 0,
        }
    }
}

impl RadarConfig {
    pub(crate) fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::unsigned(self.node_id, Width::W32),
            Field::signed(self.scan_start, Width::W32),
            Field::signed(self.scan_end, Width::W32),
            Field::unsigned(self.scan_resolution, Width::W16),
            Field::unsigned(self.base_integration_index, Width::W16),
        ];
        fields.extend(
            self.segment_num_samples
                .iter()
                .map(|n| Field::unsigned(*n, Width::W16)),
        );
        fields.extend(
            self.segment_integration_multiple
                .iter()
                .map(|n| Field::unsigned(*n, Width::W8)),
        );
        fields.extend([
            Field::unsigned(self.antenna_mode, Width::W8),
            Field::unsigned(self.transmit_gain, Width::W8),
            Field::unsigned(self.code_channel, Width::W8),
            Field::unsigned(self.persist_flag, Width::W8),
        ]);
        fields
    }

    pub(crate) fn read(reader: &PayloadReader<'_>) -> Result<Self, CodecError> {
        let mut segment_num_samples = [0; 4];
        for (i, n) in segment_num_samples.iter_mut().enumerate() {
            *n = reader.u16(16 + i * 2)?;
        }
        let mut segment_integration_multiple = [0; 4];
        for (i, n) in segment_integration_multiple.iter_mut().enumerate() {
            *n = reader.u8(24 + i)?;
        }

        Ok(Self {
            node_id: reader.u32(0)?,
            scan_start: reader.i32(4)?,
            scan_end: reader.i32(8)?,
            scan_resolution: reader.u16(12)?,
            base_integration_index: reader.u16(14)?,
            segment_num_samples,
            segment_integration_multiple,
            antenna_mode: reader.u8(28)?,
            transmit_gain: reader.u8(29)?,
            code_channel: reader.u8(30)?,
            persist_flag: reader.u8(31)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub filter_mask: u16,
    pub motion_filter_index: u8,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_mask: 1,
            motion_filter_index: 0,
        }
    }
}

impl FilterConfig {
    pub(crate) fn fields(&self) -> [Field; 3] {
        [
            Field::unsigned(self.filter_mask, Width::W16),
            Field::unsigned(self.motion_filter_index, Width::W8),
            Field::reserved(Width::W8),
        ]
    }

    pub(crate) fn read(reader: &PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            filter_mask: reader.u16(0)?,
            motion_filter_index: reader.u8(2)?,
        })
    }
}

/// Outgoing request with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SetConfig(RadarConfig),
    GetConfig,
    Control { scan_count: u16, scan_interval: u32 },
    ServerConnect { address: SocketAddrV4 },
    ServerDisconnect,
    SetFilterConfig(FilterConfig),
    GetFilterConfig,
    GetStatusInfo,
    Reboot,
    SetOpMode { mode: u32 },
    SetSleepMode { mode: u32 },
    GetSleepMode,
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::SetConfig(_) => MessageKind::SetConfigRequest,
            Request::GetConfig => MessageKind::GetConfigRequest,
            Request::Control { .. } => MessageKind::ControlRequest,
            Request::ServerConnect { .. } => MessageKind::ServerConnectRequest,
            Request::ServerDisconnect => MessageKind::ServerDisconnectRequest,
            Request::SetFilterConfig(_) => MessageKind::SetFilterConfigRequest,
            Request::GetFilterConfig => MessageKind::GetFilterConfigRequest,
            Request::GetStatusInfo => MessageKind::GetStatusInfoRequest,
            Request::Reboot => MessageKind::RebootRequest,
            Request::SetOpMode { .. } => MessageKind::SetOpModeRequest,
            Request::SetSleepMode { .. } => MessageKind::SetSleepModeRequest,
            Request::GetSleepMode => MessageKind::GetSleepModeRequest,
        }
    }

    /// Request of `kind` carrying the device's documented default parameters.
    pub fn with_defaults(kind: MessageKind) -> Result<Self, CodecError> {
        Ok(match kind {
            MessageKind::SetConfigRequest => Request::SetConfig(RadarConfig::default()),
            MessageKind::GetConfigRequest => Request::GetConfig,
            MessageKind::ControlRequest => Request::Control {
                scan_count: 1,
                scan_interval: 0,
            },
            MessageKind::ServerConnectRequest => Request::ServerConnect {
                address: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 151), 21210),
            },
            MessageKind::ServerDisconnectRequest => Request::ServerDisconnect,
            MessageKind::SetFilterConfigRequest => {
                Request::SetFilterConfig(FilterConfig::default())
            }
            MessageKind::GetFilterConfigRequest => Request::GetFilterConfig,
            MessageKind::GetStatusInfoRequest => Request::GetStatusInfo,
            MessageKind::RebootRequest => Request::Reboot,
            MessageKind::SetOpModeRequest => Request::SetOpMode { mode: 1 },
            MessageKind::SetSleepModeRequest => Request::SetSleepMode {
                mode: SLEEP_MODE_IDLE,
            },
            MessageKind::GetSleepModeRequest => Request::GetSleepMode,
            other => return Err(CodecError::UnknownMessageKind(other.name().to_string())),
        })
    }

    /// Parses a request payload; the inverse of the registered encoders.
    pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Self, CodecError> {
        let reader = PayloadReader::new(kind, payload);
        Ok(match kind {
            MessageKind::SetConfigRequest => Request::SetConfig(RadarConfig::read(&reader)?),
            MessageKind::ControlRequest => Request::Control {
                scan_count: reader.u16(0)?,
                scan_interval: reader.u32(4)?,
            },
            MessageKind::ServerConnectRequest => {
                let ip = reader.bytes(0, 4)?;
                Request::ServerConnect {
                    address: SocketAddrV4::new(
                        Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
                        reader.u16(4)?,
                    ),
                }
            }
            MessageKind::SetFilterConfigRequest => {
                Request::SetFilterConfig(FilterConfig::read(&reader)?)
            }
            MessageKind::SetOpModeRequest => Request::SetOpMode {
                mode: reader.u32(0)?,
            },
            MessageKind::SetSleepModeRequest => Request::SetSleepMode {
                mode: reader.u32(0)?,
            },
            other => Request::with_defaults(other)?,
        })
    }
}

/// Per-kind payload encoder, stored in the registry.
pub type Encoder = fn(&Request) -> Result<Vec<u8>, CodecError>;

macro_rules! encoder {
    ($name:ident, $kind:ident, $pattern:pat => $fields:expr) => {
        pub(crate) fn $name(request: &Request) -> Result<Vec<u8>, CodecError> {
            match request {
                $pattern => encode_fields(&$fields),
                other => Err(CodecError::WrongRequest {
                    kind: MessageKind::$kind,
                    found: other.kind(),
                }),
            }
        }
    };
}

encoder!(set_config, SetConfigRequest, Request::SetConfig(config) => config.fields());
encoder!(get_config, GetConfigRequest, Request::GetConfig => []);
encoder!(control, ControlRequest, Request::Control { scan_count, scan_interval } => [
    Field::unsigned(*scan_count, Width::W16),
    Field::reserved(Width::W16),
    Field::unsigned(*scan_interval, Width::W32),
]);
encoder!(server_connect, ServerConnectRequest, Request::ServerConnect { address } => {
    let [a, b, c, d] = address.ip().octets();
    [
        Field::unsigned(a, Width::W8),
        Field::unsigned(b, Width::W8),
        Field::unsigned(c, Width::W8),
        Field::unsigned(d, Width::W8),
        Field::unsigned(address.port(), Width::W16),
        Field::reserved(Width::W16),
    ]
});
encoder!(server_disconnect, ServerDisconnectRequest, Request::ServerDisconnect => []);
encoder!(set_filter_config, SetFilterConfigRequest, Request::SetFilterConfig(filter) => filter.fields());
encoder!(get_filter_config, GetFilterConfigRequest, Request::GetFilterConfig => []);
encoder!(get_status_info, GetStatusInfoRequest, Request::GetStatusInfo => []);
encoder!(reboot, RebootRequest, Request::Reboot => []);
encoder!(set_op_mode, SetOpModeRequest, Request::SetOpMode { mode } => [Field::unsigned(*mode, Width::W32)]);
encoder!(set_sleep_mode, SetSleepModeRequest, Request::SetSleepMode { mode } => [
    Field::unsigned(safe_sleep_mode(*mode), Width::W32)
]);
encoder!(get_sleep_mode, GetSleepModeRequest, Request::GetSleepMode => []);

/// Modes 3 and 4 stop the radar answering on Ethernet; fall back to idle.
fn safe_sleep_mode(mode: u32) -> u32 {
    if mode == 3 || mode == 4 {
        warn!("sleep mode {mode} would disconnect the radar from Ethernet; using idle instead");
        SLEEP_MODE_IDLE
    } else {
        mode
    }
}
