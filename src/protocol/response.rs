use super::{
    MessageKind,
    codec::{CodecError, Field, PayloadReader, Width, encode_fields},
    request::{CONFIG_BLOCK_SIZE, FilterConfig, RadarConfig},
};

/// Bit flagging an internal radar fault in the generic error code.
pub const INTERNAL_ERROR_FLAG: u32 = 0x8000_0000;

const PACKAGE_VERSION_LEN: usize = 32;
const SCAN_HEADER_SIZE: usize = 48;

/// Decoded incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// No confirmation was awaited.
    Empty,
    /// Confirmations that only carry a status word.
    Status { kind: MessageKind, status: u32 },
    Config(ConfigConfirm),
    ServerConnect { connection_status: u32 },
    FilterConfig { filter: FilterConfig, status: u32 },
    StatusInfo(StatusInfo),
    OpMode { op_mode: u32, status: u32 },
    SleepMode { sleep_mode: u32, status: u32 },
    Scan(ScanInfo),
    Ready,
    Error(GenericError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigConfirm {
    pub config: RadarConfig,
    pub timestamp: u32,
    pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusInfo {
    pub mrm_version: (u8, u8, u16),
    pub uwb_kernel_version: (u8, u8, u16),
    pub fpga_firmware_version: u8,
    pub fpga_firmware_date: (u8, u8, u8),
    pub serial_number: u32,
    pub board_revision: u8,
    pub bit_test_result: u8,
    pub board_type: u8,
    pub transmitter_config: u8,
    pub temperature: i32,
    pub package_version: String,
    pub status: u32,
}

/// One fragment of scan telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanInfo {
    pub source_id: u32,
    pub timestamp: u32,
    pub scan_start: i32,
    pub scan_stop: i32,
    pub scan_step: i16,
    pub scan_type: u8,
    pub antenna_id: u8,
    pub operational_mode: u8,
    pub num_message_samples: u16,
    pub num_total_samples: u32,
    pub message_index: u16,
    pub message_count: u16,
    pub samples: Vec<i32>,
}

/// Generic error notification, sent by the radar in place of a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericError {
    /// Raw kind of the offending message; may not be a kind we know.
    pub target_kind: u16,
    pub target_id: u16,
    /// Error code with the internal flag masked off.
    pub code: u32,
    /// Internal radar fault; the session cannot continue.
    pub internal: bool,
}

impl Response {
    pub fn kind(&self) -> Option<MessageKind> {
        Some(match self {
            Response::Empty => return None,
            Response::Status { kind, .. } => *kind,
            Response::Config(_) => MessageKind::GetConfigConfirm,
            Response::ServerConnect { .. } => MessageKind::ServerConnectConfirm,
            Response::FilterConfig { .. } => MessageKind::GetFilterConfigConfirm,
            Response::StatusInfo(_) => MessageKind::GetStatusInfoConfirm,
            Response::OpMode { .. } => MessageKind::SetOpModeConfirm,
            Response::SleepMode { .. } => MessageKind::GetSleepModeConfirm,
            Response::Scan(_) => MessageKind::ScanInfo,
            Response::Ready => MessageKind::ReadyInfo,
            Response::Error(_) => MessageKind::GenericError,
        })
    }

    /// Status word of a confirmation, if it carries one.
    pub fn status(&self) -> Option<u32> {
        match self {
            Response::Status { status, .. }
            | Response::FilterConfig { status, .. }
            | Response::OpMode { status, .. }
            | Response::SleepMode { status, .. } => Some(*status),
            Response::Config(confirm) => Some(confirm.status),
            Response::StatusInfo(info) => Some(info.status),
            Response::ServerConnect { connection_status } => Some(*connection_status),
            _ => None,
        }
    }

    /// Serializes the record the way the radar would put it on the wire.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Response::Empty | Response::Ready => Ok(Vec::new()),
            Response::Status { status, .. } => encode_fields(&[Field::unsigned(*status, Width::W32)]),
            Response::ServerConnect { connection_status } => {
                encode_fields(&[Field::unsigned(*connection_status, Width::W32)])
            }
            Response::Config(confirm) => {
                let mut fields = confirm.config.fields();
                fields.push(Field::unsigned(confirm.timestamp, Width::W32));
                fields.push(Field::unsigned(confirm.status, Width::W32));
                encode_fields(&fields)
            }
            Response::FilterConfig { filter, status } => {
                let mut fields = filter.fields().to_vec();
                fields.push(Field::unsigned(*status, Width::W32));
                encode_fields(&fields)
            }
            Response::OpMode { op_mode, status } => encode_fields(&[
                Field::unsigned(*op_mode, Width::W32),
                Field::unsigned(*status, Width::W32),
            ]),
            Response::SleepMode { sleep_mode, status } => encode_fields(&[
                Field::unsigned(*sleep_mode, Width::W32),
                Field::unsigned(*status, Width::W32),
            ]),
            Response::StatusInfo(info) => info.encode(),
            Response::Scan(info) => info.encode(),
            Response::Error(error) => {
                let code = if error.internal {
                    error.code | INTERNAL_ERROR_FLAG
                } else {
                    error.code
                };
                encode_fields(&[
                    Field::unsigned(error.target_kind, Width::W16),
                    Field::unsigned(error.target_id, Width::W16),
                    Field::unsigned(code, Width::W32),
                ])
            }
        }
    }
}

impl StatusInfo {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = encode_fields(&[
            Field::unsigned(self.mrm_version.0, Width::W8),
            Field::unsigned(self.mrm_version.1, Width::W8),
            Field::unsigned(self.mrm_version.2, Width::W16),
            Field::unsigned(self.uwb_kernel_version.0, Width::W8),
            Field::unsigned(self.uwb_kernel_version.1, Width::W8),
            Field::unsigned(self.uwb_kernel_version.2, Width::W16),
            Field::unsigned(self.fpga_firmware_version, Width::W8),
            Field::unsigned(self.fpga_firmware_date.0, Width::W8),
            Field::unsigned(self.fpga_firmware_date.1, Width::W8),
            Field::unsigned(self.fpga_firmware_date.2, Width::W8),
            Field::unsigned(self.serial_number, Width::W32),
            Field::unsigned(self.board_revision, Width::W8),
            Field::unsigned(self.bit_test_result, Width::W8),
            Field::unsigned(self.board_type, Width::W8),
            Field::unsigned(self.transmitter_config, Width::W8),
            Field::signed(self.temperature, Width::W32),
        ])?;
        let mut version = [0_u8; PACKAGE_VERSION_LEN];
        for (slot, byte) in version.iter_mut().zip(self.package_version.bytes()) {
            *slot = byte;
        }
        out.extend_from_slice(&version);
        out.extend(encode_fields(&[Field::unsigned(self.status, Width::W32)])?);
        Ok(out)
    }
}

impl ScanInfo {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut fields = vec![
            Field::unsigned(self.source_id, Width::W32),
            Field::unsigned(self.timestamp, Width::W32),
        ];
        fields.extend(std::iter::repeat_n(Field::reserved(Width::W32), 4));
        fields.extend([
            Field::signed(self.scan_start, Width::W32),
            Field::signed(self.scan_stop, Width::W32),
            Field::signed(self.scan_step, Width::W16),
            Field::unsigned(self.scan_type, Width::W8),
            Field::reserved(Width::W8),
            Field::unsigned(self.antenna_id, Width::W8),
            Field::unsigned(self.operational_mode, Width::W8),
            Field::unsigned(self.num_message_samples, Width::W16),
            Field::unsigned(self.num_total_samples, Width::W32),
            Field::unsigned(self.message_index, Width::W16),
            Field::unsigned(self.message_count, Width::W16),
        ]);
        fields.extend(self.samples.iter().map(|s| Field::signed(*s, Width::W32)));
        encode_fields(&fields)
    }
}

/// Per-kind payload decoder, stored in the registry.
pub type Decoder = fn(&[u8]) -> Result<Response, CodecError>;

macro_rules! status_decoder {
    ($name:ident, $kind:ident) => {
        pub(crate) fn $name(payload: &[u8]) -> Result<Response, CodecError> {
            let reader = PayloadReader::new(MessageKind::$kind, payload);
            Ok(Response::Status {
                kind: MessageKind::$kind,
                status: reader.u32(0)?,
            })
        }
    };
}

status_decoder!(set_config_confirm, SetConfigConfirm);
status_decoder!(control_confirm, ControlConfirm);
status_decoder!(server_disconnect_confirm, ServerDisconnectConfirm);
status_decoder!(set_filter_config_confirm, SetFilterConfigConfirm);
status_decoder!(reboot_confirm, RebootConfirm);
status_decoder!(set_sleep_mode_confirm, SetSleepModeConfirm);

pub(crate) fn get_config_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::GetConfigConfirm, payload);
    Ok(Response::Config(ConfigConfirm {
        config: RadarConfig::read(&reader)?,
        timestamp: reader.u32(CONFIG_BLOCK_SIZE)?,
        status: reader.u32(CONFIG_BLOCK_SIZE + 4)?,
    }))
}

pub(crate) fn server_connect_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::ServerConnectConfirm, payload);
    Ok(Response::ServerConnect {
        connection_status: reader.u32(0)?,
    })
}

pub(crate) fn get_filter_config_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::GetFilterConfigConfirm, payload);
    Ok(Response::FilterConfig {
        filter: FilterConfig::read(&reader)?,
        status: reader.u32(4)?,
    })
}

pub(crate) fn get_status_info_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::GetStatusInfoConfirm, payload);
    let version = reader.bytes(24, PACKAGE_VERSION_LEN)?;
    let package_version = version
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();

    Ok(Response::StatusInfo(StatusInfo {
        mrm_version: (reader.u8(0)?, reader.u8(1)?, reader.u16(2)?),
        uwb_kernel_version: (reader.u8(4)?, reader.u8(5)?, reader.u16(6)?),
        fpga_firmware_version: reader.u8(8)?,
        fpga_firmware_date: (reader.u8(9)?, reader.u8(10)?, reader.u8(11)?),
        serial_number: reader.u32(12)?,
        board_revision: reader.u8(16)?,
        bit_test_result: reader.u8(17)?,
        board_type: reader.u8(18)?,
        transmitter_config: reader.u8(19)?,
        temperature: reader.i32(20)?,
        package_version,
        status: reader.u32(24 + PACKAGE_VERSION_LEN)?,
    }))
}

pub(crate) fn set_op_mode_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::SetOpModeConfirm, payload);
    Ok(Response::OpMode {
        op_mode: reader.u32(0)?,
        status: reader.u32(4)?,
    })
}

pub(crate) fn get_sleep_mode_confirm(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::GetSleepModeConfirm, payload);
    Ok(Response::SleepMode {
        sleep_mode: reader.u32(0)?,
        status: reader.u32(4)?,
    })
}

pub(crate) fn scan_info(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::ScanInfo, payload);
    Ok(Response::Scan(ScanInfo {
        source_id: reader.u32(0)?,
        timestamp: reader.u32(4)?,
        scan_start: reader.i32(24)?,
        scan_stop: reader.i32(28)?,
        scan_step: reader.i16(32)?,
        scan_type: reader.u8(34)?,
        antenna_id: reader.u8(36)?,
        operational_mode: reader.u8(37)?,
        num_message_samples: reader.u16(38)?,
        num_total_samples: reader.u32(40)?,
        message_index: reader.u16(44)?,
        message_count: reader.u16(46)?,
        samples: reader.samples(SCAN_HEADER_SIZE)?,
    }))
}

pub(crate) fn ready_info(_payload: &[u8]) -> Result<Response, CodecError> {
    Ok(Response::Ready)
}

pub(crate) fn generic_error(payload: &[u8]) -> Result<Response, CodecError> {
    let reader = PayloadReader::new(MessageKind::GenericError, payload);
    let raw = reader.u32(4)?;
    Ok(Response::Error(GenericError {
        target_kind: reader.u16(0)?,
        target_id: reader.u16(2)?,
        code: raw & !INTERNAL_ERROR_FLAG,
        internal: raw & INTERNAL_ERROR_FLAG != 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_payload(timestamp: u32, index: u16, count: u16, samples: &[i32]) -> Vec<u8> {
        Response::Scan(ScanInfo {
            timestamp,
            message_index: index,
            message_count: count,
            num_message_samples: samples.len() as u16,
            samples: samples.to_vec(),
            ..Default::default()
        })
        .encode()
        .unwrap()
    }

    #[test]
    fn status_confirm() {
        let response = set_config_confirm(&[0, 0, 0, 0]).unwrap();
        assert_eq!(
            response,
            Response::Status {
                kind: MessageKind::SetConfigConfirm,
                status: 0
            }
        );
        assert_eq!(response.status(), Some(0));
    }

    #[test]
    #[should_panic(expected = "DecodeTruncated")]
    fn truncated_status_confirm() {
        control_confirm(&[0, 0]).unwrap();
    }

    #[test]
    fn scan_info_fields() {
        let payload = scan_payload(42, 1, 3, &[7, -7, 1 << 20]);
        assert_eq!(payload.len(), SCAN_HEADER_SIZE + 12);

        let Response::Scan(info) = scan_info(&payload).unwrap() else {
            panic!("expected scan info");
        };
        assert_eq!(info.timestamp, 42);
        assert_eq!(info.message_index, 1);
        assert_eq!(info.message_count, 3);
        assert_eq!(info.samples, vec![7, -7, 1 << 20]);
    }

    #[test]
    #[should_panic(expected = "DecodeTruncated")]
    fn scan_info_without_header() {
        scan_info(&[0; 20]).unwrap();
    }

    #[test]
    fn generic_error_splits_internal_flag() {
        let rejected = generic_error(&[0x10, 0x03, 0x00, 0x07, 0x00, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(
            rejected,
            Response::Error(GenericError {
                target_kind: 0x1003,
                target_id: 7,
                code: 2,
                internal: false
            })
        );

        let fault = generic_error(&[0x10, 0x03, 0x00, 0x07, 0x80, 0x00, 0x00, 0x05]).unwrap();
        assert_eq!(
            fault,
            Response::Error(GenericError {
                target_kind: 0x1003,
                target_id: 7,
                code: 5,
                internal: true
            })
        );
    }

    #[test]
    fn status_info_package_version() {
        let info = StatusInfo {
            serial_number: 100234,
            temperature: -12,
            package_version: "MRM 3.0".into(),
            ..Default::default()
        };
        let payload = Response::StatusInfo(info.clone()).encode().unwrap();
        assert_eq!(payload.len(), 60);
        assert_eq!(
            get_status_info_confirm(&payload).unwrap(),
            Response::StatusInfo(info)
        );
    }
}
