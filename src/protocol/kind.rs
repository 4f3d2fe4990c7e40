use std::{fmt, str::FromStr};

use super::codec::CodecError;

macro_rules! message_kinds {
    ($($variant:ident = $code:literal => $name:literal,)+) => {
        /// Wire identifier of every message the radar understands or emits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum MessageKind {
            $($variant = $code,)+
        }

        impl MessageKind {
            pub const ALL: &'static [MessageKind] = &[$(MessageKind::$variant,)+];

            /// Symbolic name as used by the device API documentation.
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageKind::$variant => $name,)+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(MessageKind::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<u16> for MessageKind {
            type Error = CodecError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(MessageKind::$variant),)+
                    code => Err(CodecError::UnknownMessageKind(format!("{code:#06x}"))),
                }
            }
        }
    };
}

message_kinds! {
    SetConfigRequest = 0x1001 => "MRM_SET_CONFIG_REQUEST",
    GetConfigRequest = 0x1002 => "MRM_GET_CONFIG_REQUEST",
    ControlRequest = 0x1003 => "MRM_CONTROL_REQUEST",
    ServerConnectRequest = 0x1004 => "MRM_SERVER_CONNECT_REQUEST",
    ServerDisconnectRequest = 0x1005 => "MRM_SERVER_DISCONNECT_REQUEST",
    SetFilterConfigRequest = 0x1006 => "MRM_SET_FILTER_CONFIG_REQUEST",
    GetFilterConfigRequest = 0x1007 => "MRM_GET_FILTER_CONFIG_REQUEST",
    SetConfigConfirm = 0x1101 => "MRM_SET_CONFIG_CONFIRM",
    GetConfigConfirm = 0x1102 => "MRM_GET_CONFIG_CONFIRM",
    ControlConfirm = 0x1103 => "MRM_CONTROL_CONFIRM",
    ServerConnectConfirm = 0x1104 => "MRM_SERVER_CONNECT_CONFIRM",
    ServerDisconnectConfirm = 0x1105 => "MRM_SERVER_DISCONNECT_CONFIRM",
    SetFilterConfigConfirm = 0x1106 => "MRM_SET_FILTER_CONFIG_CONFIRM",
    GetFilterConfigConfirm = 0x1107 => "MRM_GET_FILTER_CONFIG_CONFIRM",
    GetStatusInfoRequest = 0xF001 => "MRM_GET_STATUSINFO_REQUEST",
    RebootRequest = 0xF002 => "MRM_REBOOT_REQUEST",
    SetOpModeRequest = 0xF003 => "MRM_SET_OPMODE_REQUEST",
    SetSleepModeRequest = 0xF005 => "MRM_SET_SLEEPMODE_REQUEST",
    GetSleepModeRequest = 0xF006 => "MRM_GET_SLEEPMODE_REQUEST",
    GetStatusInfoConfirm = 0xF101 => "MRM_GET_STATUSINFO_CONFIRM",
    RebootConfirm = 0xF102 => "MRM_REBOOT_CONFIRM",
    SetOpModeConfirm = 0xF103 => "MRM_SET_OPMODE_CONFIRM",
    SetSleepModeConfirm = 0xF105 => "MRM_SET_SLEEPMODE_CONFIRM",
    GetSleepModeConfirm = 0xF106 => "MRM_GET_SLEEPMODE_CONFIRM",
    GenericError = 0xF10C => "MRM_GENERROR",
    ScanInfo = 0xF201 => "MRM_SCAN_INFO",
    ReadyInfo = 0xF202 => "MRM_READY_INFO",
}

impl MessageKind {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl From<MessageKind> for u16 {
    fn from(value: MessageKind) -> Self {
        value.code()
    }
}

impl FromStr for MessageKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::from_name(s).ok_or_else(|| CodecError::UnknownMessageKind(s.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_name_resolve_both_ways() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::try_from(kind.code()).unwrap(), *kind);
            assert_eq!(kind.name().parse::<MessageKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn catalog_codes() {
        assert_eq!(MessageKind::SetConfigRequest.code(), 0x1001);
        assert_eq!(MessageKind::GenericError.code(), 0xF10C);
        assert_eq!(MessageKind::ScanInfo.name(), "MRM_SCAN_INFO");
    }

    #[test]
    #[should_panic(expected = "UnknownMessageKind")]
    fn unknown_code() {
        MessageKind::try_from(0x1201).unwrap();
    }

    #[test]
    #[should_panic(expected = "UnknownMessageKind")]
    fn unknown_name() {
        "MRM_DETECTION_LIST_INFO".parse::<MessageKind>().unwrap();
    }
}
