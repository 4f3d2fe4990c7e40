//! Message registry.
//!
//! Associates every [`MessageKind`] with its encoder (outgoing requests, along
//! with the confirmation they expect) or its decoder (confirmations and
//! unsolicited telemetry). A [`Registry`] is built once from the fixed catalog
//! and is read-only afterwards; sessions share it behind an `Arc`.
use std::collections::HashMap;

use super::{
    MessageKind,
    codec::CodecError,
    request::{self, Encoder},
    response::{self, Decoder},
};

#[derive(Debug, Clone, Copy)]
pub enum RegistryEntry {
    Outgoing {
        encode: Encoder,
        expected_confirm: Option<MessageKind>,
    },
    Incoming {
        decode: Decoder,
    },
}

/// Lookup key: either the numeric wire code or the symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindKey<'a> {
    Code(u16),
    Name(&'a str),
}

impl From<u16> for KindKey<'_> {
    fn from(value: u16) -> Self {
        KindKey::Code(value)
    }
}

impl From<MessageKind> for KindKey<'_> {
    fn from(value: MessageKind) -> Self {
        KindKey::Code(value.code())
    }
}

impl<'a> From<&'a str> for KindKey<'a> {
    fn from(value: &'a str) -> Self {
        KindKey::Name(value)
    }
}

#[derive(Debug)]
pub struct Registry {
    entries: HashMap<MessageKind, RegistryEntry>,
}

impl Registry {
    /// Builds the registry from the device catalog.
    pub fn new() -> Self {
        use MessageKind::*;

        let outgoing: [(MessageKind, Encoder, Option<MessageKind>); 12] = [
            (SetConfigRequest, request::set_config, Some(SetConfigConfirm)),
            (GetConfigRequest, request::get_config, Some(GetConfigConfirm)),
            (ControlRequest, request::control, Some(ControlConfirm)),
            (
                ServerConnectRequest,
                request::server_connect,
                Some(ServerConnectConfirm),
            ),
            (
                ServerDisconnectRequest,
                request::server_disconnect,
                Some(ServerDisconnectConfirm),
            ),
            (
                SetFilterConfigRequest,
                request::set_filter_config,
                Some(SetFilterConfigConfirm),
            ),
            (
                GetFilterConfigRequest,
                request::get_filter_config,
                Some(GetFilterConfigConfirm),
            ),
            (
                GetStatusInfoRequest,
                request::get_status_info,
                Some(GetStatusInfoConfirm),
            ),
            (RebootRequest, request::reboot, Some(RebootConfirm)),
            (SetOpModeRequest, request::set_op_mode, Some(SetOpModeConfirm)),
            (
                SetSleepModeRequest,
                request::set_sleep_mode,
                Some(SetSleepModeConfirm),
            ),
            (
                GetSleepModeRequest,
                request::get_sleep_mode,
                Some(GetSleepModeConfirm),
            ),
        ];

        let incoming: [(MessageKind, Decoder); 15] = [
            (SetConfigConfirm, response::set_config_confirm),
            (GetConfigConfirm, response::get_config_confirm),
            (ControlConfirm, response::control_confirm),
            (ServerConnectConfirm, response::server_connect_confirm),
            (ServerDisconnectConfirm, response::server_disconnect_confirm),
            (SetFilterConfigConfirm, response::set_filter_config_confirm),
            (GetFilterConfigConfirm, response::get_filter_config_confirm),
            (GetStatusInfoConfirm, response::get_status_info_confirm),
            (RebootConfirm, response::reboot_confirm),
            (SetOpModeConfirm, response::set_op_mode_confirm),
            (SetSleepModeConfirm, response::set_sleep_mode_confirm),
            (GetSleepModeConfirm, response::get_sleep_mode_confirm),
            (ScanInfo, response::scan_info),
            (ReadyInfo, response::ready_info),
            (GenericError, response::generic_error),
        ];

        let mut entries = HashMap::with_capacity(outgoing.len() + incoming.len());
        for (kind, encode, expected_confirm) in outgoing {
            entries.insert(
                kind,
                RegistryEntry::Outgoing {
                    encode,
                    expected_confirm,
                },
            );
        }
        for (kind, decode) in incoming {
            entries.insert(kind, RegistryEntry::Incoming { decode });
        }

        Self { entries }
    }

    /// Resolves a code or name to its message kind and entry.
    pub fn lookup<'a>(
        &self,
        key: impl Into<KindKey<'a>>,
    ) -> Result<(MessageKind, &RegistryEntry), CodecError> {
        let key = key.into();
        let kind = match key {
            KindKey::Code(code) => MessageKind::try_from(code)?,
            KindKey::Name(name) => name.parse()?,
        };

        self.entries
            .get(&kind)
            .map(|entry| (kind, entry))
            .ok_or_else(|| CodecError::UnknownMessageKind(kind.name().to_string()))
    }

    /// Encoder and expected confirmation for an outgoing kind.
    pub fn outgoing(
        &self,
        kind: MessageKind,
    ) -> Result<(Encoder, Option<MessageKind>), CodecError> {
        match self.lookup(kind)? {
            (
                _,
                RegistryEntry::Outgoing {
                    encode,
                    expected_confirm,
                },
            ) => Ok((*encode, *expected_confirm)),
            _ => Err(CodecError::UnknownMessageKind(format!(
                "{} is not a request",
                kind.name()
            ))),
        }
    }

    /// Decodes an incoming payload of `kind`.
    pub fn decode(&self, kind: MessageKind, payload: &[u8]) -> Result<response::Response, CodecError> {
        match self.lookup(kind)? {
            (_, RegistryEntry::Incoming { decode }) => decode(payload),
            _ => Err(CodecError::UnknownMessageKind(format!(
                "{} is not an incoming message",
                kind.name()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
