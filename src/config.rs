//! Acquisition settings.
//!
//! Ranges are configured in meters and converted to the radar's native unit,
//! the round-trip time of flight in picoseconds. Every setting can be given
//! on the command line or through its `UWB_*` environment variable.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Args;
use thiserror::Error;

use crate::protocol::{CONTINUOUS_SCAN, RadarConfig};

/// Speed of light in millimeters per picosecond.
pub const SPEED_OF_LIGHT: f64 = 0.299_792_458;

pub const DEFAULT_PEER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 151));
pub const DEFAULT_PEER_PORT: u16 = 21210;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("range {0} m does not fit the radar's picosecond window")]
    RangeOutOfBounds(f64),
}

/// Converts a one-way range in meters to round-trip picoseconds.
pub fn range_to_picoseconds(range: f64) -> Result<i32, ConfigError> {
    let picoseconds = (range * 2000.0 / SPEED_OF_LIGHT).round();
    if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&picoseconds) {
        return Err(ConfigError::RangeOutOfBounds(range));
    }
    Ok(picoseconds as i32)
}

/// Converts round-trip picoseconds to a one-way range in meters.
pub fn picoseconds_to_range(picoseconds: i32) -> f64 {
    f64::from(picoseconds) * SPEED_OF_LIGHT / 2000.0
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct AcquisitionConfig {
    /// Radar IP address
    #[arg(long = "ip", env = "UWB_PEER_IP", default_value_t = DEFAULT_PEER_IP)]
    pub peer_ip: IpAddr,

    /// Radar UDP port
    #[arg(long = "port", env = "UWB_PEER_PORT", default_value_t = DEFAULT_PEER_PORT)]
    pub peer_port: u16,

    /// Start of the scan window in meters
    #[arg(long, env = "UWB_SCAN_START", default_value_t = 4.0)]
    pub scan_start: f64,

    /// End of the scan window in meters
    #[arg(long, env = "UWB_SCAN_END", default_value_t = 11.9)]
    pub scan_end: f64,

    /// Time between scans in microseconds
    #[arg(long, env = "UWB_SCAN_INTERVAL", default_value_t = 0)]
    pub scan_interval: u32,

    /// Number of scans; 65535 scans until stopped
    #[arg(long, env = "UWB_SCAN_COUNT", default_value_t = CONTINUOUS_SCAN)]
    pub scan_count: u16,

    /// Base integration index (pulses integrated per sample, log2)
    #[arg(long, env = "UWB_INTEGRATION_INDEX", default_value_t = 11)]
    pub integration_index: u16,

    /// Offset in meters added to the stored range window
    #[arg(
        long,
        env = "UWB_DISTANCE_CORRECTION",
        default_value_t = -2.0,
        allow_negative_numbers = true
    )]
    pub distance_correction: f64,

    /// Node id written into the radar configuration
    #[arg(long, env = "UWB_NODE_ID", default_value_t = 6)]
    pub node_id: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            peer_ip: DEFAULT_PEER_IP,
            peer_port: DEFAULT_PEER_PORT,
            scan_start: 4.0,
            scan_end: 11.9,
            scan_interval: 0,
            scan_count: CONTINUOUS_SCAN,
            integration_index: 11,
            distance_correction: -2.0,
            node_id: 6,
        }
    }
}

impl AcquisitionConfig {
    pub fn peer(&self) -> SocketAddr {
        SocketAddr::new(self.peer_ip, self.peer_port)
    }

    /// Configuration block to apply before scanning. Persisted on the radar.
    pub fn radar_config(&self) -> Result<RadarConfig, ConfigError> {
        Ok(RadarConfig {
            node_id: self.node_id,
            scan_start: range_to_picoseconds(self.scan_start)?,
            scan_end: range_to_picoseconds(self.scan_end)?,
            base_integration_index: self.integration_index,
            persist_flag: 1,
            ..Default::default()
        })
    }

    /// Range window to store with a capture, from the configuration the radar
    /// actually applied.
    pub fn capture_range(&self, applied: &RadarConfig) -> (f64, f64) {
        (
            picoseconds_to_range(applied.scan_start) + self.distance_correction,
            picoseconds_to_range(applied.scan_end) + self.distance_correction,
        )
    }
}
