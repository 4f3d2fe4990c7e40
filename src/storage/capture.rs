use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_std_read, encode_into_std_write,
};
use log::{info, warn};

use super::StorageError;
use crate::session::Frame;

/// Leading record of a capture log.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct CaptureHeader {
    /// Samples in every frame record.
    pub point_count: u32,
    pub frame_count: u32,
    /// Range window in meters, distance correction applied.
    pub start_range: f64,
    pub end_range: f64,
}

/// A capture log loaded back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub header: CaptureHeader,
    pub frames: Vec<Frame>,
}

fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Writes `frames` to a new capture log at `path`.
///
/// The point count is taken from the first frame; any other frame is padded
/// with zeros or truncated to match.
pub fn write_capture(
    path: impl AsRef<Path>,
    frames: &[Frame],
    start_range: f64,
    end_range: f64,
) -> Result<CaptureHeader, StorageError> {
    let path = path.as_ref();
    let config = config();
    let point_count = frames.first().map_or(0, |frame| frame.samples.len());

    let header = CaptureHeader {
        point_count: u32::try_from(point_count)
            .map_err(|_| StorageError::TooLarge(point_count))?,
        frame_count: u32::try_from(frames.len())
            .map_err(|_| StorageError::TooLarge(frames.len()))?,
        start_range,
        end_range,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    encode_into_std_write(header, &mut writer, config)?;

    for frame in frames {
        if frame.samples.len() != point_count {
            warn!(
                "frame {} has {} samples, storing {point_count}",
                frame.timestamp,
                frame.samples.len()
            );
        }
        encode_into_std_write(frame.timestamp, &mut writer, config)?;
        let padding = std::iter::repeat(&0);
        for sample in frame.samples.iter().chain(padding).take(point_count) {
            encode_into_std_write(*sample, &mut writer, config)?;
        }
    }
    writer.flush()?;

    info!(
        "wrote {} frames of {point_count} samples to {}",
        frames.len(),
        path.display()
    );
    Ok(header)
}

/// Loads a capture log written by [`write_capture`].
pub fn read_capture(path: impl AsRef<Path>) -> Result<Capture, StorageError> {
    let config = config();
    let mut reader = BufReader::new(File::open(path)?);

    let header: CaptureHeader = decode_from_std_read(&mut reader, config)?;
    let mut frames = Vec::new();
    for _ in 0..header.frame_count {
        let timestamp: u32 = decode_from_std_read(&mut reader, config)?;
        let samples = (0..header.point_count)
            .map(|_| decode_from_std_read::<i32, _, _>(&mut reader, config))
            .collect::<Result<Vec<_>, _>>()?;
        frames.push(Frame { timestamp, samples });
    }

    Ok(Capture { header, frames })
}
