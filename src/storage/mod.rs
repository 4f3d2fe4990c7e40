//! Capture-log storage.
//!
//! A finished acquisition is handed to downstream collaborators as a capture
//! log: one binary file holding every reassembled frame of the acquisition.
//!
//! # Overview
//!
//! The log starts with a [`CaptureHeader`] describing the frame geometry and
//! the range window the frames cover, followed by one record per frame in
//! completion order. Every record carries exactly `point_count` samples, so a
//! reader can seek to any frame without an index.
//!
//! Before saving, [`trim_zero_padding`] strips the trailing zero samples the
//! radar appends to each scan, keeping every frame the same length.
//!
//! # Key Components
//!
//! - [`write_capture`] / [`read_capture`]: the capture-log codec.
//! - [`StorageError`]: failures while writing or reading a log.
//!
//! # See Also
//!
//! - [`session`](crate::session): produces the frames.
//! - [`config`](crate::config): converts the scan window into the stored ranges.
mod capture;

use std::io;

use log::debug;
use thiserror::Error;

use crate::session::Frame;

pub use capture::{Capture, CaptureHeader, read_capture, write_capture};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode capture log: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode capture log: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("count {0} does not fit in a capture log header")]
    TooLarge(usize),
}

/// Truncates every frame to the last non-zero sample found in any frame.
/// Returns the resulting frame length.
pub fn trim_zero_padding(frames: &mut [Frame]) -> usize {
    let len = frames
        .iter()
        .filter_map(|frame| frame.samples.iter().rposition(|s| *s != 0))
        .max()
        .map_or(0, |last| last + 1);

    for frame in frames.iter_mut() {
        frame.samples.truncate(len);
    }
    debug!("trimmed {} frames to {len} samples", frames.len());
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: u32, samples: &[i32]) -> Frame {
        Frame {
            timestamp,
            samples: samples.to_vec(),
        }
    }

    #[test]
    fn trims_to_longest_signal() {
        let mut frames = vec![frame(1, &[1, 2, 0, 0, 0]), frame(2, &[1, 0, 3, 0, 0])];

        assert_eq!(trim_zero_padding(&mut frames), 3);
        assert_eq!(frames[0].samples, vec![1, 2, 0]);
        assert_eq!(frames[1].samples, vec![1, 0, 3]);
    }

    #[test]
    fn keeps_last_sample_when_non_zero() {
        let mut frames = vec![frame(1, &[0, 0, -4])];
        assert_eq!(trim_zero_padding(&mut frames), 3);
    }

    #[test]
    fn all_zero_frames_become_empty() {
        let mut frames = vec![frame(1, &[0, 0]), frame(2, &[0])];
        assert_eq!(trim_zero_padding(&mut frames), 0);
        assert!(frames.iter().all(|f| f.samples.is_empty()));
    }
}
