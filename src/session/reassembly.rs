//! Reassembly of fragmented scan telemetry.
//!
//! The radar splits each scan into several [`ScanInfo`] fragments sharing the
//! scan timestamp. UDP may deliver them in any order or drop some entirely, so
//! fragments are collected into a [`FragmentBucket`] per timestamp. A bucket is
//! turned into a [`Frame`] as soon as all its parts are present, and dropped
//! once a fragment at least [`STALENESS_WINDOW`] timestamp units newer has
//! been seen.
use std::collections::HashMap;

use log::{debug, warn};

use crate::protocol::ScanInfo;

/// Age, in timestamp units, after which an incomplete bucket is discarded.
pub const STALENESS_WINDOW: u32 = 3000;

/// A fully reassembled scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub timestamp: u32,
    pub samples: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct FragmentBucket {
    total_parts: u16,
    fragments: Vec<(u16, Vec<i32>)>,
}

impl FragmentBucket {
    fn new(total_parts: u16) -> Self {
        Self {
            total_parts,
            fragments: Vec::with_capacity(total_parts as usize),
        }
    }

    pub fn total_parts(&self) -> u16 {
        self.total_parts
    }

    pub fn parts_received(&self) -> u16 {
        self.fragments.len() as u16
    }

    fn is_complete(&self) -> bool {
        self.parts_received() == self.total_parts
    }

    fn into_frame(mut self, timestamp: u32) -> Frame {
        self.fragments.sort_by_key(|(index, _)| *index);
        let samples = self
            .fragments
            .into_iter()
            .flat_map(|(_, samples)| samples)
            .collect();
        Frame { timestamp, samples }
    }
}

/// Outcome of feeding one fragment to the store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Ingested {
    pub frame: Option<Frame>,
    /// Timestamps of incomplete scans evicted as stale.
    pub evicted: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct FragmentStore {
    buckets: HashMap<u32, FragmentBucket>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, timestamp: u32) -> Option<&FragmentBucket> {
        self.buckets.get(&timestamp)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Files a fragment under its timestamp, completes the bucket if this was
    /// its last part, then evicts buckets that have gone stale relative to
    /// this fragment's timestamp.
    pub fn ingest(&mut self, info: ScanInfo) -> Ingested {
        let timestamp = info.timestamp;
        let mut out = Ingested {
            frame: self.file(info),
            evicted: Vec::new(),
        };

        if let Some(cutoff) = timestamp.checked_sub(STALENESS_WINDOW) {
            self.buckets.retain(|ts, bucket| {
                if *ts <= cutoff {
                    warn!(
                        "discarded scan {ts}: {} of {} fragments missing",
                        bucket.total_parts - bucket.parts_received(),
                        bucket.total_parts
                    );
                    out.evicted.push(*ts);
                    false
                } else {
                    true
                }
            });
            out.evicted.sort_unstable();
        }

        out
    }

    fn file(&mut self, info: ScanInfo) -> Option<Frame> {
        let ScanInfo {
            timestamp,
            message_index: index,
            message_count: count,
            samples,
            ..
        } = info;

        if count == 0 || index >= count {
            warn!("dropped fragment {index}/{count} of scan {timestamp}: index out of range");
            return None;
        }

        let bucket = self
            .buckets
            .entry(timestamp)
            .or_insert_with(|| FragmentBucket::new(count));

        if bucket.total_parts != count {
            warn!(
                "dropped fragment {index} of scan {timestamp}: count {count} disagrees with {}",
                bucket.total_parts
            );
            return None;
        }
        if bucket.fragments.iter().any(|(i, _)| *i == index) {
            debug!("duplicate fragment {index} of scan {timestamp}");
            return None;
        }

        bucket.fragments.push((index, samples));
        if !bucket.is_complete() {
            return None;
        }

        self.buckets
            .remove(&timestamp)
            .map(|bucket| bucket.into_frame(timestamp))
    }
}
