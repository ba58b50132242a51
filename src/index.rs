//! The frame index: a map from frame ordinal to byte offset.
//!
//! Seeking to frame `n` without an index means decoding every record before
//! it. The index is built once by a forward scan that parses each header
//! and hops over its payload, and is cached for the reader's lifetime. It
//! is a derived value: refreshing it rebuilds the whole table from the
//! source, entries are never edited in place.

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::error::{Error, Result};
use crate::header;

#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    /// Byte offset of each frame record, indexed by ordinal. Strictly
    /// increasing.
    offsets: Vec<u64>,
}

impl FrameIndex {
    /// Build the index by scanning `src` from byte 0.
    ///
    /// A record that stops short at the end of the data (a simulation
    /// still writing, or a copy that was cut off) is treated as an
    /// incomplete final frame and left out. If not even one complete frame
    /// exists the trajectory is unusable and this fails with
    /// [`Error::EmptyOrInvalidTrajectory`]. Any malformed record further
    /// in is a real structural problem and fails the scan.
    pub(crate) fn scan<R: Read + Seek>(src: &mut R) -> Result<Self> {
        let source_len = src.seek(SeekFrom::End(0))?;

        let mut offsets = Vec::new();
        let mut pos = 0u64;
        loop {
            src.seek(SeekFrom::Start(pos))?;
            match header::parse_record(src) {
                Ok(Some(record)) => {
                    let end = pos + record.len;
                    if end > source_len {
                        // Incomplete final frame: the header is there but
                        // the payload is not.
                        break;
                    }
                    offsets.push(pos);
                    pos = end;
                }
                Ok(None) => break,
                Err(Error::TruncatedInput { .. }) => break,
                Err(err) => return Err(err),
            }
        }

        if offsets.is_empty() {
            return Err(Error::EmptyOrInvalidTrajectory);
        }
        debug!(
            "indexed {} frames over {} bytes ({} trailing)",
            offsets.len(),
            source_len,
            source_len - pos
        );
        Ok(Self { offsets })
    }

    pub fn frame_count(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Byte offset of the record for `ordinal`.
    pub fn offset_of(&self, ordinal: u64) -> Result<u64> {
        self.offsets
            .get(ordinal as usize)
            .copied()
            .ok_or(Error::OutOfRangeSelection {
                kind: "frame",
                index: ordinal,
                bound: self.frame_count(),
            })
    }
}
