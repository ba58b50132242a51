//! Frame and atom selections.
//!
//! Frame selection follows slice semantics as Python defines them: optional
//! `start`/`stop` bounds that may be negative (counted from the end), and a
//! non-zero `step` that may run backwards. Resolving a selection therefore
//! needs the total frame count, which is only known once the index is
//! built.
//!
//! Atom selection is an explicit ordered list of indices. The order is
//! preserved in the output, repeats are allowed, and every index must be
//! in range for the frame it is applied to.

use std::num::NonZeroI64;

use crate::error::{Error, Result};

/// A `start:stop:step` frame range.
///
/// Open bounds resolve against the frame count depending on the step's
/// direction, and negative bounds count from the end (`-1` is the last
/// frame). A range whose bounds are inconsistent with its step direction
/// resolves to the empty sequence rather than an error, exactly like
/// slicing a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: NonZeroI64,
}

impl FrameRange {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<NonZeroI64>) -> Self {
        Self {
            start,
            stop,
            step: step.unwrap_or(NonZeroI64::new(1).unwrap()),
        }
    }

    /// The ordinal sequence this range selects out of `frame_count`
    /// frames, in visit order.
    pub fn resolve(&self, frame_count: u64) -> Vec<u64> {
        let n = frame_count as i64;
        let step = self.step.get();

        // Bound normalization as CPython's slice machinery does it: shift
        // negatives by the length, then clamp to the valid range for the
        // step's direction.
        let clamp = |bound: Option<i64>, open_default: i64| -> i64 {
            match bound {
                None => open_default,
                Some(mut value) => {
                    if value < 0 {
                        value += n;
                        if value < 0 {
                            value = if step < 0 { -1 } else { 0 };
                        }
                    } else if value >= n {
                        value = if step < 0 { n - 1 } else { n };
                    }
                    value
                }
            }
        };

        let (start, stop) = if step > 0 {
            (clamp(self.start, 0), clamp(self.stop, n))
        } else {
            (clamp(self.start, n - 1), clamp(self.stop, -1))
        };

        let mut ordinals = Vec::new();
        let mut at = start;
        if step > 0 {
            while at < stop {
                ordinals.push(at as u64);
                at += step;
            }
        } else {
            while at > stop {
                ordinals.push(at as u64);
                at += step;
            }
        }
        ordinals
    }
}

impl Default for FrameRange {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Which frames of a trajectory to read.
#[derive(Debug, Default, Clone)]
pub enum FrameSelection {
    /// Every frame, first to last.
    #[default]
    All,
    /// The frames a [`FrameRange`] selects.
    Range(FrameRange),
    /// Explicit frame ordinals, visited in the given order.
    List(Vec<u64>),
}

impl FrameSelection {
    /// Resolve to the concrete ordinal sequence for a trajectory of
    /// `frame_count` frames.
    ///
    /// Ranges clamp to the trajectory like slices do; an explicit list is
    /// checked strictly, since a listed ordinal that does not exist is a
    /// caller mistake rather than an open bound.
    pub fn resolve(&self, frame_count: u64) -> Result<Vec<u64>> {
        match self {
            Self::All => Ok((0..frame_count).collect()),
            Self::Range(range) => Ok(range.resolve(frame_count)),
            Self::List(ordinals) => {
                for &ordinal in ordinals {
                    if ordinal >= frame_count {
                        return Err(Error::OutOfRangeSelection {
                            kind: "frame",
                            index: ordinal,
                            bound: frame_count,
                        });
                    }
                }
                Ok(ordinals.clone())
            }
        }
    }
}

/// Which atoms to keep from each selected frame.
#[derive(Debug, Default, Clone)]
pub enum AtomSelection {
    /// Keep every atom.
    #[default]
    All,
    /// Keep the atoms at these indices, in this order. Indices may repeat
    /// and need not be sorted.
    Indices(Vec<u32>),
}

impl AtomSelection {
    /// Check every index against the frame's atom count.
    pub(crate) fn validate(&self, natoms: u32) -> Result<()> {
        if let Self::Indices(indices) = self {
            for &index in indices {
                if index >= natoms {
                    return Err(Error::OutOfRangeSelection {
                        kind: "atom",
                        index: index as u64,
                        bound: natoms as u64,
                    });
                }
            }
        }
        Ok(())
    }

    /// How many leading atoms of a frame must be decoded to serve this
    /// selection. Decoding can stop at the highest requested index.
    pub(crate) fn decode_limit(&self, natoms: u32) -> u32 {
        match self {
            Self::All => natoms,
            Self::Indices(indices) => indices
                .iter()
                .max()
                .map_or(0, |&max| (max + 1).min(natoms)),
        }
    }

    /// The number of atoms each output frame will hold.
    pub(crate) fn natoms_out(&self, natoms: u32) -> usize {
        match self {
            Self::All => natoms as usize,
            Self::Indices(indices) => indices.len(),
        }
    }

    /// Copy the selected rows out of a decoded position block, preserving
    /// the selection's order.
    pub(crate) fn gather(&self, decoded: &[f32], out: &mut Vec<f32>) {
        out.clear();
        match self {
            Self::All => out.extend_from_slice(decoded),
            Self::Indices(indices) => {
                out.reserve(indices.len() * 3);
                for &index in indices {
                    let at = index as usize * 3;
                    out.extend_from_slice(&decoded[at..at + 3]);
                }
            }
        }
    }
}
