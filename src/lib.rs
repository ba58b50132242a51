//! Read GROMACS xtc trajectories.
//!
//! An xtc file is a sequence of frame records, each holding a timestep's
//! atom positions compressed to fixed-point integers and bit-packed. This
//! crate decodes those records sequentially or by random access:
//!
//! ```no_run
//! use xtcio::XTCReader;
//!
//! # fn main() -> xtcio::Result<()> {
//! let mut reader = XTCReader::open("md.xtc")?;
//! let frame = reader.read_frame()?;
//! println!("t = {} ps, {} atoms", frame.time, frame.natoms());
//! # Ok(())
//! # }
//! ```
//!
//! Random access goes through frame and atom selections:
//!
//! ```no_run
//! use xtcio::{AtomSelection, FrameRange, FrameSelection, XTCReader};
//!
//! # fn main() -> xtcio::Result<()> {
//! let mut reader = XTCReader::open("md.xtc")?;
//! // Every second frame of the first hundred, three atoms each.
//! let frames = reader.read_frames(
//!     &FrameSelection::Range(FrameRange::new(None, Some(100), std::num::NonZeroI64::new(2))),
//!     &AtomSelection::Indices(vec![0, 5, 10]),
//! )?;
//! # Ok(())
//! # }
//! ```

use glam::{Mat3, Vec3};

pub mod bits;
pub mod codec;
pub mod error;
pub mod header;
pub mod index;
pub mod reader;
pub mod selection;

pub use crate::error::{Error, Result};
pub use crate::header::{FrameHeader, MAGIC};
pub use crate::index::FrameIndex;
pub use crate::reader::{ReadConfig, XTCReader};
pub use crate::selection::{AtomSelection, FrameRange, FrameSelection};

/// The simulation cell of a frame. The file's three row vectors are the
/// matrix columns.
pub type BoxVec = Mat3;

/// One decoded timestep: positions, cell, and metadata.
///
/// Positions are flat `x y z` triplets in nanometers; ownership passes to
/// the caller on every read.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frame {
    pub step: i64,
    /// Time in picoseconds.
    pub time: f64,
    pub boxvec: BoxVec,
    /// Fixed-point scale the positions were stored with; zero for frames
    /// small enough to be stored uncompressed.
    pub precision: f32,
    pub positions: Vec<f32>,
}

impl Frame {
    pub fn natoms(&self) -> usize {
        self.positions.len() / 3
    }

    /// The positions as vectors.
    pub fn coords(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions.chunks_exact(3).map(Vec3::from_slice)
    }
}

/// Bytes of zero padding that follow a `count`-byte block to keep records
/// aligned to 32-bit boundaries.
pub const fn padding(count: usize) -> usize {
    (4 - count % 4) % 4
}
