//! Parsing of the fixed-layout record header that precedes each frame.
//!
//! All multi-byte values are big-endian. A record is laid out as
//!
//! ```text
//! magic      : i32    (1995)
//! natoms     : i32
//! step       : i32
//! time       : f32
//! box        : 9 × f32 (row vectors of the simulation cell)
//! natoms     : i32    (repeated)
//! -- natoms > 9 --------------------------------
//! precision  : f32
//! min_int    : 3 × i32
//! max_int    : 3 × i32
//! small_idx  : i32
//! nbytes     : i32
//! payload    : nbytes bytes, padded to a 4-byte boundary
//! -- natoms <= 9 -------------------------------
//! positions  : natoms × 3 × f32 (uncompressed)
//! ```

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use glam::DMat3;

use crate::error::{Error, Result};
use crate::padding;

/// The format-identifying constant leading every frame record.
pub const MAGIC: i32 = 1995;

/// Frames with at most this many atoms store plain uncompressed floats.
pub(crate) const PLAIN_ATOM_LIMIT: u32 = 9;

/// Bytes from the magic number up to and including the repeated atom count.
pub(crate) const FIXED_HEADER_LEN: u64 = 56;

/// Bytes from the magic number up to and including the compressed byte
/// count, for frames that carry a compressed payload.
pub(crate) const COMPRESSED_HEADER_LEN: u64 = 92;

/// Metadata of one frame, parsed from the record header.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub natoms: u32,
    pub step: i64,
    /// Time in picoseconds.
    pub time: f64,
    /// Simulation cell, file row vectors as matrix columns.
    pub boxvec: DMat3,
    /// Fixed-point scale of the coordinate block; zero for the small
    /// uncompressed frames that never carried one.
    pub precision: f32,
    /// Byte length of the coordinate payload, excluding padding.
    pub compressed_len: u32,
}

/// Parameters of the compressed coordinate block, consumed by the codec.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CodecPrelude {
    pub min_int: [i32; 3],
    pub max_int: [i32; 3],
    pub small_idx: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload {
    /// Uncompressed f32 triplets, used when `natoms <= PLAIN_ATOM_LIMIT`.
    Plain,
    Compressed(CodecPrelude),
}

/// One parsed record header plus the information needed to skip over or
/// decode the payload that follows it.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub header: FrameHeader,
    pub payload: Payload,
    /// Total record length in bytes, header and padded payload included.
    pub len: u64,
}

/// Parse the record header at the source's current position.
///
/// Returns `Ok(None)` on a clean end of data (not a single byte left), so
/// that sequential readers and the index scan can tell "no more frames"
/// apart from a record that stops short partway through
/// ([`Error::TruncatedInput`]).
pub(crate) fn parse_record<R: Read>(src: &mut R) -> Result<Option<Record>> {
    let magic = match read_magic(src)? {
        Some(magic) => magic,
        None => return Ok(None),
    };
    if magic != MAGIC {
        return Err(Error::WrongMagicNumber { found: magic });
    }

    let read = |e| Error::from_read(e, "frame header");
    let natoms = src.read_i32::<BigEndian>().map_err(read)?;
    if natoms < 0 {
        return Err(Error::CorruptFrame {
            reason: "negative atom count",
        });
    }
    let natoms = natoms as u32;
    let step = src.read_i32::<BigEndian>().map_err(read)? as i64;
    let time = src.read_f32::<BigEndian>().map_err(read)? as f64;

    let mut cell = [0.0f64; 9];
    for value in &mut cell {
        *value = src.read_f32::<BigEndian>().map_err(read)? as f64;
    }
    let boxvec = DMat3::from_cols_array(&cell);

    let natoms_repeated = src.read_i32::<BigEndian>().map_err(read)?;
    if natoms_repeated != natoms as i32 {
        return Err(Error::CorruptFrame {
            reason: "repeated atom count does not match",
        });
    }

    if natoms <= PLAIN_ATOM_LIMIT {
        let payload_len = natoms as u64 * 12;
        return Ok(Some(Record {
            header: FrameHeader {
                natoms,
                step,
                time,
                boxvec,
                precision: 0.0,
                compressed_len: payload_len as u32,
            },
            payload: Payload::Plain,
            len: FIXED_HEADER_LEN + payload_len,
        }));
    }

    let precision = src.read_f32::<BigEndian>().map_err(read)?;
    let mut min_int = [0i32; 3];
    let mut max_int = [0i32; 3];
    for value in &mut min_int {
        *value = src.read_i32::<BigEndian>().map_err(read)?;
    }
    for value in &mut max_int {
        *value = src.read_i32::<BigEndian>().map_err(read)?;
    }
    let small_idx = src.read_i32::<BigEndian>().map_err(read)?;
    if small_idx < 0 {
        return Err(Error::CorruptFrame {
            reason: "negative small-delta table index",
        });
    }
    let nbytes = src.read_i32::<BigEndian>().map_err(read)?;
    if nbytes < 0 {
        return Err(Error::CorruptFrame {
            reason: "negative compressed block size",
        });
    }
    let compressed_len = nbytes as u32;

    Ok(Some(Record {
        header: FrameHeader {
            natoms,
            step,
            time,
            boxvec,
            precision,
            compressed_len,
        },
        payload: Payload::Compressed(CodecPrelude {
            min_int,
            max_int,
            small_idx: small_idx as u32,
        }),
        len: COMPRESSED_HEADER_LEN + compressed_len as u64 + padding(compressed_len as usize) as u64,
    }))
}

/// Read the four magic bytes, distinguishing a clean end of data from a
/// partially present value.
fn read_magic<R: Read>(src: &mut R) -> Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(i32::from_be_bytes(buf))),
        _ => Err(Error::TruncatedInput {
            context: "frame header magic",
        }),
    }
}
