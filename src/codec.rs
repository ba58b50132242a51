//! Decompression of the per-frame coordinate block.
//!
//! Coordinates are stored as fixed-point integers (physical value times the
//! frame's precision) packed into a single bit stream. Most atoms ride in
//! runs of small deltas against the previously decoded triplet; atoms that
//! a small delta cannot reach are stored as full-width literals. A 1-bit
//! flag after every literal announces whether a run follows, and the 5-bit
//! run field doubles as a rescale instruction for the small-delta width.
//!
//! Decoding is fully deterministic given the block bytes and the precision;
//! no state is carried between frames.

use crate::bits::BitReader;
use crate::error::{Error, Result};
use crate::header::CodecPrelude;

/// The shared table of representable integer ranges. The small-delta width
/// walks up and down this table as the stream requests rescales.
#[rustfmt::skip]
pub const MAGICINTS: [i32; 73] = [
    0,        0,        0,       0,       0,       0,       0,       0,       0,       8,
    10,       12,       16,      20,      25,      32,      40,      50,      64,      80,
    101,      128,      161,     203,     256,     322,     406,     512,     645,     812,
    1024,     1290,     1625,    2048,    2580,    3250,    4096,    5060,    6501,    8192,
    10321,    13003,    16384,   20642,   26007,   32768,   41285,   52015,   65536,   82570,
    104031,   131072,   165140,  208063,  262144,  330280,  416127,  524287,  660561,  832255,
    1048576,  1321122,  1664510, 2097152, 2642245, 3329021, 4194304, 5284491, 6658042, 8388607,
    10568983, 13316085, 16777216
];

/// First table entry with a non-zero range; `MAGICINTS[FIRSTIDX - 1] == 0`.
pub const FIRSTIDX: usize = 9;

/// The number of bits needed to represent an unsigned value below `size`.
#[inline]
pub const fn bits_for(size: u32) -> u32 {
    let mut n = 1u64;
    let mut nbits = 0;
    while size as u64 >= n && nbits < 32 {
        nbits += 1;
        n <<= 1;
    }
    nbits
}

/// The number of bits needed for a packed triplet of magnitudes below
/// `sizes`, i.e. the bit length of `sizes[0] * sizes[1] * sizes[2]`.
pub fn bits_for_triplet(sizes: [u32; 3]) -> u32 {
    let product = sizes[0] as u128 * sizes[1] as u128 * sizes[2] as u128;
    let mut n = 1u128;
    let mut nbits = 0;
    while product >= n {
        nbits += 1;
        if nbits >= 128 {
            break;
        }
        n <<= 1;
    }
    nbits
}

/// Per-axis range widths for the literal triplets of one frame.
struct AxisSizes {
    /// Magnitude range per axis (`max - min + 1`).
    sizes: [u32; 3],
    /// Packed width for one literal triplet, or zero when the combined
    /// range overflows and each axis is stored at its own width.
    packed_bits: u32,
    /// Per-axis widths, used only when `packed_bits` is zero.
    axis_bits: [u32; 3],
}

fn axis_sizes(prelude: &CodecPrelude) -> Result<AxisSizes> {
    let mut sizes = [0u32; 3];
    for axis in 0..3 {
        let span = prelude.max_int[axis] as i64 - prelude.min_int[axis] as i64;
        if !(0..=u32::MAX as i64 - 1).contains(&span) {
            return Err(Error::CorruptFrame {
                reason: "coordinate range is inverted or oversized",
            });
        }
        sizes[axis] = span as u32 + 1;
    }

    // A combined range beyond 24 bits per axis cannot be packed into one
    // integer; each axis is then coded at its own width.
    if (sizes[0] | sizes[1] | sizes[2]) > 0xffffff {
        let axis_bits = [bits_for(sizes[0]), bits_for(sizes[1]), bits_for(sizes[2])];
        return Ok(AxisSizes {
            sizes,
            packed_bits: 0,
            axis_bits,
        });
    }

    Ok(AxisSizes {
        packed_bits: bits_for_triplet(sizes),
        sizes,
        axis_bits: [0; 3],
    })
}

/// Decode the compressed coordinate block in `payload` into `out`.
///
/// `declared_len` is the byte count announced in the frame record;
/// `payload` may be a shorter prefix when the caller is probing (the
/// resulting `TruncatedInput` tells it to fetch the rest). At most `limit`
/// atoms are materialized, three `f32` components each, scaled by
/// `1 / precision`.
///
/// When the whole frame is decoded (`limit == natoms` and the payload is
/// complete), the bytes consumed must match `declared_len` exactly, and a
/// run that promises more atoms than the header announced is rejected.
pub(crate) fn decode_positions(
    payload: &[u8],
    declared_len: usize,
    prelude: &CodecPrelude,
    natoms: u32,
    precision: f32,
    limit: u32,
    out: &mut Vec<f32>,
) -> Result<()> {
    let inv_precision = precision.recip();
    let min_int = prelude.min_int;
    let axes = axis_sizes(prelude)?;

    let mut small_idx = prelude.small_idx as usize;
    if small_idx >= MAGICINTS.len() || MAGICINTS[small_idx] == 0 {
        return Err(Error::CorruptFrame {
            reason: "small-delta table index out of range",
        });
    }
    let mut smaller = MAGICINTS[small_idx.saturating_sub(1).max(FIRSTIDX)] / 2;
    let mut small_num = MAGICINTS[small_idx] / 2;
    let mut size_small = [MAGICINTS[small_idx] as u32; 3];

    let target = limit.min(natoms) as usize * 3;
    out.clear();
    if target == 0 {
        return Ok(());
    }
    out.reserve(target);

    let mut bits = BitReader::new(payload);
    let mut prev = [0i32; 3];
    let mut decoded: u32 = 0;

    fn push(out: &mut Vec<f32>, coord: [i32; 3], inv_precision: f32) {
        out.push(coord[0] as f32 * inv_precision);
        out.push(coord[1] as f32 * inv_precision);
        out.push(coord[2] as f32 * inv_precision);
    }

    'atoms: while decoded < natoms {
        let mut coord = if axes.packed_bits == 0 {
            [
                bits.take(axes.axis_bits[0])? as i32,
                bits.take(axes.axis_bits[1])? as i32,
                bits.take(axes.axis_bits[2])? as i32,
            ]
        } else {
            bits.take_packed(axes.packed_bits, axes.sizes)?
        };
        decoded += 1;
        coord[0] += min_int[0];
        coord[1] += min_int[1];
        coord[2] += min_int[2];
        prev = coord;

        let mut run = 0i32;
        let mut is_smaller = 0i32;
        if bits.take(1)? == 1 {
            run = bits.take(5)? as i32;
            is_smaller = run % 3;
            run -= is_smaller;
            is_smaller -= 1;
        }

        if run > 0 {
            if decoded + run as u32 / 3 > natoms {
                return Err(Error::CorruptFrame {
                    reason: "small-delta run overruns the atom count",
                });
            }
            for k in (0..run).step_by(3) {
                let mut small = bits.take_packed(small_idx as u32, size_small)?;
                decoded += 1;
                small[0] += prev[0] - small_num;
                small[1] += prev[1] - small_num;
                small[2] += prev[2] - small_num;
                if k == 0 {
                    // The first atom of a run trades places with the
                    // literal before it; water oxygens are stored behind
                    // their hydrogens to compress better, and this swap
                    // restores the original order.
                    std::mem::swap(&mut small, &mut prev);
                    push(out, prev, inv_precision);
                    if out.len() >= target {
                        break 'atoms;
                    }
                } else {
                    prev = small;
                }
                push(out, small, inv_precision);
                if out.len() >= target {
                    break 'atoms;
                }
            }
        } else {
            push(out, coord, inv_precision);
            if out.len() >= target {
                break 'atoms;
            }
        }

        match is_smaller.cmp(&0) {
            std::cmp::Ordering::Less => {
                if small_idx == 0 {
                    return Err(Error::CorruptFrame {
                        reason: "small-delta width rescaled below the table",
                    });
                }
                small_idx -= 1;
                small_num = smaller;
                smaller = if small_idx > FIRSTIDX {
                    MAGICINTS[small_idx - 1] / 2
                } else {
                    0
                };
            }
            std::cmp::Ordering::Greater => {
                small_idx += 1;
                if small_idx >= MAGICINTS.len() {
                    return Err(Error::CorruptFrame {
                        reason: "small-delta width rescaled beyond the table",
                    });
                }
                smaller = small_num;
                small_num = MAGICINTS[small_idx] / 2;
            }
            std::cmp::Ordering::Equal => {}
        }
        if MAGICINTS[small_idx] == 0 {
            return Err(Error::CorruptFrame {
                reason: "small-delta table index out of range",
            });
        }
        size_small = [MAGICINTS[small_idx] as u32; 3];
    }

    // A complete decode must account for every declared byte. Prefix
    // decodes stop early by construction and skip this check.
    if limit >= natoms && payload.len() >= declared_len && bits.bytes_consumed() != declared_len {
        return Err(Error::CorruptFrame {
            reason: "declared block size does not match decoded bit consumption",
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_for_small_sizes() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 2);
        assert_eq!(bits_for(8), 4);
        assert_eq!(bits_for(255), 8);
        assert_eq!(bits_for(256), 9);
    }

    #[test]
    fn bits_for_triplet_matches_product_width() {
        assert_eq!(bits_for_triplet([1, 1, 1]), 1);
        assert_eq!(bits_for_triplet([2, 2, 2]), 4);
        assert_eq!(bits_for_triplet([100, 100, 100]), 20);
        assert_eq!(bits_for_triplet([0xffffff, 0xffffff, 0xffffff]), 72);
    }

    #[test]
    fn magicints_invariants() {
        assert_eq!(MAGICINTS[FIRSTIDX - 1], 0);
        assert!(MAGICINTS[FIRSTIDX] > 0);
        assert!(MAGICINTS.windows(2).skip(FIRSTIDX).all(|w| w[0] < w[1]));
    }

    #[test]
    fn rejects_bad_small_index() {
        let prelude = CodecPrelude {
            min_int: [0; 3],
            max_int: [10; 3],
            small_idx: MAGICINTS.len() as u32,
        };
        let mut out = Vec::new();
        let err = decode_positions(&[0u8; 8], 8, &prelude, 1, 1000.0, 1, &mut out).unwrap_err();
        assert!(matches!(err, Error::CorruptFrame { .. }));
    }

    #[test]
    fn rejects_inverted_range() {
        let prelude = CodecPrelude {
            min_int: [10, 0, 0],
            max_int: [0, 10, 10],
            small_idx: FIRSTIDX as u32,
        };
        let mut out = Vec::new();
        let err = decode_positions(&[0u8; 8], 8, &prelude, 1, 1000.0, 1, &mut out).unwrap_err();
        assert!(matches!(err, Error::CorruptFrame { .. }));
    }

    #[test]
    fn empty_payload_is_truncated() {
        let prelude = CodecPrelude {
            min_int: [0; 3],
            max_int: [100; 3],
            small_idx: FIRSTIDX as u32,
        };
        let mut out = Vec::new();
        let err = decode_positions(&[], 4, &prelude, 2, 1000.0, 2, &mut out).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput { .. }));
    }
}
