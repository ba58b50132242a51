//! Shared test support: synthesize xtc byte streams in memory.
//!
//! The tests run against trajectories built here rather than fixture
//! files, so every test case controls exactly what is on "disk". Frames
//! with more than nine atoms are written in the compressed layout, each
//! coordinate triplet as a full-width literal followed by a cleared run
//! flag; that is a valid (if incompressible) stream, and keeps the writer
//! an exact inverse of the decoder.
#![allow(dead_code)]

use std::io::Cursor;

use byteorder::{BigEndian, WriteBytesExt};
use xtcio::codec::{bits_for, bits_for_triplet, FIRSTIDX};
use xtcio::{padding, XTCReader};

pub const PRECISION: f32 = 1000.0;

/// An MSB-first bit packer, the mirror of the reader's bit cursor.
pub struct BitWriter {
    buf: Vec<u8>,
    bit: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            bit: 0,
        }
    }

    /// Append the low `nbits` bits of `value`, most significant first.
    pub fn put(&mut self, value: u32, nbits: u32) {
        for shift in (0..nbits).rev() {
            if self.bit % 8 == 0 {
                self.buf.push(0);
            }
            if (value >> shift) & 1 == 1 {
                let last = self.buf.len() - 1;
                self.buf[last] |= 1 << (7 - self.bit % 8);
            }
            self.bit += 1;
        }
    }

    /// Append a packed triplet: the single integer
    /// `(x * sizes[1] + y) * sizes[2] + z` in `nbits` bits, full bytes
    /// first (least significant byte leading), then the partial high byte.
    pub fn put_packed(&mut self, vals: [u32; 3], nbits: u32, sizes: [u32; 3]) {
        let v = (vals[0] as u128 * sizes[1] as u128 + vals[1] as u128) * sizes[2] as u128
            + vals[2] as u128;
        let mut left = nbits;
        let mut shift = 0;
        while left >= 8 {
            self.put(((v >> shift) & 0xff) as u32, 8);
            shift += 8;
            left -= 8;
        }
        if left > 0 {
            self.put(((v >> shift) as u32) & ((1 << left) - 1), left);
        }
    }

    /// The packed bytes, with the final partial byte zero-padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct TestFrame {
    pub step: i32,
    pub time: f32,
    pub boxvec: [f32; 9],
    pub positions: Vec<[f32; 3]>,
}

/// The fixed-point value a coordinate decodes back to.
pub fn quantize(value: f32, precision: f32) -> f32 {
    ((value * precision).round() as i32) as f32 * precision.recip()
}

/// The position block `frame` decodes to, flat and in file order.
pub fn expected_positions(frame: &TestFrame, precision: f32) -> Vec<f32> {
    if frame.positions.len() <= 9 {
        return frame.positions.iter().flatten().copied().collect();
    }
    frame
        .positions
        .iter()
        .flatten()
        .map(|&v| quantize(v, precision))
        .collect()
}

/// Append one frame record to `out`.
pub fn encode_frame(out: &mut Vec<u8>, frame: &TestFrame, precision: f32) {
    let natoms = frame.positions.len() as i32;
    out.write_i32::<BigEndian>(xtcio::MAGIC).unwrap();
    out.write_i32::<BigEndian>(natoms).unwrap();
    out.write_i32::<BigEndian>(frame.step).unwrap();
    out.write_f32::<BigEndian>(frame.time).unwrap();
    for value in frame.boxvec {
        out.write_f32::<BigEndian>(value).unwrap();
    }
    out.write_i32::<BigEndian>(natoms).unwrap();

    if natoms <= 9 {
        for position in &frame.positions {
            for &value in position {
                out.write_f32::<BigEndian>(value).unwrap();
            }
        }
        return;
    }

    // Quantize to fixed point and find the per-axis ranges.
    let ints: Vec<[i32; 3]> = frame
        .positions
        .iter()
        .map(|p| p.map(|v| (v * precision).round() as i32))
        .collect();
    let mut min_int = [i32::MAX; 3];
    let mut max_int = [i32::MIN; 3];
    for int in &ints {
        for axis in 0..3 {
            min_int[axis] = min_int[axis].min(int[axis]);
            max_int[axis] = max_int[axis].max(int[axis]);
        }
    }
    let sizes = [
        (max_int[0] - min_int[0]) as u32 + 1,
        (max_int[1] - min_int[1]) as u32 + 1,
        (max_int[2] - min_int[2]) as u32 + 1,
    ];
    // Ranges beyond 24 bits per axis cannot share one packed integer; the
    // format then codes each axis at its own width.
    let per_axis = (sizes[0] | sizes[1] | sizes[2]) > 0xffffff;
    let nbits = if per_axis { 0 } else { bits_for_triplet(sizes) };
    let axis_bits = sizes.map(bits_for);

    out.write_f32::<BigEndian>(precision).unwrap();
    for value in min_int {
        out.write_i32::<BigEndian>(value).unwrap();
    }
    for value in max_int {
        out.write_i32::<BigEndian>(value).unwrap();
    }
    out.write_i32::<BigEndian>(FIRSTIDX as i32).unwrap();

    let mut bits = BitWriter::new();
    for int in &ints {
        let offsets = [
            (int[0] - min_int[0]) as u32,
            (int[1] - min_int[1]) as u32,
            (int[2] - min_int[2]) as u32,
        ];
        if per_axis {
            for axis in 0..3 {
                bits.put(offsets[axis], axis_bits[axis]);
            }
        } else {
            bits.put_packed(offsets, nbits, sizes);
        }
        bits.put(0, 1); // No run follows; the next atom is a literal too.
    }
    let block = bits.into_bytes();
    out.write_i32::<BigEndian>(block.len() as i32).unwrap();
    out.extend_from_slice(&block);
    out.extend(std::iter::repeat(0u8).take(padding(block.len())));
}

pub fn encode_trajectory(frames: &[TestFrame], precision: f32) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        encode_frame(&mut out, frame, precision);
    }
    out
}

/// Deterministic frames: atom `i` of frame `f` sits near
/// `(i - natoms / 2) / 2` with a slow per-frame drift, so every frame and
/// every atom decodes to a distinct, predictable position.
pub fn synthetic_frames(nframes: usize, natoms: usize) -> Vec<TestFrame> {
    (0..nframes)
        .map(|f| {
            let drift = f as f32 * 0.001;
            TestFrame {
                step: f as i32 * 100,
                time: f as f32 * 2.0,
                boxvec: [
                    10.0 + f as f32 * 0.1,
                    0.0,
                    0.0,
                    0.0,
                    11.0,
                    0.0,
                    0.0,
                    0.0,
                    12.0,
                ],
                positions: (0..natoms)
                    .map(|i| {
                        let base = (i as f32 - natoms as f32 / 2.0) * 0.5;
                        [base + drift, base + 1.0 - drift, base + 2.0]
                    })
                    .collect(),
            }
        })
        .collect()
}

pub fn synthetic_trajectory(nframes: usize, natoms: usize) -> Vec<u8> {
    encode_trajectory(&synthetic_frames(nframes, natoms), PRECISION)
}

/// A reader over an in-memory trajectory.
pub fn reader_over(bytes: Vec<u8>) -> XTCReader<Cursor<Vec<u8>>> {
    XTCReader::new(Cursor::new(bytes))
}
