//! The trajectory reader: an open byte source, its frame index, and a
//! sequential read cursor.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;

use crate::error::{Error, Result};
use crate::header::{self, Payload, Record};
use crate::index::FrameIndex;
use crate::selection::{AtomSelection, FrameSelection};
use crate::{codec, Frame, FrameHeader};

/// Payloads larger than this are candidates for partial reads when only a
/// prefix of the atoms is selected.
const MIN_BUFFERED_LEN: usize = 0x50000;

/// Tuning knobs for how payload bytes are pulled from the source.
#[derive(Debug, Clone, Copy)]
pub struct ReadConfig {
    /// In buffered mode, a frame whose atom selection only needs leading
    /// atoms is served from an estimated prefix of its payload, and the
    /// rest is fetched only if the estimate runs short. Results are
    /// identical either way; this trades a possible second read for not
    /// dragging the tail of large payloads through memory.
    pub buffered: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self { buffered: true }
    }
}

/// A reader for xtc trajectories.
///
/// The reader owns its byte source exclusively. Sequential consumption
/// goes through [`read_frame`](Self::read_frame) and the cursor it
/// advances; random access goes through the selections of
/// [`read_frames`](Self::read_frames) and
/// [`read_into_array`](Self::read_into_array), which resolve against the
/// frame index and leave the cursor alone.
#[derive(Debug)]
pub struct XTCReader<R> {
    source: Option<R>,
    config: ReadConfig,
    index: Option<FrameIndex>,
    /// Number of atoms in the first frame, learned at open time.
    natoms: Option<u32>,
    /// Ordinal of the next frame `read_frame` will produce.
    cursor: u64,
    /// Byte offset of that frame's record.
    cursor_offset: u64,
    /// Scratch for payload bytes, reused across reads.
    scratch: Vec<u8>,
    /// Scratch for decoded positions before atom filtering.
    decoded: Vec<f32>,
}

impl XTCReader<File> {
    /// Open the trajectory at `path`.
    ///
    /// The first record is validated here so that an empty file, a file of
    /// some other format, or a file without a single complete frame is
    /// rejected up front. The full frame index is only built once an
    /// operation needs it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ReadConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ReadConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        let mut reader = Self::with_config(file, config);
        reader.validate_first_record()?;
        debug!("opened trajectory {}", path.display());
        Ok(reader)
    }
}

impl<R: Read + Seek> XTCReader<R> {
    /// Wrap an arbitrary seekable byte source without validating it.
    pub fn new(source: R) -> Self {
        Self::with_config(source, ReadConfig::default())
    }

    pub fn with_config(source: R, config: ReadConfig) -> Self {
        Self {
            source: Some(source),
            config,
            index: None,
            natoms: None,
            cursor: 0,
            cursor_offset: 0,
            scratch: Vec::new(),
            decoded: Vec::new(),
        }
    }

    /// Drop the byte source. Every subsequent operation fails with
    /// [`Error::ReaderClosed`].
    pub fn close(&mut self) {
        self.source = None;
        self.index = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    fn source(&mut self) -> Result<&mut R> {
        self.source.as_mut().ok_or(Error::ReaderClosed)
    }

    /// The underlying byte source. The reader assumes it is the only one
    /// moving the stream position; a caller that seeks around should do
    /// so between read calls.
    pub fn source_mut(&mut self) -> Result<&mut R> {
        self.source.as_mut().ok_or(Error::ReaderClosed)
    }

    /// Check that at least one complete frame exists, and learn its atom
    /// count. Leaves the source positioned at the start.
    fn validate_first_record(&mut self) -> Result<()> {
        let src = self.source()?;
        let len = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;
        match header::parse_record(src) {
            Ok(Some(record)) if record.len <= len => {
                self.natoms = Some(record.header.natoms);
                self.source()?.seek(SeekFrom::Start(0))?;
                Ok(())
            }
            // A header without its payload, a partial header, or nothing
            // at all: no complete frame to speak of.
            Ok(_) | Err(Error::TruncatedInput { .. }) | Err(Error::CorruptFrame { .. }) => {
                Err(Error::EmptyOrInvalidTrajectory)
            }
            Err(err) => Err(err),
        }
    }

    /// The frame index, building it on first use.
    pub fn index(&mut self) -> Result<&FrameIndex> {
        if self.index.is_none() {
            let src = self.source.as_mut().ok_or(Error::ReaderClosed)?;
            self.index = Some(FrameIndex::scan(src)?);
        }
        Ok(self.index.as_ref().unwrap())
    }

    /// Rebuild the index from the source, picking up frames appended
    /// since it was last built. Growth is never detected automatically.
    pub fn refresh_index(&mut self) -> Result<()> {
        let src = self.source.as_mut().ok_or(Error::ReaderClosed)?;
        self.index = Some(FrameIndex::scan(src)?);
        Ok(())
    }

    /// Total number of complete frames. Builds the index if needed.
    pub fn frame_count(&mut self) -> Result<u64> {
        Ok(self.index()?.frame_count())
    }

    /// Number of atoms per frame, taken from the first frame's header.
    pub fn natoms(&mut self) -> Result<u32> {
        if let Some(natoms) = self.natoms {
            return Ok(natoms);
        }
        self.validate_first_record()?;
        Ok(self.natoms.unwrap())
    }

    /// Reset the sequential cursor to the first frame.
    pub fn home(&mut self) -> Result<()> {
        self.source()?;
        self.cursor = 0;
        self.cursor_offset = 0;
        Ok(())
    }

    /// Position the sequential cursor on `ordinal`.
    pub fn seek_frame(&mut self, ordinal: u64) -> Result<()> {
        let offset = self.index()?.offset_of(ordinal)?;
        self.cursor = ordinal;
        self.cursor_offset = offset;
        Ok(())
    }

    /// Decode the frame at the cursor and advance by one.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut frame = Frame::default();
        self.read_frame_into(&mut frame)?;
        Ok(frame)
    }

    /// Identical to [`read_frame`](Self::read_frame); the name matches
    /// streaming-style call sites that consume frames one by one.
    pub fn pop_frame(&mut self) -> Result<Frame> {
        self.read_frame()
    }

    /// Like [`read_frame`](Self::read_frame), but reuses the caller's
    /// allocations.
    pub fn read_frame_into(&mut self, frame: &mut Frame) -> Result<()> {
        if let Some(index) = &self.index {
            if self.cursor >= index.frame_count() {
                return Err(Error::EndOfTrajectory);
            }
        }
        let offset = self.cursor_offset;
        self.source()?.seek(SeekFrom::Start(offset))?;
        match self.decode_record(frame, &AtomSelection::All)? {
            Some(record_len) => {
                self.cursor += 1;
                self.cursor_offset = offset + record_len;
                Ok(())
            }
            None => Err(Error::EndOfTrajectory),
        }
    }

    /// Read the frames a selection describes, in the selection's order.
    ///
    /// Requires the full index; the sequential cursor is not touched. The
    /// call is atomic: the first failing frame aborts it and no frames are
    /// returned.
    pub fn read_frames(
        &mut self,
        frame_selection: &FrameSelection,
        atom_selection: &AtomSelection,
    ) -> Result<Vec<Frame>> {
        let ordinals = frame_selection.resolve(self.frame_count()?)?;
        atom_selection.validate(self.natoms()?)?;

        let mut frames = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let mut frame = Frame::default();
            self.decode_at(ordinal, &mut frame, atom_selection)?;
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Parse the headers of the selected frames without decoding any
    /// coordinates.
    pub fn read_headers(&mut self, frame_selection: &FrameSelection) -> Result<Vec<FrameHeader>> {
        let ordinals = frame_selection.resolve(self.frame_count()?)?;
        let mut headers = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let offset = self.index()?.offset_of(ordinal)?;
            let src = self.source()?;
            src.seek(SeekFrom::Start(offset))?;
            match header::parse_record(src)? {
                Some(record) => headers.push(record.header),
                None => return Err(Error::EndOfTrajectory),
            }
        }
        Ok(headers)
    }

    /// Decode the selected frames straight into caller-owned buffers.
    ///
    /// `coords` must hold exactly `nframes * natoms_selected * 3` values
    /// and `boxvecs` exactly `nframes * 9`; `times`, when given, exactly
    /// `nframes`. Anything else fails with [`Error::ShapeMismatch`] before
    /// any I/O happens. Box matrices are written as the nine floats of the
    /// file's row-vector layout. On success the call returns `true`; on
    /// failure the buffer contents are unspecified.
    pub fn read_into_array(
        &mut self,
        coords: &mut [f32],
        boxvecs: &mut [f32],
        times: Option<&mut [f64]>,
        frame_selection: &FrameSelection,
        atom_selection: &AtomSelection,
    ) -> Result<bool> {
        let ordinals = frame_selection.resolve(self.frame_count()?)?;
        let natoms = self.natoms()?;
        atom_selection.validate(natoms)?;
        let natoms_out = atom_selection.natoms_out(natoms);

        let nframes = ordinals.len();
        let expected_coords = nframes * natoms_out * 3;
        if coords.len() != expected_coords {
            return Err(Error::ShapeMismatch {
                buffer: "coordinate",
                expected: expected_coords,
                found: coords.len(),
            });
        }
        let expected_boxvecs = nframes * 9;
        if boxvecs.len() != expected_boxvecs {
            return Err(Error::ShapeMismatch {
                buffer: "box",
                expected: expected_boxvecs,
                found: boxvecs.len(),
            });
        }
        if let Some(times) = &times {
            if times.len() != nframes {
                return Err(Error::ShapeMismatch {
                    buffer: "time",
                    expected: nframes,
                    found: times.len(),
                });
            }
        }

        let mut frame = Frame::default();
        let mut times = times;
        for (slot, ordinal) in ordinals.into_iter().enumerate() {
            self.decode_at(ordinal, &mut frame, atom_selection)?;
            if frame.positions.len() != natoms_out * 3 {
                // A frame further in holds fewer atoms than the first one
                // promised; the buffers were shaped for the wrong count.
                return Err(Error::ShapeMismatch {
                    buffer: "coordinate",
                    expected: natoms_out * 3,
                    found: frame.positions.len(),
                });
            }
            coords[slot * natoms_out * 3..(slot + 1) * natoms_out * 3]
                .copy_from_slice(&frame.positions);
            boxvecs[slot * 9..(slot + 1) * 9].copy_from_slice(&frame.boxvec.to_cols_array());
            if let Some(times) = times.as_deref_mut() {
                times[slot] = frame.time;
            }
        }
        Ok(true)
    }

    /// Decode the frame at `ordinal` through the index, leaving the
    /// sequential cursor alone.
    fn decode_at(
        &mut self,
        ordinal: u64,
        frame: &mut Frame,
        atom_selection: &AtomSelection,
    ) -> Result<()> {
        let offset = self.index()?.offset_of(ordinal)?;
        self.source()?.seek(SeekFrom::Start(offset))?;
        match self.decode_record(frame, atom_selection)? {
            Some(_) => Ok(()),
            None => Err(Error::EndOfTrajectory),
        }
    }

    /// Parse and decode one record at the source's current position.
    ///
    /// Returns the record's total length, or `None` on a clean end of
    /// data.
    fn decode_record(
        &mut self,
        frame: &mut Frame,
        atom_selection: &AtomSelection,
    ) -> Result<Option<u64>> {
        let src = self.source.as_mut().ok_or(Error::ReaderClosed)?;
        let record = match header::parse_record(src)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let natoms = record.header.natoms;
        atom_selection.validate(natoms)?;

        match record.payload {
            Payload::Plain => {
                self.decoded.clear();
                for _ in 0..natoms * 3 {
                    self.decoded.push(
                        src.read_f32::<BigEndian>()
                            .map_err(|e| Error::from_read(e, "uncompressed positions"))?,
                    );
                }
            }
            Payload::Compressed(prelude) => {
                decode_compressed(
                    src,
                    &record,
                    &prelude,
                    atom_selection,
                    self.config.buffered,
                    &mut self.scratch,
                    &mut self.decoded,
                )?;
            }
        }

        atom_selection.gather(&self.decoded, &mut frame.positions);
        frame.step = record.header.step;
        frame.time = record.header.time;
        frame.boxvec = record.header.boxvec.as_mat3();
        frame.precision = record.header.precision;
        Ok(Some(record.len))
    }
}

/// Pull a frame's compressed payload out of `src` and decode it.
///
/// In buffered mode, a selection that only needs the first `limit` atoms
/// of a large frame is first attempted from a proportional prefix of the
/// payload; if the bit stream runs past the prefix, the remainder is
/// fetched and the decode restarts on the full block.
fn decode_compressed<R: Read>(
    src: &mut R,
    record: &Record,
    prelude: &header::CodecPrelude,
    atom_selection: &AtomSelection,
    buffered: bool,
    scratch: &mut Vec<u8>,
    decoded: &mut Vec<f32>,
) -> Result<()> {
    let header = &record.header;
    let nbytes = header.compressed_len as usize;
    let limit = atom_selection.decode_limit(header.natoms);

    let full = |scratch: &mut Vec<u8>, already: usize, src: &mut R| -> Result<()> {
        scratch.resize(nbytes, 0);
        src.read_exact(&mut scratch[already..])
            .map_err(|e| Error::from_read(e, "compressed coordinate block"))
    };

    if buffered && limit < header.natoms && nbytes > MIN_BUFFERED_LEN {
        // Atoms are laid down in file order, so the first `limit` atoms
        // live in roughly the first limit/natoms of the block. Read that
        // share plus some slack.
        let share = limit as f64 / header.natoms as f64;
        let estimate = ((nbytes as f64 * share * 1.1) as usize + 64).min(nbytes);
        scratch.resize(estimate, 0);
        src.read_exact(scratch)
            .map_err(|e| Error::from_read(e, "compressed coordinate block"))?;
        match codec::decode_positions(
            scratch,
            nbytes,
            prelude,
            header.natoms,
            header.precision,
            limit,
            decoded,
        ) {
            Err(Error::TruncatedInput { .. }) => {
                full(scratch, estimate, src)?;
            }
            other => return other,
        }
    } else {
        full(scratch, 0, src)?;
    }

    codec::decode_positions(
        scratch,
        nbytes,
        prelude,
        header.natoms,
        header.precision,
        limit,
        decoded,
    )
}
