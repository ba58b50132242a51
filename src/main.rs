//! Inspect an xtc trajectory from the command line.

use std::num::{NonZeroI64, ParseIntError};
use std::path::PathBuf;

use clap::Parser;
use xtcio::{AtomSelection, FrameRange, FrameSelection, XTCReader};

fn frame_selection_parser(selection: &str) -> Result<FrameSelection, String> {
    let mut components = selection.split(':');
    let mut parse = |name: &str| -> Result<Option<i64>, String> {
        match components.next() {
            None | Some("") => Ok(None),
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|err: ParseIntError| format!("bad {name} value {text:?}: {err}")),
        }
    };
    let start = parse("start")?;
    let stop = parse("stop")?;
    let step = match parse("step")? {
        None => None,
        Some(value) => {
            Some(NonZeroI64::new(value).ok_or_else(|| "step must not be zero".to_string())?)
        }
    };
    Ok(FrameSelection::Range(FrameRange::new(start, stop, step)))
}

/// Summarize an xtc trajectory, or print per-frame values for a selection.
#[derive(Parser)]
struct Args {
    /// Input path (xtc).
    input: PathBuf,

    /// Frame selection in the format `start:stop:step`, each value
    /// optional and possibly negative.
    ///
    /// - `:100` selects the first 100 frames.
    ///
    /// - `25:50:2` selects every second frame from the 26th up to the
    ///   50th, 13 frames in total.
    ///
    /// - `-10:` selects the last 10 frames.
    #[arg(short, long, value_parser = frame_selection_parser)]
    frames: Option<FrameSelection>,

    /// Only read the first N atoms of each selected frame.
    #[arg(short, long)]
    atoms: Option<u32>,

    /// Print the time value for the selected frames to standard output.
    #[arg(long)]
    times: bool,

    /// Print the step number for the selected frames to standard output.
    ///
    /// If both `times` and `steps` are active, they are separated by tabs
    /// and printed in that order.
    #[arg(long)]
    steps: bool,
}

fn main() -> xtcio::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut reader = XTCReader::open(&args.input)?;
    let frame_selection = args.frames.unwrap_or_default();

    if args.times || args.steps {
        // Header metadata is enough here; skip coordinate decoding.
        for header in reader.read_headers(&frame_selection)? {
            let mut columns = Vec::new();
            if args.times {
                columns.push(format!("{:.3}", header.time));
            }
            if args.steps {
                columns.push(header.step.to_string());
            }
            println!("{}", columns.join("\t"));
        }
        return Ok(());
    }

    let atom_selection = match args.atoms {
        Some(n) => AtomSelection::Indices((0..n).collect()),
        None => AtomSelection::All,
    };
    let frames = reader.read_frames(&frame_selection, &atom_selection)?;
    let frame_count = reader.frame_count()?;
    let natoms = reader.natoms()?;

    println!("{}", args.input.display());
    println!("frames    {frame_count}");
    println!("atoms     {natoms}");
    println!("selected  {}", frames.len());
    if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
        println!("time      {:.3} .. {:.3} ps", first.time, last.time);
        println!("steps     {} .. {}", first.step, last.step);
    }

    Ok(())
}
