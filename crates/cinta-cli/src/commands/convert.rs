//! File-to-file conversion through the bulk operator.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use cinta_core::{Atom, BaseDir};
use cinta_filer::{Filer, MemoryTables};

use super::common::probe;

/// Convert a soundfile to another format.
#[derive(Args)]
pub struct ConvertArgs {
    /// Input soundfile
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output soundfile (extension selects the container)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Output bytes per sample (2, 3, or 4)
    #[arg(long, default_value = "2")]
    bytes: usize,

    /// Force an output container (wave, aiff, caf, next)
    #[arg(long)]
    format: Option<String>,

    /// Stamp a different sample rate (no resampling is performed)
    #[arg(long)]
    rate: Option<u32>,

    /// Peak-normalize the output
    #[arg(long)]
    normalize: bool,

    /// Force big-endian output (where the container allows it)
    #[arg(long)]
    big: bool,

    /// Force little-endian output (where the container allows it)
    #[arg(long)]
    little: bool,

    /// Frames to skip in the input
    #[arg(long, default_value = "0")]
    skip: u64,
}

/// Run the convert command.
pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let spec = probe(&args.input)?;
    let channels = spec.channels;

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    bar.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut store = MemoryTables::new();
    let names: Vec<String> = (0..channels).map(|c| format!("ch{c}")).collect();
    for name in &names {
        store.insert(name, 0);
    }
    let filer = Filer::new(Box::new(BaseDir::new(".")));

    bar.set_message(format!("reading {}", args.input.display()));
    let mut read_args = vec![
        Atom::from("-resize"),
        Atom::from("-skip"),
        Atom::Float(args.skip as f32),
        Atom::from(args.input.to_string_lossy().into_owned()),
    ];
    read_args.extend(names.iter().map(|n| Atom::from(n.clone())));
    let read = filer.read(&read_args, &store)?;

    bar.set_message(format!("writing {}", args.output.display()));
    let mut write_args = Vec::new();
    if let Some(format) = &args.format {
        write_args.push(Atom::from(format!("-{format}")));
    }
    write_args.push(Atom::from("-bytes"));
    write_args.push(Atom::Float(args.bytes as f32));
    write_args.push(Atom::from("-rate"));
    write_args.push(Atom::Float(args.rate.unwrap_or(spec.samplerate) as f32));
    if args.normalize {
        write_args.push(Atom::from("-normalize"));
    }
    if args.big {
        write_args.push(Atom::from("-big"));
    }
    if args.little {
        write_args.push(Atom::from("-little"));
    }
    write_args.push(Atom::from(args.output.to_string_lossy().into_owned()));
    write_args.extend(names.iter().map(|n| Atom::from(n.clone())));
    let wrote = filer.write(&write_args, &store)?;

    bar.finish_and_clear();
    println!(
        "{} -> {}: {} frames, {} channel(s), {} read",
        args.input.display(),
        args.output.display(),
        wrote.frames,
        channels,
        read.frames,
    );
    Ok(())
}
