//! Display soundfile header information.

use std::fs::File;
use std::path::PathBuf;

use clap::Args;

use cinta_core::{SoundFile, open_soundfile};

use super::common::{format_bytes, format_label};

/// Display soundfile header information.
#[derive(Args)]
pub struct InfoArgs {
    /// Path to the soundfile
    pub file: PathBuf,

    /// Also show metadata entries, if the format carries any
    #[arg(long)]
    pub meta: bool,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let mut sf = SoundFile::new();
    open_soundfile(File::open(&args.file)?, &mut sf, 0)?;
    let spec = sf.spec;
    let handler = sf
        .ftype
        .ok_or_else(|| anyhow::anyhow!("no handler for {}", args.file.display()))?;

    let frames = spec.frames_in_file();
    let duration_secs = frames as f64 / f64::from(spec.samplerate.max(1));

    println!("File:        {}", args.file.display());
    println!("Container:   {}", handler.name());
    println!(
        "Format:      {} {}-endian",
        format_label(&spec),
        if spec.big_endian { "big" } else { "little" }
    );
    println!("Channels:    {}", spec.channels);
    println!("Sample Rate: {} Hz", spec.samplerate);
    println!("Header:      {} bytes", spec.header_size.unwrap_or(0));
    println!("Duration:    {duration_secs:.3}s ({frames} frames)");

    let file_size = std::fs::metadata(&args.file)?.len();
    println!("File Size:   {}", format_bytes(file_size));

    if args.meta {
        if handler.supports_meta() {
            for (key, value) in handler.read_meta(&mut sf)? {
                println!("Meta:        {key}: {value}");
            }
        } else {
            println!("Meta:        ({} files carry none)", handler.name());
        }
    }

    sf.close();
    Ok(())
}
