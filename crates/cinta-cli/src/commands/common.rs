//! Shared helpers for the subcommands.

use std::fs::File;
use std::path::Path;

use cinta_core::{SoundFile, SoundSpec, open_soundfile};

/// Opens a soundfile just long enough to learn its format.
pub fn probe(path: &Path) -> anyhow::Result<SoundSpec> {
    let mut sf = SoundFile::new();
    open_soundfile(File::open(path)?, &mut sf, 0)?;
    let spec = sf.spec;
    sf.close();
    Ok(spec)
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Sample-format label for a spec.
pub fn format_label(spec: &SoundSpec) -> &'static str {
    match spec.bytes_per_sample {
        2 => "16-bit PCM",
        3 => "24-bit PCM",
        4 => "32-bit float",
        _ => "unknown",
    }
}
