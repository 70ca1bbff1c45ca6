//! Soundfile access library for the Cinta streaming I/O workspace.
//!
//! This crate provides:
//!
//! - **Format handlers**: [`SoundFileType`] implementations for WAVE, AIFF,
//!   CAF, and NeXT/AU containers, plus a headerless raw mode, behind a
//!   process-wide [`registry`]
//! - **Sample codec**: [`codec`] packs and unpacks interleaved 16-bit,
//!   24-bit, and 32-bit-float frames in either byte order
//! - **Synchronous access**: [`open_soundfile`], [`create_soundfile`], and
//!   [`finish_write`] for probe-open, placeholder-header create, and
//!   finished-length fix-up
//! - **Host message parsing**: [`Atom`] lists and the shared write-flag
//!   grammar in [`args`]
//!
//! The realtime streaming objects live in `cinta-stream` and the bulk
//! table transfer operator in `cinta-filer`; both are built entirely on
//! this crate.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cinta_core::{SoundFile, open_soundfile};
//!
//! let mut sf = SoundFile::new();
//! open_soundfile(std::fs::File::open("input.wav")?, &mut sf, 0)?;
//! println!("{} Hz, {} channels", sf.spec.samplerate, sf.spec.channels);
//! ```

pub mod args;
pub mod bytes;
pub mod codec;
pub mod formats;
pub mod handler;
pub mod open;
pub mod soundfile;

pub use args::{Atom, WriteArgs, description, parse_write_args};
pub use handler::{Registry, SoundFileType, raw_type, registry};
pub use open::{
    BaseDir, FileResolver, create_soundfile, finish_write, open_soundfile, open_soundfile_named,
};
pub use soundfile::{SoundFile, SoundSpec};

/// Most channels any soundfile may carry.
pub const MAX_CHANNELS: usize = 64;

/// Byte-count sentinel for "size not (yet) known".
pub const BYTES_MAX: u64 = u64::MAX;

/// Frame-count sentinel for "unknown / open-ended".
pub const MAX_FRAMES: u64 = u64::MAX;

/// Error type for all soundfile operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sample width other than 16-bit int, 24-bit int, or 32-bit float.
    #[error("supported sample formats: uncompressed 16 bit int, 24 bit int, or 32 bit float")]
    SampleFormat,

    /// No registered handler recognized the header.
    #[error("unknown or bad header format")]
    BadHeader,

    /// The named handler did not recognize the header.
    #[error("unknown or bad header format ({0})")]
    BadHeaderAs(&'static str),

    /// Handler-specific failure.
    #[error("{format}: {detail}")]
    Format {
        /// Handler name.
        format: &'static str,
        /// What went wrong.
        detail: String,
    },

    /// Metadata requested from a handler without metadata support.
    #[error("{0} does not support metadata")]
    MetaUnsupported(&'static str),

    /// Malformed operator arguments.
    #[error("usage: {0}")]
    Usage(String),

    /// A named table does not exist in the host's store.
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// Operating system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for soundfile operations.
pub type Result<T> = std::result::Result<T, Error>;
