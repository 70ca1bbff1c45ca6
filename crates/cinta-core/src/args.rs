//! Host-message atoms and shared flag parsing.
//!
//! The host delivers commands as pre-tokenized atom lists; this module is
//! the interface type plus the write-flag grammar shared by the bulk writer
//! and the realtime recorder.

use std::fmt;

use crate::handler::{SoundFileType, registry};
use crate::soundfile::SoundSpec;
use crate::{Error, MAX_FRAMES, Result};

/// One token of a host message.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// A number.
    Float(f32),
    /// A word.
    Symbol(String),
}

impl Atom {
    /// The numeric value, if this is a float atom.
    pub fn float(&self) -> Option<f32> {
        match self {
            Atom::Float(f) => Some(*f),
            Atom::Symbol(_) => None,
        }
    }

    /// The text, if this is a symbol atom.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Atom::Symbol(s) => Some(s),
            Atom::Float(_) => None,
        }
    }

    /// The flag name, if this is a symbol starting with `-`. `--` yields
    /// `-`, the stop-parsing marker.
    pub fn flag(&self) -> Option<&str> {
        self.symbol().and_then(|s| s.strip_prefix('-'))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Float(v) => write!(f, "{v}"),
            Atom::Symbol(s) => write!(f, "{s}"),
        }
    }
}

impl From<f32> for Atom {
    fn from(v: f32) -> Self {
        Atom::Float(v)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Symbol(s.to_string())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::Symbol(s)
    }
}

/// Cap on `-meta` groups in one write command.
pub const MAX_WRITE_META: usize = 8;

/// Parsed flags of a `write`/recorder-`open` command.
pub struct WriteArgs {
    /// Target filename, extension not yet guaranteed.
    pub filename: String,
    /// Resolved format handler.
    pub ftype: &'static dyn SoundFileType,
    /// Explicit `-rate`, if any.
    pub samplerate: Option<u32>,
    /// Sample width in bytes (default 2).
    pub bytes_per_sample: usize,
    /// Effective byte order after the handler's policy.
    pub big_endian: bool,
    /// `-nframes`, or [`MAX_FRAMES`] for "all of it / open-ended".
    pub nframes: u64,
    /// `-skip` table onset.
    pub onset_frames: u64,
    /// `-normalize`.
    pub normalize: bool,
    /// One atom list per `-meta` flag.
    pub meta: Vec<Vec<Atom>>,
}

/// Parses write flags and the filename, returning the remaining atoms
/// (table names for the bulk writer, nothing for the recorder).
pub fn parse_write_args(mut args: &[Atom]) -> Result<(WriteArgs, &[Atom])> {
    let usage = || Error::Usage("write [flags] filename [table]...".into());
    let mut ftype: Option<&'static dyn SoundFileType> = None;
    let mut samplerate = None;
    let mut bytes_per_sample = 2usize;
    let mut endianness: Option<bool> = None;
    let mut nframes = MAX_FRAMES;
    let mut onset_frames = 0u64;
    let mut normalize = false;
    let mut meta: Vec<Vec<Atom>> = Vec::new();

    while let Some(flag) = args.first().and_then(Atom::flag) {
        match flag {
            "skip" => {
                let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                if v < 0.0 {
                    return Err(usage());
                }
                onset_frames = v as u64;
                args = &args[2..];
            }
            "nframes" => {
                let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                if v < 0.0 {
                    return Err(usage());
                }
                nframes = v as u64;
                args = &args[2..];
            }
            "bytes" => {
                let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                if !(2.0..=4.0).contains(&v) {
                    return Err(usage());
                }
                bytes_per_sample = v as usize;
                args = &args[2..];
            }
            "normalize" => {
                normalize = true;
                args = &args[1..];
            }
            "big" => {
                endianness = Some(true);
                args = &args[1..];
            }
            "little" => {
                endianness = Some(false);
                args = &args[1..];
            }
            "rate" | "r" => {
                let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                if v <= 0.0 {
                    return Err(usage());
                }
                samplerate = Some(v as u32);
                args = &args[2..];
            }
            "meta" => {
                args = &args[1..];
                let group_len = args
                    .iter()
                    .position(|a| a.flag().is_some())
                    .unwrap_or(args.len());
                if group_len == 0 {
                    tracing::error!("ignoring empty -meta flag");
                    break;
                }
                if meta.len() == MAX_WRITE_META {
                    tracing::error!("max -meta flags reached, ignoring");
                    break;
                }
                meta.push(args[..group_len].to_vec());
                args = &args[group_len..];
            }
            "-" => {
                args = &args[1..];
                break;
            }
            "nextstep" => {
                // old alias for the next handler
                ftype = registry().by_name("next");
                args = &args[1..];
            }
            name => {
                ftype = Some(registry().by_name(name).ok_or_else(usage)?);
                args = &args[1..];
            }
        }
    }

    let filename = args
        .first()
        .and_then(Atom::symbol)
        .ok_or_else(usage)?
        .to_string();
    args = &args[1..];

    let ftype = ftype
        .or_else(|| registry().by_extension(&filename))
        .unwrap_or_else(|| registry().first());

    let big_endian = ftype.endianness(endianness);
    if let Some(requested) = endianness
        && requested != big_endian
    {
        tracing::error!(
            "{}: file forced to {} endian",
            ftype.name(),
            if big_endian { "big" } else { "little" }
        );
    }

    Ok((
        WriteArgs {
            filename,
            ftype,
            samplerate,
            bytes_per_sample,
            big_endian,
            nframes,
            onset_frames,
            normalize,
            meta,
        },
        args,
    ))
}

/// The five-atom format description the operators emit: sample rate, header
/// size, channels, bytes per sample, endianness tag.
pub fn description(spec: &SoundSpec) -> Vec<Atom> {
    vec![
        Atom::Float(spec.samplerate as f32),
        Atom::Float(spec.header_size.unwrap_or(0) as f32),
        Atom::Float(spec.channels as f32),
        Atom::Float(spec.bytes_per_sample as f32),
        Atom::Symbol(if spec.big_endian { "b" } else { "l" }.to_string()),
    ]
}
