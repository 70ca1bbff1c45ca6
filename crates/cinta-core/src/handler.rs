//! Format handler interface and the process-wide type registry.
//!
//! Each on-disk container format implements [`SoundFileType`]. The registry
//! is built once, before any stream object can observe it, and is immutable
//! afterwards: probe order is registration order and the first entry is the
//! default for writes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::LazyLock;

use crate::args::Atom;
use crate::formats;
use crate::soundfile::SoundFile;
use crate::{Error, Result};

/// Upper bound on registered format handlers.
pub const MAX_TYPES: usize = 8;

/// Capability set of one container format.
///
/// Default methods cover the common case of plain blocking I/O on the
/// descriptor's file handle; formats override only what differs.
pub trait SoundFileType: Send + Sync {
    /// Short lowercase name, also the `-<name>` flag.
    fn name(&self) -> &'static str;

    /// Recognized filename extensions, preferred first.
    fn extensions(&self) -> &'static [&'static str];

    /// Bytes of header prefix [`probe`](Self::probe) needs to decide.
    fn min_header_size(&self) -> usize;

    /// Returns true if this handler owns a header starting with `bytes`.
    fn probe(&self, bytes: &[u8]) -> bool;

    /// Attaches an open file to the descriptor, acquiring any per-file
    /// scratch.
    fn open(&self, sf: &mut SoundFile, file: File) -> Result<()> {
        sf.file = Some(file);
        Ok(())
    }

    /// Releases per-file scratch and the file handle.
    fn close(&self, sf: &mut SoundFile) {
        sf.data = None;
        sf.file = None;
    }

    /// Reads the header of the attached file (positioned at byte 0) and
    /// fills the descriptor's spec, leaving the file just past the header.
    fn read_header(&self, sf: &mut SoundFile) -> Result<()>;

    /// Writes a header for `nframes` frames ([`MAX_FRAMES`](crate::MAX_FRAMES)
    /// = length unknown, emit a placeholder [`update_header`](Self::update_header)
    /// can fix up) and returns its byte length.
    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<u64>;

    /// Rewrites the size fields after `frames_written` frames of data.
    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()>;

    /// Reads raw sample bytes at the current position.
    fn read_samples(&self, sf: &mut SoundFile, buf: &mut [u8]) -> io::Result<usize> {
        sf.file_mut()?.read(buf)
    }

    /// Writes raw sample bytes at the current position.
    fn write_samples(&self, sf: &mut SoundFile, buf: &[u8]) -> io::Result<usize> {
        sf.file_mut()?.write(buf)
    }

    /// Positions the file at the given sample frame.
    fn seek_to_frame(&self, sf: &mut SoundFile, frame: u64) -> Result<()> {
        let offset = sf.spec.header_size.unwrap_or(0)
            + frame * sf.spec.bytes_per_frame as u64;
        sf.file_mut()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Maps a requested byte order (`None` = no preference) to the one this
    /// format will actually use.
    fn endianness(&self, requested: Option<bool>) -> bool;

    /// Whether `name` carries one of this format's extensions.
    fn has_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.extensions()
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    /// Extension appended when creating a file without one.
    fn default_extension(&self) -> &'static str {
        self.extensions().first().copied().unwrap_or("")
    }

    /// True if this format can read and write metadata.
    fn supports_meta(&self) -> bool {
        false
    }

    /// Reads metadata entries from the attached file.
    fn read_meta(&self, _sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        Err(Error::MetaUnsupported(self.name()))
    }

    /// Writes one metadata message. Only valid before any sample data.
    fn write_meta(&self, _sf: &mut SoundFile, _args: &[Atom]) -> Result<()> {
        Err(Error::MetaUnsupported(self.name()))
    }
}

/// Ordered set of registered format handlers.
pub struct Registry {
    types: Vec<Box<dyn SoundFileType>>,
    min_header_size: usize,
    type_flags: String,
}

impl Registry {
    fn new() -> Self {
        Self {
            types: Vec::with_capacity(MAX_TYPES),
            min_header_size: 0,
            type_flags: String::new(),
        }
    }

    fn add(&mut self, t: Box<dyn SoundFileType>) {
        assert!(
            self.types.len() < MAX_TYPES,
            "max number of format handlers reached"
        );
        self.min_header_size = self.min_header_size.max(t.min_header_size());
        if !self.type_flags.is_empty() {
            self.type_flags.push(' ');
        }
        self.type_flags.push('-');
        self.type_flags.push_str(t.name());
        self.types.push(t);
    }

    /// Handlers in registration order.
    pub fn types(&self) -> impl Iterator<Item = &dyn SoundFileType> {
        self.types.iter().map(|t| t.as_ref())
    }

    /// The default handler (first registered).
    pub fn first(&self) -> &dyn SoundFileType {
        self.types[0].as_ref()
    }

    /// Lookup by handler name.
    pub fn by_name(&self, name: &str) -> Option<&dyn SoundFileType> {
        self.types().find(|t| t.name() == name)
    }

    /// Lookup by filename extension.
    pub fn by_extension(&self, filename: &str) -> Option<&dyn SoundFileType> {
        self.types().find(|t| t.has_extension(filename))
    }

    /// Largest probe prefix any handler needs.
    pub fn min_header_size(&self) -> usize {
        self.min_header_size
    }

    /// Registered names, dash-prefixed and space-separated, for usage lines.
    pub fn type_flags(&self) -> &str {
        &self.type_flags
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut reg = Registry::new();
    reg.add(Box::new(formats::wave::WaveType)); // default first
    reg.add(Box::new(formats::aiff::AiffType));
    reg.add(Box::new(formats::caf::CafType));
    reg.add(Box::new(formats::next::NextType));
    reg
});

/// The process-wide format registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// The raw (headerless) handler, kept outside the registry so it never
/// participates in probing.
pub fn raw_type() -> &'static dyn SoundFileType {
    static RAW: formats::raw::RawType = formats::raw::RawType;
    &RAW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_order_and_default() {
        let names: Vec<&str> = registry().types().map(|t| t.name()).collect();
        assert_eq!(names, vec!["wave", "aiff", "caf", "next"]);
        assert_eq!(registry().first().name(), "wave");
    }

    #[test]
    fn lookup_by_name_and_extension() {
        assert_eq!(registry().by_name("caf").unwrap().name(), "caf");
        assert!(registry().by_name("ogg").is_none());
        assert_eq!(registry().by_extension("x.wav").unwrap().name(), "wave");
        assert_eq!(registry().by_extension("x.AIF").unwrap().name(), "aiff");
        assert_eq!(registry().by_extension("x.snd").unwrap().name(), "next");
        assert!(registry().by_extension("x.mp3").is_none());
    }

    #[test]
    fn flags_string_lists_all_types() {
        assert_eq!(registry().type_flags(), "-wave -aiff -caf -next");
    }

    #[test]
    fn probe_prefix_covers_every_handler() {
        let max = registry().types().map(|t| t.min_header_size()).max().unwrap();
        assert_eq!(registry().min_header_size(), max);
    }

    #[test]
    fn raw_never_probes_true() {
        assert!(!raw_type().probe(b"RIFFxxxxWAVE"));
        assert!(raw_type().extensions().is_empty());
    }
}
