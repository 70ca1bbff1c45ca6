//! Non-realtime bulk transfer between soundfiles and host tables.
//!
//! The [`Filer`] reads a soundfile into named float arrays ([`Table`]s
//! resolved through a [`TableStore`]) or writes arrays out as a soundfile.
//! These operations run synchronously on the caller's thread and may block
//! on disk; the realtime objects live in `cinta-stream`.
//!
//! ```rust,ignore
//! use cinta_filer::{Filer, MemoryTables};
//!
//! let mut tables = MemoryTables::new();
//! tables.insert("left", 0);
//! let filer = Filer::new(Box::new(BaseDir::new(".")));
//! let result = filer.read(&atoms("read -resize input.wav left"), &tables)?;
//! println!("{} frames", result.frames);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use cinta_core::{
    Atom, Error, FileResolver, MAX_CHANNELS, MAX_FRAMES, Result, SoundFile, bytes, codec,
    create_soundfile, description, finish_write, open_soundfile_named, parse_write_args, registry,
};

/// Per-transfer staging buffer size in bytes.
pub const SAMPBUFSIZE: usize = 1024;

/// A host-owned named float array.
#[derive(Debug, Default, Clone)]
pub struct Table {
    /// The samples.
    pub samples: Vec<f32>,
}

impl Table {
    /// A zero-filled table of `len` samples.
    pub fn new(len: usize) -> Self {
        Self { samples: vec![0.0; len] }
    }

    /// Grows or shrinks the table, zero-filling new space.
    pub fn resize(&mut self, len: usize) {
        self.samples.resize(len, 0.0);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Shared handle to a host table.
pub type TableHandle = Rc<RefCell<Table>>;

/// Resolves table names to host arrays.
pub trait TableStore {
    /// Looks up a table by name.
    fn table(&self, name: &str) -> Option<TableHandle>;
}

/// In-memory table store for hosts and tests.
#[derive(Default)]
pub struct MemoryTables {
    tables: HashMap<String, TableHandle>,
}

impl MemoryTables {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table of `len` zeros and returns its handle.
    pub fn insert(&mut self, name: &str, len: usize) -> TableHandle {
        let handle: TableHandle = Rc::new(RefCell::new(Table::new(len)));
        self.tables.insert(name.to_string(), Rc::clone(&handle));
        handle
    }
}

impl TableStore for MemoryTables {
    fn table(&self, name: &str) -> Option<TableHandle> {
        self.tables.get(name).cloned()
    }
}

/// Result of a bulk read.
#[derive(Debug)]
pub struct ReadResult {
    /// Frames transferred (or counted from the header when no tables were
    /// given).
    pub frames: u64,
    /// The five-atom format description; empty for ASCII reads.
    pub description: Vec<Atom>,
    /// Metadata entries, when `-meta` was given and the format has any.
    pub meta: Vec<(String, String)>,
}

/// Result of a bulk write.
pub struct WriteResult {
    /// Frames actually written.
    pub frames: u64,
    /// The five-atom format description.
    pub description: Vec<Atom>,
}

/// The bulk reader/writer operator.
pub struct Filer {
    resolver: Box<dyn FileResolver>,
    samplerate: u32,
}

impl Filer {
    /// An operator resolving files through `resolver`, assuming the host
    /// runs at 44.1 kHz until [`set_samplerate`](Self::set_samplerate).
    pub fn new(resolver: Box<dyn FileResolver>) -> Self {
        Self { resolver, samplerate: 44100 }
    }

    /// Sets the host sample rate used for headerless reads and as the
    /// write-rate fallback.
    pub fn set_samplerate(&mut self, samplerate: u32) {
        self.samplerate = samplerate;
    }

    /// `read [flags] filename [tablename]...`
    ///
    /// Flags: `-skip <n>`, `-ascii`, `-raw <headerbytes> <channels>
    /// <bytespersample> <b|l|n>`, `-resize`, `-maxsize <n>`, `-meta`,
    /// `-<typename>`, `--`.
    pub fn read(&self, args: &[Atom], store: &dyn TableStore) -> Result<ReadResult> {
        let usage = || {
            tracing::error!("usage: read [flags] filename [tablename]...");
            tracing::info!(
                "flags: -skip <n> -resize -maxsize <n> -meta -ascii {} --",
                registry().type_flags()
            );
            tracing::info!("-raw <headerbytes> <channels> <bytespersample> <endian (b, l, or n)>");
            Error::Usage("read [flags] filename [tablename]...".into())
        };

        let mut sf = SoundFile::new();
        let mut args = args;
        let mut skip_frames = 0u64;
        let mut resize = false;
        let mut ascii = false;
        let mut want_meta = false;
        let mut maxsize = MAX_FRAMES;

        while let Some(flag) = args.first().and_then(Atom::flag) {
            match flag {
                "skip" => {
                    let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                    if v < 0.0 {
                        return Err(usage());
                    }
                    skip_frames = v as u64;
                    args = &args[2..];
                }
                "ascii" => {
                    if sf.spec.header_size.is_some() {
                        tracing::info!("read: '-raw' overridden by '-ascii'");
                    }
                    ascii = true;
                    args = &args[1..];
                }
                "raw" => {
                    if ascii {
                        tracing::info!("read: '-raw' overridden by '-ascii'");
                    }
                    let header = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                    let channels = args.get(2).and_then(Atom::float).ok_or_else(usage)?;
                    let width = args.get(3).and_then(Atom::float).ok_or_else(usage)?;
                    let endian = args.get(4).and_then(Atom::symbol).ok_or_else(usage)?;
                    if header < 0.0
                        || !(1.0..=MAX_CHANNELS as f32).contains(&channels)
                        || !(2.0..=4.0).contains(&width)
                    {
                        return Err(usage());
                    }
                    sf.spec.big_endian = match endian.chars().next() {
                        Some('b') => true,
                        Some('l') => false,
                        Some('n') => bytes::is_big_endian(),
                        _ => return Err(usage()),
                    };
                    sf.spec.header_size = Some(header as u64);
                    sf.spec.set_layout(channels as usize, width as usize);
                    sf.spec.samplerate = self.samplerate;
                    args = &args[5..];
                }
                "resize" => {
                    resize = true;
                    args = &args[1..];
                }
                "maxsize" => {
                    let v = args.get(1).and_then(Atom::float).ok_or_else(usage)?;
                    if v < 0.0 {
                        return Err(usage());
                    }
                    maxsize = v as u64;
                    resize = true; // maxsize implies resize
                    args = &args[2..];
                }
                "meta" => {
                    want_meta = true;
                    args = &args[1..];
                }
                "-" => {
                    args = &args[1..];
                    break;
                }
                name => {
                    sf.ftype = Some(registry().by_name(name).ok_or_else(usage)?);
                    args = &args[1..];
                }
            }
        }

        let filename = args.first().and_then(Atom::symbol).ok_or_else(usage)?.to_string();
        args = &args[1..];
        if args.len() > MAX_CHANNELS {
            return Err(usage());
        }

        let mut tables = Vec::with_capacity(args.len());
        for name_atom in args {
            let name = name_atom.symbol().ok_or_else(usage)?;
            let handle = store
                .table(name)
                .ok_or_else(|| Error::NoSuchTable(name.to_string()))?;
            tables.push(handle);
        }
        let mut finalsize = tables.last().map_or(0, |t| t.borrow().len()) as u64;
        if tables
            .iter()
            .any(|t| t.borrow().len() as u64 != finalsize)
            && !resize
        {
            tracing::info!("read: arrays have different lengths; resizing...");
            resize = true;
        }

        if ascii {
            let frames = self.read_ascii(&filename, &tables, resize, finalsize)?;
            return Ok(ReadResult { frames, description: Vec::new(), meta: Vec::new() });
        }

        let is_raw = sf.spec.header_size.is_some();
        if let Err(e) = open_soundfile_named(self.resolver.as_ref(), &filename, &mut sf, skip_frames)
        {
            tracing::error!(filename = %filename, error = %e, "read failed");
            return Err(e);
        }
        let mut framesinfile = sf.spec.frames_in_file();

        let mut meta = Vec::new();
        if want_meta
            && let Some(t) = sf.ftype
        {
            if t.supports_meta() {
                match t.read_meta(&mut sf) {
                    Ok(entries) => meta = entries,
                    Err(e) => {
                        tracing::error!(filename = %filename, error = %e, "reading metadata failed");
                    }
                }
            } else {
                tracing::error!("read: {} does not support metadata", t.name());
            }
        }

        if resize {
            if framesinfile > maxsize {
                tracing::error!("read: truncated to {maxsize} elements");
                framesinfile = maxsize;
            }
            finalsize = framesinfile;
            for t in &tables {
                t.borrow_mut().resize(finalsize as usize);
            }
        }

        if finalsize == 0 {
            finalsize = MAX_FRAMES;
        }
        if finalsize > framesinfile {
            finalsize = framesinfile;
        }

        // With no tables the header alone answers, unless the size is
        // unknown (or headerless) and has to be counted by reading.
        if tables.is_empty() && !is_raw && finalsize != MAX_FRAMES {
            let spec = sf.spec;
            sf.close();
            return Ok(ReadResult { frames: finalsize, description: description(&spec), meta });
        }

        let spec = sf.spec;
        let bpf = spec.bytes_per_frame;
        let buf_frames = (SAMPBUFSIZE / bpf).max(1);
        let mut buf = vec![0u8; buf_frames * bpf];
        let mut borrows: Vec<std::cell::RefMut<'_, Table>> =
            tables.iter().map(|t| t.borrow_mut()).collect();
        let mut slices: Vec<&mut [f32]> =
            borrows.iter_mut().map(|b| b.samples.as_mut_slice()).collect();

        let mut frames_read = 0u64;
        while frames_read < finalsize {
            let this_read = (finalsize - frames_read).min(buf_frames as u64) as usize;
            let t = sf.ftype.ok_or(Error::BadHeader)?;
            let nframes = t.read_samples(&mut sf, &mut buf[..this_read * bpf])? / bpf;
            if nframes == 0 {
                break;
            }
            codec::decode_frames(&spec, &mut slices, frames_read as usize, &buf, nframes);
            frames_read += nframes as u64;
        }

        // Zero the table tails past what the file provided.
        for slice in &mut slices {
            slice[frames_read as usize..].fill(0.0);
        }

        drop(slices);
        drop(borrows);
        sf.close();
        Ok(ReadResult { frames: frames_read, description: description(&spec), meta })
    }

    /// Reads whitespace-separated numbers as frames of `tables.len()`
    /// channels.
    fn read_ascii(
        &self,
        filename: &str,
        tables: &[TableHandle],
        resize: bool,
        finalsize: u64,
    ) -> Result<u64> {
        let mut text = String::new();
        self.resolver.open_read(filename)?.read_to_string(&mut text)?;
        let values: Vec<f32> = text
            .split_whitespace()
            .map(|w| w.parse::<f32>().unwrap_or(0.0))
            .collect();

        let narray = tables.len().max(1);
        let mut nframes = values.len() / narray;
        if nframes < 1 {
            tracing::error!(filename, "read: empty or very short file");
            return Ok(0);
        }
        if resize {
            for t in tables {
                t.borrow_mut().resize(nframes);
            }
        } else if (finalsize as usize) < nframes {
            nframes = finalsize as usize;
        }
        for (i, t) in tables.iter().enumerate() {
            let mut t = t.borrow_mut();
            for (j, out) in t.samples.iter_mut().enumerate() {
                *out = if j < nframes { values[j * narray + i] } else { 0.0 };
            }
        }
        Ok(nframes as u64)
    }

    /// `write [flags] filename tablename...`
    ///
    /// Flags: `-skip <n>`, `-nframes <n>`, `-bytes <n>`, `-rate|-r <n>`,
    /// `-normalize`, `-big`, `-little`, `-meta <key> <values>...`,
    /// `-<typename>`, `--`. Defaults to a 16-bit wave file.
    pub fn write(&self, args: &[Atom], store: &dyn TableStore) -> Result<WriteResult> {
        let usage = |e: Error| {
            tracing::error!("usage: write [flags] filename tablename...");
            tracing::info!(
                "flags: -skip <n> -nframes <n> -bytes <n> {} ...",
                registry().type_flags()
            );
            tracing::info!("-big -little -normalize -meta <key> [values...] --");
            tracing::info!("(defaults to a 16 bit wave file)");
            e
        };

        let (mut wa, rest) = parse_write_args(args).map_err(|e| usage(e))?;
        let channels = rest.len();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(usage(Error::Usage("write [flags] filename tablename...".into())));
        }

        let mut tables = Vec::with_capacity(channels);
        let mut nframes = wa.nframes;
        for name_atom in rest {
            let name = name_atom
                .symbol()
                .ok_or_else(|| usage(Error::Usage("table names must be symbols".into())))?;
            let handle = store
                .table(name)
                .ok_or_else(|| Error::NoSuchTable(name.to_string()))?;
            let len = handle.borrow().len() as u64;
            nframes = nframes.min(len.saturating_sub(wa.onset_frames));
            tables.push(handle);
        }
        if nframes == 0 {
            tracing::error!("write: no samples at onset {}", wa.onset_frames);
            return Err(Error::Usage("write: no samples at onset".into()));
        }

        let mut sf = SoundFile::new();
        sf.ftype = Some(wa.ftype);
        sf.spec.set_layout(channels, wa.bytes_per_sample);
        sf.spec.samplerate = wa.samplerate.unwrap_or(self.samplerate);
        sf.spec.big_endian = wa.big_endian;

        let borrows: Vec<std::cell::Ref<'_, Table>> = tables.iter().map(|t| t.borrow()).collect();
        let slices: Vec<&[f32]> = borrows.iter().map(|b| b.samples.as_slice()).collect();
        let peak = codec::peak(&slices, wa.onset_frames as usize, nframes as usize);

        if let Err(e) = create_soundfile(self.resolver.as_ref(), &wa.filename, &mut sf, nframes) {
            tracing::error!(filename = %wa.filename, error = %e, "write failed");
            return Err(e);
        }

        if !wa.normalize {
            if sf.spec.bytes_per_sample != 4 && peak > 1.0 {
                tracing::warn!("{}: reducing max amplitude {peak} to 1", wa.filename);
                wa.normalize = true;
            } else {
                tracing::info!("{}: biggest amplitude = {peak}", wa.filename);
            }
        }
        let normfactor = if wa.normalize { codec::norm_factor(peak) } else { 1.0 };

        if !wa.meta.is_empty() {
            let t = wa.ftype;
            if t.supports_meta() {
                for group in &wa.meta {
                    if let Err(e) = t.write_meta(&mut sf, group) {
                        tracing::error!(error = %e, "writing {} metadata failed", t.name());
                    }
                }
            } else {
                tracing::error!("write: {} does not support writing metadata", t.name());
            }
        }

        let spec = sf.spec;
        let bpf = spec.bytes_per_frame;
        let buf_frames = (SAMPBUFSIZE / bpf).max(1);
        let mut buf = vec![0u8; buf_frames * bpf];
        let mut frames_written = 0u64;
        while frames_written < nframes {
            let this_write = (nframes - frames_written).min(buf_frames as u64) as usize;
            codec::encode_frames(
                &spec,
                &slices,
                &mut buf[..this_write * bpf],
                this_write,
                (wa.onset_frames + frames_written) as usize,
                normfactor,
            );
            let written = wa.ftype.write_samples(&mut sf, &buf[..this_write * bpf])?;
            frames_written += (written / bpf) as u64;
            if written < this_write * bpf {
                tracing::error!(filename = %wa.filename, "short write");
                break;
            }
        }

        finish_write(&wa.filename, &mut sf, nframes, frames_written)?;
        let spec = sf.spec;
        sf.close();
        Ok(WriteResult { frames: frames_written, description: description(&spec) })
    }
}
