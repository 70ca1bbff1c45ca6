//! Synchronous open, create, and finish-write.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::handler::{raw_type, registry};
use crate::soundfile::SoundFile;
use crate::{Error, MAX_FRAMES, Result};

/// Turns filenames into files, relative to whatever the host considers the
/// current context (a patch directory, the working directory, ...).
pub trait FileResolver: Send + Sync {
    /// Opens an existing file for reading.
    fn open_read(&self, name: &str) -> io::Result<File>;

    /// The full path a new file of this name should be created at.
    fn create_path(&self, name: &str) -> PathBuf;
}

/// Resolver rooted at a fixed directory. Absolute names pass through.
pub struct BaseDir {
    dir: PathBuf,
}

impl BaseDir {
    /// Resolver rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileResolver for BaseDir {
    fn open_read(&self, name: &str) -> io::Result<File> {
        File::open(self.dir.join(name))
    }

    fn create_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Opens a soundfile from an already-open file handle.
///
/// If the caller overrode header detection (`spec.header_size` is set) the
/// raw handler is used and the caller must have supplied channels, width,
/// and byte order. Otherwise the header prefix is probed — against the
/// caller's preselected handler if any, else against every registered
/// handler in order. The descriptor is then filled from the header and the
/// file left positioned at sample frame `skip_frames`.
///
/// On failure the handler is released and the file closed, leaving `sf`
/// clean.
pub fn open_soundfile(file: File, sf: &mut SoundFile, skip_frames: u64) -> Result<()> {
    match open_steps(file, sf, skip_frames) {
        Ok(()) => Ok(()),
        Err(e) => {
            sf.close();
            Err(e)
        }
    }
}

fn open_steps(mut file: File, sf: &mut SoundFile, skip_frames: u64) -> Result<()> {
    let t = if sf.spec.header_size.is_some() {
        raw_type()
    } else {
        let reg = registry();
        let mut probe = vec![0u8; reg.min_header_size()];
        let n = read_fully(&mut file, &mut probe)?;
        let t = match sf.ftype {
            Some(t) => {
                if !t.probe(&probe[..n]) {
                    return Err(Error::BadHeaderAs(t.name()));
                }
                t
            }
            None => reg
                .types()
                .find(|t| t.probe(&probe[..n]))
                .ok_or(Error::BadHeader)?,
        };
        file.seek(SeekFrom::Start(0))?;
        t
    };
    sf.ftype = Some(t);
    t.open(sf, file)?;
    t.read_header(sf)?;
    t.seek_to_frame(sf, skip_frames)?;
    sf.spec.byte_limit = sf
        .spec
        .byte_limit
        .saturating_sub(skip_frames * sf.spec.bytes_per_frame as u64);
    Ok(())
}

/// [`open_soundfile`] by name, through a resolver.
pub fn open_soundfile_named(
    resolver: &dyn FileResolver,
    name: &str,
    sf: &mut SoundFile,
    skip_frames: u64,
) -> Result<()> {
    let file = resolver.open_read(name)?;
    open_soundfile(file, sf, skip_frames)
}

/// Creates a soundfile for writing: fixes up the extension, truncate-opens,
/// and writes a header for `nframes` frames ([`MAX_FRAMES`] = open-ended
/// placeholder). Returns the path actually created. On failure `sf` is left
/// clean.
pub fn create_soundfile(
    resolver: &dyn FileResolver,
    name: &str,
    sf: &mut SoundFile,
    nframes: u64,
) -> Result<PathBuf> {
    let t = sf.ftype.ok_or(Error::BadHeader)?;
    let mut filename = name.to_string();
    if !t.has_extension(&filename) && !t.default_extension().is_empty() {
        filename.push('.');
        filename.push_str(t.default_extension());
    }
    let path = resolver.create_path(&filename);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    t.open(sf, file)?;
    match t.write_header(sf, nframes) {
        Ok(size) => {
            sf.spec.header_size = Some(size);
            Ok(path)
        }
        Err(e) => {
            t.close(sf);
            Err(e)
        }
    }
}

/// Completes a write: warns about a short write, then patches the header's
/// size fields to the frame count actually written.
pub fn finish_write(
    filename: &str,
    sf: &mut SoundFile,
    nframes: u64,
    frames_written: u64,
) -> Result<()> {
    if frames_written >= nframes {
        return Ok(());
    }
    if nframes < MAX_FRAMES {
        tracing::warn!(
            filename,
            frames_written,
            requested = nframes,
            "fewer frames written than requested"
        );
    }
    let t = sf.ftype.ok_or(Error::BadHeader)?;
    t.update_header(sf, frames_written)
}

fn read_fully(f: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let r = f.read(&mut buf[n..])?;
        if r == 0 {
            break;
        }
        n += r;
    }
    Ok(n)
}
