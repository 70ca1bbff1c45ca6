//! The soundfile descriptor passed through every codec call.

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io;

use crate::handler::SoundFileType;
use crate::{BYTES_MAX, bytes};

/// On-wire format of an open (or about-to-be-opened) soundfile.
///
/// This is the shareable half of the descriptor: plain data that may be
/// copied freely, e.g. between a worker thread and an audio callback. The
/// OS file handle and per-format scratch live in [`SoundFile`] and stay with
/// whichever thread performs the I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundSpec {
    /// Sample rate in Hz; 0 when not yet known.
    pub samplerate: u32,
    /// Channel count, 1..=[`MAX_CHANNELS`](crate::MAX_CHANNELS) once open.
    pub channels: usize,
    /// Bytes per sample on the wire: 2, 3, or 4.
    pub bytes_per_sample: usize,
    /// `channels * bytes_per_sample`, kept alongside because nearly every
    /// transfer computation needs it.
    pub bytes_per_frame: usize,
    /// Wire byte order.
    pub big_endian: bool,
    /// Byte position of the first sample frame. `None` means "detect from
    /// the header"; a caller-supplied value forces headerless (raw) access.
    pub header_size: Option<u64>,
    /// Remaining byte budget of sample data from the current file position.
    /// [`BYTES_MAX`] when the size is not (yet) known.
    pub byte_limit: u64,
}

impl Default for SoundSpec {
    fn default() -> Self {
        Self {
            samplerate: 0,
            channels: 0,
            bytes_per_sample: 0,
            bytes_per_frame: 0,
            big_endian: false,
            header_size: None,
            byte_limit: BYTES_MAX,
        }
    }
}

impl SoundSpec {
    /// Resets all format info while keeping the descriptor usable.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Sets the channel count and sample width together, maintaining the
    /// `bytes_per_frame` product.
    pub fn set_layout(&mut self, channels: usize, bytes_per_sample: usize) {
        self.channels = channels;
        self.bytes_per_sample = bytes_per_sample;
        self.bytes_per_frame = channels * bytes_per_sample;
    }

    /// Number of whole sample frames left in the byte budget.
    pub fn frames_in_file(&self) -> u64 {
        if self.bytes_per_frame == 0 {
            0
        } else {
            self.byte_limit / self.bytes_per_frame as u64
        }
    }

    /// True when the wire byte order differs from the machine's.
    pub fn needs_byte_swap(&self) -> bool {
        self.big_endian != bytes::is_big_endian()
    }
}

/// An open soundfile: descriptor plus the OS handle and any per-format
/// scratch the handler hangs on to (e.g. header fix-up offsets).
#[derive(Default)]
pub struct SoundFile {
    /// The open file, or `None` when closed.
    pub file: Option<File>,
    /// Format handler; set whenever `file` is open.
    pub ftype: Option<&'static dyn SoundFileType>,
    /// Wire format info.
    pub spec: SoundSpec,
    /// Handler-owned per-file state. Owned by whichever thread drives the
    /// handler; never shared.
    pub data: Option<Box<dyn Any + Send>>,
}

impl SoundFile {
    /// A closed descriptor with cleared format info.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when an OS file handle is attached.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// The attached file handle, as an I/O error when closed.
    pub fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "soundfile is not open"))
    }

    /// Drops the file handle and handler scratch, closing the file.
    pub fn close(&mut self) {
        if let Some(t) = self.ftype {
            t.close(self);
        } else {
            self.data = None;
            self.file = None;
        }
    }
}

impl fmt::Debug for SoundFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundFile")
            .field("open", &self.is_open())
            .field("type", &self.ftype.map(|t| t.name()))
            .field("spec", &self.spec)
            .finish()
    }
}
