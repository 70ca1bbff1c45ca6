//! State shared between an object's host-facing half, its audio callback,
//! and its worker thread.
//!
//! Everything lives under one mutex, including the FIFO byte buffer. The
//! audio callback and the worker each hold the lock only to inspect state
//! and to move bytes between the FIFO and their own buffers; disk I/O
//! always happens with the lock released.

use parking_lot::{Condvar, Mutex};

use cinta_core::{Atom, BYTES_MAX, Error, SoundFileType, SoundSpec};

/// Largest audio block the FIFO is rounded for. The ring is sized as a
/// multiple of `bytes_per_frame * MAX_VECSIZE` so any block and any disk
/// window stay frame-aligned.
pub const MAX_VECSIZE: usize = 128;

/// Upper bound on one disk read.
pub const READSIZE: usize = 65536;

/// The writer holds off until this many bytes are buffered (except when
/// draining for close).
pub const WRITESIZE: usize = 65536;

/// Default FIFO bytes per channel.
pub const DEF_BUF_PER_CHANNEL: usize = 262144;

/// Smallest accepted FIFO size.
pub const MIN_BUFSIZE: usize = 4 * READSIZE;

/// Largest accepted FIFO size.
pub const MAX_BUFSIZE: usize = 16_777_216;

/// Stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Nothing open, callback emits silence (reader) or nothing (writer).
    Idle,
    /// File requested, waiting for `start`.
    Startup,
    /// Audio moving through the FIFO.
    Stream,
}

/// Request posted to the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// No pending work.
    Nothing,
    /// Open the file described by the shared fields.
    Open,
    /// Close the current file.
    Close,
    /// Close and exit the worker.
    Quit,
    /// Worker is inside its fill/drain loop.
    Busy,
}

/// Everything under the object's mutex.
pub(crate) struct StreamState {
    pub buf: Vec<u8>,
    pub fifosize: usize,
    /// Producer index (worker for the reader, callback for the writer).
    pub head: usize,
    /// Consumer index.
    pub tail: usize,
    pub phase: StreamPhase,
    pub request: Request,
    pub eof: bool,
    pub file_error: Option<Error>,
    /// Shared copy of the open file's format.
    pub spec: SoundSpec,
    /// Handler forced by the caller for the next open, if any.
    pub ftype: Option<&'static dyn SoundFileType>,
    pub filename: String,
    /// Reader only: frames to skip at open.
    pub onset_frames: u64,
    /// Writer only: metadata messages awaiting the worker.
    pub pending_meta: Vec<Vec<Atom>>,
    /// Writer only: frames on disk so far.
    pub frames_written: u64,
    /// Callback-to-worker nudge cadence (~16 per buffer traversal).
    pub sig_period: usize,
    pub sig_countdown: usize,
    pub vec_size: usize,
    /// Writer only: sample rate of the bound input signal.
    pub in_samplerate: u32,
    /// Reader only: completion bang waiting to be collected.
    pub done: bool,
}

impl StreamState {
    fn new(bufsize: usize) -> Self {
        Self {
            buf: vec![0u8; bufsize],
            fifosize: 0,
            head: 0,
            tail: 0,
            phase: StreamPhase::Idle,
            request: Request::Nothing,
            eof: false,
            file_error: None,
            spec: SoundSpec::default(),
            ftype: None,
            filename: String::new(),
            onset_frames: 0,
            pending_meta: Vec::new(),
            frames_written: 0,
            sig_period: 1,
            sig_countdown: 1,
            vec_size: MAX_VECSIZE,
            in_samplerate: 0,
            done: false,
        }
    }

    /// Rounds the FIFO down to a multiple of the per-tick quantum,
    /// pessimistically assuming [`MAX_VECSIZE`] frames per tick.
    pub fn round_fifosize(&mut self) {
        let quantum = self.spec.bytes_per_frame * MAX_VECSIZE;
        if quantum > 0 {
            self.fifosize = self.buf.len() - (self.buf.len() % quantum);
        }
    }

    /// Re-derives the nudge cadence for the current block size.
    pub fn reset_sig_cadence(&mut self) {
        let per_tick = 16 * self.spec.bytes_per_frame * self.vec_size;
        self.sig_period = (self.fifosize / per_tick.max(1)).max(1);
        self.sig_countdown = self.sig_period;
    }

    /// Clears the stream fields for a fresh open.
    pub fn reset_for_open(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.eof = false;
        self.file_error = None;
        self.done = false;
        self.frames_written = 0;
        self.spec.byte_limit = BYTES_MAX;
    }
}

/// The mutex/condvar bundle one object and its worker share.
pub(crate) struct Shared {
    pub state: Mutex<StreamState>,
    /// Worker waits here for work or for FIFO space.
    pub request_cv: Condvar,
    /// Callback (and teardown) wait here for the worker's progress.
    pub answer_cv: Condvar,
}

impl Shared {
    pub fn new(bufsize: usize) -> Self {
        Self {
            state: Mutex::new(StreamState::new(bufsize)),
            request_cv: Condvar::new(),
            answer_cv: Condvar::new(),
        }
    }
}

/// Applies the buffer-size rules: 0 picks the per-channel default, anything
/// else is clamped to the accepted range.
pub(crate) fn clamp_bufsize(bufsize: usize, channels: usize) -> usize {
    if bufsize == 0 {
        DEF_BUF_PER_CHANNEL * channels
    } else {
        bufsize.clamp(MIN_BUFSIZE, MAX_BUFSIZE)
    }
}
