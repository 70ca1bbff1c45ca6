//! The streaming reader: a realtime object whose audio callback consumes a
//! byte FIFO that a worker thread keeps filled from disk.
//!
//! The worker is signaled each time a file wants opening or closing and
//! every time the callback has eaten another 1/16 of the buffer; the worker
//! signals back whenever a read completes. All shared fields move under one
//! mutex; the disk never gets touched while it is held.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::MutexGuard;

use cinta_core::{
    Atom, Error, FileResolver, MAX_CHANNELS, Result, SoundFile, SoundFileType, bytes, codec,
    open_soundfile_named, registry,
};

use crate::shared::{READSIZE, Request, Shared, StreamPhase, StreamState, clamp_bufsize};

/// Parsed form of the reader's `open` message:
/// `open [flags] filename [onset headersize channels bytespersample endian]`.
pub struct OpenRequest {
    /// File to open, resolved by the object's [`FileResolver`].
    pub filename: String,
    /// Sample frames to skip before the first output frame.
    pub onset_frames: u64,
    /// `Some(n)` forces headerless access with an `n`-byte header to skip;
    /// `None` probes the header.
    pub header_size: Option<u64>,
    /// Channel count for headerless access.
    pub channels: usize,
    /// Sample width for headerless access.
    pub bytes_per_sample: usize,
    /// Byte order for headerless access; `None` = machine order.
    pub big_endian: Option<bool>,
    /// Handler forced by a `-<type>` flag.
    pub ftype: Option<&'static dyn SoundFileType>,
}

impl OpenRequest {
    /// A plain header-probing request for `filename`.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            onset_frames: 0,
            header_size: None,
            channels: 1,
            bytes_per_sample: 2,
            big_endian: None,
            ftype: None,
        }
    }

    /// Parses the `open` message's atoms. A `headersize` argument of zero
    /// means "detect"; a negative value means a truly headerless file.
    pub fn parse(mut args: &[Atom]) -> Result<Self> {
        let usage = || {
            Error::Usage(
                "open [flags] filename [onset] [headersize] [channels] [bytespersample] \
                 [endian (b or l)]"
                    .into(),
            )
        };
        let mut ftype = None;
        while let Some(flag) = args.first().and_then(Atom::flag) {
            match flag {
                "-" => {
                    args = &args[1..];
                    break;
                }
                name => {
                    ftype = Some(registry().by_name(name).ok_or_else(usage)?);
                    args = &args[1..];
                }
            }
        }
        let filename = args.first().and_then(Atom::symbol).ok_or_else(usage)?.to_string();
        let onset = args.get(1).and_then(Atom::float).unwrap_or(0.0);
        let header_size = args.get(2).and_then(Atom::float).unwrap_or(0.0);
        let channels = args.get(3).and_then(Atom::float).unwrap_or(0.0);
        let width = args.get(4).and_then(Atom::float).unwrap_or(0.0);
        let endian = args.get(5).and_then(Atom::symbol).unwrap_or("");
        let big_endian = match endian.chars().next() {
            Some('b') => Some(true),
            Some('l') => Some(false),
            Some(_) => {
                tracing::error!("endianness neither 'b' nor 'l'");
                None
            }
            None => None,
        };
        Ok(Self {
            filename,
            onset_frames: if onset > 0.0 { onset as u64 } else { 0 },
            header_size: if header_size > 0.0 {
                Some(header_size as u64)
            } else if header_size == 0.0 {
                None
            } else {
                Some(0)
            },
            channels: if channels >= 1.0 { (channels as usize).min(MAX_CHANNELS) } else { 1 },
            bytes_per_sample: if width > 2.0 { width as usize } else { 2 },
            big_endian,
            ftype,
        })
    }
}

/// Realtime soundfile reader. One worker thread per object, running from
/// construction until drop.
pub struct StreamReader {
    shared: Arc<Shared>,
    noutlets: usize,
    worker: Option<JoinHandle<()>>,
}

impl StreamReader {
    /// Creates a reader with `noutlets` output channels and a FIFO of
    /// `bufsize` bytes (0 picks the default), and starts its worker.
    pub fn new(noutlets: usize, bufsize: usize, resolver: Arc<dyn FileResolver>) -> Result<Self> {
        let noutlets = noutlets.clamp(1, MAX_CHANNELS);
        let bufsize = clamp_bufsize(bufsize, noutlets);
        let shared = Arc::new(Shared::new(bufsize));
        shared.state.lock().spec.set_layout(1, 2);

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("cinta-stream-read".into())
            .spawn(move || reader_worker(&worker_shared, resolver.as_ref()))?;
        Ok(Self { shared, noutlets, worker: Some(worker) })
    }

    /// Number of output channels.
    pub fn channels(&self) -> usize {
        self.noutlets
    }

    /// Posts an open request to the worker and enters the startup state.
    /// Playback begins at [`start`](Self::start).
    pub fn open(&self, req: OpenRequest) {
        let mut st = self.shared.state.lock();
        st.spec.clear();
        st.filename = req.filename;
        st.onset_frames = req.onset_frames;
        st.spec.header_size = req.header_size;
        st.spec.set_layout(req.channels, req.bytes_per_sample);
        st.spec.big_endian = req.big_endian.unwrap_or_else(bytes::is_big_endian);
        if let Some(t) = req.ftype {
            if st.spec.header_size.is_some() {
                tracing::error!("'-{}' overridden by headersize", t.name());
                st.ftype = None;
            } else {
                st.ftype = Some(t);
            }
        } else {
            st.ftype = None;
        }
        st.reset_for_open();
        st.request = Request::Open;
        st.phase = StreamPhase::Startup;
        self.shared.request_cv.notify_one();
    }

    /// Begins streaming; only valid after an `open`.
    pub fn start(&self) {
        let mut st = self.shared.state.lock();
        if st.phase == StreamPhase::Startup {
            st.phase = StreamPhase::Stream;
        } else {
            tracing::error!("start requested with no prior 'open'");
        }
    }

    /// Stops streaming and asks the worker to close the file.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        st.phase = StreamPhase::Idle;
        st.request = Request::Close;
        self.shared.request_cv.notify_one();
    }

    /// Float shorthand: nonzero starts, zero stops.
    pub fn set_running(&self, on: bool) {
        if on { self.start() } else { self.stop() }
    }

    /// Rebinds the host block size, re-deriving the signal cadence.
    pub fn configure(&self, vec_size: usize) {
        let mut st = self.shared.state.lock();
        st.vec_size = vec_size.max(1);
        st.reset_sig_cadence();
    }

    /// Collects the one-shot end-of-stream notification. The flag is set
    /// from the audio callback on the EOF transition and drained here so
    /// completion events stay on the host's thread.
    pub fn take_done(&self) -> bool {
        std::mem::take(&mut self.shared.state.lock().done)
    }

    /// Collects an error the worker stored asynchronously, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.state.lock().file_error.take()
    }

    /// Logs the FIFO state.
    pub fn print(&self) {
        let st = self.shared.state.lock();
        tracing::info!(
            phase = ?st.phase,
            head = st.head,
            tail = st.tail,
            fifosize = st.fifosize,
            eof = st.eof,
            "reader state"
        );
    }

    /// The audio callback. Decodes one block of frames from the FIFO into
    /// the per-channel `outputs`, or zeros them when idle. Blocks briefly on
    /// the worker only when the FIFO is starved.
    ///
    /// Block sizes over [`MAX_VECSIZE`](crate::MAX_VECSIZE) must be split
    /// by the caller.
    pub fn process(&self, outputs: &mut [&mut [f32]]) {
        let vec_size = outputs.first().map_or(0, |o| o.len());
        let mut st = self.shared.state.lock();
        if st.phase != StreamPhase::Stream {
            drop(st);
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        }
        if st.vec_size != vec_size {
            st.vec_size = vec_size;
            st.reset_sig_cadence();
        }
        let mut wantbytes = vec_size * st.spec.bytes_per_frame;
        while !st.eof
            && st.phase == StreamPhase::Stream
            && st.head >= st.tail
            && st.head - st.tail < wantbytes
        {
            self.shared.request_cv.notify_one();
            self.shared.answer_cv.wait(&mut st);
            wantbytes = vec_size * st.spec.bytes_per_frame;
        }
        if st.phase != StreamPhase::Stream {
            drop(st);
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        }
        if st.eof && st.head >= st.tail && st.head - st.tail < wantbytes {
            // The stream ends inside this block: report any worker error,
            // decode the partial frames left, zero the rest, and go idle.
            if let Some(err) = st.file_error.take() {
                tracing::error!(filename = %st.filename, error = %err, "streaming read failed");
            }
            let spec = st.spec;
            let bpf = spec.bytes_per_frame.max(1);
            let xfer = ((st.head - st.tail) / bpf).min(vec_size);
            if xfer > 0 {
                let from = st.tail;
                codec::decode_frames(&spec, outputs, 0, &st.buf[from..from + xfer * bpf], xfer);
            }
            for out in outputs.iter_mut() {
                out[xfer..].fill(0.0);
            }
            st.phase = StreamPhase::Idle;
            st.done = true;
            self.shared.request_cv.notify_one();
            return;
        }
        let spec = st.spec;
        let from = st.tail;
        debug_assert!(from + wantbytes <= st.fifosize);
        codec::decode_frames(&spec, outputs, 0, &st.buf[from..from + wantbytes], vec_size);
        st.tail = (from + wantbytes) % st.fifosize;
        st.sig_countdown = st.sig_countdown.saturating_sub(1);
        if st.sig_countdown == 0 {
            self.shared.request_cv.notify_one();
            st.sig_countdown = st.sig_period;
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        let mut st = self.shared.state.lock();
        st.request = Request::Quit;
        self.shared.request_cv.notify_one();
        while st.request != Request::Nothing {
            self.shared.request_cv.notify_one();
            self.shared.answer_cv.wait(&mut st);
        }
        drop(st);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("reader worker panicked");
        }
    }
}

/// The worker: opens files, fills the FIFO, and fields close/quit requests.
fn reader_worker(shared: &Shared, resolver: &dyn FileResolver) {
    let mut sf = SoundFile::new();
    let mut scratch = vec![0u8; READSIZE];
    let mut st = shared.state.lock();
    loop {
        match st.request {
            Request::Nothing | Request::Busy => {
                shared.answer_cv.notify_one();
                shared.request_cv.wait(&mut st);
            }
            Request::Open => {
                // Snapshot what the open needs, then flag busy so a second
                // open posted meanwhile is noticed.
                let filename = st.filename.clone();
                let onset = st.onset_frames;
                st.request = Request::Busy;
                st.file_error = None;
                if sf.is_open() {
                    MutexGuard::unlocked(&mut st, || sf.close());
                }
                if st.request == Request::Busy {
                    sf.spec = st.spec;
                    sf.ftype = st.ftype;
                    sf.data = None;
                    let result = MutexGuard::unlocked(&mut st, || {
                        open_soundfile_named(resolver, &filename, &mut sf, onset)
                    });
                    match result {
                        Err(e) => {
                            st.file_error = Some(e);
                            st.eof = true;
                        }
                        Ok(()) => {
                            if st.request == Request::Busy {
                                st.spec = sf.spec;
                                st.head = 0;
                                st.round_fifosize();
                                st.reset_sig_cadence();
                                fill_fifo(shared, &mut st, &mut sf, &mut scratch);
                            }
                        }
                    }
                }
                // Fell out of the fill loop: close if needed, hand the
                // request slot back, and signal once more.
                if st.request == Request::Busy {
                    st.request = Request::Nothing;
                }
                if sf.is_open() {
                    MutexGuard::unlocked(&mut st, || sf.close());
                }
                shared.answer_cv.notify_one();
            }
            Request::Close => {
                if sf.is_open() {
                    MutexGuard::unlocked(&mut st, || sf.close());
                }
                if st.request == Request::Close {
                    st.request = Request::Nothing;
                }
                shared.answer_cv.notify_one();
            }
            Request::Quit => {
                if sf.is_open() {
                    MutexGuard::unlocked(&mut st, || sf.close());
                }
                st.request = Request::Nothing;
                shared.answer_cv.notify_one();
                break;
            }
        }
    }
}

/// Waits for the FIFO to get hungry and feeds it, until EOF or a new
/// request cancels the stream.
fn fill_fifo(
    shared: &Shared,
    st: &mut MutexGuard<'_, StreamState>,
    sf: &mut SoundFile,
    scratch: &mut [u8],
) {
    let Some(t) = sf.ftype else { return };
    while st.request == Request::Busy && !st.eof {
        let fifosize = st.fifosize;
        // Contiguous window from head, or zero to wait for the consumer.
        let window = if st.head >= st.tail {
            // Reading right up to the end while the tail sits at zero would
            // fill the buffer completely, which is indistinguishable from
            // empty.
            if st.tail != 0 || fifosize - st.head > READSIZE {
                (fifosize - st.head).min(READSIZE)
            } else {
                0
            }
        } else if st.tail - st.head - 1 < READSIZE {
            0
        } else {
            READSIZE
        };
        if window == 0 {
            shared.answer_cv.notify_one();
            shared.request_cv.wait(st);
            continue;
        }
        let wantbytes = (window as u64).min(st.spec.byte_limit) as usize;
        if wantbytes == 0 {
            st.eof = true;
            break;
        }
        let head = st.head;
        let result = MutexGuard::unlocked(st, || t.read_samples(sf, &mut scratch[..wantbytes]));
        if st.request != Request::Busy {
            break;
        }
        match result {
            Err(e) => {
                st.file_error = Some(e.into());
                st.eof = true;
            }
            Ok(0) => st.eof = true,
            Ok(n) => {
                st.buf[head..head + n].copy_from_slice(&scratch[..n]);
                st.head = head + n;
                if st.head == fifosize {
                    st.head = 0;
                }
                st.spec.byte_limit = st.spec.byte_limit.saturating_sub(n as u64);
                if st.spec.byte_limit == 0 {
                    st.eof = true;
                }
            }
        }
        shared.answer_cv.notify_one();
    }
}
