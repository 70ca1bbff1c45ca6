//! The streaming writer: the audio callback produces into the byte FIFO and
//! a worker thread drains it to disk, finishing the header on close.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::MutexGuard;

use cinta_core::{
    Atom, Error, FileResolver, MAX_CHANNELS, MAX_FRAMES, Result, SoundFile, codec,
    create_soundfile, finish_write, parse_write_args,
};

use crate::shared::{READSIZE, Request, Shared, StreamPhase, StreamState, WRITESIZE, clamp_bufsize};

/// Realtime soundfile writer. One worker thread per object, running from
/// construction until drop.
pub struct StreamWriter {
    shared: Arc<Shared>,
    nchannels: usize,
    worker: Option<JoinHandle<()>>,
}

impl StreamWriter {
    /// Creates a writer for `nchannels` input channels with a FIFO of
    /// `bufsize` bytes (0 picks the default), and starts its worker.
    pub fn new(nchannels: usize, bufsize: usize, resolver: Arc<dyn FileResolver>) -> Result<Self> {
        let nchannels = nchannels.clamp(1, MAX_CHANNELS);
        let bufsize = clamp_bufsize(bufsize, nchannels);
        let shared = Arc::new(Shared::new(bufsize));
        shared.state.lock().spec.set_layout(nchannels, 2);

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("cinta-stream-write".into())
            .spawn(move || writer_worker(&worker_shared, resolver.as_ref()))?;
        Ok(Self { shared, nchannels, worker: Some(worker) })
    }

    /// Number of input channels.
    pub fn channels(&self) -> usize {
        self.nchannels
    }

    /// Parses `open [flags] filename` with the write-flag set and posts the
    /// open to the worker. An open while active stops the current file
    /// first and waits for the worker to go idle.
    pub fn open(&self, args: &[Atom]) -> Result<()> {
        let (wa, rest) = parse_write_args(args)?;
        if wa.normalize || wa.onset_frames != 0 || wa.nframes != MAX_FRAMES {
            tracing::error!("normalize/skip/nframes arguments ignored for streaming");
        }
        if !rest.is_empty() {
            tracing::error!("extra arguments ignored");
        }
        if self.shared.state.lock().phase != StreamPhase::Idle {
            self.stop();
        }
        let mut st = self.shared.state.lock();
        while st.request != Request::Nothing {
            self.shared.request_cv.notify_one();
            self.shared.answer_cv.wait(&mut st);
        }
        st.filename = wa.filename;
        st.ftype = Some(wa.ftype);
        st.spec.samplerate = match wa.samplerate {
            Some(rate) => rate,
            None if st.in_samplerate > 0 => st.in_samplerate,
            None => 44100,
        };
        st.spec.set_layout(self.nchannels, wa.bytes_per_sample.max(2));
        st.spec.big_endian = wa.big_endian;
        st.spec.header_size = None;
        st.reset_for_open();
        st.pending_meta = wa.meta;
        st.request = Request::Open;
        st.phase = StreamPhase::Startup;
        st.round_fifosize();
        st.reset_sig_cadence();
        self.shared.request_cv.notify_one();
        Ok(())
    }

    /// Begins recording; only valid after an `open`.
    pub fn start(&self) {
        let mut st = self.shared.state.lock();
        if st.phase == StreamPhase::Startup {
            st.phase = StreamPhase::Stream;
        } else {
            tracing::error!("start requested with no prior 'open'");
        }
    }

    /// Stops recording; the worker drains the FIFO, fixes up the header,
    /// and closes the file.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        st.phase = StreamPhase::Idle;
        st.request = Request::Close;
        self.shared.request_cv.notify_one();
    }

    /// Queues a metadata message. Only valid between `open` and `start`;
    /// the worker commits it ahead of the sample data.
    pub fn meta(&self, args: &[Atom]) {
        let mut st = self.shared.state.lock();
        match st.phase {
            StreamPhase::Idle => tracing::error!("meta with no prior 'open'"),
            StreamPhase::Stream => tracing::error!("meta after 'start'"),
            StreamPhase::Startup => match st.ftype {
                Some(t) if t.supports_meta() => {
                    st.pending_meta.push(args.to_vec());
                    self.shared.request_cv.notify_one();
                }
                Some(t) => {
                    tracing::error!("{} does not support writing metadata", t.name());
                }
                None => tracing::error!("meta ignored, no format handler"),
            },
        }
    }

    /// Rebinds the host block size and input sample rate.
    pub fn configure(&self, vec_size: usize, sample_rate: u32) {
        let mut st = self.shared.state.lock();
        st.vec_size = vec_size.max(1);
        st.in_samplerate = sample_rate;
        st.reset_sig_cadence();
    }

    /// Blocks until the worker has no request in flight, e.g. until a
    /// posted `stop` has fully drained the FIFO and finished the file.
    pub fn wait_idle(&self) {
        let mut st = self.shared.state.lock();
        while st.request != Request::Nothing {
            self.shared.request_cv.notify_one();
            self.shared.answer_cv.wait(&mut st);
        }
    }

    /// Frames the worker has put on disk so far.
    pub fn frames_written(&self) -> u64 {
        self.shared.state.lock().frames_written
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
            "writer state"
        );
    }

    /// The audio callback. Encodes one block of the per-channel `inputs`
    /// into the FIFO. Blocks on the worker only when the FIFO is full
    /// (sustained disk backpressure).
    ///
    /// Block sizes over [`MAX_VECSIZE`](crate::MAX_VECSIZE) must be split
    /// by the caller.
    pub fn process(&self, inputs: &[&[f32]]) {
        let vec_size = inputs.first().map_or(0, |i| i.len());
        let mut st = self.shared.state.lock();
        if st.phase != StreamPhase::Stream {
            return;
        }
        if st.vec_size != vec_size {
            st.vec_size = vec_size;
            st.reset_sig_cadence();
        }
        let wantbytes = vec_size * st.spec.bytes_per_frame;
        if wantbytes == 0 {
            return;
        }
        loop {
            let mut room = st.tail as i64 - st.head as i64;
            if room <= 0 {
                room += st.fifosize as i64;
            }
            if room as usize > wantbytes {
                break;
            }
            if st.phase != StreamPhase::Stream {
                return;
            }
            tracing::warn!(
                head = st.head,
                tail = st.tail,
                room,
                want = wantbytes,
                "waiting for disk write"
            );
            self.shared.request_cv.notify_one();
            self.shared.answer_cv.wait(&mut st);
        }
        let spec = st.spec;
        let at = st.head;
        debug_assert!(at + wantbytes <= st.fifosize);
        codec::encode_frames(&spec, inputs, &mut st.buf[at..at + wantbytes], vec_size, 0, 1.0);
        st.head = (at + wantbytes) % st.fifosize;
        st.sig_countdown = st.sig_countdown.saturating_sub(1);
        if st.sig_countdown == 0 {
            self.shared.request_cv.notify_one();
            st.sig_countdown = st.sig_period;
        }
    }
}

impl Drop for StreamWriter {
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
            tracing::error!("writer worker panicked");
        }
    }
}

/// The worker: creates files, drains the FIFO to disk, and finishes the
/// header on close or quit.
fn writer_worker(shared: &Shared, resolver: &dyn FileResolver) {
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
                let filename = st.filename.clone();
                st.request = Request::Busy;
                st.file_error = None;
                if sf.is_open() {
                    // Shouldn't happen: open() stops and waits for idle
                    // first. Finish the stray file anyway.
                    let frames_written = st.frames_written;
                    MutexGuard::unlocked(&mut st, || close_out(&filename, &mut sf, frames_written));
                    if st.request != Request::Busy {
                        continue;
                    }
                }
                sf.spec = st.spec;
                sf.ftype = st.ftype;
                sf.data = None;
                let result = MutexGuard::unlocked(&mut st, || {
                    create_soundfile(resolver, &filename, &mut sf, MAX_FRAMES)
                });
                if let Err(e) = result {
                    st.eof = true;
                    st.file_error = Some(e);
                    st.request = Request::Nothing;
                    shared.answer_cv.notify_one();
                    continue;
                }
                if st.request != Request::Busy {
                    continue;
                }
                st.spec.header_size = sf.spec.header_size;
                st.frames_written = 0;
                drain_fifo(shared, &mut st, &mut sf, &mut scratch);
            }
            Request::Close | Request::Quit => {
                let quit = st.request == Request::Quit;
                if sf.is_open() {
                    let filename = st.filename.clone();
                    let frames_written = st.frames_written;
                    MutexGuard::unlocked(&mut st, || close_out(&filename, &mut sf, frames_written));
                }
                st.request = Request::Nothing;
                shared.answer_cv.notify_one();
                if quit {
                    break;
                }
            }
        }
    }
}

/// Fixes up the header for the frames actually written, then closes.
fn close_out(filename: &str, sf: &mut SoundFile, frames_written: u64) {
    if let Err(e) = finish_write(filename, sf, MAX_FRAMES, frames_written) {
        tracing::error!(filename, error = %e, "finishing soundfile failed");
    }
    sf.close();
}

/// Writes buffered bytes out whenever a wrap window is available or at
/// least [`WRITESIZE`] bytes are pending; drains completely on close.
fn drain_fifo(
    shared: &Shared,
    st: &mut MutexGuard<'_, StreamState>,
    sf: &mut SoundFile,
    scratch: &mut [u8],
) {
    let Some(t) = sf.ftype else { return };
    let mut sample_bytes = 0u64;
    loop {
        let close_draining = st.request == Request::Close && st.head != st.tail;
        if st.request != Request::Busy && !close_draining {
            break;
        }
        if !st.pending_meta.is_empty() {
            let metas = std::mem::take(&mut st.pending_meta);
            if sample_bytes == 0 {
                MutexGuard::unlocked(st, || {
                    for m in &metas {
                        if let Err(e) = t.write_meta(sf, m) {
                            tracing::error!(error = %e, "writing metadata failed");
                        }
                    }
                });
                // metadata may have grown the header
                st.spec.header_size = sf.spec.header_size;
                continue;
            }
            tracing::error!("metadata after sample data ignored");
        }
        let fifosize = st.fifosize;
        let bpf = st.spec.bytes_per_frame.max(1);
        let can_write =
            st.head < st.tail || st.head - st.tail >= WRITESIZE || close_draining;
        if !can_write {
            shared.answer_cv.notify_one();
            shared.request_cv.wait(st);
            continue;
        }
        let window = (if st.head < st.tail { fifosize } else { st.head }) - st.tail;
        let writebytes = window.min(READSIZE) / bpf * bpf; // whole frames only
        if writebytes == 0 {
            shared.answer_cv.notify_one();
            shared.request_cv.wait(st);
            continue;
        }
        let tail = st.tail;
        scratch[..writebytes].copy_from_slice(&st.buf[tail..tail + writebytes]);
        let result = MutexGuard::unlocked(st, || t.write_samples(sf, &scratch[..writebytes]));
        match result {
            Ok(n) if n == writebytes => {
                st.tail = (tail + writebytes) % fifosize;
                sample_bytes += writebytes as u64;
                st.frames_written = sample_bytes / bpf as u64;
            }
            Ok(_) => {
                st.file_error = Some(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "short write",
                )));
                break;
            }
            Err(e) => {
                st.file_error = Some(e.into());
                break;
            }
        }
        if st.request != Request::Busy && st.request != Request::Close {
            break;
        }
        shared.answer_cv.notify_one();
    }
}
