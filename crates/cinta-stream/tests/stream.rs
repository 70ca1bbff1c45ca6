//! End-to-end tests for the realtime reader and writer, driving the audio
//! callbacks directly from the test thread.

use std::fs::File;
use std::sync::Arc;

use cinta_core::{
    Atom, BaseDir, SoundFile, codec, create_soundfile, finish_write, open_soundfile, registry,
};
use cinta_stream::{OpenRequest, StreamReader, StreamWriter};
use tempfile::TempDir;

const BLOCK: usize = 128;

fn atoms(spec: &[&str]) -> Vec<Atom> {
    spec.iter()
        .map(|s| match s.parse::<f32>() {
            Ok(f) => Atom::Float(f),
            Err(_) => Atom::Symbol((*s).to_string()),
        })
        .collect()
}

/// Writes a mono file through cinta-core for the reader tests.
fn make_file(
    dir: &TempDir,
    name: &str,
    type_name: &str,
    width: usize,
    big: bool,
    rate: u32,
    samples: &[f32],
) {
    let resolver = BaseDir::new(dir.path());
    let mut sf = SoundFile::new();
    sf.ftype = Some(registry().by_name(type_name).unwrap());
    sf.spec.set_layout(1, width);
    sf.spec.samplerate = rate;
    sf.spec.big_endian = big;
    create_soundfile(&resolver, name, &mut sf, samples.len() as u64).unwrap();
    let mut buf = vec![0u8; samples.len() * width];
    codec::encode_frames(&sf.spec, &[samples], &mut buf, samples.len(), 0, 1.0);
    sf.ftype.unwrap().write_samples(&mut sf, &buf).unwrap();
    sf.close();
}

/// Reads a whole file back through cinta-core for the writer tests.
fn read_file(dir: &TempDir, name: &str) -> (cinta_core::SoundSpec, Vec<f32>) {
    let mut sf = SoundFile::new();
    let path = dir.path().join(name);
    open_soundfile(File::open(&path).unwrap(), &mut sf, 0).unwrap();
    let frames = sf.spec.frames_in_file() as usize;
    let mut buf = vec![0u8; frames * sf.spec.bytes_per_frame];
    let t = sf.ftype.unwrap();
    let mut got = 0;
    while got < buf.len() {
        let n = t.read_samples(&mut sf, &mut buf[got..]).unwrap();
        assert_ne!(n, 0, "file ended before its byte budget");
        got += n;
    }
    let mut out = vec![0.0f32; frames];
    let spec = sf.spec;
    codec::decode_frames(&spec, &mut [&mut out], 0, &buf, frames);
    (spec, out)
}

/// Drives the reader until its completion flag fires, returning everything
/// it produced (including the zero fill of the final block).
fn drain_reader(reader: &StreamReader, max_blocks: usize) -> Vec<f32> {
    let mut collected = Vec::new();
    let mut block = vec![0.0f32; BLOCK];
    for _ in 0..max_blocks {
        reader.process(&mut [&mut block]);
        collected.extend_from_slice(&block);
        if reader.take_done() {
            return collected;
        }
    }
    panic!("reader never signaled completion");
}

#[test]
fn reader_streams_a_whole_file_in_order() {
    // Larger than the FIFO, so the ring wraps many times; any dropped or
    // duplicated bytes would break the exact ramp.
    let dir = TempDir::new().unwrap();
    let frames = 300_000usize;
    let samples: Vec<f32> = (0..frames).map(|i| ((i % 30000) as f32) / 32768.0).collect();
    make_file(&dir, "long.wav", "wave", 2, false, 44100, &samples);

    let reader =
        StreamReader::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    reader.open(OpenRequest::new("long.wav"));
    reader.start();
    let collected = drain_reader(&reader, frames / BLOCK + 2);

    assert!(collected.len() >= frames);
    for (i, (a, b)) in samples.iter().zip(&collected).enumerate() {
        assert_eq!(a, b, "frame {i}");
    }
    for v in &collected[frames..] {
        assert_eq!(*v, 0.0);
    }
}

#[test]
fn reader_skips_onset_frames() {
    // 96 kHz float CAF, skip 100: the 101st frame comes out first.
    let dir = TempDir::new().unwrap();
    let samples: Vec<f32> = (0..300).map(|i| i as f32).collect();
    make_file(&dir, "skip.caf", "caf", 4, true, 96000, &samples);

    let reader =
        StreamReader::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    let mut req = OpenRequest::new("skip.caf");
    req.onset_frames = 100;
    reader.open(req);
    reader.start();
    let collected = drain_reader(&reader, 16);

    assert_eq!(collected[0], 100.0);
    for (i, v) in collected.iter().take(200).enumerate() {
        assert_eq!(*v, (100 + i) as f32);
    }
    assert_eq!(collected[200], 0.0);
}

#[test]
fn reader_open_args_force_raw_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("r.bin");
    let mut bytes = vec![0x77u8; 7]; // junk header
    for i in 0..10i16 {
        bytes.extend_from_slice(&(i * 1000).to_be_bytes()); // left
        bytes.extend_from_slice(&(-i * 1000).to_be_bytes()); // right
    }
    std::fs::write(&path, &bytes).unwrap();

    let reader =
        StreamReader::new(2, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    let req = OpenRequest::parse(&atoms(&["r.bin", "0", "7", "2", "2", "b"])).unwrap();
    assert_eq!(req.header_size, Some(7));
    assert_eq!(req.channels, 2);
    reader.open(req);
    reader.start();

    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    reader.process(&mut [&mut left, &mut right]);
    assert!(reader.take_done(), "10 frames fit in one block");
    for i in 0..10 {
        assert_eq!(left[i], (i as f32) * 1000.0 / 32768.0);
        assert_eq!(right[i], -(i as f32) * 1000.0 / 32768.0);
    }
    assert_eq!(left[10], 0.0);
}

#[test]
fn reader_zero_fills_extra_outputs_and_idles_before_start() {
    let dir = TempDir::new().unwrap();
    let samples = vec![0.5f32; 256];
    make_file(&dir, "mono.wav", "wave", 2, false, 44100, &samples);

    let reader =
        StreamReader::new(2, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    let mut left = vec![9.0f32; BLOCK];
    let mut right = vec![9.0f32; BLOCK];

    // before any open: silence
    reader.process(&mut [&mut left, &mut right]);
    assert!(left.iter().all(|v| *v == 0.0));

    reader.open(OpenRequest::new("mono.wav"));
    // opened but not started: still silence
    reader.process(&mut [&mut left, &mut right]);
    assert!(left.iter().all(|v| *v == 0.0));

    reader.start();
    reader.process(&mut [&mut left, &mut right]);
    assert!(left.iter().all(|v| *v == 0.5));
    // second output has no file channel behind it
    assert!(right.iter().all(|v| *v == 0.0));
}

#[test]
fn reader_reports_missing_file_as_silent_completion() {
    let dir = TempDir::new().unwrap();
    let reader =
        StreamReader::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    reader.open(OpenRequest::new("no-such-file.wav"));
    reader.start();
    let mut block = vec![9.0f32; BLOCK];
    reader.process(&mut [&mut block]);
    assert!(block.iter().all(|v| *v == 0.0));
    assert!(reader.take_done());
}

#[test]
fn reader_reopen_while_streaming_switches_files() {
    let dir = TempDir::new().unwrap();
    make_file(&dir, "a.wav", "wave", 2, false, 44100, &vec![0.25f32; 500_000]);
    make_file(&dir, "b.wav", "wave", 2, false, 44100, &vec![0.75f32; 256]);

    let reader =
        StreamReader::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    reader.open(OpenRequest::new("a.wav"));
    reader.start();
    let mut block = vec![0.0f32; BLOCK];
    for _ in 0..8 {
        reader.process(&mut [&mut block]);
        assert!(block.iter().all(|v| *v == 0.25));
    }

    // reopen mid-stream: the worker abandons the first file cleanly
    reader.open(OpenRequest::new("b.wav"));
    reader.process(&mut [&mut block]);
    assert!(block.iter().all(|v| *v == 0.0), "startup state is silent");
    reader.start();
    let collected = drain_reader(&reader, 8);
    assert!(collected[..256].iter().all(|v| *v == 0.75));
}

#[test]
fn reader_create_destroy_does_not_leak() {
    let dir = TempDir::new().unwrap();
    make_file(&dir, "tiny.wav", "wave", 2, false, 44100, &vec![0.1f32; 64]);
    let resolver: Arc<dyn cinta_core::FileResolver> =
        Arc::new(BaseDir::new(dir.path().to_path_buf()));

    #[cfg(target_os = "linux")]
    let fds_before = std::fs::read_dir("/proc/self/fd").unwrap().count();

    for i in 0..100 {
        let reader = StreamReader::new(1, 0, Arc::clone(&resolver)).unwrap();
        reader.open(OpenRequest::new("tiny.wav"));
        if i % 2 == 0 {
            reader.start();
            let mut block = vec![0.0f32; BLOCK];
            reader.process(&mut [&mut block]);
        }
        drop(reader); // must return in bounded time, joining the worker
    }

    #[cfg(target_os = "linux")]
    {
        let fds_after = std::fs::read_dir("/proc/self/fd").unwrap().count();
        assert!(
            fds_after <= fds_before + 2,
            "fd leak: {fds_before} -> {fds_after}"
        );
    }
}

#[test]
fn writer_records_a_fixed_up_aiff() {
    // Full-scale ramp into a 24-bit AIFF; after stop the header carries the
    // real frame count and the endpoints show the asymmetric clip.
    let dir = TempDir::new().unwrap();
    let frames = 1024usize;
    let ramp: Vec<f32> = (0..frames).map(|i| i as f32 / (frames - 1) as f32 * 2.0 - 1.0).collect();

    let writer =
        StreamWriter::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    writer
        .open(&atoms(&["-bytes", "3", "-rate", "48000", "rec.aiff"]))
        .unwrap();
    writer.start();
    for chunk in ramp.chunks(BLOCK) {
        writer.process(&[chunk]);
    }
    writer.stop();
    writer.wait_idle();
    assert_eq!(writer.frames_written(), frames as u64);
    drop(writer);

    let (spec, out) = read_file(&dir, "rec.aiff");
    assert_eq!(spec.samplerate, 48000);
    assert_eq!(spec.bytes_per_sample, 3);
    assert!(spec.big_endian);
    assert_eq!(out.len(), frames);
    for (a, b) in ramp.iter().zip(&out) {
        assert!((a - b).abs() <= 1.0 / 8388607.0, "{a} vs {b}");
    }
    assert_eq!(out[0], -8388607.0 / 8388608.0);
    assert_eq!(out[frames - 1], 8388607.0 / 8388608.0);
}

#[test]
fn writer_drains_more_than_one_fifo_of_data() {
    let dir = TempDir::new().unwrap();
    let frames = 400_000usize; // 800 KB of 16-bit mono, several FIFO laps
    let samples: Vec<f32> = (0..frames).map(|i| ((i % 20000) as f32) / 32768.0).collect();

    let writer =
        StreamWriter::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    writer.open(&atoms(&["lap.wav"])).unwrap();
    writer.start();
    for chunk in samples.chunks(BLOCK) {
        writer.process(&[chunk]);
    }
    writer.stop();
    writer.wait_idle();
    drop(writer);

    let (spec, out) = read_file(&dir, "lap.wav");
    assert_eq!(spec.channels, 1);
    assert_eq!(out.len(), frames);
    for (i, (a, b)) in samples.iter().zip(&out).enumerate() {
        assert_eq!(a, b, "frame {i}");
    }
}

#[test]
fn writer_meta_lands_ahead_of_the_samples() {
    let dir = TempDir::new().unwrap();
    let writer =
        StreamWriter::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    writer
        .open(&atoms(&["-meta", "artist", "someone", "m.caf"]))
        .unwrap();
    writer.meta(&atoms(&["title", "late", "addition"]));
    writer.start();
    let block = vec![0.25f32; BLOCK];
    writer.process(&[&block]);
    writer.stop();
    writer.wait_idle();
    drop(writer);

    let mut sf = SoundFile::new();
    let path = dir.path().join("m.caf");
    open_soundfile(File::open(&path).unwrap(), &mut sf, 0).unwrap();
    assert_eq!(sf.spec.frames_in_file(), BLOCK as u64);
    let meta = sf.ftype.unwrap().read_meta(&mut sf).unwrap();
    assert_eq!(
        meta,
        vec![
            ("artist".to_string(), "someone".to_string()),
            ("title".to_string(), "late addition".to_string()),
        ]
    );
}

#[test]
fn writer_ignores_bulk_only_flags() {
    let dir = TempDir::new().unwrap();
    let writer =
        StreamWriter::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    // -normalize/-skip/-nframes are warned about and ignored, not errors
    writer
        .open(&atoms(&["-normalize", "-skip", "5", "-nframes", "9", "w.wav"]))
        .unwrap();
    writer.start();
    let block = vec![0.5f32; BLOCK];
    writer.process(&[&block]);
    writer.stop();
    writer.wait_idle();
    drop(writer);

    let (_, out) = read_file(&dir, "w.wav");
    assert_eq!(out.len(), BLOCK);
}

#[test]
fn writer_reopen_finishes_the_first_file() {
    let dir = TempDir::new().unwrap();
    let writer =
        StreamWriter::new(1, 0, Arc::new(BaseDir::new(dir.path().to_path_buf()))).unwrap();
    writer.open(&atoms(&["one.wav"])).unwrap();
    writer.start();
    let block = vec![0.5f32; BLOCK];
    for _ in 0..4 {
        writer.process(&[&block]);
    }
    // implicit stop + drain of one.wav
    writer.open(&atoms(&["two.wav"])).unwrap();
    writer.start();
    writer.process(&[&block]);
    writer.stop();
    writer.wait_idle();
    drop(writer);

    let (_, one) = read_file(&dir, "one.wav");
    let (_, two) = read_file(&dir, "two.wav");
    assert_eq!(one.len(), 4 * BLOCK);
    assert_eq!(two.len(), BLOCK);
}

#[test]
fn finish_write_is_a_noop_when_counts_match() {
    // Writing through cinta-core directly with a known frame count must
    // leave the header untouched by finish_write.
    let dir = TempDir::new().unwrap();
    let resolver = BaseDir::new(dir.path());
    let mut sf = SoundFile::new();
    sf.ftype = Some(registry().by_name("wave").unwrap());
    sf.spec.set_layout(1, 2);
    sf.spec.samplerate = 44100;
    create_soundfile(&resolver, "exact.wav", &mut sf, 8).unwrap();
    let samples = [0.1f32; 8];
    let mut buf = [0u8; 16];
    codec::encode_frames(&sf.spec, &[&samples], &mut buf, 8, 0, 1.0);
    sf.ftype.unwrap().write_samples(&mut sf, &buf).unwrap();
    finish_write("exact.wav", &mut sf, 8, 8).unwrap();
    sf.close();

    let (spec, out) = read_file(&dir, "exact.wav");
    assert_eq!(spec.frames_in_file(), 8);
    assert_eq!(out.len(), 8);
}
