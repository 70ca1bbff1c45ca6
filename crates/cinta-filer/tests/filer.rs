//! Integration tests for the bulk reader/writer.

use cinta_core::{Atom, BaseDir};
use cinta_filer::{Filer, MemoryTables, TableStore};
use tempfile::TempDir;

fn atoms(spec: &[&str]) -> Vec<Atom> {
    spec.iter()
        .map(|s| match s.parse::<f32>() {
            Ok(f) => Atom::Float(f),
            Err(_) => Atom::Symbol((*s).to_string()),
        })
        .collect()
}

fn filer(dir: &TempDir) -> Filer {
    Filer::new(Box::new(BaseDir::new(dir.path().to_path_buf())))
}

#[test]
fn write_then_read_wave_round_trip() {
    // The canonical scenario: 1 channel, 16-bit little-endian wave, 4
    // frames at 44100 Hz, description [44100, 44, 1, 2, l].
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 4);
    src.borrow_mut().samples.copy_from_slice(&[0.0, 0.5, -0.5, 1.0]);
    store.insert("dst", 4);

    let wrote = filer
        .write(&atoms(&["-rate", "44100", "out.wav", "src"]), &store)
        .unwrap();
    assert_eq!(wrote.frames, 4);

    let read = filer.read(&atoms(&["out.wav", "dst"]), &store).unwrap();
    assert_eq!(read.frames, 4);
    assert_eq!(
        read.description,
        vec![
            Atom::Float(44100.0),
            Atom::Float(44.0),
            Atom::Float(1.0),
            Atom::Float(2.0),
            Atom::Symbol("l".into()),
        ]
    );

    let dst = store.table("dst").unwrap();
    let got = dst.borrow().samples.clone();
    for (a, b) in [0.0f32, 0.5, -0.5, 1.0].iter().zip(&got) {
        assert!((a - b).abs() <= 1.0 / 32767.0, "{a} vs {b}");
    }
    // +1.0 clips one unit inside full scale
    assert_eq!(got[3], 32767.0 / 32768.0);
}

#[test]
fn read_resizes_and_truncates_to_maxsize() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 1000);
    for (i, v) in src.borrow_mut().samples.iter_mut().enumerate() {
        *v = i as f32 / 32768.0;
    }
    store.insert("dst", 10);

    filer.write(&atoms(&["big.wav", "src"]), &store).unwrap();

    let read = filer
        .read(&atoms(&["-resize", "big.wav", "dst"]), &store)
        .unwrap();
    assert_eq!(read.frames, 1000);
    assert_eq!(store.table("dst").unwrap().borrow().len(), 1000);

    let read = filer
        .read(&atoms(&["-maxsize", "100", "big.wav", "dst"]), &store)
        .unwrap();
    assert_eq!(read.frames, 100);
    assert_eq!(store.table("dst").unwrap().borrow().len(), 100);
}

#[test]
fn read_zero_fills_table_tail_and_extra_tables() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 8);
    src.borrow_mut().samples.fill(0.25);
    let a = store.insert("a", 32);
    let b = store.insert("b", 32);
    a.borrow_mut().samples.fill(9.0);
    b.borrow_mut().samples.fill(9.0);

    filer.write(&atoms(&["mono.wav", "src"]), &store).unwrap();
    // two tables against a mono file: the second is zeroed entirely
    let read = filer.read(&atoms(&["mono.wav", "a", "b"]), &store).unwrap();
    assert_eq!(read.frames, 8);
    let a = a.borrow();
    assert!(a.samples[..8].iter().all(|v| *v == 0.25));
    assert!(a.samples[8..].iter().all(|v| *v == 0.0));
    assert!(b.borrow().samples.iter().all(|v| *v == 0.0));
}

#[test]
fn read_skip_starts_later_in_the_file() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 100);
    for (i, v) in src.borrow_mut().samples.iter_mut().enumerate() {
        *v = i as f32 / 32768.0;
    }
    store.insert("dst", 100);

    filer.write(&atoms(&["ramp.wav", "src"]), &store).unwrap();
    let read = filer
        .read(&atoms(&["-skip", "40", "ramp.wav", "dst"]), &store)
        .unwrap();
    assert_eq!(read.frames, 60);
    let dst = store.table("dst").unwrap();
    assert_eq!(dst.borrow().samples[0], 40.0 / 32768.0);
}

#[test]
fn write_normalize_scales_the_peak() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 4);
    src.borrow_mut().samples.copy_from_slice(&[0.5, -2.0, 1.0, 0.0]);
    store.insert("dst", 4);

    filer
        .write(&atoms(&["-normalize", "norm.wav", "src"]), &store)
        .unwrap();
    filer.read(&atoms(&["norm.wav", "dst"]), &store).unwrap();
    let got = store.table("dst").unwrap().borrow().samples.clone();
    // peak of 2.0 maps to 32767/32768
    assert!((got[1] + 32767.0 / 32768.0).abs() < 1e-6);
    assert!((got[0] - 0.25 * (32767.0 / 32768.0) / 1.0).abs() < 1e-3);
}

#[test]
fn write_clipping_input_auto_normalizes() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 2);
    src.borrow_mut().samples.copy_from_slice(&[4.0, -4.0]);
    store.insert("dst", 2);

    filer.write(&atoms(&["hot.wav", "src"]), &store).unwrap();
    filer.read(&atoms(&["hot.wav", "dst"]), &store).unwrap();
    let got = store.table("dst").unwrap().borrow().samples.clone();
    assert!((got[0] - 32767.0 / 32768.0).abs() < 1e-6);
    assert!((got[1] + 32767.0 / 32768.0).abs() < 1e-6);
}

#[test]
fn write_nframes_and_skip_select_a_range() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 100);
    for (i, v) in src.borrow_mut().samples.iter_mut().enumerate() {
        *v = i as f32 / 32768.0;
    }
    store.insert("dst", 100);

    let wrote = filer
        .write(&atoms(&["-skip", "10", "-nframes", "20", "part.wav", "src"]), &store)
        .unwrap();
    assert_eq!(wrote.frames, 20);
    let read = filer.read(&atoms(&["part.wav", "dst"]), &store).unwrap();
    assert_eq!(read.frames, 20);
    assert_eq!(store.table("dst").unwrap().borrow().samples[0], 10.0 / 32768.0);
}

#[test]
fn raw_flag_reads_headerless_data() {
    let dir = TempDir::new().unwrap();
    // 4 junk bytes, then 3 big-endian 16-bit frames
    let mut bytes = vec![1u8, 2, 3, 4];
    for v in [1000i16, 2000, 3000] {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    std::fs::write(dir.path().join("d.raw"), &bytes).unwrap();

    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    store.insert("dst", 8);
    let read = filer
        .read(&atoms(&["-raw", "4", "1", "2", "b", "d.raw", "dst"]), &store)
        .unwrap();
    assert_eq!(read.frames, 3);
    let got = store.table("dst").unwrap().borrow().samples.clone();
    assert_eq!(&got[..3], &[1000.0 / 32768.0, 2000.0 / 32768.0, 3000.0 / 32768.0]);
}

#[test]
fn ascii_read_parses_rows_of_channels() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("t.txt"), "0.1 0.2\n0.3 0.4\n0.5 0.6\n").unwrap();

    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    store.insert("l", 4);
    store.insert("r", 4);
    let read = filer
        .read(&atoms(&["-ascii", "t.txt", "l", "r"]), &store)
        .unwrap();
    assert_eq!(read.frames, 3);
    assert!(read.description.is_empty());
    let l = store.table("l").unwrap();
    let r = store.table("r").unwrap();
    assert_eq!(&l.borrow().samples[..3], &[0.1, 0.3, 0.5]);
    assert_eq!(&r.borrow().samples[..3], &[0.2, 0.4, 0.6]);
    assert_eq!(l.borrow().samples[3], 0.0);
}

#[test]
fn read_without_tables_reports_header_frames() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 250);
    src.borrow_mut().samples.fill(0.1);

    filer.write(&atoms(&["info.wav", "src"]), &store).unwrap();
    let read = filer.read(&atoms(&["info.wav"]), &store).unwrap();
    assert_eq!(read.frames, 250);
    assert_eq!(read.description[2], Atom::Float(1.0));
}

#[test]
fn multichannel_aiff_round_trip() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let l = store.insert("l", 64);
    let r = store.insert("r", 64);
    for i in 0..64 {
        l.borrow_mut().samples[i] = i as f32 / 128.0;
        r.borrow_mut().samples[i] = -(i as f32) / 128.0;
    }
    store.insert("ol", 64);
    store.insert("or", 64);

    let wrote = filer
        .write(&atoms(&["-bytes", "3", "st.aiff", "l", "r"]), &store)
        .unwrap();
    assert_eq!(wrote.frames, 64);
    assert_eq!(wrote.description[4], Atom::Symbol("b".into()));

    let read = filer.read(&atoms(&["st.aiff", "ol", "or"]), &store).unwrap();
    assert_eq!(read.frames, 64);
    for i in 0..64 {
        let ol = store.table("ol").unwrap().borrow().samples[i];
        let or = store.table("or").unwrap().borrow().samples[i];
        assert!((ol - i as f32 / 128.0).abs() <= 1.0 / 8388607.0);
        assert!((or + i as f32 / 128.0).abs() <= 1.0 / 8388607.0);
    }
}

#[test]
fn caf_meta_flows_through_write_and_read() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    let src = store.insert("src", 16);
    src.borrow_mut().samples.fill(0.3);
    store.insert("dst", 16);

    filer
        .write(
            &atoms(&["-meta", "artist", "someone", "tagged.caf", "src"]),
            &store,
        )
        .unwrap();
    let read = filer
        .read(&atoms(&["-meta", "tagged.caf", "dst"]), &store)
        .unwrap();
    assert_eq!(read.frames, 16);
    assert_eq!(read.meta, vec![("artist".to_string(), "someone".to_string())]);
}

#[test]
fn missing_table_is_an_error() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let store = MemoryTables::new();
    let err = filer.read(&atoms(&["x.wav", "nope"]), &store).unwrap_err();
    assert_eq!(err.to_string(), "no such table: nope");
}

#[test]
fn usage_errors_change_nothing() {
    let dir = TempDir::new().unwrap();
    let filer = filer(&dir);
    let mut store = MemoryTables::new();
    store.insert("t", 4);
    assert!(filer.read(&atoms(&["-skip"]), &store).is_err());
    assert!(filer.read(&atoms(&["-bogusflag", "f.wav", "t"]), &store).is_err());
    assert!(filer.write(&atoms(&["only-a-filename.wav"]), &store).is_err());
    assert!(dir.path().read_dir().unwrap().next().is_none(), "no file created");
}
