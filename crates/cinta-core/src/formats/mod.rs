//! Built-in container format handlers.

pub mod aiff;
pub mod caf;
pub mod next;
pub mod raw;
pub mod wave;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::Error;

/// Maps an I/O error hit while parsing a header: running off the end of the
/// file means the header is bad, anything else is a real I/O failure.
pub(crate) fn header_err(format: &'static str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::BadHeaderAs(format)
    } else {
        Error::Io(e)
    }
}

pub(crate) fn read_4cc(f: &mut File) -> io::Result<[u8; 4]> {
    let mut b = [0u8; 4];
    f.read_exact(&mut b)?;
    Ok(b)
}

pub(crate) fn read_u16(f: &mut File, big: bool) -> io::Result<u16> {
    let mut b = [0u8; 2];
    f.read_exact(&mut b)?;
    Ok(if big { u16::from_be_bytes(b) } else { u16::from_le_bytes(b) })
}

pub(crate) fn read_u32(f: &mut File, big: bool) -> io::Result<u32> {
    let mut b = [0u8; 4];
    f.read_exact(&mut b)?;
    Ok(if big { u32::from_be_bytes(b) } else { u32::from_le_bytes(b) })
}

pub(crate) fn read_u64(f: &mut File, big: bool) -> io::Result<u64> {
    let mut b = [0u8; 8];
    f.read_exact(&mut b)?;
    Ok(if big { u64::from_be_bytes(b) } else { u64::from_le_bytes(b) })
}

pub(crate) fn skip(f: &mut File, n: u64) -> io::Result<()> {
    f.seek(SeekFrom::Current(n as i64))?;
    Ok(())
}

pub(crate) fn push_u16(out: &mut Vec<u8>, v: u16, big: bool) {
    out.extend_from_slice(&if big { v.to_be_bytes() } else { v.to_le_bytes() });
}

pub(crate) fn push_u32(out: &mut Vec<u8>, v: u32, big: bool) {
    out.extend_from_slice(&if big { v.to_be_bytes() } else { v.to_le_bytes() });
}

pub(crate) fn push_u64(out: &mut Vec<u8>, v: u64, big: bool) {
    out.extend_from_slice(&if big { v.to_be_bytes() } else { v.to_le_bytes() });
}

pub(crate) fn patch_u32(out: &mut [u8], off: usize, v: u32, big: bool) {
    out[off..off + 4].copy_from_slice(&if big { v.to_be_bytes() } else { v.to_le_bytes() });
}

pub(crate) fn write_u32_at(f: &mut File, off: u64, v: u32, big: bool) -> io::Result<()> {
    f.seek(SeekFrom::Start(off))?;
    f.write_all(&if big { v.to_be_bytes() } else { v.to_le_bytes() })
}

pub(crate) fn write_u64_at(f: &mut File, off: u64, v: u64, big: bool) -> io::Result<()> {
    f.seek(SeekFrom::Start(off))?;
    f.write_all(&if big { v.to_be_bytes() } else { v.to_le_bytes() })
}

/// Total on-disk length of the attached file.
pub(crate) fn file_len(f: &mut File) -> io::Result<u64> {
    Ok(f.metadata()?.len())
}

/// Bytes-per-sample for a bit depth, or the unsupported-format error.
pub(crate) fn width_from_bits(bits: u16) -> Result<usize, Error> {
    match bits {
        16 => Ok(2),
        24 => Ok(3),
        32 => Ok(4),
        _ => Err(Error::SampleFormat),
    }
}
