//! NeXT / Sun AU. `.snd` magic is big-endian, the reversed `dns.` variant
//! is little-endian with a little-endian header to match.

use std::io::{Seek, SeekFrom, Write};

use super::{file_len, header_err, push_u32, read_4cc, read_u32, write_u32_at};
use crate::handler::SoundFileType;
use crate::soundfile::SoundFile;
use crate::{Error, MAX_CHANNELS, MAX_FRAMES, Result};

const ENCODING_LINEAR_16: u32 = 3;
const ENCODING_LINEAR_24: u32 = 4;
const ENCODING_FLOAT: u32 = 6;

/// Emitted header: the 24 fixed bytes plus a 4-byte empty info field.
const HEADER_SIZE: u64 = 28;

/// NeXT/Sun AU handler.
pub struct NextType;

impl SoundFileType for NextType {
    fn name(&self) -> &'static str {
        "next"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["snd", "au"]
    }

    fn min_header_size(&self) -> usize {
        24
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 4 && (&bytes[..4] == b".snd" || &bytes[..4] == b"dns.")
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let bad = || Error::BadHeaderAs("next");
        let total = file_len(sf.file_mut()?)?;
        let f = sf.file_mut()?;

        let magic = read_4cc(f).map_err(|e| header_err("next", e))?;
        let big = match &magic {
            b".snd" => true,
            b"dns." => false,
            _ => return Err(bad()),
        };
        let onset = u64::from(read_u32(f, big).map_err(|e| header_err("next", e))?);
        let data_size = read_u32(f, big).map_err(|e| header_err("next", e))?;
        let encoding = read_u32(f, big).map_err(|e| header_err("next", e))?;
        let rate = read_u32(f, big).map_err(|e| header_err("next", e))?;
        let channels = read_u32(f, big).map_err(|e| header_err("next", e))?;

        if onset < 24 {
            return Err(bad());
        }
        let width = match encoding {
            ENCODING_LINEAR_16 => 2,
            ENCODING_LINEAR_24 => 3,
            ENCODING_FLOAT => 4,
            _ => return Err(Error::SampleFormat),
        };
        if channels == 0 || channels as usize > MAX_CHANNELS || rate == 0 {
            return Err(bad());
        }

        f.seek(SeekFrom::Start(onset))?;
        let rest = total.saturating_sub(onset);
        sf.spec.set_layout(channels as usize, width);
        sf.spec.samplerate = rate;
        sf.spec.big_endian = big;
        sf.spec.header_size = Some(onset);
        sf.spec.byte_limit = if data_size == u32::MAX {
            rest
        } else {
            u64::from(data_size).min(rest)
        };
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<u64> {
        let spec = sf.spec;
        let big = spec.big_endian;
        let data_size: u32 = if nframes == MAX_FRAMES {
            u32::MAX // unknown length convention
        } else {
            (nframes * spec.bytes_per_frame as u64) as u32
        };
        let encoding = match spec.bytes_per_sample {
            2 => ENCODING_LINEAR_16,
            3 => ENCODING_LINEAR_24,
            4 => ENCODING_FLOAT,
            _ => return Err(Error::SampleFormat),
        };

        let mut h = Vec::with_capacity(HEADER_SIZE as usize);
        h.extend_from_slice(if big { b".snd" } else { b"dns." });
        push_u32(&mut h, HEADER_SIZE as u32, big);
        push_u32(&mut h, data_size, big);
        push_u32(&mut h, encoding, big);
        push_u32(&mut h, spec.samplerate, big);
        push_u32(&mut h, spec.channels as u32, big);
        push_u32(&mut h, 0, big); // empty info field

        sf.file_mut()?.write_all(&h)?;
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let big = sf.spec.big_endian;
        let data_size = (frames_written * sf.spec.bytes_per_frame as u64) as u32;
        write_u32_at(sf.file_mut()?, 8, data_size, big)?;
        Ok(())
    }

    fn endianness(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(true)
    }
}
