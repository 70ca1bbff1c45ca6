//! Microsoft RIFF/WAVE. Always little-endian on the wire.

use std::io::{Read, Seek, Write};

use super::{
    file_len, header_err, push_u16, push_u32, read_4cc, read_u16, read_u32, skip,
    width_from_bits, write_u32_at,
};
use crate::handler::SoundFileType;
use crate::soundfile::SoundFile;
use crate::{Error, MAX_CHANNELS, MAX_FRAMES, Result};

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// Canonical header emitted by [`write_header`](SoundFileType::write_header):
/// RIFF + fmt (16 bytes) + data.
const HEADER_SIZE: u64 = 44;

/// RIFF/WAVE handler.
pub struct WaveType;

impl SoundFileType for WaveType {
    fn name(&self) -> &'static str {
        "wave"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav", "wave"]
    }

    fn min_header_size(&self) -> usize {
        12
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let bad = || Error::BadHeaderAs("wave");
        let total = file_len(sf.file_mut()?)?;
        let f = sf.file_mut()?;

        let riff = read_4cc(f).map_err(|e| header_err("wave", e))?;
        let _riff_size = read_u32(f, false).map_err(|e| header_err("wave", e))?;
        let wave = read_4cc(f).map_err(|e| header_err("wave", e))?;
        if &riff != b"RIFF" || &wave != b"WAVE" {
            return Err(bad());
        }

        let mut fmt: Option<(u16, u16, u32, u16)> = None;
        loop {
            let id = read_4cc(f).map_err(|e| header_err("wave", e))?;
            let size = u64::from(read_u32(f, false).map_err(|e| header_err("wave", e))?);
            match &id {
                b"fmt " => {
                    if size < 16 {
                        return Err(bad());
                    }
                    let mut code = read_u16(f, false)?;
                    let channels = read_u16(f, false)?;
                    let rate = read_u32(f, false)?;
                    let _byte_rate = read_u32(f, false)?;
                    let _align = read_u16(f, false)?;
                    let bits = read_u16(f, false)?;
                    let mut consumed = 16;
                    if code == FORMAT_EXTENSIBLE && size >= 40 {
                        // cbSize, valid bits, channel mask, then the
                        // 16-byte subformat GUID whose first word is the
                        // real format code.
                        skip(f, 8)?;
                        let mut guid = [0u8; 16];
                        f.read_exact(&mut guid).map_err(|e| header_err("wave", e))?;
                        code = u16::from_le_bytes([guid[0], guid[1]]);
                        consumed = 40;
                    }
                    skip(f, size - consumed + (size & 1))?;
                    fmt = Some((code, channels, rate, bits));
                }
                b"data" => {
                    let (code, channels, rate, bits) = fmt.ok_or_else(bad)?;
                    let width = width_from_bits(bits)?;
                    match code {
                        FORMAT_PCM if width < 4 => {}
                        FORMAT_IEEE_FLOAT if width == 4 => {}
                        FORMAT_PCM | FORMAT_IEEE_FLOAT => return Err(Error::SampleFormat),
                        _ => return Err(bad()),
                    }
                    if channels == 0 || channels as usize > MAX_CHANNELS || rate == 0 {
                        return Err(bad());
                    }
                    let header = f.stream_position()?;
                    let rest = total.saturating_sub(header);
                    sf.spec.set_layout(channels as usize, width);
                    sf.spec.samplerate = rate;
                    sf.spec.big_endian = false;
                    sf.spec.header_size = Some(header);
                    sf.spec.byte_limit = if size == 0 || size == u64::from(u32::MAX) {
                        rest
                    } else {
                        size.min(rest)
                    };
                    return Ok(());
                }
                _ => skip(f, size + (size & 1))?,
            }
        }
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<u64> {
        let spec = sf.spec;
        let data_size: u32 = if nframes == MAX_FRAMES {
            0
        } else {
            (nframes * spec.bytes_per_frame as u64) as u32
        };
        let code = if spec.bytes_per_sample == 4 { FORMAT_IEEE_FLOAT } else { FORMAT_PCM };

        let mut h = Vec::with_capacity(HEADER_SIZE as usize);
        h.extend_from_slice(b"RIFF");
        push_u32(&mut h, 36 + data_size, false);
        h.extend_from_slice(b"WAVE");
        h.extend_from_slice(b"fmt ");
        push_u32(&mut h, 16, false);
        push_u16(&mut h, code, false);
        push_u16(&mut h, spec.channels as u16, false);
        push_u32(&mut h, spec.samplerate, false);
        push_u32(&mut h, spec.samplerate * spec.bytes_per_frame as u32, false);
        push_u16(&mut h, spec.bytes_per_frame as u16, false);
        push_u16(&mut h, (spec.bytes_per_sample * 8) as u16, false);
        h.extend_from_slice(b"data");
        push_u32(&mut h, data_size, false);

        sf.file_mut()?.write_all(&h)?;
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let header = sf.spec.header_size.ok_or(Error::BadHeaderAs("wave"))?;
        let data_size = (frames_written * sf.spec.bytes_per_frame as u64) as u32;
        let f = sf.file_mut()?;
        write_u32_at(f, 4, header as u32 - 8 + data_size, false)?;
        write_u32_at(f, header - 4, data_size, false)?;
        Ok(())
    }

    fn endianness(&self, _requested: Option<bool>) -> bool {
        false
    }
}
