//! Apple AIFF / AIFF-C. Big-endian; floats are written as AIFC `fl32`.

use std::io::{Read, Seek, Write};

use super::{
    file_len, header_err, patch_u32, push_u16, push_u32, read_4cc, read_u16, read_u32, skip,
    width_from_bits, write_u32_at,
};
use crate::handler::SoundFileType;
use crate::soundfile::SoundFile;
use crate::{Error, MAX_CHANNELS, MAX_FRAMES, Result};

/// AIFC format version 1 timestamp.
const AIFC_VERSION: u32 = 0xa280_5140;

/// Offsets of the size fields a finished write has to fix up. The layout
/// depends on whether an FVER chunk was emitted, so they are recorded at
/// write time.
struct AiffFixups {
    frames_off: u64,
    ssnd_size_off: u64,
}

/// AIFF / AIFF-C handler.
pub struct AiffType;

impl SoundFileType for AiffType {
    fn name(&self) -> &'static str {
        "aiff"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["aif", "aiff", "aifc"]
    }

    fn min_header_size(&self) -> usize {
        12
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 12
            && &bytes[..4] == b"FORM"
            && (&bytes[8..12] == b"AIFF" || &bytes[8..12] == b"AIFC")
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let bad = || Error::BadHeaderAs("aiff");
        let total = file_len(sf.file_mut()?)?;
        let f = sf.file_mut()?;

        let form = read_4cc(f).map_err(|e| header_err("aiff", e))?;
        let _form_size = read_u32(f, true).map_err(|e| header_err("aiff", e))?;
        let kind = read_4cc(f).map_err(|e| header_err("aiff", e))?;
        if &form != b"FORM" {
            return Err(bad());
        }
        let is_aifc = match &kind {
            b"AIFF" => false,
            b"AIFC" => true,
            _ => return Err(bad()),
        };

        let mut comm: Option<(usize, usize, bool, u32)> = None; // channels, width, big, rate
        loop {
            let id = read_4cc(f).map_err(|e| header_err("aiff", e))?;
            let size = u64::from(read_u32(f, true).map_err(|e| header_err("aiff", e))?);
            match &id {
                b"COMM" => {
                    if size < 18 {
                        return Err(bad());
                    }
                    let channels = read_u16(f, true)?;
                    let _nframes = read_u32(f, true)?;
                    let bits = read_u16(f, true)?;
                    let mut rate_bytes = [0u8; 10];
                    f.read_exact(&mut rate_bytes).map_err(|e| header_err("aiff", e))?;
                    let rate = ext80_decode(&rate_bytes);
                    let mut consumed = 18;
                    let mut big = true;
                    let mut float = false;
                    if is_aifc && size >= 22 {
                        let comp = read_4cc(f).map_err(|e| header_err("aiff", e))?;
                        consumed = 22;
                        match &comp {
                            b"NONE" | b"twos" => {}
                            b"sowt" => big = false,
                            b"fl32" | b"FL32" => float = true,
                            _ => {
                                return Err(Error::Format {
                                    format: "aiff",
                                    detail: format!(
                                        "unsupported compression '{}'",
                                        String::from_utf8_lossy(&comp)
                                    ),
                                });
                            }
                        }
                    }
                    skip(f, size - consumed + (size & 1))?;
                    let width = width_from_bits(bits)?;
                    if float != (width == 4) || (!big && width != 2) {
                        return Err(Error::SampleFormat);
                    }
                    if channels == 0 || channels as usize > MAX_CHANNELS || rate < 1.0 {
                        return Err(bad());
                    }
                    comm = Some((channels as usize, width, big, rate.round() as u32));
                }
                b"SSND" => {
                    let (channels, width, big, rate) = comm.ok_or_else(bad)?;
                    let offset = u64::from(read_u32(f, true)?);
                    let _block_size = read_u32(f, true)?;
                    skip(f, offset)?;
                    let header = f.stream_position()?;
                    let rest = total.saturating_sub(header);
                    sf.spec.set_layout(channels, width);
                    sf.spec.samplerate = rate;
                    sf.spec.big_endian = big;
                    sf.spec.header_size = Some(header);
                    sf.spec.byte_limit = if size >= 8 + offset {
                        (size - 8 - offset).min(rest)
                    } else {
                        rest
                    };
                    return Ok(());
                }
                _ => skip(f, size + (size & 1))?,
            }
        }
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<u64> {
        let spec = sf.spec;
        let float = spec.bytes_per_sample == 4;
        let (frames, data_size) = if nframes == MAX_FRAMES {
            (0u32, 0u32)
        } else {
            (nframes as u32, (nframes * spec.bytes_per_frame as u64) as u32)
        };

        let mut h = Vec::with_capacity(72);
        h.extend_from_slice(b"FORM");
        let form_size_off = h.len();
        push_u32(&mut h, 0, true); // patched below
        h.extend_from_slice(if float { b"AIFC" } else { b"AIFF" });
        if float {
            h.extend_from_slice(b"FVER");
            push_u32(&mut h, 4, true);
            push_u32(&mut h, AIFC_VERSION, true);
        }
        h.extend_from_slice(b"COMM");
        push_u32(&mut h, if float { 24 } else { 18 }, true);
        push_u16(&mut h, spec.channels as u16, true);
        let frames_off = h.len() as u64;
        push_u32(&mut h, frames, true);
        push_u16(&mut h, (spec.bytes_per_sample * 8) as u16, true);
        h.extend_from_slice(&ext80_encode(f64::from(spec.samplerate)));
        if float {
            h.extend_from_slice(b"fl32");
            h.extend_from_slice(&[0, 0]); // empty pascal compression name
        }
        h.extend_from_slice(b"SSND");
        let ssnd_size_off = h.len() as u64;
        push_u32(&mut h, 8 + data_size, true);
        push_u32(&mut h, 0, true); // offset
        push_u32(&mut h, 0, true); // block size
        let header_len = h.len() as u32;
        patch_u32(&mut h, form_size_off, header_len - 8 + data_size, true);

        sf.file_mut()?.write_all(&h)?;
        sf.data = Some(Box::new(AiffFixups { frames_off, ssnd_size_off }));
        Ok(u64::from(header_len))
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let header = sf.spec.header_size.ok_or(Error::BadHeaderAs("aiff"))?;
        let data_size = (frames_written * sf.spec.bytes_per_frame as u64) as u32;
        let (frames_off, ssnd_size_off) = match
            sf.data.as_ref().and_then(|d| d.downcast_ref::<AiffFixups>())
        {
            Some(fix) => (fix.frames_off, fix.ssnd_size_off),
            None => return Err(Error::BadHeaderAs("aiff")),
        };
        let f = sf.file_mut()?;
        write_u32_at(f, 4, header as u32 - 8 + data_size, true)?;
        write_u32_at(f, frames_off, frames_written as u32, true)?;
        write_u32_at(f, ssnd_size_off, 8 + data_size, true)?;
        Ok(())
    }

    fn endianness(&self, _requested: Option<bool>) -> bool {
        true
    }
}

/// Encodes a sample rate as the 80-bit extended float COMM carries.
fn ext80_encode(num: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if num == 0.0 {
        return out;
    }
    let bits = num.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & 0x000f_ffff_ffff_ffff;
    // Normal doubles only; sample rates never need subnormals.
    let ext_exp = sign | (exp - 1023 + 16383) as u16;
    let mantissa = (1u64 << 63) | (frac << 11);
    out[..2].copy_from_slice(&ext_exp.to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// Decodes the 80-bit extended float sample rate.
fn ext80_decode(b: &[u8; 10]) -> f64 {
    let exp_sign = u16::from_be_bytes([b[0], b[1]]);
    let mantissa = u64::from_be_bytes([b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9]]);
    if exp_sign & 0x7fff == 0 && mantissa == 0 {
        return 0.0;
    }
    let sign = if exp_sign & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = i32::from(exp_sign & 0x7fff) - 16383;
    sign * mantissa as f64 * 2f64.powi(exp - 63)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext80_round_trips_common_rates() {
        for rate in [8000.0, 22050.0, 44100.0, 48000.0, 96000.0, 192000.0] {
            let enc = ext80_encode(rate);
            assert_eq!(ext80_decode(&enc), rate, "rate {rate}");
        }
    }

    #[test]
    fn ext80_zero() {
        assert_eq!(ext80_decode(&ext80_encode(0.0)), 0.0);
    }

    #[test]
    fn ext80_known_44100() {
        // 44100 = 0.673828125 * 2^16 -> exponent 16398, mantissa 0xac44...
        let enc = ext80_encode(44100.0);
        assert_eq!(&enc[..4], &[0x40, 0x0e, 0xac, 0x44]);
    }
}
