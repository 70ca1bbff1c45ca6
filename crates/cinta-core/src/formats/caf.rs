//! Apple Core Audio Format. Either byte order (big by default); the one
//! built-in handler that reads and writes metadata (the `info` chunk).

use std::io::{Read, Seek, SeekFrom, Write};

use super::{
    file_len, header_err, push_u16, push_u32, push_u64, read_4cc, read_u32, read_u64, skip,
    width_from_bits, write_u64_at,
};
use crate::args::Atom;
use crate::handler::SoundFileType;
use crate::soundfile::SoundFile;
use crate::{Error, MAX_CHANNELS, MAX_FRAMES, Result};

const FLAG_FLOAT: u32 = 1;
const FLAG_LITTLE_ENDIAN: u32 = 2;

/// Write-side scratch: where the data chunk starts (so metadata can be
/// slotted in before it) and the entries written so far.
struct CafScratch {
    data_chunk_off: u64,
    entries: Vec<(String, String)>,
}

/// Core Audio Format handler.
pub struct CafType;

impl SoundFileType for CafType {
    fn name(&self) -> &'static str {
        "caf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["caf"]
    }

    fn min_header_size(&self) -> usize {
        8
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 4 && &bytes[..4] == b"caff"
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let bad = || Error::BadHeaderAs("caf");
        let total = file_len(sf.file_mut()?)?;
        let f = sf.file_mut()?;

        let magic = read_4cc(f).map_err(|e| header_err("caf", e))?;
        let _version = read_u32(f, true).map_err(|e| header_err("caf", e))?;
        if &magic != b"caff" {
            return Err(bad());
        }

        let mut desc: Option<(u32, usize, usize, bool)> = None; // rate, ch, width, big
        loop {
            let id = read_4cc(f).map_err(|e| header_err("caf", e))?;
            let size = read_u64(f, true).map_err(|e| header_err("caf", e))? as i64;
            match &id {
                b"desc" => {
                    if size < 32 {
                        return Err(bad());
                    }
                    let rate = f64::from_bits(read_u64(f, true)?);
                    let format_id = read_4cc(f)?;
                    let flags = read_u32(f, true)?;
                    let _bytes_per_packet = read_u32(f, true)?;
                    let frames_per_packet = read_u32(f, true)?;
                    let channels = read_u32(f, true)?;
                    let bits = read_u32(f, true)?;
                    skip(f, size as u64 - 32)?;
                    if &format_id != b"lpcm" || frames_per_packet != 1 {
                        return Err(Error::SampleFormat);
                    }
                    let width = width_from_bits(bits as u16)?;
                    if (flags & FLAG_FLOAT != 0) != (width == 4) {
                        return Err(Error::SampleFormat);
                    }
                    if channels == 0 || channels as usize > MAX_CHANNELS || rate < 1.0 {
                        return Err(bad());
                    }
                    desc = Some((
                        rate.round() as u32,
                        channels as usize,
                        width,
                        flags & FLAG_LITTLE_ENDIAN == 0,
                    ));
                }
                b"data" => {
                    let (rate, channels, width, big) = desc.ok_or_else(bad)?;
                    let _edit_count = read_u32(f, true)?;
                    let header = f.stream_position()?;
                    let rest = total.saturating_sub(header);
                    sf.spec.set_layout(channels, width);
                    sf.spec.samplerate = rate;
                    sf.spec.big_endian = big;
                    sf.spec.header_size = Some(header);
                    // A negative data size means "until end of file".
                    sf.spec.byte_limit = if size < 4 {
                        rest
                    } else {
                        (size as u64 - 4).min(rest)
                    };
                    return Ok(());
                }
                _ => {
                    if size < 0 {
                        return Err(bad());
                    }
                    skip(f, size as u64)?;
                }
            }
        }
    }

    fn write_header(&self, sf: &mut SoundFile, nframes: u64) -> Result<u64> {
        let spec = sf.spec;
        let data_size: i64 = if nframes == MAX_FRAMES {
            -1
        } else {
            4 + (nframes * spec.bytes_per_frame as u64) as i64
        };
        let mut flags = 0u32;
        if spec.bytes_per_sample == 4 {
            flags |= FLAG_FLOAT;
        }
        if !spec.big_endian {
            flags |= FLAG_LITTLE_ENDIAN;
        }

        let mut h = Vec::with_capacity(68);
        h.extend_from_slice(b"caff");
        push_u16(&mut h, 1, true); // file version
        push_u16(&mut h, 0, true); // file flags
        h.extend_from_slice(b"desc");
        push_u64(&mut h, 32, true);
        push_u64(&mut h, f64::from(spec.samplerate).to_bits(), true);
        h.extend_from_slice(b"lpcm");
        push_u32(&mut h, flags, true);
        push_u32(&mut h, spec.bytes_per_frame as u32, true);
        push_u32(&mut h, 1, true); // frames per packet
        push_u32(&mut h, spec.channels as u32, true);
        push_u32(&mut h, (spec.bytes_per_sample * 8) as u32, true);
        let data_chunk_off = h.len() as u64;
        h.extend_from_slice(b"data");
        push_u64(&mut h, data_size as u64, true);
        push_u32(&mut h, 0, true); // edit count

        sf.file_mut()?.write_all(&h)?;
        sf.data = Some(Box::new(CafScratch { data_chunk_off, entries: Vec::new() }));
        Ok(h.len() as u64)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let header = sf.spec.header_size.ok_or(Error::BadHeaderAs("caf"))?;
        let data_size = 4 + frames_written * sf.spec.bytes_per_frame as u64;
        // data payload starts at header; size field sits 12 bytes before it
        // (8-byte size, then the 4-byte edit count).
        write_u64_at(sf.file_mut()?, header - 12, data_size, true)?;
        Ok(())
    }

    fn endianness(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(true)
    }

    fn supports_meta(&self) -> bool {
        true
    }

    fn read_meta(&self, sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        let f = sf.file_mut()?;
        let resume = f.stream_position()?;
        f.seek(SeekFrom::Start(8))?;
        let mut entries = Vec::new();
        loop {
            let id = match read_4cc(f) {
                Ok(id) => id,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let size = read_u64(f, true)? as i64;
            match &id {
                b"info" => {
                    let count = read_u32(f, true)?;
                    let mut body = vec![0u8; size as usize - 4];
                    f.read_exact(&mut body)?;
                    let mut strings = body
                        .split(|&b| b == 0)
                        .map(|s| String::from_utf8_lossy(s).into_owned());
                    for _ in 0..count {
                        let key = strings.next().ok_or(Error::BadHeaderAs("caf"))?;
                        let value = strings.next().ok_or(Error::BadHeaderAs("caf"))?;
                        entries.push((key, value));
                    }
                    break;
                }
                b"data" => break,
                _ => {
                    if size < 0 {
                        break;
                    }
                    skip(f, size as u64)?;
                }
            }
        }
        f.seek(SeekFrom::Start(resume))?;
        Ok(entries)
    }

    /// Inserts (or grows) the `info` chunk just ahead of the data chunk.
    /// Valid only while no sample bytes have been written.
    fn write_meta(&self, sf: &mut SoundFile, args: &[Atom]) -> Result<()> {
        let (key, values) = match args.split_first() {
            Some((Atom::Symbol(key), rest)) if !rest.is_empty() => (key.clone(), rest),
            _ => {
                return Err(Error::Format {
                    format: "caf",
                    detail: "meta expects a key and at least one value".into(),
                });
            }
        };
        let value = values
            .iter()
            .map(Atom::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let scratch = match sf.data.as_mut().and_then(|d| d.downcast_mut::<CafScratch>()) {
            Some(s) => s,
            None => {
                return Err(Error::Format {
                    format: "caf",
                    detail: "metadata must be written before sample data".into(),
                });
            }
        };
        scratch.entries.push((key, value));

        // Rebuild everything from the data chunk position: info chunk, then
        // a fresh open-ended data chunk header.
        let mut body = Vec::new();
        push_u32(&mut body, scratch.entries.len() as u32, true);
        for (k, v) in &scratch.entries {
            body.extend_from_slice(k.as_bytes());
            body.push(0);
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        let mut tail = Vec::new();
        tail.extend_from_slice(b"info");
        push_u64(&mut tail, body.len() as u64, true);
        tail.extend_from_slice(&body);
        tail.extend_from_slice(b"data");
        push_u64(&mut tail, -1i64 as u64, true);
        push_u32(&mut tail, 0, true); // edit count

        let data_chunk_off = scratch.data_chunk_off;
        let header = data_chunk_off + tail.len() as u64;
        let f = sf.file_mut()?;
        f.seek(SeekFrom::Start(data_chunk_off))?;
        f.write_all(&tail)?;
        sf.spec.header_size = Some(header);
        Ok(())
    }
}
