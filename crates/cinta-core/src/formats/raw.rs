//! Headerless passthrough. Selected only when the caller overrides header
//! detection; never registered, never probed.

use super::file_len;
use crate::handler::SoundFileType;
use crate::soundfile::SoundFile;
use crate::{Error, MAX_CHANNELS, Result, bytes};

/// Headerless handler singleton.
pub struct RawType;

impl SoundFileType for RawType {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn min_header_size(&self) -> usize {
        0
    }

    fn probe(&self, _bytes: &[u8]) -> bool {
        false
    }

    /// The caller supplies the whole layout; this only validates it and
    /// derives the byte budget from the file length.
    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        if !matches!(sf.spec.bytes_per_sample, 2..=4) {
            return Err(Error::SampleFormat);
        }
        if sf.spec.channels == 0 || sf.spec.channels > MAX_CHANNELS {
            return Err(Error::Format {
                format: "raw",
                detail: format!("bad channel count {}", sf.spec.channels),
            });
        }
        sf.spec.bytes_per_frame = sf.spec.channels * sf.spec.bytes_per_sample;
        let header = sf.spec.header_size.unwrap_or(0);
        sf.spec.header_size = Some(header);
        sf.spec.byte_limit = file_len(sf.file_mut()?)?.saturating_sub(header);
        Ok(())
    }

    fn write_header(&self, _sf: &mut SoundFile, _nframes: u64) -> Result<u64> {
        Err(Error::Format {
            format: "raw",
            detail: "headerless files cannot be created".into(),
        })
    }

    fn update_header(&self, _sf: &mut SoundFile, _frames_written: u64) -> Result<()> {
        Ok(())
    }

    fn endianness(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or_else(bytes::is_big_endian)
    }
}
