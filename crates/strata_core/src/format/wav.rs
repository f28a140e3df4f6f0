//! WAV validator.
//!
//! Walks RIFF chunks to a 16-byte PCM `fmt ` chunk, then to the `data`
//! chunk. The carved size is everything up to the end of the data payload,
//! clamped to the length the RIFF header declares. Truncated files yield the
//! bytes that are actually present.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{ByteOrder, LittleEndian};

pub const WAV: FileHeader = FileHeader {
    ext: "wav",
    description: "Waveform Audio File Format",
    signatures: &[b"RIFF", b"RIFX"],
    scan: scan_wav,
};

/// A PCM `fmt ` chunk is exactly 16 bytes.
const FMT_CHUNK_SIZE_PCM: u32 = 16;

pub fn scan_wav(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut hdr = [0u8; 8];
    r.read_exact(&mut hdr)?;
    if &hdr[..4] != b"RIFF" && &hdr[..4] != b"RIFX" {
        return Err(CoreError::InvalidFormat("missing RIFF signature".into()));
    }
    // Declared length of everything after this 8-byte chunk header.
    let riff_size = u64::from(LittleEndian::read_u32(&hdr[4..8]));
    let riff_end = riff_size + 8;

    let mut wave = [0u8; 4];
    r.read_exact(&mut wave)?;
    if &wave != b"WAVE" {
        return Err(CoreError::InvalidFormat("missing WAVE identifier".into()));
    }

    let mut bytes_read: u64 = 12;

    // Locate the fmt chunk.
    let mut fmt_found = false;
    while bytes_read < riff_end {
        if r.read(&mut hdr)? < 8 {
            break; // truncated before the declared RIFF end
        }
        let chunk_size = u64::from(LittleEndian::read_u32(&hdr[4..8]));
        bytes_read += 8;

        if &hdr[..4] == b"fmt " {
            if chunk_size != u64::from(FMT_CHUNK_SIZE_PCM) {
                return Err(CoreError::InvalidFormat(format!(
                    "unsupported fmt chunk size {chunk_size}, expected PCM"
                )));
            }
            r.discard_exact(chunk_size)?;
            bytes_read += chunk_size;
            fmt_found = true;
            break;
        }

        let skipped = r.discard(chunk_size)?;
        bytes_read += skipped;
        if skipped < chunk_size {
            break;
        }
    }
    if !fmt_found {
        return Err(CoreError::InvalidFormat("missing fmt sub-chunk".into()));
    }

    // Locate the data chunk.
    let mut data_size: Option<u64> = None;
    while bytes_read < riff_end {
        if r.read(&mut hdr)? < 8 {
            break;
        }
        let chunk_size = u64::from(LittleEndian::read_u32(&hdr[4..8]));
        bytes_read += 8;

        if &hdr[..4] == b"data" {
            data_size = Some(chunk_size);
            break;
        }

        let skipped = r.discard(chunk_size)?;
        bytes_read += skipped;
        if skipped < chunk_size {
            // Cannot reach a data chunk anymore; what was read is the file.
            return Ok(ScanResult::with_size(bytes_read));
        }
    }
    let Some(data_size) = data_size else {
        return Err(CoreError::InvalidFormat("missing data sub-chunk".into()));
    };

    let total = bytes_read + data_size;
    if total > riff_end {
        // Data chunk claims more than the RIFF header covers: trust RIFF.
        return Ok(ScanResult::with_size(riff_end));
    }

    let skipped = r.discard(data_size)?;
    if skipped < data_size {
        return Ok(ScanResult::with_size(bytes_read + skipped));
    }
    Ok(ScanResult::with_size(total))
}

#[cfg(test)]
pub(crate) fn minimal_wav(data_len: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let riff_size = 4 + 24 + 8 + data_len; // WAVE + fmt chunk + data header + payload
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    // PCM, mono, 8000 Hz, 8-bit.
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&8000u32.to_le_bytes());
    out.extend_from_slice(&8000u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend(std::iter::repeat(0x80u8).take(data_len as usize));
    out
}
