//! Sun audio (.au) validator.
//!
//! Big-endian header of at least 24 bytes, then data. A data size of
//! 0xFFFFFFFF means the samples extend to the end of the stream.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{BigEndian, ByteOrder};

pub const AU: FileHeader = FileHeader {
    ext: "au",
    description: "Sun/NeXT audio data",
    signatures: &[b".snd"],
    scan: scan_au,
};

const AU_MAGIC: u32 = 0x2E73_6E64; // ".snd"
const MIN_AU_HEADER_SIZE: u32 = 24;
const AU_DATA_SIZE_UNKNOWN: u32 = 0xFFFF_FFFF;

pub fn scan_au(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut hdr = [0u8; MIN_AU_HEADER_SIZE as usize];
    r.read_exact(&mut hdr)?;

    if BigEndian::read_u32(&hdr[0..4]) != AU_MAGIC {
        return Err(CoreError::InvalidFormat("missing .snd magic".into()));
    }

    let header_size = BigEndian::read_u32(&hdr[4..8]);
    if header_size < MIN_AU_HEADER_SIZE {
        return Err(CoreError::InvalidFormat(format!(
            "invalid AU header size: {header_size}"
        )));
    }
    let data_size = BigEndian::read_u32(&hdr[8..12]);

    let mut bytes_read = u64::from(MIN_AU_HEADER_SIZE);

    if header_size > MIN_AU_HEADER_SIZE {
        let skip = u64::from(header_size - MIN_AU_HEADER_SIZE);
        let skipped = r.discard(skip)?;
        if skipped < skip {
            return Err(CoreError::InvalidFormat("truncated AU header".into()));
        }
        bytes_read += skipped;
    }

    if data_size == AU_DATA_SIZE_UNKNOWN {
        // Samples run to the end of whatever the reader can still serve
        // (which the engine caps at the file-size budget).
        loop {
            let skipped = r.discard(1 << 20)?;
            if skipped == 0 {
                break;
            }
            bytes_read += skipped;
        }
        return Ok(ScanResult::with_size(bytes_read));
    }

    let total = u64::from(header_size) + u64::from(data_size);
    let to_skip = total - bytes_read;
    let skipped = r.discard(to_skip)?;
    if skipped < to_skip {
        // Truncated data: the valid AU ends where the stream does.
        return Ok(ScanResult::with_size(bytes_read + skipped));
    }
    Ok(ScanResult::with_size(total))
}

#[cfg(test)]
pub(crate) fn minimal_au(data_len: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b".snd");
    out.extend_from_slice(&24u32.to_be_bytes()); // header size
    out.extend_from_slice(&data_len.to_be_bytes()); // data size
    out.extend_from_slice(&1u32.to_be_bytes()); // encoding: 8-bit mu-law
    out.extend_from_slice(&8000u32.to_be_bytes()); // sample rate
    out.extend_from_slice(&1u32.to_be_bytes()); // channels
    out.extend(std::iter::repeat(0x7Fu8).take(data_len as usize));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Result<ScanResult> {
        let mut r = CarveReader::new(&[], &data, 0, u64::MAX);
        scan_au(&mut r)
    }

    #[test]
    fn test_minimal_au_size() {
        let au = minimal_au(128);
        assert_eq!(scan(&au).unwrap().size, au.len() as u64);
    }

    #[test]
    fn test_extended_header_is_skipped() {
        let mut au = minimal_au(16);
        // Grow the header by 8 annotation bytes.
        au[4..8].copy_from_slice(&32u32.to_be_bytes());
        au.splice(24..24, [0u8; 8]);
        assert_eq!(scan(&au).unwrap().size, au.len() as u64);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut au = minimal_au(16);
        au[0] = b'x';
        assert!(matches!(scan(&au), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_header_size_below_minimum_rejected() {
        let mut au = minimal_au(16);
        au[4..8].copy_from_slice(&20u32.to_be_bytes());
        assert!(matches!(scan(&au), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_data_size_consumes_remainder() {
        let mut au = minimal_au(0);
        au[8..12].copy_from_slice(&AU_DATA_SIZE_UNKNOWN.to_be_bytes());
        au.extend_from_slice(&[0x55u8; 300]);
        assert_eq!(scan(&au).unwrap().size, au.len() as u64);
    }

    #[test]
    fn test_unknown_data_size_respects_budget() {
        let mut au = minimal_au(0);
        au[8..12].copy_from_slice(&AU_DATA_SIZE_UNKNOWN.to_be_bytes());
        au.extend_from_slice(&[0x55u8; 1000]);

        let mut r = CarveReader::new(&[], &&au[..], 0, 100);
        assert_eq!(scan_au(&mut r).unwrap().size, 100);
    }

    #[test]
    fn test_truncated_data_yields_partial_size() {
        let mut au = minimal_au(256);
        au.truncate(24 + 100);
        assert_eq!(scan(&au).unwrap().size, 124);
    }
}
