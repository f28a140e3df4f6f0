//! TIFF validator.
//!
//! Walks the IFD chain without touching tag contents; the carved size is the
//! position just past the final next-IFD offset. Backward-pointing IFDs are
//! rejected.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub const TIFF: FileHeader = FileHeader {
    ext: "tif",
    description: "Tagged Image File Format",
    signatures: &[b"\x49\x49\x2A\x00", b"\x4D\x4D\x00\x2A"],
    scan: scan_tiff,
};

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    #[inline]
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(b),
            Self::Big => BigEndian::read_u16(b),
        }
    }

    #[inline]
    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(b),
            Self::Big => BigEndian::read_u32(b),
        }
    }
}

const TIFF_HEADER_SIZE: u64 = 8;

pub fn scan_tiff(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let header = r.peek(TIFF_HEADER_SIZE as usize)?;

    let endian = if &header[..2] == b"II" {
        Endian::Little
    } else if &header[..2] == b"MM" {
        Endian::Big
    } else {
        return Err(CoreError::InvalidFormat(format!(
            "invalid endian marker: {:02x?}",
            &header[..2]
        )));
    };

    if endian.u16(&header[2..4]) != 42 {
        return Err(CoreError::InvalidFormat("invalid TIFF magic number".into()));
    }

    let first_ifd_offset = u64::from(endian.u32(&header[4..8]));
    if first_ifd_offset < TIFF_HEADER_SIZE {
        return Err(CoreError::InvalidFormat(format!(
            "invalid IFD offset: {first_ifd_offset}"
        )));
    }

    r.discard_exact(first_ifd_offset)?;
    let mut offset = first_ifd_offset;

    let mut buf = [0u8; 4];
    loop {
        r.read_exact(&mut buf[..2])?;
        let entry_count = u64::from(endian.u16(&buf[..2]));
        offset += 2;

        let entries_size = entry_count * 12;
        r.discard_exact(entries_size)?;
        offset += entries_size;

        r.read_exact(&mut buf)?;
        let next = u64::from(endian.u32(&buf));
        offset += 4;

        if next == 0 {
            break;
        }
        if next < offset {
            return Err(CoreError::InvalidFormat("backward IFD pointer".into()));
        }
        r.discard_exact(next - offset)?;
        offset = next;
    }

    Ok(ScanResult {
        size: offset,
        ext: Some("tif"),
        name: None,
    })
}

#[cfg(test)]
pub(crate) fn minimal_tiff() -> Vec<u8> {
    // Little-endian, one IFD with two entries directly after the header.
    let mut data = Vec::new();
    data.extend_from_slice(b"II\x2A\x00");
    data.extend_from_slice(&8u32.to_le_bytes()); // first IFD offset
    data.extend_from_slice(&2u16.to_le_bytes()); // entry count
    data.extend_from_slice(&[0u8; 24]); // two 12-byte entries
    data.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Result<ScanResult> {
        let mut r = CarveReader::new(&[], &data, 0, u64::MAX);
        scan_tiff(&mut r)
    }

    #[test]
    fn test_single_ifd_little_endian() {
        let tiff = minimal_tiff();
        let res = scan(&tiff).unwrap();
        assert_eq!(res.size, tiff.len() as u64);
        assert_eq!(res.ext, Some("tif"));
    }

    #[test]
    fn test_big_endian_chain() {
        let mut data = Vec::new();
        data.extend_from_slice(b"MM\x00\x2A");
        data.extend_from_slice(&8u32.to_be_bytes());
        // First IFD: one entry, next IFD at 30.
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(&30u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 4]); // gap up to offset 30
        // Second IFD: zero entries, end of chain.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(scan(&data).unwrap().size, data.len() as u64);
    }

    #[test]
    fn test_backward_pointer_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"II\x2A\x00");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&8u32.to_le_bytes()); // points back at itself
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_magic_rejected() {
        assert!(scan(b"II\x2B\x00\x08\x00\x00\x00").is_err());
        assert!(scan(b"XX\x2A\x00\x08\x00\x00\x00").is_err());
    }

    #[test]
    fn test_ifd_offset_below_header_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"II\x2A\x00");
        data.extend_from_slice(&4u32.to_le_bytes());
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_entries_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"II\x2A\x00");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes()); // claims 4 entries
        data.extend_from_slice(&[0u8; 10]); // far too short
        assert!(matches!(scan(&data), Err(CoreError::UnexpectedEof)));
    }
}
