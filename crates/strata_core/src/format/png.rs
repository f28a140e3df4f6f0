//! PNG validator.
//!
//! Iterates chunks, verifying each CRC and the IHDR → PLTE/tRNS → IDAT → IEND
//! ordering. The returned size is the position just past the IEND CRC.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{BigEndian, ByteOrder};

pub const PNG: FileHeader = FileHeader {
    ext: "png",
    description: "Portable Network Graphics",
    signatures: &[b"\x89PNG\r\n\x1a\n"],
    scan: scan_png,
};

const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n";

// Chunk ordering stages.
const DS_START: u8 = 0;
const DS_SEEN_IHDR: u8 = 1;
const DS_SEEN_PLTE: u8 = 2;
const DS_SEEN_TRNS: u8 = 3;
const DS_SEEN_IDAT: u8 = 4;
const DS_SEEN_IEND: u8 = 5;

/// Staging buffer for fixed-size chunk payloads; 3*256 covers the largest
/// palette.
const TMP_LEN: usize = 3 * 256;

struct PngDecoder {
    stage: u8,
    tmp: [u8; TMP_LEN],
}

fn order_error() -> CoreError {
    CoreError::InvalidFormat("invalid PNG chunk order".into())
}

impl PngDecoder {
    fn parse_chunk(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        let mut head = [0u8; 8];
        r.read_exact(&mut head)?;
        let length = BigEndian::read_u32(&head[..4]);
        let kind: [u8; 4] = head[4..8].try_into().expect("fixed slice");
        let mut crc = crc32fast::Hasher::new();
        crc.update(&kind);

        match &kind {
            b"IHDR" => {
                if self.stage != DS_START {
                    return Err(order_error());
                }
                self.stage = DS_SEEN_IHDR;
                self.read_and_check(r, length, crc)
            }
            b"PLTE" => {
                if self.stage != DS_SEEN_IHDR {
                    return Err(order_error());
                }
                self.stage = DS_SEEN_PLTE;
                self.read_and_check(r, length, crc)
            }
            b"tRNS" => {
                self.stage = DS_SEEN_TRNS;
                self.read_and_check(r, length, crc)
            }
            b"IDAT" if self.stage != DS_SEEN_IDAT => {
                if self.stage < DS_SEEN_IHDR {
                    return Err(order_error());
                }
                self.stage = DS_SEEN_IDAT;
                Self::skip_checked(r, length, crc)
            }
            b"IEND" => {
                if self.stage != DS_SEEN_IDAT {
                    return Err(order_error());
                }
                self.stage = DS_SEEN_IEND;
                self.read_and_check(r, length, crc)
            }
            _ => {
                // Ancillary chunks and trailing IDATs after the first run
                // are skipped but still CRC-verified.
                if length > 0x7FFF_FFFF {
                    return Err(CoreError::InvalidFormat(format!(
                        "bad chunk length: {length}"
                    )));
                }
                Self::skip_checked(r, length, crc)
            }
        }
    }

    /// Read a fixed-size chunk payload into the staging buffer, then verify
    /// the CRC.
    fn read_and_check(
        &mut self,
        r: &mut CarveReader<'_>,
        length: u32,
        mut crc: crc32fast::Hasher,
    ) -> Result<()> {
        let length = length as usize;
        if length > TMP_LEN {
            return Err(CoreError::InvalidFormat(format!(
                "chunk payload too large: {length}"
            )));
        }
        r.read_exact(&mut self.tmp[..length])?;
        crc.update(&self.tmp[..length]);
        verify_checksum(r, crc)
    }

    /// Stream an arbitrarily long chunk payload through the CRC.
    fn skip_checked(r: &mut CarveReader<'_>, length: u32, mut crc: crc32fast::Hasher) -> Result<()> {
        let mut remaining = length as u64;
        let mut chunk = [0u8; 4096];
        while remaining > 0 {
            let take = chunk.len().min(remaining as usize);
            r.read_exact(&mut chunk[..take])?;
            crc.update(&chunk[..take]);
            remaining -= take as u64;
        }
        verify_checksum(r, crc)
    }
}

fn verify_checksum(r: &mut CarveReader<'_>, crc: crc32fast::Hasher) -> Result<()> {
    let mut stored = [0u8; 4];
    r.read_exact(&mut stored)?;
    if BigEndian::read_u32(&stored) != crc.finalize() {
        return Err(CoreError::InvalidFormat("invalid checksum".into()));
    }
    Ok(())
}

pub fn scan_png(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut header = [0u8; 8];
    r.read_exact(&mut header)?;
    if header != PNG_HEADER {
        return Err(CoreError::InvalidFormat("not a PNG file".into()));
    }

    let mut dec = PngDecoder {
        stage: DS_START,
        tmp: [0u8; TMP_LEN],
    };
    while dec.stage != DS_SEEN_IEND {
        dec.parse_chunk(r)?;
    }
    Ok(ScanResult::with_size(r.bytes_read()))
}

#[cfg(test)]
pub(crate) fn chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    let mut crc = crc32fast::Hasher::new();
    crc.update(kind);
    crc.update(payload);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
    out
}

/// A small well-formed PNG used by tests across the crate.
#[cfg(test)]
pub(crate) fn minimal_png() -> Vec<u8> {
    let mut data = PNG_HEADER.to_vec();
    let ihdr = [
        0, 0, 0, 2, // width
        0, 0, 0, 2, // height
        8, 2, 0, 0, 0, // bit depth, color type, compression, filter, interlace
    ];
    data.extend_from_slice(&chunk(b"IHDR", &ihdr));
    data.extend_from_slice(&chunk(b"IDAT", &[0x78, 0x9C, 0x01, 0x02, 0x00]));
    data.extend_from_slice(&chunk(b"IEND", &[]));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Result<ScanResult> {
        let mut r = CarveReader::new(&[], &data, 0, u64::MAX);
        scan_png(&mut r)
    }

    #[test]
    fn test_minimal_png_size() {
        let png = minimal_png();
        assert_eq!(scan(&png).unwrap().size, png.len() as u64);
    }

    #[test]
    fn test_trailing_bytes_not_counted() {
        let mut data = minimal_png();
        let len = data.len();
        data.extend_from_slice(&[0xABu8; 256]);
        assert_eq!(scan(&data).unwrap().size, len as u64);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut data = minimal_png();
        data[0] = 0x00;
        assert!(scan(&data).is_err());
    }

    #[test]
    fn test_crc_failure_rejected() {
        let mut data = minimal_png();
        // Corrupt one byte of the IHDR payload so its CRC no longer matches.
        data[8 + 8] ^= 0xFF;
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_misordered_chunks_rejected() {
        let mut data = PNG_HEADER.to_vec();
        data.extend_from_slice(&chunk(b"IDAT", &[0x00]));
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_iend_before_idat_rejected() {
        let mut data = PNG_HEADER.to_vec();
        data.extend_from_slice(&chunk(
            b"IHDR",
            &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0],
        ));
        data.extend_from_slice(&chunk(b"IEND", &[]));
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_ancillary_chunks_allowed() {
        let mut data = PNG_HEADER.to_vec();
        data.extend_from_slice(&chunk(
            b"IHDR",
            &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0],
        ));
        data.extend_from_slice(&chunk(b"gAMA", &[0, 1, 0xE2, 0x40]));
        data.extend_from_slice(&chunk(b"IDAT", &[0x78, 0x9C]));
        data.extend_from_slice(&chunk(b"tEXt", b"comment\0hello"));
        data.extend_from_slice(&chunk(b"IDAT", &[0x01]));
        data.extend_from_slice(&chunk(b"IEND", &[]));
        assert_eq!(scan(&data).unwrap().size, data.len() as u64);
    }

    #[test]
    fn test_truncated_png_rejected() {
        let mut data = minimal_png();
        data.truncate(data.len() - 6);
        assert!(matches!(scan(&data), Err(CoreError::UnexpectedEof)));
    }

    #[test]
    fn test_plte_after_ihdr_only() {
        let mut data = PNG_HEADER.to_vec();
        data.extend_from_slice(&chunk(b"PLTE", &[0, 0, 0]));
        assert!(matches!(scan(&data), Err(CoreError::InvalidFormat(_))));
    }
}
