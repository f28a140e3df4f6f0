//! RAR validator, covering the 1.5 and 5.0 container layouts.
//!
//! Both walk the block chain to the terminal header; the carved size is the
//! position after it. Password-protected 1.5 archives are rejected since
//! their headers cannot be trusted.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{ByteOrder, LittleEndian};

pub const RAR15_SIGNATURE: &[u8] = &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
pub const RAR50_SIGNATURE: &[u8] = &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

pub const RAR: FileHeader = FileHeader {
    ext: "rar",
    description: "RAR archive",
    signatures: &[RAR15_SIGNATURE, RAR50_SIGNATURE],
    scan: scan_rar,
};

/// Main-header flag marking an encrypted archive (RAR 1.5).
const MHD_PASSWORD_FLAG: u16 = 0x0080;

fn reject(reason: String) -> CoreError {
    CoreError::InvalidFormat(format!("rar: {reason}"))
}

pub fn scan_rar(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut sig = [0u8; 8];
    r.read_exact(&mut sig)?;

    if &sig[..RAR15_SIGNATURE.len()] == RAR15_SIGNATURE {
        // The 1.5 signature is only 7 bytes; give the 8th back.
        r.unread(1)?;
        return scan_rar15(r);
    }
    if sig == RAR50_SIGNATURE {
        return scan_rar50(r);
    }
    Err(reject("invalid signature".into()))
}

// --- RAR 1.5 ---
//
// Block layout:
//   Header CRC   (2)  Header Type (1)  Header Flags (2)  Header Size (2)
//   then type-dependent fields; file (0x74), comment (0x75) and subblock
//   (0x7A) headers carry an extra 4-byte data size, recovery headers (0x78)
//   carry block count and block size.

const RAR15_ARCHIVE_HEADER: u8 = 0x73;
const RAR15_END_HEADER: u8 = 0x7B;

fn scan_rar15(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let (hdr_type, flags) = read_rar15_block(r)?;
    if hdr_type != RAR15_ARCHIVE_HEADER {
        return Err(reject(format!(
            "expected archive header 0x73, got 0x{hdr_type:02x}"
        )));
    }
    if flags & MHD_PASSWORD_FLAG != 0 {
        return Err(reject("archive is password protected".into()));
    }

    loop {
        let (hdr_type, _) = read_rar15_block(r)?;
        if hdr_type == RAR15_END_HEADER {
            break;
        }
    }
    Ok(ScanResult::with_size(r.bytes_read()))
}

fn read_rar15_block(r: &mut CarveReader<'_>) -> Result<(u8, u16)> {
    let mut hdr = [0u8; 7];
    r.read_exact(&mut hdr)?;
    let mut consumed: u32 = 7;

    let hdr_type = hdr[2];
    let flags = LittleEndian::read_u16(&hdr[3..5]);
    if !(0x72..=0x7B).contains(&hdr_type) {
        return Err(reject(format!("invalid block type 0x{hdr_type:02x}")));
    }
    if hdr_type == RAR15_END_HEADER {
        return Ok((hdr_type, flags));
    }

    let mut payload_size = u32::from(LittleEndian::read_u16(&hdr[5..7]));
    match hdr_type {
        0x74 | 0x75 | 0x7A => {
            // Comment headers only carry a data size with flag 0x0008.
            if hdr_type != 0x75 || flags & 0x0008 != 0 {
                let mut add = [0u8; 4];
                r.read_exact(&mut add)?;
                payload_size = payload_size.wrapping_add(LittleEndian::read_u32(&add));
                consumed += 4;
            }
        }
        0x78 => {
            let mut rec = [0u8; 8];
            r.read_exact(&mut rec)?;
            let num_blocks = LittleEndian::read_u32(&rec[..4]);
            let block_size = LittleEndian::read_u32(&rec[4..]);
            payload_size = payload_size.wrapping_add(num_blocks.wrapping_mul(block_size));
            consumed += 8;
        }
        _ => {}
    }

    if payload_size <= consumed {
        return Err(reject(format!(
            "block size {payload_size} not beyond its own header"
        )));
    }
    r.discard_exact(u64::from(payload_size - consumed))?;
    Ok((hdr_type, flags))
}

// --- RAR 5.0 ---
//
// Block layout:
//   CRC32 (4), then varints: header size, header type, flags,
//   optional extra-area size (flag 0x01), optional data size (flag 0x02).
//   Header size counts from the header-type field onward.

const RAR50_MAIN_HEADER: u64 = 0x1;
const RAR50_END_HEADER: u64 = 0x5;

fn scan_rar50(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let (hdr_type, _flags) = read_rar50_block(r)?;
    if hdr_type != RAR50_MAIN_HEADER {
        return Err(reject(format!(
            "expected main header 0x1, got 0x{hdr_type:x}"
        )));
    }

    loop {
        let (hdr_type, _) = read_rar50_block(r)?;
        if hdr_type == RAR50_END_HEADER {
            break;
        }
    }
    Ok(ScanResult::with_size(r.bytes_read()))
}

fn read_rar50_block(r: &mut CarveReader<'_>) -> Result<(u64, u64)> {
    r.discard_exact(4)?; // header CRC

    let (hdr_size, n) = read_varint(r)?;
    if n > 3 || hdr_size > 2 * 1024 * 1024 {
        return Err(reject(format!(
            "invalid header size: {hdr_size} ({n} varint bytes)"
        )));
    }

    let mut consumed: u64 = 0;

    let (hdr_type, n) = read_varint(r)?;
    consumed += n as u64;

    let (flags, n) = read_varint(r)?;
    consumed += n as u64;

    let mut total_size = hdr_size;
    if flags & 0x0001 != 0 {
        // Extra area size: already included in the header size.
        let (_, n) = read_varint(r)?;
        consumed += n as u64;
    }
    if flags & 0x0002 != 0 {
        let (data_size, n) = read_varint(r)?;
        consumed += n as u64;
        total_size += data_size;
    }

    if total_size <= consumed {
        return Err(reject(format!(
            "block size {total_size} not beyond its parsed fields"
        )));
    }
    r.discard_exact(total_size - consumed)?;
    Ok((hdr_type, flags))
}

/// Little-endian base-128 varint with high-bit continuation, at most 10
/// bytes for a 64-bit value.
fn read_varint(r: &mut CarveReader<'_>) -> Result<(u64, usize)> {
    let mut val: u64 = 0;
    let mut shift = 0u32;
    let mut n = 0usize;
    loop {
        let b = r.read_byte()?;
        n += 1;
        if n > 10 {
            return Err(reject("varint longer than 10 bytes".into()));
        }
        val |= u64::from(b & 0x7F) << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok((val, n))
}

#[cfg(test)]
pub(crate) fn minimal_rar15() -> Vec<u8> {
    let mut data = RAR15_SIGNATURE.to_vec();
    // Archive header: crc, type 0x73, flags 0, size 13 (6 payload bytes).
    data.extend_from_slice(&[0x11, 0x22, 0x73, 0x00, 0x00, 13, 0]);
    data.extend_from_slice(&[0u8; 6]);
    // End-of-archive header.
    data.extend_from_slice(&[0x33, 0x44, 0x7B, 0x00, 0x00, 7, 0]);
    data
}

#[cfg(test)]
pub(crate) fn minimal_rar50() -> Vec<u8> {
    let mut data = RAR50_SIGNATURE.to_vec();
    // Main header: crc(4), size=3, type=1, flags=0, one payload byte.
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&[3, 1, 0, 0xAA]);
    // End header: crc(4), size=3, type=5, flags=0, one payload byte.
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&[3, 5, 0, 0xBB]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Result<ScanResult> {
        let mut r = CarveReader::new(&[], &data, 0, u64::MAX);
        scan_rar(&mut r)
    }

    #[test]
    fn test_rar15_minimal() {
        let rar = minimal_rar15();
        assert_eq!(scan(&rar).unwrap().size, rar.len() as u64);
    }

    #[test]
    fn test_rar15_with_file_block() {
        let mut rar = RAR15_SIGNATURE.to_vec();
        rar.extend_from_slice(&[0x11, 0x22, 0x73, 0x00, 0x00, 13, 0]);
        rar.extend_from_slice(&[0u8; 6]);
        // File header: base size 32, data size 10 -> 42 total, 11 consumed.
        rar.extend_from_slice(&[0xAA, 0xBB, 0x74, 0x00, 0x00, 32, 0]);
        rar.extend_from_slice(&10u32.to_le_bytes());
        rar.extend_from_slice(&[0u8; 31]); // 42 - 11
        rar.extend_from_slice(&[0x33, 0x44, 0x7B, 0x00, 0x00, 7, 0]);
        assert_eq!(scan(&rar).unwrap().size, rar.len() as u64);
    }

    #[test]
    fn test_rar15_password_flag_rejected() {
        let mut rar = minimal_rar15();
        rar[7 + 3] = 0x80; // set MHD_PASSWORD in the archive header flags
        assert!(matches!(scan(&rar), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_rar15_bad_block_type_rejected() {
        let mut rar = minimal_rar15();
        rar[7 + 2] = 0x60;
        assert!(matches!(scan(&rar), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_rar15_truncated_rejected() {
        let mut rar = minimal_rar15();
        rar.truncate(rar.len() - 3);
        assert!(matches!(scan(&rar), Err(CoreError::UnexpectedEof)));
    }

    #[test]
    fn test_rar50_minimal() {
        let rar = minimal_rar50();
        assert_eq!(scan(&rar).unwrap().size, rar.len() as u64);
    }

    #[test]
    fn test_rar50_with_data_block() {
        let mut rar = RAR50_SIGNATURE.to_vec();
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[3, 1, 0, 0xAA]);
        // File block: size=4, type=2, flags=2 (data), data size=16.
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[4, 2, 2, 16]);
        rar.extend_from_slice(&[0x55u8; 17]); // 4+16 total - 3 parsed
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[3, 5, 0, 0xBB]);
        assert_eq!(scan(&rar).unwrap().size, rar.len() as u64);
    }

    #[test]
    fn test_rar50_varint_multibyte() {
        // Data size 300 = varint [0xAC, 0x02].
        let mut rar = RAR50_SIGNATURE.to_vec();
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[3, 1, 0, 0xAA]);
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[5, 2, 2, 0xAC, 0x02]);
        rar.extend_from_slice(&vec![0x55u8; 301]); // 5+300 total - 4 parsed
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[3, 5, 0, 0xBB]);
        assert_eq!(scan(&rar).unwrap().size, rar.len() as u64);
    }

    #[test]
    fn test_rar50_oversized_varint_rejected() {
        let mut rar = RAR50_SIGNATURE.to_vec();
        rar.extend_from_slice(&[0u8; 4]);
        rar.extend_from_slice(&[0x80u8; 11]); // never-ending varint
        assert!(matches!(scan(&rar), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_signature_rejected() {
        assert!(scan(b"Rat!\x1a\x07\x00........").is_err());
    }
}
