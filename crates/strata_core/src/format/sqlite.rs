//! SQLite validator.
//!
//! The 100-byte database header declares the page size and page count; when
//! the change counters agree the product is the exact file size. Databases
//! written by very old SQLite versions leave the page count stale, in which
//! case no size can be trusted and the candidate is rejected.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{BigEndian, ByteOrder};

pub const SQLITE: FileHeader = FileHeader {
    ext: "sqlite",
    description: "SQLite 3 database",
    signatures: &[b"SQLite format 3\x00"],
    scan: scan_sqlite,
};

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\x00";

pub fn scan_sqlite(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    // Header layout (https://www.sqlite.org/fileformat2.html):
    //   0..16   magic
    //   16..18  page size (big-endian; 1 encodes 65536)
    //   24..28  file change counter
    //   28..32  database size in pages
    //   92..96  version-valid-for number
    let mut hdr = [0u8; 100];
    r.read_exact(&mut hdr)?;

    if &hdr[..SQLITE_MAGIC.len()] != SQLITE_MAGIC {
        return Err(CoreError::InvalidFormat("invalid SQLite magic".into()));
    }

    let raw_page_size = BigEndian::read_u16(&hdr[16..18]);
    let page_size: u64 = if raw_page_size == 1 {
        65536
    } else {
        let ps = u64::from(raw_page_size);
        if !ps.is_power_of_two() || !(512..=32768).contains(&ps) {
            return Err(CoreError::InvalidFormat(format!(
                "invalid SQLite page size: {ps}"
            )));
        }
        ps
    };

    let file_change_counter = BigEndian::read_u32(&hdr[24..28]);
    let file_size_in_pages = BigEndian::read_u32(&hdr[28..32]);
    let version_valid_for = BigEndian::read_u32(&hdr[92..96]);

    let size = if file_size_in_pages != 0 && file_change_counter == version_valid_for {
        u64::from(file_size_in_pages) * page_size
    } else {
        0
    };
    // A zero size is handed back as-is; the engine treats it as a rejection.
    Ok(ScanResult::with_size(size))
}

#[cfg(test)]
pub(crate) fn minimal_sqlite(pages: u32, page_size: u16) -> Vec<u8> {
    let real_page_size: u64 = if page_size == 1 {
        65536
    } else {
        u64::from(page_size)
    };
    let mut data = vec![0u8; (u64::from(pages) * real_page_size) as usize];
    data[..16].copy_from_slice(SQLITE_MAGIC);
    data[16..18].copy_from_slice(&page_size.to_be_bytes());
    data[24..28].copy_from_slice(&7u32.to_be_bytes()); // change counter
    data[28..32].copy_from_slice(&pages.to_be_bytes());
    data[92..96].copy_from_slice(&7u32.to_be_bytes()); // version valid for
    data
}
