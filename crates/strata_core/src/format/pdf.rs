//! PDF validator.
//!
//! PDFs may carry several `%%EOF` markers (incremental updates); the carved
//! size is the end of the last one found within the search window. This is a
//! carving heuristic, not PDF conformance.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::seek::seek_to;
use crate::types::{FileHeader, ScanResult};

pub const PDF: FileHeader = FileHeader {
    ext: "pdf",
    description: "Portable Document Format",
    signatures: &[b"%PDF-"],
    scan: scan_pdf,
};

const EOF_MARKER: &[u8] = b"%%EOF";

/// How far past each marker the search keeps going for a later one.
const PDF_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

pub fn scan_pdf(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut header = [0u8; 5];
    r.read_exact(&mut header)?;
    if &header != b"%PDF-" {
        return Err(CoreError::InvalidFormat("not a pdf file".into()));
    }

    let mut size: u64 = 0;
    loop {
        if !seek_to(r, EOF_MARKER, PDF_MAX_FILE_SIZE)? {
            break;
        }
        r.discard_exact(EOF_MARKER.len() as u64)?;
        size = r.bytes_read();
    }

    if size == 0 {
        return Err(CoreError::InvalidFormat("no %%EOF marker found".into()));
    }
    Ok(ScanResult::with_size(size))
}

#[cfg(test)]
pub(crate) fn minimal_pdf() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"%PDF-1.4\n");
    data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    data.extend_from_slice(b"xref\n0 1\ntrailer\n<< /Size 1 >>\nstartxref\n9\n");
    data.extend_from_slice(b"%%EOF\n");
    data
}
