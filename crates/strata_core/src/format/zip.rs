//! ZIP / OOXML validator.
//!
//! Walks local file entries up to the central directory, then locates the
//! end-of-central-directory record to size the archive. Filenames seen along
//! the way promote the extension to docx/pptx/xlsx for Office documents.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::seek::seek_to;
use crate::types::{FileHeader, ScanResult};
use byteorder::{ByteOrder, LittleEndian};

pub const ZIP: FileHeader = FileHeader {
    ext: "zip",
    description: "ZIP archive (and OOXML documents)",
    signatures: &[
        b"PK\x03\x04",
        b"PK00PK\x03\x04", // WinZIP v8 self-extracting prefix
    ],
    scan: scan_zip,
};

/// Window for locating a data descriptor when entry sizes are not declared
/// inline. Kept at the format's 4 GiB entry ceiling for compatibility.
pub const MAX_ZIP_ENTRY_SIZE: u64 = u32::MAX as u64;

/// The end-of-central-directory record must sit within this distance of the
/// central directory start (max comment length plus slack).
const EOCD_SEARCH_WINDOW: u64 = 66 * 1024;

const LOCAL_ENTRY_SIG: u32 = 0x0403_4B50; // PK\x03\x04
const CENTRAL_DIR_SIG: u32 = 0x0201_4B50; // PK\x01\x02
const DATA_DESCRIPTOR_SIG: &[u8] = b"PK\x07\x08";
const EOCD_SIG: &[u8] = b"PK\x05\x06";

fn reject(reason: &str) -> CoreError {
    CoreError::InvalidFormat(format!("zip: {reason}"))
}

/// Filename sightings that identify an OOXML package.
#[derive(Default)]
struct ZipDecoder {
    content_types_seen: bool,
    rels_seen: bool,
    word_document_seen: bool,
    ppt_presentation_seen: bool,
    xl_workbook_seen: bool,
}

impl ZipDecoder {
    fn process_file_name(&mut self, name: &[u8]) {
        match name {
            b"[Content_Types].xml" => self.content_types_seen = true,
            b"_rels/.rels" => self.rels_seen = true,
            b"word/document.xml" => self.word_document_seen = true,
            b"ppt/presentation.xml" => self.ppt_presentation_seen = true,
            b"xl/workbook.xml" => self.xl_workbook_seen = true,
            _ => {}
        }
    }

    fn infer_ext(&self) -> &'static str {
        let is_office = self.content_types_seen && self.rels_seen;
        if is_office && self.word_document_seen {
            "docx"
        } else if is_office && self.ppt_presentation_seen {
            "pptx"
        } else if is_office && self.xl_workbook_seen {
            "xlsx"
        } else {
            "zip"
        }
    }

    /// Parse one local file entry; the 4-byte signature has already been
    /// consumed by the caller.
    fn parse_local_entry(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        let mut fixed = [0u8; 26];
        r.read_exact(&mut fixed)?;

        let flags = LittleEndian::read_u16(&fixed[2..4]);
        let compression = LittleEndian::read_u16(&fixed[4..6]);
        let compressed_size = LittleEndian::read_u32(&fixed[14..18]);
        let uncompressed_size = LittleEndian::read_u32(&fixed[18..22]);
        let filename_len = LittleEndian::read_u16(&fixed[22..24]);
        let extra_len = LittleEndian::read_u16(&fixed[24..26]);

        let mut name = vec![0u8; usize::from(filename_len)];
        r.read_exact(&mut name)?;
        self.process_file_name(&name);

        if extra_len > 0 {
            r.discard_exact(u64::from(extra_len))?;
        }

        let size = if compression != 0 {
            compressed_size
        } else {
            uncompressed_size
        };

        let has_descriptor = flags & 0x0008 != 0;
        if has_descriptor && size != 0 {
            // Sizes are written as zero when a descriptor follows the data.
            return Err(reject("descriptor flag set with non-zero sizes"));
        }

        if has_descriptor {
            // Find the descriptor signature and take its 12 byte payload at
            // face value; carving does not verify CRCs or sizes.
            if !seek_to(r, DATA_DESCRIPTOR_SIG, MAX_ZIP_ENTRY_SIZE)? {
                return Err(reject("entry data descriptor not found"));
            }
            let mut desc = [0u8; 16];
            r.read_exact(&mut desc)?;
            if &desc[..4] != DATA_DESCRIPTOR_SIG {
                return Err(reject("misaligned data descriptor"));
            }
        } else if size > 0 {
            r.discard_exact(u64::from(size))?;
        }
        Ok(())
    }
}

/// Locate the EOCD record and return the archive size: everything read so
/// far plus the trailing comment.
fn parse_central_dir(r: &mut CarveReader<'_>) -> Result<u64> {
    if !seek_to(r, EOCD_SIG, EOCD_SEARCH_WINDOW)? {
        return Err(reject("end of central directory not found"));
    }
    // Signature plus the 18 fixed bytes that follow it.
    let mut eocd = [0u8; 22];
    r.read_exact(&mut eocd)?;
    let comment_len = LittleEndian::read_u16(&eocd[20..22]);
    Ok(r.bytes_read() + u64::from(comment_len))
}

pub fn scan_zip(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    // A WinZIP v8 archive prepends "PK00" to the ordinary local header.
    let head = r.peek(4)?;
    if head == b"PK00" {
        r.discard_exact(4)?;
    }

    let mut dec = ZipDecoder::default();
    let mut entries = 0u32;
    let mut sig = [0u8; 4];

    loop {
        r.read_exact(&mut sig)?;
        match LittleEndian::read_u32(&sig) {
            LOCAL_ENTRY_SIG => {
                dec.parse_local_entry(r)?;
                entries += 1;
            }
            CENTRAL_DIR_SIG => {
                if entries == 0 {
                    return Err(reject("archive contains no file entries"));
                }
                let size = parse_central_dir(r)?;
                return Ok(ScanResult {
                    size,
                    ext: Some(dec.infer_ext()),
                    name: None,
                });
            }
            _ => return Err(reject("unexpected top-level signature")),
        }
    }
}

#[cfg(test)]
pub(crate) mod testdata {
    /// Build a stored (uncompressed) local file entry.
    pub fn local_entry(name: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(name);
        out.extend_from_slice(data);
        out
    }

    /// Minimal central directory header for one entry.
    pub fn central_entry(name: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&[0u8; 24]); // versions, flags, sizes, crc
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 16]); // extra/comment/disk/attrs/offset
        out.extend_from_slice(name);
        out
    }

    pub fn eocd(comment: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        out.extend_from_slice(comment);
        out
    }

    /// A complete archive of stored entries.
    pub fn archive(files: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in files {
            out.extend_from_slice(&local_entry(name, data));
        }
        for (name, _) in files {
            out.extend_from_slice(&central_entry(name));
        }
        out.extend_from_slice(&eocd(b""));
        out
    }
}
