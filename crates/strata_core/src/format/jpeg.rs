//! JPEG validator.
//!
//! Walks the marker stream the way libjpeg's `next_marker` does: extraneous
//! non-marker bytes, `FF 00` stuffing and `FF` fill bytes are tolerated,
//! restart markers are skipped, and the file ends at the EOI marker.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};

pub const JPEG: FileHeader = FileHeader {
    ext: "jpeg",
    description: "JPEG image data",
    signatures: &[&[0xFF, 0xD8, 0xFF]],
    scan: scan_jpeg,
};

const SOF0: u8 = 0xC0; // Start Of Frame (baseline sequential)
const SOF1: u8 = 0xC1; // Start Of Frame (extended sequential)
const SOF2: u8 = 0xC2; // Start Of Frame (progressive)
const DHT: u8 = 0xC4; // Define Huffman Table
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8; // Start Of Image
const EOI: u8 = 0xD9; // End Of Image
const SOS: u8 = 0xDA; // Start Of Scan
const DQT: u8 = 0xDB; // Define Quantization Table
const DRI: u8 = 0xDD; // Define Restart Interval
const APP0: u8 = 0xE0;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

pub fn scan_jpeg(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut tmp = [0u8; 2];
    r.read_exact(&mut tmp)?;
    if tmp[0] != 0xFF || tmp[1] != SOI {
        return Err(CoreError::InvalidFormat("missing SOI marker".into()));
    }

    loop {
        r.read_exact(&mut tmp)?;
        while tmp[0] != 0xFF {
            // libjpeg is liberal here: non-marker bytes between segments are
            // extraneous data and silently skipped.
            tmp[0] = tmp[1];
            tmp[1] = r.read_byte()?;
        }
        let mut marker = tmp[1];
        if marker == 0 {
            // "\xFF\x00" is byte stuffing inside entropy-coded data.
            continue;
        }
        while marker == 0xFF {
            // Any marker may be preceded by fill bytes (B.1.1.2).
            marker = r.read_byte()?;
        }
        if marker == EOI {
            return Ok(ScanResult::with_size(r.bytes_read()));
        }
        if (RST0..=RST7).contains(&marker) {
            // Restart markers carry no length field.
            continue;
        }

        r.read_exact(&mut tmp)?;
        let len = i32::from(tmp[0]) << 8 | i32::from(tmp[1]);
        let payload = len - 2;
        if payload < 0 {
            return Err(CoreError::InvalidFormat("short segment length".into()));
        }

        match marker {
            SOF0 | SOF1 | SOF2 | DHT | DQT | SOS | DRI => {
                r.discard_exact(payload as u64)?;
            }
            m if (APP0..=APP15).contains(&m) || m == COM => {
                r.discard_exact(payload as u64)?;
            }
            m => {
                return Err(CoreError::InvalidFormat(format!(
                    "unknown marker 0x{m:02x}"
                )));
            }
        }
    }
}
