//! PCX validator.
//!
//! Uncompressed images have a computable size; RLE images are decoded
//! scanline by scanline to find where the pixel data ends. PCX v5 8-bpp
//! files may carry a trailing VGA palette announced by a 0x0C marker.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{ByteOrder, LittleEndian};

pub const PCX: FileHeader = FileHeader {
    ext: "pcx",
    description: "Picture Exchange Format",
    signatures: &[&[0x0A]],
    scan: scan_pcx,
};

fn reject(reason: String) -> CoreError {
    CoreError::InvalidFormat(format!("pcx: {reason}"))
}

/// Consume one RLE-compressed scanline for a single plane and return the
/// number of stream bytes it occupied.
fn read_rle_scanline(r: &mut CarveReader<'_>, expected_bytes: u16) -> Result<u64> {
    let mut bytes_read: u64 = 0;
    let mut decoded: u32 = 0;

    while decoded < u32::from(expected_bytes) {
        let b = r.read_byte()?;
        bytes_read += 1;

        if b & 0xC0 == 0xC0 {
            let run_length = u32::from(b & 0x3F);
            if run_length == 0 {
                return Err(reject("invalid RLE run length of 0".into()));
            }
            r.read_byte()?; // the repeated data byte
            bytes_read += 1;
            decoded += run_length;
        } else {
            decoded += 1;
        }
        // Some encoders let runs spill across scanline boundaries; being
        // strict here loses otherwise carvable files.
    }
    Ok(bytes_read)
}

pub fn scan_pcx(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut hdr = [0u8; 128];
    r.read_exact(&mut hdr)?;

    let manufacturer = hdr[0];
    let version = hdr[1];
    let encoding = hdr[2];
    let bits_per_pixel = hdr[3];
    let x_min = LittleEndian::read_u16(&hdr[4..6]);
    let y_min = LittleEndian::read_u16(&hdr[6..8]);
    let x_max = LittleEndian::read_u16(&hdr[8..10]);
    let y_max = LittleEndian::read_u16(&hdr[10..12]);
    let num_planes = hdr[65];
    let bytes_per_line = LittleEndian::read_u16(&hdr[66..68]);

    if manufacturer != 0x0A {
        return Err(reject(format!("invalid manufacturer ID: 0x{manufacturer:02X}")));
    }
    if encoding > 1 {
        return Err(reject(format!("unsupported encoding: {encoding}")));
    }
    match version {
        0 | 2 | 3 | 4 | 5 => {}
        v => return Err(reject(format!("unsupported version: {v}"))),
    }
    match bits_per_pixel {
        1 | 2 | 4 | 8 => {}
        b => return Err(reject(format!("unsupported bits per pixel: {b}"))),
    }
    if num_planes == 0 || num_planes > 4 {
        return Err(reject(format!("unsupported number of planes: {num_planes}")));
    }
    if x_max < x_min || y_max < y_min {
        return Err(reject("xmax < xmin or ymax < ymin".into()));
    }

    let width = u32::from(x_max) - u32::from(x_min) + 1;
    let height = u32::from(y_max) - u32::from(y_min) + 1;

    // BytesPerLine is the decoded scanline length for one plane, padded to
    // an even boundary.
    let mut computed_bpl = (width * u32::from(bits_per_pixel) + 7) / 8;
    if computed_bpl % 2 != 0 {
        computed_bpl += 1;
    }
    if u32::from(bytes_per_line) < computed_bpl {
        return Err(reject(format!(
            "bytes per line {bytes_per_line} below computed {computed_bpl}"
        )));
    }

    let mut total: u64 = 128;

    if encoding == 0 {
        let image_data = u64::from(bytes_per_line) * u64::from(num_planes) * u64::from(height);
        r.discard_exact(image_data)?;
        total += image_data;
    } else {
        for _y in 0..height {
            for _plane in 0..num_planes {
                total += read_rle_scanline(r, bytes_per_line)?;
            }
        }
    }

    // PCX v5 8bpp may end with a 0x0C marker followed by a 256-byte
    // palette; files without it are still complete.
    if version == 5 && bits_per_pixel == 8 {
        match r.read_byte() {
            Ok(marker) => {
                total += 1;
                if marker == 0x0C {
                    r.discard_exact(256)?;
                    total += 256;
                }
            }
            Err(CoreError::UnexpectedEof) => {}
            Err(err) => return Err(err),
        }
    }

    Ok(ScanResult::with_size(total))
}
