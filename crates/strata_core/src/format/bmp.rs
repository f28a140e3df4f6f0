//! BMP validator.
//!
//! The carved size comes straight from the file header, so the validation
//! effort goes into cross-checking the headers against each other to keep
//! false positives out: palette-aware data offsets, scanline padding, and the
//! declared image size all have to agree.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{ByteOrder, LittleEndian};

pub const BMP: FileHeader = FileHeader {
    ext: "bmp",
    description: "Bitmap Image File Format",
    signatures: &[b"BM"],
    scan: scan_bmp,
};

// BMP compression types.
const BI_RGB: u32 = 0;
const BI_RLE8: u32 = 1;
const BI_RLE4: u32 = 2;
const BI_BITFIELDS: u32 = 3;
const BI_JPEG: u32 = 4;
const BI_PNG: u32 = 5;
const BI_ALPHABITFIELDS: u32 = 6;
const BI_CMYK: u32 = 11;
const BI_CMYKRLE8: u32 = 12;
const BI_CMYKRLE4: u32 = 13;

fn reject(reason: &str) -> CoreError {
    CoreError::InvalidFormat(format!("bmp: {reason}"))
}

pub fn scan_bmp(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    // BITMAPFILEHEADER, 14 bytes.
    let mut file_hdr = [0u8; 14];
    r.read_exact(&mut file_hdr)?;

    if &file_hdr[..2] != b"BM" {
        return Err(reject("invalid signature"));
    }
    let file_size = LittleEndian::read_u32(&file_hdr[2..6]);
    let reserved1 = LittleEndian::read_u16(&file_hdr[6..8]);
    let reserved2 = LittleEndian::read_u16(&file_hdr[8..10]);
    let data_offset = LittleEndian::read_u32(&file_hdr[10..14]);

    if reserved1 != 0 || reserved2 != 0 {
        return Err(reject("reserved fields are not zero"));
    }
    if file_size < 14 + 40 {
        return Err(reject("declared size too small for headers"));
    }
    if data_offset < 14 {
        return Err(reject("data offset inside file header"));
    }

    // DIB header: size field first, then the variant-dependent remainder.
    let mut dib = [0u8; 124];
    r.read_exact(&mut dib[..4])?;
    let header_size = LittleEndian::read_u32(&dib[..4]);
    match header_size {
        12 | 40 | 64 | 108 | 124 => {}
        n => return Err(reject(&format!("unsupported DIB header size: {n}"))),
    }
    r.read_exact(&mut dib[4..header_size as usize])?;

    let (width, height, planes, bpp, compression, image_size) = if header_size == 12 {
        // BITMAPCOREHEADER: 16-bit dimensions, no compression field.
        (
            i32::from(LittleEndian::read_u16(&dib[4..6])),
            i32::from(LittleEndian::read_u16(&dib[6..8])),
            LittleEndian::read_u16(&dib[8..10]),
            LittleEndian::read_u16(&dib[10..12]),
            BI_RGB,
            0u32,
        )
    } else {
        (
            LittleEndian::read_i32(&dib[4..8]),
            LittleEndian::read_i32(&dib[8..12]),
            LittleEndian::read_u16(&dib[12..14]),
            LittleEndian::read_u16(&dib[14..16]),
            LittleEndian::read_u32(&dib[16..20]),
            LittleEndian::read_u32(&dib[20..24]),
        )
    };
    let colors_used = if header_size >= 40 {
        LittleEndian::read_u32(&dib[32..36])
    } else {
        0
    };

    if planes != 1 {
        return Err(reject("number of planes must be 1"));
    }
    match bpp {
        1 | 4 | 8 | 16 | 24 | 32 => {}
        n => return Err(reject(&format!("unsupported bits per pixel: {n}"))),
    }
    match compression {
        BI_RGB | BI_RLE8 | BI_RLE4 | BI_BITFIELDS | BI_JPEG | BI_PNG | BI_ALPHABITFIELDS
        | BI_CMYK | BI_CMYKRLE8 | BI_CMYKRLE4 => {}
        n => return Err(reject(&format!("unrecognized compression type: {n}"))),
    }
    // Height may be negative for top-down rows; zero never is valid.
    if width <= 0 || height == 0 {
        return Err(reject("invalid image dimensions"));
    }

    // Indexed images carry a palette between the DIB header and the pixel
    // data; the data offset must leave room for it.
    let mut expected_min_data_offset = 14 + header_size;
    if bpp <= 8 {
        let palette_entries = if colors_used == 0 {
            1u32 << bpp
        } else {
            colors_used
        };
        expected_min_data_offset += palette_entries * 4;
    }
    if data_offset < expected_min_data_offset {
        return Err(reject("data offset overlaps headers or palette"));
    }

    // Rows are padded to 4-byte multiples.
    let row_size = match bpp {
        1 => (width as u32 + 7) / 8,
        4 => (width as u32 + 1) / 2,
        _ => width as u32 * u32::from(bpp / 8),
    };
    let padded_row_size = (row_size + 3) & !3;
    let abs_height = height.unsigned_abs();
    let expected_image_data_size = padded_row_size * abs_height;

    if image_size != 0 && compression == BI_RGB && image_size < expected_image_data_size {
        return Err(reject("declared image size below computed minimum"));
    }

    let actual_image_data_size = if compression == BI_RGB {
        expected_image_data_size
    } else {
        image_size
    };
    let expected_total = u64::from(data_offset) + u64::from(actual_image_data_size);
    if u64::from(file_size) < expected_total {
        return Err(reject("declared file size below data offset + image data"));
    }

    Ok(ScanResult::with_size(u64::from(file_size)))
}

#[cfg(test)]
pub(crate) fn minimal_bmp() -> Vec<u8> {
    // 2x2, 24bpp, BI_RGB. Rows pad to 8 bytes; data size 16.
    let data_offset: u32 = 14 + 40;
    let file_size: u32 = data_offset + 16;
    let mut data = Vec::new();
    data.extend_from_slice(b"BM");
    data.extend_from_slice(&file_size.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&data_offset.to_le_bytes());
    // BITMAPINFOHEADER
    data.extend_from_slice(&40u32.to_le_bytes());
    data.extend_from_slice(&2i32.to_le_bytes()); // width
    data.extend_from_slice(&2i32.to_le_bytes()); // height
    data.extend_from_slice(&1u16.to_le_bytes()); // planes
    data.extend_from_slice(&24u16.to_le_bytes()); // bpp
    data.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    data.extend_from_slice(&0u32.to_le_bytes()); // image size (may be 0)
    data.extend_from_slice(&0i32.to_le_bytes());
    data.extend_from_slice(&0i32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&[0x7Fu8; 16]); // pixel rows
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Result<ScanResult> {
        let mut r = CarveReader::new(&[], &data, 0, u64::MAX);
        scan_bmp(&mut r)
    }

    #[test]
    fn test_minimal_bmp_size() {
        let bmp = minimal_bmp();
        assert_eq!(scan(&bmp).unwrap().size, bmp.len() as u64);
    }

    #[test]
    fn test_reserved_fields_must_be_zero() {
        let mut bmp = minimal_bmp();
        bmp[6] = 1;
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut bmp = minimal_bmp();
        bmp[0] = b'X';
        assert!(scan(&bmp).is_err());
    }

    #[test]
    fn test_unsupported_dib_size_rejected() {
        let mut bmp = minimal_bmp();
        bmp[14..18].copy_from_slice(&39u32.to_le_bytes());
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_compression_rejected() {
        let mut bmp = minimal_bmp();
        bmp[30..34].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_zero_width_rejected() {
        let mut bmp = minimal_bmp();
        bmp[18..22].copy_from_slice(&0i32.to_le_bytes());
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_palette_aware_data_offset() {
        // 8bpp with colors_used == 0 implies a 1024-byte palette; a data
        // offset of 54 cannot be right.
        let mut bmp = minimal_bmp();
        bmp[28..30].copy_from_slice(&8u16.to_le_bytes());
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_file_size_smaller_than_content_rejected() {
        let mut bmp = minimal_bmp();
        bmp[2..6].copy_from_slice(&60u32.to_le_bytes()); // < 54 + 16
        assert!(matches!(scan(&bmp), Err(CoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_negative_height_top_down_accepted() {
        let mut bmp = minimal_bmp();
        bmp[22..26].copy_from_slice(&(-2i32).to_le_bytes());
        assert_eq!(scan(&bmp).unwrap().size, bmp.len() as u64);
    }
}
