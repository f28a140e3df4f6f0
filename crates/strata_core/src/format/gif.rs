//! GIF validator.
//!
//! Parses the logical screen descriptor, then walks extension and image
//! blocks until the trailer. At least one image descriptor is required.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};

pub const GIF: FileHeader = FileHeader {
    ext: "gif",
    description: "Graphics Interchange Format",
    signatures: &[b"GIF87a", b"GIF89a"],
    scan: scan_gif,
};

// Section indicators.
const S_EXTENSION: u8 = 0x21;
const S_IMAGE_DESCRIPTOR: u8 = 0x2C;
const S_TRAILER: u8 = 0x3B;

// Extensions.
const E_TEXT: u8 = 0x01;
const E_GRAPHIC_CONTROL: u8 = 0xF9;
const E_COMMENT: u8 = 0xFE;
const E_APPLICATION: u8 = 0xFF;

const F_COLOR_TABLE: u8 = 1 << 7;
const F_COLOR_TABLE_BITS_MASK: u8 = 7;

struct GifDecoder {
    width: usize,
    height: usize,
    has_global_color_table: bool,
    data_parsed: bool,
    tmp: [u8; 1024], // holds up to a full 768-byte color table
}

pub fn scan_gif(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut d = GifDecoder {
        width: 0,
        height: 0,
        has_global_color_table: false,
        data_parsed: false,
        tmp: [0u8; 1024],
    };

    d.read_header_and_screen_descriptor(r)?;

    loop {
        let c = r.read_byte()?;
        match c {
            S_EXTENSION => d.read_extension(r)?,
            S_IMAGE_DESCRIPTOR => d.read_image_descriptor(r)?,
            S_TRAILER => {
                if !d.data_parsed {
                    return Err(CoreError::InvalidFormat("gif: missing image data".into()));
                }
                return Ok(ScanResult::with_size(r.bytes_read()));
            }
            c => {
                return Err(CoreError::InvalidFormat(format!(
                    "gif: unknown block type: 0x{c:02x}"
                )));
            }
        }
    }
}

impl GifDecoder {
    fn read_header_and_screen_descriptor(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        r.read_exact(&mut self.tmp[..13])?;
        if &self.tmp[..6] != b"GIF87a" && &self.tmp[..6] != b"GIF89a" {
            return Err(CoreError::InvalidFormat("gif: unrecognized version".into()));
        }

        self.width = usize::from(self.tmp[6]) | usize::from(self.tmp[7]) << 8;
        self.height = usize::from(self.tmp[8]) | usize::from(self.tmp[9]) << 8;

        let fields = self.tmp[10];
        if fields & F_COLOR_TABLE != 0 {
            self.has_global_color_table = true;
            self.skip_color_table(r, fields)?;
        }
        // tmp[11] is the background index and tmp[12] the pixel aspect
        // ratio; neither matters for carving.
        Ok(())
    }

    fn skip_color_table(&mut self, r: &mut CarveReader<'_>, fields: u8) -> Result<()> {
        let n = 1usize << (1 + (fields & F_COLOR_TABLE_BITS_MASK));
        r.read_exact(&mut self.tmp[..3 * n])?;
        Ok(())
    }

    fn read_extension(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        let extension = r.read_byte()?;
        let size = match extension {
            E_TEXT => 13,
            E_GRAPHIC_CONTROL => return self.read_graphic_control(r),
            E_COMMENT => 0, // nothing to do but consume the sub-blocks
            E_APPLICATION => {
                // The spec requires 11 here, but Adobe sometimes writes 10.
                usize::from(r.read_byte()?)
            }
            e => {
                return Err(CoreError::InvalidFormat(format!(
                    "gif: unknown extension 0x{e:02x}"
                )));
            }
        };
        if size > 0 {
            r.read_exact(&mut self.tmp[..size])?;
        }

        // A NETSCAPE2.0 application block carries the loop count in its
        // first sub-block; it is consumed like any other.
        loop {
            let n = self.read_block(r)?;
            if n == 0 {
                return Ok(());
            }
        }
    }

    fn read_graphic_control(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        r.read_exact(&mut self.tmp[..6])?;
        if self.tmp[0] != 4 {
            return Err(CoreError::InvalidFormat(format!(
                "gif: invalid graphic control block size: {}",
                self.tmp[0]
            )));
        }
        if self.tmp[5] != 0 {
            return Err(CoreError::InvalidFormat(format!(
                "gif: invalid graphic control terminator: {}",
                self.tmp[5]
            )));
        }
        Ok(())
    }

    fn read_image_descriptor(&mut self, r: &mut CarveReader<'_>) -> Result<()> {
        r.read_exact(&mut self.tmp[..9])?;
        let left = usize::from(self.tmp[0]) | usize::from(self.tmp[1]) << 8;
        let top = usize::from(self.tmp[2]) | usize::from(self.tmp[3]) << 8;
        let width = usize::from(self.tmp[4]) | usize::from(self.tmp[5]) << 8;
        let height = usize::from(self.tmp[6]) | usize::from(self.tmp[7]) << 8;
        let fields = self.tmp[8];

        // Each frame must fit within the logical screen (GIF89a section 20).
        if left + width > self.width || top + height > self.height {
            return Err(CoreError::InvalidFormat(
                "gif: frame bounds larger than image bounds".into(),
            ));
        }

        if fields & F_COLOR_TABLE != 0 {
            self.skip_color_table(r, fields)?;
        } else if !self.has_global_color_table {
            return Err(CoreError::InvalidFormat("gif: no color table".into()));
        }

        let lit_width = r.read_byte()?;
        if !(2..=8).contains(&lit_width) {
            return Err(CoreError::InvalidFormat(format!(
                "gif: pixel size out of range: {lit_width}"
            )));
        }

        // Consume the LZW-encoded sub-blocks.
        loop {
            let size = r.read_byte()?;
            if size == 0 {
                break;
            }
            r.discard_exact(u64::from(size))?;
        }

        self.data_parsed = true;
        Ok(())
    }

    /// Read one data sub-block. Returns its length; 0 is the chain
    /// terminator.
    fn read_block(&mut self, r: &mut CarveReader<'_>) -> Result<usize> {
        let n = usize::from(r.read_byte()?);
        if n == 0 {
            return Ok(0);
        }
        r.read_exact(&mut self.tmp[..n])?;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) fn minimal_gif() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"GIF89a");
    // Logical screen: 2x2, global color table of 2 entries.
    data.extend_from_slice(&[2, 0, 2, 0, 0x80, 0x00, 0x00]);
    data.extend_from_slice(&[0, 0, 0, 0xFF, 0xFF, 0xFF]); // color table
    // Image descriptor: full frame, no local table.
    data.push(0x2C);
    data.extend_from_slice(&[0, 0, 0, 0, 2, 0, 2, 0, 0x00]);
    data.push(2); // LZW minimum code size
    data.extend_from_slice(&[3, 0x44, 0x01, 0x05]); // one data sub-block
    data.push(0); // sub-block terminator
    data.push(0x3B); // trailer
    data
}
