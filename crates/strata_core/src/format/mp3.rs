//! MP3 validator.
//!
//! Accepts an optional ID3v2 prologue, then requires a run of at least two
//! consecutive valid Layer III frames. The stream ends at the first byte
//! that does not parse as a frame header.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::types::{FileHeader, ScanResult};
use byteorder::{BigEndian, ByteOrder};

pub const MP3: FileHeader = FileHeader {
    ext: "mp3",
    description: "MPEG Audio Layer III",
    signatures: &[
        &[0xFF, 0xFA],
        &[0xFF, 0xFB],
        &[0xFF, 0xF2],
        &[0xFF, 0xF3],
        &[0xFF, 0xE2],
        &[0xFF, 0xE3],
        b"ID3",
    ],
    scan: scan_mp3,
};

/// Frame size sanity bounds; frames outside this range are treated as false
/// positives rather than ends of stream.
const MIN_FRAME_SIZE: u32 = 100;
const MAX_FRAME_SIZE: u32 = 1500;

const MIN_REQUIRED_FRAMES: u32 = 2;

/// kbps tables for Layer III, indexed by the header's bitrate bits.
const BITRATE_MPEG1: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const BITRATE_MPEG2: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

/// Sample rates in Hz, indexed by [version bits][sample-rate bits].
const SAMPLE_RATES: [[u32; 4]; 4] = [
    [11025, 12000, 8000, 0],  // MPEG 2.5
    [0, 0, 0, 0],             // reserved
    [22050, 24000, 16000, 0], // MPEG 2
    [44100, 48000, 32000, 0], // MPEG 1
];

/// Parse a 4-byte frame header. Returns the full frame size in bytes, or
/// None when the bytes are not a valid Layer III header.
fn parse_frame_header(bytes: &[u8; 4]) -> Option<u32> {
    let header = BigEndian::read_u32(bytes);

    // Sync word: the top 11 bits must all be set.
    if header & 0xFFE0_0000 != 0xFFE0_0000 {
        return None;
    }

    let version_bits = (header >> 19) & 0x03;
    if version_bits == 1 {
        return None; // reserved version
    }
    let is_mpeg1 = version_bits == 3;

    // Layer bits: 01 is Layer III.
    if (header >> 17) & 0x03 != 1 {
        return None;
    }

    let bitrate_index = ((header >> 12) & 0x0F) as usize;
    if bitrate_index == 0 || bitrate_index == 15 {
        return None; // 'free' and 'bad'
    }
    let bitrate = if is_mpeg1 {
        BITRATE_MPEG1[bitrate_index]
    } else {
        BITRATE_MPEG2[bitrate_index]
    };

    let sample_rate_index = ((header >> 10) & 0x03) as usize;
    if sample_rate_index == 3 {
        return None; // reserved
    }
    let sample_rate = SAMPLE_RATES[version_bits as usize][sample_rate_index];
    if sample_rate == 0 {
        return None;
    }

    let padding = (header >> 9) & 0x01;

    // 1152 samples per Layer III frame; MPEG 2/2.5 frames carry half.
    let samples: u32 = if is_mpeg1 { 1152 } else { 576 };
    let frame_size = samples / 8 * bitrate * 1000 / sample_rate + padding;

    if frame_size <= 4 {
        return None;
    }
    Some(frame_size)
}

/// Skip an ID3v2 tag if one starts at the current position. Returns the
/// number of bytes skipped.
fn skip_id3v2(r: &mut CarveReader<'_>) -> Result<u64> {
    let header = match r.peek(10) {
        Ok(h) => h,
        Err(CoreError::UnexpectedEof) => return Ok(0),
        Err(err) => return Err(err),
    };
    if &header[..3] != b"ID3" {
        return Ok(0);
    }

    // Tag size is a 28-bit synchsafe integer over bytes 6..10.
    let tag_size = (u64::from(header[6] & 0x7F) << 21)
        | (u64::from(header[7] & 0x7F) << 14)
        | (u64::from(header[8] & 0x7F) << 7)
        | u64::from(header[9] & 0x7F);

    let total = 10 + tag_size;
    r.discard_exact(total)?;
    Ok(total)
}

pub fn scan_mp3(r: &mut CarveReader<'_>) -> Result<ScanResult> {
    let mut n = skip_id3v2(r)?;

    let mut header = [0u8; 4];
    let mut frames: u32 = 0;

    loop {
        if r.read(&mut header)? < 4 {
            break;
        }
        let Some(frame_size) = parse_frame_header(&header) else {
            // The contiguous stream ends at the first invalid header.
            break;
        };
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size) {
            return Err(CoreError::InvalidFormat(format!(
                "implausible mp3 frame size: {frame_size}"
            )));
        }
        r.discard_exact(u64::from(frame_size) - 4)?;
        n += u64::from(frame_size);
        frames += 1;
    }

    // A single frame is very often a false positive.
    if frames < MIN_REQUIRED_FRAMES {
        return Err(CoreError::InvalidFormat(format!(
            "mp3 stream too short: {frames} frames"
        )));
    }
    Ok(ScanResult::with_size(n))
}

/// Build one MPEG-1 Layer III frame: 160 kbps, 44.1 kHz, no padding, which
/// works out to exactly 522 bytes.
#[cfg(test)]
pub(crate) fn test_frame() -> Vec<u8> {
    let mut frame = vec![0xFF, 0xFB, 0xA0, 0x00];
    frame.resize(522, 0x00);
    frame
}
