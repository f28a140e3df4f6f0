//! Interior-marker search over a bounded reader.
//!
//! Validators that need to locate a marker somewhere ahead of the current
//! position (PDF `%%EOF`, the ZIP end-of-central-directory and data-descriptor
//! signatures) use [`seek_to`] rather than scanning byte by byte.

use crate::error::Result;
use crate::reader::CarveReader;
use memchr::memmem;

/// Advance `r` until `target` starts at the current position, searching no
/// more than roughly `window` bytes ahead. The last `target.len() - 1` bytes
/// of each refill stay buffered so a target straddling the reader's internal
/// window boundary is still found.
///
/// Returns true with the reader positioned exactly at the first byte of the
/// target, or false with the reader at end-of-stream or past the window.
pub fn seek_to(r: &mut CarveReader<'_>, target: &[u8], window: u64) -> Result<bool> {
    if target.is_empty() {
        return Ok(true);
    }
    debug_assert!(target.len() < r.capacity());

    let pad = (target.len() - 1) as u64;
    let finder = memmem::Finder::new(target);

    let mut scanned: u64 = 0;
    while scanned < window {
        let chunk = r.fill_buf()?;
        let m = chunk.len() as u64;
        if let Some(idx) = finder.find(chunk) {
            r.discard(idx as u64)?;
            return Ok(true);
        }

        // Consume all but the trailing target-sized tail, which may be the
        // beginning of a match completed by the next refill.
        let advance = m.saturating_sub(pad);
        if advance == 0 {
            // End of stream: nothing left beyond the unmatched tail.
            r.discard(m)?;
            break;
        }
        r.discard(advance)?;
        scanned += advance;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8]) -> CarveReader<'_> {
        CarveReader::new(&[], &data, 0, u64::MAX)
    }

    #[test]
    fn test_finds_target_and_positions_reader() {
        let mut data = vec![0u8; 1000];
        data.extend_from_slice(b"%%EOF");
        data.extend_from_slice(&[0u8; 50]);

        let mut r = reader(&data);
        assert!(seek_to(&mut r, b"%%EOF", 1 << 20).unwrap());
        assert_eq!(r.bytes_read(), 1000);

        let mut magic = [0u8; 5];
        r.read_exact(&mut magic).unwrap();
        assert_eq!(&magic, b"%%EOF");
    }

    #[test]
    fn test_target_straddles_window_boundary() {
        // Place the marker across the reader's 4096-byte refill boundary.
        let mut data = vec![0u8; 4094];
        data.extend_from_slice(b"PK\x07\x08");
        data.extend_from_slice(&[0xAA; 64]);

        let mut r = reader(&data);
        assert!(seek_to(&mut r, b"PK\x07\x08", 1 << 20).unwrap());
        assert_eq!(r.bytes_read(), 4094);
    }

    #[test]
    fn test_not_found_within_window() {
        let mut data = vec![0u8; 10_000];
        data.extend_from_slice(b"MARK");

        let mut r = reader(&data);
        assert!(!seek_to(&mut r, b"MARK", 1024).unwrap());
        // Reader advanced past the window, not to the target.
        assert!(r.bytes_read() < 10_000);
    }

    #[test]
    fn test_not_found_reaches_eof() {
        let data = vec![0x11u8; 500];
        let mut r = reader(&data);
        assert!(!seek_to(&mut r, b"%%EOF", 1 << 20).unwrap());
        assert_eq!(r.bytes_read(), 500);
    }

    #[test]
    fn test_target_at_current_position() {
        let data = b"MARKER and the rest".to_vec();
        let mut r = reader(&data);
        assert!(seek_to(&mut r, b"MARKER", 100).unwrap());
        assert_eq!(r.bytes_read(), 0);
    }

    #[test]
    fn test_repeated_seeks_find_successive_markers() {
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&[0u8; 300]);
            data.extend_from_slice(b"%%EOF");
        }

        let mut r = reader(&data);
        let mut positions = Vec::new();
        while seek_to(&mut r, b"%%EOF", 1 << 20).unwrap() {
            positions.push(r.bytes_read());
            r.discard(5).unwrap();
        }
        assert_eq!(positions, vec![300, 605, 910]);
    }
}
