//! Bounded streaming reader handed to format validators.
//!
//! A `CarveReader` presents one forward byte stream that spans the in-memory
//! tail of the scan buffer followed by the remainder of the source, capped at
//! a hard byte budget. Validators never see the buffer boundary and can never
//! read more than the budget allows.

use crate::error::{CoreError, Result};
use crate::types::BlockSource;

/// Size of the reader's internal refill window. Large enough for every fixed
/// header a validator peeks at, small enough to live per-candidate.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub struct CarveReader<'a> {
    prefix: &'a [u8],
    source: &'a dyn BlockSource,
    /// Absolute offset in `source` where the post-buffer part of the stream begins.
    source_base: u64,
    /// Total logical length of the stream: min(budget, prefix + source remainder).
    len: u64,
    /// Logical offset of the next unconsumed byte. Doubles as `bytes_read`.
    pos: u64,
    buf: Vec<u8>,
    /// Logical offset of `buf[0]`. Invariant: `pos == win_start + consumed`.
    win_start: u64,
    filled: usize,
    consumed: usize,
}

impl<'a> CarveReader<'a> {
    pub fn new(
        prefix: &'a [u8],
        source: &'a dyn BlockSource,
        source_base: u64,
        budget: u64,
    ) -> Self {
        Self::with_capacity(prefix, source, source_base, budget, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_capacity(
        prefix: &'a [u8],
        source: &'a dyn BlockSource,
        source_base: u64,
        budget: u64,
        capacity: usize,
    ) -> Self {
        let source_tail = source.size().saturating_sub(source_base);
        let len = budget.min((prefix.len() as u64).saturating_add(source_tail));
        Self {
            prefix,
            source,
            source_base,
            len,
            pos: 0,
            buf: vec![0u8; capacity.max(64)],
            win_start: 0,
            filled: 0,
            consumed: 0,
        }
    }

    /// Bytes yielded to the caller since construction, including discarded ones.
    #[inline]
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.pos
    }

    /// Capacity of the internal window; the upper bound for `peek`.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn available(&self) -> usize {
        self.filled - self.consumed
    }

    #[inline]
    fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    /// Copy bytes of the composite stream starting at logical offset `at`
    /// into `buf[dst..end]`. Serves the prefix slice first, then the source.
    fn read_composite(&mut self, at: u64, dst: usize, end: usize) -> Result<usize> {
        let plen = self.prefix.len() as u64;
        if at < plen {
            let start = at as usize;
            let take = (self.prefix.len() - start).min(end - dst);
            self.buf[dst..dst + take].copy_from_slice(&self.prefix[start..start + take]);
            Ok(take)
        } else {
            let src = self.source;
            src.read_at(self.source_base + (at - plen), &mut self.buf[dst..end])
        }
    }

    fn fill_more(&mut self) -> Result<usize> {
        let window_budget = usize::try_from(self.len - self.win_start).unwrap_or(usize::MAX);
        let cap_end = self.buf.len().min(window_budget);
        let mut added = 0;
        while self.filled + added < cap_end {
            let at = self.win_start + (self.filled + added) as u64;
            let n = self.read_composite(at, self.filled + added, cap_end)?;
            if n == 0 {
                break;
            }
            added += n;
        }
        self.filled += added;
        Ok(added)
    }

    /// Make at least `n` bytes available without consuming them, compacting
    /// the window if needed. Returns the number actually available, which is
    /// smaller than `n` only at end of stream.
    fn ensure(&mut self, n: usize) -> Result<usize> {
        debug_assert!(n <= self.buf.len());
        if self.available() >= n {
            return Ok(self.available());
        }
        if self.consumed > 0 {
            self.buf.copy_within(self.consumed..self.filled, 0);
            self.win_start += self.consumed as u64;
            self.filled -= self.consumed;
            self.consumed = 0;
        }
        while self.available() < n {
            if self.fill_more()? == 0 {
                break;
            }
        }
        Ok(self.available())
    }

    /// Expose the next `n` bytes without advancing. `n` must not exceed
    /// [`capacity`](Self::capacity); fewer than `n` bytes remaining is an
    /// end-of-data error.
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        if self.ensure(n)? < n {
            return Err(CoreError::UnexpectedEof);
        }
        Ok(&self.buf[self.consumed..self.consumed + n])
    }

    /// Fill and expose the whole internal window at the current position.
    /// Returns an empty slice at end of stream. Used by the signature seeker.
    pub fn fill_buf(&mut self) -> Result<&[u8]> {
        let cap = self.buf.len();
        self.ensure(cap)?;
        Ok(&self.buf[self.consumed..self.filled])
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        if self.ensure(1)? == 0 {
            return Err(CoreError::UnexpectedEof);
        }
        let b = self.buf[self.consumed];
        self.consumed += 1;
        self.pos += 1;
        Ok(b)
    }

    /// Consume up to `out.len()` bytes. Returns 0 only at end of stream.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            if self.available() == 0 && self.ensure(1)? == 0 {
                break;
            }
            let take = self.available().min(out.len() - copied);
            out[copied..copied + take]
                .copy_from_slice(&self.buf[self.consumed..self.consumed + take]);
            self.consumed += take;
            self.pos += take as u64;
            copied += take;
        }
        Ok(copied)
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        if self.read(out)? < out.len() {
            return Err(CoreError::UnexpectedEof);
        }
        Ok(())
    }

    /// Skip `n` bytes forward. Past the buffered window this is a pure seek:
    /// no bytes are copied. Returns the number actually skipped, which is
    /// less than `n` only when the stream (or the budget) ends first.
    pub fn discard(&mut self, n: u64) -> Result<u64> {
        let want = n.min(self.remaining());
        let from_buf = (self.available() as u64).min(want);
        self.consumed += from_buf as usize;
        self.pos += from_buf;

        let rest = want - from_buf;
        if rest > 0 {
            self.pos += rest;
            self.win_start = self.pos;
            self.filled = 0;
            self.consumed = 0;
        }
        Ok(want)
    }

    pub fn discard_exact(&mut self, n: u64) -> Result<()> {
        if self.discard(n)? < n {
            return Err(CoreError::UnexpectedEof);
        }
        Ok(())
    }

    /// Rewind the logical cursor by `n` bytes. Only spans still inside the
    /// internal window can be unread; format dispatch uses this to let a
    /// validator re-observe its magic bytes.
    pub fn unread(&mut self, n: usize) -> Result<()> {
        if n > self.consumed {
            return Err(CoreError::InvalidFormat(
                "cannot unread past the buffered window".into(),
            ));
        }
        self.consumed -= n;
        self.pos -= n as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader<'a>(prefix: &'a [u8], source: &'a &'a [u8], budget: u64) -> CarveReader<'a> {
        CarveReader::new(prefix, source, 0, budget)
    }

    #[test]
    fn test_read_spans_prefix_and_source() {
        let prefix = [1u8, 2, 3];
        let source = [4u8, 5, 6, 7];
        let source_ref: &[u8] = &source;
        let mut r = reader(&prefix, &source_ref, u64::MAX);

        let mut buf = [0u8; 7];
        assert_eq!(r.read(&mut buf).unwrap(), 7);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(r.bytes_read(), 7);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_boundary_straddling_read() {
        // A single read_exact crossing the prefix/source boundary must be
        // invisible to the caller.
        let prefix: Vec<u8> = (0u8..10).collect();
        let source: Vec<u8> = (10u8..20).collect();
        let source_ref: &[u8] = &source;
        let mut r = reader(&prefix, &source_ref, u64::MAX);

        let mut buf = [0u8; 15];
        r.read_exact(&mut buf).unwrap();
        let expected: Vec<u8> = (0u8..15).collect();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_budget_caps_stream() {
        let source: Vec<u8> = vec![0xAB; 100];
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, 10);

        let mut buf = [0u8; 64];
        assert_eq!(r.read(&mut buf).unwrap(), 10);
        assert!(matches!(r.read_byte(), Err(CoreError::UnexpectedEof)));
        assert_eq!(r.bytes_read(), 10);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let source = b"hello world".to_vec();
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);

        assert_eq!(r.peek(5).unwrap(), b"hello");
        assert_eq!(r.bytes_read(), 0);
        assert_eq!(r.read_byte().unwrap(), b'h');
        assert_eq!(r.peek(4).unwrap(), b"ello");
    }

    #[test]
    fn test_peek_short_is_eof() {
        let source = [1u8, 2, 3];
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);
        assert!(matches!(r.peek(4), Err(CoreError::UnexpectedEof)));
        // The data is still there for smaller peeks.
        assert_eq!(r.peek(3).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_discard_counts_and_seeks() {
        let source: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);

        // Within the window.
        assert_eq!(r.discard(100).unwrap(), 100);
        // Far past the window: pure seek.
        assert_eq!(r.discard(15_000).unwrap(), 15_000);
        assert_eq!(r.bytes_read(), 15_100);
        assert_eq!(r.read_byte().unwrap(), source[15_100]);

        // Shortfall at end of stream is reported, not an error.
        assert_eq!(r.discard(100_000).unwrap(), 20_000 - 15_101);
        assert!(matches!(r.read_byte(), Err(CoreError::UnexpectedEof)));
    }

    #[test]
    fn test_discard_exact_on_truncation() {
        let source = vec![0u8; 8];
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);
        assert!(r.discard_exact(8).is_ok());
        let mut r = reader(&[], &source_ref, u64::MAX);
        assert!(matches!(
            r.discard_exact(9),
            Err(CoreError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unread_within_window() {
        let source = b"RarSignature".to_vec();
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);

        let mut buf = [0u8; 8];
        r.read_exact(&mut buf).unwrap();
        r.unread(1).unwrap();
        assert_eq!(r.bytes_read(), 7);
        assert_eq!(r.read_byte().unwrap(), b'a');

        assert!(r.unread(1000).is_err());
    }

    #[test]
    fn test_bytes_read_includes_discards() {
        let source = vec![7u8; 512];
        let source_ref: &[u8] = &source;
        let mut r = reader(&[], &source_ref, u64::MAX);
        let mut buf = [0u8; 10];
        r.read_exact(&mut buf).unwrap();
        r.discard(90).unwrap();
        assert_eq!(r.bytes_read(), 100);
    }

    #[test]
    fn test_source_base_offsets_the_tail() {
        let source: Vec<u8> = (0u8..100).collect();
        let prefix = [0xEEu8; 4];
        let source_ref: &[u8] = &source;
        let mut r = CarveReader::new(&prefix, &source_ref, 50, u64::MAX);

        let mut buf = [0u8; 6];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xEE, 0xEE, 0xEE, 0xEE, 50, 51]);
        // Composite length: 4 prefix bytes + 50 remaining source bytes.
        assert_eq!(r.discard(1000).unwrap(), 54 - 6);
    }

    #[test]
    fn test_fill_buf_refills_across_chunks() {
        let source: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut r = CarveReader::with_capacity(&[], &&source[..], 0, u64::MAX, 256);

        let first = r.fill_buf().unwrap().to_vec();
        assert_eq!(first.len(), 256);
        r.discard(first.len() as u64).unwrap();
        let second = r.fill_buf().unwrap().to_vec();
        assert_eq!(second[0], source[256]);
    }

    #[test]
    fn test_empty_stream() {
        let mut r = reader(&[], &[], u64::MAX);
        assert!(matches!(r.read_byte(), Err(CoreError::UnexpectedEof)));
        assert_eq!(r.fill_buf().unwrap(), &[] as &[u8]);
        assert_eq!(r.discard(10).unwrap(), 0);
    }
}
