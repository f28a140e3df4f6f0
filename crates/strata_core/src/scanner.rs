//! Block-oriented streaming scanner.
//!
//! The engine iterates a region of the source in fixed-size buffers. For each
//! block-aligned offset it asks the registry which validators claim the bytes
//! there, runs them against a bounded composite reader, and on the first
//! acceptance emits a [`FileInfo`] and jumps past the carved file.

use crate::error::{CoreError, Result};
use crate::reader::CarveReader;
use crate::registry::SignatureRegistry;
use crate::types::{BlockSource, FileInfo, Region};

/// Counters reported when a scan run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub bytes_processed: u64,
    pub files_found: u64,
    /// True when the consumer stopped the scan through the emit callback.
    pub stopped: bool,
}

pub struct Scanner {
    registry: SignatureRegistry,
    block_size: u64,
    max_file_size: u64,
    buf: Vec<u8>,
}

#[inline]
fn round_up(n: u64, m: u64) -> u64 {
    n.div_ceil(m) * m
}

/// Issue positional reads until `buf` is full or the source runs dry.
fn read_full(source: &dyn BlockSource, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let m = source.read_at(offset + n as u64, &mut buf[n..])?;
        if m == 0 {
            break;
        }
        n += m;
    }
    Ok(n)
}

impl Scanner {
    /// Configuration errors are reported here; `scan` never starts with bad
    /// parameters. The buffer length is rounded up to a block multiple.
    pub fn new(
        registry: SignatureRegistry,
        scan_buffer_size: usize,
        block_size: u32,
        max_file_size: u64,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(CoreError::InvalidConfig("block size must be non-zero".into()));
        }
        if max_file_size == 0 {
            return Err(CoreError::InvalidConfig(
                "max file size must be non-zero".into(),
            ));
        }
        let bs = block_size as usize;
        let buf_len = round_up(scan_buffer_size.max(1) as u64, bs as u64) as usize;
        Ok(Self {
            registry,
            block_size: u64::from(block_size),
            max_file_size,
            buf: vec![0u8; buf_len],
        })
    }

    #[inline]
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    #[inline]
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// Scan `region` of `source`, invoking `emit` once per accepted carve in
    /// strictly increasing offset order. `emit` returning false stops the
    /// scan after the current candidate. `progress` is advisory and called
    /// once per buffer.
    pub fn scan<E, P>(
        &mut self,
        source: &dyn BlockSource,
        region: &Region,
        mut emit: E,
        mut progress: P,
    ) -> Result<ScanStats>
    where
        E: FnMut(FileInfo) -> bool,
        P: FnMut(u64, u64),
    {
        let bs = self.block_size;
        debug_assert_eq!(u64::from(region.block_size), bs);

        let mut stats = ScanStats::default();
        // Region-relative cursor of the current buffer, always block-aligned.
        let mut b: u64 = 0;
        // First block not covered by an already accepted carve.
        let mut next_b: u64 = 0;

        while b < region.size && !stats.stopped {
            let want = self.buf.len().min((region.size - b) as usize);
            let n = read_full(source, region.offset + b, &mut self.buf[..want])?;
            // Trailing bytes shorter than a block are left for the next
            // iteration; at end of data they are never scanned.
            let nvalid = n - n % bs as usize;
            if nvalid == 0 {
                stats.bytes_processed = (b + n as u64).min(region.size);
                break;
            }

            let mut p: usize = 0;
            while p < nvalid {
                let g = region.offset + b + p as u64;
                let budget = self.max_file_size.min(region.size - (b + p as u64));
                let mut carve_size: u64 = 0;
                let mut deferred_err: Option<CoreError> = None;

                let buf = &self.buf;
                let registry = &self.registry;
                registry.walk(&buf[p..nvalid], |scanner| {
                    let mut reader = CarveReader::new(
                        &buf[p..nvalid],
                        source,
                        region.offset + b + nvalid as u64,
                        budget,
                    );
                    match scanner.scan(&mut reader) {
                        Ok(res) if res.size > 0 && res.size <= budget => {
                            let ext = res.ext.map_or_else(
                                || scanner.ext().to_string(),
                                |e| e.to_string(),
                            );
                            let name = res
                                .name
                                .unwrap_or_else(|| format!("f{}.{}", g / bs, ext));
                            let info = FileInfo {
                                name,
                                ext,
                                offset: g,
                                size: res.size,
                            };
                            stats.files_found += 1;
                            stats.stopped = !emit(info);
                            carve_size = res.size;
                            true
                        }
                        // A declared size past the region or the cap rejects
                        // the candidate, as does a zero size.
                        Ok(_) => false,
                        Err(err) if err.is_rejection() => false,
                        Err(err) => {
                            deferred_err = Some(err);
                            true
                        }
                    }
                });

                if let Some(err) = deferred_err {
                    return Err(err);
                }

                if carve_size > 0 {
                    let p_next = round_up(p as u64 + carve_size, bs);
                    next_b = next_b.max(round_up(b + p as u64 + carve_size, bs));
                    if p_next >= nvalid as u64 {
                        break;
                    }
                    p = p_next as usize;
                } else {
                    p += bs as usize;
                }

                if stats.stopped {
                    break;
                }
            }

            b = (b + nvalid as u64).max(next_b);
            stats.bytes_processed = b.min(region.size);
            progress(stats.bytes_processed, stats.files_found);

            if n < want {
                // Source exhausted before the region end.
                break;
            }
        }

        progress(stats.bytes_processed, stats.files_found);
        Ok(stats)
    }

    /// Convenience wrapper collecting every emitted record.
    pub fn scan_all(&mut self, source: &dyn BlockSource, region: &Region) -> Result<Vec<FileInfo>> {
        let mut out = Vec::new();
        self.scan(
            source,
            region,
            |info| {
                out.push(info);
                true
            },
            |_, _| {},
        )?;
        Ok(out)
    }
}
