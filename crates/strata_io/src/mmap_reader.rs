use memmap2::Mmap;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use strata_core::{BlockSource, CoreError, Result};

/// Memory-mapped reader for regular image files. Block devices and empty
/// files fall back to [`DiskReader`](crate::DiskReader).
pub struct MmapReader {
    mmap: Mmap,
    size: u64,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let size = file.seek(SeekFrom::End(0))?;

        if size == 0 {
            return Err(CoreError::InvalidConfig("cannot mmap empty file".into()));
        }

        let mmap =
            unsafe { Mmap::map(&file) }.map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

        if mmap.is_empty() {
            return Err(CoreError::InvalidConfig(
                "mmap returned empty mapping (block device not supported)".into(),
            ));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
            let _ = mmap.advise(Advice::WillNeed);
        }

        Ok(Self { mmap, size })
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }
}

impl BlockSource for MmapReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if let Some(slice) = self.slice(offset, buf.len()) {
            let len = slice.len();
            buf[..len].copy_from_slice(slice);
            Ok(len)
        } else {
            Ok(0)
        }
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}
