use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use strata_core::{BlockSource, Result};

/// Positional file reader over an image file or raw device node.
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(false)
            .open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};
            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }
}

impl BlockSource for DiskReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            Ok(self.file.seek_read(buf, offset)?)
        }
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_reader_basic() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"Hello, World! This is test data for DiskReader.";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();

        let reader = DiskReader::new(temp_file.path()).unwrap();
        assert_eq!(reader.size(), test_data.len() as u64);

        let mut buffer = vec![0u8; 13];
        let bytes_read = reader.read_at(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 13);
        assert_eq!(&buffer, b"Hello, World!");
    }

    #[test]
    fn test_positional_reads_are_independent() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"0123456789").unwrap();
        temp_file.flush().unwrap();

        let reader = DiskReader::new(temp_file.path()).unwrap();
        let mut a = [0u8; 2];
        let mut b = [0u8; 2];
        reader.read_at(8, &mut a).unwrap();
        reader.read_at(0, &mut b).unwrap();
        assert_eq!(&a, b"89");
        assert_eq!(&b, b"01");
    }

    #[test]
    fn test_read_past_end_is_short() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"abc").unwrap();
        temp_file.flush().unwrap();

        let reader = DiskReader::new(temp_file.path()).unwrap();
        let mut buffer = [0u8; 8];
        assert_eq!(reader.read_at(1, &mut buffer).unwrap(), 2);
        assert_eq!(reader.read_at(100, &mut buffer).unwrap(), 0);
    }
}
