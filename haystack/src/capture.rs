//! Raw burst capture to numbered local files

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Writes each burst to `<directory>/<prefix><n>.bin`, `n` counting from 0
pub struct CaptureWriter {
    directory: PathBuf,
    prefix: String,
    next: AtomicU64,
}

impl CaptureWriter {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn write(&self, burst: &[u8]) -> io::Result<PathBuf> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self.directory.join(format!("{}{}.bin", self.prefix, n));
        fs::write(&path, burst)?;
        Ok(path)
    }

    pub fn written(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaptureWriter::new(dir.path(), "rxdata");

        let first = writer.write(&[1, 2, 3]).unwrap();
        let second = writer.write(&[4]).unwrap();

        assert_eq!(first, dir.path().join("rxdata0.bin"));
        assert_eq!(second, dir.path().join("rxdata1.bin"));
        assert_eq!(fs::read(&first).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaptureWriter::new(dir.path().join("absent"), "rxdata");
        assert!(writer.write(&[0]).is_err());
    }
}
