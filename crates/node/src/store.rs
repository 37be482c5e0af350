//! File-backed EEPROM image.
//!
//! A missing file, or any byte past its end, reads as `0xFF` like erased
//! EEPROM.  Writes extend the file with `0xFF` filler as needed and are
//! synced before returning.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hydro_controller::hal::ByteStore;

const ERASED: u8 = 0xFF;

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        buf.fill(ERASED);

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to open {}", self.path.display()))
            }
        };

        let len = file.metadata()?.len();
        let start = offset as u64;
        if start >= len {
            return Ok(());
        }
        let stored = usize::try_from(len - start).unwrap_or(usize::MAX).min(buf.len());

        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf[..stored])
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(())
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let len = file.metadata()?.len();
        let start = offset as u64;
        if start > len {
            // Keep the gap looking erased.
            file.seek(SeekFrom::End(0))?;
            let gap = usize::try_from(start - len)?;
            file.write_all(&vec![ERASED; gap])?;
        }

        file.seek(SeekFrom::Start(start))?;
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        file.sync_data()?;

        tracing::debug!(path = %self.path.display(), offset, len = bytes.len(), "store written");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
