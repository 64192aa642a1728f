use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// Range reader over a file on local disk.
///
/// Reads are positional (`pread` on unix, `seek_read` on windows) so one open
/// handle serves concurrent requests without a shared cursor. Each read runs
/// on the blocking pool.
pub struct LocalFileReader {
    file: Arc<File>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` and record its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let identifier = path.display().to_string();

        let id = identifier.clone();
        let opened = tokio::task::spawn_blocking(move || {
            let file = File::open(&path).map_err(|e| IoError::from_std(&id, e))?;
            let metadata = file.metadata().map_err(|e| IoError::from_std(&id, e))?;
            if !metadata.is_file() {
                return Err(IoError::NotFound(id));
            }
            Ok((file, metadata.len()))
        })
        .await
        .map_err(|e| IoError::Read {
            path: identifier.clone(),
            message: e.to_string(),
        })?;
        let (file, size) = opened?;

        Ok(Self {
            file: Arc::new(file),
            size,
            identifier,
        })
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = Arc::clone(&self.file);
        let identifier = self.identifier.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_at(&file, &mut buf, offset).map_err(|e| IoError::from_std(&identifier, e))?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| IoError::Read {
            path: self.identifier.clone(),
            message: e.to_string(),
        })?
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
