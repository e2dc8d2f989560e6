use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::data::OverwritePolicy;
use crate::error::{Error, Result};

/// The pre-sized destination file shared by every range worker.
///
/// Writes are positional and carry their own offset, so concurrent workers
/// never share a cursor. Each worker only writes inside its own range.
#[derive(Debug)]
pub struct OutputFile {
    file: Arc<File>,
    path: PathBuf,
}

impl OutputFile {
    /// Fail early when `path` exists and `policy` forbids replacing it.
    pub async fn check_destination(path: &Path, policy: OverwritePolicy) -> Result<()> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| destination_error(path, source))?;

        if exists && policy == OverwritePolicy::Reject {
            return Err(Error::DestinationExists {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Create the destination and size it to `total_size` bytes.
    pub async fn create(path: &Path, policy: OverwritePolicy, total_size: u64) -> Result<Self> {
        Self::check_destination(path, policy).await?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "removed existing file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(destination_error(path, source)),
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => Error::DestinationExists {
                    path: path.to_path_buf(),
                },
                _ => destination_error(path, source),
            })?;

        file.set_len(total_size)
            .await
            .map_err(|source| destination_error(path, source))?;

        Ok(Self {
            file: Arc::new(file.into_std().await),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `buf` at `offset` on the blocking pool. Returns the number of
    /// bytes the OS accepted, which may be less than `buf.len()`.
    pub async fn write_at(&self, buf: bytes::Bytes, offset: u64) -> io::Result<usize> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_at(&file, &buf, offset))
            .await
            .map_err(io::Error::other)?
    }

    /// Flush file contents and metadata to disk.
    pub async fn sync(&self) -> Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(io::Error::other)
            .and_then(|r| r)
            .map_err(|source| destination_error(&self.path, source))
    }
}

fn destination_error(path: &Path, source: io::Error) -> Error {
    Error::Destination {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;

    loop {
        match file.write_at(buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;

    loop {
        match file.seek_write(buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
