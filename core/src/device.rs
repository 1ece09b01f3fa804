// Image devices - offset-addressed, read-only access to a filesystem image
// Every read names its own absolute offset so that readers never share a cursor.

use crate::error::{E2Error, E2Result};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Description of an opened image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: Option<PathBuf>,
    pub size: u64,
}

/// Read-only, positioned access to raw image bytes.
///
/// Implementations must be safe to call from several threads at once.
pub trait ImageDevice: Send + Sync {
    /// Total length of the image in bytes.
    fn len_bytes(&self) -> u64;

    /// Fill `buf` with the bytes starting at `offset`.
    /// A short read is an error; callers never see partial data.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> E2Result<()>;

    fn info(&self) -> ImageInfo {
        ImageInfo {
            path: None,
            size: self.len_bytes(),
        }
    }
}

/// Reject spans that run past the end of the image before any I/O happens.
fn check_span(len_bytes: u64, offset: u64, length: usize) -> E2Result<()> {
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= len_bytes => Ok(()),
        _ => Err(E2Error::io(
            std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("read past end of image ({} bytes)", len_bytes),
            ),
            offset,
            length,
        )),
    }
}

/// Image file on disk
#[derive(Debug)]
pub struct FileImage {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileImage {
    /// Open an image file read-only
    pub fn open(path: impl AsRef<Path>) -> E2Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| E2Error::io(e, 0, 0))?;
        let len = file.metadata().map_err(|e| E2Error::io(e, 0, 0))?.len();

        Ok(Self { file, path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageDevice for FileImage {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> E2Result<()> {
        check_span(self.len, offset, buf.len())?;
        trace!("pread {} bytes at offset {:#x}", buf.len(), offset);

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file
                .read_exact_at(buf, offset)
                .map_err(|e| E2Error::io(e, offset, buf.len()))?;
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = self
                    .file
                    .seek_read(&mut buf[filled..], offset + filled as u64)
                    .map_err(|e| E2Error::io(e, offset, buf.len()))?;
                if n == 0 {
                    return Err(E2Error::io(
                        std::io::Error::new(ErrorKind::UnexpectedEof, "short read"),
                        offset,
                        buf.len(),
                    ));
                }
                filled += n;
            }
        }

        Ok(())
    }

    fn info(&self) -> ImageInfo {
        ImageInfo {
            path: Some(self.path.clone()),
            size: self.len,
        }
    }
}

/// Image held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    bytes: Vec<u8>,
}

impl MemoryImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl ImageDevice for MemoryImage {
    fn len_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> E2Result<()> {
        check_span(self.len_bytes(), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }
}
