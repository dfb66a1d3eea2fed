use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::MapError;

/// How the backing file is opened. Only read-only access is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
}

/// Owns the single OS file reference a mapping is created from.
///
/// The reference is released exactly once: by [`FileHandle::close`] or on
/// drop, whichever comes first.
#[derive(Debug)]
pub struct FileHandle {
    file: Option<File>,
    path: PathBuf,
    mode: AccessMode,
}

impl FileHandle {
    /// Open an existing file.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self, MapError> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        match mode {
            AccessMode::ReadOnly => options.read(true),
        };

        let file = options
            .open(path)
            .map_err(|e| MapError::from_open(path, &e))?;

        // Directories open fine on unix but can never be mapped
        let metadata = file
            .metadata()
            .map_err(|e| MapError::UnknownIo(format!("failed to stat {}: {}", path.display(), e)))?;
        if metadata.is_dir() {
            return Err(MapError::UnknownIo(format!(
                "path is a directory: {}",
                path.display()
            )));
        }

        log::debug!("opened {} ({:?})", path.display(), mode);
        Ok(FileHandle {
            file: Some(file),
            path: path.to_path_buf(),
            mode,
        })
    }

    /// The open file, or [`MapError::Closed`] once the handle is closed.
    pub fn file(&self) -> Result<&File, MapError> {
        self.file
            .as_ref()
            .ok_or_else(|| MapError::Closed(self.path.clone()))
    }

    /// Total size of the file in bytes.
    pub fn size(&self) -> Result<u64, MapError> {
        let metadata = self.file()?.metadata().map_err(|e| {
            MapError::UnknownIo(format!(
                "failed to query size of {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(metadata.len())
    }

    /// Release the OS reference. Closing an already closed handle does nothing.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            log::trace!("closed {}", self.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}
