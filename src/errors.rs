use std::io;
use std::path::{Path, PathBuf};

#[cfg(feature = "python")]
use pyo3::create_exception;
#[cfg(feature = "python")]
use pyo3::exceptions::{
    PyFileNotFoundError, PyMemoryError, PyOSError, PyPermissionError, PyValueError,
};
#[cfg(feature = "python")]
use pyo3::prelude::*;

// Exception hierarchy: all inherit from FileMappingError
#[cfg(feature = "python")]
create_exception!(pyfs_mapping._core, FileMappingError, pyo3::exceptions::PyException);
#[cfg(feature = "python")]
create_exception!(pyfs_mapping._core, MappingRangeError, FileMappingError);

/// Error type for opening, sizing and mapping files.
#[derive(Debug)]
pub enum MapError {
    NotFound(PathBuf),
    AccessDenied(PathBuf),
    UnknownIo(String),
    OutOfMemory { requested: u64, limit: u64 },
    ContractViolation(String),
    InvalidPolicy(String),
    Closed(PathBuf),
}

/// Classification of a failed open, independent of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenErrorKind {
    NotFound,
    AccessDenied,
    Other,
}

#[cfg(windows)]
mod win {
    pub const ERROR_FILE_NOT_FOUND: i32 = 2;
    pub const ERROR_PATH_NOT_FOUND: i32 = 3;
    pub const ERROR_ACCESS_DENIED: i32 = 5;
}

/// Map a native OS error code from a failed open onto [`OpenErrorKind`].
#[cfg(unix)]
pub fn classify_os_code(code: i32) -> OpenErrorKind {
    match code {
        libc::ENOENT | libc::ENOTDIR => OpenErrorKind::NotFound,
        libc::EACCES | libc::EPERM => OpenErrorKind::AccessDenied,
        _ => OpenErrorKind::Other,
    }
}

/// Map a native OS error code from a failed open onto [`OpenErrorKind`].
#[cfg(windows)]
pub fn classify_os_code(code: i32) -> OpenErrorKind {
    match code {
        win::ERROR_FILE_NOT_FOUND | win::ERROR_PATH_NOT_FOUND => OpenErrorKind::NotFound,
        win::ERROR_ACCESS_DENIED => OpenErrorKind::AccessDenied,
        _ => OpenErrorKind::Other,
    }
}

#[cfg(not(any(unix, windows)))]
pub fn classify_os_code(_code: i32) -> OpenErrorKind {
    OpenErrorKind::Other
}

fn classify_io_error(err: &io::Error) -> OpenErrorKind {
    if let Some(code) = err.raw_os_error() {
        return classify_os_code(code);
    }
    match err.kind() {
        io::ErrorKind::NotFound => OpenErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => OpenErrorKind::AccessDenied,
        _ => OpenErrorKind::Other,
    }
}

impl MapError {
    /// Build the error for a failed open of `path`.
    pub fn from_open(path: &Path, err: &io::Error) -> Self {
        match classify_io_error(err) {
            OpenErrorKind::NotFound => MapError::NotFound(path.to_path_buf()),
            OpenErrorKind::AccessDenied => MapError::AccessDenied(path.to_path_buf()),
            OpenErrorKind::Other => MapError::UnknownIo(format!(
                "fatal I/O opening path {}: {}",
                path.display(),
                err
            )),
        }
    }
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::NotFound(path) => write!(f, "file not found: {}", path.display()),
            MapError::AccessDenied(path) => write!(f, "read denied: {}", path.display()),
            MapError::UnknownIo(msg) => write!(f, "{}", msg),
            MapError::OutOfMemory { requested, limit } => write!(
                f,
                "mapping window of {} bytes exceeds the addressable limit of {} bytes",
                requested, limit
            ),
            MapError::ContractViolation(msg) => write!(f, "{}", msg),
            MapError::InvalidPolicy(msg) => write!(f, "invalid window policy: {}", msg),
            MapError::Closed(path) => write!(f, "mapping is closed: {}", path.display()),
        }
    }
}

impl std::error::Error for MapError {}

#[cfg(feature = "python")]
impl From<MapError> for PyErr {
    fn from(err: MapError) -> PyErr {
        let msg = err.to_string();
        match err {
            MapError::NotFound(_) => PyFileNotFoundError::new_err(msg),
            MapError::AccessDenied(_) => PyPermissionError::new_err(msg),
            MapError::UnknownIo(_) => PyOSError::new_err(msg),
            MapError::OutOfMemory { .. } => PyMemoryError::new_err(msg),
            MapError::ContractViolation(_) => MappingRangeError::new_err(msg),
            MapError::InvalidPolicy(_) | MapError::Closed(_) => PyValueError::new_err(msg),
        }
    }
}
