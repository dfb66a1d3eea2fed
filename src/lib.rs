#![allow(unexpected_cfgs)]

pub mod errors;
pub mod handle;
pub mod reader;
pub mod region;
pub mod window;

#[cfg(feature = "python")]
mod py;

pub use errors::{classify_os_code, MapError, OpenErrorKind};
pub use handle::{AccessMode, FileHandle};
pub use reader::{ReadStats, WindowedReader};
pub use region::{MappedRegion, Mapper, MmapMapper};
pub use window::{Window, WindowPolicy};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// pyfs_mapping._core - windowed read-only file mapping.
#[cfg(feature = "python")]
#[pymodule]
fn _core(py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Initialize Rust log -> Python logging bridge
    pyo3_log::init();

    // Exceptions
    m.add("FileMappingError", py.get_type_bound::<errors::FileMappingError>())?;
    m.add("MappingRangeError", py.get_type_bound::<errors::MappingRangeError>())?;

    // Defaults
    m.add("DEFAULT_MIN_WINDOW", window::DEFAULT_MIN_WINDOW)?;
    m.add("DEFAULT_ALIGNMENT", window::DEFAULT_ALIGNMENT)?;

    m.add_class::<py::ReadFileMapping>()?;
    m.add_class::<py::MappingStats>()?;

    Ok(())
}
