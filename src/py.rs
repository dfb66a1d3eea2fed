use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::handle::{AccessMode, FileHandle};
use crate::reader::{ReadStats, WindowedReader};
use crate::region::MmapMapper;
use crate::window::{WindowPolicy, DEFAULT_ALIGNMENT, DEFAULT_MIN_WINDOW};

/// Read counters of a mapping.
#[pyclass(frozen)]
#[derive(Clone)]
pub struct MappingStats {
    #[pyo3(get)]
    pub reads: u64,
    #[pyo3(get)]
    pub hits: u64,
    #[pyo3(get)]
    pub maps: u64,
}

#[pymethods]
impl MappingStats {
    fn __repr__(&self) -> String {
        format!(
            "MappingStats(reads={}, hits={}, maps={})",
            self.reads, self.hits, self.maps
        )
    }
}

impl From<ReadStats> for MappingStats {
    fn from(stats: ReadStats) -> Self {
        MappingStats {
            reads: stats.reads,
            hits: stats.hits,
            maps: stats.maps,
        }
    }
}

/// Read-only memory mapping of a file, mapped one window at a time.
#[pyclass]
pub struct ReadFileMapping {
    path: String,
    reader: WindowedReader,
}

#[pymethods]
impl ReadFileMapping {
    #[new]
    #[pyo3(signature = (path, *, windowed=None, min_window=DEFAULT_MIN_WINDOW, alignment=DEFAULT_ALIGNMENT))]
    fn new(
        py: Python<'_>,
        path: &str,
        windowed: Option<bool>,
        min_window: u64,
        alignment: u64,
    ) -> PyResult<Self> {
        let policy = WindowPolicy::for_mode(windowed)
            .with_min_window(min_window)
            .with_alignment(alignment);

        let reader = py.allow_threads(|| {
            let handle = FileHandle::open(path, AccessMode::ReadOnly)?;
            WindowedReader::with_mapper(handle, MmapMapper, policy)
        })?;

        Ok(ReadFileMapping {
            path: path.to_string(),
            reader,
        })
    }

    #[getter]
    fn size(&self) -> u64 {
        self.reader.file_size()
    }

    #[getter]
    fn path(&self) -> &str {
        &self.path
    }

    #[getter]
    fn closed(&self) -> bool {
        self.reader.is_closed()
    }

    /// Currently mapped `(start, length)`, or None before the first read.
    #[getter]
    fn window(&self) -> Option<(u64, u64)> {
        self.reader.current_window().map(|w| (w.start, w.len))
    }

    fn stats(&self) -> MappingStats {
        self.reader.stats().into()
    }

    /// Copy `length` bytes starting at `offset` out of the mapping.
    fn read<'py>(&mut self, py: Python<'py>, offset: u64, length: u64) -> PyResult<Bound<'py, PyBytes>> {
        let reader = &mut self.reader;
        // Mapping may block on I/O, so release the GIL around it
        let data = py.allow_threads(move || {
            let reader = reader;
            reader.read(offset, length)
        })?;
        Ok(PyBytes::new_bound(py, data))
    }

    fn close(&mut self) {
        self.reader.close();
    }

    fn __enter__(slf: PyRef<Self>) -> PyRef<Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc_value=None, _traceback=None))]
    fn __exit__(
        &mut self,
        _exc_type: Option<PyObject>,
        _exc_value: Option<PyObject>,
        _traceback: Option<PyObject>,
    ) -> bool {
        self.close();
        false
    }

    fn __repr__(&self) -> String {
        let state = if self.reader.is_closed() { "closed" } else { "open" };
        format!(
            "ReadFileMapping({:?}, {}B, {})",
            self.path,
            self.reader.file_size(),
            state
        )
    }
}
