//! Mapping window computation.
//!
//! Which part of a file gets mapped for a request is decided here, away from
//! any OS calls. Everything platform dependent is folded into
//! [`NATIVE_WHOLE_FILE_LIMIT`].

use crate::errors::MapError;

pub const MIB: u64 = 1024 * 1024;

/// Window starts are aligned down to this boundary (1 MB).
pub const DEFAULT_ALIGNMENT: u64 = MIB;

/// Smallest window mapped for a windowed file (16 MB), to amortize remaps.
pub const DEFAULT_MIN_WINDOW: u64 = 16 * MIB;

/// Largest file mapped in a single region on this target.
///
/// 32-bit address spaces cannot afford to map large files whole, so every
/// file is windowed there.
pub const NATIVE_WHOLE_FILE_LIMIT: u64 = if usize::BITS <= 32 { 0 } else { u64::MAX };

/// A `[start, start + len)` span of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub len: u64,
}

impl Window {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Whether `[offset, end)` lies entirely inside this window.
    pub fn covers(&self, offset: u64, end: u64) -> bool {
        offset >= self.start && end <= self.end()
    }
}

/// Tunables for window computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Files no larger than this are mapped whole.
    pub whole_file_limit: u64,
    pub alignment: u64,
    pub min_window: u64,
    /// Largest region the platform can represent.
    pub size_limit: u64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::native()
    }
}

impl WindowPolicy {
    pub const fn native() -> Self {
        WindowPolicy {
            whole_file_limit: NATIVE_WHOLE_FILE_LIMIT,
            alignment: DEFAULT_ALIGNMENT,
            min_window: DEFAULT_MIN_WINDOW,
            size_limit: usize::MAX as u64,
        }
    }

    /// Always window, as a 32-bit target does.
    pub const fn windowed() -> Self {
        WindowPolicy {
            whole_file_limit: 0,
            ..Self::native()
        }
    }

    /// Always map the whole file.
    pub const fn whole_file() -> Self {
        WindowPolicy {
            whole_file_limit: u64::MAX,
            ..Self::native()
        }
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_min_window(mut self, min_window: u64) -> Self {
        self.min_window = min_window;
        self
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.alignment == 0 {
            return Err(MapError::InvalidPolicy("alignment must be non-zero".into()));
        }
        Ok(())
    }

    /// Native policy, or forced windowing (`Some(true)`) or whole-file
    /// mapping (`Some(false)`).
    pub const fn for_mode(windowed: Option<bool>) -> Self {
        match windowed {
            None => Self::native(),
            Some(true) => Self::windowed(),
            Some(false) => Self::whole_file(),
        }
    }

    /// Compute the window to map for `length` bytes at `offset`.
    pub fn window_for(&self, offset: u64, length: u64, file_size: u64) -> Result<Window, MapError> {
        if offset.checked_add(length).filter(|&end| end <= file_size).is_none() {
            return Err(MapError::ContractViolation(format!(
                "attempted to map beyond end of file: {} bytes at offset {} of {} bytes",
                length, offset, file_size
            )));
        }
        self.validate()?;

        let window = if file_size <= self.whole_file_limit {
            Window {
                start: 0,
                len: file_size,
            }
        } else {
            let start = offset - offset % self.alignment;
            let wanted = (length + (offset - start))
                .div_ceil(self.alignment)
                .saturating_mul(self.alignment);
            Window {
                start,
                len: wanted.max(self.min_window).min(file_size - start),
            }
        };

        if window.len > self.size_limit {
            return Err(MapError::OutOfMemory {
                requested: window.len,
                limit: self.size_limit,
            });
        }
        Ok(window)
    }
}
