use std::fs::File;
use std::io;
use std::ops::Deref;

use memmap2::{Mmap, MmapOptions};

use crate::window::Window;

/// Creates read-only mappings of a byte range of an open file.
pub trait Mapper {
    type Region: Deref<Target = [u8]>;

    fn map(&self, file: &File, start: u64, len: usize) -> io::Result<Self::Region>;
}

/// Default mapper backed by `memmap2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapMapper;

impl Mapper for MmapMapper {
    type Region = Mmap;

    fn map(&self, file: &File, start: u64, len: usize) -> io::Result<Mmap> {
        // SAFETY: the file must not be truncated while the mapping is alive.
        // Readers only hand out views borrowed from the region.
        unsafe { MmapOptions::new().offset(start).len(len).map(file) }
    }
}

/// A mapped window of a file. The mapping is released on drop.
pub struct MappedRegion<R> {
    mapping: R,
    start: u64,
}

impl<R: Deref<Target = [u8]>> MappedRegion<R> {
    pub fn new(mapping: R, start: u64) -> Self {
        MappedRegion { mapping, start }
    }

    pub fn window(&self) -> Window {
        Window {
            start: self.start,
            len: self.mapping.len() as u64,
        }
    }

    pub fn covers(&self, offset: u64, end: u64) -> bool {
        self.window().covers(offset, end)
    }

    /// View of `length` bytes at file offset `offset`, or None if the region
    /// does not cover that range.
    pub fn slice(&self, offset: u64, length: u64) -> Option<&[u8]> {
        let rel = usize::try_from(offset.checked_sub(self.start)?).ok()?;
        let len = usize::try_from(length).ok()?;
        self.mapping.get(rel..rel.checked_add(len)?)
    }
}
