use std::path::Path;

use crate::errors::MapError;
use crate::handle::{AccessMode, FileHandle};
use crate::region::{MappedRegion, Mapper, MmapMapper};
use crate::window::{Window, WindowPolicy};

/// Counters describing how reads were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub reads: u64,
    /// Reads served from the already mapped region.
    pub hits: u64,
    /// Mappings created.
    pub maps: u64,
}

/// Read-only access to a file through at most one mapped window at a time.
///
/// Views returned by [`WindowedReader::read`] borrow the reader mutably, so
/// none can outlive the next `read` (which may remap) or the reader itself.
pub struct WindowedReader<M: Mapper = MmapMapper> {
    // Declared before `handle` so the mapping is released first
    region: Option<MappedRegion<M::Region>>,
    handle: FileHandle,
    mapper: M,
    policy: WindowPolicy,
    file_size: u64,
    stats: ReadStats,
}

impl WindowedReader<MmapMapper> {
    /// Open `path` read-only with the native window policy.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MapError> {
        Self::new(FileHandle::open(path, AccessMode::ReadOnly)?)
    }

    pub fn new(handle: FileHandle) -> Result<Self, MapError> {
        Self::with_mapper(handle, MmapMapper, WindowPolicy::native())
    }
}

impl<M: Mapper> WindowedReader<M> {
    pub fn with_mapper(handle: FileHandle, mapper: M, policy: WindowPolicy) -> Result<Self, MapError> {
        policy.validate()?;
        let file_size = handle.size()?;
        Ok(WindowedReader {
            region: None,
            handle,
            mapper,
            policy,
            file_size,
            stats: ReadStats::default(),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// The currently mapped window, if any.
    pub fn current_window(&self) -> Option<Window> {
        self.region.as_ref().map(MappedRegion::window)
    }

    pub fn is_closed(&self) -> bool {
        !self.handle.is_open()
    }

    /// Get `length` bytes starting at `offset`.
    ///
    /// Served from the current region when it covers the range, otherwise a
    /// new window is mapped and replaces it. If mapping fails the current
    /// region is kept.
    pub fn read(&mut self, offset: u64, length: u64) -> Result<&[u8], MapError> {
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= self.file_size)
            .ok_or_else(|| {
                MapError::ContractViolation(format!(
                    "attempted to map beyond end of file: {} bytes at offset {} of {} ({} bytes)",
                    length,
                    offset,
                    self.handle.path().display(),
                    self.file_size
                ))
            })?;

        if !self.handle.is_open() {
            return Err(MapError::Closed(self.handle.path().to_path_buf()));
        }
        if length == 0 {
            return Ok(&[]);
        }
        self.stats.reads += 1;

        let region = match self.region.take() {
            Some(current) if current.covers(offset, end) => {
                self.stats.hits += 1;
                log::trace!("read {}+{} served from current window", offset, length);
                self.region.insert(current)
            }
            previous => match self.map_window(offset, length) {
                Ok(fresh) => {
                    self.stats.maps += 1;
                    let region = self.region.insert(fresh);
                    drop(previous);
                    region
                }
                Err(e) => {
                    self.region = previous;
                    return Err(e);
                }
            },
        };

        region.slice(offset, length).ok_or_else(|| {
            MapError::UnknownIo(format!(
                "mapped window does not cover {} bytes at offset {}",
                length, offset
            ))
        })
    }

    fn map_window(&self, offset: u64, length: u64) -> Result<MappedRegion<M::Region>, MapError> {
        let window = self.policy.window_for(offset, length, self.file_size)?;
        // window_for already checked len against size_limit, which never exceeds usize
        let len = usize::try_from(window.len).map_err(|_| MapError::OutOfMemory {
            requested: window.len,
            limit: usize::MAX as u64,
        })?;

        let path = self.handle.path();
        let mapping = self
            .mapper
            .map(self.handle.file()?, window.start, len)
            .map_err(|e| {
                log::warn!(
                    "failed mapping [{}, {}) of {}: {}",
                    window.start,
                    window.end(),
                    path.display(),
                    e
                );
                MapError::UnknownIo(format!(
                    "failed mapping a view of {}: {}",
                    path.display(),
                    e
                ))
            })?;

        log::debug!(
            "mapped [{}, {}) of {} ({} bytes)",
            window.start,
            window.end(),
            path.display(),
            self.file_size
        );
        Ok(MappedRegion::new(mapping, window.start))
    }

    /// Release the mapped region and the file handle. Later reads fail with
    /// [`MapError::Closed`].
    pub fn close(&mut self) {
        self.region = None;
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::MIB;
    use memmap2::Mmap;
    use std::cell::{Cell, RefCell};
    use std::fs::{self, File};
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    /// Mapper that records every window it is asked for.
    #[derive(Default)]
    struct CountingMapper {
        windows: RefCell<Vec<(u64, usize)>>,
        fail: Cell<bool>,
    }

    impl Mapper for &CountingMapper {
        type Region = Mmap;

        fn map(&self, file: &File, start: u64, len: usize) -> io::Result<Mmap> {
            if self.fail.get() {
                return Err(io::Error::new(io::ErrorKind::Other, "out of address space"));
            }
            self.windows.borrow_mut().push((start, len));
            MmapMapper.map(file, start, len)
        }
    }

    fn patterned_file(len: usize) -> (NamedTempFile, Vec<u8>) {
        let mut f = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 253) as u8).collect();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        (f, data)
    }

    fn sparse_file(len: u64) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        f.as_file().set_len(len).unwrap();
        f
    }

    fn small_windows() -> WindowPolicy {
        WindowPolicy::windowed()
            .with_alignment(4096)
            .with_min_window(16 * 1024)
    }

    fn reader_with<'a>(
        path: &Path,
        mapper: &'a CountingMapper,
        policy: WindowPolicy,
    ) -> WindowedReader<&'a CountingMapper> {
        let handle = FileHandle::open(path, AccessMode::ReadOnly).unwrap();
        WindowedReader::with_mapper(handle, mapper, policy).unwrap()
    }

    #[test]
    fn test_reads_match_file_contents() {
        let (f, data) = patterned_file(200_000);
        let expected = fs::read(f.path()).unwrap();
        assert_eq!(expected, data);

        for policy in [WindowPolicy::native(), small_windows()] {
            let mapper = CountingMapper::default();
            let mut reader = reader_with(f.path(), &mapper, policy);
            assert_eq!(reader.file_size(), 200_000);

            for &(offset, length) in &[
                (0u64, 10u64),
                (4095, 2),
                (100_000, 50_000),
                (199_990, 10),
                (17, 70_000),
                (0, 200_000),
            ] {
                let got = reader.read(offset, length).unwrap();
                let (o, l) = (offset as usize, length as usize);
                assert_eq!(got, &expected[o..o + l], "offset {} length {}", offset, length);
            }
        }
    }

    #[test]
    fn test_reads_across_window_edges() {
        const FILE_LEN: u64 = 100_000;
        let (f, data) = patterned_file(FILE_LEN as usize);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, small_windows());

        let boundaries = (0..=FILE_LEN).step_by(4096).chain([FILE_LEN]);
        for boundary in boundaries {
            for offset in boundary.saturating_sub(3)..=boundary + 3 {
                for length in [1u64, 2, 7, 4095, 4096, 4097, 16 * 1024, 16 * 1024 + 1] {
                    if offset + length > FILE_LEN {
                        continue;
                    }
                    let got = reader.read(offset, length).unwrap();
                    let (o, l) = (offset as usize, length as usize);
                    assert_eq!(got, &data[o..o + l], "offset {} length {}", offset, length);

                    let window = reader.current_window().unwrap();
                    assert_eq!(window.start % 4096, 0);
                    assert!(window.covers(offset, offset + length));
                    assert!(window.end() <= FILE_LEN);
                }
            }
        }

        let stats = reader.stats();
        assert_eq!(stats.reads, stats.hits + stats.maps);
        assert_eq!(stats.maps as usize, mapper.windows.borrow().len());
    }

    #[test]
    fn test_open_default_reader() {
        let (f, data) = patterned_file(5000);
        let mut reader = WindowedReader::open(f.path()).unwrap();
        assert_eq!(reader.path(), f.path());
        assert_eq!(reader.policy(), WindowPolicy::native());
        assert_eq!(reader.read(1000, 24).unwrap(), &data[1000..1024]);
    }

    #[test]
    fn test_read_past_end_is_contract_violation() {
        let (f, _) = patterned_file(1000);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, WindowPolicy::native());

        assert!(matches!(reader.read(990, 11), Err(MapError::ContractViolation(_))));
        assert!(matches!(reader.read(1001, 0), Err(MapError::ContractViolation(_))));
        assert!(matches!(
            reader.read(u64::MAX, 2),
            Err(MapError::ContractViolation(_))
        ));
        assert_eq!(reader.current_window(), None);
        assert!(mapper.windows.borrow().is_empty());

        reader.read(0, 10).unwrap();
        let window = reader.current_window();
        assert!(reader.read(0, 1001).is_err());
        assert_eq!(reader.current_window(), window);
        assert_eq!(mapper.windows.borrow().len(), 1);
    }

    #[test]
    fn test_covered_reads_map_once() {
        let (f, data) = patterned_file(100_000);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, small_windows());

        assert_eq!(reader.read(100, 10).unwrap(), &data[100..110]);
        assert_eq!(reader.read(200, 1000).unwrap(), &data[200..1200]);
        assert_eq!(reader.read(0, 16 * 1024).unwrap(), &data[..16 * 1024]);

        assert_eq!(mapper.windows.borrow().len(), 1);
        assert_eq!(
            reader.stats(),
            ReadStats {
                reads: 3,
                hits: 2,
                maps: 1
            }
        );
    }

    #[test]
    fn test_far_apart_reads_remap() {
        let (f, data) = patterned_file(100_000);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, small_windows());

        assert_eq!(reader.read(10, 10).unwrap(), &data[10..20]);
        assert_eq!(reader.read(70_000, 10).unwrap(), &data[70_000..70_010]);

        let windows = mapper.windows.borrow();
        assert_eq!(windows.len(), 2);
        for &(start, len) in windows.iter() {
            assert_eq!(start % 4096, 0);
            assert!(len as u64 >= (16 * 1024).min(100_000 - start));
            assert!(start + len as u64 <= 100_000);
        }
        assert_ne!(windows[0].0, windows[1].0);
    }

    #[test]
    fn test_narrow_windows_on_large_file() {
        let f = sparse_file(50 * MIB);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, WindowPolicy::windowed());

        assert_eq!(reader.read(0, 10).unwrap(), &[0u8; 10]);
        assert_eq!(
            reader.current_window(),
            Some(Window {
                start: 0,
                len: 16 * MIB
            })
        );

        reader.read(20 * MIB, 100).unwrap();
        assert_eq!(
            reader.current_window(),
            Some(Window {
                start: 20 * MIB,
                len: 16 * MIB
            })
        );

        reader.read(49 * MIB + 5, 100).unwrap();
        assert_eq!(
            reader.current_window(),
            Some(Window {
                start: 49 * MIB,
                len: MIB
            })
        );

        assert_eq!(
            *mapper.windows.borrow(),
            vec![
                (0, 16 * MIB as usize),
                (20 * MIB, 16 * MIB as usize),
                (49 * MIB, MIB as usize)
            ]
        );
    }

    #[test]
    fn test_whole_file_policy_maps_once() {
        let f = sparse_file(50 * MIB);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, WindowPolicy::whole_file());

        reader.read(0, 10).unwrap();
        reader.read(20 * MIB, 100).unwrap();
        reader.read(50 * MIB - 1, 1).unwrap();

        assert_eq!(*mapper.windows.borrow(), vec![(0, 50 * MIB as usize)]);
    }

    #[test]
    fn test_failed_remap_keeps_previous_region() {
        let (f, data) = patterned_file(100_000);
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, small_windows());

        reader.read(0, 10).unwrap();
        let before = reader.current_window();

        mapper.fail.set(true);
        match reader.read(80_000, 10) {
            Err(MapError::UnknownIo(msg)) => assert!(msg.contains("failed mapping"), "{}", msg),
            other => panic!("expected UnknownIo, got {:?}", other.map(|s| s.len())),
        }
        assert_eq!(reader.current_window(), before);

        // Still served from the surviving region
        assert_eq!(reader.read(100, 20).unwrap(), &data[100..120]);

        mapper.fail.set(false);
        assert_eq!(reader.read(80_000, 10).unwrap(), &data[80_000..80_010]);
        assert_eq!(reader.stats().maps, 2);
    }

    #[test]
    fn test_out_of_memory_leaves_state() {
        let (f, _) = patterned_file(10_000);
        let mapper = CountingMapper::default();
        let policy = WindowPolicy {
            size_limit: 4096,
            ..WindowPolicy::whole_file()
        };
        let mut reader = reader_with(f.path(), &mapper, policy);

        assert!(matches!(
            reader.read(0, 10),
            Err(MapError::OutOfMemory { requested: 10_000, .. })
        ));
        assert_eq!(reader.current_window(), None);
        assert!(mapper.windows.borrow().is_empty());
    }

    #[test]
    fn test_zero_length_reads() {
        let f = NamedTempFile::new().unwrap();
        let mapper = CountingMapper::default();
        let mut reader = reader_with(f.path(), &mapper, WindowPolicy::native());

        assert_eq!(reader.file_size(), 0);
        assert!(reader.read(0, 0).unwrap().is_empty());
        assert!(matches!(reader.read(0, 1), Err(MapError::ContractViolation(_))));
        assert!(mapper.windows.borrow().is_empty());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let (f, _) = patterned_file(10);
        let handle = FileHandle::open(f.path(), AccessMode::ReadOnly).unwrap();
        let policy = WindowPolicy::windowed().with_alignment(0);
        assert!(matches!(
            WindowedReader::with_mapper(handle, MmapMapper, policy),
            Err(MapError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_close_releases_everything() {
        let (f, _) = patterned_file(1000);
        let mut reader = WindowedReader::open(f.path()).unwrap();
        reader.read(0, 10).unwrap();

        reader.close();
        assert!(reader.is_closed());
        assert_eq!(reader.current_window(), None);
        assert!(matches!(reader.read(0, 10), Err(MapError::Closed(_))));

        // Closing twice is harmless
        reader.close();
        assert_eq!(reader.file_size(), 1000);
    }

    #[test]
    fn test_drop_reader_with_outstanding_pointer() {
        let (f, _) = patterned_file(1000);
        let mut reader = WindowedReader::open(f.path()).unwrap();
        let ptr = reader.read(10, 10).unwrap().as_ptr();
        drop(reader);
        // Discarded without dereferencing
        let _ = ptr;
    }
}
