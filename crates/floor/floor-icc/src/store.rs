//! Fixed-capacity circular byte storage with a small header region.
//!
//! The store performs no synchronization of its own. Header counters are
//! exposed as atomics; all ordering is the queue layer's job.

use crate::QPos;
use crate::error::StoreError;
use crate::layout::{
    CACHE_LINE, PREAMBLE_LEN, STORE_MAGIC, STORE_VERSION, StorePreamble, bytes_for_store,
    round_header_len,
};
use floor_mmap::MmapFileMut;
use std::alloc::{self, Layout};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How long `AttachOrInitialize` waits for a concurrent creator to finish.
const ATTACH_WAIT: Duration = Duration::from_millis(500);

/// Circular byte storage shared by the writers and readers of one queue.
///
/// Implementations may be process-local or shared across processes; the
/// queue algorithms only go through this trait.
pub trait CircularStore: Send + Sync {
    /// Length of the circular data region (`QLen`).
    fn capacity(&self) -> u64;

    /// The header region as 64-bit atomic words.
    fn header(&self) -> &[AtomicU64];

    /// Copy `src` into storage starting at `pos`, wrapping at the end.
    fn copy_in(&self, pos: QPos, src: &[u8]);

    /// Copy bytes starting at `pos` into `dst`, wrapping at the end.
    fn copy_out(&self, pos: QPos, dst: &mut [u8]);

    /// Direct view of `len` bytes at `pos`, or `None` if the span wraps.
    fn span(&self, pos: QPos, len: usize) -> Option<&[u8]>;

    #[inline]
    fn would_cross_boundary(&self, pos: QPos, len: usize) -> bool {
        let cap = self.capacity();
        pos % cap + len as u64 > cap
    }
}

/// Raw header + data pointers shared by both backings.
struct Region {
    header: *mut u8,
    header_len: usize,
    data: *mut u8,
    len: u64,
}

// SAFETY: the region is plain memory that outlives the owning store. Every
// concurrent access goes through atomics (header) or through byte copies
// whose consistency the queue layer validates against the header counters.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    #[inline]
    fn header(&self) -> &[AtomicU64] {
        // SAFETY: header is 64-byte aligned and header_len is a multiple of 64.
        unsafe {
            std::slice::from_raw_parts(self.header as *const AtomicU64, self.header_len / 8)
        }
    }

    #[inline]
    fn split(&self, pos: QPos, len: usize) -> (usize, usize) {
        assert!(len as u64 <= self.len, "{len} bytes do not fit in the store");
        let off = (pos % self.len) as usize;
        let first = len.min(self.len as usize - off);
        (off, first)
    }

    #[inline]
    fn copy_in(&self, pos: QPos, src: &[u8]) {
        let (off, first) = self.split(pos, src.len());
        // SAFETY: split() keeps both ranges inside the data region.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(off), first);
            ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data, src.len() - first);
        }
    }

    #[inline]
    fn copy_out(&self, pos: QPos, dst: &mut [u8]) {
        let (off, first) = self.split(pos, dst.len());
        // SAFETY: split() keeps both ranges inside the data region.
        unsafe {
            ptr::copy_nonoverlapping(self.data.add(off), dst.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.data, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }

    #[inline]
    fn span(&self, pos: QPos, len: usize) -> Option<&[u8]> {
        let (off, first) = self.split(pos, len);
        if first < len {
            return None;
        }
        // SAFETY: [off, off + len) lies inside the data region.
        Some(unsafe { std::slice::from_raw_parts(self.data.add(off), len) })
    }
}

macro_rules! delegate_store {
    ($ty:ty) => {
        impl CircularStore for $ty {
            #[inline]
            fn capacity(&self) -> u64 {
                self.region.len
            }

            #[inline]
            fn header(&self) -> &[AtomicU64] {
                self.region.header()
            }

            #[inline]
            fn copy_in(&self, pos: QPos, src: &[u8]) {
                self.region.copy_in(pos, src)
            }

            #[inline]
            fn copy_out(&self, pos: QPos, dst: &mut [u8]) {
                self.region.copy_out(pos, dst)
            }

            #[inline]
            fn span(&self, pos: QPos, len: usize) -> Option<&[u8]> {
                self.region.span(pos, len)
            }
        }
    };
}

/// Process-local store on the heap. Used for in-process fan-out and tests.
pub struct HeapStore {
    region: Region,
    layout: Layout,
}

impl HeapStore {
    /// # Panics
    /// Panics if `queue_len` is zero or does not fit in the address space.
    pub fn new(header_len: usize, queue_len: u64) -> Self {
        assert!(queue_len > 0, "queue length must be non-zero");
        let header_len = round_header_len(header_len);
        let layout = Layout::from_size_align(header_len + queue_len as usize, CACHE_LINE)
            .expect("queue too large for this address space");

        // SAFETY: layout has non-zero size.
        let base = unsafe { alloc::alloc_zeroed(layout) };
        if base.is_null() {
            alloc::handle_alloc_error(layout);
        }

        Self {
            region: Region {
                header: base,
                header_len,
                // SAFETY: header_len < layout.size()
                data: unsafe { base.add(header_len) },
                len: queue_len,
            },
            layout,
        }
    }
}

impl Drop for HeapStore {
    fn drop(&mut self) {
        // SAFETY: allocated in new() with the same layout.
        unsafe { alloc::dealloc(self.region.header, self.layout) };
    }
}

delegate_store!(HeapStore);

/// How a process attaches to a shared-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate the file and zero the header.
    Initialize,
    /// Attach to a file some other process initialized.
    Attach,
    /// Initialize if this process creates the file, attach otherwise.
    AttachOrInitialize,
}

/// Store backed by a memory-mapped file, shared by every process mapping
/// the same path with the same geometry.
pub struct MmapStore {
    /// Owns the mapping; `region` points into it.
    _mm: MmapFileMut,
    region: Region,
    path: PathBuf,
}

impl MmapStore {
    pub fn open<P: AsRef<Path>>(
        path: P,
        header_len: usize,
        queue_len: u64,
        mode: OpenMode,
    ) -> Result<Self, StoreError> {
        assert!(queue_len > 0, "queue length must be non-zero");
        let path = path.as_ref();
        let bytes = bytes_for_store(header_len, queue_len);

        match mode {
            OpenMode::Initialize => {
                let mm = MmapFileMut::create_rw(path, bytes).map_err(|e| io_error(path, e))?;
                Ok(Self::initialize(path, mm, header_len, queue_len))
            }
            OpenMode::Attach => Self::attach(path, header_len, queue_len),
            OpenMode::AttachOrInitialize => match MmapFileMut::create_new_rw(path, bytes) {
                Ok(mm) => Ok(Self::initialize(path, mm, header_len, queue_len)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::attach_when_ready(path, header_len, queue_len)
                }
                Err(e) => Err(io_error(path, e)),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize(path: &Path, mut mm: MmapFileMut, header_len: usize, queue_len: u64) -> Self {
        let header_len = round_header_len(header_len);
        let base = mm.as_mut_ptr();

        // SAFETY: the mapping was just sized by bytes_for_store(); nobody can
        // use it before the magic is published below.
        unsafe {
            let pre = &mut *(base as *mut StorePreamble);
            pre.version = STORE_VERSION;
            pre.header_len = header_len as u64;
            pre.queue_len = queue_len;
            ptr::write_bytes(base.add(PREAMBLE_LEN), 0, header_len);
            pre.magic.store(STORE_MAGIC, Ordering::Release);
        }
        tracing::debug!(path = %path.display(), header_len, queue_len, "initialized queue store");

        Self::from_mapping(path, mm, header_len, queue_len)
    }

    fn attach(path: &Path, header_len: usize, queue_len: u64) -> Result<Self, StoreError> {
        let mut mm = MmapFileMut::open_rw(path).map_err(|e| io_error(path, e))?;
        let display = || path.display().to_string();

        if mm.len() < PREAMBLE_LEN {
            return Err(StoreError::Uninitialized { path: display() });
        }

        // SAFETY: at least PREAMBLE_LEN bytes are mapped.
        let pre = unsafe { &*(mm.as_mut_ptr() as *const StorePreamble) };
        if !pre.is_ready() {
            return Err(StoreError::Uninitialized { path: display() });
        }
        if pre.magic.load(Ordering::Acquire) != STORE_MAGIC {
            return Err(StoreError::BadMagic { path: display() });
        }
        if pre.version != STORE_VERSION {
            return Err(StoreError::VersionMismatch {
                path: display(),
                expected: STORE_VERSION,
                found: pre.version,
            });
        }

        let expected_header = round_header_len(header_len) as u64;
        if pre.header_len != expected_header
            || pre.queue_len != queue_len
            || (mm.len() as u64) < bytes_for_store(header_len, queue_len)
        {
            return Err(StoreError::Geometry {
                path: display(),
                expected_header,
                found_header: pre.header_len,
                expected_len: queue_len,
                found_len: pre.queue_len,
            });
        }

        tracing::debug!(path = %path.display(), "attached to queue store");
        Ok(Self::from_mapping(path, mm, expected_header as usize, queue_len))
    }

    fn attach_when_ready(path: &Path, header_len: usize, queue_len: u64) -> Result<Self, StoreError> {
        let deadline = Instant::now() + ATTACH_WAIT;
        loop {
            match Self::attach(path, header_len, queue_len) {
                Err(StoreError::Uninitialized { .. }) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                other => return other,
            }
        }
    }

    fn from_mapping(path: &Path, mut mm: MmapFileMut, header_len: usize, queue_len: u64) -> Self {
        let base = mm.as_mut_ptr();
        // SAFETY: the mapping holds preamble + header + data.
        let (header, data) = unsafe {
            let header = base.add(PREAMBLE_LEN);
            (header, header.add(header_len))
        };
        Self {
            _mm: mm,
            region: Region {
                header,
                header_len,
                data,
                len: queue_len,
            },
            path: path.to_path_buf(),
        }
    }
}

delegate_store!(MmapStore);

fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
