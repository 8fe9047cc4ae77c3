/// Executable-memory lifecycle
///
/// Trampoline bytes are staged in an anonymous read/write mapping and
/// become callable only after `publish`, which flips the pages to
/// read/execute and makes the fresh instructions visible to the fetch
/// unit. The writable and executable states are separate types, so an
/// entry pointer cannot be taken from a region that is still writable.
use crate::error::FfiError;
use log::trace;
use memmap2::{Mmap, MmapMut};

/// Host page granularity; allocations are rounded up to this.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            size if size > 0 => size as usize,
            _ => 4096,
        }
    }
    #[cfg(not(unix))]
    {
        4096
    }
}

fn round_to_pages(len: usize) -> usize {
    let page = page_size();
    len.div_ceil(page) * page
}

/// A writable staging region for trampoline bytes.
pub struct CodeBuffer {
    map: MmapMut,
}

impl CodeBuffer {
    /// Maps at least `len` bytes of anonymous read/write memory, rounded
    /// up to page granularity.
    pub fn allocate(len: usize) -> Result<CodeBuffer, FfiError> {
        let capacity = round_to_pages(len.max(1));
        let map = MmapMut::map_anon(capacity).map_err(FfiError::OutOfMemory)?;
        trace!("mapped {capacity} byte code buffer at {:p}", map.as_ptr());
        Ok(CodeBuffer { map })
    }

    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Copies emitted bytes to the start of the region.
    pub fn write(&mut self, code: &[u8]) -> Result<(), FfiError> {
        if code.len() > self.map.len() {
            return Err(FfiError::EncodingOverflow {
                written: code.len(),
                capacity: self.map.len(),
            });
        }
        self.map[..code.len()].copy_from_slice(code);
        Ok(())
    }

    /// Transitions the region to read/execute and flushes the
    /// instruction cache over the written range.
    pub fn publish(self, written: usize) -> Result<CodePages, FfiError> {
        let map = self.map.make_exec().map_err(FfiError::OutOfMemory)?;
        flush_icache(map.as_ptr(), written);
        trace!("published {written} bytes of code at {:p}", map.as_ptr());
        Ok(CodePages { map, written })
    }
}

/// A published, immutable, executable region. Unmapped on drop; the
/// caller must guarantee no invocation is in flight at that point.
pub struct CodePages {
    map: Mmap,
    written: usize,
}

impl CodePages {
    pub fn entry(&self) -> *const u8 {
        self.map.as_ptr()
    }

    /// Bytes of code actually emitted, not the page-rounded capacity.
    pub fn code_len(&self) -> usize {
        self.written
    }

    pub fn code(&self) -> &[u8] {
        &self.map[..self.written]
    }
}

/// Makes freshly written instructions visible to the fetch unit.
///
/// x86-64 keeps instruction fetch coherent with stores, so this is a
/// no-op there. AArch64 requires an explicit flush before the first
/// execution of new code.
pub fn flush_icache(ptr: *const u8, len: usize) {
    #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
    unsafe {
        __clear_cache(ptr as *mut libc::c_char, ptr.add(len) as *mut libc::c_char);
    }
    #[cfg(all(target_arch = "aarch64", target_os = "macos"))]
    unsafe {
        sys_icache_invalidate(ptr as *mut libc::c_void, len);
    }
    #[cfg(all(
        target_arch = "aarch64",
        not(any(target_os = "linux", target_os = "macos"))
    ))]
    {
        let _ = (ptr, len);
        log::warn!("no instruction cache flush primitive for this OS; stale code may execute");
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = (ptr, len);
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
extern "C" {
    fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
}

#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
extern "C" {
    fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
}
