//! Length-prefixed wide strings (BSTR)
//!
//! A BSTR points at UTF-16 data preceded by a 4-byte byte-length prefix and
//! followed by a terminating NUL. Who owns the allocator depends on the
//! process: in-process components use the default heap allocator here, and a
//! host talking to system components installs one backed by the system
//! allocator (see [`SystemAllocator`] with the `windows-compat` feature).

use std::alloc::{self, Layout};
use std::sync::Arc;

use parking_lot::RwLock;

/// Allocation seam for BSTR values crossing the call boundary.
pub trait StringAllocator: Send + Sync {
    /// Allocate a BSTR holding `s`.
    fn alloc(&self, s: &str) -> *mut u16;

    /// Free a BSTR returned by [`StringAllocator::alloc`] or produced by a
    /// component. Null is ignored.
    ///
    /// # Safety
    /// `p` must be null or a live BSTR from this allocator.
    unsafe fn free(&self, p: *mut u16);
}

/// Heap allocator using the BSTR layout directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

const PREFIX: usize = std::mem::size_of::<u32>();

fn layout_for(units: usize) -> Option<Layout> {
    // prefix + data + NUL, u32 aligned so the prefix read is aligned
    let size = units.checked_add(1)?.checked_mul(2)?.checked_add(PREFIX)?;
    Layout::from_size_align(size, 4).ok()
}

impl StringAllocator for HeapAllocator {
    fn alloc(&self, s: &str) -> *mut u16 {
        let wide: Vec<u16> = s.encode_utf16().collect();
        let Some(layout) = layout_for(wide.len()) else {
            return std::ptr::null_mut();
        };
        unsafe {
            let base = alloc::alloc_zeroed(layout);
            if base.is_null() {
                alloc::handle_alloc_error(layout);
            }
            (base as *mut u32).write((wide.len() * 2) as u32);
            let data = base.add(PREFIX) as *mut u16;
            std::ptr::copy_nonoverlapping(wide.as_ptr(), data, wide.len());
            data
        }
    }

    unsafe fn free(&self, p: *mut u16) {
        if p.is_null() {
            return;
        }
        unsafe {
            let units = byte_len(p) / 2;
            let base = (p as *mut u8).sub(PREFIX);
            if let Some(layout) = layout_for(units) {
                alloc::dealloc(base, layout);
            }
        }
    }
}

/// BSTR allocator backed by the system string allocator.
#[cfg(feature = "windows-compat")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

#[cfg(feature = "windows-compat")]
impl StringAllocator for SystemAllocator {
    fn alloc(&self, s: &str) -> *mut u16 {
        windows_core::BSTR::from(s).into_raw() as *mut u16
    }

    unsafe fn free(&self, p: *mut u16) {
        if !p.is_null() {
            drop(unsafe { windows_core::BSTR::from_raw(p) });
        }
    }
}

static ALLOCATOR: RwLock<Option<Arc<dyn StringAllocator>>> = RwLock::new(None);

/// Install the allocator used for every BSTR crossing the call boundary.
pub fn set_string_allocator(allocator: Arc<dyn StringAllocator>) {
    *ALLOCATOR.write() = Some(allocator);
}

fn with_allocator<R>(f: impl FnOnce(&dyn StringAllocator) -> R) -> R {
    match ALLOCATOR.read().as_ref() {
        Some(allocator) => f(allocator.as_ref()),
        None => f(&HeapAllocator),
    }
}

/// Allocate a BSTR with the active allocator.
pub fn alloc(s: &str) -> *mut u16 {
    with_allocator(|a| a.alloc(s))
}

/// Free a BSTR with the active allocator.
///
/// # Safety
/// `p` must be null or a live BSTR from the active allocator.
pub unsafe fn free(p: *mut u16) {
    with_allocator(|a| unsafe { a.free(p) })
}

/// Byte length stored in the prefix.
///
/// # Safety
/// `p` must be a live, non-null BSTR.
pub unsafe fn byte_len(p: *const u16) -> usize {
    unsafe { ((p as *const u8).sub(PREFIX) as *const u32).read() as usize }
}

/// Copy a BSTR into a `String`. Null reads as the empty string.
///
/// # Safety
/// `p` must be null or a live BSTR.
pub unsafe fn read(p: *const u16) -> String {
    if p.is_null() {
        return String::new();
    }
    unsafe {
        let units = byte_len(p) / 2;
        String::from_utf16_lossy(std::slice::from_raw_parts(p, units))
    }
}

/// Read and free a BSTR received from a component.
///
/// # Safety
/// `p` must be null or a live BSTR owned by the caller.
pub unsafe fn take(p: *mut u16) -> String {
    unsafe {
        let s = read(p);
        free(p);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_roundtrip_keeps_prefix_and_nul() {
        let p = HeapAllocator.alloc("héllo");
        unsafe {
            assert_eq!(byte_len(p), 10);
            assert_eq!(*p.add(5), 0);
            assert_eq!(read(p), "héllo");
            HeapAllocator.free(p);
        }
    }

    #[test]
    fn test_null_reads_empty() {
        unsafe {
            assert_eq!(read(std::ptr::null()), "");
            free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_take_frees() {
        let p = alloc("abc");
        assert_eq!(unsafe { take(p) }, "abc");
    }
}
