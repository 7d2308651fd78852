//! Raw function-table access and word-ABI trampolines
//!
//! A bound slot never knows its signature at compile time. Every argument is
//! lowered to machine words (see `marshal`) and the function-table entry is
//! called through a trampoline of matching arity, with the receiver first.
//! Integer, pointer and boolean arguments all travel in integer registers or
//! word-sized stack slots under `extern "system"`, so a signature made of
//! `usize`s is call-compatible with the real one.

use std::ffi::c_void;

use crate::guid::Guid;
use crate::hresult::{HRESULT, S_OK, failed};
use crate::interfaces::{IID_ISUPPORTERRORINFO, ISupportErrorInfoVtbl, IUnknownVtbl};

/// Most argument words a slot may take, not counting the receiver.
pub const MAX_WORDS: usize = 16;

/// Read function-table entry `index` of `this`.
///
/// # Safety
/// `this` must be a live interface pointer whose table has more than
/// `index` entries.
#[inline]
pub unsafe fn vtable_entry(this: *mut c_void, index: usize) -> *const c_void {
    unsafe {
        let vtbl = *(this as *const *const *const c_void);
        *vtbl.add(index)
    }
}

#[inline]
unsafe fn unknown_vtbl<'a>(this: *mut c_void) -> &'a IUnknownVtbl {
    unsafe { &**(this as *const *const IUnknownVtbl) }
}

/// # Safety
/// `this` must be a live interface pointer.
pub unsafe fn add_ref(this: *mut c_void) -> u32 {
    unsafe { (unknown_vtbl(this).add_ref)(this) }
}

/// # Safety
/// `this` must be a live interface pointer owning the reference given up.
pub unsafe fn release(this: *mut c_void) -> u32 {
    unsafe { (unknown_vtbl(this).release)(this) }
}

/// `QueryInterface`; on success the returned pointer owns one reference.
///
/// # Safety
/// `this` must be a live interface pointer.
pub unsafe fn query_interface(this: *mut c_void, iid: &Guid) -> Result<*mut c_void, HRESULT> {
    let mut out: *mut c_void = std::ptr::null_mut();
    let hr = unsafe { (unknown_vtbl(this).query_interface)(this, iid, &mut out) };
    if failed(hr) {
        return Err(hr);
    }
    if out.is_null() {
        return Err(crate::hresult::E_POINTER);
    }
    Ok(out)
}

/// Whether `this` reports rich error information for `iid` through
/// `ISupportErrorInfo`.
///
/// # Safety
/// `this` must be a live interface pointer.
pub unsafe fn supports_error_info(this: *mut c_void, iid: &Guid) -> bool {
    unsafe {
        let Ok(sei) = query_interface(this, &IID_ISUPPORTERRORINFO) else {
            return false;
        };
        let vtbl = &**(sei as *const *const ISupportErrorInfoVtbl);
        let hr = (vtbl.interface_supports_error_info)(sei, iid);
        release(sei);
        hr == S_OK
    }
}

macro_rules! word_type {
    ($i:literal) => {
        usize
    };
}

/// Expands to a `match` over the argument count, transmuting `entry` to a
/// function of that many words.
macro_rules! call_by_arity {
    ($entry:expr, $this:expr, $words:expr, $ret:ty; $($n:literal => [$($i:literal),*]),* $(,)?) => {
        match $words.len() {
            $(
                $n => {
                    let f: unsafe extern "system" fn(*mut c_void $(, word_type!($i))*) -> $ret =
                        std::mem::transmute($entry);
                    Some(f($this $(, $words[$i])*))
                }
            )*
            _ => None,
        }
    };
}

macro_rules! word_calls {
    ($($kind:ident -> $ret:ty),* $(,)?) => {
        paste::paste! {
            $(
                /// Call `entry` with `this` and `words`. `None` if there are
                /// more than [`MAX_WORDS`] words.
                ///
                /// # Safety
                /// `entry` must be an `extern "system"` function taking the
                /// receiver followed by exactly `words.len()` word arguments.
                pub unsafe fn [<call_ $kind>](
                    entry: *const c_void,
                    this: *mut c_void,
                    words: &[usize],
                ) -> Option<$ret> {
                    unsafe {
                        call_by_arity!(entry, this, words, $ret;
                            0 => [],
                            1 => [0],
                            2 => [0, 1],
                            3 => [0, 1, 2],
                            4 => [0, 1, 2, 3],
                            5 => [0, 1, 2, 3, 4],
                            6 => [0, 1, 2, 3, 4, 5],
                            7 => [0, 1, 2, 3, 4, 5, 6],
                            8 => [0, 1, 2, 3, 4, 5, 6, 7],
                            9 => [0, 1, 2, 3, 4, 5, 6, 7, 8],
                            10 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
                            11 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
                            12 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
                            13 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
                            14 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13],
                            15 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
                            16 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
                        )
                    }
                }
            )*
        }
    };
}

word_calls! {
    status -> i32,
    value -> u64,
    void -> (),
}
