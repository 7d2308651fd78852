//! Hand-written fake components with `#[repr(C)]` layouts.
//!
//! Each fake is a leaked `FakeObject` whose first field is the vtable
//! pointer, so `this` can be cast straight back to the object. Slots 0-2
//! are always the counting `IUnknown` implementation below.

#![allow(dead_code)]

use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use combind::hresult::{E_NOINTERFACE, E_POINTER, S_OK};
use combind::interfaces::{IID_ISUPPORTERRORINFO, IID_IUNKNOWN};
use combind::{Guid, HRESULT, InterfacePointer};

#[repr(C)]
pub struct FakeObject {
    vtbl: *const *const c_void,
    iids: Vec<Guid>,
    error_info: Option<&'static FakeObject>,
    pub refs: AtomicU32,
    pub add_refs: AtomicU32,
    pub releases: AtomicU32,
    pub queries: AtomicU32,
    /// Scratch state for the fake's own methods.
    pub value: AtomicI32,
    log: Mutex<Vec<String>>,
}

unsafe impl Send for FakeObject {}
unsafe impl Sync for FakeObject {}

impl FakeObject {
    /// A fake answering `QueryInterface` for `iids` (and `IUnknown`), with
    /// `slots` following the three `IUnknown` entries.
    pub fn new(iids: &[Guid], slots: &[*const c_void]) -> &'static FakeObject {
        Self::build(iids, slots, None)
    }

    /// Like [`FakeObject::new`], also answering `ISupportErrorInfo` with a
    /// companion that claims support for every interface.
    pub fn with_error_info(iids: &[Guid], slots: &[*const c_void]) -> &'static FakeObject {
        let companion = Self::build(
            &[IID_ISUPPORTERRORINFO],
            &[supports_every_interface as *const c_void],
            None,
        );
        Self::build(iids, slots, Some(companion))
    }

    fn build(
        iids: &[Guid],
        slots: &[*const c_void],
        error_info: Option<&'static FakeObject>,
    ) -> &'static FakeObject {
        let mut table: Vec<*const c_void> = vec![
            query_interface as *const c_void,
            add_ref as *const c_void,
            release as *const c_void,
        ];
        table.extend_from_slice(slots);
        let table: &'static [*const c_void] = Box::leak(table.into_boxed_slice());
        Box::leak(Box::new(FakeObject {
            vtbl: table.as_ptr(),
            iids: iids.to_vec(),
            error_info,
            refs: AtomicU32::new(0),
            add_refs: AtomicU32::new(0),
            releases: AtomicU32::new(0),
            queries: AtomicU32::new(0),
            value: AtomicI32::new(0),
            log: Mutex::new(Vec::new()),
        }))
    }

    pub fn raw(&'static self) -> *mut c_void {
        self as *const FakeObject as *mut c_void
    }

    /// A new owning pointer to this fake; takes one reference.
    pub fn pointer(&'static self, iid: Guid) -> InterfacePointer {
        unsafe { InterfacePointer::from_borrowed(self.raw(), iid) }
    }

    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn add_refs(&self) -> u32 {
        self.add_refs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set_value(&self, v: i32) {
        self.value.store(v, Ordering::SeqCst);
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.log.lock().unwrap().last().cloned()
    }
}

/// Recover the fake behind a `this` pointer.
///
/// # Safety
/// `this` must come from [`FakeObject::raw`].
pub unsafe fn fake<'a>(this: *mut c_void) -> &'a FakeObject {
    unsafe { &*(this as *const FakeObject) }
}

unsafe extern "system" fn query_interface(
    this: *mut c_void,
    riid: *const Guid,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if riid.is_null() || ppv.is_null() {
        return E_POINTER;
    }
    unsafe {
        let obj = fake(this);
        obj.queries.fetch_add(1, Ordering::SeqCst);
        let iid = *riid;
        if iid == IID_ISUPPORTERRORINFO
            && let Some(companion) = obj.error_info
        {
            add_ref(companion.raw());
            *ppv = companion.raw();
            return S_OK;
        }
        if iid == IID_IUNKNOWN || obj.iids.contains(&iid) {
            add_ref(this);
            *ppv = this;
            S_OK
        } else {
            *ppv = ptr::null_mut();
            E_NOINTERFACE
        }
    }
}

unsafe extern "system" fn add_ref(this: *mut c_void) -> u32 {
    let obj = unsafe { fake(this) };
    obj.add_refs.fetch_add(1, Ordering::SeqCst);
    obj.refs.fetch_add(1, Ordering::SeqCst) + 1
}

unsafe extern "system" fn release(this: *mut c_void) -> u32 {
    let obj = unsafe { fake(this) };
    obj.releases.fetch_add(1, Ordering::SeqCst);
    obj.refs.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
}

unsafe extern "system" fn supports_every_interface(
    _this: *mut c_void,
    _riid: *const Guid,
) -> HRESULT {
    S_OK
}

/// A fresh interface id for a test-local interface.
pub const fn test_iid(n: u128) -> Guid {
    Guid::from_u128(0x7e57_0000_0000_4000_8000_000000000000 | n)
}
