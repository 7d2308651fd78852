//! Reference-counted interface handles
//!
//! An [`InterfacePointer`] owns exactly one reference on the component it
//! points at. Cloning calls `AddRef` once; dropping (or [`release`]) calls
//! `Release` once. After [`crate::shutdown`] has run, releases are skipped
//! for every pointer: the component subsystem may already be gone.
//!
//! [`release`]: InterfacePointer::release

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{Error, Result, StatusError};
use crate::guid::Guid;
use crate::hresult::E_NOINTERFACE;
use crate::native;
use crate::variant::Variant;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Whether process shutdown has been signalled.
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Set the shutdown flag. Returns `true` the first time.
pub(crate) fn mark_shutdown() -> bool {
    !SHUTDOWN.swap(true, Ordering::Relaxed)
}

/// An object that hands out its interface pointers by id without a
/// `QueryInterface` round trip.
pub trait ComPointers: Send + Sync + fmt::Debug {
    /// A new reference to the interface `iid`, if the object exposes it.
    fn lookup(&self, iid: &Guid) -> Option<InterfacePointer>;
}

/// Lifecycle of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerState {
    /// Null handle; owns nothing.
    Unbound,
    Bound(NonNull<c_void>),
    /// The owned reference has been given up.
    Released,
}

pub struct InterfacePointer {
    state: PointerState,
    iid: Guid,
    origin: Option<Weak<dyn ComPointers>>,
}

// Components are assumed free-threaded; the reference count lives in the
// component and is updated atomically there.
unsafe impl Send for InterfacePointer {}
unsafe impl Sync for InterfacePointer {}

impl InterfacePointer {
    /// A null handle for interface `iid`.
    pub const fn null(iid: Guid) -> Self {
        Self {
            state: PointerState::Unbound,
            iid,
            origin: None,
        }
    }

    /// Take ownership of one reference held by `raw`. Null gives an unbound
    /// handle.
    ///
    /// # Safety
    /// `raw` must be null or a live interface pointer for `iid` whose
    /// reference the caller gives up.
    pub unsafe fn from_raw(raw: *mut c_void, iid: Guid) -> Self {
        let state = match NonNull::new(raw) {
            Some(p) => PointerState::Bound(p),
            None => PointerState::Unbound,
        };
        Self {
            state,
            iid,
            origin: None,
        }
    }

    /// Take a new reference to a borrowed `raw` pointer.
    ///
    /// # Safety
    /// `raw` must be null or a live interface pointer for `iid`.
    pub unsafe fn from_borrowed(raw: *mut c_void, iid: Guid) -> Self {
        if !raw.is_null() {
            unsafe { native::add_ref(raw) };
        }
        unsafe { Self::from_raw(raw, iid) }
    }

    /// Attach a non-owning back-reference to the table this pointer came
    /// from; [`InterfacePointer::narrow`] consults it before querying.
    pub fn with_origin(mut self, origin: Weak<dyn ComPointers>) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn iid(&self) -> Guid {
        self.iid
    }

    pub fn state(&self) -> PointerState {
        self.state
    }

    pub fn is_null(&self) -> bool {
        !matches!(self.state, PointerState::Bound(_))
    }

    /// The raw pointer, still owned by `self`. Null unless bound.
    pub fn as_raw(&self) -> *mut c_void {
        match self.state {
            PointerState::Bound(p) => p.as_ptr(),
            _ => std::ptr::null_mut(),
        }
    }

    /// Give up ownership of the reference without releasing it.
    pub fn into_raw(mut self) -> *mut c_void {
        let raw = self.as_raw();
        self.state = PointerState::Released;
        raw
    }

    /// Release the owned reference now. Further releases are no-ops.
    pub fn release(&mut self) {
        if let PointerState::Bound(p) = self.state {
            self.state = PointerState::Released;
            if is_shutdown() {
                trace!(target: "combind::pointer", ptr = ?p, "release skipped after shutdown");
                return;
            }
            let remaining = unsafe { native::release(p.as_ptr()) };
            trace!(target: "combind::pointer", ptr = ?p, iid = %self.iid, remaining, "release");
        }
    }

    /// Raw `QueryInterface` for `iid`.
    pub fn query(&self, iid: Guid) -> Result<InterfacePointer> {
        let this = self.as_raw();
        if this.is_null() {
            return Ok(Self::null(iid));
        }
        match unsafe { native::query_interface(this, &iid) } {
            Ok(raw) => {
                let mut p = unsafe { Self::from_raw(raw, iid) };
                p.origin = self.origin.clone();
                Ok(p)
            }
            Err(E_NOINTERFACE) => Err(Error::type_error(format!(
                "object does not support interface {iid:?}"
            ))),
            Err(hr) => Err(StatusError::new(hr).into()),
        }
    }

    /// A handle to the same object as interface `iid`.
    ///
    /// Same id duplicates the handle. Otherwise the originating pointer
    /// table (if still alive) answers, and failing that `QueryInterface`.
    pub fn narrow(&self, iid: Guid) -> Result<InterfacePointer> {
        if self.is_null() {
            return Ok(Self::null(iid));
        }
        if self.iid == iid {
            return Ok(self.clone());
        }
        if let Some(table) = self.origin.as_ref().and_then(Weak::upgrade) {
            return table.lookup(&iid).ok_or_else(|| {
                Error::type_error(format!("object does not expose interface {iid:?}"))
            });
        }
        self.query(iid)
    }

    /// Convert a caller-supplied value into a handle for interface `iid`.
    pub fn from_param(value: &Variant, iid: Guid) -> Result<InterfacePointer> {
        if value.is_nullish() {
            return Ok(Self::null(iid));
        }
        match value {
            Variant::Coclass(table) => table.lookup(&iid).ok_or_else(|| {
                Error::type_error(format!("object does not expose interface {iid:?}"))
            }),
            Variant::Object(o) => o.pointer().narrow(iid),
            Variant::Unknown(p) | Variant::Dispatch(p) => p.narrow(iid),
            other => Err(Error::type_error(format!(
                "expected an interface pointer for {iid:?}, got {other:?}"
            ))),
        }
    }
}

impl Clone for InterfacePointer {
    fn clone(&self) -> Self {
        let state = match self.state {
            PointerState::Bound(p) => {
                let count = unsafe { native::add_ref(p.as_ptr()) };
                trace!(target: "combind::pointer", ptr = ?p, iid = %self.iid, count, "add_ref");
                PointerState::Bound(p)
            }
            _ => PointerState::Unbound,
        };
        Self {
            state,
            iid: self.iid,
            origin: self.origin.clone(),
        }
    }
}

impl Drop for InterfacePointer {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for InterfacePointer {
    fn eq(&self, other: &Self) -> bool {
        self.as_raw() == other.as_raw()
    }
}

impl Eq for InterfacePointer {}

impl Hash for InterfacePointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_raw() as usize).hash(state);
    }
}

impl fmt::Debug for InterfacePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            PointerState::Bound(p) => write!(f, "InterfacePointer({:?} @ {:p})", self.iid, p),
            PointerState::Unbound => write!(f, "InterfacePointer({:?} null)", self.iid),
            PointerState::Released => write!(f, "InterfacePointer({:?} released)", self.iid),
        }
    }
}

/// A precomputed id → pointer table for an in-process object.
#[derive(Debug, Default)]
pub struct PointerTable {
    entries: IndexMap<Guid, InterfacePointer>,
}

impl PointerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `pointer` under its interface id.
    pub fn insert(&mut self, pointer: InterfacePointer) -> &mut Self {
        self.entries.insert(pointer.iid(), pointer);
        self
    }

    pub fn contains(&self, iid: &Guid) -> bool {
        self.entries.contains_key(iid)
    }

    /// A new reference to `iid` that remembers this table as its origin.
    pub fn pointer(self: &Arc<Self>, iid: &Guid) -> Option<InterfacePointer> {
        let origin: Weak<dyn ComPointers> = Arc::downgrade(self) as Weak<PointerTable>;
        self.entries.get(iid).map(|p| p.clone().with_origin(origin))
    }
}

impl ComPointers for PointerTable {
    fn lookup(&self, iid: &Guid) -> Option<InterfacePointer> {
        self.entries.get(iid).cloned()
    }
}
