//! Built-in interfaces and their native layouts
//!
//! ## Key Types
//! - [`ComInterface`] - compile-time identity of an interface
//! - [`IUnknown`], [`IDispatch`], [`ISupportErrorInfo`], [`IEnumVARIANT`] -
//!   descriptors for the interfaces the runtime itself relies on
//! - `*Vtbl` structs - `#[repr(C)]` function tables the runtime calls directly
//! - [`ComRefCount`] - reference counter for in-process objects

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::descriptor::InterfaceDescriptor;
use crate::dispatch::{DispParams, ExcepInfo};
use crate::error::Result;
use crate::guid::Guid;
use crate::hresult::HRESULT;
use crate::object::Object;
use crate::pointer::InterfacePointer;
use crate::synth::{BoundInterface, synthesize};
use crate::variant::NativeVariant;

/// An interface known at compile time.
///
/// Implemented by `#[com_interface]` and by the built-in interfaces below.
pub trait ComInterface {
    const IID: Guid;
    const NAME: &'static str;

    /// The interface's descriptor, built once.
    fn descriptor() -> Arc<InterfaceDescriptor>;

    /// Synthesize (or fetch) the binding for this interface.
    fn binding() -> Result<Arc<BoundInterface>> {
        synthesize(&Self::descriptor())
    }

    /// Narrow `pointer` to this interface and bind it.
    fn bind(pointer: &InterfacePointer) -> Result<Object> {
        let narrowed = pointer.narrow(Self::IID)?;
        Ok(Object::new(narrowed, Self::binding()?))
    }
}

// =============================================================================
// Interface ids
// =============================================================================

pub const IID_NULL: Guid = Guid::ZERO;
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);
pub const IID_IDISPATCH: Guid = Guid::from_u128(0x00020400_0000_0000_c000_000000000046);
pub const IID_ISUPPORTERRORINFO: Guid = Guid::from_u128(0xdf0b3d60_548f_101b_8e65_08002b2bd119);
pub const IID_IENUMVARIANT: Guid = Guid::from_u128(0x00020404_0000_0000_c000_000000000046);

// =============================================================================
// Descriptors
// =============================================================================

/// Base of every interface; slots 0-2.
#[crate::proc::com_interface("00000000-0000-0000-c000-000000000046", root, internal)]
pub trait IUnknown {
    fn QueryInterface(&self, riid: *const Guid, #[out] ppv: *mut *mut c_void) -> HRESULT;
    fn AddRef(&self) -> u32;
    fn Release(&self) -> u32;
}

/// Late-bound automation interface; `Invoke` is slot 6.
#[crate::proc::com_interface("00020400-0000-0000-c000-000000000046", extends(IUnknown), internal)]
pub trait IDispatch {
    fn GetTypeInfoCount(&self, #[out] pctinfo: *mut u32) -> HRESULT;
    fn GetTypeInfo(&self, itinfo: u32, #[lcid] lcid: u32, #[out] pptinfo: *mut *mut c_void) -> HRESULT;
    fn GetIDsOfNames(
        &self,
        riid: *const Guid,
        names: *mut *mut u16,
        count: u32,
        #[lcid] lcid: u32,
        dispids: *mut i32,
    ) -> HRESULT;
    fn Invoke(
        &self,
        dispid: i32,
        riid: *const Guid,
        #[lcid] lcid: u32,
        flags: u16,
        params: *mut DispParams,
        result: *mut NativeVariant,
        excepinfo: *mut ExcepInfo,
        argerr: *mut u32,
    ) -> HRESULT;
}

#[crate::proc::com_interface("df0b3d60-548f-101b-8e65-08002b2bd119", internal)]
pub trait ISupportErrorInfo {
    fn InterfaceSupportsErrorInfo(&self, riid: *const Guid) -> HRESULT;
}

/// Enumerator behind `_NewEnum`.
#[crate::proc::com_interface("00020404-0000-0000-c000-000000000046", internal)]
pub trait IEnumVARIANT {
    fn Next(&self, celt: u32, #[out] rgvar: *mut Variant, #[out] fetched: *mut u32) -> HRESULT;
    fn Skip(&self, celt: u32) -> HRESULT;
    fn Reset(&self) -> HRESULT;
    fn Clone(&self, #[out] ppenum: *mut *mut IEnumVARIANT) -> HRESULT;
}

// =============================================================================
// Native layouts
// =============================================================================

#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(*mut c_void, *const Guid, *mut *mut c_void) -> HRESULT,
    pub add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    pub release: unsafe extern "system" fn(*mut c_void) -> u32,
}

#[repr(C)]
pub struct IDispatchVtbl {
    pub base: IUnknownVtbl,
    pub get_type_info_count: unsafe extern "system" fn(*mut c_void, *mut u32) -> HRESULT,
    pub get_type_info:
        unsafe extern "system" fn(*mut c_void, u32, u32, *mut *mut c_void) -> HRESULT,
    pub get_ids_of_names: unsafe extern "system" fn(
        *mut c_void,
        *const Guid,
        *const *const u16,
        u32,
        u32,
        *mut i32,
    ) -> HRESULT,
    pub invoke: unsafe extern "system" fn(
        *mut c_void,
        i32,
        *const Guid,
        u32,
        u16,
        *mut DispParams,
        *mut NativeVariant,
        *mut ExcepInfo,
        *mut u32,
    ) -> HRESULT,
}

#[repr(C)]
pub struct ISupportErrorInfoVtbl {
    pub base: IUnknownVtbl,
    pub interface_supports_error_info: unsafe extern "system" fn(*mut c_void, *const Guid) -> HRESULT,
}

// =============================================================================
// ComRefCount
// =============================================================================

/// Atomic reference counter for in-process objects handed out as interface
/// pointers.
#[repr(transparent)]
#[derive(Debug)]
pub struct ComRefCount(AtomicU32);

impl ComRefCount {
    /// A counter starting at one (the creator's reference).
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    /// Increment the count. Returns the new count.
    #[inline]
    pub fn add_ref(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the count. Returns the new count; at zero the caller
    /// destroys the object.
    #[inline]
    pub fn release(&self) -> u32 {
        let prev = self.0.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
        }
        prev - 1
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ComRefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Direction, TypeTag};

    #[test]
    fn test_builtin_ids_match_constants() {
        assert_eq!(IUnknown::IID, IID_IUNKNOWN);
        assert_eq!(IDispatch::IID, IID_IDISPATCH);
        assert_eq!(ISupportErrorInfo::IID, IID_ISUPPORTERRORINFO);
        assert_eq!(IEnumVARIANT::IID, IID_IENUMVARIANT);
    }

    #[test]
    fn test_dispatch_invoke_is_slot_six() {
        let desc = IDispatch::descriptor();
        assert_eq!(desc.vtable_offset(), Some(3));
        let methods = desc.methods.as_ref().unwrap();
        assert_eq!(methods[3].name, "Invoke");
        assert_eq!(desc.vtable_offset().unwrap() + 3, 6);
    }

    #[test]
    fn test_enum_next_shape() {
        let desc = IEnumVARIANT::descriptor();
        let next = &desc.methods.as_ref().unwrap()[0];
        assert_eq!(next.ret, TypeTag::Status);
        assert_eq!(next.params[1].direction, Direction::Out);
        assert_eq!(next.params[1].tag, TypeTag::Variant);
        let clone = &desc.methods.as_ref().unwrap()[3];
        assert_eq!(clone.params[0].tag, TypeTag::Interface(IID_IENUMVARIANT));
    }

    #[test]
    fn test_lcid_params_are_marked() {
        let desc = IDispatch::descriptor();
        let get_type_info = &desc.methods.as_ref().unwrap()[1];
        assert!(get_type_info.params[1].lcid);
    }

    #[test]
    fn test_ref_count() {
        let rc = ComRefCount::new();
        assert_eq!(rc.add_ref(), 2);
        assert_eq!(rc.release(), 1);
        assert_eq!(rc.count(), 1);
    }
}
