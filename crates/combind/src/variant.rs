//! Caller-visible values and their native tagged representation
//!
//! [`Variant`] is what bound methods accept and return. [`NativeVariant`] is
//! the `#[repr(C)]` tagged union the native side understands (`VARIANT`): 16
//! bytes on 32-bit targets and 24 on 64-bit targets.
//!
//! Conversions between the two transfer ownership: a native variant built
//! from a [`Variant`] holds its own reference on interface values and its own
//! BSTR allocation, and [`NativeVariant::into_variant`] takes both back.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::bstr;
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::hresult::DISP_E_PARAMNOTFOUND;
use crate::interfaces::{IID_IDISPATCH, IID_IUNKNOWN};
use crate::object::Object;
use crate::pointer::{ComPointers, InterfacePointer};

pub const VT_EMPTY: u16 = 0;
pub const VT_NULL: u16 = 1;
pub const VT_I2: u16 = 2;
pub const VT_I4: u16 = 3;
pub const VT_R4: u16 = 4;
pub const VT_R8: u16 = 5;
pub const VT_BSTR: u16 = 8;
pub const VT_DISPATCH: u16 = 9;
pub const VT_ERROR: u16 = 10;
pub const VT_BOOL: u16 = 11;
pub const VT_VARIANT: u16 = 12;
pub const VT_UNKNOWN: u16 = 13;
pub const VT_UI2: u16 = 18;
pub const VT_UI4: u16 = 19;
pub const VT_I8: u16 = 20;
pub const VT_UI8: u16 = 21;
pub const VT_INT: u16 = 22;
pub const VT_UINT: u16 = 23;
pub const VT_BYREF: u16 = 0x4000;

pub const VARIANT_TRUE: i16 = -1;
pub const VARIANT_FALSE: i16 = 0;

/// A value crossing a bound call.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Empty,
    Null,
    /// "Argument not supplied" sentinel for optional variant parameters.
    Missing,
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(usize),
    Guid(Guid),
    Str(String),
    Unknown(InterfacePointer),
    Dispatch(InterfacePointer),
    Object(Object),
    /// An in-process object that hands out interface pointers by id.
    Coclass(Arc<dyn ComPointers>),
    /// Several out values of one call, in declaration order.
    Array(Vec<Variant>),
}

impl Variant {
    /// Whether a property setter should treat this value as an object
    /// reference (put-by-reference) rather than a plain value.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Variant::Unknown(_) | Variant::Dispatch(_) | Variant::Object(_) | Variant::Coclass(_)
        )
    }

    /// Values that convert to a null interface pointer.
    pub fn is_nullish(&self) -> bool {
        match self {
            Variant::Empty | Variant::Null => true,
            Variant::I32(0) | Variant::I64(0) | Variant::Pointer(0) => true,
            Variant::Unknown(p) | Variant::Dispatch(p) => p.is_null(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Variant::Bool(b) => Some(if b { -1 } else { 0 }),
            Variant::I16(v) => Some(v.into()),
            Variant::U16(v) => Some(v.into()),
            Variant::I32(v) => Some(v.into()),
            Variant::U32(v) => Some(v.into()),
            Variant::I64(v) => Some(v),
            Variant::U64(v) => i64::try_from(v).ok(),
            Variant::Pointer(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Variant::F32(v) => Some(v.into()),
            Variant::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Variant::Bool(b) => Some(b),
            _ => self.as_i64().map(|v| v != 0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The interface pointer carried by this value, if any.
    pub fn as_pointer(&self) -> Option<&InterfacePointer> {
        match self {
            Variant::Unknown(p) | Variant::Dispatch(p) => Some(p),
            Variant::Object(o) => Some(o.pointer()),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Variant::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Variant>> {
        match self {
            Variant::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        use Variant::*;
        match (self, other) {
            (Empty, Empty) | (Null, Null) | (Missing, Missing) => true,
            (Bool(a), Bool(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (Pointer(a), Pointer(b)) => a == b,
            (Guid(a), Guid(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Unknown(a), Unknown(b)) | (Dispatch(a), Dispatch(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Coclass(a), Coclass(b)) => Arc::ptr_eq(a, b),
            (Array(a), Array(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! variant_from {
    ($($ty:ty => $arm:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::$arm(value)
                }
            }
        )*
    };
}

variant_from! {
    bool => Bool,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Guid => Guid,
    String => Str,
    Object => Object,
    Vec<Variant> => Array,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_string())
    }
}

impl From<InterfacePointer> for Variant {
    fn from(value: InterfacePointer) -> Self {
        if value.iid() == IID_IDISPATCH {
            Variant::Dispatch(value)
        } else {
            Variant::Unknown(value)
        }
    }
}

impl From<()> for Variant {
    fn from(_: ()) -> Self {
        Variant::Empty
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => f.write_str("<empty>"),
            Variant::Null => f.write_str("<null>"),
            Variant::Missing => f.write_str("<missing>"),
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::I16(v) => write!(f, "{v}"),
            Variant::U16(v) => write!(f, "{v}"),
            Variant::I32(v) => write!(f, "{v}"),
            Variant::U32(v) => write!(f, "{v}"),
            Variant::I64(v) => write!(f, "{v}"),
            Variant::U64(v) => write!(f, "{v}"),
            Variant::F32(v) => write!(f, "{v}"),
            Variant::F64(v) => write!(f, "{v}"),
            Variant::Pointer(v) => write!(f, "0x{v:x}"),
            Variant::Guid(g) => write!(f, "{g:?}"),
            Variant::Str(s) => f.write_str(s),
            Variant::Unknown(p) | Variant::Dispatch(p) => write!(f, "{p:?}"),
            Variant::Object(o) => write!(f, "{o:?}"),
            Variant::Coclass(c) => write!(f, "{c:?}"),
            Variant::Array(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// =============================================================================
// Native representation
// =============================================================================

#[repr(C)]
#[derive(Clone, Copy)]
pub union VariantData {
    pub bool_val: i16,
    pub i16_val: i16,
    pub u16_val: u16,
    pub i32_val: i32,
    pub u32_val: u32,
    pub i64_val: i64,
    pub u64_val: u64,
    pub f32_val: f32,
    pub f64_val: f64,
    pub ptr: *mut c_void,
    pub bstr: *mut u16,
    pub scode: i32,
    /// Sizes the union like `BRECORD` (two pointers).
    pub record: [usize; 2],
}

/// Native `VARIANT`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NativeVariant {
    pub vt: u16,
    pub reserved: [u16; 3],
    pub data: VariantData,
}

impl fmt::Debug for NativeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeVariant")
            .field("vt", &self.vt)
            .field("data", unsafe { &self.data.record })
            .finish()
    }
}

impl Default for NativeVariant {
    fn default() -> Self {
        Self::empty()
    }
}

impl NativeVariant {
    pub const fn empty() -> Self {
        Self {
            vt: VT_EMPTY,
            reserved: [0; 3],
            data: VariantData { record: [0; 2] },
        }
    }

    fn with(vt: u16, data: VariantData) -> Self {
        let mut v = Self::empty();
        v.vt = vt;
        v.data = data;
        v
    }

    /// Build an owning native variant. Interface values are AddRef'd and
    /// strings are allocated; release both with [`NativeVariant::clear`] or
    /// hand them back with [`NativeVariant::into_variant`].
    pub fn from_variant(value: &Variant) -> Result<Self> {
        let v = match value {
            Variant::Empty => Self::empty(),
            Variant::Null => Self::with(VT_NULL, VariantData { record: [0; 2] }),
            Variant::Missing => Self::with(
                VT_ERROR,
                VariantData {
                    scode: DISP_E_PARAMNOTFOUND,
                },
            ),
            Variant::Bool(b) => Self::with(
                VT_BOOL,
                VariantData {
                    bool_val: if *b { VARIANT_TRUE } else { VARIANT_FALSE },
                },
            ),
            Variant::I16(v) => Self::with(VT_I2, VariantData { i16_val: *v }),
            Variant::U16(v) => Self::with(VT_UI2, VariantData { u16_val: *v }),
            Variant::I32(v) => Self::with(VT_I4, VariantData { i32_val: *v }),
            Variant::U32(v) => Self::with(VT_UI4, VariantData { u32_val: *v }),
            Variant::I64(v) => Self::with(VT_I8, VariantData { i64_val: *v }),
            Variant::U64(v) => Self::with(VT_UI8, VariantData { u64_val: *v }),
            Variant::F32(v) => Self::with(VT_R4, VariantData { f32_val: *v }),
            Variant::F64(v) => Self::with(VT_R8, VariantData { f64_val: *v }),
            Variant::Str(s) => Self::with(
                VT_BSTR,
                VariantData {
                    bstr: bstr::alloc(s),
                },
            ),
            Variant::Unknown(p) => Self::with(
                VT_UNKNOWN,
                VariantData {
                    ptr: p.clone().into_raw(),
                },
            ),
            Variant::Dispatch(p) => Self::with(
                VT_DISPATCH,
                VariantData {
                    ptr: p.clone().into_raw(),
                },
            ),
            Variant::Object(o) => {
                let vt = if o.interface().is_dispatch() {
                    VT_DISPATCH
                } else {
                    VT_UNKNOWN
                };
                Self::with(
                    vt,
                    VariantData {
                        ptr: o.pointer().clone().into_raw(),
                    },
                )
            }
            Variant::Coclass(table) => {
                let p = table.lookup(&IID_IUNKNOWN).ok_or_else(|| {
                    Error::type_error("object exposes no IUnknown pointer")
                })?;
                Self::with(VT_UNKNOWN, VariantData { ptr: p.into_raw() })
            }
            Variant::Pointer(_) | Variant::Guid(_) | Variant::Array(_) => {
                return Err(Error::type_error(format!(
                    "cannot store {value:?} in a native variant"
                )));
            }
        };
        Ok(v)
    }

    /// Convert into a [`Variant`], taking ownership of any interface
    /// reference and freeing any string. The native variant is left empty.
    ///
    /// # Safety
    /// `self` must be a valid, owned native variant.
    pub unsafe fn into_variant(&mut self) -> Result<Variant> {
        let taken = std::mem::take(self);
        unsafe {
            let value = match taken.vt {
                VT_EMPTY => Variant::Empty,
                VT_NULL => Variant::Null,
                VT_ERROR if taken.data.scode == DISP_E_PARAMNOTFOUND => Variant::Missing,
                VT_ERROR => Variant::I32(taken.data.scode),
                VT_BOOL => Variant::Bool(taken.data.bool_val != VARIANT_FALSE),
                VT_I2 => Variant::I16(taken.data.i16_val),
                VT_UI2 => Variant::U16(taken.data.u16_val),
                VT_I4 | VT_INT => Variant::I32(taken.data.i32_val),
                VT_UI4 | VT_UINT => Variant::U32(taken.data.u32_val),
                VT_I8 => Variant::I64(taken.data.i64_val),
                VT_UI8 => Variant::U64(taken.data.u64_val),
                VT_R4 => Variant::F32(taken.data.f32_val),
                VT_R8 => Variant::F64(taken.data.f64_val),
                VT_BSTR => Variant::Str(bstr::take(taken.data.bstr)),
                VT_UNKNOWN => Variant::Unknown(InterfacePointer::from_raw(
                    taken.data.ptr,
                    IID_IUNKNOWN,
                )),
                VT_DISPATCH => Variant::Dispatch(InterfacePointer::from_raw(
                    taken.data.ptr,
                    IID_IDISPATCH,
                )),
                vt => {
                    return Err(Error::type_error(format!(
                        "unsupported variant type {vt:#x}"
                    )));
                }
            };
            Ok(value)
        }
    }

    /// Release owned contents and reset to empty.
    ///
    /// # Safety
    /// `self` must be a valid, owned native variant.
    pub unsafe fn clear(&mut self) {
        // dropping the converted value releases interfaces and strings
        let _ = unsafe { self.into_variant() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_variant_size() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(std::mem::size_of::<NativeVariant>(), 24);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(std::mem::size_of::<NativeVariant>(), 16);
    }

    #[test]
    fn test_scalar_conversion_roundtrip() {
        for value in [
            Variant::Bool(true),
            Variant::I32(-5),
            Variant::U64(9),
            Variant::F64(2.5),
            Variant::Str("text".into()),
            Variant::Missing,
            Variant::Null,
        ] {
            let mut native = NativeVariant::from_variant(&value).unwrap();
            assert_eq!(unsafe { native.into_variant() }.unwrap(), value);
            assert_eq!(native.vt, VT_EMPTY);
        }
    }

    #[test]
    fn test_bool_uses_variant_true() {
        let native = NativeVariant::from_variant(&Variant::Bool(true)).unwrap();
        assert_eq!(native.vt, VT_BOOL);
        assert_eq!(unsafe { native.data.bool_val }, -1);
    }

    #[test]
    fn test_missing_is_param_not_found() {
        let native = NativeVariant::from_variant(&Variant::Missing).unwrap();
        assert_eq!(native.vt, VT_ERROR);
        assert_eq!(unsafe { native.data.scode }, DISP_E_PARAMNOTFOUND);
    }

    #[test]
    fn test_unsupported_values() {
        assert!(NativeVariant::from_variant(&Variant::Pointer(1)).is_err());
        let mut native = NativeVariant::empty();
        native.vt = VT_BYREF | VT_I4;
        assert!(unsafe { native.into_variant() }.is_err());
    }

    #[test]
    fn test_object_detection() {
        assert!(!Variant::I32(1).is_object());
        assert!(Variant::Unknown(InterfacePointer::null(IID_IUNKNOWN)).is_object());
        assert!(Variant::I32(0).is_nullish());
        assert!(!Variant::I32(1).is_nullish());
    }

    #[test]
    fn test_integer_accessors() {
        assert_eq!(Variant::U16(7).as_i32(), Some(7));
        assert_eq!(Variant::I64(-1).as_usize(), None);
        assert_eq!(Variant::Bool(true).as_i64(), Some(-1));
        assert_eq!(Variant::from("x").as_str(), Some("x"));
    }
}
