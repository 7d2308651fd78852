//! Status codes returned across the native call boundary

/// COM result type. 0 (S_OK) indicates success, negative values indicate errors.
#[allow(clippy::upper_case_acronyms)]
pub type HRESULT = i32;

/// Success
pub const S_OK: HRESULT = 0;
/// Success, but returned false
pub const S_FALSE: HRESULT = 1;
/// Not implemented
pub const E_NOTIMPL: HRESULT = 0x8000_4001_u32 as i32;
/// No such interface supported
pub const E_NOINTERFACE: HRESULT = 0x8000_4002_u32 as i32;
/// Invalid pointer
pub const E_POINTER: HRESULT = 0x8000_4003_u32 as i32;
/// Unspecified failure
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
/// Out of memory
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000E_u32 as i32;
/// Invalid argument
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;
/// Unknown member id
pub const DISP_E_MEMBERNOTFOUND: HRESULT = 0x8002_0003_u32 as i32;
/// Parameter not found; also the scode of the "missing argument" variant
pub const DISP_E_PARAMNOTFOUND: HRESULT = 0x8002_0004_u32 as i32;
/// Argument type mismatch
pub const DISP_E_TYPEMISMATCH: HRESULT = 0x8002_0005_u32 as i32;
/// Unknown name passed to GetIDsOfNames
pub const DISP_E_UNKNOWNNAME: HRESULT = 0x8002_0006_u32 as i32;
/// Exception occurred, details in EXCEPINFO
pub const DISP_E_EXCEPTION: HRESULT = 0x8002_0009_u32 as i32;
/// Invalid number of parameters
pub const DISP_E_BADPARAMCOUNT: HRESULT = 0x8002_000E_u32 as i32;
/// Invalid index
pub const DISP_E_BADINDEX: HRESULT = 0x8002_000B_u32 as i32;

/// Check if an HRESULT indicates success (non-negative)
#[inline]
#[must_use]
pub const fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}

/// Check if an HRESULT indicates failure (negative)
#[inline]
#[must_use]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

/// Short description of well-known status codes, used when the component
/// supplies no extended error record.
pub fn message(hr: HRESULT) -> String {
    let text = match hr {
        S_OK => "The operation completed successfully",
        S_FALSE => "The operation completed with a false result",
        E_NOTIMPL => "Not implemented",
        E_NOINTERFACE => "No such interface supported",
        E_POINTER => "Invalid pointer",
        E_FAIL => "Unspecified error",
        E_OUTOFMEMORY => "Not enough memory resources are available",
        E_INVALIDARG => "The parameter is incorrect",
        DISP_E_MEMBERNOTFOUND => "Member not found",
        DISP_E_PARAMNOTFOUND => "Parameter not found",
        DISP_E_TYPEMISMATCH => "Type mismatch",
        DISP_E_UNKNOWNNAME => "Unknown name",
        DISP_E_EXCEPTION => "Exception occurred",
        DISP_E_BADPARAMCOUNT => "Invalid number of parameters",
        DISP_E_BADINDEX => "Invalid index",
        _ => return format!("Unknown status 0x{:08X}", hr as u32),
    };
    text.to_string()
}
