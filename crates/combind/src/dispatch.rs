//! Late-bound member invocation through `IDispatch::Invoke`
//!
//! A [`DispatchStub`] calls one dispatch member by member id. Arguments are
//! converted to native variants and passed in reverse order; put and putref
//! calls pass the assigned value as the `DISPID_PROPERTYPUT` named argument.
//! Caller-named arguments are resolved with `GetIDsOfNames`.

use std::ffi::c_void;
use std::ptr;

use smallvec::SmallVec;
use tracing::trace;

use crate::bstr;
use crate::config::config;
use crate::descriptor::{DispKind, DispMemberSpec, InterfaceDescriptor, InvokeKind, TypeTag};
use crate::error::{Error, ErrorRecord, Result, StatusError};
use crate::guid::Guid;
use crate::hresult::{DISP_E_EXCEPTION, DISP_E_PARAMNOTFOUND, DISP_E_TYPEMISMATCH, HRESULT, failed};
use crate::interfaces::{IDispatchVtbl, IID_NULL};
use crate::marshal::Args;
use crate::method::{Callable, status_error};
use crate::object::wrap_pointer;
use crate::pointer::InterfacePointer;
use crate::variant::{NativeVariant, Variant};

pub const DISPID_VALUE: i32 = 0;
pub const DISPID_UNKNOWN: i32 = -1;
pub const DISPID_PROPERTYPUT: i32 = -3;
pub const DISPID_NEWENUM: i32 = -4;

/// Native `DISPPARAMS`.
#[repr(C)]
#[derive(Debug)]
pub struct DispParams {
    pub rgvarg: *mut NativeVariant,
    pub rgdispid_named_args: *mut i32,
    pub c_args: u32,
    pub c_named_args: u32,
}

/// Native `EXCEPINFO`.
#[repr(C)]
#[derive(Debug)]
pub struct ExcepInfo {
    pub w_code: u16,
    pub w_reserved: u16,
    pub bstr_source: *mut u16,
    pub bstr_description: *mut u16,
    pub bstr_help_file: *mut u16,
    pub dw_help_context: u32,
    pub pv_reserved: *mut c_void,
    pub pfn_deferred_fill_in: Option<unsafe extern "system" fn(*mut ExcepInfo) -> HRESULT>,
    pub scode: i32,
}

impl Default for ExcepInfo {
    fn default() -> Self {
        Self {
            w_code: 0,
            w_reserved: 0,
            bstr_source: ptr::null_mut(),
            bstr_description: ptr::null_mut(),
            bstr_help_file: ptr::null_mut(),
            dw_help_context: 0,
            pv_reserved: ptr::null_mut(),
            pfn_deferred_fill_in: None,
            scode: 0,
        }
    }
}

impl ExcepInfo {
    /// Run the deferred fill-in, then move the strings out into a record.
    ///
    /// # Safety
    /// `self` must have been filled in by a component.
    unsafe fn take_record(&mut self, iid: Guid) -> ErrorRecord {
        unsafe {
            if let Some(fill) = self.pfn_deferred_fill_in.take() {
                fill(self);
            }
            let non_empty = |p: *mut u16| Some(bstr::take(p)).filter(|s| !s.is_empty());
            ErrorRecord {
                iid,
                description: non_empty(std::mem::replace(&mut self.bstr_description, ptr::null_mut())),
                source: non_empty(std::mem::replace(&mut self.bstr_source, ptr::null_mut())),
                help_file: non_empty(std::mem::replace(&mut self.bstr_help_file, ptr::null_mut())),
                help_context: self.dw_help_context,
            }
        }
    }
}

#[inline]
unsafe fn dispatch_vtbl<'a>(this: *mut c_void) -> &'a IDispatchVtbl {
    unsafe { &**(this as *const *const IDispatchVtbl) }
}

/// Member ids for `names` through `GetIDsOfNames`. The first name is the
/// member, the rest are its named arguments.
///
/// # Safety
/// `this` must be a live `IDispatch` pointer.
pub unsafe fn ids_of_names(this: *mut c_void, names: &[&str], lcid: u32) -> Result<Vec<i32>> {
    let wide: Vec<Vec<u16>> = names
        .iter()
        .map(|n| n.encode_utf16().chain(std::iter::once(0)).collect())
        .collect();
    let ptrs: Vec<*const u16> = wide.iter().map(|w| w.as_ptr()).collect();
    let mut ids = vec![DISPID_UNKNOWN; names.len()];
    let hr = unsafe {
        (dispatch_vtbl(this).get_ids_of_names)(
            this,
            &IID_NULL,
            ptrs.as_ptr(),
            ptrs.len() as u32,
            lcid,
            ids.as_mut_ptr(),
        )
    };
    if failed(hr) {
        return Err(StatusError::new(hr).into());
    }
    Ok(ids)
}

/// One dispatch member bound for a given invocation kind.
#[derive(Debug)]
pub struct DispatchStub {
    member: DispMemberSpec,
    kind: InvokeKind,
    owner: Guid,
    owner_name: String,
}

impl DispatchStub {
    /// Bind `member` using its own invocation kind.
    pub fn new(member: &DispMemberSpec, owner: &InterfaceDescriptor) -> Self {
        Self::with_kind(member, member.invoke_kind(), owner)
    }

    /// Bind `member` for an explicit invocation kind (setters of plain
    /// properties).
    pub fn with_kind(member: &DispMemberSpec, kind: InvokeKind, owner: &InterfaceDescriptor) -> Self {
        Self {
            member: member.clone(),
            kind,
            owner: owner.iid.unwrap_or_default(),
            owner_name: owner.name.clone(),
        }
    }

    pub fn memid(&self) -> i32 {
        self.member.memid
    }

    pub fn invoke_kind(&self) -> InvokeKind {
        self.kind
    }

    pub fn member(&self) -> &DispMemberSpec {
        &self.member
    }

    /// Index arity for property grouping.
    pub(crate) fn property_arity(&self) -> usize {
        match self.member.kind {
            DispKind::Property { .. } => 0,
            DispKind::PropPut | DispKind::PropPutRef => self.member.args.len().saturating_sub(1),
            _ => self.member.args.len(),
        }
    }

    fn is_put(&self) -> bool {
        matches!(self.kind, InvokeKind::PropertyPut | InvokeKind::PropertyPutRef)
    }

    /// Positional values with trailing declared defaults appended.
    fn positional(&self, args: &Args) -> Vec<Variant> {
        let mut values = args.positional.clone();
        if self.is_put() {
            return values;
        }
        for declared in self.member.args.iter().skip(values.len()) {
            if args.named.keys().any(|n| n.eq_ignore_ascii_case(&declared.name)) {
                break;
            }
            match &declared.default {
                Some(default) => values.push(default.clone()),
                None => break,
            }
        }
        values
    }
}

impl Callable for DispatchStub {
    fn name(&self) -> &str {
        &self.member.name
    }

    fn call(&self, target: &InterfacePointer, args: &Args) -> Result<Variant> {
        let this = target.as_raw();
        if this.is_null() {
            return Err(Error::type_error(format!(
                "{}.{} invoked on a null interface pointer",
                self.owner_name, self.member.name
            )));
        }
        let cfg = config();

        let positional = self.positional(args);
        if self.is_put() && positional.is_empty() {
            return Err(Error::type_error(format!(
                "assignment to '{}' needs a value",
                self.member.name
            )));
        }

        // named ids, matched to values in the same order
        let mut named_ids: SmallVec<[i32; 4]> = SmallVec::new();
        let mut named_values: Vec<&Variant> = Vec::new();
        if !args.named.is_empty() {
            let mut names: Vec<&str> = vec![self.member.name.as_str()];
            names.extend(args.named.keys().map(String::as_str));
            let ids = unsafe { ids_of_names(this, &names, cfg.lcid)? };
            named_ids.extend(ids.into_iter().skip(1));
            named_values.extend(args.named.values());
        }

        // rgvarg: named values first, then positional in reverse
        let mut native: Vec<NativeVariant> = Vec::with_capacity(named_values.len() + positional.len());
        let result = (|| -> Result<Variant> {
            let (value, index) = if self.is_put() {
                let (last, rest) = positional.split_last().ok_or_else(|| {
                    Error::type_error("assignment without a value")
                })?;
                (Some(last), rest)
            } else {
                (None, positional.as_slice())
            };
            if let Some(value) = value {
                native.push(NativeVariant::from_variant(value)?);
                named_ids.insert(0, DISPID_PROPERTYPUT);
            }
            for v in &named_values {
                native.push(NativeVariant::from_variant(v)?);
            }
            for v in index.iter().rev() {
                native.push(NativeVariant::from_variant(v)?);
            }

            let mut params = DispParams {
                rgvarg: if native.is_empty() { ptr::null_mut() } else { native.as_mut_ptr() },
                rgdispid_named_args: if named_ids.is_empty() {
                    ptr::null_mut()
                } else {
                    named_ids.as_mut_ptr()
                },
                c_args: native.len() as u32,
                c_named_args: named_ids.len() as u32,
            };
            let mut out = NativeVariant::empty();
            let mut excep = ExcepInfo::default();
            let mut arg_err: u32 = 0;

            if cfg.trace_calls {
                trace!(
                    target: "combind::call",
                    interface = %self.owner_name,
                    member = %self.member.name,
                    memid = self.member.memid,
                    kind = ?self.kind,
                    args = params.c_args,
                    "dispatch invoke"
                );
            }

            let hr = unsafe {
                (dispatch_vtbl(this).invoke)(
                    this,
                    self.member.memid,
                    &IID_NULL,
                    cfg.lcid,
                    self.kind as u16,
                    &mut params,
                    if self.is_put() { ptr::null_mut() } else { &mut out },
                    &mut excep,
                    &mut arg_err,
                )
            };

            if failed(hr) {
                unsafe { out.clear() };
                return Err(self.invoke_error(this, hr, &mut excep, arg_err));
            }
            let value = unsafe { out.into_variant()? };
            self.narrow_result(value)
        })();

        for v in &mut native {
            unsafe { v.clear() };
        }
        result
    }
}

impl DispatchStub {
    fn invoke_error(&self, this: *mut c_void, hr: HRESULT, excep: &mut ExcepInfo, arg_err: u32) -> Error {
        match hr {
            DISP_E_EXCEPTION => {
                let record = unsafe { excep.take_record(self.owner) };
                let code = if failed(excep.scode) { excep.scode } else { hr };
                let mut status = StatusError::new(code);
                if record.description.is_some() || record.source.is_some() {
                    status = status.with_record(record);
                }
                status.into()
            }
            DISP_E_PARAMNOTFOUND | DISP_E_TYPEMISMATCH => {
                let mut status = StatusError::new(hr);
                status.arg_error = Some(arg_err);
                status.into()
            }
            _ => status_error(this, &self.owner, hr),
        }
    }

    /// Narrow an interface result to the declared interface and bind it.
    fn narrow_result(&self, value: Variant) -> Result<Variant> {
        let TypeTag::Interface(iid) = self.member.ret else {
            return Ok(value);
        };
        match value.as_pointer() {
            Some(p) if !p.is_null() => Ok(wrap_pointer(p.narrow(iid)?)),
            _ => Ok(value),
        }
    }
}
