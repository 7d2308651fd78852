//! Vtable slot binding
//!
//! A [`MethodStub`] is one bound slot: the function-table index it calls,
//! the declared parameters it marshals, and the status convention it checks.

use std::ffi::c_void;
use std::fmt;

use tracing::trace;

use crate::config::config;
use crate::descriptor::{Direction, InterfaceDescriptor, MethodSlotSpec, SlotKind, TypeTag};
use crate::error::{Error, Result, StatusError, take_error_record};
use crate::guid::Guid;
use crate::hresult::{HRESULT, failed};
use crate::marshal::{self, Args, Frame};
use crate::native::{self, MAX_WORDS};
use crate::pointer::InterfacePointer;
use crate::variant::Variant;

/// Something invocable on a bound interface pointer.
pub trait Callable: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn call(&self, target: &InterfacePointer, args: &Args) -> Result<Variant>;
}

/// Build the error for a failed status, attaching the thread's extended
/// error record when the object says it supports one for `owner`.
pub(crate) fn status_error(this: *mut c_void, owner: &Guid, hr: HRESULT) -> Error {
    let mut status = StatusError::new(hr);
    if config().extended_errors
        && !this.is_null()
        && unsafe { native::supports_error_info(this, owner) }
        && let Some(mut record) = take_error_record()
    {
        record.iid = *owner;
        status = status.with_record(record);
    }
    status.into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnConvention {
    Status,
    Void,
    Value,
}

#[derive(Debug)]
pub struct MethodStub {
    spec: MethodSlotSpec,
    slot: usize,
    owner: Guid,
    owner_name: String,
    ret: ReturnConvention,
    fold_names: bool,
}

impl MethodStub {
    /// Bind `spec` to function-table index `slot` of interface `owner`.
    ///
    /// Fails if a parameter or the return type cannot cross the word ABI.
    pub fn bind(spec: &MethodSlotSpec, slot: usize, owner: &InterfaceDescriptor) -> Result<Self> {
        let fail = |message: String| {
            Error::config(owner.name.clone(), format!("{}: {message}", spec.name))
        };

        let mut words = 0;
        for param in &spec.params {
            if param.tag == TypeTag::Void {
                return Err(fail(format!("parameter '{}' has type void", param.name)));
            }
            words += match param.direction {
                Direction::In => marshal::input_words(param.tag).ok_or_else(|| {
                    fail(format!(
                        "parameter '{}' of type {:?} cannot be passed by value",
                        param.name, param.tag
                    ))
                })?,
                Direction::Out | Direction::InOut => 1,
            };
        }
        if words > MAX_WORDS {
            return Err(fail(format!(
                "{words} argument words exceed the supported {MAX_WORDS}"
            )));
        }
        if !marshal::returnable(spec.ret) {
            return Err(fail(format!("return type {:?} is not supported", spec.ret)));
        }
        let ret = match spec.ret {
            TypeTag::Status => ReturnConvention::Status,
            TypeTag::Void => ReturnConvention::Void,
            _ => ReturnConvention::Value,
        };

        Ok(Self {
            spec: spec.clone(),
            slot,
            owner: owner.iid.unwrap_or_default(),
            owner_name: owner.name.clone(),
            ret,
            fold_names: owner.case_insensitive,
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn kind(&self) -> SlotKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &MethodSlotSpec {
        &self.spec
    }

    pub fn doc(&self) -> Option<&str> {
        self.spec.doc.as_deref()
    }

    /// Index arity used for property grouping: pure `in` parameters, minus
    /// the assigned value for setters.
    pub(crate) fn property_arity(&self) -> usize {
        let inputs = self.spec.params.iter().filter(|p| p.is_pure_input()).count();
        match self.spec.kind {
            SlotKind::PropPut | SlotKind::PropPutRef => inputs.saturating_sub(1),
            _ => inputs,
        }
    }
}

impl Callable for MethodStub {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn call(&self, target: &InterfacePointer, args: &Args) -> Result<Variant> {
        let this = target.as_raw();
        if this.is_null() {
            return Err(Error::type_error(format!(
                "{}.{}() called on a null interface pointer",
                self.owner_name, self.spec.name
            )));
        }

        let cfg = config();
        let values = marshal::resolve(&self.spec.name, &self.spec.params, args, self.fold_names)?;
        let mut frame = Frame::new(&self.spec.params);
        frame.encode(&self.spec.params, values, cfg.lcid)?;

        if cfg.trace_calls {
            trace!(
                target: "combind::call",
                interface = %self.owner_name,
                method = %self.spec.name,
                slot = self.slot,
                words = frame.words().len(),
                "vtable call"
            );
        }

        let result = unsafe {
            let entry = native::vtable_entry(this, self.slot);
            match self.ret {
                ReturnConvention::Status => {
                    native::call_status(entry, this, frame.words()).map(|hr| hr as u32 as u64)
                }
                ReturnConvention::Void => native::call_void(entry, this, frame.words()).map(|()| 0),
                ReturnConvention::Value => native::call_value(entry, this, frame.words()),
            }
        };
        let Some(raw) = result else {
            return Err(Error::type_error(format!(
                "{}() has too many argument words",
                self.spec.name
            )));
        };

        let outs = frame.collect();
        if self.ret == ReturnConvention::Status {
            let hr = raw as u32 as HRESULT;
            if failed(hr) {
                return Err(status_error(this, &self.owner, hr));
            }
        }
        let outs = outs?;
        Ok(marshal::shape(marshal::decode_return(raw, self.spec.ret), outs))
    }
}
