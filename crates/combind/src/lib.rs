//! Typed bindings for vtable and dispatch component interfaces
//!
//! This crate turns a declarative [`InterfaceDescriptor`] into a bound
//! interface whose methods and properties can be called by name on an
//! [`InterfacePointer`], marshalling arguments across the native
//! `extern "system"` boundary and keeping reference counts balanced.
//!
//! ## Describing an interface
//!
//! With the builder:
//! ```ignore
//! use combind::*;
//!
//! let desc = InterfaceDescriptor::builder("ICounter")
//!     .iid("6d5f4b0e-9a51-4e5a-a3c4-1b2f0d6e7a10".parse()?)
//!     .base(IUnknown::descriptor())
//!     .method(MethodSlotSpec::propget("Value", TypeTag::Status)
//!         .param(ParamSpec::output("value", TypeTag::I32).retval()))
//!     .build();
//! let counter = Object::new(pointer, synthesize(&desc)?);
//! let value = counter.get("Value")?;
//! ```
//!
//! Or with the proc-macro (`proc` module):
//! ```ignore
//! use combind::proc::com_interface;
//!
//! #[com_interface("6d5f4b0e-9a51-4e5a-a3c4-1b2f0d6e7a10")]
//! pub trait ICounter {
//!     #[propget]
//!     fn Value(&self, #[out] #[retval] value: *mut i32) -> HRESULT;
//! }
//!
//! let counter = ICounter::bind(&pointer)?;
//! ```
//!
//! ## Lifetime
//!
//! Every [`InterfacePointer`] owns one reference. Call [`shutdown`] when the
//! component subsystem is about to go away; from then on no pointer calls
//! `Release`.

pub mod bstr;
pub mod casefold;
pub mod config;
pub mod descriptor;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod guid;
pub mod hresult;
pub mod interfaces;
pub mod marshal;
pub mod method;
pub mod native;
pub mod object;
pub mod pointer;
pub mod property;
pub mod synth;
pub mod variant;

/// Proc-macro for describing interfaces as annotated traits
pub mod proc {
    pub use combind_macro::com_interface;
}

pub use config::{BindingConfig, BindingConfigBuilder, config, install_config};
pub use descriptor::{
    DescriptorBuilder, Direction, DispArgSpec, DispKind, DispMemberSpec, InterfaceDescriptor,
    InvokeKind, MethodSlotSpec, ParamSpec, SlotKind, TypeTag,
};
pub use directory::{create_default, register_default_implementation, shutdown};
pub use error::{Error, ErrorRecord, Result, StatusError, set_error_record};
pub use guid::Guid;
pub use hresult::HRESULT;
pub use interfaces::{
    ComInterface, ComRefCount, IDispatch, IEnumVARIANT, ISupportErrorInfo, IUnknown,
};
pub use marshal::Args;
pub use method::Callable;
pub use object::{Object, ObjectIter};
pub use pointer::{ComPointers, InterfacePointer, PointerState, PointerTable, is_shutdown};
pub use property::{BoundProperty, Index, PropertyGroup};
pub use synth::{BoundInterface, Member, synthesize};
pub use variant::Variant;
