//! Bound objects
//!
//! An [`Object`] pairs an [`InterfacePointer`] with the [`BoundInterface`]
//! synthesized for its interface. Members are reached by name:
//!
//! - [`Object::call`] invokes a method
//! - [`Object::get`] / [`Object::set`] read and assign argument-less
//!   properties
//! - [`Object::property`] returns an accessor for indexed properties
//!
//! Interfaces with `Count`, `Item` or `_NewEnum` members also get
//! [`Object::len`], [`Object::item`] and [`Object::iter`].

use std::fmt;
use std::sync::Arc;

use crate::directory;
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::interfaces::{ComInterface, IEnumVARIANT, IID_IDISPATCH};
use crate::marshal::Args;
use crate::pointer::InterfacePointer;
use crate::property::{BoundProperty, Index};
use crate::synth::{BoundInterface, Member};
use crate::variant::Variant;

#[derive(Clone)]
pub struct Object {
    pointer: InterfacePointer,
    binding: Arc<BoundInterface>,
}

/// Wrap a returned interface pointer: bound when its interface is
/// registered, a plain handle otherwise, `Null` when null.
pub(crate) fn wrap_pointer(pointer: InterfacePointer) -> Variant {
    if pointer.is_null() {
        return Variant::Null;
    }
    match directory::lookup(&pointer.iid()) {
        Some(binding) => Variant::Object(Object::new(pointer, binding)),
        None if pointer.iid() == IID_IDISPATCH => Variant::Dispatch(pointer),
        None => Variant::Unknown(pointer),
    }
}

impl Object {
    pub fn new(pointer: InterfacePointer, binding: Arc<BoundInterface>) -> Self {
        Self { pointer, binding }
    }

    /// Bind `pointer` with the binding registered for its interface id.
    pub fn bind(pointer: InterfacePointer) -> Result<Self> {
        let binding = directory::lookup(&pointer.iid()).ok_or_else(|| {
            Error::type_error(format!("no binding registered for {:?}", pointer.iid()))
        })?;
        Ok(Self::new(pointer, binding))
    }

    pub fn pointer(&self) -> &InterfacePointer {
        &self.pointer
    }

    pub fn into_pointer(self) -> InterfacePointer {
        self.pointer
    }

    pub fn interface(&self) -> &Arc<BoundInterface> {
        &self.binding
    }

    pub fn iid(&self) -> Guid {
        self.binding.iid()
    }

    /// Invoke the method `name`. Calling a property reads it with `args`
    /// as the index.
    pub fn call(&self, name: &str, args: impl Into<Args>) -> Result<Variant> {
        let args = args.into();
        match self.binding.member(name)? {
            Member::Method(m) => m.call(&self.pointer, &args),
            Member::Property(p) => p.get(self, &args).map_err(Error::into_index_error),
        }
    }

    /// Read the argument-less property `name`.
    pub fn get(&self, name: &str) -> Result<Variant> {
        match self.binding.member(name)? {
            Member::Property(p) if p.arity() == 0 => p.get(self, &Args::new()),
            Member::Property(_) => Err(Error::type_error(format!(
                "'{name}' is an indexed property; use property()"
            ))),
            Member::Method(_) => Err(Error::type_error(format!(
                "'{name}' is a method, not a property"
            ))),
        }
    }

    /// Assign the argument-less property `name`.
    pub fn set(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
        match self.binding.member(name)? {
            Member::Property(p) if p.arity() == 0 => p.set(self, Vec::new(), value.into()),
            Member::Property(_) => Err(Error::type_error(format!(
                "'{name}' is an indexed property; use property()"
            ))),
            Member::Method(_) => Err(Error::type_error(format!(
                "cannot assign to method '{name}'"
            ))),
        }
    }

    /// Accessor for the property `name`, `obj.Name[...]`.
    pub fn property(&self, name: &str) -> Result<BoundProperty<'_>> {
        match self.binding.member(name)? {
            Member::Property(p) => Ok(BoundProperty::new(self, p.clone())),
            Member::Method(_) => Err(Error::type_error(format!(
                "'{name}' is a method, not a property"
            ))),
        }
    }

    /// This object as interface `iid`, bound if that interface is
    /// registered.
    pub fn query_iid(&self, iid: Guid) -> Result<Variant> {
        Ok(wrap_pointer(self.pointer.narrow(iid)?))
    }

    /// This object as interface `T`.
    pub fn query<T: ComInterface>(&self) -> Result<Object> {
        T::bind(&self.pointer)
    }

    // =========================================================================
    // Collection protocol
    // =========================================================================

    fn read_member(&self, name: &str, args: Args) -> Result<Variant> {
        if !self.binding.has_member(name) {
            return Err(Error::type_error(format!(
                "`{}` has no '{name}' member",
                self.binding.name()
            )));
        }
        self.call(name, args)
    }

    /// `Count`.
    pub fn len(&self) -> Result<usize> {
        let count = self.read_member("Count", Args::new())?;
        count
            .as_usize()
            .ok_or_else(|| Error::type_error(format!("Count returned {count:?}")))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// `Item(index)`. A bad index is an [`Error::Index`].
    pub fn item(&self, index: impl Into<Index>) -> Result<Variant> {
        let args = match index.into() {
            Index::At(v) => vec![v],
            Index::Tuple(values) => values,
            Index::All => Vec::new(),
        };
        self.read_member("Item", Args::from(args))
            .map_err(Error::into_index_error)
    }

    /// Assign through `Item`.
    pub fn set_item(&self, index: impl Into<Index>, value: impl Into<Variant>) -> Result<()> {
        if !self.binding.has_member("Item") {
            return Err(Error::type_error(format!(
                "`{}` has no 'Item' member",
                self.binding.name()
            )));
        }
        self.property("Item")?.set(index, value)
    }

    /// Iterate through `_NewEnum`.
    pub fn iter(&self) -> Result<ObjectIter> {
        let result = self.read_member("_NewEnum", Args::new())?;
        let pointer = result
            .as_pointer()
            .ok_or_else(|| Error::type_error(format!("_NewEnum returned {result:?}")))?;
        let enumerator = IEnumVARIANT::bind(pointer)?;
        Ok(ObjectIter {
            enumerator,
            done: false,
        })
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {:p}>", self.binding.name(), self.pointer.as_raw())
    }
}

/// Items of a collection, fetched one at a time with `IEnumVARIANT::Next`.
#[derive(Debug)]
pub struct ObjectIter {
    enumerator: Object,
    done: bool,
}

impl Iterator for ObjectIter {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let fetched = match self.enumerator.call("Next", Args::new().arg(1u32)) {
            Ok(v) => v,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let mut outs = fetched.into_array().unwrap_or_default().into_iter();
        let (Some(item), Some(count)) = (outs.next(), outs.next()) else {
            self.done = true;
            return None;
        };
        if count.as_i64().unwrap_or(0) == 0 {
            self.done = true;
            return None;
        }
        Some(Ok(match item {
            Variant::Unknown(p) | Variant::Dispatch(p) => wrap_pointer(p),
            other => other,
        }))
    }
}
