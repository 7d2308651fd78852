//! Property grouping and accessors
//!
//! Getter and setter members that share a name and an index arity form one
//! [`PropertyGroup`]. Assignment picks the setter per call: object-like
//! values go to the by-reference setter when there is one, everything else
//! to the by-value setter.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::warn;

use crate::error::{Error, Result};
use crate::marshal::Args;
use crate::method::Callable;
use crate::object::Object;
use crate::variant::Variant;

/// Role of a member inside its property group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorRole {
    Get,
    Put,
    PutRef,
}

pub struct PropertyGroup {
    name: String,
    arity: usize,
    getter: Option<Arc<dyn Callable>>,
    put: Option<Arc<dyn Callable>>,
    putref: Option<Arc<dyn Callable>>,
}

impl fmt::Debug for PropertyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGroup")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("get", &self.getter.is_some())
            .field("put", &self.put.is_some())
            .field("putref", &self.putref.is_some())
            .finish()
    }
}

impl PropertyGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of index arguments.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.put.is_some() || self.putref.is_some()
    }

    /// Read through the getter.
    pub fn get(&self, object: &Object, args: &Args) -> Result<Variant> {
        let getter = self.getter.as_ref().ok_or_else(|| {
            Error::type_error(format!("property '{}' is write-only", self.name))
        })?;
        getter.call(object.pointer(), args)
    }

    /// The setter `value` routes to.
    pub fn setter_for(&self, value: &Variant) -> Option<(AccessorRole, &Arc<dyn Callable>)> {
        let put = self.put.as_ref().map(|c| (AccessorRole::Put, c));
        let putref = self.putref.as_ref().map(|c| (AccessorRole::PutRef, c));
        if value.is_object() {
            putref.or(put)
        } else {
            put.or(putref)
        }
    }

    /// Assign `value` at `index`.
    pub fn set(&self, object: &Object, index: Vec<Variant>, value: Variant) -> Result<()> {
        let Some((_, setter)) = self.setter_for(&value) else {
            return Err(Error::type_error(format!(
                "property '{}' is read-only",
                self.name
            )));
        };
        let mut positional = index;
        positional.push(value);
        setter.call(object.pointer(), &Args::from(positional))?;
        Ok(())
    }
}

/// Collects property members into groups keyed by `(name, arity)`.
#[derive(Default)]
pub struct PropertyAccessorBuilder {
    groups: IndexMap<(String, usize), PropertyGroup>,
}

impl PropertyAccessorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one accessor. A second accessor for an occupied role is ignored
    /// with a warning.
    pub fn add(&mut self, name: &str, arity: usize, role: AccessorRole, callable: Arc<dyn Callable>) {
        let group = match self.groups.entry((name.to_string(), arity)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(PropertyGroup {
                name: name.to_string(),
                arity,
                getter: None,
                put: None,
                putref: None,
            }),
        };
        let slot = match role {
            AccessorRole::Get => &mut group.getter,
            AccessorRole::Put => &mut group.put,
            AccessorRole::PutRef => &mut group.putref,
        };
        if slot.is_some() {
            warn!(
                target: "combind::synth",
                property = name,
                arity,
                ?role,
                "duplicate property accessor ignored"
            );
            return;
        }
        *slot = Some(callable);
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Finished groups in first-seen order.
    pub fn build(self) -> Vec<PropertyGroup> {
        self.groups.into_values().collect()
    }
}

/// Subscript of an indexed property.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    /// `prop[i]`
    At(Variant),
    /// `prop[i, j]`
    Tuple(Vec<Variant>),
    /// `prop[..]`, the same as no index.
    All,
}

impl Index {
    pub fn at(value: impl Into<Variant>) -> Self {
        Index::At(value.into())
    }

    fn into_args(self) -> Vec<Variant> {
        match self {
            Index::At(v) => vec![v],
            Index::Tuple(values) => values,
            Index::All => Vec::new(),
        }
    }
}

impl From<Variant> for Index {
    fn from(value: Variant) -> Self {
        Index::At(value)
    }
}

impl From<i32> for Index {
    fn from(value: i32) -> Self {
        Index::At(value.into())
    }
}

impl From<&str> for Index {
    fn from(value: &str) -> Self {
        Index::At(value.into())
    }
}

impl From<()> for Index {
    fn from(_: ()) -> Self {
        Index::All
    }
}

impl<A: Into<Variant>, B: Into<Variant>> From<(A, B)> for Index {
    fn from((a, b): (A, B)) -> Self {
        Index::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<Variant>, B: Into<Variant>, C: Into<Variant>> From<(A, B, C)> for Index {
    fn from((a, b, c): (A, B, C)) -> Self {
        Index::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

/// An indexed property of one object, `obj.Prop[...]`.
#[derive(Debug, Clone)]
pub struct BoundProperty<'a> {
    object: &'a Object,
    group: Arc<PropertyGroup>,
}

impl<'a> BoundProperty<'a> {
    pub(crate) fn new(object: &'a Object, group: Arc<PropertyGroup>) -> Self {
        Self { object, group }
    }

    pub fn group(&self) -> &PropertyGroup {
        &self.group
    }

    /// Call the getter with positional arguments, `obj.Prop(a, b)`.
    pub fn call(&self, args: impl Into<Args>) -> Result<Variant> {
        self.group
            .get(self.object, &args.into())
            .map_err(Error::into_index_error)
    }

    pub fn get(&self, index: impl Into<Index>) -> Result<Variant> {
        self.call(index.into().into_args())
    }

    pub fn set(&self, index: impl Into<Index>, value: impl Into<Variant>) -> Result<()> {
        self.group
            .set(self.object, index.into().into_args(), value.into())
            .map_err(Error::into_index_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::InterfacePointer;

    #[derive(Debug)]
    struct Named(&'static str);

    impl Callable for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn call(&self, _: &InterfacePointer, _: &Args) -> Result<Variant> {
            Ok(Variant::from(self.0))
        }
    }

    fn group(put: bool, putref: bool) -> PropertyGroup {
        let mut b = PropertyAccessorBuilder::new();
        b.add("P", 1, AccessorRole::Get, Arc::new(Named("get")));
        if put {
            b.add("P", 1, AccessorRole::Put, Arc::new(Named("put")));
        }
        if putref {
            b.add("P", 1, AccessorRole::PutRef, Arc::new(Named("putref")));
        }
        b.build().remove(0)
    }

    fn unknown() -> Variant {
        Variant::Unknown(InterfacePointer::null(crate::interfaces::IID_IUNKNOWN))
    }

    #[test]
    fn test_routing_with_both_setters() {
        let g = group(true, true);
        assert_eq!(g.setter_for(&Variant::I32(1)).unwrap().0, AccessorRole::Put);
        assert_eq!(g.setter_for(&unknown()).unwrap().0, AccessorRole::PutRef);
    }

    #[test]
    fn test_single_setter_takes_everything() {
        let g = group(true, false);
        assert_eq!(g.setter_for(&unknown()).unwrap().0, AccessorRole::Put);
        let g = group(false, true);
        assert_eq!(g.setter_for(&Variant::I32(1)).unwrap().0, AccessorRole::PutRef);
        assert!(group(false, false).setter_for(&Variant::I32(1)).is_none());
    }

    #[test]
    fn test_groups_keyed_by_name_and_arity() {
        let mut b = PropertyAccessorBuilder::new();
        b.add("Item", 1, AccessorRole::Get, Arc::new(Named("a")));
        b.add("Item", 2, AccessorRole::Get, Arc::new(Named("b")));
        b.add("Item", 1, AccessorRole::Put, Arc::new(Named("c")));
        let groups = b.build();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].is_writable());
        assert!(!groups[1].is_writable());
    }

    #[test]
    fn test_index_args() {
        assert_eq!(Index::from((1, 2)).into_args(), vec![Variant::I32(1), Variant::I32(2)]);
        assert!(Index::from(()).into_args().is_empty());
        assert_eq!(Index::at("k").into_args(), vec![Variant::from("k")]);
    }
}
