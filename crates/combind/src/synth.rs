//! Binding synthesis
//!
//! [`synthesize`] turns an [`InterfaceDescriptor`] into a [`BoundInterface`]:
//! a fixed table of named members (bound slots, dispatch members and
//! property groups) built once and registered under the interface id.
//!
//! Bases are synthesized first and their members inherited. For a vtable
//! descriptor, slot `i` is bound at function-table index
//! `vtable_offset + i`, where the offset is the sum of the ancestors' own
//! slot counts. A member whose name is already taken is installed under a
//! shadow name (`_` prefixed until free); the existing member keeps the
//! name.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::casefold::CaseFold;
use crate::descriptor::{DispKind, InterfaceDescriptor, InvokeKind, SlotKind};
use crate::directory;
use crate::dispatch::DispatchStub;
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::interfaces::{ComInterface, IDispatch};
use crate::method::{Callable, MethodStub};
use crate::property::{AccessorRole, PropertyAccessorBuilder, PropertyGroup};

/// A named member of a bound interface.
#[derive(Debug, Clone)]
pub enum Member {
    Method(Arc<dyn Callable>),
    Property(Arc<PropertyGroup>),
}

/// Which collection conventions an interface follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionShape {
    pub count: bool,
    pub item: bool,
    pub new_enum: bool,
}

impl CollectionShape {
    pub fn is_collection(&self) -> bool {
        self.count || self.item || self.new_enum
    }
}

/// The synthesized form of one interface.
#[derive(Debug)]
pub struct BoundInterface {
    name: String,
    iid: Guid,
    descriptor: Arc<InterfaceDescriptor>,
    base: Option<Arc<BoundInterface>>,
    members: IndexMap<String, Member>,
    fold: Option<CaseFold>,
    vtable_offset: Option<usize>,
    collection: CollectionShape,
}

impl BoundInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn iid(&self) -> Guid {
        self.iid
    }

    pub fn descriptor(&self) -> &Arc<InterfaceDescriptor> {
        &self.descriptor
    }

    pub fn base(&self) -> Option<&Arc<BoundInterface>> {
        self.base.as_ref()
    }

    pub fn is_dispatch(&self) -> bool {
        self.descriptor.is_dispatch()
    }

    /// First function-table index of this interface's own slots. `None`
    /// for dispatch interfaces.
    pub fn vtable_offset(&self) -> Option<usize> {
        self.vtable_offset
    }

    pub fn collection(&self) -> CollectionShape {
        self.collection
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.fold.is_some()
    }

    /// Canonical member name for `name`, folding case when the interface
    /// is case-insensitive.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.members.get_key_value(name) {
            return Some(key);
        }
        self.fold.as_ref()?.resolve(name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn member(&self, name: &str) -> Result<&Member> {
        self.resolve(name)
            .and_then(|canonical| self.members.get(canonical))
            .ok_or_else(|| Error::Attribute {
                interface: self.name.clone(),
                name: name.to_string(),
            })
    }
}

fn install(members: &mut IndexMap<String, Member>, interface: &str, name: &str, member: Member) {
    let mut key = name.to_string();
    while members.contains_key(&key) {
        key.insert(0, '_');
    }
    if key != name {
        debug!(
            target: "combind::synth",
            interface,
            member = name,
            shadow = %key,
            "name already bound; installed under shadow name"
        );
    }
    members.insert(key, member);
}

fn validate(descriptor: &InterfaceDescriptor) -> Result<Guid> {
    let iid = descriptor
        .iid
        .ok_or_else(|| Error::config(&descriptor.name, "missing interface id"))?;
    match (&descriptor.methods, &descriptor.dispatch) {
        (Some(_), Some(_)) => Err(Error::config(
            &descriptor.name,
            "declares both vtable slots and dispatch members",
        )),
        (None, None) => Err(Error::config(
            &descriptor.name,
            "declares neither vtable slots nor dispatch members",
        )),
        _ => Ok(iid),
    }
}

/// Synthesize the binding for `descriptor` and register it.
///
/// Synthesizing a descriptor equal to the registered one returns the
/// existing binding.
pub fn synthesize(descriptor: &Arc<InterfaceDescriptor>) -> Result<Arc<BoundInterface>> {
    let iid = validate(descriptor)?;
    if let Some(existing) = directory::lookup(&iid)
        && *existing.descriptor == **descriptor
    {
        return Ok(existing);
    }

    let base = match &descriptor.base {
        Some(base) => Some(synthesize(base)?),
        None if descriptor.is_dispatch() => Some(IDispatch::binding()?),
        None => None,
    };

    let mut members = base
        .as_ref()
        .map(|b| b.members.clone())
        .unwrap_or_default();
    let mut props = PropertyAccessorBuilder::new();
    let mut vtable_offset = None;

    if let Some(methods) = &descriptor.methods {
        let offset = descriptor.vtable_offset().ok_or_else(|| {
            let base_name = descriptor.base.as_ref().map_or("?", |b| b.name.as_str());
            Error::config(
                &descriptor.name,
                format!("slot count of base `{base_name}` cannot be determined"),
            )
        })?;
        vtable_offset = Some(offset);

        for (i, slot) in methods.iter().enumerate() {
            let stub = MethodStub::bind(slot, offset + i, descriptor)?;
            let role = match slot.kind {
                SlotKind::Method => {
                    install(&mut members, &descriptor.name, &slot.name, Member::Method(Arc::new(stub)));
                    continue;
                }
                SlotKind::PropGet => AccessorRole::Get,
                SlotKind::PropPut => AccessorRole::Put,
                SlotKind::PropPutRef => AccessorRole::PutRef,
            };
            let arity = stub.property_arity();
            props.add(&slot.name, arity, role, Arc::new(stub));
        }
    }

    if let Some(dispatch) = &descriptor.dispatch {
        for spec in dispatch {
            let stub = DispatchStub::new(spec, descriptor);
            let arity = stub.property_arity();
            match spec.kind {
                DispKind::Method => {
                    install(&mut members, &descriptor.name, &spec.name, Member::Method(Arc::new(stub)));
                }
                DispKind::PropGet => props.add(&spec.name, arity, AccessorRole::Get, Arc::new(stub)),
                DispKind::PropPut => props.add(&spec.name, arity, AccessorRole::Put, Arc::new(stub)),
                DispKind::PropPutRef => {
                    props.add(&spec.name, arity, AccessorRole::PutRef, Arc::new(stub))
                }
                DispKind::Property { readonly } => {
                    props.add(&spec.name, 0, AccessorRole::Get, Arc::new(stub));
                    if !readonly {
                        let put = DispatchStub::with_kind(spec, InvokeKind::PropertyPut, descriptor);
                        props.add(&spec.name, 0, AccessorRole::Put, Arc::new(put));
                        let put_ref =
                            DispatchStub::with_kind(spec, InvokeKind::PropertyPutRef, descriptor);
                        props.add(&spec.name, 0, AccessorRole::PutRef, Arc::new(put_ref));
                    }
                }
            }
        }
    }

    for group in props.build() {
        let name = group.name().to_string();
        install(&mut members, &descriptor.name, &name, Member::Property(Arc::new(group)));
    }

    let inherited_fold = base.as_ref().and_then(|b| b.fold.clone());
    let fold = if descriptor.case_insensitive || inherited_fold.is_some() {
        let mut fold = inherited_fold.unwrap_or_default();
        for name in members.keys() {
            fold.insert(name);
        }
        Some(fold)
    } else {
        None
    };

    let mut bound = BoundInterface {
        name: descriptor.name.clone(),
        iid,
        descriptor: descriptor.clone(),
        base,
        members,
        fold,
        vtable_offset,
        collection: CollectionShape::default(),
    };
    bound.collection = CollectionShape {
        count: bound.has_member("Count"),
        item: bound.has_member("Item"),
        new_enum: bound.has_member("_NewEnum"),
    };

    debug!(
        target: "combind::synth",
        interface = %bound.name,
        %iid,
        offset = ?bound.vtable_offset,
        members = bound.members.len(),
        collection = bound.collection.is_collection(),
        "synthesized binding"
    );
    Ok(directory::register(Arc::new(bound)))
}
