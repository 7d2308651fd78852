//! Declarative interface descriptors
//!
//! An [`InterfaceDescriptor`] is the input to synthesis: an interface id, an
//! ordered list of vtable slots *or* a list of dispatch members, and an
//! optional base descriptor. Descriptors are immutable once built; they are
//! shared as `Arc<InterfaceDescriptor>` and compared structurally so that
//! registering the same interface twice is recognised as a no-op.
//!
//! Descriptors are either produced by a type-library reader or authored
//! directly, with the builder below or with `#[com_interface]`.

use std::sync::Arc;

use crate::guid::Guid;
use crate::variant::Variant;

/// Native type of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    /// `HRESULT`; as a return type it selects the status-code convention.
    Status,
    /// `VARIANT_BOOL` (`-1` true, `0` false).
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Opaque pointer-sized value.
    Pointer,
    /// Passed by pointer when used as an input (`REFIID`).
    Guid,
    Bstr,
    Variant,
    /// Interface pointer of the given interface id.
    Interface(Guid),
}

impl TypeTag {
    /// Zero value of the type, used for omitted in-out parameters and
    /// optional parameters without a default.
    pub fn zero_value(&self) -> Variant {
        match self {
            TypeTag::Void | TypeTag::Variant => Variant::Empty,
            TypeTag::Status | TypeTag::I32 => Variant::I32(0),
            TypeTag::Bool => Variant::Bool(false),
            TypeTag::I16 => Variant::I16(0),
            TypeTag::U16 => Variant::U16(0),
            TypeTag::U32 => Variant::U32(0),
            TypeTag::I64 => Variant::I64(0),
            TypeTag::U64 => Variant::U64(0),
            TypeTag::F32 => Variant::F32(0.0),
            TypeTag::F64 => Variant::F64(0.0),
            TypeTag::Pointer => Variant::Pointer(0),
            TypeTag::Guid => Variant::Guid(Guid::ZERO),
            TypeTag::Bstr => Variant::Str(String::new()),
            TypeTag::Interface(_) => Variant::Null,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, TypeTag::Interface(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// One parameter of a vtable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub direction: Direction,
    pub tag: TypeTag,
    pub optional: bool,
    pub default: Option<Variant>,
    /// The parameter receives the logical return value.
    pub retval: bool,
    /// Locale parameter, filled from the configuration.
    pub lcid: bool,
}

impl ParamSpec {
    fn new(name: impl Into<String>, direction: Direction, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            direction,
            tag,
            optional: false,
            default: None,
            retval: false,
            lcid: false,
        }
    }

    pub fn input(name: impl Into<String>, tag: TypeTag) -> Self {
        Self::new(name, Direction::In, tag)
    }

    pub fn output(name: impl Into<String>, tag: TypeTag) -> Self {
        Self::new(name, Direction::Out, tag)
    }

    pub fn in_out(name: impl Into<String>, tag: TypeTag) -> Self {
        Self::new(name, Direction::InOut, tag)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declared default; implies `optional`.
    pub fn with_default(mut self, value: impl Into<Variant>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }

    pub fn retval(mut self) -> Self {
        self.retval = true;
        self
    }

    pub fn lcid(mut self) -> Self {
        self.lcid = true;
        self
    }

    /// Whether the caller supplies this parameter.
    pub fn is_caller_supplied(&self) -> bool {
        self.direction != Direction::Out && !self.lcid
    }

    /// Whether the parameter counts toward a property's index arity.
    pub(crate) fn is_pure_input(&self) -> bool {
        self.direction == Direction::In && !self.lcid
    }
}

/// Role of a vtable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotKind {
    #[default]
    Method,
    PropGet,
    PropPut,
    PropPutRef,
}

impl SlotKind {
    pub fn is_property(&self) -> bool {
        !matches!(self, SlotKind::Method)
    }
}

/// One vtable slot. Position in the descriptor's list is the slot order.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSlotSpec {
    pub name: String,
    pub kind: SlotKind,
    pub ret: TypeTag,
    pub params: Vec<ParamSpec>,
    pub doc: Option<String>,
}

impl MethodSlotSpec {
    pub fn new(name: impl Into<String>, ret: TypeTag) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Method,
            ret,
            params: Vec::new(),
            doc: None,
        }
    }

    pub fn propget(name: impl Into<String>, ret: TypeTag) -> Self {
        Self::new(name, ret).kind(SlotKind::PropGet)
    }

    pub fn propput(name: impl Into<String>, ret: TypeTag) -> Self {
        Self::new(name, ret).kind(SlotKind::PropPut)
    }

    pub fn propputref(name: impl Into<String>, ret: TypeTag) -> Self {
        Self::new(name, ret).kind(SlotKind::PropPutRef)
    }

    pub fn kind(mut self, kind: SlotKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// `wFlags` of `IDispatch::Invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum InvokeKind {
    Method = 1,
    PropertyGet = 2,
    PropertyPut = 4,
    PropertyPutRef = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispKind {
    Method,
    PropGet,
    PropPut,
    PropPutRef,
    /// Argument-less property readable and (unless `readonly`) writable.
    Property { readonly: bool },
}

/// One argument of a dispatch member.
#[derive(Debug, Clone, PartialEq)]
pub struct DispArgSpec {
    pub name: String,
    pub tag: TypeTag,
    pub optional: bool,
    pub default: Option<Variant>,
}

impl DispArgSpec {
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            optional: false,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Variant>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }
}

/// One member of a dispatch interface, identified by member id.
#[derive(Debug, Clone, PartialEq)]
pub struct DispMemberSpec {
    pub memid: i32,
    pub name: String,
    pub kind: DispKind,
    pub ret: TypeTag,
    pub args: Vec<DispArgSpec>,
    pub doc: Option<String>,
}

impl DispMemberSpec {
    pub fn new(memid: i32, name: impl Into<String>, kind: DispKind, ret: TypeTag) -> Self {
        Self {
            memid,
            name: name.into(),
            kind,
            ret,
            args: Vec::new(),
            doc: None,
        }
    }

    pub fn method(memid: i32, name: impl Into<String>, ret: TypeTag) -> Self {
        Self::new(memid, name, DispKind::Method, ret)
    }

    pub fn property(memid: i32, name: impl Into<String>, tag: TypeTag, readonly: bool) -> Self {
        Self::new(memid, name, DispKind::Property { readonly }, tag)
    }

    pub fn arg(mut self, arg: DispArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Invocation kind used for a call of this member. Plain properties are
    /// read with `PropertyGet`; their setters pick put/putref per value.
    pub fn invoke_kind(&self) -> InvokeKind {
        match self.kind {
            DispKind::Method => InvokeKind::Method,
            DispKind::PropGet | DispKind::Property { .. } => InvokeKind::PropertyGet,
            DispKind::PropPut => InvokeKind::PropertyPut,
            DispKind::PropPutRef => InvokeKind::PropertyPutRef,
        }
    }
}

/// Immutable declarative interface specification.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub iid: Option<Guid>,
    pub methods: Option<Vec<MethodSlotSpec>>,
    pub dispatch: Option<Vec<DispMemberSpec>>,
    pub case_insensitive: bool,
    pub base: Option<Arc<InterfaceDescriptor>>,
}

impl InterfaceDescriptor {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    pub fn is_dispatch(&self) -> bool {
        self.dispatch.is_some()
    }

    /// Number of vtable slots this descriptor adds, if it is a vtable
    /// descriptor.
    pub fn own_slot_count(&self) -> Option<usize> {
        match (&self.methods, &self.dispatch) {
            (Some(methods), None) => Some(methods.len()),
            _ => None,
        }
    }

    /// Sum of own-slot counts over the ancestor chain; the first slot of this
    /// descriptor lives at this index. `None` if an ancestor's slot count
    /// cannot be determined.
    pub fn vtable_offset(&self) -> Option<usize> {
        let mut offset = 0;
        let mut current = self.base.as_deref();
        while let Some(base) = current {
            offset += base.own_slot_count()?;
            current = base.base.as_deref();
        }
        Some(offset)
    }

    /// Iterate over this descriptor and its ancestors, nearest first.
    pub fn ancestry(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        std::iter::successors(Some(self), |d| d.base.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    inner: InterfaceDescriptor,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: InterfaceDescriptor {
                name: name.into(),
                iid: None,
                methods: None,
                dispatch: None,
                case_insensitive: false,
                base: None,
            },
        }
    }

    pub fn iid(mut self, iid: Guid) -> Self {
        self.inner.iid = Some(iid);
        self
    }

    pub fn base(mut self, base: Arc<InterfaceDescriptor>) -> Self {
        self.inner.base = Some(base);
        self
    }

    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.inner.case_insensitive = enabled;
        self
    }

    /// Append a vtable slot, making this a vtable descriptor.
    pub fn method(mut self, method: MethodSlotSpec) -> Self {
        self.inner.methods.get_or_insert_with(Vec::new).push(method);
        self
    }

    /// Declare the vtable slot list (possibly empty).
    pub fn methods(mut self, methods: Vec<MethodSlotSpec>) -> Self {
        self.inner.methods = Some(methods);
        self
    }

    /// Append a dispatch member, making this a dispatch descriptor.
    pub fn dispatch_member(mut self, member: DispMemberSpec) -> Self {
        self.inner.dispatch.get_or_insert_with(Vec::new).push(member);
        self
    }

    pub fn dispatch_members(mut self, members: Vec<DispMemberSpec>) -> Self {
        self.inner.dispatch = Some(members);
        self
    }

    pub fn build(self) -> Arc<InterfaceDescriptor> {
        Arc::new(self.inner)
    }
}
