//! Property grouping and setter routing on vtable interfaces

mod common;

use std::ffi::c_void;
use std::sync::Arc;

use combind::hresult::{DISP_E_BADINDEX, S_OK};
use combind::interfaces::IID_IUNKNOWN;
use combind::property::AccessorRole;
use combind::{
    ComInterface, Error, Guid, HRESULT, IUnknown, InterfaceDescriptor, Member, MethodSlotSpec,
    Object, ParamSpec, TypeTag, Variant, bstr, synthesize,
};
use common::{FakeObject, fake, test_iid};

unsafe extern "system" fn get_prop(this: *mut c_void, i: i32, j: i32, out: *mut i32) -> HRESULT {
    if i < 0 {
        return DISP_E_BADINDEX;
    }
    unsafe { *out = i * 10 + j + fake(this).value() };
    S_OK
}

unsafe extern "system" fn put_prop(this: *mut c_void, i: i32, j: i32, v: i32) -> HRESULT {
    unsafe { fake(this).record(format!("put {i} {j} {v}")) };
    S_OK
}

unsafe extern "system" fn putref_prop(
    this: *mut c_void,
    i: i32,
    j: i32,
    v: *mut c_void,
) -> HRESULT {
    unsafe { fake(this).record(format!("putref {i} {j} {}", !v.is_null())) };
    S_OK
}

unsafe extern "system" fn get_name(_this: *mut c_void, out: *mut *mut u16) -> HRESULT {
    unsafe { *out = bstr::alloc("cell") };
    S_OK
}

unsafe extern "system" fn put_name(this: *mut c_void, v: *const u16) -> HRESULT {
    unsafe { fake(this).record(format!("name {}", bstr::read(v))) };
    S_OK
}

unsafe extern "system" fn get_version(_this: *mut c_void, out: *mut i32) -> HRESULT {
    unsafe { *out = 3 };
    S_OK
}

unsafe extern "system" fn putref_target(this: *mut c_void, v: *mut c_void) -> HRESULT {
    unsafe { fake(this).record(format!("target {}", !v.is_null())) };
    S_OK
}

unsafe extern "system" fn put_prop_again(_this: *mut c_void, _i: i32, _j: i32, _v: i32) -> HRESULT {
    S_OK
}

const IID_IGRID: Guid = test_iid(0x0301);

fn igrid() -> Arc<InterfaceDescriptor> {
    let index = || {
        [
            ParamSpec::input("row", TypeTag::I32),
            ParamSpec::input("col", TypeTag::I32),
        ]
    };
    let [row, col] = index();
    let get = MethodSlotSpec::propget("Prop", TypeTag::Status)
        .param(row)
        .param(col)
        .param(ParamSpec::output("value", TypeTag::I32).retval());
    let [row, col] = index();
    let put = MethodSlotSpec::propput("Prop", TypeTag::Status)
        .param(row)
        .param(col)
        .param(ParamSpec::input("value", TypeTag::I32));
    let [row, col] = index();
    let putref = MethodSlotSpec::propputref("Prop", TypeTag::Status)
        .param(row)
        .param(col)
        .param(ParamSpec::input("value", TypeTag::Interface(IID_IUNKNOWN)));
    let [row, col] = index();
    let duplicate = MethodSlotSpec::propput("Prop", TypeTag::Status)
        .param(row)
        .param(col)
        .param(ParamSpec::input("value", TypeTag::I32));

    InterfaceDescriptor::builder("IGrid")
        .iid(IID_IGRID)
        .base(IUnknown::descriptor())
        .method(get)
        .method(put)
        .method(putref)
        .method(
            MethodSlotSpec::propget("Name", TypeTag::Status)
                .param(ParamSpec::output("value", TypeTag::Bstr).retval()),
        )
        .method(
            MethodSlotSpec::propput("Name", TypeTag::Status)
                .param(ParamSpec::input("value", TypeTag::Bstr)),
        )
        .method(
            MethodSlotSpec::propget("Version", TypeTag::Status)
                .param(ParamSpec::output("value", TypeTag::I32).retval()),
        )
        .method(
            MethodSlotSpec::propputref("Target", TypeTag::Status)
                .param(ParamSpec::input("value", TypeTag::Interface(IID_IUNKNOWN))),
        )
        .method(duplicate)
        .build()
}

fn grid() -> (&'static FakeObject, Object) {
    let fake = FakeObject::new(
        &[IID_IGRID],
        &[
            get_prop as *const c_void,
            put_prop as *const c_void,
            putref_prop as *const c_void,
            get_name as *const c_void,
            put_name as *const c_void,
            get_version as *const c_void,
            putref_target as *const c_void,
            put_prop_again as *const c_void,
        ],
    );
    let binding = synthesize(&igrid()).unwrap();
    (fake, Object::new(fake.pointer(IID_IGRID), binding))
}

#[test]
fn test_accessors_share_one_member() {
    let binding = synthesize(&igrid()).unwrap();
    let Member::Property(prop) = binding.member("Prop").unwrap() else {
        panic!("Prop should be a property");
    };
    assert_eq!(prop.arity(), 2);
    assert!(prop.is_readable());
    assert!(prop.is_writable());
    assert_eq!(binding.member_names().filter(|n| *n == "Prop").count(), 1);
}

#[test]
fn test_indexed_get() {
    let (fake, obj) = grid();
    fake.set_value(100);
    let prop = obj.property("Prop").unwrap();
    assert_eq!(prop.get((1, 2)).unwrap(), Variant::I32(112));
    assert_eq!(obj.call("Prop", combind::args![3, 4]).unwrap(), Variant::I32(134));
}

#[test]
fn test_plain_value_routes_to_put() {
    let (fake, obj) = grid();
    obj.property("Prop").unwrap().set((1, 2), 7).unwrap();
    assert_eq!(fake.last().as_deref(), Some("put 1 2 7"));
}

#[test]
fn test_object_value_routes_to_putref() {
    let (fake, obj) = grid();
    let other = FakeObject::new(&[], &[]);
    let value = Variant::Unknown(other.pointer(IID_IUNKNOWN));
    obj.property("Prop").unwrap().set((1, 2), value).unwrap();
    assert_eq!(fake.last().as_deref(), Some("putref 1 2 true"));
    // the duplicate handed to the callee was released after the call
    assert_eq!(other.refs(), 0);
}

#[test]
fn test_duplicate_accessor_is_ignored() {
    let (fake, obj) = grid();
    obj.property("Prop").unwrap().set((0, 0), 1).unwrap();
    assert_eq!(fake.last().as_deref(), Some("put 0 0 1"));
}

#[test]
fn test_scalar_property_get_and_set() {
    let (fake, obj) = grid();
    assert_eq!(obj.get("Name").unwrap(), Variant::Str("cell".into()));
    obj.set("Name", "grid").unwrap();
    assert_eq!(fake.last().as_deref(), Some("name grid"));
}

#[test]
fn test_all_index_is_the_same_as_no_index() {
    let (fake, obj) = grid();
    let name = obj.property("Name").unwrap();
    assert_eq!(name.get(()).unwrap(), name.call(()).unwrap());
    assert_eq!(name.get(()).unwrap(), obj.get("Name").unwrap());

    name.set((), "everything").unwrap();
    assert_eq!(fake.last().as_deref(), Some("name everything"));
    obj.set("Name", "everything").unwrap();
    assert_eq!(fake.last().as_deref(), Some("name everything"));

    // an indexed property still needs its indices
    let prop = obj.property("Prop").unwrap();
    assert!(matches!(prop.get(()), Err(Error::Type(_))));
    assert!(matches!(prop.call(()), Err(Error::Type(_))));
    assert!(matches!(prop.set((), 1), Err(Error::Type(_))));
}

#[test]
fn test_read_only_property_rejects_assignment() {
    let (_, obj) = grid();
    assert_eq!(obj.get("Version").unwrap(), Variant::I32(3));
    let err = obj.set("Version", 4).unwrap_err();
    assert!(matches!(err, Error::Type(ref msg) if msg.contains("read-only")));
}

#[test]
fn test_setter_falls_back_to_the_only_one() {
    let binding = synthesize(&igrid()).unwrap();
    let Member::Property(target) = binding.member("Target").unwrap() else {
        panic!("Target should be a property");
    };
    assert!(!target.is_readable());
    let (role, _) = target.setter_for(&Variant::I32(1)).unwrap();
    assert_eq!(role, AccessorRole::PutRef);
}

#[test]
fn test_write_only_property_rejects_read() {
    let (fake, obj) = grid();
    assert!(matches!(obj.get("Target"), Err(Error::Type(_))));
    obj.set("Target", Variant::Null).unwrap();
    assert_eq!(fake.last().as_deref(), Some("target false"));
}

#[test]
fn test_indexed_property_needs_accessor() {
    let (_, obj) = grid();
    assert!(matches!(obj.get("Prop"), Err(Error::Type(_))));
}

#[test]
fn test_bad_index_is_index_error() {
    let (_, obj) = grid();
    let prop = obj.property("Prop").unwrap();
    assert!(matches!(prop.get((-1, 0)), Err(Error::Index(_))));
}
