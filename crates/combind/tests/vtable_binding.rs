//! Calls through synthesized vtable bindings

mod common;

use std::ffi::c_void;
use std::sync::Arc;

use combind::hresult::{E_FAIL, S_OK};
use combind::{
    ComInterface, Error, ErrorRecord, HRESULT, IUnknown, InterfaceDescriptor, MethodSlotSpec,
    Object, ParamSpec, TypeTag, Variant, args, bstr, set_error_record, synthesize,
};
use common::{FakeObject, fake, test_iid};

// =============================================================================
// Fake component
// =============================================================================

unsafe extern "system" fn get_value(this: *mut c_void, out: *mut i32) -> HRESULT {
    unsafe { *out = fake(this).value() };
    S_OK
}

unsafe extern "system" fn set_value(this: *mut c_void, v: i32) -> HRESULT {
    unsafe { fake(this).set_value(v) };
    S_OK
}

unsafe extern "system" fn fail(_this: *mut c_void) -> HRESULT {
    set_error_record(ErrorRecord {
        description: Some("disk full".into()),
        source: Some("Fake.Cell".into()),
        ..Default::default()
    });
    E_FAIL
}

unsafe extern "system" fn echo(_this: *mut c_void, s: *const u16, out: *mut *mut u16) -> HRESULT {
    unsafe {
        let text = bstr::read(s);
        *out = bstr::alloc(&format!("echo: {text}"));
    }
    S_OK
}

unsafe extern "system" fn word_count(_this: *mut c_void) -> u32 {
    42
}

unsafe extern "system" fn reset(this: *mut c_void) {
    unsafe {
        let obj = fake(this);
        obj.set_value(0);
        obj.record("reset");
    }
}

unsafe extern "system" fn div_mod(
    _this: *mut c_void,
    a: i32,
    b: i32,
    quotient: *mut i32,
    remainder: *mut i32,
) -> HRESULT {
    unsafe {
        *quotient = a / b;
        *remainder = a % b;
    }
    S_OK
}

unsafe extern "system" fn wide(_this: *mut c_void, v: i64, out: *mut i64) -> HRESULT {
    unsafe { *out = v * 2 };
    S_OK
}

const IID_ICELL: combind::Guid = test_iid(0x0101);
const IID_ICELLWRITER: combind::Guid = test_iid(0x0102);
const IID_ICALC: combind::Guid = test_iid(0x0103);

fn icell() -> Arc<InterfaceDescriptor> {
    InterfaceDescriptor::builder("ICell")
        .iid(IID_ICELL)
        .base(IUnknown::descriptor())
        .method(
            MethodSlotSpec::new("GetValue", TypeTag::Status)
                .param(ParamSpec::output("value", TypeTag::I32).retval()),
        )
        .build()
}

fn icell_writer() -> Arc<InterfaceDescriptor> {
    InterfaceDescriptor::builder("ICellWriter")
        .iid(IID_ICELLWRITER)
        .base(icell())
        .method(
            MethodSlotSpec::new("SetValue", TypeTag::Status)
                .param(ParamSpec::input("value", TypeTag::I32)),
        )
        .build()
}

fn icalc() -> Arc<InterfaceDescriptor> {
    InterfaceDescriptor::builder("ICalc")
        .iid(IID_ICALC)
        .base(IUnknown::descriptor())
        .method(MethodSlotSpec::new("Fail", TypeTag::Status))
        .method(
            MethodSlotSpec::new("Echo", TypeTag::Status)
                .param(ParamSpec::input("text", TypeTag::Bstr))
                .param(ParamSpec::output("result", TypeTag::Bstr).retval()),
        )
        .method(MethodSlotSpec::new("WordCount", TypeTag::U32))
        .method(MethodSlotSpec::new("Reset", TypeTag::Void))
        .method(
            MethodSlotSpec::new("DivMod", TypeTag::Status)
                .param(ParamSpec::input("a", TypeTag::I32))
                .param(ParamSpec::input("b", TypeTag::I32).with_default(10))
                .param(ParamSpec::output("quotient", TypeTag::I32))
                .param(ParamSpec::output("remainder", TypeTag::I32)),
        )
        .method(
            MethodSlotSpec::new("Wide", TypeTag::Status)
                .param(ParamSpec::input("v", TypeTag::I64))
                .param(ParamSpec::output("out", TypeTag::I64).retval()),
        )
        .build()
}

fn cell() -> (&'static FakeObject, Object) {
    let fake = FakeObject::new(
        &[IID_ICELL, IID_ICELLWRITER],
        &[get_value as *const c_void, set_value as *const c_void],
    );
    let binding = synthesize(&icell_writer()).unwrap();
    (fake, Object::new(fake.pointer(IID_ICELLWRITER), binding))
}

fn calc(with_error_info: bool) -> (&'static FakeObject, Object) {
    let slots = [
        fail as *const c_void,
        echo as *const c_void,
        word_count as *const c_void,
        reset as *const c_void,
        div_mod as *const c_void,
        wide as *const c_void,
    ];
    let fake = if with_error_info {
        FakeObject::with_error_info(&[IID_ICALC], &slots)
    } else {
        FakeObject::new(&[IID_ICALC], &slots)
    };
    let binding = synthesize(&icalc()).unwrap();
    (fake, Object::new(fake.pointer(IID_ICALC), binding))
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_slot_offsets_follow_base_chain() {
    let cell = synthesize(&icell()).unwrap();
    let writer = synthesize(&icell_writer()).unwrap();
    assert_eq!(cell.vtable_offset(), Some(3));
    assert_eq!(writer.vtable_offset(), Some(4));
    assert!(writer.has_member("GetValue"));
    assert!(writer.has_member("AddRef"));
    assert_eq!(writer.base().map(|b| b.name()), Some("ICell"));
}

#[test]
fn test_derived_method_reaches_its_slot() {
    let (fake, obj) = cell();
    assert_eq!(obj.call("SetValue", args![5]).unwrap(), Variant::I32(S_OK));
    assert_eq!(fake.value(), 5);
    assert_eq!(obj.call("GetValue", ()).unwrap(), Variant::I32(5));
}

#[test]
fn test_named_arguments() {
    let (fake, obj) = cell();
    obj.call("SetValue", args![; value = 9]).unwrap();
    assert_eq!(fake.value(), 9);
}

#[test]
fn test_unknown_member_is_attribute_error() {
    let (_, obj) = cell();
    let err = obj.call("Frobnicate", ()).unwrap_err();
    assert!(matches!(err, Error::Attribute { ref name, .. } if name == "Frobnicate"));
}

#[test]
fn test_too_many_arguments_is_type_error() {
    let (_, obj) = cell();
    assert!(matches!(obj.call("SetValue", args![1, 2]), Err(Error::Type(_))));
    assert!(matches!(obj.call("SetValue", ()), Err(Error::Type(_))));
}

#[test]
fn test_out_of_range_argument_is_type_error() {
    let (fake, obj) = cell();
    assert!(matches!(obj.call("SetValue", args![i64::MAX]), Err(Error::Type(_))));
    assert_eq!(fake.value(), 0);
}

#[test]
fn test_failure_status_without_error_info() {
    let (_, obj) = calc(false);
    let err = obj.call("Fail", ()).unwrap_err();
    assert_eq!(err.hresult(), Some(E_FAIL));
    let Error::Status(status) = err else {
        panic!("expected a status error");
    };
    assert!(status.record.is_none());
    // the record left behind was not consumed
    assert!(combind::error::take_error_record().is_some());
}

#[test]
fn test_failure_status_with_extended_record() {
    let (_, obj) = calc(true);
    let Err(Error::Status(status)) = obj.call("Fail", ()) else {
        panic!("expected a status error");
    };
    assert_eq!(status.hresult, E_FAIL);
    assert_eq!(status.text, "disk full");
    let record = status.record.unwrap();
    assert_eq!(record.source.as_deref(), Some("Fake.Cell"));
    assert_eq!(record.iid, IID_ICALC);
    assert!(combind::error::take_error_record().is_none());
}

#[test]
fn test_string_in_and_out() {
    let (_, obj) = calc(false);
    assert_eq!(
        obj.call("Echo", args!["hi"]).unwrap(),
        Variant::Str("echo: hi".into())
    );
}

#[test]
fn test_value_and_void_returns() {
    let (fake, obj) = calc(false);
    fake.set_value(3);
    assert_eq!(obj.call("WordCount", ()).unwrap(), Variant::U32(42));
    assert_eq!(obj.call("Reset", ()).unwrap(), Variant::Empty);
    assert_eq!(fake.value(), 0);
    assert_eq!(fake.last().as_deref(), Some("reset"));
}

#[test]
fn test_several_outputs_form_an_array() {
    let (_, obj) = calc(false);
    assert_eq!(
        obj.call("DivMod", args![17, 5]).unwrap(),
        Variant::Array(vec![Variant::I32(3), Variant::I32(2)])
    );
    // `b` defaults to 10
    assert_eq!(
        obj.call("DivMod", args![47]).unwrap(),
        Variant::Array(vec![Variant::I32(4), Variant::I32(7)])
    );
}

#[test]
fn test_wide_integers() {
    let (_, obj) = calc(false);
    let big = 1_i64 << 40;
    assert_eq!(obj.call("Wide", args![big]).unwrap(), Variant::I64(big * 2));
}

#[test]
fn test_null_pointer_is_type_error() {
    let binding = synthesize(&icell()).unwrap();
    let obj = Object::new(combind::InterfacePointer::null(IID_ICELL), binding);
    assert!(matches!(obj.call("GetValue", ()), Err(Error::Type(_))));
}

#[test]
fn test_case_sensitive_by_default() {
    let (_, obj) = cell();
    assert!(matches!(obj.call("getvalue", ()), Err(Error::Attribute { .. })));
}
