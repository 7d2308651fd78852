//! Reference counting of interface pointers

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use combind::interfaces::{IID_IDISPATCH, IID_IUNKNOWN};
use combind::{ComPointers, Error, InterfacePointer, PointerState, PointerTable, Variant};
use common::{FakeObject, test_iid};

const IID_IA: combind::Guid = test_iid(0x0601);
const IID_IB: combind::Guid = test_iid(0x0602);

#[test]
fn test_duplicate_then_drop_balances() {
    let fake = FakeObject::new(&[], &[]);
    let p = fake.pointer(IID_IUNKNOWN);
    let q = p.clone();
    assert_eq!(fake.refs(), 2);
    drop(p);
    drop(q);
    assert_eq!(fake.releases(), 2);
    assert_eq!(fake.refs(), 0);
}

#[test]
fn test_explicit_release_is_idempotent() {
    let fake = FakeObject::new(&[], &[]);
    let mut p = fake.pointer(IID_IUNKNOWN);
    p.release();
    assert_eq!(p.state(), PointerState::Released);
    assert!(p.is_null());
    p.release();
    drop(p);
    assert_eq!(fake.releases(), 1);
}

#[test]
fn test_from_raw_takes_ownership_without_add_ref() {
    let fake = FakeObject::new(&[], &[]);
    let raw = fake.pointer(IID_IUNKNOWN).into_raw();
    assert_eq!(fake.refs(), 1);
    let p = unsafe { InterfacePointer::from_raw(raw, IID_IUNKNOWN) };
    assert_eq!(fake.add_refs(), 1);
    drop(p);
    assert_eq!(fake.refs(), 0);
}

#[test]
fn test_null_pointer() {
    let p = InterfacePointer::null(IID_IUNKNOWN);
    assert!(p.is_null());
    assert_eq!(p.state(), PointerState::Unbound);
    let q = p.clone();
    assert!(q.is_null());
    assert!(p.narrow(IID_IA).unwrap().is_null());
}

#[test]
fn test_equality_and_hash_by_address() {
    let fake = FakeObject::new(&[IID_IA], &[]);
    let other = FakeObject::new(&[], &[]);
    let a = fake.pointer(IID_IUNKNOWN);
    let b = fake.pointer(IID_IA);
    let c = other.pointer(IID_IUNKNOWN);
    assert_eq!(a, b);
    assert_ne!(a, c);
    let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn test_narrow_same_interface_duplicates() {
    let fake = FakeObject::new(&[IID_IA], &[]);
    let p = fake.pointer(IID_IA);
    let q = p.narrow(IID_IA).unwrap();
    assert_eq!(fake.queries(), 0);
    assert_eq!(fake.refs(), 2);
    drop(q);
    assert_eq!(fake.refs(), 1);
}

#[test]
fn test_narrow_queries_the_object() {
    let fake = FakeObject::new(&[IID_IA], &[]);
    let p = fake.pointer(IID_IUNKNOWN);
    let a = p.narrow(IID_IA).unwrap();
    assert_eq!(a.iid(), IID_IA);
    assert_eq!(fake.queries(), 1);
    assert!(matches!(p.narrow(IID_IB), Err(Error::Type(_))));
    drop((p, a));
    assert_eq!(fake.refs(), 0);
}

#[test]
fn test_pointer_table_answers_without_querying() {
    let fake = FakeObject::new(&[IID_IA, IID_IB], &[]);
    let mut table = PointerTable::new();
    table.insert(fake.pointer(IID_IA)).insert(fake.pointer(IID_IB));
    let table = Arc::new(table);
    assert!(table.contains(&IID_IB));

    let a = table.pointer(&IID_IA).unwrap();
    let b = a.narrow(IID_IB).unwrap();
    assert_eq!(b.iid(), IID_IB);
    assert_eq!(fake.queries(), 0);
    // not in the table, even though the object would answer
    assert!(matches!(a.narrow(IID_IDISPATCH), Err(Error::Type(_))));
    assert_eq!(fake.queries(), 0);
}

#[test]
fn test_dead_table_falls_back_to_query() {
    let fake = FakeObject::new(&[IID_IA, IID_IB], &[]);
    let mut table = PointerTable::new();
    table.insert(fake.pointer(IID_IA));
    let table = Arc::new(table);
    let a = table.pointer(&IID_IA).unwrap();
    drop(table);

    let b = a.narrow(IID_IB).unwrap();
    assert_eq!(b.iid(), IID_IB);
    assert_eq!(fake.queries(), 1);
}

#[test]
fn test_from_param() {
    let fake = FakeObject::new(&[IID_IA], &[]);
    assert!(InterfacePointer::from_param(&Variant::Null, IID_IA).unwrap().is_null());
    assert!(InterfacePointer::from_param(&Variant::Empty, IID_IA).unwrap().is_null());
    assert!(matches!(
        InterfacePointer::from_param(&Variant::I32(3), IID_IA),
        Err(Error::Type(_))
    ));

    let unknown = Variant::Unknown(fake.pointer(IID_IUNKNOWN));
    let a = InterfacePointer::from_param(&unknown, IID_IA).unwrap();
    assert_eq!(a.iid(), IID_IA);
    assert_eq!(a.as_raw(), fake.raw());
}

#[test]
fn test_from_param_coclass_uses_its_table() {
    let fake = FakeObject::new(&[IID_IA], &[]);
    let mut table = PointerTable::new();
    table.insert(fake.pointer(IID_IA));
    let table: Arc<dyn ComPointers> = Arc::new(table);
    let value = Variant::Coclass(table);
    let a = InterfacePointer::from_param(&value, IID_IA).unwrap();
    assert_eq!(a.as_raw(), fake.raw());
    assert!(matches!(InterfacePointer::from_param(&value, IID_IB), Err(Error::Type(_))));
    assert_eq!(fake.queries(), 0);
}
