//! Argument resolution and lowering to the word ABI
//!
//! A call goes through three steps:
//!
//! 1. [`resolve`] matches the caller's [`Args`] against the declared
//!    parameters, filling defaults and zero values.
//! 2. [`Frame::encode`] lowers each value to machine words. Out and in-out
//!    parameters become pointers into a cell array allocated once per call;
//!    in-out values are converted into their cells before the call.
//! 3. After the call, [`Frame::collect`] converts every cell back, taking
//!    ownership of interface references and strings the callee left there.
//!
//! Temporary strings and variants built for `in` parameters are freed when
//! the frame drops, whether or not the call happened.

use std::ffi::c_void;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::bstr;
use crate::descriptor::{Direction, ParamSpec, TypeTag};
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::object::wrap_pointer;
use crate::pointer::InterfacePointer;
use crate::variant::{NativeVariant, VARIANT_FALSE, VARIANT_TRUE, Variant};

/// Arguments of one call: positional values, then named ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Variant>,
    pub named: IndexMap<String, Variant>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Variant>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }
}

impl From<Vec<Variant>> for Args {
    fn from(positional: Vec<Variant>) -> Self {
        Self {
            positional,
            named: IndexMap::new(),
        }
    }
}

impl From<()> for Args {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// Build [`Args`] from positional values and, after a `;`, named ones.
///
/// ```ignore
/// let args = args![1, "two"; flags = 3];
/// ```
#[macro_export]
macro_rules! args {
    ($($pos:expr),* $(; $($name:ident = $val:expr),* $(,)?)?) => {{
        #[allow(unused_mut)]
        let mut args = $crate::Args::new();
        $( args = args.arg($pos); )*
        $($( args = args.named(stringify!($name), $val); )*)?
        args
    }};
}

/// Match `args` against `params`. The result has one entry per parameter:
/// `Some` for caller-supplied parameters, `None` for out and lcid ones.
pub(crate) fn resolve(
    method: &str,
    params: &[ParamSpec],
    args: &Args,
    fold_names: bool,
) -> Result<Vec<Option<Variant>>> {
    let supplied: SmallVec<[usize; 8]> = params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_caller_supplied())
        .map(|(i, _)| i)
        .collect();

    if args.positional.len() > supplied.len() {
        return Err(Error::type_error(format!(
            "{method}() takes at most {} arguments ({} given)",
            supplied.len(),
            args.positional.len()
        )));
    }

    let mut values: Vec<Option<Variant>> = vec![None; params.len()];
    for (slot, value) in supplied.iter().zip(&args.positional) {
        values[*slot] = Some(value.clone());
    }

    for (name, value) in &args.named {
        let slot = supplied.iter().copied().find(|&i| {
            if fold_names {
                params[i].name.eq_ignore_ascii_case(name)
            } else {
                params[i].name == *name
            }
        });
        let Some(slot) = slot else {
            return Err(Error::type_error(format!(
                "{method}() got an unexpected keyword argument '{name}'"
            )));
        };
        if values[slot].is_some() {
            return Err(Error::type_error(format!(
                "{method}() got multiple values for argument '{name}'"
            )));
        }
        values[slot] = Some(value.clone());
    }

    for &slot in &supplied {
        if values[slot].is_some() {
            continue;
        }
        let param = &params[slot];
        let fill = match param.direction {
            Direction::InOut => param.default.clone().unwrap_or_else(|| param.tag.zero_value()),
            _ if param.optional => match (&param.default, param.tag) {
                (Some(default), _) => default.clone(),
                (None, TypeTag::Variant) => Variant::Missing,
                (None, tag) => tag.zero_value(),
            },
            _ => {
                return Err(Error::type_error(format!(
                    "{method}() missing required argument '{}'",
                    param.name
                )));
            }
        };
        values[slot] = Some(fill);
    }
    Ok(values)
}

// =============================================================================
// Word encoding
// =============================================================================

/// Number of words an argument of `tag` occupies when passed by value.
pub(crate) fn input_words(tag: TypeTag) -> Option<usize> {
    match tag {
        TypeTag::Void | TypeTag::F32 | TypeTag::F64 => None,
        TypeTag::I64 | TypeTag::U64 => Some(8 / std::mem::size_of::<usize>()),
        TypeTag::Variant => Some(if cfg!(target_pointer_width = "64") { 1 } else { 4 }),
        _ => Some(1),
    }
}

/// Whether `tag` can be returned in the integer return register(s).
pub(crate) fn returnable(tag: TypeTag) -> bool {
    !matches!(
        tag,
        TypeTag::F32 | TypeTag::F64 | TypeTag::Guid | TypeTag::Variant
    )
}

fn coerce_i64(value: &Variant, tag: TypeTag) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::type_error(format!("expected an integer for {tag:?}, got {value:?}")))
}

fn coerce_int<T: TryFrom<i64>>(value: &Variant, tag: TypeTag) -> Result<T> {
    let v = coerce_i64(value, tag)?;
    T::try_from(v).map_err(|_| Error::type_error(format!("{v} is out of range for {tag:?}")))
}

fn coerce_u64(value: &Variant, tag: TypeTag) -> Result<u64> {
    match *value {
        Variant::U64(v) => Ok(v),
        _ => coerce_int(value, tag),
    }
}

fn coerce_f64(value: &Variant, tag: TypeTag) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::type_error(format!("expected a number for {tag:?}, got {value:?}")))
}

fn coerce_bool(value: &Variant) -> Result<i16> {
    let b = value
        .as_bool()
        .ok_or_else(|| Error::type_error(format!("expected a boolean, got {value:?}")))?;
    Ok(if b { VARIANT_TRUE } else { VARIANT_FALSE })
}

fn coerce_guid(value: &Variant) -> Result<Guid> {
    match value {
        Variant::Guid(g) => Ok(*g),
        Variant::Str(s) => s
            .parse()
            .map_err(|e| Error::type_error(format!("{e}"))),
        other => Err(Error::type_error(format!("expected a GUID, got {other:?}"))),
    }
}

fn coerce_str(value: &Variant) -> Result<Option<&str>> {
    match value {
        Variant::Str(s) => Ok(Some(s)),
        Variant::Empty | Variant::Null => Ok(None),
        other => Err(Error::type_error(format!("expected a string, got {other:?}"))),
    }
}

/// Storage for one out or in-out parameter.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) union NativeCell {
    i16: i16,
    u16: u16,
    i32: i32,
    u32: u32,
    i64: i64,
    u64: u64,
    f32: f32,
    f64: f64,
    ptr: *mut c_void,
    bstr: *mut u16,
    guid: Guid,
    variant: NativeVariant,
}

impl NativeCell {
    fn zeroed() -> Self {
        NativeCell {
            variant: NativeVariant::empty(),
        }
    }
}

/// Per-call lowering state.
pub(crate) struct Frame {
    words: SmallVec<[usize; 8]>,
    cells: Vec<NativeCell>,
    cell_tags: Vec<TypeTag>,
    guids: Vec<Box<Guid>>,
    variants: Vec<Box<NativeVariant>>,
    strings: Vec<*mut u16>,
    interfaces: Vec<InterfacePointer>,
    collected: bool,
}

impl Frame {
    /// A frame with one cell per out/in-out parameter.
    pub(crate) fn new(params: &[ParamSpec]) -> Self {
        let cell_tags: Vec<TypeTag> = params
            .iter()
            .filter(|p| p.direction != Direction::In)
            .map(|p| p.tag)
            .collect();
        Self {
            words: SmallVec::new(),
            cells: vec![NativeCell::zeroed(); cell_tags.len()],
            cell_tags,
            guids: Vec::new(),
            variants: Vec::new(),
            strings: Vec::new(),
            interfaces: Vec::new(),
            collected: false,
        }
    }

    pub(crate) fn words(&self) -> &[usize] {
        &self.words
    }

    /// Lower resolved values; `lcid` fills locale parameters.
    pub(crate) fn encode(
        &mut self,
        params: &[ParamSpec],
        values: Vec<Option<Variant>>,
        lcid: u32,
    ) -> Result<()> {
        let mut cell = 0;
        for (param, value) in params.iter().zip(values) {
            if param.lcid {
                self.words.push(lcid as usize);
                continue;
            }
            match param.direction {
                Direction::In => {
                    let value = value.unwrap_or_else(|| param.tag.zero_value());
                    self.push_input(param.tag, &value)?;
                }
                Direction::Out => {
                    let p = self.cell_ptr(cell);
                    self.words.push(p as usize);
                    cell += 1;
                }
                Direction::InOut => {
                    let value = value.unwrap_or_else(|| param.tag.zero_value());
                    self.write_cell(cell, param.tag, &value)?;
                    let p = self.cell_ptr(cell);
                    self.words.push(p as usize);
                    cell += 1;
                }
            }
        }
        Ok(())
    }

    fn cell_ptr(&mut self, index: usize) -> *mut NativeCell {
        // cells are never resized after `new`, so the address is stable
        unsafe { self.cells.as_mut_ptr().add(index) }
    }

    fn push_wide(&mut self, v: u64) {
        if cfg!(target_pointer_width = "64") {
            self.words.push(v as usize);
        } else {
            self.words.push(v as u32 as usize);
            self.words.push((v >> 32) as u32 as usize);
        }
    }

    fn push_input(&mut self, tag: TypeTag, value: &Variant) -> Result<()> {
        match tag {
            TypeTag::Bool => {
                let b = coerce_bool(value)?;
                self.words.push(b as isize as usize);
            }
            TypeTag::I16 => {
                let v: i16 = coerce_int(value, tag)?;
                self.words.push(v as isize as usize);
            }
            TypeTag::U16 => {
                let v: u16 = coerce_int(value, tag)?;
                self.words.push(v as usize);
            }
            TypeTag::I32 | TypeTag::Status => {
                let v: i32 = coerce_int(value, tag)?;
                self.words.push(v as isize as usize);
            }
            TypeTag::U32 => {
                let v: u32 = coerce_int(value, tag)?;
                self.words.push(v as usize);
            }
            TypeTag::I64 => {
                let v = coerce_i64(value, tag)?;
                self.push_wide(v as u64);
            }
            TypeTag::U64 => {
                let v = coerce_u64(value, tag)?;
                self.push_wide(v);
            }
            TypeTag::Pointer => {
                let v: usize = match *value {
                    Variant::Pointer(p) => p,
                    _ => coerce_int(value, tag)?,
                };
                self.words.push(v);
            }
            TypeTag::Guid => {
                let guid = Box::new(coerce_guid(value)?);
                self.words.push(&*guid as *const Guid as usize);
                self.guids.push(guid);
            }
            TypeTag::Bstr => {
                let p = match coerce_str(value)? {
                    Some(s) => bstr::alloc(s),
                    None => std::ptr::null_mut(),
                };
                self.strings.push(p);
                self.words.push(p as usize);
            }
            TypeTag::Variant => {
                let native = Box::new(NativeVariant::from_variant(value)?);
                #[cfg(target_pointer_width = "64")]
                self.words.push(&*native as *const NativeVariant as usize);
                #[cfg(not(target_pointer_width = "64"))]
                {
                    let raw: [usize; 4] =
                        unsafe { std::ptr::read(&*native as *const NativeVariant as *const [usize; 4]) };
                    self.words.extend_from_slice(&raw);
                }
                self.variants.push(native);
            }
            TypeTag::Interface(iid) => {
                let p = InterfacePointer::from_param(value, iid)?;
                self.words.push(p.as_raw() as usize);
                self.interfaces.push(p);
            }
            TypeTag::F32 | TypeTag::F64 | TypeTag::Void => {
                return Err(Error::type_error(format!(
                    "{tag:?} cannot be passed by value"
                )));
            }
        }
        Ok(())
    }

    fn write_cell(&mut self, index: usize, tag: TypeTag, value: &Variant) -> Result<()> {
        let cell = &mut self.cells[index];
        match tag {
            TypeTag::Bool => cell.i16 = coerce_bool(value)?,
            TypeTag::I16 => cell.i16 = coerce_int(value, tag)?,
            TypeTag::U16 => cell.u16 = coerce_int(value, tag)?,
            TypeTag::I32 | TypeTag::Status => cell.i32 = coerce_int(value, tag)?,
            TypeTag::U32 => cell.u32 = coerce_int(value, tag)?,
            TypeTag::I64 => cell.i64 = coerce_i64(value, tag)?,
            TypeTag::U64 => cell.u64 = coerce_u64(value, tag)?,
            TypeTag::F32 => cell.f32 = coerce_f64(value, tag)? as f32,
            TypeTag::F64 => cell.f64 = coerce_f64(value, tag)?,
            TypeTag::Pointer => {
                cell.ptr = match *value {
                    Variant::Pointer(p) => p as *mut c_void,
                    _ => coerce_int::<usize>(value, tag)? as *mut c_void,
                }
            }
            TypeTag::Guid => cell.guid = coerce_guid(value)?,
            TypeTag::Bstr => {
                cell.bstr = match coerce_str(value)? {
                    Some(s) => bstr::alloc(s),
                    None => std::ptr::null_mut(),
                }
            }
            TypeTag::Variant => cell.variant = NativeVariant::from_variant(value)?,
            TypeTag::Interface(iid) => {
                cell.ptr = InterfacePointer::from_param(value, iid)?.into_raw();
            }
            TypeTag::Void => {
                return Err(Error::type_error("void parameter"));
            }
        }
        Ok(())
    }

    /// Convert every cell back to a value, in declaration order.
    pub(crate) fn collect(&mut self) -> Result<Vec<Variant>> {
        self.collected = true;
        let mut out = Vec::with_capacity(self.cells.len());
        let mut first_error = None;
        for index in 0..self.cells.len() {
            match unsafe { read_cell(&mut self.cells[index], self.cell_tags[index]) } {
                Ok(v) => out.push(v),
                Err(e) => {
                    out.push(Variant::Empty);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        for p in self.strings.drain(..) {
            unsafe { bstr::free(p) };
        }
        for v in &mut self.variants {
            unsafe { v.clear() };
        }
        if !self.collected {
            let _ = self.collect();
        }
    }
}

/// Take the value out of `cell`, leaving it zeroed.
unsafe fn read_cell(cell: &mut NativeCell, tag: TypeTag) -> Result<Variant> {
    let taken = std::mem::replace(cell, NativeCell::zeroed());
    unsafe {
        Ok(match tag {
            TypeTag::Bool => Variant::Bool(taken.i16 != VARIANT_FALSE),
            TypeTag::I16 => Variant::I16(taken.i16),
            TypeTag::U16 => Variant::U16(taken.u16),
            TypeTag::I32 | TypeTag::Status => Variant::I32(taken.i32),
            TypeTag::U32 => Variant::U32(taken.u32),
            TypeTag::I64 => Variant::I64(taken.i64),
            TypeTag::U64 => Variant::U64(taken.u64),
            TypeTag::F32 => Variant::F32(taken.f32),
            TypeTag::F64 => Variant::F64(taken.f64),
            TypeTag::Pointer => Variant::Pointer(taken.ptr as usize),
            TypeTag::Guid => Variant::Guid(taken.guid),
            TypeTag::Bstr => Variant::Str(bstr::take(taken.bstr)),
            TypeTag::Variant => {
                let mut v = taken.variant;
                v.into_variant()?
            }
            TypeTag::Interface(iid) => wrap_pointer(InterfacePointer::from_raw(taken.ptr, iid)),
            TypeTag::Void => Variant::Empty,
        })
    }
}

/// Interpret a raw integer return value of type `tag`.
pub(crate) fn decode_return(raw: u64, tag: TypeTag) -> Variant {
    match tag {
        TypeTag::Void => Variant::Empty,
        TypeTag::Bool => Variant::Bool(raw as u16 as i16 != VARIANT_FALSE),
        TypeTag::I16 => Variant::I16(raw as u16 as i16),
        TypeTag::U16 => Variant::U16(raw as u16),
        TypeTag::I32 | TypeTag::Status => Variant::I32(raw as u32 as i32),
        TypeTag::U32 => Variant::U32(raw as u32),
        TypeTag::I64 => Variant::I64(raw as i64),
        TypeTag::U64 => Variant::U64(raw),
        TypeTag::Pointer => Variant::Pointer(raw as usize),
        TypeTag::Bstr => Variant::Str(unsafe { bstr::take(raw as usize as *mut u16) }),
        TypeTag::Interface(iid) => {
            wrap_pointer(unsafe { InterfacePointer::from_raw(raw as usize as *mut c_void, iid) })
        }
        TypeTag::F32 | TypeTag::F64 | TypeTag::Guid | TypeTag::Variant => Variant::Empty,
    }
}

/// Shape call results: no outputs gives the call result, one gives that
/// value, several give an array in declaration order.
pub(crate) fn shape(result: Variant, mut outs: Vec<Variant>) -> Variant {
    match outs.len() {
        0 => result,
        1 => outs.remove(0),
        _ => Variant::Array(outs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::input("a", TypeTag::I32),
            ParamSpec::input("b", TypeTag::I32).with_default(10),
            ParamSpec::input("v", TypeTag::Variant).optional(),
            ParamSpec::input("lcid", TypeTag::U32).lcid(),
            ParamSpec::in_out("io", TypeTag::I32),
            ParamSpec::output("out", TypeTag::I32),
        ]
    }

    #[test]
    fn test_resolve_fills_defaults() {
        let values = resolve("M", &params(), &args![1], false).unwrap();
        assert_eq!(values[0], Some(Variant::I32(1)));
        assert_eq!(values[1], Some(Variant::I32(10)));
        assert_eq!(values[2], Some(Variant::Missing));
        assert_eq!(values[3], None);
        assert_eq!(values[4], Some(Variant::I32(0)));
        assert_eq!(values[5], None);
    }

    #[test]
    fn test_resolve_by_name() {
        let values = resolve("M", &params(), &args![1; io = 7, b = 2], false).unwrap();
        assert_eq!(values[1], Some(Variant::I32(2)));
        assert_eq!(values[4], Some(Variant::I32(7)));
    }

    #[test]
    fn test_resolve_errors() {
        let p = params();
        assert!(matches!(resolve("M", &p, &Args::new(), false), Err(Error::Type(_))));
        assert!(resolve("M", &p, &args![1, 2, 3, 4, 5], false).is_err());
        assert!(resolve("M", &p, &args![1; a = 2], false).is_err());
        assert!(resolve("M", &p, &args![1; out = 2], false).is_err());
        assert!(resolve("M", &p, &args![1; A = 2], false).is_err());
        assert!(resolve("M", &p, &args![; A = 2], true).is_ok());
    }

    #[test]
    fn test_encode_words() {
        let p = vec![
            ParamSpec::input("a", TypeTag::I16),
            ParamSpec::input("b", TypeTag::Bool),
            ParamSpec::input("lcid", TypeTag::U32).lcid(),
            ParamSpec::input("w", TypeTag::I64),
        ];
        let values = resolve("M", &p, &args![-2i16, true, 5i64], false).unwrap();
        let mut frame = Frame::new(&p);
        frame.encode(&p, values, 0x409).unwrap();
        let w = frame.words();
        assert_eq!(w[0] as isize, -2);
        assert_eq!(w[1] as isize, -1);
        assert_eq!(w[2], 0x409);
        assert_eq!(w[3], 5);
    }

    #[test]
    fn test_inout_converted_before_call() {
        let p = vec![ParamSpec::in_out("s", TypeTag::Bstr)];
        let mut frame = Frame::new(&p);
        frame.encode(&p, vec![Some(Variant::from("abc"))], 0).unwrap();
        let cell = frame.words()[0] as *const *mut u16;
        assert_eq!(unsafe { bstr::read(*cell) }, "abc");
        assert_eq!(frame.collect().unwrap(), vec![Variant::from("abc")]);
    }

    #[test]
    fn test_range_checked() {
        let p = vec![ParamSpec::input("a", TypeTag::U16)];
        let mut frame = Frame::new(&p);
        assert!(frame.encode(&p, vec![Some(Variant::I32(70000))], 0).is_err());
    }

    #[test]
    fn test_shape() {
        assert_eq!(shape(Variant::I32(0), vec![]), Variant::I32(0));
        assert_eq!(shape(Variant::I32(0), vec![Variant::I32(4)]), Variant::I32(4));
        assert_eq!(
            shape(Variant::Empty, vec![Variant::I32(1), Variant::I32(2)]),
            Variant::Array(vec![Variant::I32(1), Variant::I32(2)])
        );
    }

    #[test]
    fn test_input_words() {
        assert_eq!(input_words(TypeTag::F64), None);
        assert_eq!(input_words(TypeTag::I32), Some(1));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(input_words(TypeTag::Variant), Some(1));
    }
}
