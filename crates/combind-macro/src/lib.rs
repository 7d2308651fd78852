//! Procedural macro for describing component interfaces
//!
//! Provides `#[com_interface("iid", ...)]`, which turns an annotated trait
//! into a marker struct implementing `ComInterface`, whose `descriptor()`
//! builds the matching `InterfaceDescriptor` once.
//!
//! ## Options
//! - `extends(Base)` - base interface (default `IUnknown`)
//! - `root` - no base interface
//! - `dispatch` - members are dispatch members invoked by member id
//! - `case_insensitive` - member names resolve ignoring case
//! - `internal` - use `crate::` paths (inside combind itself)
//!
//! ## Method attributes
//! - `#[propget]`, `#[propput]`, `#[propputref]` - property accessors
//! - `#[id(n)]` - member id (required for dispatch members)
//! - `#[property]`, `#[property(readonly)]` - plain dispatch property
//! - `#[helpstring("...")]` - documentation (doc comments also work)
//!
//! ## Parameter attributes
//! `#[out]`, `#[inout]`, `#[retval]`, `#[optional]`, `#[lcid]`,
//! `#[default(expr)]`
//!
//! ## Types
//! `HRESULT` returns select the status convention. Integers, `bool`, `Guid`,
//! `Bstr`, `Variant` and raw pointers map to their tags; any other type name
//! is an interface and maps to `Interface(<T as ComInterface>::IID)`. Out and
//! in-out parameters are written as `*mut T`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2, TokenTree};
use quote::quote;
use syn::{
    Attribute, Expr, ExprLit, FnArg, ItemTrait, Lit, Meta, Pat, ReturnType, TraitItem,
    TraitItemFn, Type, UnOp, parse_macro_input,
};

/// Returns the path to the combind crate.
///
/// When `internal` is true (used inside combind itself), this returns `crate`.
fn crate_path(internal: bool) -> TokenStream2 {
    if internal {
        quote! { crate }
    } else {
        quote! { ::combind }
    }
}

// =============================================================================
// Interface options
// =============================================================================

enum BaseInterface {
    /// `IUnknown` for vtable interfaces, implicit `IDispatch` for dispatch ones.
    Default,
    Root,
    Extends(syn::Path),
}

struct InterfaceConfig {
    iid: (u32, u16, u16, [u8; 8]),
    base: BaseInterface,
    dispatch: bool,
    case_insensitive: bool,
    internal: bool,
}

fn parse_interface_config(attr: TokenStream2) -> Result<InterfaceConfig, syn::Error> {
    let tokens: Vec<TokenTree> = attr.into_iter().collect();

    let guid_lit = match tokens.first() {
        Some(TokenTree::Literal(lit)) => syn::parse2::<syn::LitStr>(TokenTree::Literal(lit.clone()).into())
            .map_err(|_| syn::Error::new(lit.span(), "expected the interface id as a string literal"))?,
        Some(other) => {
            return Err(syn::Error::new(
                other.span(),
                "expected the interface id as a string literal",
            ));
        }
        None => {
            return Err(syn::Error::new(
                Span::call_site(),
                "missing interface id, e.g. #[com_interface(\"00000000-0000-0000-c000-000000000046\")]",
            ));
        }
    };
    let iid = parse_guid_string(&guid_lit.value())
        .map_err(|e| syn::Error::new(guid_lit.span(), e))?;

    let mut config = InterfaceConfig {
        iid,
        base: BaseInterface::Default,
        dispatch: false,
        case_insensitive: false,
        internal: false,
    };

    let mut i = 1;
    while i < tokens.len() {
        match &tokens[i] {
            TokenTree::Ident(ident) => {
                let name = ident.to_string();
                match name.as_str() {
                    "extends" => {
                        i += 1;
                        let Some(TokenTree::Group(group)) = tokens.get(i) else {
                            return Err(syn::Error::new(
                                ident.span(),
                                "expected '(...)' after 'extends'",
                            ));
                        };
                        let path: syn::Path = syn::parse2(group.stream()).map_err(|_| {
                            syn::Error::new(group.span(), "expected an interface path inside 'extends(...)'")
                        })?;
                        config.base = BaseInterface::Extends(path);
                        i += 1;
                    }
                    "root" => {
                        config.base = BaseInterface::Root;
                        i += 1;
                    }
                    "dispatch" => {
                        config.dispatch = true;
                        i += 1;
                    }
                    "case_insensitive" => {
                        config.case_insensitive = true;
                        i += 1;
                    }
                    "internal" => {
                        config.internal = true;
                        i += 1;
                    }
                    _ => {
                        return Err(syn::Error::new(
                            ident.span(),
                            format!(
                                "unknown option '{}', expected 'extends(...)', 'root', 'dispatch', 'case_insensitive', or 'internal'",
                                name
                            ),
                        ));
                    }
                }
            }
            TokenTree::Punct(punct) if punct.as_char() == ',' => {
                i += 1;
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "unexpected token in com_interface options",
                ));
            }
        }
    }
    Ok(config)
}

fn parse_guid_string(s: &str) -> Result<(u32, u16, u16, [u8; 8]), String> {
    let s = s.trim().trim_start_matches('{').trim_end_matches('}');
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 5 {
        return Err(format!(
            "Invalid GUID format: expected 'xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx', got '{}'",
            s
        ));
    }
    let lengths = [8, 4, 4, 4, 12];
    for (part, len) in parts.iter().zip(lengths) {
        if part.len() != len || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "Invalid GUID group '{}': expected {} hex digits",
                part, len
            ));
        }
    }

    let data1 = u32::from_str_radix(parts[0], 16).map_err(|e| e.to_string())?;
    let data2 = u16::from_str_radix(parts[1], 16).map_err(|e| e.to_string())?;
    let data3 = u16::from_str_radix(parts[2], 16).map_err(|e| e.to_string())?;
    let tail = format!("{}{}", parts[3], parts[4]);
    let mut data4 = [0u8; 8];
    for (i, byte) in data4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok((data1, data2, data3, data4))
}

// =============================================================================
// Attribute parsing
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Method,
    PropGet,
    PropPut,
    PropPutRef,
    Property { readonly: bool },
}

struct MethodAttrs {
    kind: MemberKind,
    id: Option<i32>,
    doc: Option<String>,
}

#[derive(Default)]
struct ParamAttrs {
    out: bool,
    inout: bool,
    retval: bool,
    optional: bool,
    lcid: bool,
    default: Option<Expr>,
}

fn lit_i32(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse().ok(),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => lit_i32(&unary.expr).map(|v| -v),
        Expr::Group(group) => lit_i32(&group.expr),
        _ => None,
    }
}

fn doc_text(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn parse_method_attrs(method: &TraitItemFn) -> Result<MethodAttrs, syn::Error> {
    let name = method.sig.ident.to_string();
    let mut attrs = MethodAttrs {
        kind: MemberKind::Method,
        id: None,
        doc: doc_text(&method.attrs),
    };
    let set_kind = |kind: MemberKind, span: Span, current: &mut MemberKind| {
        if *current != MemberKind::Method {
            return Err(syn::Error::new(
                span,
                format!("method '{}': more than one accessor attribute", name),
            ));
        }
        *current = kind;
        Ok(())
    };

    for attr in &method.attrs {
        let span = attr.path().segments.first().map_or_else(Span::call_site, |s| s.ident.span());
        let path = attr.path();
        if path.is_ident("propget") {
            set_kind(MemberKind::PropGet, span, &mut attrs.kind)?;
        } else if path.is_ident("propput") {
            set_kind(MemberKind::PropPut, span, &mut attrs.kind)?;
        } else if path.is_ident("propputref") {
            set_kind(MemberKind::PropPutRef, span, &mut attrs.kind)?;
        } else if path.is_ident("property") {
            let readonly = match &attr.meta {
                Meta::Path(_) => false,
                Meta::List(list) => {
                    let flag: syn::Ident = list.parse_args()?;
                    if flag != "readonly" {
                        return Err(syn::Error::new(flag.span(), "expected 'readonly'"));
                    }
                    true
                }
                Meta::NameValue(nv) => {
                    return Err(syn::Error::new_spanned(nv, "expected #[property] or #[property(readonly)]"));
                }
            };
            set_kind(MemberKind::Property { readonly }, span, &mut attrs.kind)?;
        } else if path.is_ident("id") {
            let expr: Expr = attr.parse_args()?;
            let id = lit_i32(&expr).ok_or_else(|| {
                syn::Error::new_spanned(&expr, "expected an integer member id")
            })?;
            attrs.id = Some(id);
        } else if path.is_ident("helpstring") {
            let text: syn::LitStr = attr.parse_args()?;
            attrs.doc = Some(text.value());
        }
    }
    Ok(attrs)
}

fn parse_param_attrs(attrs: &[Attribute]) -> Result<ParamAttrs, syn::Error> {
    let mut parsed = ParamAttrs::default();
    for attr in attrs {
        let path = attr.path();
        if path.is_ident("out") {
            parsed.out = true;
        } else if path.is_ident("inout") {
            parsed.inout = true;
        } else if path.is_ident("retval") {
            parsed.retval = true;
        } else if path.is_ident("optional") {
            parsed.optional = true;
        } else if path.is_ident("lcid") {
            parsed.lcid = true;
        } else if path.is_ident("default") {
            parsed.default = Some(attr.parse_args()?);
        } else {
            return Err(syn::Error::new_spanned(
                attr,
                "unknown parameter attribute, expected out, inout, retval, optional, lcid or default(...)",
            ));
        }
    }
    if parsed.out && parsed.inout {
        return Err(syn::Error::new(
            Span::call_site(),
            "a parameter cannot be both #[out] and #[inout]",
        ));
    }
    Ok(parsed)
}

// =============================================================================
// Type mapping
// =============================================================================

fn is_ident(ty: &Type, names: &[&str]) -> bool {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .is_some_and(|s| names.iter().any(|n| s.ident == n)),
        _ => false,
    }
}

/// Tag for a by-value type.
fn type_tag(ty: &Type, krate: &TokenStream2) -> Result<TokenStream2, syn::Error> {
    match ty {
        Type::Tuple(t) if t.elems.is_empty() => Ok(quote! { #krate::TypeTag::Void }),
        Type::Paren(p) => type_tag(&p.elem, krate),
        Type::Group(g) => type_tag(&g.elem, krate),
        Type::Reference(r) => type_tag(&r.elem, krate),
        Type::Ptr(p) if is_ident(&p.elem, &["Guid", "GUID"]) => Ok(quote! { #krate::TypeTag::Guid }),
        Type::Ptr(_) => Ok(quote! { #krate::TypeTag::Pointer }),
        Type::Path(p) => {
            let Some(last) = p.path.segments.last() else {
                return Err(syn::Error::new_spanned(ty, "unsupported type"));
            };
            let tag = match last.ident.to_string().as_str() {
                "HRESULT" => quote! { Status },
                "bool" | "VARIANT_BOOL" => quote! { Bool },
                "i16" => quote! { I16 },
                "u16" => quote! { U16 },
                "i32" => quote! { I32 },
                "u32" => quote! { U32 },
                "i64" => quote! { I64 },
                "u64" => quote! { U64 },
                "f32" => quote! { F32 },
                "f64" => quote! { F64 },
                "isize" | "usize" | "c_void" => quote! { Pointer },
                "Guid" | "GUID" => quote! { Guid },
                "Bstr" | "BSTR" | "String" | "str" => quote! { Bstr },
                "Variant" | "VARIANT" => quote! { Variant },
                "i8" | "u8" | "char" | "i128" | "u128" => {
                    return Err(syn::Error::new_spanned(
                        ty,
                        format!("type '{}' has no native tag", last.ident),
                    ));
                }
                _ => {
                    let path = &p.path;
                    return Ok(quote! {
                        #krate::TypeTag::Interface(<#path as #krate::ComInterface>::IID)
                    });
                }
            };
            Ok(quote! { #krate::TypeTag::#tag })
        }
        _ => Err(syn::Error::new_spanned(ty, "unsupported parameter type")),
    }
}

/// Tag for the pointee of an `#[out]` or `#[inout]` parameter.
fn out_type_tag(ty: &Type, krate: &TokenStream2) -> Result<TokenStream2, syn::Error> {
    let Type::Ptr(outer) = ty else {
        return Err(syn::Error::new_spanned(
            ty,
            "out and in-out parameters must be written as `*mut T`",
        ));
    };
    match &*outer.elem {
        // `*mut *mut IFoo` receives an interface pointer
        Type::Ptr(inner) => match &*inner.elem {
            Type::Path(p)
                if !is_ident(&inner.elem, &["c_void", "u16", "u8", "i8", "i16", "i32", "u32", "usize"]) =>
            {
                let path = &p.path;
                Ok(quote! { #krate::TypeTag::Interface(<#path as #krate::ComInterface>::IID) })
            }
            _ => Ok(quote! { #krate::TypeTag::Pointer }),
        },
        elem => type_tag(elem, krate),
    }
}

fn return_tag(output: &ReturnType, krate: &TokenStream2) -> Result<TokenStream2, syn::Error> {
    match output {
        ReturnType::Default => Ok(quote! { #krate::TypeTag::Void }),
        ReturnType::Type(_, ty) => type_tag(ty, krate),
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_trait_method(method: &TraitItemFn) -> Result<(), syn::Error> {
    let name = method.sig.ident.to_string();
    if method.default.is_some() {
        return Err(syn::Error::new_spanned(
            &method.default,
            format!("method '{}': interface methods cannot have a body", name),
        ));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &method.sig.generics,
            format!("method '{}': generic methods are not supported", name),
        ));
    }
    if let Some(asyncness) = &method.sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            format!("method '{}': async methods are not supported", name),
        ));
    }
    match method.sig.inputs.first() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => Ok(()),
        _ => Err(syn::Error::new_spanned(
            &method.sig,
            format!("method '{}': first parameter must be &self", name),
        )),
    }
}

// =============================================================================
// Code generation
// =============================================================================

fn vtable_slot(method: &TraitItemFn, krate: &TokenStream2) -> Result<TokenStream2, syn::Error> {
    let attrs = parse_method_attrs(method)?;
    let name = method.sig.ident.to_string();
    let kind = match attrs.kind {
        MemberKind::Method => quote! { Method },
        MemberKind::PropGet => quote! { PropGet },
        MemberKind::PropPut => quote! { PropPut },
        MemberKind::PropPutRef => quote! { PropPutRef },
        MemberKind::Property { .. } => {
            return Err(syn::Error::new_spanned(
                &method.sig.ident,
                format!("method '{}': #[property] is only valid on dispatch interfaces", name),
            ));
        }
    };
    if attrs.id.is_some() {
        return Err(syn::Error::new_spanned(
            &method.sig.ident,
            format!("method '{}': #[id] is only valid on dispatch interfaces", name),
        ));
    }
    let ret = return_tag(&method.sig.output, krate)?;

    let mut params = Vec::new();
    for input in method.sig.inputs.iter().skip(1) {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let Pat::Ident(pat) = &*pat_type.pat else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                format!("method '{}': parameters must be plain identifiers", name),
            ));
        };
        let pname = pat.ident.to_string();
        let pattrs = parse_param_attrs(&pat_type.attrs)?;
        let (ctor, tag) = if pattrs.out {
            (quote! { output }, out_type_tag(&pat_type.ty, krate)?)
        } else if pattrs.inout {
            (quote! { in_out }, out_type_tag(&pat_type.ty, krate)?)
        } else {
            (quote! { input }, type_tag(&pat_type.ty, krate)?)
        };
        let mut param = quote! { #krate::ParamSpec::#ctor(#pname, #tag) };
        if pattrs.optional {
            param = quote! { #param.optional() };
        }
        if let Some(default) = &pattrs.default {
            param = quote! { #param.with_default(#default) };
        }
        if pattrs.retval {
            param = quote! { #param.retval() };
        }
        if pattrs.lcid {
            param = quote! { #param.lcid() };
        }
        params.push(param);
    }

    let doc = attrs.doc.map(|d| quote! { .doc(#d) });
    Ok(quote! {
        #krate::MethodSlotSpec::new(#name, #ret)
            .kind(#krate::SlotKind::#kind)
            #(.param(#params))*
            #doc
    })
}

fn dispatch_member(method: &TraitItemFn, krate: &TokenStream2) -> Result<TokenStream2, syn::Error> {
    let attrs = parse_method_attrs(method)?;
    let name = method.sig.ident.to_string();
    let Some(id) = attrs.id else {
        return Err(syn::Error::new_spanned(
            &method.sig.ident,
            format!("method '{}': dispatch members need #[id(n)]", name),
        ));
    };
    let kind = match attrs.kind {
        MemberKind::Method => quote! { Method },
        MemberKind::PropGet => quote! { PropGet },
        MemberKind::PropPut => quote! { PropPut },
        MemberKind::PropPutRef => quote! { PropPutRef },
        MemberKind::Property { readonly } => quote! { Property { readonly: #readonly } },
    };
    let ret = return_tag(&method.sig.output, krate)?;

    let mut args = Vec::new();
    for input in method.sig.inputs.iter().skip(1) {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let Pat::Ident(pat) = &*pat_type.pat else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                format!("method '{}': parameters must be plain identifiers", name),
            ));
        };
        let pname = pat.ident.to_string();
        let pattrs = parse_param_attrs(&pat_type.attrs)?;
        if pattrs.out || pattrs.inout || pattrs.lcid || pattrs.retval {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                format!(
                    "method '{}': dispatch arguments only accept #[optional] and #[default]",
                    name
                ),
            ));
        }
        let tag = type_tag(&pat_type.ty, krate)?;
        let mut arg = quote! { #krate::DispArgSpec::new(#pname, #tag) };
        if pattrs.optional {
            arg = quote! { #arg.optional() };
        }
        if let Some(default) = &pattrs.default {
            arg = quote! { #arg.with_default(#default) };
        }
        args.push(arg);
    }

    let doc = attrs.doc.map(|d| quote! { .doc(#d) });
    Ok(quote! {
        #krate::DispMemberSpec::new(#id, #name, #krate::DispKind::#kind, #ret)
            #(.arg(#args))*
            #doc
    })
}

fn com_interface_internal(config: InterfaceConfig, input: ItemTrait) -> Result<TokenStream2, syn::Error> {
    let krate = crate_path(config.internal);
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "interfaces cannot be generic",
        ));
    }

    let mut members = Vec::new();
    for item in &input.items {
        let TraitItem::Fn(method) = item else {
            return Err(syn::Error::new_spanned(
                item,
                "interfaces may only contain methods",
            ));
        };
        validate_trait_method(method)?;
        members.push(if config.dispatch {
            dispatch_member(method, &krate)?
        } else {
            vtable_slot(method, &krate)?
        });
    }

    let ident = &input.ident;
    let vis = &input.vis;
    let name = ident.to_string();
    let docs: Vec<&Attribute> = input.attrs.iter().filter(|a| a.path().is_ident("doc")).collect();
    let (d1, d2, d3, d4) = config.iid;
    let case_insensitive = config.case_insensitive;

    let base = match &config.base {
        BaseInterface::Extends(path) => {
            quote! { .base(<#path as #krate::ComInterface>::descriptor()) }
        }
        BaseInterface::Default if !config.dispatch => {
            quote! { .base(<#krate::IUnknown as #krate::ComInterface>::descriptor()) }
        }
        _ => quote! {},
    };
    let member_list = if config.dispatch {
        quote! { .dispatch_members(::std::vec![#(#members),*]) }
    } else {
        quote! { .methods(::std::vec![#(#members),*]) }
    };

    Ok(quote! {
        #(#docs)*
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #vis struct #ident;

        impl #krate::ComInterface for #ident {
            const IID: #krate::Guid = #krate::Guid::new(#d1, #d2, #d3, [#(#d4),*]);
            const NAME: &'static str = #name;

            fn descriptor() -> ::std::sync::Arc<#krate::InterfaceDescriptor> {
                static DESCRIPTOR: ::std::sync::OnceLock<::std::sync::Arc<#krate::InterfaceDescriptor>> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR
                    .get_or_init(|| {
                        #krate::InterfaceDescriptor::builder(#name)
                            .iid(<Self as #krate::ComInterface>::IID)
                            #base
                            .case_insensitive(#case_insensitive)
                            #member_list
                            .build()
                    })
                    .clone()
            }
        }
    })
}

/// Describe a component interface with an annotated trait.
///
/// # Example
/// ```ignore
/// #[com_interface("6d5f4b0e-9a51-4e5a-a3c4-1b2f0d6e7a10")]
/// pub trait ICounter {
///     #[propget]
///     fn Value(&self, #[out] #[retval] value: *mut i32) -> HRESULT;
///     fn Add(&self, amount: i32, #[inout] total: *mut i64) -> HRESULT;
/// }
///
/// #[com_interface("0b8c2f3e-1d2a-4c55-9e0f-6a7b8c9d0e1f", dispatch)]
/// pub trait DCounter {
///     #[id(1)]
///     #[property(readonly)]
///     fn Value(&self) -> i32;
/// }
/// ```
#[proc_macro_attribute]
pub fn com_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = match parse_interface_config(attr.into()) {
        Ok(config) => config,
        Err(err) => return err.to_compile_error().into(),
    };
    let input = parse_macro_input!(item as ItemTrait);
    match com_interface_internal(config, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
