//! `#[derive(Schema)]`: generates a field table and the typed accessors
//! `schema_sync::SchemaObject` requires from a struct's own field
//! declarations, the same role `binschema_derive`'s `#[derive(KnownSchema)]`
//! plays for that crate's self-describing schema trait (see
//! `examples/gretchenfrage-notminecraft/binschema_derive/src/lib.rs`) — a
//! struct that already looks like the thing it describes, read once at
//! macro-expansion time instead of being re-derived by hand per type.
//!
//! ```ignore
//! #[derive(Schema, Default)]
//! struct PrimitiveTypes {
//!     #[schema(index = 0)]
//!     int_value: i32,
//!     #[schema(index = 1, number)]
//!     float_value: f64,
//!     #[schema(index = 2)]
//!     string_value: String,
//!     listeners: schema_sync::Listeners,
//! }
//! ```
//!
//! A struct with any `ref`/`array`/`map`-of-schema field needs exactly one
//! `schema_sync::Listeners` field (any name, found by type) since a derive
//! macro can't add fields to the struct it's attached to. `#[schema(extends
//! = Base)]` on the struct composes a base type's field table ahead of the
//! deriving type's own and delegates the inherited accessors, factory, and
//! listener slots to a `base: Base` field the deriving struct must declare
//! — the flattened stand-in for the C++ virtual-override chain (see
//! `InheritedTypes.hpp` and the redesign note in `SPEC_FULL.md` §12).
//! The factory only ever constructs a field's *statically declared* child
//! type via `Default`; a `ref` field meant to hold one of several subtypes
//! (colyseus's `Entity`/`Player`/`Bot`) must be pre-populated by host code
//! before the first patch touches it — the reconciler always prefers an
//! already-present child over calling the factory (see `reconciler.rs`).

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{
    parse_macro_input, punctuated::Punctuated, Data, DeriveInput, Fields, Meta, Token, Type,
};

#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct FieldSpec {
    ident: syn::Ident,
    index: usize,
    ty: Type,
    wire_kind: &'static str,
    child_primitive: Option<syn::Ident>,
    child_schema: Option<Type>,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = input.ident.clone();
    let extends = struct_extends(&input)?;

    let Data::Struct(data) = input.data else {
        return Err(syn::Error::new_spanned(&ident, "#[derive(Schema)] only supports structs"));
    };
    let Fields::Named(fields) = data.fields else {
        return Err(syn::Error::new_spanned(&ident, "#[derive(Schema)] requires named fields"));
    };

    let mut specs = Vec::new();
    let mut listeners_field = None;
    for field in fields.named {
        let Some(field_ident) = field.ident.clone() else { continue };
        if extends.is_some() && field_ident == "base" {
            continue;
        }
        if type_name(&field.ty) == "Listeners" || type_name(&field.ty) == "schema_sync::Listeners" {
            listeners_field = Some(field_ident);
            continue;
        }
        if let Some(spec) = parse_field(&field_ident, &field.ty, &field.attrs)? {
            specs.push(spec);
        }
    }
    specs.sort_by_key(|s| s.index);

    if extends.is_none() && listeners_field.is_none() {
        return Err(syn::Error::new_spanned(
            &ident,
            "#[derive(Schema)] needs a `schema_sync::Listeners` field (or `#[schema(extends = ..)]`)",
        ));
    }

    let own_fields = quote_field_defs(&specs);

    let field_table_static = if let Some(base) = &extends {
        quote! {
            impl #ident {
                const OWN_FIELDS: &'static [::schema_sync::FieldDef] = &[ #(#own_fields),* ];

                pub fn field_table_static() -> ::schema_sync::FieldTable {
                    static TABLE: ::std::sync::OnceLock<&'static [::schema_sync::FieldDef]> =
                        ::std::sync::OnceLock::new();
                    TABLE.get_or_init(|| {
                        let mut v = #base::field_table_static().to_vec();
                        v.extend_from_slice(#ident::OWN_FIELDS);
                        ::std::boxed::Box::leak(v.into_boxed_slice())
                    })
                }
            }
        }
    } else {
        quote! {
            impl #ident {
                const OWN_FIELDS: &'static [::schema_sync::FieldDef] = &[ #(#own_fields),* ];

                pub fn field_table_static() -> ::schema_sync::FieldTable {
                    #ident::OWN_FIELDS
                }
            }
        }
    };

    let base_len_expr = extends
        .as_ref()
        .map(|base| quote! { #base::field_table_static().len() })
        .unwrap_or_else(|| quote! { 0usize });

    let accessors = gen_accessors(&specs, extends.as_ref(), &base_len_expr);
    let factory_body = gen_factory(&specs, extends.as_ref());
    let listeners = gen_listener_slots(extends.as_ref(), listeners_field.as_ref());

    let expanded = quote! {
        #field_table_static

        impl ::schema_sync::SchemaObject for #ident {
            fn field_table(&self) -> ::schema_sync::FieldTable {
                #ident::field_table_static()
            }

            fn factory(&self, identity: ::std::any::TypeId) -> ::std::option::Option<::std::boxed::Box<dyn ::schema_sync::SchemaObject>> {
                #factory_body
            }

            fn as_any(&self) -> &dyn ::std::any::Any { self }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any { self }
            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> { self }

            #(#accessors)*

            #listeners
        }
    };
    Ok(expanded)
}

fn struct_extends(input: &DeriveInput) -> syn::Result<Option<syn::Path>> {
    for attr in &input.attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        for meta in metas {
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("extends") {
                    if let syn::Expr::Path(expr_path) = nv.value {
                        return Ok(Some(expr_path.path));
                    }
                }
            }
        }
    }
    Ok(None)
}

fn parse_field(ident: &syn::Ident, ty: &Type, attrs: &[syn::Attribute]) -> syn::Result<Option<FieldSpec>> {
    let mut index = None;
    let mut is_number = false;
    let mut child_primitive = None;
    let mut child_schema = None;

    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        for meta in metas {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("index") => {
                    if let syn::Expr::Lit(lit) = &nv.value {
                        if let syn::Lit::Int(i) = &lit.lit {
                            index = Some(i.base10_parse::<usize>()?);
                        }
                    }
                }
                Meta::NameValue(nv) if nv.path.is_ident("child") => {
                    if let syn::Expr::Path(p) = &nv.value {
                        child_primitive = p.path.get_ident().cloned();
                    }
                }
                Meta::NameValue(nv) if nv.path.is_ident("child_schema") => {
                    if let syn::Expr::Path(p) = &nv.value {
                        child_schema = Some(Type::Path(syn::TypePath {
                            qself: None,
                            path: p.path.clone(),
                        }));
                    }
                }
                Meta::Path(p) if p.is_ident("number") => {
                    is_number = true;
                }
                _ => {}
            }
        }
    }

    let Some(index) = index else {
        return Err(syn::Error::new_spanned(ident, "fields need #[schema(index = N)]"));
    };

    let wire_kind = wire_kind_for(ty, is_number);
    let child_schema = child_schema.or_else(|| {
        if wire_kind == "Ref" {
            Some(child_inner_type(ty))
        } else {
            None
        }
    });

    Ok(Some(FieldSpec {
        ident: ident.clone(),
        index,
        ty: ty.clone(),
        wire_kind,
        child_primitive,
        child_schema,
    }))
}

fn type_name(ty: &Type) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}

fn wire_kind_for(ty: &Type, is_number: bool) -> &'static str {
    match type_name(ty).as_str() {
        "bool" => "Boolean",
        "i8" => "Int8",
        "u8" => "Uint8",
        "i16" => "Int16",
        "u16" => "Uint16",
        "i32" => "Int32",
        "u32" => "Uint32",
        "i64" => "Int64",
        "u64" => "Uint64",
        "f32" => "Float32",
        "f64" if is_number => "Number",
        "f64" => "Float64",
        "String" => "String",
        "ArrayContainer" | "schema_sync::ArrayContainer" => "Array",
        "MapContainer" | "schema_sync::MapContainer" => "Map",
        _ => "Ref",
    }
}

fn quote_field_defs(specs: &[FieldSpec]) -> Vec<TokenStream2> {
    specs
        .iter()
        .map(|spec| {
            let name = spec.ident.to_string();
            let kind_ident = syn::Ident::new(spec.wire_kind, spec.ident.span());
            let child_primitive = match &spec.child_primitive {
                Some(id) => quote! { ::std::option::Option::Some(::schema_sync::WireKind::#id) },
                None => quote! { ::std::option::Option::None },
            };
            let child_schema = match &spec.child_schema {
                Some(ty) => quote! { ::std::option::Option::Some(::std::any::TypeId::of::<#ty>()) },
                None => quote! { ::std::option::Option::None },
            };
            quote! {
                ::schema_sync::FieldDef {
                    name: #name,
                    kind: ::schema_sync::WireKind::#kind_ident,
                    child_primitive: #child_primitive,
                    child_schema: #child_schema,
                }
            }
        })
        .collect()
}

fn gen_accessors(specs: &[FieldSpec], extends: Option<&syn::Path>, base_len: &TokenStream2) -> Vec<TokenStream2> {
    let mut out = Vec::new();
    let primitive_accessors: &[(&str, &str, &str)] = &[
        ("Boolean", "get_bool", "set_bool"),
        ("Int8", "get_i8", "set_i8"),
        ("Uint8", "get_u8", "set_u8"),
        ("Int16", "get_i16", "set_i16"),
        ("Uint16", "get_u16", "set_u16"),
        ("Int32", "get_i32", "set_i32"),
        ("Uint32", "get_u32", "set_u32"),
        ("Int64", "get_i64", "set_i64"),
        ("Uint64", "get_u64", "set_u64"),
        ("Float32", "get_f32", "set_f32"),
        ("Float64", "get_f64", "set_f64"),
        ("Number", "get_number", "set_number"),
        ("String", "get_string", "set_string"),
    ];

    for &(kind, getter, setter) in primitive_accessors {
        let matching: Vec<&FieldSpec> = specs.iter().filter(|s| s.wire_kind == kind).collect();
        // Even when this level owns no field of `kind`, a multi-level
        // `extends` chain may still route a field index of this kind to an
        // ancestor several levels up (a derive invocation only ever sees its
        // own struct's fields, never a base's) — so the accessor must still
        // exist here to delegate, not be skipped.
        if matching.is_empty() && extends.is_none() {
            continue;
        }
        let getter_ident = syn::Ident::new(getter, proc_macro2::Span::call_site());
        let setter_ident = syn::Ident::new(setter, proc_macro2::Span::call_site());
        let ret_ty = primitive_return_type(kind);
        let arms_get: Vec<TokenStream2> = matching
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => self.#field.clone(), }
            })
            .collect();
        let arms_set: Vec<TokenStream2> = matching
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => { self.#field = value; } }
            })
            .collect();
        let base_delegate_get = extends
            .map(|_| quote! { if field < #base_len { return self.base.#getter_ident(field); } })
            .unwrap_or_default();
        let base_delegate_set = extends
            .map(|_| quote! { if field < #base_len { self.base.#setter_ident(field, value); return; } })
            .unwrap_or_default();
        out.push(quote! {
            fn #getter_ident(&self, field: usize) -> #ret_ty {
                #base_delegate_get
                match field {
                    #(#arms_get)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
            fn #setter_ident(&mut self, field: usize, value: #ret_ty) {
                #base_delegate_set
                match field {
                    #(#arms_set)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
        });
    }

    let ref_specs: Vec<&FieldSpec> = specs.iter().filter(|s| s.wire_kind == "Ref").collect();
    if !ref_specs.is_empty() || extends.is_some() {
        let take_arms: Vec<TokenStream2> = ref_specs
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => self.#field.take().map(|b| b as ::std::boxed::Box<dyn ::schema_sync::SchemaObject>), }
            })
            .collect();
        let put_arms: Vec<TokenStream2> = ref_specs
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                if boxed_inner_is_dyn_schema_object(&s.ty) {
                    // The field's declared storage is already `Box<dyn
                    // SchemaObject>`: a `ref` whose declared child identity
                    // admits subtypes (spec §4.3.a/§9 inheritance) is typed
                    // this way so a host factory can hand back any subtype
                    // without a downcast the concrete field type couldn't
                    // satisfy.
                    quote! { #idx => { self.#field = value; } }
                } else {
                    let ty = child_inner_type(&s.ty);
                    quote! {
                        #idx => {
                            self.#field = value.map(|b| {
                                *b.into_any().downcast::<#ty>().expect("child factory returned the wrong concrete type")
                            });
                        }
                    }
                }
            })
            .collect();
        let get_arms: Vec<TokenStream2> = ref_specs
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => self.#field.as_deref().map(|b| b as &dyn ::schema_sync::SchemaObject), }
            })
            .collect();
        let base_delegate_take = extends
            .map(|_| quote! { if field < #base_len { return self.base.take_ref(field); } })
            .unwrap_or_default();
        let base_delegate_put = extends
            .map(|_| quote! { if field < #base_len { self.base.put_ref(field, value); return; } })
            .unwrap_or_default();
        let base_delegate_getref = extends
            .map(|_| quote! { if field < #base_len { return self.base.get_ref(field); } })
            .unwrap_or_default();
        out.push(quote! {
            fn take_ref(&mut self, field: usize) -> ::std::option::Option<::std::boxed::Box<dyn ::schema_sync::SchemaObject>> {
                #base_delegate_take
                match field {
                    #(#take_arms)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
            fn put_ref(&mut self, field: usize, value: ::std::option::Option<::std::boxed::Box<dyn ::schema_sync::SchemaObject>>) {
                #base_delegate_put
                match field {
                    #(#put_arms)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
            fn get_ref(&self, field: usize) -> ::std::option::Option<&dyn ::schema_sync::SchemaObject> {
                #base_delegate_getref
                match field {
                    #(#get_arms)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
        });
    }

    for (kind, getter, getter_mut) in [
        ("Array", "get_array", "get_array_mut"),
        ("Map", "get_map", "get_map_mut"),
    ] {
        let container_specs: Vec<&FieldSpec> = specs.iter().filter(|s| s.wire_kind == kind).collect();
        if container_specs.is_empty() && extends.is_none() {
            continue;
        }
        let getter_ident = syn::Ident::new(getter, proc_macro2::Span::call_site());
        let getter_mut_ident = syn::Ident::new(getter_mut, proc_macro2::Span::call_site());
        let ty_ident = if kind == "Array" {
            quote! { ::schema_sync::ArrayContainer }
        } else {
            quote! { ::schema_sync::MapContainer }
        };
        let arms: Vec<TokenStream2> = container_specs
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => &self.#field, }
            })
            .collect();
        let arms_mut: Vec<TokenStream2> = container_specs
            .iter()
            .map(|s| {
                let idx = s.index;
                let field = &s.ident;
                quote! { #idx => &mut self.#field, }
            })
            .collect();
        let base_delegate = extends
            .map(|_| quote! { if field < #base_len { return self.base.#getter_ident(field); } })
            .unwrap_or_default();
        let base_delegate_mut = extends
            .map(|_| quote! { if field < #base_len { return self.base.#getter_mut_ident(field); } })
            .unwrap_or_default();
        out.push(quote! {
            fn #getter_ident(&self, field: usize) -> &#ty_ident {
                #base_delegate
                match field {
                    #(#arms)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
            fn #getter_mut_ident(&mut self, field: usize) -> &mut #ty_ident {
                #base_delegate_mut
                match field {
                    #(#arms_mut)*
                    _ => ::std::unreachable!("field {field} not covered by generated accessor"),
                }
            }
        });
    }

    out
}

fn primitive_return_type(kind: &str) -> TokenStream2 {
    match kind {
        "Boolean" => quote! { bool },
        "Int8" => quote! { i8 },
        "Uint8" => quote! { u8 },
        "Int16" => quote! { i16 },
        "Uint16" => quote! { u16 },
        "Int32" => quote! { i32 },
        "Uint32" => quote! { u32 },
        "Int64" => quote! { i64 },
        "Uint64" => quote! { u64 },
        "Float32" => quote! { f32 },
        "Float64" => quote! { f64 },
        "Number" => quote! { f64 },
        "String" => quote! { String },
        _ => unreachable!(),
    }
}

/// Every distinct schema child type this struct's own fields declare,
/// deduplicated by rendered type path. The factory only needs to know how
/// to build these: one `Default::default()` per declared identity.
fn distinct_child_types(specs: &[FieldSpec]) -> Vec<&Type> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for spec in specs {
        if let Some(ty) = &spec.child_schema {
            let rendered = type_name(ty);
            if !seen.contains(&rendered) {
                seen.push(rendered);
                out.push(ty);
            }
        }
    }
    out
}

fn gen_factory(specs: &[FieldSpec], extends: Option<&syn::Path>) -> TokenStream2 {
    let children = distinct_child_types(specs);
    let arms: Vec<TokenStream2> = children
        .iter()
        .map(|ty| {
            quote! {
                _ if identity == ::std::any::TypeId::of::<#ty>() => {
                    ::std::option::Option::Some(::std::boxed::Box::new(<#ty as ::std::default::Default>::default()))
                }
            }
        })
        .collect();
    let base_delegate = extends
        .map(|_| quote! {
            if let ::std::option::Option::Some(found) = self.base.factory(identity) {
                return ::std::option::Option::Some(found);
            }
        })
        .unwrap_or_default();
    quote! {
        #base_delegate
        match identity {
            #(#arms)*
            _ => ::std::option::Option::None,
        }
    }
}

/// Whether `ty` is `Option<Box<dyn ...>>` — the storage shape for a `ref`
/// field whose declared child identity may hold any subtype assignable to
/// it (spec §4.3.a/§9). Such a field must carry an explicit
/// `#[schema(child_schema = ..)]` attribute since there is no concrete
/// Rust type here to infer one from.
fn boxed_inner_is_dyn_schema_object(ty: &Type) -> bool {
    let Type::Path(p) = ty else { return false };
    let Some(seg) = p.path.segments.last() else { return false };
    if seg.ident != "Option" {
        return false;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else { return false };
    let Some(syn::GenericArgument::Type(Type::Path(inner))) = args.args.first() else { return false };
    let Some(inner_seg) = inner.path.segments.last() else { return false };
    if inner_seg.ident != "Box" {
        return false;
    }
    let syn::PathArguments::AngleBracketed(inner_args) = &inner_seg.arguments else { return false };
    matches!(inner_args.args.first(), Some(syn::GenericArgument::Type(Type::TraitObject(_))))
}

/// The declared element type a `ref`/container-of-schema field's
/// `Option<Box<T>>` wraps. Falls back to the field's own type if the shape
/// doesn't match, which will simply fail the downcast at runtime with a
/// clear panic message rather than silently miscompiling.
fn child_inner_type(ty: &Type) -> Type {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            if seg.ident == "Option" {
                if let syn::PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(syn::GenericArgument::Type(Type::Path(inner))) = args.args.first() {
                        if let Some(inner_seg) = inner.path.segments.last() {
                            if inner_seg.ident == "Box" {
                                if let syn::PathArguments::AngleBracketed(inner_args) = &inner_seg.arguments {
                                    if let Some(syn::GenericArgument::Type(t)) = inner_args.args.first() {
                                        return t.clone();
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    ty.clone()
}

fn gen_listener_slots(extends: Option<&syn::Path>, listeners_field: Option<&syn::Ident>) -> TokenStream2 {
    if extends.is_some() {
        quote! {
            fn on_change_listener(&mut self) -> &mut ::std::option::Option<::std::boxed::Box<dyn ::std::ops::FnMut(&dyn ::schema_sync::SchemaObject, &[::schema_sync::DataChange])>> {
                self.base.on_change_listener()
            }
            fn on_remove_listener(&mut self) -> &mut ::std::option::Option<::std::boxed::Box<dyn ::std::ops::FnMut(&dyn ::schema_sync::SchemaObject)>> {
                self.base.on_remove_listener()
            }
        }
    } else {
        let field = listeners_field.expect("checked by caller");
        quote! {
            fn on_change_listener(&mut self) -> &mut ::std::option::Option<::std::boxed::Box<dyn ::std::ops::FnMut(&dyn ::schema_sync::SchemaObject, &[::schema_sync::DataChange])>> {
                self.#field.on_change_mut()
            }
            fn on_remove_listener(&mut self) -> &mut ::std::option::Option<::std::boxed::Box<dyn ::std::ops::FnMut(&dyn ::schema_sync::SchemaObject)>> {
                self.#field.on_remove_mut()
            }
        }
    }
}
