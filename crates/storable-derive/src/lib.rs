//! Derive macro for Storable entities.
//!
//! This crate provides `#[derive(Entity)]`, which turns a struct with named
//! fields into a registered entity type. The generated code refers to
//! `::storable_orm`, so the macro is used through that crate's re-export.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitBool,
    LitInt, LitStr, Path, PathArguments, Type,
};

/// Derives `EntityType` and `Entity` for a struct, plus typed accessors.
///
/// # Attributes
///
/// - `#[entity(name = "Blog\\Post")]` - Entity name (defaults to the struct
///   name)
/// - `#[entity(parent = Content)]` - Parent entity type
/// - `#[entity(abstract)]` - No table; queried through concrete subtypes
/// - `#[entity(customize = path::to::fn)]` - `fn(&mut SchemaDescriptor)`
///   run last on the derived descriptor
/// - `#[entity(hooks = "manual")]` - Skip the empty `Entity` impl so the
///   hooks can be written by hand
/// - `#[entity(index(title, author))]`, `unique(...)`, `fulltext(...)` -
///   Multi-column indexes; `name = "..."` inside sets the index name
///
/// # Field Attributes
///
/// - `length = n`, `decimals = n`, `comment = "..."`, `unsigned`
/// - `lazy` - Left out of fetches, loaded on first access
/// - `prefetch = false`, `prefetch_limit = n` - Reference batching
/// - `index`, `unique`, `fulltext` - Single-column index named after the
///   field
///
/// `Option<T>` fields are nullable, every other field is NOT NULL.
/// `Handle<T>` fields reference `T`.
///
/// # Generated Items
///
/// For a struct `Post`, this macro generates:
///
/// - `impl EntityType for Post` and, unless hooks are manual,
///   `impl Entity for Post`
/// - `PostFields`, a trait on `Handle<Post>` with one getter and one
///   `set_` setter per field, each taking the session
/// - `Post::into_entity(self, &session)` (concrete entities only) and
///   `Post::load(&session, &handle)`
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let vis = &input.vis;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity derive does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity derive only supports structs",
            ));
        }
    };

    let attrs = parse_entity_attrs(&input.attrs)?;
    let entity_name = attrs.name.unwrap_or_else(|| struct_name.to_string());

    let mut properties = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let (kind, nullable) = classify(&field.ty)?;
        properties.push(PropertyInfo {
            ident: ident.clone(),
            name: ident.unraw().to_string(),
            ty: field.ty.clone(),
            kind,
            nullable,
            attrs: parse_field_attrs(&field.attrs)?,
        });
    }

    let declarations: Vec<TokenStream2> = properties.iter().map(declaration).collect();
    let indexes: Vec<TokenStream2> = attrs.indexes.iter().map(IndexSpec::tokens).collect();
    let parent = attrs.parent.as_ref().map(|parent| {
        quote! { .parent(<#parent as ::storable_orm::EntityType>::NAME) }
    });
    let abstract_entity = attrs.is_abstract.then(|| quote! { .abstract_entity() });
    let customize = attrs
        .customize
        .as_ref()
        .map(|hook| quote! { .customize(#hook) });

    let entity_impl = (!attrs.manual_hooks).then(|| {
        quote! {
            impl ::storable_orm::Entity for #struct_name {}
        }
    });

    let trait_name = format_ident!("{}Fields", struct_name);
    let trait_doc = format!("Typed property accessors for `{entity_name}`.");
    let mut signatures = Vec::new();
    let mut accessors = Vec::new();
    for property in &properties {
        let getter = format_ident!("{}", property.name);
        let setter = format_ident!("set_{}", property.name);
        let name = &property.name;
        let ty = &property.ty;
        let getter_doc = format!("Reads `{name}`.");
        let setter_doc = format!("Sets `{name}`; the change is written by the next store.");
        signatures.push(quote! {
            #[doc = #getter_doc]
            fn #getter(&self, session: &::storable_orm::Session) -> ::storable_orm::Result<#ty>;

            #[doc = #setter_doc]
            fn #setter(
                &self,
                session: &::storable_orm::Session,
                value: #ty,
            ) -> ::storable_orm::Result<()>;
        });
        accessors.push(quote! {
            fn #getter(&self, session: &::storable_orm::Session) -> ::storable_orm::Result<#ty> {
                session.get::<#struct_name, #ty>(self, #name)
            }

            fn #setter(
                &self,
                session: &::storable_orm::Session,
                value: #ty,
            ) -> ::storable_orm::Result<()> {
                session.set::<#struct_name, #ty>(self, #name, value)
            }
        });
    }

    let setters = properties.iter().map(|property| {
        let ident = &property.ident;
        let name = &property.name;
        let ty = &property.ty;
        quote! { session.set::<Self, #ty>(&handle, #name, self.#ident)?; }
    });
    let into_entity = (!attrs.is_abstract).then(|| {
        quote! {
            /// Creates a transient instance holding these values.
            #vis fn into_entity(
                self,
                session: &::storable_orm::Session,
            ) -> ::storable_orm::Result<::storable_orm::Handle<Self>> {
                let handle = session.create::<Self>()?;
                #(#setters)*
                Ok(handle)
            }
        }
    });
    let loaders = properties.iter().map(|property| {
        let ident = &property.ident;
        let name = &property.name;
        let ty = &property.ty;
        quote! { #ident: session.get::<Self, #ty>(handle, #name)?, }
    });

    Ok(quote! {
        impl ::storable_orm::EntityType for #struct_name {
            const NAME: &'static str = #entity_name;

            fn definition() -> ::storable_orm::EntityDefinition {
                ::storable_orm::EntityDefinition::new(#entity_name)
                    #parent
                    #abstract_entity
                    #(.property(#declarations))*
                    #(.index(#indexes))*
                    #customize
            }
        }

        #entity_impl

        #[doc = #trait_doc]
        #vis trait #trait_name {
            #(#signatures)*
        }

        impl #trait_name for ::storable_orm::Handle<#struct_name> {
            #(#accessors)*
        }

        impl #struct_name {
            #into_entity

            /// Reads every property of `handle`.
            #vis fn load(
                session: &::storable_orm::Session,
                handle: &::storable_orm::Handle<Self>,
            ) -> ::storable_orm::Result<Self> {
                Ok(Self {
                    #(#loaders)*
                })
            }
        }
    })
}

struct PropertyInfo {
    ident: Ident,
    name: String,
    ty: Type,
    kind: FieldKind,
    nullable: bool,
    attrs: FieldAttrs,
}

#[derive(Debug)]
enum FieldKind {
    Bool,
    Int { unsigned: bool },
    Float,
    String,
    Mixed,
    Reference(Type),
    Custom(Type),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexKind {
    Plain,
    Unique,
    Fulltext,
}

impl IndexKind {
    fn from_path(path: &Path) -> Option<Self> {
        if path.is_ident("index") {
            Some(Self::Plain)
        } else if path.is_ident("unique") {
            Some(Self::Unique)
        } else if path.is_ident("fulltext") {
            Some(Self::Fulltext)
        } else {
            None
        }
    }

    fn tokens(self) -> TokenStream2 {
        match self {
            Self::Plain => quote!(::storable_orm::IndexKind::Plain),
            Self::Unique => quote!(::storable_orm::IndexKind::Unique),
            Self::Fulltext => quote!(::storable_orm::IndexKind::Fulltext),
        }
    }
}

#[derive(Debug)]
struct IndexSpec {
    name: String,
    kind: IndexKind,
    columns: Vec<String>,
}

impl IndexSpec {
    fn tokens(&self) -> TokenStream2 {
        let name = &self.name;
        let kind = self.kind.tokens();
        let columns = &self.columns;
        quote! {
            ::storable_orm::IndexDescriptor::new(#name, #kind, [#(#columns),*])
        }
    }
}

#[derive(Default)]
struct EntityAttrs {
    name: Option<String>,
    parent: Option<Path>,
    is_abstract: bool,
    customize: Option<Path>,
    manual_hooks: bool,
    indexes: Vec<IndexSpec>,
}

#[derive(Default)]
struct FieldAttrs {
    length: Option<u32>,
    decimals: Option<u32>,
    comment: Option<String>,
    unsigned: bool,
    lazy: bool,
    prefetch: Option<bool>,
    prefetch_limit: Option<usize>,
    index: Option<IndexKind>,
}

fn parse_entity_attrs(attrs: &[Attribute]) -> syn::Result<EntityAttrs> {
    let mut result = EntityAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
            } else if meta.path.is_ident("parent") {
                result.parent = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("abstract") {
                result.is_abstract = true;
            } else if meta.path.is_ident("customize") {
                result.customize = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("hooks") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value() != "manual" {
                    return Err(syn::Error::new_spanned(value, "expected hooks = \"manual\""));
                }
                result.manual_hooks = true;
            } else if let Some(kind) = IndexKind::from_path(&meta.path) {
                result.indexes.push(parse_index(&meta, kind)?);
            } else {
                return Err(meta.error("unsupported entity attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

fn parse_index(meta: &ParseNestedMeta<'_>, kind: IndexKind) -> syn::Result<IndexSpec> {
    let mut name = None;
    let mut columns = Vec::new();
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("name") && inner.input.peek(syn::Token![=]) {
            let value: LitStr = inner.value()?.parse()?;
            name = Some(value.value());
        } else if let Some(ident) = inner.path.get_ident() {
            columns.push(ident.unraw().to_string());
        } else {
            return Err(inner.error("expected a field name"));
        }
        Ok(())
    })?;
    if columns.is_empty() {
        return Err(meta.error("index needs at least one field"));
    }
    Ok(IndexSpec {
        name: name.unwrap_or_else(|| columns.join("_")),
        kind,
        columns,
    })
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("length") {
                result.length = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("decimals") {
                result.decimals = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("comment") {
                result.comment = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("unsigned") {
                result.unsigned = true;
            } else if meta.path.is_ident("lazy") {
                result.lazy = true;
            } else if meta.path.is_ident("prefetch") {
                result.prefetch = Some(meta.value()?.parse::<LitBool>()?.value);
            } else if meta.path.is_ident("prefetch_limit") {
                result.prefetch_limit = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if let Some(kind) = IndexKind::from_path(&meta.path) {
                result.index = Some(kind);
            } else {
                return Err(meta.error("unsupported field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

/// Returns the single type argument of `ty` if its last segment is
/// `wrapper`.
fn type_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };
    match arguments.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn classify(ty: &Type) -> syn::Result<(FieldKind, bool)> {
    match type_argument(ty, "Option") {
        Some(inner) => Ok((classify_inner(inner)?, true)),
        None => Ok((classify_inner(ty)?, false)),
    }
}

fn classify_inner(ty: &Type) -> syn::Result<FieldKind> {
    let Type::Path(path) = ty else {
        return Err(syn::Error::new_spanned(ty, "unsupported field type"));
    };
    let Some(segment) = path.path.segments.last() else {
        return Err(syn::Error::new_spanned(ty, "unsupported field type"));
    };
    let kind = match segment.ident.to_string().as_str() {
        "bool" => FieldKind::Bool,
        "i8" | "i16" | "i32" | "i64" => FieldKind::Int { unsigned: false },
        "u8" | "u16" | "u32" => FieldKind::Int { unsigned: true },
        "u64" | "usize" | "isize" | "i128" | "u128" => {
            return Err(syn::Error::new_spanned(ty, "use i64 or a narrower integer"));
        }
        "f64" => FieldKind::Float,
        "f32" => return Err(syn::Error::new_spanned(ty, "f32 has no column mapping; use f64")),
        "String" => FieldKind::String,
        "Value" => FieldKind::Mixed,
        "Handle" => match type_argument(ty, "Handle") {
            Some(target) => FieldKind::Reference(target.clone()),
            None => return Err(syn::Error::new_spanned(ty, "expected Handle<Entity>")),
        },
        "Vec" => {
            return Err(syn::Error::new_spanned(
                ty,
                "arrays cannot be stored; use serde_json::Value",
            ));
        }
        "Option" => return Err(syn::Error::new_spanned(ty, "nested Option is not supported")),
        _ => FieldKind::Custom(ty.clone()),
    };
    Ok(kind)
}

fn declaration(property: &PropertyInfo) -> TokenStream2 {
    let name = &property.name;
    let ty = match &property.kind {
        FieldKind::Bool => quote!(::storable_orm::PropertyType::Bool),
        FieldKind::Int { .. } => quote!(::storable_orm::PropertyType::Int),
        FieldKind::Float => quote!(::storable_orm::PropertyType::Float),
        FieldKind::String => quote!(::storable_orm::PropertyType::String),
        FieldKind::Mixed => quote!(::storable_orm::PropertyType::Mixed),
        FieldKind::Reference(target) => quote! {
            ::storable_orm::PropertyType::Reference(
                <#target as ::storable_orm::EntityType>::NAME.to_string(),
            )
        },
        FieldKind::Custom(custom) => quote! {
            ::storable_orm::PropertyType::Custom(
                ::storable_orm::storable_core::CustomType::of::<#custom>(),
            )
        },
    };

    let attrs = &property.attrs;
    let mut modifiers = Vec::new();
    if !property.nullable {
        modifiers.push(quote!(.not_null()));
    }
    let unsigned = matches!(property.kind, FieldKind::Int { unsigned: true });
    if attrs.unsigned || unsigned {
        modifiers.push(quote!(.unsigned()));
    }
    if let Some(length) = attrs.length {
        modifiers.push(quote!(.length(#length)));
    }
    if let Some(decimals) = attrs.decimals {
        modifiers.push(quote!(.decimals(#decimals)));
    }
    if let Some(comment) = &attrs.comment {
        modifiers.push(quote!(.comment(#comment)));
    }
    if attrs.lazy {
        modifiers.push(quote!(.lazy()));
    }
    if let Some(prefetch) = attrs.prefetch {
        modifiers.push(quote!(.prefetch(#prefetch)));
    }
    if let Some(limit) = attrs.prefetch_limit {
        modifiers.push(quote!(.prefetch_limit(#limit)));
    }
    if let Some(kind) = attrs.index {
        let kind = kind.tokens();
        modifiers.push(quote!(.indexed(#kind)));
    }

    quote! {
        ::storable_orm::PropertyDeclaration::new(#name, #ty) #(#modifiers)*
    }
}
