//! Procedural macros for the `qdsl` typed query library.
//!
//! This crate provides two derive macros:
//! - `#[derive(Entity)]`: inspects a struct and generates its `EntitySchema`, the
//!   row reader and insert values, and a `Q<Name>` path type whose fields are typed
//!   expressions usable in queries.
//! - `#[derive(Projection)]`: generates the DTO mapping traits used by
//!   `Projections::fields`, `Projections::constructor` and, with
//!   `#[projection(setters)]`, `Projections::bean`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, Data, DeriveInput, Fields, FieldsNamed, Ident, LitStr, Type};

use inflections::Inflect;

// --- Helper Structs & Functions for Parsing ---

fn last_segment_named<'a>(ty: &'a Type, name: &str) -> Option<&'a syn::PathSegment> {
    if let Type::Path(type_path) = ty {
        if type_path.qself.is_none() {
            if let Some(segment) = type_path.path.segments.last() {
                if segment.ident == name {
                    return Some(segment);
                }
            }
        }
    }
    None
}

/// Helper to get the single generic argument of `Name<T>`.
fn generic_inner<'a>(ty: &'a Type, name: &str) -> Option<&'a Type> {
    let segment = last_segment_named(ty, name)?;
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner_ty)) = args.args.first() {
            return Some(inner_ty);
        }
    }
    None
}

/// Basic validation of table, alias and column names to avoid generating invalid SQL identifiers.
fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for ch in chars {
        if !(ch == '_' || ch.is_ascii_alphanumeric()) {
            return false;
        }
    }
    true
}

fn named_fields<'a>(input: &'a DeriveInput, derive: &str) -> &'a FieldsNamed {
    match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => named,
            _ => panic!("#[derive({})] only supports structs with named fields.", derive),
        },
        _ => panic!("#[derive({})] can only be used on structs.", derive),
    }
}

/// Holds parsed metadata about a single entity field.
#[derive(Clone)]
struct FieldMetadata {
    ident: Ident,
    ty: Type,
    column_name: String,
    is_id: bool,
    is_skipped: bool,
    /// Target type when the field is `Related<T>`.
    relation: Option<Type>,
}

/// Parses all named fields from a `DeriveInput` struct.
fn parse_field_metadata(input: &DeriveInput) -> Vec<FieldMetadata> {
    named_fields(input, "Entity")
        .named
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .as_ref()
                .expect("named fields always carry an ident")
                .clone();
            let ty = field.ty.clone();
            let mut column_name = ident.to_string();
            let mut is_id = false;
            let mut is_skipped = false;

            for attr in &field.attrs {
                if attr.path().is_ident("column") {
                    // Propagate parse errors to cause a compile error for invalid meta, e.g., #[column(name)]
                    attr.parse_nested_meta(|meta| {
                        if meta.path.is_ident("name") {
                            let s: LitStr = meta.value()?.parse()?;
                            column_name = s.value();
                        } else if meta.path.is_ident("id") {
                            is_id = true;
                        } else if meta.path.is_ident("skip") {
                            is_skipped = true;
                        } else {
                            return Err(meta.error("expected `id`, `skip` or `name = \"...\"`"));
                        }
                        Ok(())
                    })
                    .expect("Invalid #[column(...)] attribute syntax");
                }
            }
            let relation = generic_inner(&ty, "Related").cloned();
            FieldMetadata {
                ident,
                ty,
                column_name,
                is_id,
                is_skipped,
                relation,
            }
        })
        .collect()
}

/// `#[entity(table = "...", alias = "...")]`
fn parse_entity_attrs(input: &DeriveInput) -> (Option<String>, Option<String>) {
    let mut table = None;
    let mut alias = None;
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                let s: LitStr = meta.value()?.parse()?;
                if meta.path.is_ident("table") {
                    table = Some(s.value());
                } else if meta.path.is_ident("alias") {
                    alias = Some(s.value());
                } else {
                    return Err(meta.error("expected `table = \"...\"` or `alias = \"...\"`"));
                }
                Ok(())
            })
            .expect("Invalid #[entity(...)] attribute syntax");
        }
    }
    (table, alias)
}

// --- `Entity` derive macro ---

#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let struct_name = &input.ident;
    let vis = &input.vis;
    let entity_name = struct_name.to_string();
    let fields_metadata = parse_field_metadata(&input);
    let (table_override, alias_override) = parse_entity_attrs(&input);

    // If no override, deduce the table from the struct name (`Member` -> `members`)
    // and the default alias from its snake case (`Member` -> `member`).
    let table_name = table_override.unwrap_or_else(|| format!("{}s", entity_name.to_snake_case()));
    let default_alias = alias_override.unwrap_or_else(|| entity_name.to_snake_case());

    if !is_valid_ident(&table_name) {
        panic!("Invalid table name `{}`. Use ASCII letters, digits, or `_`, starting with a letter or `_`.", table_name);
    }
    if !is_valid_ident(&default_alias) {
        panic!("Invalid alias `{}`. Use ASCII letters, digits, or `_`, starting with a letter or `_`.", default_alias);
    }
    for f in &fields_metadata {
        if !f.is_skipped && !is_valid_ident(&f.column_name) {
            panic!("Invalid column name `{}`. Use ASCII letters, digits, or `_`, starting with a letter or `_`.", f.column_name);
        }
    }

    // Validate exactly one #[column(id)]
    let id_count = fields_metadata.iter().filter(|f| f.is_id).count();
    if id_count == 0 {
        panic!("A field must be marked with #[column(id)]. Hint: mark your generated key field like `#[column(id)] id: Option<i64>`.");
    } else if id_count > 1 {
        panic!("Exactly one field must be marked with #[column(id)] (found {}). Remove extra #[column(id)] attributes.", id_count);
    }
    let id_field = fields_metadata
        .iter()
        .find(|f| f.is_id)
        .expect("unreachable: validated id_count == 1");
    if id_field.is_skipped || id_field.relation.is_some() {
        panic!("The #[column(id)] field cannot be skipped or a relation.");
    }
    let id_ident = &id_field.ident;
    let id_ty_str = id_field.ty.to_token_stream().to_string().replace(' ', "");
    let (id_accessor, id_setter) = match id_ty_str.as_str() {
        "Option<i64>" => (quote! { self.#id_ident }, quote! { self.#id_ident = Some(id); }),
        "i64" => (quote! { Some(self.#id_ident) }, quote! { self.#id_ident = id; }),
        other => panic!("Unsupported id type `{}`. Hint: generated keys must be `i64` or `Option<i64>`.", other),
    };

    let mapped: Vec<&FieldMetadata> = fields_metadata.iter().filter(|f| !f.is_skipped).collect();

    // --- SCHEMA ---
    let column_defs: Vec<_> = mapped
        .iter()
        .map(|f| {
            let field = f.ident.to_string();
            let column = &f.column_name;
            let is_id = f.is_id;
            match &f.relation {
                Some(target) => {
                    let target_name = target
                        .to_token_stream()
                        .to_string()
                        .rsplit("::")
                        .next()
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    quote! {
                        ::qdsl_core::ColumnDef {
                            field: #field,
                            column: #column,
                            kind: ::qdsl_core::ValueKind::Integer,
                            nullable: true,
                            id: #is_id,
                            relation: Some(#target_name),
                        }
                    }
                }
                None => {
                    let ty = &f.ty;
                    quote! {
                        ::qdsl_core::ColumnDef {
                            field: #field,
                            column: #column,
                            kind: <#ty as ::qdsl_core::SqlType>::KIND,
                            nullable: <#ty as ::qdsl_core::SqlType>::NULLABLE,
                            id: #is_id,
                            relation: None,
                        }
                    }
                }
            }
        })
        .collect();

    // --- read_row: a struct literal in declaration order so cells are consumed in SCHEMA order ---
    let read_fields: Vec<_> = fields_metadata
        .iter()
        .map(|f| {
            let ident = &f.ident;
            if f.is_skipped {
                return quote! { #ident: ::core::default::Default::default() };
            }
            match &f.relation {
                Some(_) => quote! {
                    #ident: ::qdsl_core::Related::from_key(cells.take::<Option<i64>>()?)
                },
                None => {
                    let ty = &f.ty;
                    quote! { #ident: cells.take::<#ty>()? }
                }
            }
        })
        .collect();

    // --- insert_values ---
    let insert_values: Vec<_> = mapped
        .iter()
        .filter(|f| !f.is_id)
        .map(|f| {
            let ident = &f.ident;
            let field = ident.to_string();
            match &f.relation {
                Some(_) => quote! { self.#ident.key_value(#field)? },
                None => quote! { ::core::convert::Into::<::qdsl_core::Value>::into(self.#ident.clone()) },
            }
        })
        .collect();

    // --- load_relation ---
    let relation_arms: Vec<_> = mapped
        .iter()
        .filter(|f| f.relation.is_some())
        .map(|f| {
            let ident = &f.ident;
            let field = ident.to_string();
            quote! {
                #field => {
                    self.#ident = ::qdsl_core::Related::read_loaded(cells)?;
                    Ok(())
                }
            }
        })
        .collect();

    // --- Q<Name> path type ---
    let path_name = Ident::new(&format!("Q{}", struct_name), struct_name.span());
    let path_fields: Vec<_> = mapped
        .iter()
        .map(|f| {
            let ident = &f.ident;
            match &f.relation {
                Some(target) => quote! { #vis #ident: ::qdsl_core::RelationPath<#target> },
                None => {
                    let ty = &f.ty;
                    quote! { #vis #ident: ::qdsl_core::Expression<#ty> }
                }
            }
        })
        .collect();
    let path_inits: Vec<_> = mapped
        .iter()
        .map(|f| {
            let ident = &f.ident;
            let field = ident.to_string();
            let column = &f.column_name;
            match &f.relation {
                Some(_) => quote! { #ident: ::qdsl_core::RelationPath::new(&alias, #field, #column) },
                None => quote! { #ident: ::qdsl_core::Expression::column(&alias, #field, #column) },
            }
        })
        .collect();
    let path_doc = format!(
        "Query path for [`{}`]; `{}::default()` uses the alias `{}`.",
        entity_name, path_name, default_alias
    );

    let expanded = quote! {
        impl ::qdsl_core::Entity for #struct_name {
            type Path = #path_name;

            const SCHEMA: &'static ::qdsl_core::EntitySchema = &::qdsl_core::EntitySchema {
                entity: #entity_name,
                table: #table_name,
                default_alias: #default_alias,
                columns: &[#(#column_defs),*],
            };

            fn read_row(cells: &mut ::qdsl_core::Cells) -> ::qdsl_core::QueryResult<Self> {
                Ok(Self { #(#read_fields),* })
            }

            fn insert_values(&self) -> ::qdsl_core::QueryResult<Vec<::qdsl_core::Value>> {
                Ok(vec![#(#insert_values),*])
            }

            fn id(&self) -> Option<i64> {
                #id_accessor
            }

            fn set_id(&mut self, id: i64) {
                #id_setter
            }

            #[allow(unused_variables)]
            fn load_relation(
                &mut self,
                field: &str,
                cells: &mut ::qdsl_core::Cells,
            ) -> ::qdsl_core::QueryResult<()> {
                match field {
                    #(#relation_arms)*
                    other => Err(::qdsl_core::QueryError::InvalidSource(format!(
                        "{} has no relation field `{}`",
                        #entity_name, other
                    ))),
                }
            }
        }

        #[doc = #path_doc]
        #[derive(Clone, Debug)]
        #vis struct #path_name {
            #(#path_fields,)*
            __alias: ::std::sync::Arc<str>,
        }

        impl #path_name {
            pub fn new(alias: &str) -> Self {
                let alias: ::std::sync::Arc<str> = ::std::sync::Arc::from(alias);
                Self {
                    #(#path_inits,)*
                    __alias: alias,
                }
            }
        }

        impl ::core::default::Default for #path_name {
            fn default() -> Self {
                Self::new(#default_alias)
            }
        }

        impl ::qdsl_core::EntityPath for #path_name {
            type Entity = #struct_name;

            fn aliased(alias: &str) -> Self {
                Self::new(alias)
            }

            fn alias(&self) -> &::std::sync::Arc<str> {
                &self.__alias
            }
        }

        impl ::qdsl_core::Projection for #path_name {
            type Output = #struct_name;

            fn items(&self, fetch: &[::qdsl_core::FetchJoin]) -> Vec<::qdsl_core::Expr> {
                ::qdsl_core::entity_items::<#struct_name>(&self.__alias, fetch)
            }

            fn read(
                &self,
                cells: &mut ::qdsl_core::Cells,
                fetch: &[::qdsl_core::FetchJoin],
            ) -> ::qdsl_core::QueryResult<#struct_name> {
                ::qdsl_core::entity_read::<#struct_name>(&self.__alias, cells, fetch)
            }

            fn entity_aliases(&self) -> Vec<::std::sync::Arc<str>> {
                vec![self.__alias.clone()]
            }
        }
    };

    TokenStream::from(expanded)
}

// --- `Projection` derive macro ---

#[proc_macro_derive(Projection, attributes(projection))]
pub fn derive_projection(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let struct_name = &input.ident;
    let name = struct_name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut setters = false;
    for attr in &input.attrs {
        if attr.path().is_ident("projection") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("setters") {
                    setters = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `setters`"))
                }
            })
            .expect("Invalid #[projection(...)] attribute syntax");
        }
    }

    let fields: Vec<(&Ident, &Type)> = named_fields(&input, "Projection")
        .named
        .iter()
        .filter_map(|f| f.ident.as_ref().map(|i| (i, &f.ty)))
        .collect();
    let field_names: Vec<String> = fields.iter().map(|(i, _)| i.to_string()).collect();
    let arity = fields.len();

    let assign_arms: Vec<_> = fields
        .iter()
        .zip(&field_names)
        .map(|((ident, _), field)| {
            quote! { #field => self.#ident = ::qdsl_core::FromValue::from_value(value)?, }
        })
        .collect();
    let ctor_fields: Vec<_> = fields
        .iter()
        .map(|(ident, ty)| quote! { #ident: cells.take::<#ty>()? })
        .collect();

    let unmapped = quote! {
        other => {
            return Err(::qdsl_core::QueryError::UnmappedField {
                target: #name,
                field: other.to_string(),
            })
        }
    };

    let bean_impl = if setters {
        let set_arms: Vec<_> = fields
            .iter()
            .zip(&field_names)
            .map(|((ident, _), field)| {
                let setter = Ident::new(&format!("set_{}", ident), Span::call_site());
                quote! { #field => self.#setter(::qdsl_core::FromValue::from_value(value)?), }
            })
            .collect();
        quote! {
            impl #impl_generics ::qdsl_core::BeanTarget for #struct_name #ty_generics #where_clause {
                fn set_property(
                    &mut self,
                    property: &str,
                    value: ::qdsl_core::Value,
                ) -> ::qdsl_core::QueryResult<()> {
                    match property {
                        #(#set_arms)*
                        #unmapped
                    }
                    Ok(())
                }
            }
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl #impl_generics ::qdsl_core::FieldTarget for #struct_name #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const FIELDS: &'static [&'static str] = &[#(#field_names),*];

            fn assign_field(
                &mut self,
                field: &str,
                value: ::qdsl_core::Value,
            ) -> ::qdsl_core::QueryResult<()> {
                match field {
                    #(#assign_arms)*
                    #unmapped
                }
                Ok(())
            }
        }

        impl #impl_generics ::qdsl_core::ConstructorTarget for #struct_name #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const ARITY: usize = #arity;

            fn construct(cells: &mut ::qdsl_core::Cells) -> ::qdsl_core::QueryResult<Self> {
                Ok(Self { #(#ctor_fields),* })
            }
        }

        #bean_impl
    };

    TokenStream::from(expanded)
}
