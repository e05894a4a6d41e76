use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Index, parse_macro_input};

/// Derive the `Component` trait, generating DOM serialization.
///
/// Each field is written through `SerializeField` and read back through
/// `DeserializeField`, so `EntityId`, `Vec<EntityId>` and `Option<EntityId>`
/// fields become entity references and every other field must implement
/// serde's `Serialize` / `DeserializeOwned`. The struct must also be `Clone`.
///
/// # Named structs
///
/// ```ignore
/// #[derive(Clone, Component)]
/// struct Follow {
///     target: EntityId,
///     distance: f32,
/// }
/// ```
///
/// # Tuple structs
///
/// Fields are keyed `"0"`, `"1"`, ...
///
/// ```ignore
/// #[derive(Clone, Component)]
/// struct Health(pub f32);
/// ```
///
/// # Opting out
///
/// `#[skip_serialization]` keeps the trait's default bodies, which report
/// the component as not serializable. Such components can live on entities
/// but cannot be stored in a template.
#[proc_macro_derive(Component, attributes(skip_serialization))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let skip = input
        .attrs
        .iter()
        .any(|attr| attr.path().is_ident("skip_serialization"));

    let Data::Struct(data) = &input.data else {
        return syn::Error::new_spanned(&input.ident, "Component can only be derived for structs")
            .to_compile_error()
            .into();
    };

    // (accessor, key, type) per field
    let fields: Vec<_> = match &data.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|f| {
                let ident = f.ident.as_ref()?;
                Some((quote! { #ident }, ident.to_string(), &f.ty))
            })
            .collect(),
        Fields::Unnamed(fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let idx = Index::from(i);
                (quote! { #idx }, i.to_string(), &f.ty)
            })
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let collect_calls = fields.iter().map(|(access, _, _)| {
        quote! {
            redlilium_ecs::serialize::field::EntityRefs(&self.#access).collect_entities(collector);
        }
    });

    let serialization = if skip {
        quote! {}
    } else {
        let write_calls = fields.iter().map(|(access, key, _)| {
            quote! {
                redlilium_ecs::serialize::SerializeField(&self.#access).serialize_field(#key, ctx)?;
            }
        });
        let reads = fields.iter().map(|(_, key, ty)| {
            quote! {
                <redlilium_ecs::serialize::DeserializeField<#ty>>::deserialize_field(#key, ctx)?
            }
        });
        let construct = match &data.fields {
            Fields::Named(_) => {
                let idents = fields.iter().map(|(access, _, _)| access);
                quote! { Self { #(#idents: #reads),* } }
            }
            Fields::Unnamed(_) => quote! { Self(#(#reads),*) },
            Fields::Unit => quote! { Self },
        };
        quote! {
            fn serialize_component(
                &self,
                ctx: &mut redlilium_ecs::serialize::SerializeContext<'_>,
            ) -> ::core::result::Result<redlilium_ecs::dom::Dom, redlilium_ecs::serialize::SerializeError> {
                #[allow(unused_imports)]
                use redlilium_ecs::serialize::SerializeFieldFallback as _;
                ctx.begin_struct(#name_str)?;
                #(#write_calls)*
                ctx.end_struct()
            }

            fn deserialize_component(
                ctx: &mut redlilium_ecs::serialize::DeserializeContext<'_>,
            ) -> ::core::result::Result<Self, redlilium_ecs::serialize::DeserializeError> {
                #[allow(unused_imports)]
                use redlilium_ecs::serialize::DeserializeFieldFallback as _;
                ctx.begin_struct(#name_str)?;
                let value = #construct;
                ctx.end_struct()?;
                ::core::result::Result::Ok(value)
            }
        }
    };

    let expanded = quote! {
        impl #impl_generics redlilium_ecs::Component for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;

            #serialization

            fn collect_entities(&self, collector: &mut ::std::vec::Vec<redlilium_ecs::EntityId>) {
                #[allow(unused_imports)]
                use redlilium_ecs::serialize::field::EntityRefsFallback as _;
                let _ = &collector;
                #(#collect_calls)*
            }
        }
    };

    expanded.into()
}
