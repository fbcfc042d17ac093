//! jnat-macros: exported entry points for native methods
//!
//! `jnat!(pkg::Class, method, (T0, T1) -> R)` generates
//!
//! ```ignore
//! #[no_mangle]
//! #[allow(non_snake_case)]
//! pub extern "system" fn Java_pkg_Class_method(arg0: T0, arg1: T1) -> R {
//!     ::jnat::entry::export(move |env| method(env, arg0, arg1))
//! }
//! ```
//!
//! `method` receives the calling thread's `EnvironmentHandle` followed by
//! every declared argument (raw environment and class pointers included,
//! when they are declared) and returns `BridgeResult<R>`. Errors and panics
//! become a pending `java.lang.RuntimeException` and the export returns
//! `R`'s zero value.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Ident, Path, Token, Type};

/// Export a native method under its JNI symbol name
///
/// # Example
///
/// ```ignore
/// use jnat::{jnat, BridgeResult, EnvironmentHandle};
///
/// fn add(_env: &EnvironmentHandle, a: i32, b: i32) -> BridgeResult<i32> {
///     Ok(a + b)
/// }
///
/// jnat!(com::example::Calc, add, (i32, i32) -> i32);
/// ```
#[proc_macro]
pub fn jnat(input: TokenStream) -> TokenStream {
    let export = parse_macro_input!(input as NativeExport);
    expand(&export).into()
}

struct NativeExport {
    class: Path,
    method: Ident,
    params: Vec<Type>,
    ret: Type,
}

impl Parse for NativeExport {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let class: Path = input.parse()?;
        input.parse::<Token![,]>()?;
        let method: Ident = input.parse()?;
        input.parse::<Token![,]>()?;

        let content;
        syn::parenthesized!(content in input);
        let params = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
        input.parse::<Token![->]>()?;
        let ret: Type = input.parse()?;
        // Allow a trailing comma after the return type
        let _ = input.parse::<Option<Token![,]>>()?;

        if class.segments.iter().any(|s| !s.arguments.is_none()) {
            return Err(syn::Error::new_spanned(&class, "class path cannot carry generic arguments"));
        }

        Ok(Self {
            class,
            method,
            params: params.into_iter().collect(),
            ret,
        })
    }
}

fn expand(export: &NativeExport) -> proc_macro2::TokenStream {
    let segments: Vec<String> = export
        .class
        .segments
        .iter()
        .map(|s| s.ident.unraw().to_string())
        .collect();
    let symbol = Ident::new(&symbol_name(&segments, &export.method.unraw().to_string()), Span::call_site());

    let method = &export.method;
    let ret = &export.ret;
    let names: Vec<Ident> = (0..export.params.len())
        .map(|i| Ident::new(&format!("arg{}", i), Span::call_site()))
        .collect();
    let params = names.iter().zip(&export.params).map(|(name, ty)| quote! { #name: #ty });

    quote! {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "system" fn #symbol(#(#params),*) -> #ret {
            ::jnat::entry::export(move |env| #method(env, #(#names),*))
        }
    }
}

/// `Java_` symbol for a method of the class named by `segments`
fn symbol_name(segments: &[String], method: &str) -> String {
    let mut symbol = String::from("Java");
    for part in segments.iter().map(String::as_str).chain([method]) {
        symbol.push('_');
        mangle_into(&mut symbol, part);
    }
    symbol
}

/// JNI escaping of one name component
fn mangle_into(out: &mut String, part: &str) {
    for c in part.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(c),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("_0{:04x}", unit));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_symbol() {
        assert_eq!(
            symbol_name(&names(&["com", "example", "HelloWorld"]), "hello"),
            "Java_com_example_HelloWorld_hello"
        );
    }

    #[test]
    fn test_escaped_symbol() {
        assert_eq!(symbol_name(&names(&["my_pkg", "Calc"]), "add_one"), "Java_my_1pkg_Calc_add_1one");
        assert_eq!(symbol_name(&names(&["demo", "Größe"]), "f"), "Java_demo_Gr_000f6_000dfe_f");
    }

    #[test]
    fn test_parse_and_expand() {
        let export: NativeExport = syn::parse_str("demo::Native, add, (i32, i32) -> i32").unwrap();
        assert_eq!(export.params.len(), 2);

        let code = expand(&export).to_string();
        assert!(code.contains("Java_demo_Native_add"));
        assert!(code.contains("extern \"system\""));
        assert!(code.contains(":: jnat :: entry :: export"));
    }

    #[test]
    fn test_unit_return_and_no_params() {
        let export: NativeExport = syn::parse_str("r#type::Hooks, r#ref, () -> ()").unwrap();
        assert!(export.params.is_empty());
        assert!(expand(&export).to_string().contains("Java_type_Hooks_ref"));
    }

    #[test]
    fn test_generic_class_path_rejected() {
        assert!(syn::parse_str::<NativeExport>("demo::List<T>, size, () -> i32").is_err());
    }
}
