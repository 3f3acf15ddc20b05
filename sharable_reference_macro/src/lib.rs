extern crate proc_macro2;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, Pat, Receiver};

/// This macro is used on top of an impl block for "_MyStruct" and creates a new impl block for
/// "MyStruct". The new impl block has a method with the same signature for every pub instance
/// method of the inner impl, while leaving out associated functions. The generated methods always
/// take `&self`, since the wrapper reaches the inner value through a lock.
///
/// The macro assumes "MyStruct" has a field called "inner" of type `SharableRef<_MyStruct>`
/// (`Arc<Mutex<_MyStruct>>`), and that `crate::utils::auxiliary::SharableRefExt` is implemented
/// for it. Every forwarded call holds the lock for the duration of the inner call only, so calls
/// coming from different threads are serialized per instance.
///
/// CLARIFICATION: The inner struct does not have to begin with '_', the macro simply removes the
/// first character from the inner struct to give to the wrapper struct.
///
/// # Examples
///
/// ```ignore
/// #[sharable_reference_wrapper]
/// impl _Gate {
///     fn new(pin: u8) -> Self {
///         _Gate { pin, high: false }
///     }
///
///     pub fn set(&mut self, high: bool) {
///         self.high = high;
///     }
/// }
///
/// // Will generate
/// impl Gate {
///     pub fn set(&self, high: bool) {
///         crate::utils::auxiliary::SharableRefExt::lock_shared(&self.inner).set(high)
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn sharable_reference_wrapper(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemImpl);

    let wrapper_name = match get_wrapper_name(&input) {
        Ok(name) => name,
        Err(err) => return err.to_compile_error().into(),
    };
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let new_methods = get_pub_instance_methods(&input);

    TokenStream::from(quote! {
        #input

        impl #impl_generics #wrapper_name #ty_generics #where_clause {
            #(#new_methods)*
        }
    })
}

/// Returns the forwarding method of every public instance method (those that receive self) of an
/// impl block.
fn get_pub_instance_methods(input: &ItemImpl) -> Vec<TokenStream2> {
    input
        .items
        .iter()
        .filter_map(|item| match item {
            ImplItem::Fn(method) => forward_method(method),
            _ => None,
        })
        .collect()
}

/// Builds the wrapper method for `method`, or None if it is private or has no receiver.
fn forward_method(method: &ImplItemFn) -> Option<TokenStream2> {
    let syn::Visibility::Public(pub_token) = &method.vis else {
        return None;
    };
    if method.sig.receiver().is_none() {
        return None;
    }

    let attrs = &method.attrs;
    let method_name = &method.sig.ident;
    let args: Vec<TokenStream2> = method
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => Some(arg_name(&pat_type.pat)),
            FnArg::Receiver(_) => None,
        })
        .collect();

    let mut sig = method.sig.clone();
    for arg in sig.inputs.iter_mut() {
        if let FnArg::Receiver(receiver) = arg {
            *receiver = shared_receiver(receiver);
        }
    }

    Some(quote! {
        #(#attrs)*
        #pub_token #sig {
            crate::utils::auxiliary::SharableRefExt::lock_shared(&self.inner).#method_name(#(#args),*)
        }
    })
}

/// Turns `&mut self` into `&self`, keeping the lifetime if any was written.
fn shared_receiver(receiver: &Receiver) -> Receiver {
    let lifetime = receiver.reference.as_ref().and_then(|(_, lt)| lt.clone());
    let receiver_tokens = match lifetime {
        Some(lt) => quote! { &#lt self },
        None => quote! { &self },
    };
    syn::parse2(receiver_tokens).unwrap_or_else(|_| receiver.clone())
}

fn arg_name(pat: &Pat) -> TokenStream2 {
    match pat {
        Pat::Ident(ident) => ident.ident.to_token_stream(),
        other => other.to_token_stream(),
    }
}

/// Returns the name of the impl minus the first character.
fn get_wrapper_name(input: &ItemImpl) -> syn::Result<Ident> {
    match input.self_ty.as_ref() {
        syn::Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => {
                let new_name = segment.ident.to_string().split_off(1);
                Ok(Ident::new(&new_name, segment.ident.span()))
            }
            None => Err(syn::Error::new_spanned(
                &input.self_ty,
                "Expected a type path with at least one segment",
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.self_ty,
            "Expected a path type for the impl",
        )),
    }
}
