//! `#[tokio_timeout_test]` / `#[tokio_timeout_test(10)]`
//!
//! Turns an `async fn` into a `#[test]` that runs on its own current-thread
//! runtime in a helper thread. The test fails if it has not finished within
//! the given number of seconds (30 when omitted), even if the body is stuck
//! in blocking code.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let secs = match timeout_secs(attr) {
        Ok(secs) => secs,
        Err(err) => return err.to_compile_error().into(),
    };
    let mut function = parse_macro_input!(item as ItemFn);

    if function.sig.asyncness.take().is_none() {
        return syn::Error::new_spanned(
            &function.sig.fn_token,
            "tokio_timeout_test expects an async fn",
        )
        .to_compile_error()
        .into();
    }
    function.attrs.retain(|attr| !is_test_marker(attr));

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = function;
    let name = sig.ident.to_string();

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = ::std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = ::std::sync::mpsc::channel();
            ::std::thread::spawn(move || {
                let outcome = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                    ::tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build test runtime")
                        .block_on(async move #block)
                }));
                let _ = done_tx.send(outcome);
            });
            match done_rx.recv_timeout(limit) {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => ::std::panic::resume_unwind(panic),
                Err(::std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("{} did not finish within {:?}", #name, limit)
                }
                Err(::std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("{} runner thread exited without a result", #name)
                }
            }
        }
    })
}

fn timeout_secs(attr: TokenStream) -> syn::Result<u64> {
    if attr.is_empty() {
        return Ok(DEFAULT_TIMEOUT_SECS);
    }
    let lit: LitInt = syn::parse(attr)?;
    let secs = lit.base10_parse::<u64>()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(
            lit,
            "timeout must be at least one second",
        ));
    }
    Ok(secs)
}

/// `#[test]` and `#[tokio::test]` would double-register the function.
fn is_test_marker(attr: &Attribute) -> bool {
    let path = attr.path();
    if path.is_ident("test") {
        return true;
    }
    let segments: Vec<_> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    segments == ["tokio", "test"]
}
