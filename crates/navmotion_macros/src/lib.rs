use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Times a function body when the `perf_stats` feature is enabled.
///
/// The body is wrapped in a guard that logs through `bevy::prelude::info!`
/// when it is dropped. Without `perf_stats` the guard is compiled out and the
/// function is left untouched.
///
/// A system that takes `clock: Res<TickClock>` additionally reports every
/// 100th tick, regardless of how long it took.
///
/// ```ignore
/// #[profile(2)] // report anything slower than 2ms
/// pub fn advance_agents(clock: Res<TickClock>, query: Query<&MovementComponent>) {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_clock_param = sig.inputs.iter().any(|arg| match arg {
        FnArg::Typed(pat_type) => match &*pat_type.pat {
            Pat::Ident(pat_ident) if pat_ident.ident == "clock" => {
                let ty = &pat_type.ty;
                quote!(#ty).to_string().contains("TickClock")
            }
            _ => false,
        },
        FnArg::Receiver(_) => false,
    });

    let tick_expr = if has_clock_param {
        quote! { Some(clock.tick) }
    } else {
        quote! { None }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_guard = {
                struct ProfileGuard {
                    name: &'static str,
                    start: std::time::Instant,
                    tick: Option<u64>,
                }
                impl Drop for ProfileGuard {
                    fn drop(&mut self) {
                        let elapsed = self.start.elapsed();
                        let periodic = self.tick.map_or(false, |tick| tick % 100 == 0);
                        if elapsed.as_millis() > #threshold_ms || periodic {
                            bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                        }
                    }
                }
                ProfileGuard {
                    name: #fn_name_str,
                    start: std::time::Instant::now(),
                    tick: #tick_expr,
                }
            };

            #block
        }
    };

    output.into()
}
