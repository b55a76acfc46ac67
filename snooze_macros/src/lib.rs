extern crate proc_macro;
use proc_macro::TokenStream;

mod snooze_interface;

use snooze_interface::RootImpl;

/// Generates a `From` impl for every variant annotated with `#[snooze]`.
///
/// Annotated variants must have exactly one field. Unannotated variants are left alone.
///
/// ```ignore
/// #[derive(SnoozeInterface)]
/// enum CoordinatorMsg {
///   #[snooze]
///   Remote(SnoozeMsg),
///   #[snooze]
///   Cmd(CoordinatorCmd),
///   ReportTick,
/// }
/// ```
#[proc_macro_derive(SnoozeInterface, attributes(snooze))]
pub fn snooze_interface(item: TokenStream) -> TokenStream {
  match syn::parse(item) {
    Ok(ast) => RootImpl::derive(ast)
      .map(|x| x.expand())
      .unwrap_or_else(|x| x.to_compile_error().into()),
    Err(e) => e.to_compile_error().into(),
  }
}
