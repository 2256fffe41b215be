//! Reconciled swap state.

mod reconciler;
#[cfg(feature = "display")]
mod view;

pub use reconciler::SwapReconciler;
#[cfg(feature = "display")]
pub use view::SwapsView;
