//! Live views of swap state.

mod watch;

pub use watch::{SwapStream, watch};
