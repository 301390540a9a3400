//! Bank reconciliation: matching sessions and the reconciliation workflow

pub mod matching;
pub mod session;
pub mod workflow;

pub use matching::*;
pub use session::*;
pub use workflow::*;
