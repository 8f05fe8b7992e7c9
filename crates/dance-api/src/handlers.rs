//! Request handlers.

pub mod analysis;
pub mod health;
pub mod jobs;

pub use analysis::*;
pub use health::*;
pub use jobs::*;
