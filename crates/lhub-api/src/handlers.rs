//! Request handlers.

pub mod health;
pub mod signs;

pub use health::*;
pub use signs::*;
