//! Command implementations for echo-cli

pub mod say;
pub mod stream;

pub use say::say;
pub use stream::stream;
