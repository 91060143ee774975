//! CLI command implementations

pub mod clone;
pub mod status;

pub use clone::CloneArgs;
pub use status::StatusArgs;
