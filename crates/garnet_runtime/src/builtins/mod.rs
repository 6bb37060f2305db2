//! Core library methods implemented in Rust, registered through `BuiltinRegistry`.

pub(crate) mod collection;
pub(crate) mod common;
pub(crate) mod conversion;
pub(crate) mod core;
pub(crate) mod math;
pub(crate) mod system;
