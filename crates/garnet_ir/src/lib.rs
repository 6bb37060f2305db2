//! Typed syntax tree consumed by the Garnet runtime.
//!
//! The tree is produced by an external parser; `build` offers constructor helpers for
//! embedding hosts and tests.
mod ast;
pub mod build;

pub use ast::*;
