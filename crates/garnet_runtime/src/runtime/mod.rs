//! Runtime module - the execution engine.
//!
//! `Vm` holds everything shared between guest threads (object model, method registry,
//! globals, collaborator seams). `Runtime` is one guest thread's view of it: the shared
//! `Vm` plus that thread's `VmThreadState`.

pub mod arity;
pub mod cache;
pub mod closure;
pub mod config;
pub(crate) mod dispatch;
pub(crate) mod exception;
pub(crate) mod names;
pub mod frame;
pub mod registry;
pub mod thread;
pub mod unit;
pub(crate) mod vm;

pub(crate) mod core;

pub use self::core::Runtime;
pub use cache::{CacheKind, InlineCache};
pub use config::{BreakTag, Eval, ExecResult, Flow, RuntimeConfig};
pub use dispatch::{CallArg, CallKind, MissingReason};
pub use exception::Exc;
pub use vm::{RuntimeStats, Stat, StatsSnapshot, Vm};
