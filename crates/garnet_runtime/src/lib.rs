//! Garnet execution core.
//!
//! Compiles `garnet_ir` method bodies into native closures on first call and runs them:
//! method dispatch with per-site inline caches, blocks and procs over shared variable
//! cells, exceptions and non-local control flow as explicit `Flow` signals, guest threads,
//! and the native core library.

#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::new_without_default)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::len_zero)]
#![allow(clippy::ptr_arg)]
#![allow(clippy::unnecessary_map_or)]

pub mod bridge;
pub mod builtins_registry;
pub mod core;
pub mod errors;
pub mod gc;
pub mod model;
pub mod runtime;

mod builtins;
mod compile;

pub use bridge::{ForeignBridge, ForeignImp, ForeignObject, Forward, NativeValue, NullBridge, TypeTag};
pub use builtins_registry::{BuiltinFn, BuiltinProvider, BuiltinRegistry, StdBuiltinProvider};
pub use self::core::{Symbol, Value};
pub use errors::ExecError;
pub use gc::{Collector, RefCountCollector};
pub use model::{ClassRef, ObjectModel, StdObjectModel};
pub use runtime::arity::Arity;
pub use runtime::unit::{MethodSource, UnitFlags};
pub use runtime::{
    CacheKind, ExecResult, InlineCache, Runtime, RuntimeConfig, Stat, StatsSnapshot, Vm,
};
