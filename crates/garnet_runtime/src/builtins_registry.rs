use std::sync::Arc;

use crate::builtins;
use crate::core::{Symbol, Value};
use crate::model::{ClassRef, CoreClasses, ObjectModel};
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::Eval;
use crate::runtime::registry::MethodRegistry;
use crate::runtime::unit::{CompiledUnit, Imp, UnitFlags};

/// Native method: runtime, receiver, positional arguments, passed block.
pub type BuiltinFn = fn(&mut Runtime, &Value, &[Value], Option<&Arc<Block>>) -> Eval;

/// Picks the class a native is installed on.
pub type ClassPick = fn(&CoreClasses) -> &ClassRef;

#[derive(Clone, Copy)]
enum Target {
    Instance(ClassPick),
    Singleton(ClassPick),
}

struct Entry {
    target: Target,
    name: &'static str,
    arity: Arity,
    flags: UnitFlags,
    fun: BuiltinFn,
}

pub struct BuiltinRegistry {
    entries: Vec<Entry>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, class: ClassPick, name: &'static str, arity: Arity, fun: BuiltinFn) {
        self.push(Target::Instance(class), name, arity, UnitFlags::empty(), fun);
    }

    pub fn register_private(
        &mut self,
        class: ClassPick,
        name: &'static str,
        arity: Arity,
        fun: BuiltinFn,
    ) {
        self.push(Target::Instance(class), name, arity, UnitFlags::PRIVATE, fun);
    }

    /// Class-level method, installed on the singleton class.
    pub fn register_singleton(
        &mut self,
        class: ClassPick,
        name: &'static str,
        arity: Arity,
        fun: BuiltinFn,
    ) {
        self.push(Target::Singleton(class), name, arity, UnitFlags::empty(), fun);
    }

    fn push(&mut self, target: Target, name: &'static str, arity: Arity, flags: UnitFlags, fun: BuiltinFn) {
        self.entries.push(Entry {
            target,
            name,
            arity,
            flags: flags | UnitFlags::NATIVE_GLUE,
            fun,
        });
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn install_into(self, model: &dyn ObjectModel, registry: &MethodRegistry) {
        let core = model.core();
        for e in self.entries {
            let class = match e.target {
                Target::Instance(pick) => pick(core).clone(),
                Target::Singleton(pick) => {
                    match model.singleton_class_of(&Value::Class(pick(core).clone())) {
                        Some(meta) => meta,
                        None => panic!("core class {} has no singleton class", pick(core).name()),
                    }
                }
            };
            let unit = CompiledUnit {
                imp: Imp::Native(e.fun),
                arity: e.arity,
                flags: e.flags,
                owner: class.clone(),
                selector: Symbol::intern(e.name),
            };
            registry.define_unit(&class, unit);
        }
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub trait BuiltinProvider {
    fn install(&self, registry: &mut BuiltinRegistry);
}

/// The core library every runtime starts with.
pub struct StdBuiltinProvider;

impl BuiltinProvider for StdBuiltinProvider {
    fn install(&self, registry: &mut BuiltinRegistry) {
        builtins::core::install(registry);
        builtins::math::install(registry);
        builtins::collection::install(registry);
        builtins::conversion::install(registry);
        builtins::system::install(registry);
    }
}
