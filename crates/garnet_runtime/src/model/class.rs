//! Class and module metadata.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::core::{FastIndexMap, Symbol, Value};

pub type ClassRef = Arc<RClass>;
pub type ClassId = u64;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Core classes whose instances the operator fast paths handle inline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuiltinType {
    Integer = 0,
    Float = 1,
    String = 2,
    Symbol = 3,
    Array = 4,
    Hash = 5,
    Range = 6,
    Nil = 7,
    True = 8,
    False = 9,
    Proc = 10,
    Regexp = 11,
}

impl BuiltinType {
    pub fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

pub struct RClass {
    id: ClassId,
    name: RwLock<Option<Arc<str>>>,
    pub(crate) is_module: bool,
    pub(crate) is_singleton: bool,
    superclass: Option<ClassRef>,
    includes: RwLock<Vec<ClassRef>>,
    subclasses: RwLock<Vec<Weak<RClass>>>,
    includers: RwLock<Vec<Weak<RClass>>>,
    consts: RwLock<FastIndexMap<Symbol, Value>>,
    cvars: RwLock<FastIndexMap<Symbol, Value>>,
    ivars: RwLock<FastIndexMap<Symbol, Value>>,
    meta: RwLock<Option<ClassRef>>,
    lexical_parent: RwLock<Option<Weak<RClass>>>,
    builtin: OnceLock<BuiltinType>,
}

impl RClass {
    pub(crate) fn new(
        name: Option<&str>,
        superclass: Option<ClassRef>,
        is_module: bool,
        is_singleton: bool,
    ) -> ClassRef {
        let class = Arc::new(RClass {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: RwLock::new(name.map(Arc::from)),
            is_module,
            is_singleton,
            superclass: superclass.clone(),
            includes: RwLock::new(Vec::new()),
            subclasses: RwLock::new(Vec::new()),
            includers: RwLock::new(Vec::new()),
            consts: RwLock::new(FastIndexMap::default()),
            cvars: RwLock::new(FastIndexMap::default()),
            ivars: RwLock::new(FastIndexMap::default()),
            meta: RwLock::new(None),
            lexical_parent: RwLock::new(None),
            builtin: OnceLock::new(),
        });
        if let Some(sup) = &superclass {
            sup.subclasses.write().push(Arc::downgrade(&class));
        }
        class
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn is_module(&self) -> bool {
        self.is_module
    }

    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    /// Full constant path, or an anonymous description.
    pub fn name(&self) -> String {
        match &*self.name.read() {
            Some(n) => n.to_string(),
            None if self.is_module => format!("#<Module:0x{:x}>", self.id),
            None => format!("#<Class:0x{:x}>", self.id),
        }
    }

    pub fn has_name(&self) -> bool {
        self.name.read().is_some()
    }

    pub(crate) fn set_name(&self, name: &str) {
        let mut slot = self.name.write();
        if slot.is_none() {
            *slot = Some(Arc::from(name));
        }
    }

    pub fn superclass(&self) -> Option<ClassRef> {
        self.superclass.clone()
    }

    /// Directly included modules, most recent first.
    pub fn includes(&self) -> Vec<ClassRef> {
        self.includes.read().clone()
    }

    pub(crate) fn add_include(self: &Arc<Self>, module: &ClassRef) -> bool {
        {
            let mut includes = self.includes.write();
            if includes.iter().any(|m| Arc::ptr_eq(m, module)) {
                return false;
            }
            includes.insert(0, module.clone());
        }
        module.includers.write().push(Arc::downgrade(self));
        true
    }

    pub fn subclasses(&self) -> Vec<ClassRef> {
        live(&self.subclasses)
    }

    pub fn includers(&self) -> Vec<ClassRef> {
        live(&self.includers)
    }

    pub fn const_get(&self, name: Symbol) -> Option<Value> {
        self.consts.read().get(&name).cloned()
    }

    pub fn const_set(&self, name: Symbol, value: Value) {
        self.consts.write().insert(name, value);
    }

    pub fn const_names(&self) -> Vec<Symbol> {
        self.consts.read().keys().copied().collect()
    }

    pub fn cvar_get(&self, name: Symbol) -> Option<Value> {
        self.cvars.read().get(&name).cloned()
    }

    pub fn cvar_set(&self, name: Symbol, value: Value) {
        self.cvars.write().insert(name, value);
    }

    pub fn cvar_defined(&self, name: Symbol) -> bool {
        self.cvars.read().contains_key(&name)
    }

    pub fn ivar_get(&self, name: Symbol) -> Option<Value> {
        self.ivars.read().get(&name).cloned()
    }

    pub fn ivar_set(&self, name: Symbol, value: Value) {
        self.ivars.write().insert(name, value);
    }

    pub fn ivar_names(&self) -> Vec<Symbol> {
        self.ivars.read().keys().copied().collect()
    }

    pub fn meta(&self) -> Option<ClassRef> {
        self.meta.read().clone()
    }

    pub(crate) fn meta_slot(&self) -> &RwLock<Option<ClassRef>> {
        &self.meta
    }

    pub fn lexical_parent(&self) -> Option<ClassRef> {
        self.lexical_parent.read().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_lexical_parent(&self, parent: &ClassRef) {
        *self.lexical_parent.write() = Some(Arc::downgrade(parent));
    }

    pub fn builtin(&self) -> Option<BuiltinType> {
        self.builtin.get().copied()
    }

    pub(crate) fn mark_builtin(&self, ty: BuiltinType) {
        let _ = self.builtin.set(ty);
    }

    /// True when `other` is this class, a superclass, or an included module.
    pub fn inherits(&self, other: &RClass) -> bool {
        if self.id == other.id {
            return true;
        }
        if self.includes.read().iter().any(|m| m.inherits(other)) {
            return true;
        }
        match &self.superclass {
            Some(sup) => sup.inherits(other),
            None => false,
        }
    }
}

fn live(list: &RwLock<Vec<Weak<RClass>>>) -> Vec<ClassRef> {
    let mut out = Vec::new();
    let mut dead = false;
    for weak in list.read().iter() {
        match weak.upgrade() {
            Some(c) => out.push(c),
            None => dead = true,
        }
    }
    if dead {
        list.write().retain(|w| w.strong_count() > 0);
    }
    out
}

impl std::fmt::Debug for RClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
