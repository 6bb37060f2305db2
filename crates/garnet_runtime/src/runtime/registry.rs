//! Method registry.
//!
//! One table maps `(class, selector)` to a pending source, a compiled unit, or an explicit
//! "undefined" marker. Every mutation happens under the table's write lock and is followed
//! by an epoch bump on the affected `(class, selector)` pairs, which is what inline caches
//! validate against. Epoch reads are lock-free.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use log::{debug, trace};
use parking_lot::RwLock;

use crate::compile;
use crate::compile::fast::{OP_COUNT, OpKind, op_kind};
use crate::core::{FastHashMap, FastHashSet, FastIndexMap, Symbol, Value};
use crate::gc::Collector;
use crate::model::{BuiltinType, ClassId, ClassRef, ObjectModel};
use crate::runtime::unit::{CompiledUnit, Imp, PendingSource, UnitFlags, Visibility};

pub enum MethodEntry {
    Pending(Arc<PendingSource>),
    Compiled(Arc<CompiledUnit>),
    /// `undef_method`: lookup stops here.
    Undefined,
}

impl MethodEntry {
    fn flags(&self) -> Option<UnitFlags> {
        match self {
            MethodEntry::Pending(p) => Some(p.flags),
            MethodEntry::Compiled(u) => Some(u.flags),
            MethodEntry::Undefined => None,
        }
    }
}

pub enum Lookup {
    Found(Arc<CompiledUnit>),
    Undefined,
    Missing,
}

impl Lookup {
    pub fn found(self) -> Option<Arc<CompiledUnit>> {
        match self {
            Lookup::Found(u) => Some(u),
            _ => None,
        }
    }
}

type Table = FastHashMap<ClassId, FastIndexMap<Symbol, MethodEntry>>;

pub struct MethodRegistry {
    table: RwLock<Table>,
    epochs: RwLock<FastHashMap<(ClassId, Symbol), Arc<AtomicU64>>>,
    hierarchy: AtomicU64,
    /// Per operator: bit set of builtin types whose operator was redefined.
    redefined: [AtomicU32; OP_COUNT],
    eager: AtomicBool,
    compiles: AtomicU64,
    collector: Arc<dyn Collector>,
}

impl MethodRegistry {
    pub fn new(collector: Arc<dyn Collector>, eager: bool) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            epochs: RwLock::new(FastHashMap::default()),
            hierarchy: AtomicU64::new(0),
            redefined: std::array::from_fn(|_| AtomicU32::new(0)),
            eager: AtomicBool::new(eager),
            compiles: AtomicU64::new(0),
            collector,
        }
    }

    pub fn set_eager(&self, eager: bool) {
        self.eager.store(eager, Ordering::Relaxed);
    }

    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }

    pub fn define_pending(&self, src: PendingSource) {
        let class = src.owner.clone();
        let sel = src.selector;
        self.define(&class, sel, MethodEntry::Pending(Arc::new(src)));
    }

    pub fn define_unit(&self, class: &ClassRef, unit: CompiledUnit) {
        let sel = unit.selector;
        self.define(class, sel, MethodEntry::Compiled(Arc::new(unit)));
    }

    /// Installs `entry`, replacing whatever was there, then invalidates caches.
    pub fn define(&self, class: &ClassRef, sel: Symbol, entry: MethodEntry) {
        let entry = match entry {
            MethodEntry::Pending(src) if self.eager.load(Ordering::Relaxed) => {
                MethodEntry::Compiled(Arc::new(self.compile(&src)))
            }
            other => other,
        };
        let native = entry
            .flags()
            .is_some_and(|f| f.contains(UnitFlags::NATIVE_GLUE));
        if let MethodEntry::Compiled(unit) = &entry {
            if let Imp::Block(b) = &unit.imp {
                self.collector.write_barrier(
                    &Value::Class(class.clone()),
                    &sel.as_str(),
                    &Value::Proc(b.clone()),
                );
            }
        }
        let old = {
            let mut table = self.table.write();
            table.entry(class.id()).or_default().insert(sel, entry)
        };
        if let Some(MethodEntry::Compiled(unit)) = &old {
            if let Imp::Block(b) = &unit.imp {
                self.collector.release(&Value::Proc(b.clone()));
            }
        }
        if !native {
            debug!("define {}#{}", class.name(), sel);
            self.note_redefinition(class, sel);
        }
        self.invalidate(class, sel);
    }

    /// Marks `sel` as explicitly undefined on `class`.
    pub fn undefine(&self, class: &ClassRef, sel: Symbol) {
        self.table
            .write()
            .entry(class.id())
            .or_default()
            .insert(sel, MethodEntry::Undefined);
        debug!("undef {}#{}", class.name(), sel);
        self.note_redefinition(class, sel);
        self.invalidate(class, sel);
    }

    /// Deletes the entry so lookup continues in the ancestors. Returns false if absent.
    pub fn remove(&self, class: &ClassRef, sel: Symbol) -> bool {
        let removed = self
            .table
            .write()
            .get_mut(&class.id())
            .and_then(|m| m.shift_remove(&sel))
            .is_some_and(|e| !matches!(e, MethodEntry::Undefined));
        if removed {
            debug!("remove {}#{}", class.name(), sel);
            self.note_redefinition(class, sel);
            self.invalidate(class, sel);
        }
        removed
    }

    /// Walks the ancestor chain, compiling a pending source in place when found.
    pub fn resolve(&self, model: &dyn ObjectModel, class: &ClassRef, sel: Symbol) -> Lookup {
        self.resolve_in(&model.ancestors(class), sel)
    }

    /// Lookup starting after `owner` in the ancestors of `class`, for `super`.
    pub fn resolve_after(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        owner: &ClassRef,
        sel: Symbol,
    ) -> Lookup {
        let ancestors = model.ancestors(class);
        match ancestors.iter().position(|c| Arc::ptr_eq(c, owner)) {
            Some(pos) => self.resolve_in(&ancestors[pos + 1..], sel),
            None => Lookup::Missing,
        }
    }

    fn resolve_in(&self, ancestors: &[ClassRef], sel: Symbol) -> Lookup {
        let mut i = 0;
        while let Some(c) = ancestors.get(i) {
            let pending = {
                let table = self.table.read();
                match table.get(&c.id()).and_then(|m| m.get(&sel)) {
                    None => {
                        i += 1;
                        continue;
                    }
                    Some(MethodEntry::Undefined) => return Lookup::Undefined,
                    Some(MethodEntry::Compiled(u)) => return Lookup::Found(u.clone()),
                    Some(MethodEntry::Pending(p)) => p.clone(),
                }
            };
            // `None`: removed before we took the write lock, so look at `c` again.
            if let Some(found) = self.compile_entry(c, sel, &pending) {
                return found;
            }
        }
        Lookup::Missing
    }

    /// Compiles `pending` and swaps it in, unless another thread got there first. `None`
    /// when the entry is gone.
    fn compile_entry(&self, class: &ClassRef, sel: Symbol, pending: &Arc<PendingSource>) -> Option<Lookup> {
        let mut table = self.table.write();
        let slot = table.get_mut(&class.id()).and_then(|m| m.get_mut(&sel))?;
        let unit = match slot {
            MethodEntry::Pending(p) if Arc::ptr_eq(p, pending) => Arc::new(self.compile(pending)),
            MethodEntry::Compiled(u) => return Some(Lookup::Found(u.clone())),
            // Redefined while we waited: compile the newer source instead.
            MethodEntry::Pending(p) => {
                let p = p.clone();
                Arc::new(self.compile(&p))
            }
            MethodEntry::Undefined => return Some(Lookup::Undefined),
        };
        *slot = MethodEntry::Compiled(unit.clone());
        Some(Lookup::Found(unit))
    }

    fn compile(&self, src: &PendingSource) -> CompiledUnit {
        self.compiles.fetch_add(1, Ordering::Relaxed);
        debug!("compile {}#{}", src.owner.name(), src.selector);
        compile::compile_method(src)
    }

    /// Forces compilation of one pending method. Returns false if it was not pending.
    pub fn compile_pending(&self, class: &ClassRef, sel: Symbol) -> bool {
        let pending = {
            let table = self.table.read();
            match table.get(&class.id()).and_then(|m| m.get(&sel)) {
                Some(MethodEntry::Pending(p)) => p.clone(),
                _ => return false,
            }
        };
        matches!(self.compile_entry(class, sel, &pending), Some(Lookup::Found(_)))
    }

    /// Compiles every pending source. Returns how many were compiled.
    pub fn compile_all_pending(&self) -> usize {
        let mut table = self.table.write();
        let mut count = 0;
        for methods in table.values_mut() {
            for entry in methods.values_mut() {
                if let MethodEntry::Pending(src) = entry {
                    let unit = Arc::new(self.compile(src));
                    *entry = MethodEntry::Compiled(unit);
                    count += 1;
                }
            }
        }
        count
    }

    pub fn is_pending(&self, class: &ClassRef, sel: Symbol) -> bool {
        matches!(
            self.table.read().get(&class.id()).and_then(|m| m.get(&sel)),
            Some(MethodEntry::Pending(_))
        )
    }

    /// Flags of the entry defined directly on `class`, if any.
    pub fn own_flags(&self, class: &ClassRef, sel: Symbol) -> Option<UnitFlags> {
        self.table
            .read()
            .get(&class.id())
            .and_then(|m| m.get(&sel))
            .and_then(MethodEntry::flags)
    }

    /// Copies the resolved method under a new name on `class`.
    pub fn alias(&self, model: &dyn ObjectModel, class: &ClassRef, new: Symbol, old: Symbol) -> bool {
        match self.resolve(model, class, old) {
            Lookup::Found(unit) => {
                let copy = unit.with_flags(unit.flags);
                self.define(class, new, MethodEntry::Compiled(Arc::new(copy)));
                true
            }
            _ => false,
        }
    }

    /// Changes visibility; a method inherited from an ancestor is copied onto `class`.
    pub fn set_visibility(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        sel: Symbol,
        vis: Visibility,
    ) -> bool {
        let unit = match self.resolve(model, class, sel) {
            Lookup::Found(u) => u,
            _ => return false,
        };
        let flags = unit.flags.with_visibility(vis);
        if flags == unit.flags && Arc::ptr_eq(unit.owner(), class) {
            return true;
        }
        let entry = MethodEntry::Compiled(Arc::new(unit.with_flags(flags)));
        self.table
            .write()
            .entry(class.id())
            .or_default()
            .insert(sel, entry);
        debug!("visibility {}#{} -> {:?}", class.name(), sel, vis);
        self.invalidate(class, sel);
        true
    }

    /// Selectors visible on `class`, nearest definition first.
    pub fn method_names(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        include_private: bool,
    ) -> Vec<Symbol> {
        let table = self.table.read();
        let mut seen = FastHashSet::default();
        let mut out = Vec::new();
        for c in model.ancestors(class) {
            if let Some(methods) = table.get(&c.id()) {
                for (sel, entry) in methods {
                    if !seen.insert(*sel) {
                        continue;
                    }
                    let visible = match entry.flags() {
                        None => false,
                        Some(f) => include_private || !f.contains(UnitFlags::PRIVATE),
                    };
                    if visible {
                        out.push(*sel);
                    }
                }
            }
        }
        out
    }

    /// Selectors defined directly on `class`.
    pub fn own_method_names(&self, class: &ClassRef) -> Vec<Symbol> {
        self.table
            .read()
            .get(&class.id())
            .map(|m| {
                m.iter()
                    .filter(|(_, e)| e.flags().is_some())
                    .map(|(s, _)| *s)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn epoch(&self, class_id: ClassId, sel: Symbol) -> Arc<AtomicU64> {
        if let Some(e) = self.epochs.read().get(&(class_id, sel)) {
            return e.clone();
        }
        self.epochs
            .write()
            .entry((class_id, sel))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    #[inline]
    pub fn hierarchy_epoch(&self) -> u64 {
        self.hierarchy.load(Ordering::Acquire)
    }

    /// Ancestor lists changed somewhere (module inclusion); every cache entry is stale.
    pub fn bump_hierarchy(&self) {
        self.hierarchy.fetch_add(1, Ordering::Release);
        debug!("hierarchy epoch bumped");
    }

    /// Bumps the epoch of `(class, sel)` and of every class that inherits it through
    /// subclassing or module inclusion.
    fn invalidate(&self, class: &ClassRef, sel: Symbol) {
        let epochs = self.epochs.read();
        for c in descendants(class) {
            if let Some(e) = epochs.get(&(c.id(), sel)) {
                e.fetch_add(1, Ordering::Release);
                trace!("invalidate {}#{}", c.name(), sel);
            }
        }
    }

    /// Turns off the inline path of `sel` for every builtin type that sees `class`.
    fn note_redefinition(&self, class: &ClassRef, sel: Symbol) {
        let Some(op) = op_kind(&sel.as_str()) else {
            return;
        };
        let bits = match op {
            OpKind::Send => u32::MAX,
            _ => builtin_bits(class),
        };
        if bits == 0 {
            return;
        }
        self.redefined[op as usize].fetch_or(bits, Ordering::Release);
        debug!("operator {} redefined through {}", sel, class.name());
    }

    /// `module` (with its own modules) now sits in the ancestors of `class`: guest-defined
    /// operators it carries shadow the core ones below `class`.
    pub fn note_include(&self, model: &dyn ObjectModel, class: &ClassRef, module: &ClassRef) {
        let shadowing: Vec<Symbol> = {
            let table = self.table.read();
            model
                .ancestors(module)
                .iter()
                .filter_map(|m| table.get(&m.id()))
                .flat_map(|methods| methods.iter())
                .filter(|(sel, entry)| {
                    op_kind(&sel.as_str()).is_some()
                        && !entry
                            .flags()
                            .is_some_and(|f| f.contains(UnitFlags::NATIVE_GLUE))
                })
                .map(|(sel, _)| *sel)
                .collect()
        };
        for sel in shadowing {
            self.note_redefinition(class, sel);
        }
    }

    #[inline]
    pub fn is_redefined(&self, op: OpKind, ty: BuiltinType) -> bool {
        self.redefined[op as usize].load(Ordering::Acquire) & ty.bit() != 0
    }
}

/// `class` and everything that inherits from it by subclassing or inclusion.
fn descendants(class: &ClassRef) -> Vec<ClassRef> {
    let mut visited = FastHashSet::default();
    let mut out = Vec::new();
    let mut stack = vec![class.clone()];
    while let Some(c) = stack.pop() {
        if !visited.insert(c.id()) {
            continue;
        }
        stack.extend(c.subclasses());
        stack.extend(c.includers());
        out.push(c);
    }
    out
}

fn builtin_bits(class: &ClassRef) -> u32 {
    descendants(class)
        .iter()
        .filter_map(|c| c.builtin())
        .fold(0, |bits, ty| bits | ty.bit())
}

#[cfg(test)]
mod tests {
    use garnet_ir::build::*;

    use super::*;
    use crate::Runtime;

    #[test]
    fn entry_removed_before_compiling_falls_back_to_the_superclass() {
        let mut rt = Runtime::new();
        rt.compile_and_run(&lines(vec![
            class("Base", None, def("m", &[], int(1))),
            class("Leaf", Some(constant("Base")), def("m", &[], int(2))),
        ]))
        .unwrap();
        let base = rt.lookup_class("Base").unwrap();
        let leaf = rt.lookup_class("Leaf").unwrap();
        let sel = Symbol::intern("m");
        let vm = rt.vm().clone();
        let registry = vm.registry();

        let pending = match registry.table.read().get(&leaf.id()).and_then(|m| m.get(&sel)) {
            Some(MethodEntry::Pending(p)) => p.clone(),
            _ => panic!("Leaf#m should still be pending"),
        };
        assert!(registry.remove(&leaf, sel));
        assert!(registry.compile_entry(&leaf, sel, &pending).is_none());

        let unit = registry.resolve(vm.model(), &leaf, sel).found().unwrap();
        assert_eq!(unit.owner().id(), base.id());
    }

    #[test]
    fn undefined_entry_stops_compile_on_resolve() {
        let mut rt = Runtime::new();
        rt.compile_and_run(&class("Leaf", None, def("m", &[], int(2)))).unwrap();
        let leaf = rt.lookup_class("Leaf").unwrap();
        let sel = Symbol::intern("m");
        let vm = rt.vm().clone();
        let registry = vm.registry();

        let pending = match registry.table.read().get(&leaf.id()).and_then(|m| m.get(&sel)) {
            Some(MethodEntry::Pending(p)) => p.clone(),
            _ => panic!("Leaf#m should still be pending"),
        };
        registry.undefine(&leaf, sel);
        assert!(matches!(
            registry.compile_entry(&leaf, sel, &pending),
            Some(Lookup::Undefined)
        ));
    }
}
