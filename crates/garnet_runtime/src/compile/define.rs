use std::sync::Arc;

use garnet_ir::{DefNode, Node};
use garnet_syntax::DiagnosticKind;

use super::Compiler;
use super::scope::{Scope, ScopeKind, needs_cells};
use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;
use crate::runtime::frame::Frame;
use crate::runtime::names::qualified;
use crate::runtime::registry::Lookup;
use crate::runtime::thread::{CallRecord, CrefEntry};
use crate::runtime::unit::{Body, Code, ParamPlan, PendingSource, UnitFlags, Visibility, arity_of};

/// Method names that are private wherever they are defined.
const ALWAYS_PRIVATE: &[&str] = &["initialize", "initialize_copy", "respond_to_missing?"];

/// Compile-time half of a `def`: everything but the owner.
struct DefSite {
    def: Arc<DefNode>,
    selector: Symbol,
    arity: Arity,
    file: Arc<str>,
    optimized: bool,
}

impl DefSite {
    fn pending(&self, owner: &ClassRef, cref: &ClassRef, flags: UnitFlags) -> PendingSource {
        PendingSource {
            owner: owner.clone(),
            selector: self.selector,
            def: self.def.clone(),
            arity: self.arity,
            flags,
            cref: cref.clone(),
            file: self.file.clone(),
            optimized: self.optimized,
        }
    }
}

/// Runs a class, module or singleton-class body with `self` and the class context set
/// to `class`.
fn run_class_body(rt: &mut Runtime, class: ClassRef, body: &Body) -> Eval {
    let id = rt.vm.next_frame_id();
    let mut frame = Frame::new(Value::Class(class.clone()), body.slots, body.cells, id);
    rt.thread.cref.push(CrefEntry::new(class, Visibility::Public));
    rt.thread.calls.push(CallRecord {
        label: body.label.clone(),
        file: body.file.clone(),
        caller_line: rt.thread.line,
    });
    let result = (body.code)(rt, &mut frame);
    if let Some(rec) = rt.thread.calls.pop() {
        rt.thread.line = rec.caller_line;
    }
    rt.thread.cref.pop();
    result
}

/// Where a `class Name`/`module Name` statement defines its constant.
fn container_of(rt: &mut Runtime, frame: &mut Frame, scope: Option<&Code>) -> Result<ClassRef, Flow> {
    match scope {
        None => Ok(rt.thread.cref().class.clone()),
        Some(code) => match code(rt, frame)? {
            Value::Class(c) => Ok(c),
            other => {
                let shown = rt.describe_receiver(&other);
                Err(rt.error_msg(Exc::Type, format!("{shown} is not a class/module")))
            }
        },
    }
}

impl Compiler {
    fn def_site(&self, def: &DefNode) -> DefSite {
        DefSite {
            def: Arc::new(def.clone()),
            selector: Symbol::intern(&def.name),
            arity: arity_of(&def.params),
            file: self.file.clone(),
            optimized: self.optimized,
        }
    }

    /// Compiles the body of a class, module or singleton class as a scope of its own.
    fn compile_class_body(&mut self, label: String, body: &Node) -> Arc<Body> {
        self.scopes
            .push(Scope::new(ScopeKind::Class, needs_cells(None, body), label));
        let code = self.compile(body);
        let scope = self.scopes.pop();
        let line = self.line;
        Arc::new(self.finish(scope, code, ParamPlan::default(), Arity::exact(0), None, false, line))
    }

    /// `def name ... end`: installs a pending method on the current class context.
    pub(super) fn compile_def(&mut self, def: &DefNode) -> Code {
        let site = self.def_site(def);
        let always_private = ALWAYS_PRIVATE.contains(&def.name.as_str());
        Box::new(move |rt, _| {
            let entry = rt.thread.cref().clone();
            let visibility = if always_private {
                Visibility::Private
            } else {
                entry.visibility
            };
            if entry.module_function {
                rt.vm
                    .registry
                    .define_pending(site.pending(&entry.class, &entry.class, UnitFlags::PRIVATE));
                let meta = rt.singleton_class(&Value::Class(entry.class.clone()))?;
                rt.vm
                    .registry
                    .define_pending(site.pending(&meta, &entry.class, UnitFlags::empty()));
            } else {
                rt.vm
                    .registry
                    .define_pending(site.pending(&entry.class, &entry.class, visibility.flags()));
            }
            Ok(Value::Sym(site.selector))
        })
    }

    /// `def recv.name ... end`: defines on the receiver's singleton class.
    pub(super) fn compile_defs(&mut self, recv: &Node, def: &DefNode) -> Code {
        let recv = self.compile(recv);
        let site = self.def_site(def);
        Box::new(move |rt, frame| {
            let target = recv(rt, frame)?;
            let meta = rt.singleton_class(&target)?;
            let cref = rt.thread.cref().class.clone();
            rt.vm
                .registry
                .define_pending(site.pending(&meta, &cref, UnitFlags::empty()));
            Ok(Value::Sym(site.selector))
        })
    }

    pub(super) fn compile_class(
        &mut self,
        scope: Option<&Node>,
        name: &str,
        superclass: Option<&Node>,
        body: &Node,
    ) -> Code {
        let scope = scope.map(|s| self.compile(s));
        let superclass = superclass.map(|s| self.compile(s));
        let body = self.compile_class_body(format!("<class:{name}>"), body);
        let name = Symbol::intern(name);

        Box::new(move |rt, frame| {
            let container = container_of(rt, frame, scope.as_ref())?;
            let superclass = match &superclass {
                Some(code) => match code(rt, frame)? {
                    Value::Class(c) if !c.is_module() => Some(c),
                    other => {
                        let shown = rt.describe_receiver(&other);
                        return Err(rt.error_msg(
                            Exc::Type,
                            format!("superclass must be a Class ({shown} given)"),
                        ));
                    }
                },
                None => None,
            };
            let full = qualified(&container, &name.as_str());
            let class = match container.const_get(name) {
                Some(Value::Class(c)) if !c.is_module() => {
                    if let Some(sup) = &superclass {
                        if !c.superclass().is_some_and(|s| s.id() == sup.id()) {
                            return Err(rt.error(Exc::Type, DiagnosticKind::SuperclassMismatch(full)));
                        }
                    }
                    c
                }
                Some(_) => return Err(rt.error(Exc::Type, DiagnosticKind::NotAClass(full))),
                None => {
                    let sup = superclass.unwrap_or_else(|| rt.vm.model.core().object.clone());
                    if sup.is_singleton() {
                        return Err(rt.error_msg(Exc::Type, "can't make subclass of singleton class"));
                    }
                    if sup.builtin().is_some() {
                        return Err(rt.error_msg(
                            Exc::Type,
                            format!("can't make subclass of {}", sup.name()),
                        ));
                    }
                    let class = rt.vm.model.create_class(Some(&full), &sup);
                    class.set_lexical_parent(&container);
                    container.const_set(name, Value::Class(class.clone()));
                    let inherited = Symbol::intern("inherited");
                    let sup_value = Value::Class(sup);
                    if !rt.method_is_native(&sup_value, inherited) {
                        rt.call_method(
                            &sup_value,
                            inherited,
                            vec![Value::Class(class.clone())],
                            None,
                            CallKind::FCall,
                        )?;
                    }
                    class
                }
            };
            run_class_body(rt, class, &body)
        })
    }

    pub(super) fn compile_module(&mut self, scope: Option<&Node>, name: &str, body: &Node) -> Code {
        let scope = scope.map(|s| self.compile(s));
        let body = self.compile_class_body(format!("<module:{name}>"), body);
        let name = Symbol::intern(name);

        Box::new(move |rt, frame| {
            let container = container_of(rt, frame, scope.as_ref())?;
            let full = qualified(&container, &name.as_str());
            let module = match container.const_get(name) {
                Some(Value::Class(c)) if c.is_module() => c,
                Some(_) => return Err(rt.error(Exc::Type, DiagnosticKind::NotAModule(full))),
                None => {
                    let module = rt.vm.model.create_module(Some(&full));
                    module.set_lexical_parent(&container);
                    container.const_set(name, Value::Class(module.clone()));
                    module
                }
            };
            run_class_body(rt, module, &body)
        })
    }

    /// `class << target`.
    pub(super) fn compile_sclass(&mut self, target: &Node, body: &Node) -> Code {
        let target = self.compile(target);
        let body = self.compile_class_body("singleton class".into(), body);
        Box::new(move |rt, frame| {
            let value = target(rt, frame)?;
            let meta = rt.singleton_class(&value)?;
            if meta.lexical_parent().is_none() {
                let cref = rt.thread.cref().class.clone();
                meta.set_lexical_parent(&cref);
            }
            run_class_body(rt, meta, &body)
        })
    }

    pub(super) fn compile_undef(&mut self, names: &[String]) -> Code {
        let names: Vec<Symbol> = names.iter().map(|n| Symbol::intern(n)).collect();
        Box::new(move |rt, _| {
            let class = rt.thread.cref().class.clone();
            for sel in &names {
                match rt.vm.registry.resolve(rt.vm.model.as_ref(), &class, *sel) {
                    Lookup::Found(_) => rt.vm.registry.undefine(&class, *sel),
                    _ => {
                        let kind = DiagnosticKind::UndefinedMethodForClass {
                            name: sel.as_str().to_string(),
                            class: class.name(),
                        };
                        return Err(rt.error(Exc::Name, kind));
                    }
                }
            }
            Ok(Value::Nil)
        })
    }

    pub(super) fn compile_alias(&mut self, new: &str, old: &str) -> Code {
        let new = Symbol::intern(new);
        let old = Symbol::intern(old);
        Box::new(move |rt, _| {
            let class = rt.thread.cref().class.clone();
            if rt.vm.registry.alias(rt.vm.model.as_ref(), &class, new, old) {
                return Ok(Value::Nil);
            }
            let kind = DiagnosticKind::UndefinedMethodForClass {
                name: old.as_str().to_string(),
                class: class.name(),
            };
            Err(rt.error(Exc::Name, kind))
        })
    }
}
