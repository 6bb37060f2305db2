//! Class/object model seam.
//!
//! The execution core only asks the model to create classes and modules, include modules,
//! compute ancestor lists and answer "what class is this value". `StdObjectModel` is the
//! in-process implementation used by default.

mod class;

use std::sync::Arc;

pub use class::{BuiltinType, ClassId, ClassRef, RClass};

use crate::core::{Symbol, Value};

pub trait ObjectModel: Send + Sync {
    fn create_class(&self, name: Option<&str>, superclass: &ClassRef) -> ClassRef;
    fn create_module(&self, name: Option<&str>) -> ClassRef;
    /// Returns false when the module was already included.
    fn include_module(&self, class: &ClassRef, module: &ClassRef) -> bool;
    /// Method resolution order: the class, its modules, then the superclass chain.
    fn ancestors(&self, class: &ClassRef) -> Vec<ClassRef>;
    /// The class used for dispatch, including singleton classes.
    fn class_of(&self, value: &Value) -> ClassRef;
    /// The class reported by `Object#class`.
    fn real_class_of(&self, value: &Value) -> ClassRef;
    fn singleton_class_of(&self, value: &Value) -> Option<ClassRef>;
    fn core(&self) -> &CoreClasses;
}

pub struct CoreClasses {
    pub object: ClassRef,
    pub module: ClassRef,
    pub class: ClassRef,
    pub kernel: ClassRef,
    pub comparable: ClassRef,
    pub numeric: ClassRef,
    pub integer: ClassRef,
    pub float: ClassRef,
    pub string: ClassRef,
    pub symbol: ClassRef,
    pub array: ClassRef,
    pub hash: ClassRef,
    pub range: ClassRef,
    pub regexp: ClassRef,
    pub nil: ClassRef,
    pub true_class: ClassRef,
    pub false_class: ClassRef,
    pub proc_class: ClassRef,
    pub binding: ClassRef,
    pub thread: ClassRef,
    pub foreign: ClassRef,

    pub exception: ClassRef,
    pub script_error: ClassRef,
    pub not_implemented_error: ClassRef,
    pub standard_error: ClassRef,
    pub runtime_error: ClassRef,
    pub argument_error: ClassRef,
    pub name_error: ClassRef,
    pub no_method_error: ClassRef,
    pub type_error: ClassRef,
    pub zero_division_error: ClassRef,
    pub local_jump_error: ClassRef,
    pub range_error: ClassRef,
    pub float_domain_error: ClassRef,
    pub index_error: ClassRef,
    pub key_error: ClassRef,
    pub stop_iteration: ClassRef,
    pub thread_error: ClassRef,
    pub regexp_error: ClassRef,
    pub system_stack_error: ClassRef,
}

pub struct StdObjectModel {
    core: CoreClasses,
}

impl StdObjectModel {
    pub fn new() -> Self {
        let object = RClass::new(Some("Object"), None, false, false);
        let module = RClass::new(Some("Module"), Some(object.clone()), false, false);
        let class = RClass::new(Some("Class"), Some(module.clone()), false, false);
        let kernel = RClass::new(Some("Kernel"), None, true, false);
        object.add_include(&kernel);
        let comparable = RClass::new(Some("Comparable"), None, true, false);

        let sub = |name: &str, sup: &ClassRef| RClass::new(Some(name), Some(sup.clone()), false, false);
        let numeric = sub("Numeric", &object);
        numeric.add_include(&comparable);
        let integer = sub("Integer", &numeric);
        let float = sub("Float", &numeric);
        let string = sub("String", &object);
        string.add_include(&comparable);

        let exception = sub("Exception", &object);
        let script_error = sub("ScriptError", &exception);
        let standard_error = sub("StandardError", &exception);
        let name_error = sub("NameError", &standard_error);
        let range_error = sub("RangeError", &standard_error);
        let index_error = sub("IndexError", &standard_error);

        let core = CoreClasses {
            symbol: sub("Symbol", &object),
            array: sub("Array", &object),
            hash: sub("Hash", &object),
            range: sub("Range", &object),
            regexp: sub("Regexp", &object),
            nil: sub("NilClass", &object),
            true_class: sub("TrueClass", &object),
            false_class: sub("FalseClass", &object),
            proc_class: sub("Proc", &object),
            binding: sub("Binding", &object),
            thread: sub("Thread", &object),
            foreign: sub("ForeignObject", &object),

            not_implemented_error: sub("NotImplementedError", &script_error),
            runtime_error: sub("RuntimeError", &standard_error),
            argument_error: sub("ArgumentError", &standard_error),
            no_method_error: sub("NoMethodError", &name_error),
            type_error: sub("TypeError", &standard_error),
            zero_division_error: sub("ZeroDivisionError", &standard_error),
            local_jump_error: sub("LocalJumpError", &standard_error),
            float_domain_error: sub("FloatDomainError", &range_error),
            key_error: sub("KeyError", &index_error),
            stop_iteration: sub("StopIteration", &index_error),
            thread_error: sub("ThreadError", &standard_error),
            regexp_error: sub("RegexpError", &standard_error),
            system_stack_error: sub("SystemStackError", &exception),

            object,
            module,
            class,
            kernel,
            comparable,
            numeric,
            integer,
            float,
            string,
            exception,
            script_error,
            standard_error,
            name_error,
            range_error,
            index_error,
        };

        for (c, ty) in [
            (&core.integer, BuiltinType::Integer),
            (&core.float, BuiltinType::Float),
            (&core.string, BuiltinType::String),
            (&core.symbol, BuiltinType::Symbol),
            (&core.array, BuiltinType::Array),
            (&core.hash, BuiltinType::Hash),
            (&core.range, BuiltinType::Range),
            (&core.nil, BuiltinType::Nil),
            (&core.true_class, BuiltinType::True),
            (&core.false_class, BuiltinType::False),
            (&core.proc_class, BuiltinType::Proc),
            (&core.regexp, BuiltinType::Regexp),
        ] {
            c.mark_builtin(ty);
        }

        for c in core.all() {
            core.object
                .const_set(Symbol::intern(&c.name()), Value::Class(c.clone()));
        }

        Self { core }
    }
}

impl Default for StdObjectModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreClasses {
    pub fn all(&self) -> Vec<&ClassRef> {
        vec![
            &self.object,
            &self.module,
            &self.class,
            &self.kernel,
            &self.comparable,
            &self.numeric,
            &self.integer,
            &self.float,
            &self.string,
            &self.symbol,
            &self.array,
            &self.hash,
            &self.range,
            &self.regexp,
            &self.nil,
            &self.true_class,
            &self.false_class,
            &self.proc_class,
            &self.binding,
            &self.thread,
            &self.foreign,
            &self.exception,
            &self.script_error,
            &self.not_implemented_error,
            &self.standard_error,
            &self.runtime_error,
            &self.argument_error,
            &self.name_error,
            &self.no_method_error,
            &self.type_error,
            &self.zero_division_error,
            &self.local_jump_error,
            &self.range_error,
            &self.float_domain_error,
            &self.index_error,
            &self.key_error,
            &self.stop_iteration,
            &self.thread_error,
            &self.regexp_error,
            &self.system_stack_error,
        ]
    }
}

fn push_module(module: &ClassRef, out: &mut Vec<ClassRef>) {
    if out.iter().any(|c| Arc::ptr_eq(c, module)) {
        return;
    }
    out.push(module.clone());
    for m in module.includes() {
        push_module(&m, out);
    }
}

impl ObjectModel for StdObjectModel {
    fn create_class(&self, name: Option<&str>, superclass: &ClassRef) -> ClassRef {
        RClass::new(name, Some(superclass.clone()), false, false)
    }

    fn create_module(&self, name: Option<&str>) -> ClassRef {
        RClass::new(name, None, true, false)
    }

    fn include_module(&self, class: &ClassRef, module: &ClassRef) -> bool {
        class.add_include(module)
    }

    fn ancestors(&self, class: &ClassRef) -> Vec<ClassRef> {
        let mut out: Vec<ClassRef> = Vec::new();
        let mut cur = Some(class.clone());
        while let Some(c) = cur {
            if !out.iter().any(|x| Arc::ptr_eq(x, &c)) {
                out.push(c.clone());
            }
            for m in c.includes() {
                push_module(&m, &mut out);
            }
            cur = c.superclass();
        }
        out
    }

    fn class_of(&self, value: &Value) -> ClassRef {
        match value {
            Value::Object(o) => match &*o.singleton.read() {
                Some(s) => s.clone(),
                None => o.class.clone(),
            },
            Value::Class(_) => match self.singleton_class_of(value) {
                Some(meta) => meta,
                None => self.core.class.clone(),
            },
            other => self.real_class_of(other),
        }
    }

    fn real_class_of(&self, value: &Value) -> ClassRef {
        let core = &self.core;
        match value {
            Value::Nil => core.nil.clone(),
            Value::Bool(true) => core.true_class.clone(),
            Value::Bool(false) => core.false_class.clone(),
            Value::Int(_) => core.integer.clone(),
            Value::Float(_) => core.float.clone(),
            Value::Sym(_) => core.symbol.clone(),
            Value::Str(_) => core.string.clone(),
            Value::Array(_) => core.array.clone(),
            Value::Hash(_) => core.hash.clone(),
            Value::Range(_) => core.range.clone(),
            Value::Regexp(_) => core.regexp.clone(),
            Value::Object(o) => o.class.clone(),
            Value::Class(c) if c.is_module => core.module.clone(),
            Value::Class(_) => core.class.clone(),
            Value::Proc(_) => core.proc_class.clone(),
            Value::Binding(_) => core.binding.clone(),
            Value::Thread(_) => core.thread.clone(),
            Value::Foreign(_) => core.foreign.clone(),
        }
    }

    fn singleton_class_of(&self, value: &Value) -> Option<ClassRef> {
        match value {
            Value::Object(o) => {
                if let Some(s) = &*o.singleton.read() {
                    return Some(s.clone());
                }
                let mut slot = o.singleton.write();
                if let Some(s) = &*slot {
                    return Some(s.clone());
                }
                let name = format!("#<Class:#<{}>>", o.class.name());
                let meta = RClass::new(Some(&name), Some(o.class.clone()), false, true);
                *slot = Some(meta.clone());
                Some(meta)
            }
            Value::Class(c) => {
                if let Some(m) = c.meta() {
                    return Some(m);
                }
                let sup = if c.is_singleton {
                    self.core.class.clone()
                } else if c.is_module {
                    self.core.module.clone()
                } else {
                    match c.superclass() {
                        Some(s) => self
                            .singleton_class_of(&Value::Class(s))
                            .unwrap_or_else(|| self.core.class.clone()),
                        None => self.core.class.clone(),
                    }
                };
                let mut slot = c.meta_slot().write();
                if let Some(m) = &*slot {
                    return Some(m.clone());
                }
                let name = format!("#<Class:{}>", c.name());
                let meta = RClass::new(Some(&name), Some(sup), false, true);
                *slot = Some(meta.clone());
                Some(meta)
            }
            Value::Nil => Some(self.core.nil.clone()),
            Value::Bool(true) => Some(self.core.true_class.clone()),
            Value::Bool(false) => Some(self.core.false_class.clone()),
            _ => None,
        }
    }

    fn core(&self) -> &CoreClasses {
        &self.core
    }
}
