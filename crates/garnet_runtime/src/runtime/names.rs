//! Constant and class-variable resolution against the class-context stack.

use garnet_syntax::DiagnosticKind;

use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::exception::Exc;

impl Runtime {
    /// Lexically enclosing classes first, then the ancestors of the innermost one, then
    /// `Object`.
    pub(crate) fn const_lookup(&self, name: Symbol) -> Option<Value> {
        let cref = self.thread.cref().class.clone();
        let mut lexical = Some(cref.clone());
        while let Some(class) = lexical {
            if let Some(v) = class.const_get(name) {
                return Some(v);
            }
            lexical = class.lexical_parent();
        }
        self.vm
            .model
            .ancestors(&cref)
            .iter()
            .find_map(|c| c.const_get(name))
            .or_else(|| self.vm.model.core().object.const_get(name))
    }

    pub(crate) fn const_get(&mut self, name: Symbol) -> Eval {
        match self.const_lookup(name) {
            Some(v) => Ok(v),
            None => Err(self.error(
                Exc::Name,
                DiagnosticKind::UninitializedConstant(name.as_str().to_string()),
            )),
        }
    }

    /// `Scope::Name`: searches the ancestors of `scope` only.
    pub(crate) fn scoped_const_lookup(&self, scope: &ClassRef, name: Symbol) -> Option<Value> {
        self.vm
            .model
            .ancestors(scope)
            .iter()
            .find_map(|c| c.const_get(name))
    }

    pub(crate) fn scoped_const_get(&mut self, scope: &Value, name: Symbol) -> Eval {
        let Value::Class(class) = scope else {
            let shown = self.describe_receiver(scope);
            return Err(self.error_msg(Exc::Type, format!("{shown} is not a class/module")));
        };
        match self.scoped_const_lookup(class, name) {
            Some(v) => Ok(v),
            None => Err(self.error(
                Exc::Name,
                DiagnosticKind::UninitializedConstant(qualified(class, &name.as_str())),
            )),
        }
    }

    /// Assigns a constant, naming an anonymous class after the first constant it lands in.
    pub(crate) fn const_set_in(&mut self, target: &ClassRef, name: Symbol, value: Value) {
        if let Value::Class(c) = &value {
            if !c.has_name() {
                c.set_name(&qualified(target, &name.as_str()));
                c.set_lexical_parent(target);
            }
        }
        self.vm.collector.write_barrier(&Value::Class(target.clone()), &name.as_str(), &value);
        target.const_set(name, value);
    }

    /// Class whose class variables the running code sees. `class << self` bodies use the
    /// attached class.
    fn cvar_base(&self) -> ClassRef {
        let mut class = self.thread.cref().class.clone();
        while class.is_singleton() {
            match class.lexical_parent() {
                Some(parent) => class = parent,
                None => break,
            }
        }
        class
    }

    fn cvar_owner(&self, name: Symbol) -> Option<ClassRef> {
        let base = self.cvar_base();
        self.vm
            .model
            .ancestors(&base)
            .into_iter()
            .find(|c| c.cvar_defined(name))
    }

    pub(crate) fn cvar_defined(&self, name: Symbol) -> bool {
        self.cvar_owner(name).is_some()
    }

    pub(crate) fn cvar_get(&mut self, name: Symbol) -> Eval {
        if let Some(v) = self.cvar_owner(name).and_then(|c| c.cvar_get(name)) {
            return Ok(v);
        }
        let class = self.cvar_base().name();
        Err(self.error(
            Exc::Name,
            DiagnosticKind::UninitializedClassVariable {
                name: name.as_str().to_string(),
                class,
            },
        ))
    }

    /// Writes to the ancestor that already has `name`, else to the current class.
    pub(crate) fn cvar_set(&mut self, name: Symbol, value: Value) -> Result<(), Flow> {
        let owner = self.cvar_owner(name).unwrap_or_else(|| self.cvar_base());
        owner.cvar_set(name, value);
        Ok(())
    }

    pub(crate) fn gvar_defined(&self, name: Symbol) -> bool {
        match &*name.as_str() {
            "$!" | "$SAFE" | "$?" | "$0" | "$PROGRAM_NAME" => true,
            "$~" => self.thread.last_match.is_some(),
            _ => self.vm.globals.read().contains_key(&name),
        }
    }
}

/// `A::B` style name of `name` inside `scope`; top-level constants stay bare.
pub(crate) fn qualified(scope: &ClassRef, name: &str) -> String {
    if scope.name() == "Object" {
        name.to_string()
    } else {
        format!("{}::{}", scope.name(), name)
    }
}
