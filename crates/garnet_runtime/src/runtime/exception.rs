//! Raising guest exceptions and turning uncaught ones into host errors.

use std::sync::Arc;

use garnet_syntax::{DiagnosticKind, DiagnosticsFormatter};

use crate::core::{RObject, Symbol, Value};
use crate::errors::{ExecError, messages};
use crate::model::{ClassRef, CoreClasses};
use crate::runtime::Runtime;
use crate::runtime::config::Flow;
use crate::runtime::vm::Stat;

/// Core exception classes raised by the runtime itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exc {
    Standard,
    Runtime,
    Argument,
    Name,
    NoMethod,
    Type,
    ZeroDivision,
    LocalJump,
    Range,
    FloatDomain,
    Index,
    Key,
    StopIteration,
    Thread,
    Regexp,
    SystemStack,
    NotImplemented,
}

impl Exc {
    pub fn class(self, core: &CoreClasses) -> &ClassRef {
        match self {
            Exc::Standard => &core.standard_error,
            Exc::Runtime => &core.runtime_error,
            Exc::Argument => &core.argument_error,
            Exc::Name => &core.name_error,
            Exc::NoMethod => &core.no_method_error,
            Exc::Type => &core.type_error,
            Exc::ZeroDivision => &core.zero_division_error,
            Exc::LocalJump => &core.local_jump_error,
            Exc::Range => &core.range_error,
            Exc::FloatDomain => &core.float_domain_error,
            Exc::Index => &core.index_error,
            Exc::Key => &core.key_error,
            Exc::StopIteration => &core.stop_iteration,
            Exc::Thread => &core.thread_error,
            Exc::Regexp => &core.regexp_error,
            Exc::SystemStack => &core.system_stack_error,
            Exc::NotImplemented => &core.not_implemented_error,
        }
    }
}

pub(crate) fn message_sym() -> Symbol {
    Symbol::intern("@message")
}

pub(crate) fn backtrace_sym() -> Symbol {
    Symbol::intern("@__backtrace")
}

impl Runtime {
    /// Builds a core exception and raises it.
    pub fn error(&mut self, exc: Exc, kind: DiagnosticKind) -> Flow {
        let class = exc.class(self.vm.model.core()).clone();
        let message = DiagnosticsFormatter::format(&kind);
        let value = self.new_exception(&class, &message);
        self.raise(value)
    }

    pub(crate) fn error_msg(&mut self, exc: Exc, message: impl Into<String>) -> Flow {
        self.error(exc, DiagnosticKind::Raw(message.into()))
    }

    pub(crate) fn new_exception(&self, class: &ClassRef, message: &str) -> Value {
        let obj = RObject::new(class.clone());
        obj.ivar_set(message_sym(), Value::str(message));
        Value::Object(Arc::new(obj))
    }

    /// Raises `exc`: records a backtrace unless it already has one and pushes it on the
    /// thread's exception stack.
    pub fn raise(&mut self, exc: Value) -> Flow {
        if let Value::Object(o) = &exc {
            if o.ivar_get(backtrace_sym()).is_none_or(|b| b.is_nil()) {
                let lines = self.backtrace().into_iter().map(Value::str).collect();
                o.ivar_set(backtrace_sym(), Value::array(lines));
            }
        }
        self.vm.stats.bump(Stat::ExceptionRaised);
        self.thread.exceptions.push(exc.clone());
        Flow::Raise(exc)
    }

    /// `file:line:in 'label'` for every live guest invocation, innermost first.
    pub fn backtrace(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.thread.calls.len());
        let mut line = self.thread.line;
        for rec in self.thread.calls.iter().rev() {
            if out.len() >= self.config.backtrace_limit {
                break;
            }
            out.push(format!("{}:{}:in `{}'", rec.file, line, rec.label));
            line = rec.caller_line;
        }
        out
    }

    pub fn current_exception(&self) -> Option<Value> {
        self.thread.current_exception().cloned()
    }

    pub(crate) fn is_exception(&self, value: &Value) -> bool {
        match value {
            Value::Object(o) => o.class().inherits(&self.vm.model.core().exception),
            _ => false,
        }
    }

    pub(crate) fn exception_message(&self, exc: &Value) -> String {
        match exc {
            Value::Object(o) => match o.ivar_get(message_sym()) {
                Some(Value::Str(s)) => s.to_string_lossy(),
                Some(Value::Nil) | None => o.class().name(),
                Some(other) => format!("{other:?}"),
            },
            other => format!("{other:?}"),
        }
    }

    pub(crate) fn exception_backtrace(&self, exc: &Value) -> Vec<String> {
        match exc {
            Value::Object(o) => match o.ivar_get(backtrace_sym()) {
                Some(Value::Array(a)) => a
                    .to_vec()
                    .iter()
                    .filter_map(Value::as_string)
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Whether `exc` is rescued by a clause naming `class`.
    pub(crate) fn exception_matches(&self, exc: &Value, class: &ClassRef) -> bool {
        self.vm.model.class_of(exc).inherits(class)
    }

    /// Implements the `raise` forms: no argument re-raises `$!` (or a RuntimeError), a
    /// string raises RuntimeError, a class is instantiated, an exception is raised as is.
    pub(crate) fn raise_from_args(&mut self, args: &[Value]) -> Flow {
        let core_runtime = self.vm.model.core().runtime_error.clone();
        match args {
            [] => match self.current_exception() {
                Some(exc) => Flow::Raise(exc),
                None => {
                    let exc = self.new_exception(&core_runtime, messages::UNHANDLED_EXCEPTION);
                    self.raise(exc)
                }
            },
            [Value::Str(s)] => {
                let exc = self.new_exception(&core_runtime, &s.to_string_lossy());
                self.raise(exc)
            }
            [Value::Class(c), rest @ ..] => {
                let msg_args: Vec<Value> = rest.iter().take(1).cloned().collect();
                let exc = match self.call_method(
                    &Value::Class(c.clone()),
                    Symbol::intern("new"),
                    msg_args,
                    None,
                    super::CallKind::Public,
                ) {
                    Ok(v) => v,
                    Err(flow) => return flow,
                };
                if !self.is_exception(&exc) {
                    return self.error(Exc::Type, DiagnosticKind::Raw("exception class/object expected".into()));
                }
                self.raise(exc)
            }
            [exc, rest @ ..] if self.is_exception(exc) => {
                if let (Value::Object(o), Some(msg)) = (exc, rest.first()) {
                    o.ivar_set(message_sym(), msg.clone());
                }
                self.raise(exc.clone())
            }
            [other, ..] => {
                let ty = self.vm.model.real_class_of(other).name();
                self.error(Exc::Type, DiagnosticKind::NotAnException(ty))
            }
        }
    }

    /// Converts a signal that reached the host boundary.
    pub(crate) fn host_error(&mut self, flow: Flow) -> ExecError {
        match flow {
            Flow::Raise(exc) => {
                let class = self.vm.model.real_class_of(&exc).name();
                ExecError::Uncaught {
                    class,
                    message: self.exception_message(&exc),
                    backtrace: self.exception_backtrace(&exc),
                }
            }
            Flow::BadTransfer(kw) => ExecError::BadControlTransfer(kw.to_string()),
            Flow::BlockReturn { .. } => ExecError::UnexpectedReturn,
            Flow::Kill => ExecError::Killed,
            Flow::Break { .. } => ExecError::BadControlTransfer("break".into()),
            Flow::Next(_) => ExecError::BadControlTransfer("next".into()),
            Flow::Redo => ExecError::BadControlTransfer("redo".into()),
            Flow::Retry => ExecError::BadControlTransfer("retry".into()),
            Flow::Return(_) => ExecError::BadControlTransfer("return".into()),
        }
    }
}
