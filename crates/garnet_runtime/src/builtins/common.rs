use std::sync::Arc;

use garnet_syntax::DiagnosticKind;

use crate::core::{Symbol, Value};
use crate::errors::messages;
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::closure::Block;
use crate::runtime::config::Flow;
use crate::runtime::exception::Exc;

/// Class pickers for `BuiltinRegistry::register`.
pub(crate) mod pick {
    use crate::model::{ClassRef, CoreClasses};

    macro_rules! pickers {
        ($($name:ident),* $(,)?) => {
            $(
                pub(crate) fn $name(c: &CoreClasses) -> &ClassRef {
                    &c.$name
                }
            )*
        };
    }

    pickers!(
        object, module, class, kernel, comparable, numeric, integer, float, string, symbol,
        array, hash, range, regexp, nil, true_class, false_class, proc_class, binding, thread,
        exception,
    );
}

pub(crate) fn conversion_error(rt: &mut Runtime, value: &Value, to: &str) -> Flow {
    let kind = DiagnosticKind::NoImplicitConversion {
        from: rt.vm.model.real_class_of(value).name(),
        to: to.into(),
    };
    rt.error(Exc::Type, kind)
}

/// A method name given as a Symbol or a String.
pub(crate) fn sym_arg(rt: &mut Runtime, value: &Value) -> Result<Symbol, Flow> {
    match value.as_name() {
        Some(sym) => Ok(sym),
        None => {
            let shown = rt.inspect_value(value);
            Err(rt.error_msg(Exc::Type, format!("{shown} {}", messages::NOT_A_SYMBOL)))
        }
    }
}

pub(crate) fn int_arg(rt: &mut Runtime, value: &Value) -> Result<i64, Flow> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        other => Err(conversion_error(rt, other, "Integer")),
    }
}

pub(crate) fn str_arg(rt: &mut Runtime, value: &Value) -> Result<String, Flow> {
    match value {
        Value::Str(s) => Ok(s.to_string_lossy()),
        other => Err(conversion_error(rt, other, "String")),
    }
}

pub(crate) fn class_arg(rt: &mut Runtime, value: &Value) -> Result<ClassRef, Flow> {
    match value {
        Value::Class(c) => Ok(c.clone()),
        other => {
            let shown = rt.describe_receiver(other);
            Err(rt.error_msg(Exc::Type, format!("{shown} is not a class/module")))
        }
    }
}

pub(crate) fn module_arg(rt: &mut Runtime, value: &Value) -> Result<ClassRef, Flow> {
    match value {
        Value::Class(c) if c.is_module() => Ok(c.clone()),
        other => Err(conversion_error(rt, other, "Module")),
    }
}

/// The block a native method requires.
pub(crate) fn need_block<'a>(rt: &mut Runtime, block: Option<&'a Arc<Block>>) -> Result<&'a Arc<Block>, Flow> {
    match block {
        Some(b) => Ok(b),
        None => Err(rt.error(Exc::LocalJump, DiagnosticKind::NoBlockGiven)),
    }
}

pub(crate) fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Optional positional `idx`, or nil.
pub(crate) fn opt(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or(Value::Nil)
}
