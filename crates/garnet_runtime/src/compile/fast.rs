//! Guarded inline paths for core operators.
//!
//! A call site whose selector is in `OPERATORS` tries `try_fast` before dispatching. The
//! inline path runs only while the operator has not been redefined for the receiver's
//! builtin class, and it calls the same helpers the native methods use, so the result is
//! the same as a full dispatch.

use phf::phf_map;

use crate::builtins::{collection, math};
use crate::core::Value;
use crate::model::BuiltinType;
use crate::runtime::Runtime;
use crate::runtime::config::Eval;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpKind {
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
    LShift,
    Aref,
    Aset,
    Eqq,
    Send,
}

pub const OP_COUNT: usize = OpKind::Send as usize + 1;

static OPERATORS: phf::Map<&'static str, OpKind> = phf_map! {
    "+" => OpKind::Plus,
    "-" => OpKind::Minus,
    "*" => OpKind::Mult,
    "/" => OpKind::Div,
    "%" => OpKind::Mod,
    "<" => OpKind::Lt,
    "<=" => OpKind::Le,
    ">" => OpKind::Gt,
    ">=" => OpKind::Ge,
    "==" => OpKind::Eq,
    "!=" => OpKind::Neq,
    "<<" => OpKind::LShift,
    "[]" => OpKind::Aref,
    "[]=" => OpKind::Aset,
    "===" => OpKind::Eqq,
    "send" => OpKind::Send,
    "__send__" => OpKind::Send,
};

pub fn op_kind(selector: &str) -> Option<OpKind> {
    OPERATORS.get(selector).copied()
}

impl OpKind {
    /// Argument count the inline path handles.
    pub fn argc(self) -> usize {
        match self {
            OpKind::Aset => 2,
            _ => 1,
        }
    }
}

pub fn builtin_type_of(value: &Value) -> Option<BuiltinType> {
    Some(match value {
        Value::Int(_) => BuiltinType::Integer,
        Value::Float(_) => BuiltinType::Float,
        Value::Str(_) => BuiltinType::String,
        Value::Sym(_) => BuiltinType::Symbol,
        Value::Array(_) => BuiltinType::Array,
        Value::Hash(_) => BuiltinType::Hash,
        Value::Range(_) => BuiltinType::Range,
        Value::Nil => BuiltinType::Nil,
        Value::Bool(true) => BuiltinType::True,
        Value::Bool(false) => BuiltinType::False,
        Value::Proc(_) => BuiltinType::Proc,
        Value::Regexp(_) => BuiltinType::Regexp,
        _ => return None,
    })
}

/// `==` for receivers whose equality is fixed by the core library.
fn simple_eq(recv: &Value, arg: &Value) -> Option<bool> {
    match (recv, arg) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Some(math::num_eq(recv, arg))
        }
        (Value::Int(_) | Value::Float(_), _) => None,
        (Value::Str(a), Value::Str(b)) => Some(a.with(|x| b.with(|y| x == y))),
        (Value::Str(_), _) => Some(false),
        (Value::Sym(_) | Value::Nil | Value::Bool(_), _) => Some(recv.identical(arg)),
        _ => None,
    }
}

/// Inline evaluation, or `None` to fall back to a full dispatch.
pub(crate) fn try_fast(rt: &mut Runtime, op: OpKind, recv: &Value, args: &[Value]) -> Option<Eval> {
    if args.len() != op.argc() {
        return None;
    }
    let ty = builtin_type_of(recv)?;
    let registry = &rt.vm.registry;
    if registry.is_redefined(op, ty)
        || (matches!(op, OpKind::Neq | OpKind::Eqq) && registry.is_redefined(OpKind::Eq, ty))
    {
        return None;
    }
    let arg = &args[0];
    match op {
        OpKind::Plus
        | OpKind::Minus
        | OpKind::Mult
        | OpKind::Div
        | OpKind::Mod
        | OpKind::Lt
        | OpKind::Le
        | OpKind::Gt
        | OpKind::Ge => match recv {
            Value::Int(_) | Value::Float(_) => math::num_binop(rt, op, recv, arg),
            Value::Str(a) if op == OpKind::Plus => match arg {
                Value::Str(b) => Some(Ok(Value::str(a.with(|x| b.with(|y| format!("{x}{y}")))))),
                _ => None,
            },
            _ => None,
        },
        OpKind::Eq | OpKind::Eqq => simple_eq(recv, arg).map(|b| Ok(Value::Bool(b))),
        OpKind::Neq => simple_eq(recv, arg).map(|b| Ok(Value::Bool(!b))),
        OpKind::LShift => match (recv, arg) {
            (Value::Array(a), _) => {
                a.push(arg.clone());
                Some(Ok(recv.clone()))
            }
            (Value::Str(s), Value::Str(t)) => {
                let add = t.to_string_lossy();
                s.push_str(&add);
                Some(Ok(recv.clone()))
            }
            _ => None,
        },
        OpKind::Aref => match (recv, arg) {
            (Value::Array(a), Value::Int(i)) => Some(Ok(a.get(*i).unwrap_or(Value::Nil))),
            (Value::Hash(h), key) => Some(Ok(collection::hash_fetch_or_default(h, key))),
            _ => None,
        },
        OpKind::Aset => match (recv, arg) {
            (Value::Array(a), Value::Int(i)) => {
                let value = args[1].clone();
                a.set(*i, value.clone()).ok().map(|()| Ok(value))
            }
            (Value::Hash(h), key) => {
                let value = args[1].clone();
                h.insert(key.clone(), value.clone());
                Some(Ok(value))
            }
            _ => None,
        },
        OpKind::Send => None,
    }
}
