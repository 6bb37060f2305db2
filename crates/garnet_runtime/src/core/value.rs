//! Guest values.
//!
//! Immediates are stored inline; everything else is an `Arc` so values can be handed to
//! other guest threads.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::object::{RArray, RHash, RObject, RRange, RRegexp, RString};
use super::symbol::Symbol;
use crate::bridge::ForeignObject;
use crate::model::ClassRef;
use crate::runtime::closure::{Binding, Block};
use crate::runtime::thread::ThreadHandle;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Sym(Symbol),
    Str(Arc<RString>),
    Array(Arc<RArray>),
    Hash(Arc<RHash>),
    Range(Arc<RRange>),
    Regexp(Arc<RRegexp>),
    Object(Arc<RObject>),
    Class(ClassRef),
    Proc(Arc<Block>),
    Binding(Arc<Binding>),
    Thread(Arc<ThreadHandle>),
    Foreign(Arc<dyn ForeignObject>),
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Arc::new(RString::new(s.into())))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RArray::new(items)))
    }

    pub fn hash(pairs: Vec<(Value, Value)>) -> Value {
        Value::Hash(Arc::new(RHash::from_pairs(pairs)))
    }

    pub fn sym(name: &str) -> Value {
        Value::Sym(Symbol::intern(name))
    }

    pub fn bool(b: bool) -> Value {
        Value::Bool(b)
    }

    /// Everything except `nil` and `false` is true.
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<Symbol> {
        match self {
            Value::Sym(s) => Some(*s),
            _ => None,
        }
    }

    /// Symbol or String content, for APIs that accept either as a name.
    pub fn as_name(&self) -> Option<Symbol> {
        match self {
            Value::Sym(s) => Some(*s),
            Value::Str(s) => Some(s.with(Symbol::intern)),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.to_string_lossy()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<RArray>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_proc(&self) -> Option<&Arc<Block>> {
        match self {
            Value::Proc(b) => Some(b),
            _ => None,
        }
    }

    /// `equal?`: same immediate, or the same heap object.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Sym(a), Value::Sym(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Arc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => Arc::ptr_eq(a, b),
            (Value::Regexp(a), Value::Regexp(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Arc::ptr_eq(a, b),
            (Value::Binding(a), Value::Binding(b)) => Arc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// `eql?` as used for hash keys.
    pub fn eql(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => {
                Arc::ptr_eq(a, b) || a.with(|x| b.with(|y| x == y))
            }
            (Value::Array(a), Value::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (x, y) = (a.to_vec(), b.to_vec());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.eql(q))
            }
            _ => self.identical(other),
        }
    }

    pub(crate) fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Sym(s) => s.hash(state),
            Value::Str(s) => s.with(|x| x.hash(state)),
            Value::Array(a) => {
                for item in a.to_vec() {
                    item.hash_into(state);
                }
            }
            other => other.object_id().hash(state),
        }
    }

    pub fn object_id(&self) -> i64 {
        match self {
            Value::Nil => 8,
            Value::Bool(false) => 0,
            Value::Bool(true) => 20,
            Value::Int(i) => i.wrapping_mul(2).wrapping_add(1),
            Value::Float(f) => f.to_bits() as i64,
            Value::Sym(s) => (s.id() as i64) * 8 + 12,
            Value::Str(a) => Arc::as_ptr(a) as usize as i64,
            Value::Array(a) => Arc::as_ptr(a) as usize as i64,
            Value::Hash(a) => Arc::as_ptr(a) as usize as i64,
            Value::Range(a) => Arc::as_ptr(a) as usize as i64,
            Value::Regexp(a) => Arc::as_ptr(a) as usize as i64,
            Value::Object(o) => o.id as i64,
            Value::Class(c) => c.id() as i64 * 8 + 4,
            Value::Proc(a) => Arc::as_ptr(a) as usize as i64,
            Value::Binding(a) => Arc::as_ptr(a) as usize as i64,
            Value::Thread(a) => Arc::as_ptr(a) as usize as i64,
            Value::Foreign(a) => Arc::as_ptr(a) as *const () as usize as i64,
        }
    }

    /// Short description used by `Debug`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Sym(_) => "Symbol",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Range(_) => "Range",
            Value::Regexp(_) => "Regexp",
            Value::Object(_) => "Object",
            Value::Class(_) => "Class",
            Value::Proc(_) => "Proc",
            Value::Binding(_) => "Binding",
            Value::Thread(_) => "Thread",
            Value::Foreign(_) => "Foreign",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Sym(s) => write!(f, "{s:?}"),
            Value::Str(s) => s.with(|x| write!(f, "{x:?}")),
            Value::Array(a) => f.debug_list().entries(a.to_vec().iter()).finish(),
            Value::Hash(h) => f
                .debug_map()
                .entries(h.pairs().iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Class(c) => f.write_str(&c.name()),
            Value::Object(o) => write!(f, "#<{}>", o.class.name()),
            other => write!(f, "#<{}>", other.type_name()),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for tests and hosts; guest `==` goes through dispatch.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => {
                Arc::ptr_eq(a, b) || {
                    let (x, y) = (a.pairs(), b.pairs());
                    x.len() == y.len()
                        && x.iter().all(|(k, v)| b.get(k).is_some_and(|w| &w == v))
                }
            }
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a.to_vec() == b.to_vec(),
            _ => self.eql(other),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::array(v)
    }
}
