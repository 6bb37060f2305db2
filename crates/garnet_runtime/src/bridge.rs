//! Foreign object bridge.
//!
//! Native objects enter the guest world as `Value::Foreign`. When a selector does not
//! resolve through the method registry, dispatch asks the bridge whether the receiver can
//! still handle it and, if so, converts the arguments out, invokes the native
//! implementation and converts the result back in.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::Value;

/// Native-side type of one argument or return slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Bool,
    Int,
    Float,
    Str,
    Object,
    /// Pass the guest value through untouched.
    Any,
}

#[derive(Clone)]
pub enum NativeValue {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Arc<dyn ForeignObject>),
    Guest(Value),
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Void => f.write_str("void"),
            NativeValue::Bool(b) => write!(f, "{b}"),
            NativeValue::Int(i) => write!(f, "{i}"),
            NativeValue::Float(x) => write!(f, "{x}"),
            NativeValue::Str(s) => write!(f, "{s:?}"),
            NativeValue::Object(o) => write!(f, "<{}>", o.class_name()),
            NativeValue::Guest(v) => write!(f, "{v:?}"),
        }
    }
}

pub trait ForeignObject: Send + Sync {
    fn class_name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// Handle on a native implementation found by `forwardable`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignImp {
    /// Native class the implementation belongs to; a cached forward only applies to
    /// receivers reporting the same `class_name`.
    pub owner: Arc<str>,
    pub name: Arc<str>,
    pub ret: TypeTag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forward {
    pub imp: ForeignImp,
    pub arg_shape: Arc<[TypeTag]>,
}

pub trait ForeignBridge: Send + Sync {
    fn convert_in(&self, value: NativeValue, tag: TypeTag) -> Result<Value, String> {
        convert_in_default(value, tag)
    }

    fn convert_out(&self, value: &Value, tag: TypeTag) -> Result<NativeValue, String> {
        convert_out_default(value, tag)
    }

    fn invoke_native(
        &self,
        recv: &Arc<dyn ForeignObject>,
        imp: &ForeignImp,
        args: Vec<NativeValue>,
    ) -> Result<NativeValue, String>;

    /// Whether `recv` can handle `selector` even though no guest method exposes it.
    fn forwardable(&self, recv: &Arc<dyn ForeignObject>, selector: &str) -> Option<Forward>;
}

pub fn convert_in_default(value: NativeValue, tag: TypeTag) -> Result<Value, String> {
    Ok(match (value, tag) {
        (NativeValue::Void, _) | (_, TypeTag::Void) => Value::Nil,
        (NativeValue::Bool(b), TypeTag::Bool | TypeTag::Any) => Value::Bool(b),
        (NativeValue::Int(i), TypeTag::Int | TypeTag::Any) => Value::Int(i),
        (NativeValue::Int(i), TypeTag::Float) => Value::Float(i as f64),
        (NativeValue::Float(x), TypeTag::Float | TypeTag::Any) => Value::Float(x),
        (NativeValue::Str(s), TypeTag::Str | TypeTag::Any) => Value::str(s),
        (NativeValue::Object(o), TypeTag::Object | TypeTag::Any) => Value::Foreign(o),
        (NativeValue::Guest(v), _) => v,
        (v, tag) => return Err(format!("{v:?} as {tag:?}")),
    })
}

pub fn convert_out_default(value: &Value, tag: TypeTag) -> Result<NativeValue, String> {
    Ok(match (value, tag) {
        (_, TypeTag::Void) => NativeValue::Void,
        (_, TypeTag::Any) => NativeValue::Guest(value.clone()),
        (Value::Bool(b), TypeTag::Bool) => NativeValue::Bool(*b),
        (v, TypeTag::Bool) => NativeValue::Bool(v.truthy()),
        (Value::Int(i), TypeTag::Int) => NativeValue::Int(*i),
        (Value::Int(i), TypeTag::Float) => NativeValue::Float(*i as f64),
        (Value::Float(x), TypeTag::Float) => NativeValue::Float(*x),
        (Value::Str(s), TypeTag::Str) => NativeValue::Str(s.to_string_lossy()),
        (Value::Sym(s), TypeTag::Str) => NativeValue::Str(s.as_str().to_string()),
        (Value::Foreign(o), TypeTag::Object) => NativeValue::Object(o.clone()),
        (Value::Nil, TypeTag::Object) => NativeValue::Void,
        _ => return Err(value.type_name().to_string()),
    })
}

/// Bridge with no native classes: nothing is forwardable.
pub struct NullBridge;

impl ForeignBridge for NullBridge {
    fn invoke_native(
        &self,
        recv: &Arc<dyn ForeignObject>,
        imp: &ForeignImp,
        _args: Vec<NativeValue>,
    ) -> Result<NativeValue, String> {
        Err(format!("{}#{} is not bridged", recv.class_name(), imp.name))
    }

    fn forwardable(&self, _recv: &Arc<dyn ForeignObject>, _selector: &str) -> Option<Forward> {
        None
    }
}
