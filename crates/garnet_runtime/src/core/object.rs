//! Heap objects behind `Value`'s reference variants.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::symbol::Symbol;
use super::value::Value;
use crate::model::ClassRef;

pub type FastIndexMap<K, V> = IndexMap<K, V, ahash::RandomState>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(8);

pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(8, Ordering::Relaxed)
}

pub struct RString {
    buf: RwLock<String>,
}

impl RString {
    pub fn new(s: String) -> Self {
        Self {
            buf: RwLock::new(s),
        }
    }

    pub fn to_string_lossy(&self) -> String {
        self.buf.read().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.buf.read())
    }

    pub fn push_str(&self, s: &str) {
        self.buf.write().push_str(s);
    }

    pub fn replace(&self, s: String) {
        *self.buf.write() = s;
    }

    pub fn len(&self) -> usize {
        self.buf.read().chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.read().is_empty()
    }
}

pub struct RArray {
    items: RwLock<Vec<Value>>,
}

impl RArray {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Negative indices count from the end.
    pub fn get(&self, idx: i64) -> Option<Value> {
        let items = self.items.read();
        let idx = normalize_index(idx, items.len())?;
        items.get(idx).cloned()
    }

    /// Writes past the end pad with nil, up to `MAX_ARRAY_LEN` items.
    pub fn set(&self, idx: i64, value: Value) -> Result<(), BadIndex> {
        let mut items = self.items.write();
        let len = items.len();
        let idx = if idx < 0 {
            normalize_index(idx, len).ok_or(BadIndex::BeforeStart)?
        } else {
            idx as usize
        };
        if idx >= len {
            if idx >= MAX_ARRAY_LEN {
                return Err(BadIndex::TooBig);
            }
            items.resize(idx + 1, Value::Nil);
        }
        items[idx] = value;
        Ok(())
    }

    pub fn push(&self, value: Value) {
        self.items.write().push(value);
    }

    pub fn pop(&self) -> Option<Value> {
        self.items.write().pop()
    }

    pub fn shift(&self) -> Option<Value> {
        let mut items = self.items.write();
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    }

    pub fn unshift(&self, value: Value) {
        self.items.write().insert(0, value);
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }

    pub fn replace(&self, items: Vec<Value>) {
        *self.items.write() = items;
    }

    pub fn extend(&self, more: impl IntoIterator<Item = Value>) {
        self.items.write().extend(more);
    }
}

/// Growth limit for arrays padded or sized from a guest-supplied count.
pub const MAX_ARRAY_LEN: usize = 1 << 28;

/// Why an indexed array write was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadIndex {
    /// Negative index reaching before the first element.
    BeforeStart,
    TooBig,
}

pub(crate) fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    if idx < 0 {
        let back = idx.unsigned_abs() as usize;
        if back > len { None } else { Some(len - back) }
    } else {
        Some(idx as usize)
    }
}

/// Hash-table key with `eql?` semantics: numbers compare by type and value, strings by
/// content, everything else by identity.
#[derive(Clone)]
pub struct HashKey(pub Value);

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_into(state);
    }
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eql(&other.0)
    }
}

impl Eq for HashKey {}

pub struct RHash {
    map: RwLock<FastIndexMap<HashKey, Value>>,
    default: RwLock<Value>,
}

impl RHash {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(FastIndexMap::default()),
            default: RwLock::new(Value::Nil),
        }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let hash = Self::new();
        {
            let mut map = hash.map.write();
            for (k, v) in pairs {
                map.insert(HashKey(k), v);
            }
        }
        hash
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.map.read().get(&HashKey(key.clone())).cloned()
    }

    pub fn insert(&self, key: Value, value: Value) {
        self.map.write().insert(HashKey(key), value);
    }

    pub fn remove(&self, key: &Value) -> Option<Value> {
        self.map.write().shift_remove(&HashKey(key.clone()))
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.map.read().contains_key(&HashKey(key.clone()))
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.map
            .read()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.map.read().keys().map(|k| k.0.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.map.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }

    pub fn default_value(&self) -> Value {
        self.default.read().clone()
    }

    pub fn set_default(&self, value: Value) {
        *self.default.write() = value;
    }
}

impl Default for RHash {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RRange {
    pub lo: Value,
    pub hi: Value,
    pub exclusive: bool,
}

impl RRange {
    /// Integer bounds, `None` when either end is not an Integer.
    pub fn int_bounds(&self) -> Option<(i64, i64)> {
        match (&self.lo, &self.hi) {
            (Value::Int(lo), Value::Int(hi)) => {
                let hi = if self.exclusive { hi - 1 } else { *hi };
                Some((*lo, hi))
            }
            _ => None,
        }
    }
}

pub struct RRegexp {
    pub source: String,
    pub ignore_case: bool,
    pub re: regex::Regex,
}

/// A plain guest object: instances of user classes and exceptions.
pub struct RObject {
    pub(crate) class: ClassRef,
    pub(crate) ivars: RwLock<FastIndexMap<Symbol, Value>>,
    pub(crate) singleton: RwLock<Option<ClassRef>>,
    pub(crate) id: u64,
}

impl RObject {
    pub fn new(class: ClassRef) -> Self {
        Self {
            class,
            ivars: RwLock::new(FastIndexMap::default()),
            singleton: RwLock::new(None),
            id: next_object_id(),
        }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
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
}
