//! Value representation: immediates, heap objects and interned symbols.

pub mod object;
pub mod symbol;
pub mod value;

pub use object::{
    BadIndex, FastIndexMap, HashKey, MAX_ARRAY_LEN, RArray, RHash, RObject, RRange, RRegexp, RString,
};
pub use symbol::Symbol;
pub use value::Value;

pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
pub type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;
