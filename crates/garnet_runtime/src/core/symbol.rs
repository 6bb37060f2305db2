//! Process-wide symbol interning.
//!
//! Selectors, instance-variable names and constant names are all symbols; comparing two
//! symbols is an integer compare.

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexSet;
use parking_lot::RwLock;

type Interner = IndexSet<Arc<str>, ahash::RandomState>;

static INTERNER: LazyLock<RwLock<Interner>> =
    LazyLock::new(|| RwLock::new(IndexSet::with_hasher(ahash::RandomState::new())));

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn intern(name: &str) -> Symbol {
        if let Some(idx) = INTERNER.read().get_index_of(name) {
            return Symbol(idx as u32);
        }
        let mut table = INTERNER.write();
        let (idx, _) = table.insert_full(Arc::from(name));
        Symbol(idx as u32)
    }

    pub fn as_str(&self) -> Arc<str> {
        INTERNER
            .read()
            .get_index(self.0 as usize)
            .cloned()
            .unwrap_or_else(|| panic!("symbol {} was never interned", self.0))
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    /// `foo=` style selector.
    pub fn is_setter(&self) -> bool {
        let s = self.as_str();
        s.ends_with('=') && !matches!(&*s, "==" | "!=" | "<=" | ">=" | "===" | "[]=")
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::intern(s)
    }
}
