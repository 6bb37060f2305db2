//! Parameter shapes and argument distribution.

use garnet_syntax::DiagnosticKind;

use crate::core::Value;

/// `required` leading positionals, `optional` defaulted ones, an optional rest, then `post`
/// trailing positionals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Arity {
    pub required: usize,
    pub optional: usize,
    pub rest: bool,
    pub post: usize,
}

/// Arguments split per parameter group. `None` marks an optional that was not supplied and
/// must run its default expression.
#[derive(Debug, Default)]
pub struct Distribution {
    pub pre: Vec<Value>,
    pub optional: Vec<Option<Value>>,
    pub rest: Vec<Value>,
    pub post: Vec<Value>,
}

impl Arity {
    pub const fn new(required: usize, optional: usize, rest: bool, post: usize) -> Self {
        Self {
            required,
            optional,
            rest,
            post,
        }
    }

    pub const fn exact(n: usize) -> Self {
        Self::new(n, 0, false, 0)
    }

    pub const fn at_least(n: usize) -> Self {
        Self::new(n, 0, true, 0)
    }

    /// `min..=max` positional arguments. Panics when `max < min`.
    pub const fn range(min: usize, max: usize) -> Self {
        assert!(min <= max, "arity range with max below min");
        Self::new(min, max - min, false, 0)
    }

    pub const fn any() -> Self {
        Self::at_least(0)
    }

    pub fn min(&self) -> usize {
        self.required + self.post
    }

    pub fn max(&self) -> Option<usize> {
        if self.rest {
            None
        } else {
            Some(self.required + self.optional + self.post)
        }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min() && self.max().is_none_or(|m| n <= m)
    }

    /// Number of named positional slots.
    pub fn positional(&self) -> usize {
        self.required + self.optional + self.post
    }

    /// Integer reported by `Method#arity` / `Proc#arity`.
    pub fn guest_arity(&self) -> i64 {
        if self.optional > 0 || self.rest {
            -(self.min() as i64) - 1
        } else {
            self.min() as i64
        }
    }

    pub fn check(&self, given: usize) -> Result<(), DiagnosticKind> {
        if self.accepts(given) {
            Ok(())
        } else {
            Err(DiagnosticKind::ArgumentCount {
                given,
                expected_min: self.min(),
                expected_max: self.max(),
            })
        }
    }

    /// Whether a proc with this shape spreads a single array argument over its parameters.
    pub fn auto_splats(&self) -> bool {
        self.positional() > 1 || (self.rest && self.positional() > 0)
    }

    /// Pads with nil or truncates so the count fits. Returns true when anything changed.
    pub fn adjust(&self, args: &mut Vec<Value>) -> bool {
        if args.len() < self.min() {
            args.resize(self.min(), Value::Nil);
            return true;
        }
        match self.max() {
            Some(max) if args.len() > max => {
                args.truncate(max);
                true
            }
            _ => false,
        }
    }

    /// Distributes an accepted argument list. Optionals are filled left to right with
    /// whatever remains after the required and post slots are satisfied.
    pub fn distribute(&self, args: &[Value]) -> Distribution {
        debug_assert!(self.accepts(args.len()));
        let n = args.len();
        let pre_end = self.required.min(n);
        let post_start = n.saturating_sub(self.post).max(pre_end);
        let middle = &args[pre_end..post_start];
        let filled = middle.len().min(self.optional);

        let mut optional: Vec<Option<Value>> = middle[..filled].iter().cloned().map(Some).collect();
        optional.resize(self.optional, None);

        Distribution {
            pre: args[..pre_end].to_vec(),
            optional,
            rest: if self.rest {
                middle[filled..].to_vec()
            } else {
                Vec::new()
            },
            post: args[post_start..].to_vec(),
        }
    }
}
