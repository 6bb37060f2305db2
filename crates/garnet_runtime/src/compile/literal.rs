use std::sync::Arc;

use garnet_ir::Node;
use garnet_syntax::DiagnosticKind;

use super::{Compiler, value_code};
use crate::builtins::conversion;
use crate::core::{RRange, RRegexp, Symbol, Value};
use crate::runtime::exception::Exc;
use crate::runtime::unit::Code;

impl Compiler {
    pub(super) fn compile_str(&mut self, s: &str) -> Code {
        let s: Arc<str> = Arc::from(s);
        // Each evaluation yields a fresh, mutable string.
        Box::new(move |_, _| Ok(Value::str(&*s)))
    }

    pub(super) fn compile_dstr(&mut self, parts: &[Node]) -> Code {
        let parts: Vec<Code> = parts.iter().map(|p| self.compile(p)).collect();
        Box::new(move |rt, frame| {
            let mut out = String::new();
            for part in &parts {
                let v = part(rt, frame)?;
                match &v {
                    Value::Str(s) => s.with(|x| out.push_str(x)),
                    other => out.push_str(&conversion::to_s(rt, other)?),
                }
            }
            Ok(Value::str(out))
        })
    }

    pub(super) fn compile_array(&mut self, items: &[Node]) -> Code {
        let items: Vec<(bool, Code)> = items
            .iter()
            .map(|n| match n {
                Node::Splat(inner) => (true, self.compile(inner)),
                other => (false, self.compile(other)),
            })
            .collect();
        Box::new(move |rt, frame| {
            let mut out = Vec::with_capacity(items.len());
            for (splat, code) in &items {
                let v = code(rt, frame)?;
                if *splat {
                    out.extend(rt.splat_items(&v)?);
                } else {
                    out.push(v);
                }
            }
            Ok(Value::array(out))
        })
    }

    pub(super) fn compile_hash(&mut self, pairs: &[(Node, Node)]) -> Code {
        let pairs: Vec<(Code, Code)> = pairs
            .iter()
            .map(|(k, v)| (self.compile(k), self.compile(v)))
            .collect();
        Box::new(move |rt, frame| {
            let mut out = Vec::with_capacity(pairs.len());
            for (k, v) in &pairs {
                let key = k(rt, frame)?;
                // String keys are copied so later mutation of the original does not rehash.
                let key = match key {
                    Value::Str(s) => Value::str(s.to_string_lossy()),
                    other => other,
                };
                out.push((key, v(rt, frame)?));
            }
            Ok(Value::hash(out))
        })
    }

    pub(super) fn compile_range(&mut self, lo: &Node, hi: &Node, exclusive: bool) -> Code {
        let lo = self.compile(lo);
        let hi = self.compile(hi);
        Box::new(move |rt, frame| {
            let lo = lo(rt, frame)?;
            let hi = hi(rt, frame)?;
            let ok = matches!(
                (&lo, &hi),
                (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_))
                    | (Value::Str(_), Value::Str(_))
                    | (Value::Nil, _)
                    | (_, Value::Nil)
            ) || rt.responds_to(&lo, Symbol::intern("<=>"), true);
            if !ok {
                return Err(rt.error_msg(Exc::Argument, "bad value for range"));
            }
            Ok(Value::Range(Arc::new(RRange { lo, hi, exclusive })))
        })
    }

    pub(super) fn compile_regexp(&mut self, source: &str, ignore_case: bool) -> Code {
        match regex::RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .build()
        {
            Ok(re) => value_code(Value::Regexp(Arc::new(RRegexp {
                source: source.to_string(),
                ignore_case,
                re,
            }))),
            Err(err) => {
                let message = err.to_string();
                Box::new(move |rt, _| {
                    Err(rt.error(Exc::Regexp, DiagnosticKind::InvalidRegexp(message.clone())))
                })
            }
        }
    }
}
