//! String, Symbol and Regexp, and the `to_s`/`inspect` forms of every core value.

use std::cell::RefCell;
use std::sync::Arc;

use garnet_syntax::DiagnosticKind;

use super::common::{conversion_error, int_arg, need_block, opt, pick, str_arg};
use super::math::num_eq;
use crate::builtins_registry::BuiltinRegistry;
use crate::core::{RRegexp, RString, Symbol, Value};
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;

thread_local! {
    /// Containers whose `inspect` is in progress, to print `[...]` for cycles.
    static INSPECTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct CycleGuard(usize);

impl CycleGuard {
    fn enter(addr: usize) -> Option<CycleGuard> {
        INSPECTING.with(|s| {
            let mut s = s.borrow_mut();
            if s.contains(&addr) {
                None
            } else {
                s.push(addr);
                Some(CycleGuard(addr))
            }
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        INSPECTING.with(|s| s.borrow_mut().retain(|a| *a != self.0));
    }
}

/// Float text as the guest prints it: `1.0`, `0.0001`, `1.0e+20`, `1.0e-05`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    let sign = if f.is_sign_negative() { "-" } else { "" };
    if f == 0.0 {
        return format!("{sign}0.0");
    }
    let mut buf = ryu::Buffer::new();
    let text = buf.format_finite(f.abs());
    let (mantissa, exp) = match text.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (text, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all = format!("{int_part}{frac_part}");
    let trimmed = all.trim_start_matches('0');
    let point = int_part.len() as i32 + exp - (all.len() - trimmed.len()) as i32;
    let digits = trimmed.trim_end_matches('0');
    if digits.is_empty() {
        return format!("{sign}0.0");
    }
    let e = point - 1;
    if !(-4..16).contains(&e) {
        let (first, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { "0" } else { rest };
        let esign = if e < 0 { '-' } else { '+' };
        return format!("{sign}{first}.{rest}e{esign}{:02}", e.abs());
    }
    if point <= 0 {
        let zeros = "0".repeat((-point) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }
    let len = digits.len() as i32;
    if point >= len {
        let zeros = "0".repeat((point - len) as usize);
        return format!("{sign}{digits}{zeros}.0");
    }
    let split = point as usize;
    format!("{sign}{}.{}", &digits[..split], &digits[split..])
}

fn format_int(i: i64) -> String {
    let mut buf = itoa::Buffer::new();
    buf.format(i).to_string()
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            '\0' => out.push_str("\\0"),
            '#' if matches!(chars.peek(), Some(&('{' | '$' | '@'))) => out.push_str("\\#"),
            c if c.is_control() => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `:name` needs no quotes.
fn plain_symbol(name: &str) -> bool {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>", "===", "=~", "!",
        "[]", "[]=", "<<", ">>", "&", "|", "^", "~", "+@", "-@",
    ];
    if OPERATORS.contains(&name) {
        return true;
    }
    let body = name
        .strip_prefix("@@")
        .or_else(|| name.strip_prefix('@'))
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    let body = body
        .strip_suffix('?')
        .or_else(|| body.strip_suffix('!'))
        .or_else(|| body.strip_suffix('='))
        .unwrap_or(body);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn symbol_inspect(sym: Symbol) -> String {
    let name = sym.as_str();
    if plain_symbol(&name) {
        format!(":{name}")
    } else {
        format!(":{}", escape_str(&name))
    }
}

fn regexp_inspect(re: &RRegexp) -> String {
    let flags = if re.ignore_case { "i" } else { "" };
    format!("/{}/{flags}", re.source)
}

fn identity_form(rt: &Runtime, value: &Value) -> String {
    if value.identical(&rt.vm.main_obj) {
        return "main".into();
    }
    let class = rt.vm.model.real_class_of(value).name();
    format!("#<{class}>")
}

/// Text of `value` where the core library defines it.
fn native_to_s(rt: &mut Runtime, value: &Value) -> Result<String, Flow> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => format_int(*i),
        Value::Float(f) => format_float(*f),
        Value::Sym(s) => s.as_str().to_string(),
        Value::Str(s) => s.to_string_lossy(),
        Value::Class(c) => c.name(),
        Value::Range(r) => {
            let dots = if r.exclusive { "..." } else { ".." };
            format!("{}{dots}{}", to_s(rt, &r.lo)?, to_s(rt, &r.hi)?)
        }
        Value::Regexp(re) => {
            let flags = if re.ignore_case { "i-mx" } else { "-mix" };
            format!("(?{flags}:{})", re.source)
        }
        Value::Array(_) | Value::Hash(_) => native_inspect(rt, value)?,
        Value::Object(_) if rt.is_exception(value) => rt.exception_message(value),
        other => native_inspect(rt, other)?,
    })
}

/// `inspect` where the core library defines it.
fn native_inspect(rt: &mut Runtime, value: &Value) -> Result<String, Flow> {
    Ok(match value {
        Value::Nil => "nil".into(),
        Value::Str(s) => s.with(escape_str),
        Value::Sym(s) => symbol_inspect(*s),
        Value::Regexp(re) => regexp_inspect(re),
        Value::Range(r) => {
            let dots = if r.exclusive { "..." } else { ".." };
            let hi = if r.hi.is_nil() {
                String::new()
            } else {
                inspect(rt, &r.hi)?
            };
            format!("{}{dots}{hi}", inspect(rt, &r.lo)?)
        }
        Value::Array(a) => {
            let Some(_guard) = CycleGuard::enter(Arc::as_ptr(a) as usize) else {
                return Ok("[...]".into());
            };
            let mut parts = Vec::with_capacity(a.len());
            for item in a.to_vec() {
                parts.push(inspect(rt, &item)?);
            }
            format!("[{}]", parts.join(", "))
        }
        Value::Hash(h) => {
            let Some(_guard) = CycleGuard::enter(Arc::as_ptr(h) as usize) else {
                return Ok("{...}".into());
            };
            let mut parts = Vec::with_capacity(h.len());
            for (k, v) in h.pairs() {
                parts.push(format!("{}=>{}", inspect(rt, &k)?, inspect(rt, &v)?));
            }
            format!("{{{}}}", parts.join(", "))
        }
        Value::Object(o) => {
            if value.identical(&rt.vm.main_obj) {
                return Ok("main".into());
            }
            if rt.is_exception(value) {
                let message = rt.exception_message(value);
                return Ok(format!("#<{}: {message}>", o.class().name()));
            }
            let names = o.ivar_names();
            if names.is_empty() {
                return Ok(identity_form(rt, value));
            }
            let Some(_guard) = CycleGuard::enter(Arc::as_ptr(o) as usize) else {
                return Ok(format!("#<{} ...>", o.class().name()));
            };
            let mut parts = Vec::with_capacity(names.len());
            for name in names {
                let v = o.ivar_get(name).unwrap_or_default();
                parts.push(format!("{name}={}", inspect(rt, &v)?));
            }
            format!("#<{} {}>", o.class().name(), parts.join(", "))
        }
        Value::Proc(b) => {
            let lambda = if b.is_lambda() { " (lambda)" } else { "" };
            format!("#<Proc:{:#x}{lambda}>", b.id())
        }
        Value::Thread(t) => {
            let status = format!("{:?}", t.status()).to_lowercase();
            format!("#<Thread:{:#x} {status}>", t.id())
        }
        Value::Foreign(f) => format!("#<{}>", f.class_name()),
        Value::Binding(_) => "#<Binding>".into(),
        other => native_to_s(rt, other)?,
    })
}

/// `to_s` of a value, honoring guest overrides.
pub(crate) fn to_s(rt: &mut Runtime, value: &Value) -> Result<String, Flow> {
    if let Value::Str(s) = value {
        return Ok(s.to_string_lossy());
    }
    let sel = Symbol::intern("to_s");
    if rt.method_is_native(value, sel) {
        return native_to_s(rt, value);
    }
    match rt.call_method(value, sel, Vec::new(), None, CallKind::FCall)? {
        Value::Str(s) => Ok(s.to_string_lossy()),
        _ => Ok(identity_form(rt, value)),
    }
}

/// `inspect` of a value, honoring guest overrides.
pub(crate) fn inspect(rt: &mut Runtime, value: &Value) -> Result<String, Flow> {
    let sel = Symbol::intern("inspect");
    if rt.method_is_native(value, sel) {
        return native_inspect(rt, value);
    }
    match rt.call_method(value, sel, Vec::new(), None, CallKind::FCall)? {
        Value::Str(s) => Ok(s.to_string_lossy()),
        other => to_s(rt, &other),
    }
}

/// `"az".succ == "ba"`, `"zz".succ == "aaa"`, `"a9".succ == "b0"`.
pub(crate) fn str_succ(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    let Some(last) = chars.len().checked_sub(1) else {
        return String::new();
    };
    if !chars.iter().any(char::is_ascii_alphanumeric) {
        chars[last] = char::from_u32(chars[last] as u32 + 1).unwrap_or(chars[last]);
        return chars.into_iter().collect();
    }
    let mut leftmost = last;
    for i in (0..chars.len()).rev() {
        let c = chars[i];
        if !c.is_ascii_alphanumeric() {
            continue;
        }
        leftmost = i;
        let (next, carry) = match c {
            'z' => ('a', true),
            'Z' => ('A', true),
            '9' => ('0', true),
            c => ((c as u8 + 1) as char, false),
        };
        chars[i] = next;
        if !carry {
            return chars.into_iter().collect();
        }
    }
    let lead = match chars[leftmost] {
        '0' => '1',
        other => other,
    };
    chars.insert(leftmost, lead);
    chars.into_iter().collect()
}

/// Leading integer of `s`, as `String#to_i` reads it.
fn parse_int_prefix(s: &str, base: u32) -> i64 {
    let t = s.trim_start();
    let (neg, digits) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let mut value: i64 = 0;
    for c in digits.chars().filter(|c| *c != '_') {
        let Some(d) = c.to_digit(base) else {
            break;
        };
        value = value.saturating_mul(base as i64).saturating_add(d as i64);
    }
    if neg { -value } else { value }
}

fn parse_float_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = t.as_bytes();
    while end < bytes.len() {
        let b = bytes[end];
        let ok = b.is_ascii_digit()
            || ((b == b'-' || b == b'+') && (end == 0 || matches!(bytes[end - 1], b'e' | b'E')))
            || (b == b'.' && !seen_dot && !seen_exp)
            || ((b == b'e' || b == b'E') && !seen_exp && end > 0);
        if !ok {
            break;
        }
        seen_dot |= b == b'.';
        seen_exp |= b == b'e' || b == b'E';
        end += 1;
    }
    let mut candidate = &t[..end];
    while !candidate.is_empty() {
        if let Ok(f) = candidate.parse::<f64>() {
            return f;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    0.0
}

fn set_last_match(rt: &mut Runtime, caps: Option<&regex::Captures<'_>>) {
    rt.thread.last_match = caps.map(|c| {
        c.iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect()
    });
}

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

/// Ruby replacement text (`\1`, `\0`, `\\`) in the regex crate's `${n}` syntax.
fn expand_replacement(rep: &str) -> String {
    let mut out = String::with_capacity(rep.len());
    let mut chars = rep.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('\\', Some(d)) if d.is_ascii_digit() => {
                chars.next();
                out.push_str(&format!("${{{d}}}"));
            }
            ('\\', Some('\\')) => {
                chars.next();
                out.push('\\');
            }
            ('$', _) => out.push_str("$$"),
            (c, _) => out.push(c),
        }
    }
    out
}

fn regexp_arg(rt: &mut Runtime, pattern: &Value) -> Result<Arc<RRegexp>, Flow> {
    match pattern {
        Value::Regexp(re) => Ok(re.clone()),
        Value::Str(s) => build_regexp(rt, &regex::escape(&s.to_string_lossy()), false),
        other => Err(conversion_error(rt, other, "Regexp")),
    }
}

fn build_regexp(rt: &mut Runtime, source: &str, ignore_case: bool) -> Result<Arc<RRegexp>, Flow> {
    match regex::RegexBuilder::new(source).case_insensitive(ignore_case).build() {
        Ok(re) => Ok(Arc::new(RRegexp {
            source: source.to_string(),
            ignore_case,
            re,
        })),
        Err(err) => Err(rt.error(Exc::Regexp, DiagnosticKind::InvalidRegexp(err.to_string()))),
    }
}

fn string_of<'a>(rt: &mut Runtime, v: &'a Value) -> Result<&'a Arc<RString>, Flow> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(conversion_error(rt, other, "String")),
    }
}

fn text(rt: &mut Runtime, v: &Value) -> Result<String, Flow> {
    Ok(string_of(rt, v)?.to_string_lossy())
}

// --- Kernel -----------------------------------------------------------------------------

fn obj_to_s(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::str(native_to_s(rt, recv)?))
}

fn obj_inspect(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::str(native_inspect(rt, recv)?))
}

fn kernel_string(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::str(to_s(rt, &args[0])?))
}

fn kernel_integer(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(s) => {
            let t = s.to_string_lossy();
            let clean = t.trim().replace('_', "");
            let parsed = match clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16).ok(),
                None => clean.parse::<i64>().ok(),
            };
            match parsed {
                Some(i) => Ok(Value::Int(i)),
                None => Err(rt.error_msg(
                    Exc::Argument,
                    format!("invalid value for Integer(): {}", escape_str(&t)),
                )),
            }
        }
        Value::Nil => Err(rt.error_msg(Exc::Type, "can't convert nil into Integer")),
        other => Err(conversion_error(rt, other, "Integer")),
    }
}

fn kernel_float(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => {
            let t = s.to_string_lossy();
            match t.trim().replace('_', "").parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Err(rt.error_msg(
                    Exc::Argument,
                    format!("invalid value for Float(): {}", escape_str(&t)),
                )),
            }
        }
        Value::Nil => Err(rt.error_msg(Exc::Type, "can't convert nil into Float")),
        other => Err(conversion_error(rt, other, "Float")),
    }
}

fn kernel_array(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(match &args[0] {
        Value::Nil => Value::array(Vec::new()),
        Value::Array(_) => args[0].clone(),
        other => Value::array(rt.splat_items(other)?),
    })
}

// --- numbers, nil, booleans -------------------------------------------------------------

fn int_to_s(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let i = recv.as_int().unwrap_or(0);
    let base = match args.first() {
        Some(b) => int_arg(rt, b)?,
        None => 10,
    };
    if base == 10 {
        return Ok(Value::str(format_int(i)));
    }
    if !(2..=36).contains(&base) {
        return Err(rt.error_msg(Exc::Argument, format!("invalid radix {base}")));
    }
    let mut n = i.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        let d = (n % base as u64) as u32;
        digits.push(char::from_digit(d, base as u32).unwrap_or('?'));
        n /= base as u64;
        if n == 0 {
            break;
        }
    }
    if i < 0 {
        digits.push('-');
    }
    Ok(Value::str(digits.into_iter().rev().collect::<String>()))
}

fn int_chr(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let i = recv.as_int().unwrap_or(0);
    match u32::try_from(i).ok().and_then(char::from_u32) {
        Some(c) => Ok(Value::str(c.to_string())),
        None => Err(rt.error_msg(Exc::Range, format!("{i} out of char range"))),
    }
}

fn nil_to_a(_rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(Vec::new()))
}

// --- String -----------------------------------------------------------------------------

fn str_s_new(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match args.first() {
        Some(v) => Ok(Value::str(text(rt, v)?)),
        None => Ok(Value::str("")),
    }
}

fn str_plus(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut s = text(rt, recv)?;
    let other = match &args[0] {
        Value::Str(o) => o.to_string_lossy(),
        other => return Err(conversion_error(rt, other, "String")),
    };
    s.push_str(&other);
    Ok(Value::str(s))
}

fn str_times(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let n = int_arg(rt, &args[0])?;
    if n < 0 {
        return Err(rt.error_msg(Exc::Argument, "negative argument"));
    }
    Ok(Value::str(text(rt, recv)?.repeat(n as usize)))
}

fn str_append(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = string_of(rt, recv)?.clone();
    for arg in args {
        let add = match arg {
            Value::Str(o) => o.to_string_lossy(),
            Value::Int(i) => match u32::try_from(*i).ok().and_then(char::from_u32) {
                Some(c) => c.to_string(),
                None => return Err(rt.error_msg(Exc::Range, format!("{i} out of char range"))),
            },
            other => return Err(conversion_error(rt, other, "String")),
        };
        s.push_str(&add);
    }
    Ok(recv.clone())
}

fn str_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = string_of(rt, recv)?;
    Ok(Value::Bool(match &args[0] {
        Value::Str(b) => Arc::ptr_eq(a, b) || a.to_string_lossy() == b.to_string_lossy(),
        _ => false,
    }))
}

fn str_cmp(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = string_of(rt, recv)?;
    Ok(match &args[0] {
        Value::Str(b) => Value::Int(a.to_string_lossy().cmp(&b.to_string_lossy()) as i64),
        _ => Value::Nil,
    })
}

fn str_len(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Int(string_of(rt, recv)?.len() as i64))
}

fn str_empty(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(string_of(rt, recv)?.is_empty()))
}

macro_rules! str_maps {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
                let f: fn(&str) -> String = $f;
                Ok(Value::str(string_of(rt, recv)?.with(f)))
            }
        )*
    };
}

str_maps!(
    str_upcase => |s| s.to_uppercase(),
    str_downcase => |s| s.to_lowercase(),
    str_swapcase => |s| s
        .chars()
        .map(|c| if c.is_uppercase() { c.to_lowercase().collect::<String>() } else { c.to_uppercase().collect() })
        .collect(),
    str_capitalize => |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    },
    str_reverse => |s| s.chars().rev().collect(),
    str_strip => |s| s.trim().to_string(),
    str_lstrip => |s| s.trim_start().to_string(),
    str_rstrip => |s| s.trim_end().to_string(),
    str_succ_native => str_succ,
);

fn str_chomp(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let out = match args.first() {
        Some(v) => {
            let suffix = text(rt, v)?;
            s.strip_suffix(suffix.as_str()).map(str::to_string).unwrap_or(s)
        }
        None => s
            .strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .or_else(|| s.strip_suffix('\r'))
            .map(str::to_string)
            .unwrap_or_else(|| s.clone()),
    };
    Ok(Value::str(out))
}

fn str_chars(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    Ok(Value::array(s.chars().map(|c| Value::str(c.to_string())).collect()))
}

fn str_bytes(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    Ok(Value::array(s.bytes().map(|b| Value::Int(b as i64)).collect()))
}

fn str_each_char(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    for c in text(rt, recv)?.chars() {
        rt.call_block(&block, vec![Value::str(c.to_string())])?;
    }
    Ok(recv.clone())
}

fn str_split(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let mut parts: Vec<String> = match args.first() {
        None | Some(Value::Nil) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Str(sep)) => {
            let sep = sep.to_string_lossy();
            if sep == " " {
                s.split_whitespace().map(str::to_string).collect()
            } else if sep.is_empty() {
                s.chars().map(|c| c.to_string()).collect()
            } else {
                s.split(sep.as_str()).map(str::to_string).collect()
            }
        }
        Some(Value::Regexp(re)) => re.re.split(&s).map(str::to_string).collect(),
        Some(other) => return Err(conversion_error(rt, other, "String")),
    };
    while parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    Ok(Value::array(parts.into_iter().map(Value::str).collect()))
}

fn str_include(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let needle = text(rt, &args[0])?;
    Ok(Value::Bool(s.contains(needle.as_str())))
}

fn str_start_with(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    for prefix in args {
        let hit = match prefix {
            Value::Regexp(re) => re.re.find(&s).is_some_and(|m| m.start() == 0),
            other => s.starts_with(text(rt, other)?.as_str()),
        };
        if hit {
            return Ok(Value::TRUE);
        }
    }
    Ok(Value::FALSE)
}

fn str_end_with(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    for suffix in args {
        if s.ends_with(text(rt, suffix)?.as_str()) {
            return Ok(Value::TRUE);
        }
    }
    Ok(Value::FALSE)
}

fn str_index(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let found = match &args[0] {
        Value::Regexp(re) => re.re.find(&s).map(|m| m.start()),
        other => {
            let needle = text(rt, other)?;
            s.find(needle.as_str())
        }
    };
    Ok(found.map_or(Value::Nil, |b| Value::Int(char_index(&s, b))))
}

fn str_aref(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let pick = |from: usize, to: usize| Value::str(chars[from..to].iter().collect::<String>());
    match args {
        [Value::Int(i)] => Ok(crate::core::object::normalize_index(*i, len)
            .filter(|i| *i < len)
            .map_or(Value::Nil, |i| pick(i, i + 1))),
        [Value::Int(start), count] => {
            let count = int_arg(rt, count)?;
            match crate::core::object::normalize_index(*start, len) {
                Some(from) if from <= len && count >= 0 => {
                    Ok(pick(from, from.saturating_add(count as usize).min(len)))
                }
                _ => Ok(Value::Nil),
            }
        }
        [Value::Range(r)] => {
            let (Value::Int(lo), hi) = (&r.lo, &r.hi) else {
                return Ok(Value::Nil);
            };
            let hi = match hi {
                Value::Int(h) => *h,
                _ => -1,
            };
            let Some(from) = crate::core::object::normalize_index(*lo, len).filter(|f| *f <= len) else {
                return Ok(Value::Nil);
            };
            let mut to = if hi < 0 { len as i64 + hi } else { hi };
            if !r.exclusive || r.hi.is_nil() {
                to += 1;
            }
            let to = (to.max(from as i64) as usize).min(len);
            Ok(pick(from, to))
        }
        [Value::Str(needle)] => {
            let needle = needle.to_string_lossy();
            Ok(if s.contains(needle.as_str()) { Value::str(needle) } else { Value::Nil })
        }
        [Value::Regexp(re)] => {
            let caps = re.re.captures(&s);
            let out = caps
                .as_ref()
                .and_then(|c| c.get(0))
                .map_or(Value::Nil, |m| Value::str(m.as_str()));
            set_last_match(rt, caps.as_ref());
            Ok(out)
        }
        [other, ..] => Err(conversion_error(rt, other, "Integer")),
        [] => Ok(Value::Nil),
    }
}

fn str_to_sym(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Sym(string_of(rt, recv)?.with(Symbol::intern)))
}

fn str_to_i(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let base = match args.first() {
        Some(b) => int_arg(rt, b)?,
        None => 10,
    };
    if !(2..=36).contains(&base) {
        return Err(rt.error_msg(Exc::Argument, format!("invalid radix {base}")));
    }
    Ok(Value::Int(string_of(rt, recv)?.with(|s| parse_int_prefix(s, base as u32))))
}

fn str_to_f(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Float(string_of(rt, recv)?.with(parse_float_prefix)))
}

fn str_dup(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::str(text(rt, recv)?))
}

fn str_replace(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let new = text(rt, &args[0])?;
    string_of(rt, recv)?.replace(new);
    Ok(recv.clone())
}

fn str_ord(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match text(rt, recv)?.chars().next() {
        Some(c) => Ok(Value::Int(c as i64)),
        None => Err(rt.error_msg(Exc::Argument, "empty string")),
    }
}

fn pad(rt: &mut Runtime, recv: &Value, args: &[Value], left: bool, right: bool) -> Eval {
    let s = text(rt, recv)?;
    let width = int_arg(rt, &args[0])?.max(0) as usize;
    let fill = match args.get(1) {
        Some(v) => text(rt, v)?,
        None => " ".into(),
    };
    if fill.is_empty() {
        return Err(rt.error_msg(Exc::Argument, "zero width padding"));
    }
    let len = s.chars().count();
    if width <= len {
        return Ok(Value::str(s));
    }
    let total = width - len;
    let (before, after) = match (left, right) {
        (true, true) => (total / 2, total - total / 2),
        (true, false) => (total, 0),
        _ => (0, total),
    };
    let filler = |n: usize| fill.chars().cycle().take(n).collect::<String>();
    Ok(Value::str(format!("{}{s}{}", filler(before), filler(after))))
}

fn str_center(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    pad(rt, recv, args, true, true)
}

fn str_ljust(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    pad(rt, recv, args, false, true)
}

fn str_rjust(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    pad(rt, recv, args, true, false)
}

fn str_match_op(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    match &args[0] {
        Value::Regexp(re) => Ok(regexp_match_at(rt, re, &s)),
        Value::Str(_) => Err(rt.error_msg(Exc::Type, "wrong argument type String (expected Regexp)")),
        other => rt.call_method(other, Symbol::intern("=~"), vec![recv.clone()], None, CallKind::Public),
    }
}

fn str_match_p(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = text(rt, recv)?;
    let re = regexp_arg(rt, &args[0])?;
    Ok(Value::Bool(re.re.is_match(&s)))
}

/// `sub`/`gsub`: a replacement string with `\n` references, or a block per match.
fn substitute(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>, all: bool) -> Eval {
    let s = text(rt, recv)?;
    let re = regexp_arg(rt, &args[0])?;
    let limit = if all { usize::MAX } else { 1 };
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.re.captures_iter(&s).take(limit) {
        let Some(m) = caps.get(0) else {
            continue;
        };
        out.push_str(&s[last..m.start()]);
        match (args.get(1), block) {
            (Some(rep), _) => {
                let rep = match rep {
                    Value::Hash(h) => to_s(rt, &h.get(&Value::str(m.as_str())).unwrap_or_default())?,
                    other => expand_replacement(&text(rt, other)?),
                };
                if matches!(args.get(1), Some(Value::Hash(_))) {
                    out.push_str(&rep);
                } else {
                    caps.expand(&rep, &mut out);
                }
            }
            (None, Some(b)) => {
                set_last_match(rt, Some(&caps));
                let v = rt.call_block(b, vec![Value::str(m.as_str())])?;
                out.push_str(&to_s(rt, &v)?);
            }
            (None, None) => {
                return Err(rt.error(
                    Exc::Argument,
                    DiagnosticKind::ArgumentCount {
                        given: 1,
                        expected_min: 2,
                        expected_max: Some(2),
                    },
                ));
            }
        }
        last = m.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::str(out))
}

fn str_sub(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    substitute(rt, recv, args, block, false)
}

fn str_gsub(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    substitute(rt, recv, args, block, true)
}

fn str_sub_bang(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let new = substitute(rt, recv, args, block, false)?;
    str_replace(rt, recv, &[new], None)
}

fn str_gsub_bang(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let new = substitute(rt, recv, args, block, true)?;
    str_replace(rt, recv, &[new], None)
}

// --- Symbol -----------------------------------------------------------------------------

fn sym_to_s(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(recv.as_sym().map_or(Value::Nil, |s| Value::str(&*s.as_str())))
}

fn sym_to_sym(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(recv.clone())
}

fn sym_to_proc(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let Some(sel) = recv.as_sym() else {
        return Ok(Value::Nil);
    };
    let home = rt.thread.homes.last().copied().unwrap_or(0);
    let main = rt.vm.main_obj.clone();
    let block = rt.symbol_block(sel, main, home);
    Ok(rt.reify_block(&block))
}

fn sym_len(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Int(recv.as_sym().map_or(0, |s| s.as_str().chars().count() as i64)))
}

fn sym_cmp(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(match (recv, &args[0]) {
        (Value::Sym(a), Value::Sym(b)) => Value::Int(a.as_str().cmp(&b.as_str()) as i64),
        _ => Value::Nil,
    })
}

// --- Regexp -----------------------------------------------------------------------------

fn regexp_match_at(rt: &mut Runtime, re: &RRegexp, s: &str) -> Value {
    let caps = re.re.captures(s);
    let at = caps
        .as_ref()
        .and_then(|c| c.get(0))
        .map_or(Value::Nil, |m| Value::Int(char_index(s, m.start())));
    set_last_match(rt, caps.as_ref());
    at
}

fn regexp_of<'a>(rt: &mut Runtime, v: &'a Value) -> Result<&'a Arc<RRegexp>, Flow> {
    match v {
        Value::Regexp(re) => Ok(re),
        other => Err(conversion_error(rt, other, "Regexp")),
    }
}

fn regexp_s_new(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    if let Value::Regexp(re) = &args[0] {
        return Ok(Value::Regexp(re.clone()));
    }
    let source = str_arg(rt, &args[0])?;
    let ignore_case = opt(args, 1).truthy();
    Ok(Value::Regexp(build_regexp(rt, &source, ignore_case)?))
}

fn regexp_escape(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let s = str_arg(rt, &args[0])?;
    Ok(Value::str(regex::escape(&s)))
}

fn regexp_match_op(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let re = regexp_of(rt, recv)?.clone();
    match &args[0] {
        Value::Nil => {
            rt.thread.last_match = None;
            Ok(Value::Nil)
        }
        other => {
            let s = text(rt, other)?;
            Ok(regexp_match_at(rt, &re, &s))
        }
    }
}

fn regexp_eqq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let re = regexp_of(rt, recv)?.clone();
    let s = match &args[0] {
        Value::Str(s) => s.to_string_lossy(),
        Value::Sym(s) => s.as_str().to_string(),
        _ => return Ok(Value::FALSE),
    };
    Ok(Value::Bool(!regexp_match_at(rt, &re, &s).is_nil()))
}

fn regexp_match_p(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let re = regexp_of(rt, recv)?.clone();
    match &args[0] {
        Value::Nil => Ok(Value::FALSE),
        other => {
            let s = text(rt, other)?;
            Ok(Value::Bool(re.re.is_match(&s)))
        }
    }
}

/// `match`: the groups of the first match as an array (whole match first), or nil.
fn regexp_match(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let re = regexp_of(rt, recv)?.clone();
    let s = text(rt, &args[0])?;
    let caps = re.re.captures(&s);
    let groups = caps.as_ref().map(|c| {
        Value::array(
            c.iter()
                .map(|m| m.map_or(Value::Nil, |m| Value::str(m.as_str())))
                .collect(),
        )
    });
    set_last_match(rt, caps.as_ref());
    Ok(groups.unwrap_or(Value::Nil))
}

fn regexp_source(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::str(regexp_of(rt, recv)?.source.clone()))
}

fn regexp_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let re = regexp_of(rt, recv)?;
    Ok(Value::Bool(match &args[0] {
        Value::Regexp(o) => o.source == re.source && o.ignore_case == re.ignore_case,
        _ => false,
    }))
}

fn num_eql(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let same_type = matches!(
        (recv, &args[0]),
        (Value::Int(_), Value::Int(_)) | (Value::Float(_), Value::Float(_))
    );
    Ok(Value::Bool(same_type && num_eq(recv, &args[0])))
}

pub(crate) fn install(r: &mut BuiltinRegistry) {
    r.register(pick::kernel, "to_s", Arity::exact(0), obj_to_s);
    r.register(pick::kernel, "inspect", Arity::exact(0), obj_inspect);
    r.register_private(pick::kernel, "String", Arity::exact(1), kernel_string);
    r.register_private(pick::kernel, "Integer", Arity::exact(1), kernel_integer);
    r.register_private(pick::kernel, "Float", Arity::exact(1), kernel_float);
    r.register_private(pick::kernel, "Array", Arity::exact(1), kernel_array);

    r.register(pick::integer, "to_s", Arity::range(0, 1), int_to_s);
    r.register(pick::integer, "inspect", Arity::exact(0), int_to_s);
    r.register(pick::integer, "chr", Arity::exact(0), int_chr);
    r.register(pick::integer, "eql?", Arity::exact(1), num_eql);
    r.register(pick::float, "eql?", Arity::exact(1), num_eql);
    r.register(pick::nil, "to_a", Arity::exact(0), nil_to_a);

    r.register_singleton(pick::string, "new", Arity::range(0, 1), str_s_new);
    r.register(pick::string, "+", Arity::exact(1), str_plus);
    r.register(pick::string, "*", Arity::exact(1), str_times);
    r.register(pick::string, "<<", Arity::exact(1), str_append);
    r.register(pick::string, "concat", Arity::any(), str_append);
    r.register(pick::string, "==", Arity::exact(1), str_eq);
    r.register(pick::string, "eql?", Arity::exact(1), str_eq);
    r.register(pick::string, "===", Arity::exact(1), str_eq);
    r.register(pick::string, "<=>", Arity::exact(1), str_cmp);
    r.register(pick::string, "length", Arity::exact(0), str_len);
    r.register(pick::string, "size", Arity::exact(0), str_len);
    r.register(pick::string, "empty?", Arity::exact(0), str_empty);
    r.register(pick::string, "upcase", Arity::exact(0), str_upcase);
    r.register(pick::string, "downcase", Arity::exact(0), str_downcase);
    r.register(pick::string, "swapcase", Arity::exact(0), str_swapcase);
    r.register(pick::string, "capitalize", Arity::exact(0), str_capitalize);
    r.register(pick::string, "reverse", Arity::exact(0), str_reverse);
    r.register(pick::string, "strip", Arity::exact(0), str_strip);
    r.register(pick::string, "lstrip", Arity::exact(0), str_lstrip);
    r.register(pick::string, "rstrip", Arity::exact(0), str_rstrip);
    r.register(pick::string, "succ", Arity::exact(0), str_succ_native);
    r.register(pick::string, "next", Arity::exact(0), str_succ_native);
    r.register(pick::string, "chomp", Arity::range(0, 1), str_chomp);
    r.register(pick::string, "chars", Arity::exact(0), str_chars);
    r.register(pick::string, "bytes", Arity::exact(0), str_bytes);
    r.register(pick::string, "each_char", Arity::exact(0), str_each_char);
    r.register(pick::string, "split", Arity::range(0, 1), str_split);
    r.register(pick::string, "include?", Arity::exact(1), str_include);
    r.register(pick::string, "start_with?", Arity::any(), str_start_with);
    r.register(pick::string, "end_with?", Arity::any(), str_end_with);
    r.register(pick::string, "index", Arity::exact(1), str_index);
    r.register(pick::string, "[]", Arity::range(1, 2), str_aref);
    r.register(pick::string, "slice", Arity::range(1, 2), str_aref);
    r.register(pick::string, "to_s", Arity::exact(0), str_dup);
    r.register(pick::string, "to_str", Arity::exact(0), str_dup);
    r.register(pick::string, "dup", Arity::exact(0), str_dup);
    r.register(pick::string, "to_sym", Arity::exact(0), str_to_sym);
    r.register(pick::string, "intern", Arity::exact(0), str_to_sym);
    r.register(pick::string, "to_i", Arity::range(0, 1), str_to_i);
    r.register(pick::string, "to_f", Arity::exact(0), str_to_f);
    r.register(pick::string, "replace", Arity::exact(1), str_replace);
    r.register(pick::string, "ord", Arity::exact(0), str_ord);
    r.register(pick::string, "center", Arity::range(1, 2), str_center);
    r.register(pick::string, "ljust", Arity::range(1, 2), str_ljust);
    r.register(pick::string, "rjust", Arity::range(1, 2), str_rjust);
    r.register(pick::string, "=~", Arity::exact(1), str_match_op);
    r.register(pick::string, "match?", Arity::exact(1), str_match_p);
    r.register(pick::string, "sub", Arity::range(1, 2), str_sub);
    r.register(pick::string, "gsub", Arity::range(1, 2), str_gsub);
    r.register(pick::string, "sub!", Arity::range(1, 2), str_sub_bang);
    r.register(pick::string, "gsub!", Arity::range(1, 2), str_gsub_bang);

    r.register(pick::symbol, "to_s", Arity::exact(0), sym_to_s);
    r.register(pick::symbol, "id2name", Arity::exact(0), sym_to_s);
    r.register(pick::symbol, "name", Arity::exact(0), sym_to_s);
    r.register(pick::symbol, "to_sym", Arity::exact(0), sym_to_sym);
    r.register(pick::symbol, "to_proc", Arity::exact(0), sym_to_proc);
    r.register(pick::symbol, "length", Arity::exact(0), sym_len);
    r.register(pick::symbol, "size", Arity::exact(0), sym_len);
    r.register(pick::symbol, "<=>", Arity::exact(1), sym_cmp);

    r.register_singleton(pick::regexp, "new", Arity::range(1, 2), regexp_s_new);
    r.register_singleton(pick::regexp, "escape", Arity::exact(1), regexp_escape);
    r.register(pick::regexp, "=~", Arity::exact(1), regexp_match_op);
    r.register(pick::regexp, "===", Arity::exact(1), regexp_eqq);
    r.register(pick::regexp, "match?", Arity::exact(1), regexp_match_p);
    r.register(pick::regexp, "match", Arity::exact(1), regexp_match);
    r.register(pick::regexp, "source", Arity::exact(0), regexp_source);
    r.register(pick::regexp, "==", Arity::exact(1), regexp_eq);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_print_like_the_guest() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-0.25), "-0.25");
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1.0e-05");
        assert_eq!(format_float(1e20), "1.0e+20");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(1.0 / 3.0), "0.3333333333333333");
        assert_eq!(format_float(f64::INFINITY), "Infinity");
    }

    #[test]
    fn string_successor() {
        assert_eq!(str_succ("a"), "b");
        assert_eq!(str_succ("az"), "ba");
        assert_eq!(str_succ("zz"), "aaa");
        assert_eq!(str_succ("a9"), "b0");
        assert_eq!(str_succ("99"), "100");
        assert_eq!(str_succ("1.9"), "2.0");
    }

    #[test]
    fn lenient_number_prefixes() {
        assert_eq!(parse_int_prefix("42abc", 10), 42);
        assert_eq!(parse_int_prefix("  -7", 10), -7);
        assert_eq!(parse_int_prefix("ff", 16), 255);
        assert_eq!(parse_int_prefix("abc", 10), 0);
        assert_eq!(parse_float_prefix("3.5kg"), 3.5);
        assert_eq!(parse_float_prefix("1e3"), 1000.0);
        assert_eq!(parse_float_prefix("x"), 0.0);
    }

    #[test]
    fn symbol_quoting() {
        assert!(plain_symbol("foo"));
        assert!(plain_symbol("foo?"));
        assert!(plain_symbol("<=>"));
        assert!(plain_symbol("@ivar"));
        assert!(!plain_symbol("foo bar"));
        assert!(!plain_symbol("9lives"));
    }

    #[test]
    fn replacement_references() {
        assert_eq!(expand_replacement("<\\1>"), "<${1}>");
        assert_eq!(expand_replacement("$5"), "$$5");
    }
}
