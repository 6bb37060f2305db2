//! Array, Hash and Range.
//!
//! The iteration methods are shared: every collection is viewed as a list of items (hash
//! entries as `[key, value]` pairs) and the same natives serve all three classes.

use std::cmp::Ordering;
use std::sync::Arc;

use garnet_syntax::DiagnosticKind;

use super::common::{conversion_error, int_arg, need_block, opt, pick, sym_arg};
use super::conversion::{str_succ, to_s};
use super::math::{guest_cmp, num_binop, num_cmp};
use crate::builtins_registry::{BuiltinFn, BuiltinRegistry, ClassPick};
use crate::compile::fast::{OpKind, try_fast};
use crate::core::{
    BadIndex, FastHashSet, HashKey, MAX_ARRAY_LEN, RArray, RHash, RRange, Symbol, Value, object::normalize_index,
};
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;

/// `hash[key]` for hashes without a default block.
pub(crate) fn hash_fetch_or_default(h: &Arc<RHash>, key: &Value) -> Value {
    h.get(key).unwrap_or_else(|| h.default_value())
}

/// Guest `==`. Core values take the inline path unless their `==` was redefined.
pub(crate) fn guest_eq(rt: &mut Runtime, a: &Value, b: &Value) -> Result<bool, Flow> {
    if let (Value::Array(x), Value::Array(y)) = (a, b) {
        if Arc::ptr_eq(x, y) {
            return Ok(true);
        }
        let (x, y) = (x.to_vec(), y.to_vec());
        if x.len() != y.len() {
            return Ok(false);
        }
        for (p, q) in x.iter().zip(y.iter()) {
            if !guest_eq(rt, p, q)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Some(result) = try_fast(rt, OpKind::Eq, a, std::slice::from_ref(b)) {
        return Ok(result?.truthy());
    }
    if a.identical(b) {
        return Ok(true);
    }
    Ok(rt
        .call_method(a, Symbol::intern("=="), vec![b.clone()], None, CallKind::Public)?
        .truthy())
}

/// Ordering used by `sort`, `min` and `max`: numbers and strings directly, everything else
/// through `<=>`.
pub(crate) fn compare(rt: &mut Runtime, a: &Value, b: &Value) -> Result<Ordering, Flow> {
    if let Some(ord) = num_cmp(a, b) {
        return Ok(ord);
    }
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Ok(x.with(|x| y.with(|y| x.cmp(y))));
    }
    guest_cmp(rt, a, b)
}

fn sort_values<F>(rt: &mut Runtime, items: &mut [Value], mut cmp: F) -> Result<(), Flow>
where
    F: FnMut(&mut Runtime, &Value, &Value) -> Result<Ordering, Flow>,
{
    let mut failure = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        cmp(rt, a, b).unwrap_or_else(|flow| {
            failure = Some(flow);
            Ordering::Equal
        })
    });
    failure.map_or(Ok(()), Err)
}

fn array_of<'a>(rt: &mut Runtime, v: &'a Value) -> Result<&'a Arc<RArray>, Flow> {
    match v {
        Value::Array(a) => Ok(a),
        other => Err(conversion_error(rt, other, "Array")),
    }
}

fn hash_of<'a>(rt: &mut Runtime, v: &'a Value) -> Result<&'a Arc<RHash>, Flow> {
    match v {
        Value::Hash(h) => Ok(h),
        other => Err(conversion_error(rt, other, "Hash")),
    }
}

fn range_of<'a>(rt: &mut Runtime, v: &'a Value) -> Result<&'a Arc<RRange>, Flow> {
    match v {
        Value::Range(r) => Ok(r),
        other => Err(conversion_error(rt, other, "Range")),
    }
}

fn pair(k: Value, v: Value) -> Value {
    Value::array(vec![k, v])
}

/// Steps through a range, calling `f` per element; `f` returns false to stop early.
fn range_walk(
    rt: &mut Runtime,
    r: &RRange,
    mut f: impl FnMut(&mut Runtime, Value) -> Result<bool, Flow>,
) -> Result<(), Flow> {
    match (&r.lo, &r.hi) {
        (Value::Int(lo), Value::Int(_)) => {
            if let Some((_, hi)) = r.int_bounds() {
                let mut i = *lo;
                while i <= hi {
                    if !f(rt, Value::Int(i))? {
                        break;
                    }
                    i += 1;
                }
            }
            Ok(())
        }
        (Value::Int(lo), Value::Nil) => {
            let mut i = *lo;
            while f(rt, Value::Int(i))? {
                rt.thread.handle.check()?;
                i += 1;
            }
            Ok(())
        }
        (Value::Int(lo), Value::Float(hi)) => {
            let mut i = *lo;
            while (i as f64) < *hi || (!r.exclusive && (i as f64) == *hi) {
                if !f(rt, Value::Int(i))? {
                    break;
                }
                i += 1;
            }
            Ok(())
        }
        (Value::Str(lo), Value::Str(hi)) => {
            let (mut cur, last) = (lo.to_string_lossy(), hi.to_string_lossy());
            loop {
                if cur.len() > last.len() || (r.exclusive && cur == last) {
                    break;
                }
                let done = cur == last;
                if !f(rt, Value::str(cur.clone()))? || done {
                    break;
                }
                cur = str_succ(&cur);
            }
            Ok(())
        }
        (lo, _) => {
            let class = rt.vm.model.real_class_of(lo).name();
            Err(rt.error_msg(Exc::Type, format!("can't iterate from {class}")))
        }
    }
}

fn range_items(rt: &mut Runtime, r: &RRange) -> Result<Vec<Value>, Flow> {
    if r.hi.is_nil() {
        return Err(rt.error_msg(Exc::Range, "cannot convert endless range to an array"));
    }
    let mut out = Vec::new();
    range_walk(rt, r, |_, v| {
        out.push(v);
        Ok(true)
    })?;
    Ok(out)
}

/// The receiver as a list of items.
fn items_of(rt: &mut Runtime, recv: &Value) -> Result<Vec<Value>, Flow> {
    match recv {
        Value::Array(a) => Ok(a.to_vec()),
        Value::Hash(h) => Ok(h.pairs().into_iter().map(|(k, v)| pair(k, v)).collect()),
        Value::Range(r) => range_items(rt, r),
        other => Err(conversion_error(rt, other, "Array")),
    }
}

/// Slice bounds for `start, length` against a collection of `len` items.
fn slice_bounds(start: i64, count: i64, len: usize) -> Option<(usize, usize)> {
    let start = normalize_index(start, len)?;
    if start > len || count < 0 {
        return None;
    }
    let end = start.saturating_add(count as usize).min(len);
    Some((start, end))
}

fn range_bounds(r: &RRange, len: usize) -> Option<(usize, usize)> {
    let lo = match &r.lo {
        Value::Int(i) => *i,
        Value::Nil => 0,
        _ => return None,
    };
    let hi = match &r.hi {
        Value::Int(i) => *i,
        Value::Nil => -1,
        _ => return None,
    };
    let start = normalize_index(lo, len)?;
    if start > len {
        return None;
    }
    let mut end = if hi < 0 { len as i64 + hi } else { hi };
    if !r.exclusive || r.hi.is_nil() {
        end += 1;
    }
    let end = (end.max(start as i64) as usize).min(len);
    Some((start, end))
}

// --- shared iteration -------------------------------------------------------------------

fn enum_each(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    match recv {
        Value::Array(a) => {
            let mut i = 0;
            while let Some(item) = a.get(i) {
                rt.call_block(&block, vec![item])?;
                i += 1;
            }
        }
        Value::Range(r) => {
            range_walk(rt, r, |rt, v| rt.call_block(&block, vec![v]).map(|_| true))?;
        }
        other => {
            for item in items_of(rt, other)? {
                rt.call_block(&block, vec![item])?;
            }
        }
    }
    Ok(recv.clone())
}

fn enum_each_with_index(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    for (i, item) in items_of(rt, recv)?.into_iter().enumerate() {
        rt.call_block(&block, vec![item, Value::Int(i as i64)])?;
    }
    Ok(recv.clone())
}

fn enum_each_with_object(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let memo = args[0].clone();
    for item in items_of(rt, recv)? {
        rt.call_block(&block, vec![item, memo.clone()])?;
    }
    Ok(memo)
}

fn enum_map(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let items = items_of(rt, recv)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(rt.call_block(&block, vec![item])?);
    }
    Ok(Value::array(out))
}

fn enum_flat_map(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let mut out = Vec::new();
    for item in items_of(rt, recv)? {
        match rt.call_block(&block, vec![item])? {
            Value::Array(a) => out.extend(a.to_vec()),
            other => out.push(other),
        }
    }
    Ok(Value::array(out))
}

fn filter_items(rt: &mut Runtime, recv: &Value, block: Option<&Arc<Block>>, keep: bool) -> Result<Vec<Value>, Flow> {
    let block = need_block(rt, block)?.clone();
    let mut out = Vec::new();
    for item in items_of(rt, recv)? {
        if rt.call_block(&block, vec![item.clone()])?.truthy() == keep {
            out.push(item);
        }
    }
    Ok(out)
}

fn enum_select(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(filter_items(rt, recv, block, true)?))
}

fn enum_reject(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(filter_items(rt, recv, block, false)?))
}

fn enum_partition(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let (mut yes, mut no) = (Vec::new(), Vec::new());
    for item in items_of(rt, recv)? {
        if rt.call_block(&block, vec![item.clone()])?.truthy() {
            yes.push(item);
        } else {
            no.push(item);
        }
    }
    Ok(pair(Value::array(yes), Value::array(no)))
}

fn enum_group_by(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let groups = RHash::new();
    for item in items_of(rt, recv)? {
        let key = rt.call_block(&block, vec![item.clone()])?;
        match groups.get(&key) {
            Some(Value::Array(a)) => a.push(item),
            _ => groups.insert(key, Value::array(vec![item])),
        }
    }
    Ok(Value::Hash(Arc::new(groups)))
}

fn enum_find(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    for item in items_of(rt, recv)? {
        if rt.call_block(&block, vec![item.clone()])?.truthy() {
            return Ok(item);
        }
    }
    Ok(Value::Nil)
}

/// `any?`, `all?` and `none?`: each item's truth, through the block when one is given.
fn item_truths(rt: &mut Runtime, recv: &Value, block: Option<&Arc<Block>>) -> Result<Vec<bool>, Flow> {
    let items = items_of(rt, recv)?;
    match block {
        Some(b) => {
            let b = b.clone();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let hit = rt.call_block(&b, vec![item])?.truthy();
                out.push(hit);
                if hit {
                    break;
                }
            }
            Ok(out)
        }
        None => Ok(items.iter().map(Value::truthy).collect()),
    }
}

fn enum_any(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(item_truths(rt, recv, block)?.into_iter().any(|b| b)))
}

fn enum_none(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(!item_truths(rt, recv, block)?.into_iter().any(|b| b)))
}

fn enum_all(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let items = items_of(rt, recv)?;
    for item in items {
        let truth = match block {
            Some(b) => rt.call_block(b, vec![item])?.truthy(),
            None => item.truthy(),
        };
        if !truth {
            return Ok(Value::FALSE);
        }
    }
    Ok(Value::TRUE)
}

fn enum_count(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let items = items_of(rt, recv)?;
    let mut n = 0;
    for item in items {
        let hit = match (args.first(), block) {
            (Some(target), _) => guest_eq(rt, &item, target)?,
            (None, Some(b)) => rt.call_block(b, vec![item])?.truthy(),
            (None, None) => true,
        };
        if hit {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

fn add(rt: &mut Runtime, a: &Value, b: &Value) -> Eval {
    match num_binop(rt, OpKind::Plus, a, b) {
        Some(result) => result,
        None => rt.call_method(a, Symbol::intern("+"), vec![b.clone()], None, CallKind::Public),
    }
}

fn enum_sum(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let mut acc = args.first().cloned().unwrap_or(Value::Int(0));
    for item in items_of(rt, recv)? {
        let item = match block {
            Some(b) => rt.call_block(b, vec![item])?,
            None => item,
        };
        acc = add(rt, &acc, &item)?;
    }
    Ok(acc)
}

fn enum_inject(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let (init, op) = match (args, block) {
        ([init, op], _) => (Some(init.clone()), Some(sym_arg(rt, op)?)),
        ([op], None) => (None, Some(sym_arg(rt, op)?)),
        ([init], Some(_)) => (Some(init.clone()), None),
        _ => (None, None),
    };
    if op.is_none() {
        need_block(rt, block)?;
    }
    let mut items = items_of(rt, recv)?.into_iter();
    let Some(mut acc) = init.or_else(|| items.next()) else {
        return Ok(Value::Nil);
    };
    for item in items {
        acc = match (op, block) {
            (Some(op), _) => match try_fast(rt, fast_op(op), &acc, std::slice::from_ref(&item)) {
                Some(result) => result?,
                None => rt.call_method(&acc, op, vec![item], None, CallKind::Public)?,
            },
            (None, Some(b)) => rt.call_block(b, vec![acc, item])?,
            (None, None) => unreachable!("inject without an operator checked for a block"),
        };
    }
    Ok(acc)
}

fn fast_op(sel: Symbol) -> OpKind {
    crate::compile::fast::op_kind(&sel.as_str()).unwrap_or(OpKind::Send)
}

fn extreme(rt: &mut Runtime, recv: &Value, block: Option<&Arc<Block>>, want: Ordering) -> Eval {
    let mut best: Option<Value> = None;
    for item in items_of(rt, recv)? {
        let replace = match &best {
            None => true,
            Some(cur) => {
                let ord = match block {
                    Some(b) => {
                        let r = rt.call_block(b, vec![item.clone(), cur.clone()])?;
                        r.as_int().unwrap_or(0).cmp(&0)
                    }
                    None => compare(rt, &item, cur)?,
                };
                ord == want
            }
        };
        if replace {
            best = Some(item);
        }
    }
    Ok(best.unwrap_or(Value::Nil))
}

fn enum_min(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    extreme(rt, recv, block, Ordering::Less)
}

fn enum_max(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    extreme(rt, recv, block, Ordering::Greater)
}

fn extreme_by(rt: &mut Runtime, recv: &Value, block: Option<&Arc<Block>>, want: Ordering) -> Eval {
    let block = need_block(rt, block)?.clone();
    let mut best: Option<(Value, Value)> = None;
    for item in items_of(rt, recv)? {
        let key = rt.call_block(&block, vec![item.clone()])?;
        let replace = match &best {
            None => true,
            Some((cur, _)) => compare(rt, &key, cur)? == want,
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map_or(Value::Nil, |(_, item)| item))
}

fn enum_min_by(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    extreme_by(rt, recv, block, Ordering::Less)
}

fn enum_max_by(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    extreme_by(rt, recv, block, Ordering::Greater)
}

fn enum_sort(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let mut items = items_of(rt, recv)?;
    match block {
        Some(b) => {
            let b = b.clone();
            sort_values(rt, &mut items, |rt, x, y| {
                let r = rt.call_block(&b, vec![x.clone(), y.clone()])?;
                match r.as_int() {
                    Some(i) => Ok(i.cmp(&0)),
                    None => Err(rt.error_msg(Exc::Argument, "comparison failed")),
                }
            })?;
        }
        None => sort_values(rt, &mut items, compare)?,
    }
    Ok(Value::array(items))
}

fn enum_sort_by(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let items = items_of(rt, recv)?;
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = rt.call_block(&block, vec![item.clone()])?;
        keyed.push(pair(key, item));
    }
    sort_values(rt, &mut keyed, |rt, x, y| {
        let (Value::Array(x), Value::Array(y)) = (x, y) else {
            return Ok(Ordering::Equal);
        };
        compare(rt, &x.get(0).unwrap_or_default(), &y.get(0).unwrap_or_default())
    })?;
    Ok(Value::array(
        keyed
            .into_iter()
            .filter_map(|p| p.as_array().and_then(|a| a.get(1)))
            .collect(),
    ))
}

fn enum_include(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    for item in items_of(rt, recv)? {
        if guest_eq(rt, &item, &args[0])? {
            return Ok(Value::TRUE);
        }
    }
    Ok(Value::FALSE)
}

fn enum_to_a(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(items_of(rt, recv)?))
}

fn enum_first(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    if let Value::Range(r) = recv {
        if args.is_empty() {
            return Ok(r.lo.clone());
        }
    }
    let n = match args.first() {
        Some(v) => Some(int_arg(rt, v)?),
        None => None,
    };
    if let Some(n) = n {
        if n < 0 {
            return Err(rt.error_msg(Exc::Argument, "negative array size"));
        }
        let mut out = Vec::new();
        if let Value::Range(r) = recv {
            range_walk(rt, r, |_, v| {
                if out.len() as i64 >= n {
                    return Ok(false);
                }
                out.push(v);
                Ok(true)
            })?;
            return Ok(Value::array(out));
        }
        let items = items_of(rt, recv)?;
        return Ok(Value::array(items.into_iter().take(n as usize).collect()));
    }
    Ok(items_of(rt, recv)?.into_iter().next().unwrap_or(Value::Nil))
}

fn enum_take(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    enum_first(rt, recv, &args[..1], block)
}

fn enum_drop(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let n = int_arg(rt, &args[0])?;
    if n < 0 {
        return Err(rt.error_msg(Exc::Argument, "attempt to drop negative size"));
    }
    let items = items_of(rt, recv)?;
    Ok(Value::array(items.into_iter().skip(n as usize).collect()))
}

fn enum_zip(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let items = items_of(rt, recv)?;
    let mut others = Vec::with_capacity(args.len());
    for a in args {
        others.push(items_of(rt, a)?);
    }
    let rows = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut row = vec![item];
            row.extend(others.iter().map(|o| o.get(i).cloned().unwrap_or(Value::Nil)));
            Value::array(row)
        })
        .collect();
    Ok(Value::array(rows))
}

fn enum_uniq(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let mut seen: FastHashSet<HashKey> = FastHashSet::default();
    let mut out = Vec::new();
    for item in items_of(rt, recv)? {
        let key = match block {
            Some(b) => rt.call_block(b, vec![item.clone()])?,
            None => item.clone(),
        };
        if seen.insert(HashKey(key)) {
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

fn enum_each_slice(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let n = int_arg(rt, &args[0])?;
    if n <= 0 {
        return Err(rt.error_msg(Exc::Argument, "invalid slice size"));
    }
    let items = items_of(rt, recv)?;
    for chunk in items.chunks(n as usize) {
        rt.call_block(&block, vec![Value::array(chunk.to_vec())])?;
    }
    Ok(Value::Nil)
}

// --- Array ------------------------------------------------------------------------------

fn ary_s_new(rt: &mut Runtime, _: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let n = match args.first() {
        Some(v) => int_arg(rt, v)?,
        None => 0,
    };
    if n < 0 {
        return Err(rt.error_msg(Exc::Argument, "negative array size"));
    }
    if n as u64 > MAX_ARRAY_LEN as u64 {
        return Err(rt.error_msg(Exc::Argument, "array size too big"));
    }
    let mut out = Vec::with_capacity(n as usize);
    for i in 0..n {
        out.push(match block {
            Some(b) => rt.call_block(b, vec![Value::Int(i)])?,
            None => opt(args, 1),
        });
    }
    Ok(Value::array(out))
}

fn ary_aref(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    let items = a.to_vec();
    let bounds = match args {
        [Value::Int(i)] => return Ok(a.get(*i).unwrap_or(Value::Nil)),
        [Value::Range(r)] => range_bounds(r, items.len()),
        [start, count] => {
            let start = int_arg(rt, start)?;
            let count = int_arg(rt, count)?;
            slice_bounds(start, count, items.len())
        }
        [other] => {
            let i = int_arg(rt, other)?;
            return Ok(a.get(i).unwrap_or(Value::Nil));
        }
        _ => None,
    };
    Ok(bounds.map_or(Value::Nil, |(s, e)| Value::array(items[s..e].to_vec())))
}

fn ary_aset(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    match args {
        [idx, value] => {
            let i = int_arg(rt, idx)?;
            match a.set(i, value.clone()) {
                Ok(()) => Ok(value.clone()),
                Err(BadIndex::BeforeStart) => Err(rt.error(Exc::Index, DiagnosticKind::IndexOutOfRange(i))),
                Err(BadIndex::TooBig) => Err(rt.error(Exc::Index, DiagnosticKind::IndexTooBig(i))),
            }
        }
        [start, count, value] => {
            let s = int_arg(rt, start)?;
            let c = int_arg(rt, count)?;
            let mut items = a.to_vec();
            let Some(from) = normalize_index(s, items.len()) else {
                return Err(rt.error(Exc::Index, DiagnosticKind::IndexOutOfRange(s)));
            };
            if c < 0 {
                return Err(rt.error_msg(Exc::Index, format!("negative length ({c})")));
            }
            if from > items.len() {
                if from >= MAX_ARRAY_LEN {
                    return Err(rt.error(Exc::Index, DiagnosticKind::IndexTooBig(s)));
                }
                items.resize(from, Value::Nil);
            }
            let to = from.saturating_add(c as usize).min(items.len());
            let insert = match value {
                Value::Array(v) => v.to_vec(),
                other => vec![other.clone()],
            };
            items.splice(from..to, insert);
            a.replace(items);
            Ok(value.clone())
        }
        _ => Ok(Value::Nil),
    }
}

fn ary_push(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    array_of(rt, recv)?.extend(args.iter().cloned());
    Ok(recv.clone())
}

fn ary_pop(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(array_of(rt, recv)?.pop().unwrap_or(Value::Nil))
}

fn ary_shift(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(array_of(rt, recv)?.shift().unwrap_or(Value::Nil))
}

fn ary_unshift(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    for v in args.iter().rev() {
        a.unshift(v.clone());
    }
    Ok(recv.clone())
}

fn ary_insert(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    let idx = int_arg(rt, &args[0])?;
    let mut items = a.to_vec();
    let at = if idx < 0 {
        match normalize_index(idx + 1, items.len()) {
            Some(i) => i,
            None => return Err(rt.error(Exc::Index, DiagnosticKind::IndexOutOfRange(idx))),
        }
    } else {
        idx as usize
    };
    if at > items.len() {
        if at >= MAX_ARRAY_LEN {
            return Err(rt.error(Exc::Index, DiagnosticKind::IndexTooBig(idx)));
        }
        items.resize(at, Value::Nil);
    }
    items.splice(at..at, args[1..].iter().cloned());
    a.replace(items);
    Ok(recv.clone())
}

fn ary_len(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Int(array_of(rt, recv)?.len() as i64))
}

fn ary_empty(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(array_of(rt, recv)?.is_empty()))
}

fn ary_last(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let items = array_of(rt, recv)?.to_vec();
    match args.first() {
        Some(n) => {
            let n = int_arg(rt, n)?.max(0) as usize;
            let from = items.len().saturating_sub(n);
            Ok(Value::array(items[from..].to_vec()))
        }
        None => Ok(items.last().cloned().unwrap_or(Value::Nil)),
    }
}

fn ary_index(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let items = array_of(rt, recv)?.to_vec();
    for (i, item) in items.into_iter().enumerate() {
        let hit = match (args.first(), block) {
            (Some(target), _) => guest_eq(rt, &item, target)?,
            (None, Some(b)) => rt.call_block(b, vec![item])?.truthy(),
            (None, None) => false,
        };
        if hit {
            return Ok(Value::Int(i as i64));
        }
    }
    Ok(Value::Nil)
}

fn ary_join(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let sep = match args.first() {
        Some(Value::Str(s)) => s.to_string_lossy(),
        Some(Value::Nil) | None => String::new(),
        Some(other) => return Err(conversion_error(rt, other, "String")),
    };
    fn join_into(rt: &mut Runtime, items: Vec<Value>, sep: &str, out: &mut String) -> Result<(), Flow> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            match &item {
                Value::Array(inner) => join_into(rt, inner.to_vec(), sep, out)?,
                other => out.push_str(&to_s(rt, other)?),
            }
        }
        Ok(())
    }
    let mut out = String::new();
    let items = array_of(rt, recv)?.to_vec();
    join_into(rt, items, &sep, &mut out)?;
    Ok(Value::str(out))
}

fn ary_reverse(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut items = array_of(rt, recv)?.to_vec();
    items.reverse();
    Ok(Value::array(items))
}

fn ary_concat(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    for other in args {
        let more = array_of(rt, other)?.to_vec();
        a.extend(more);
    }
    Ok(recv.clone())
}

fn ary_plus(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut items = array_of(rt, recv)?.to_vec();
    items.extend(array_of(rt, &args[0])?.to_vec());
    Ok(Value::array(items))
}

fn ary_minus(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let items = array_of(rt, recv)?.to_vec();
    let remove: FastHashSet<HashKey> = array_of(rt, &args[0])?.to_vec().into_iter().map(HashKey).collect();
    Ok(Value::array(
        items
            .into_iter()
            .filter(|v| !remove.contains(&HashKey(v.clone())))
            .collect(),
    ))
}

fn ary_times(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    if let Value::Str(_) = &args[0] {
        return ary_join(rt, recv, args, block);
    }
    let n = int_arg(rt, &args[0])?;
    if n < 0 {
        return Err(rt.error_msg(Exc::Argument, "negative argument"));
    }
    let items = array_of(rt, recv)?.to_vec();
    let total = (n as u64).saturating_mul(items.len() as u64);
    if total > MAX_ARRAY_LEN as u64 {
        return Err(rt.error_msg(Exc::Argument, "argument too big"));
    }
    let mut out = Vec::with_capacity(total as usize);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    Ok(Value::array(out))
}

fn ary_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match &args[0] {
        Value::Array(_) => Ok(Value::Bool(guest_eq(rt, recv, &args[0])?)),
        _ => Ok(Value::FALSE),
    }
}

fn ary_compact(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let items = array_of(rt, recv)?.to_vec();
    Ok(Value::array(items.into_iter().filter(|v| !v.is_nil()).collect()))
}

fn flatten_into(items: Vec<Value>, depth: Option<i64>, out: &mut Vec<Value>) {
    for item in items {
        match (&item, depth) {
            (Value::Array(inner), Some(d)) if d > 0 => flatten_into(inner.to_vec(), Some(d - 1), out),
            (Value::Array(inner), None) => flatten_into(inner.to_vec(), None, out),
            _ => out.push(item),
        }
    }
}

fn ary_flatten(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let depth = match args.first() {
        Some(v) => Some(int_arg(rt, v)?),
        None => None,
    };
    let mut out = Vec::new();
    flatten_into(array_of(rt, recv)?.to_vec(), depth, &mut out);
    Ok(Value::array(out))
}

fn ary_clear(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    array_of(rt, recv)?.clear();
    Ok(recv.clone())
}

fn ary_dup(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(array_of(rt, recv)?.to_vec()))
}

fn ary_delete(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    let mut kept = Vec::new();
    let mut found = None;
    for item in a.to_vec() {
        if guest_eq(rt, &item, &args[0])? {
            found = Some(item);
        } else {
            kept.push(item);
        }
    }
    a.replace(kept);
    Ok(found.unwrap_or(Value::Nil))
}

fn ary_delete_at(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let a = array_of(rt, recv)?;
    let mut items = a.to_vec();
    let idx = int_arg(rt, &args[0])?;
    match normalize_index(idx, items.len()).filter(|i| *i < items.len()) {
        Some(i) => {
            let removed = items.remove(i);
            a.replace(items);
            Ok(removed)
        }
        None => Ok(Value::Nil),
    }
}

/// `map!`, `select!` and `reject!` write the result back into the receiver.
fn in_place(rt: &mut Runtime, recv: &Value, f: BuiltinFn, block: Option<&Arc<Block>>) -> Eval {
    let result = f(rt, recv, &[], block)?;
    if let Value::Array(new) = result {
        array_of(rt, recv)?.replace(new.to_vec());
    }
    Ok(recv.clone())
}

fn ary_map_bang(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    in_place(rt, recv, enum_map, block)
}

fn ary_select_bang(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    in_place(rt, recv, enum_select, block)
}

fn ary_reject_bang(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    in_place(rt, recv, enum_reject, block)
}

fn ary_sort_bang(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    in_place(rt, recv, enum_sort, block)
}

fn ary_replace(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let items = array_of(rt, &args[0])?.to_vec();
    array_of(rt, recv)?.replace(items);
    Ok(recv.clone())
}

fn ary_rotate(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut items = array_of(rt, recv)?.to_vec();
    let n = match args.first() {
        Some(v) => int_arg(rt, v)?,
        None => 1,
    };
    if !items.is_empty() {
        let k = n.rem_euclid(items.len() as i64) as usize;
        items.rotate_left(k);
    }
    Ok(Value::array(items))
}

// --- Hash -------------------------------------------------------------------------------

fn hash_s_new(rt: &mut Runtime, _: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    if block.is_some() {
        return Err(rt.error_msg(Exc::NotImplemented, "Hash.new with a default block"));
    }
    let h = RHash::new();
    h.set_default(opt(args, 0));
    Ok(Value::Hash(Arc::new(h)))
}

fn hash_aref(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(hash_fetch_or_default(hash_of(rt, recv)?, &args[0]))
}

fn hash_aset(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let h = hash_of(rt, recv)?;
    rt.vm.collector.write_barrier(recv, "[]=", &args[1]);
    h.insert(args[0].clone(), args[1].clone());
    Ok(args[1].clone())
}

fn hash_fetch(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let h = hash_of(rt, recv)?;
    if let Some(v) = h.get(&args[0]) {
        return Ok(v);
    }
    if let Some(b) = block {
        return rt.call_block(b, vec![args[0].clone()]);
    }
    if let Some(default) = args.get(1) {
        return Ok(default.clone());
    }
    let shown = rt.inspect_value(&args[0]);
    Err(rt.error(Exc::Key, DiagnosticKind::KeyNotFound(shown)))
}

fn hash_key_p(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(hash_of(rt, recv)?.contains(&args[0])))
}

fn hash_value_p(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    for v in hash_of(rt, recv)?.values() {
        if guest_eq(rt, &v, &args[0])? {
            return Ok(Value::TRUE);
        }
    }
    Ok(Value::FALSE)
}

fn hash_delete(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    match hash_of(rt, recv)?.remove(&args[0]) {
        Some(v) => Ok(v),
        None => match block {
            Some(b) => rt.call_block(b, vec![args[0].clone()]),
            None => Ok(Value::Nil),
        },
    }
}

fn hash_keys(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(hash_of(rt, recv)?.keys()))
}

fn hash_values(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(hash_of(rt, recv)?.values()))
}

fn hash_len(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Int(hash_of(rt, recv)?.len() as i64))
}

fn hash_empty(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(hash_of(rt, recv)?.is_empty()))
}

fn hash_each_key(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    for k in hash_of(rt, recv)?.keys() {
        rt.call_block(&block, vec![k])?;
    }
    Ok(recv.clone())
}

fn hash_each_value(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    for v in hash_of(rt, recv)?.values() {
        rt.call_block(&block, vec![v])?;
    }
    Ok(recv.clone())
}

fn hash_filter(rt: &mut Runtime, recv: &Value, block: Option<&Arc<Block>>, keep: bool) -> Eval {
    let block = need_block(rt, block)?.clone();
    let out = RHash::new();
    for (k, v) in hash_of(rt, recv)?.pairs() {
        if rt.call_block(&block, vec![k.clone(), v.clone()])?.truthy() == keep {
            out.insert(k, v);
        }
    }
    Ok(Value::Hash(Arc::new(out)))
}

fn hash_select(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    hash_filter(rt, recv, block, true)
}

fn hash_reject(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    hash_filter(rt, recv, block, false)
}

fn hash_merge_into(rt: &mut Runtime, target: &RHash, other: &Value, block: Option<&Arc<Block>>) -> Result<(), Flow> {
    for (k, v) in hash_of(rt, other)?.pairs() {
        let v = match (block, target.get(&k)) {
            (Some(b), Some(old)) => rt.call_block(b, vec![k.clone(), old, v])?,
            _ => v,
        };
        target.insert(k, v);
    }
    Ok(())
}

fn hash_merge(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let h = hash_of(rt, recv)?;
    let out = RHash::from_pairs(h.pairs());
    out.set_default(h.default_value());
    for other in args {
        hash_merge_into(rt, &out, other, block)?;
    }
    Ok(Value::Hash(Arc::new(out)))
}

fn hash_update(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let h = hash_of(rt, recv)?.clone();
    for other in args {
        hash_merge_into(rt, &h, other, block)?;
    }
    Ok(recv.clone())
}

fn hash_default(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(hash_of(rt, recv)?.default_value())
}

fn hash_set_default(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    hash_of(rt, recv)?.set_default(args[0].clone());
    Ok(args[0].clone())
}

fn hash_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let Value::Hash(other) = &args[0] else {
        return Ok(Value::FALSE);
    };
    let h = hash_of(rt, recv)?;
    if h.len() != other.len() {
        return Ok(Value::FALSE);
    }
    for (k, v) in h.pairs() {
        let Some(w) = other.get(&k) else {
            return Ok(Value::FALSE);
        };
        if !guest_eq(rt, &v, &w)? {
            return Ok(Value::FALSE);
        }
    }
    Ok(Value::TRUE)
}

fn hash_clear(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    hash_of(rt, recv)?.clear();
    Ok(recv.clone())
}

fn hash_transform_values(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let out = RHash::new();
    for (k, v) in hash_of(rt, recv)?.pairs() {
        out.insert(k, rt.call_block(&block, vec![v])?);
    }
    Ok(Value::Hash(Arc::new(out)))
}

fn hash_invert(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let pairs = hash_of(rt, recv)?.pairs();
    Ok(Value::hash(pairs.into_iter().map(|(k, v)| (v, k)).collect()))
}

fn hash_dig(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut cur = recv.clone();
    for key in args {
        cur = match &cur {
            Value::Hash(h) => hash_fetch_or_default(h, key),
            Value::Array(a) => a.get(int_arg(rt, key)?).unwrap_or(Value::Nil),
            Value::Nil => return Ok(Value::Nil),
            other => rt.call_method(other, Symbol::intern("dig"), vec![key.clone()], None, CallKind::Public)?,
        };
    }
    Ok(cur)
}

fn hash_dup(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let h = hash_of(rt, recv)?;
    let out = RHash::from_pairs(h.pairs());
    out.set_default(h.default_value());
    Ok(Value::Hash(Arc::new(out)))
}

// --- Range ------------------------------------------------------------------------------

fn range_begin(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(range_of(rt, recv)?.lo.clone())
}

fn range_end(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(range_of(rt, recv)?.hi.clone())
}

fn range_exclude_end(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(range_of(rt, recv)?.exclusive))
}

fn range_last(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    if args.is_empty() {
        return Ok(range_of(rt, recv)?.hi.clone());
    }
    let items = Value::array(items_of(rt, recv)?);
    ary_last(rt, &items, args, block)
}

/// `include?`, `member?`, `cover?` and `===`: bound comparison, no iteration.
fn range_cover(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let r = range_of(rt, recv)?.clone();
    let v = &args[0];
    let comparable = matches!(
        (&r.lo, v),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) | (Value::Str(_), Value::Str(_))
    ) || (r.lo.is_nil() && !v.is_nil())
        || matches!(v, Value::Object(_));
    if !comparable {
        return Ok(Value::FALSE);
    }
    if !r.lo.is_nil() && compare(rt, &r.lo, v)? == Ordering::Greater {
        return Ok(Value::FALSE);
    }
    if r.hi.is_nil() {
        return Ok(Value::TRUE);
    }
    let upper = compare(rt, v, &r.hi)?;
    Ok(Value::Bool(upper == Ordering::Less || (!r.exclusive && upper == Ordering::Equal)))
}

fn range_size(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let r = range_of(rt, recv)?;
    match (&r.lo, &r.hi) {
        (Value::Int(_), Value::Int(_)) => Ok(Value::Int(
            r.int_bounds().map_or(0, |(lo, hi)| (hi - lo + 1).max(0)),
        )),
        (Value::Int(_) | Value::Float(_), Value::Nil) => Ok(Value::Float(f64::INFINITY)),
        (lo, hi) => match (lo.as_f64(), hi.as_f64()) {
            (Some(lo), Some(hi)) => {
                let mut n = (hi - lo).floor() as i64 + 1;
                if r.exclusive && (hi - lo).fract() == 0.0 {
                    n -= 1;
                }
                Ok(Value::Int(n.max(0)))
            }
            _ => Ok(Value::Nil),
        },
    }
}

fn range_step(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let r = range_of(rt, recv)?.clone();
    let step = int_arg(rt, &args[0])?;
    if step <= 0 {
        return Err(rt.error_msg(Exc::Argument, "step can't be negative or zero"));
    }
    let mut idx = 0i64;
    range_walk(rt, &r, |rt, v| {
        if idx % step == 0 {
            rt.call_block(&block, vec![v])?;
        }
        idx += 1;
        Ok(true)
    })?;
    Ok(recv.clone())
}

fn range_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let r = range_of(rt, recv)?.clone();
    let Value::Range(o) = &args[0] else {
        return Ok(Value::FALSE);
    };
    Ok(Value::Bool(
        r.exclusive == o.exclusive && guest_eq(rt, &r.lo, &o.lo)? && guest_eq(rt, &r.hi, &o.hi)?,
    ))
}

pub(crate) fn install(r: &mut BuiltinRegistry) {
    let shared: &[(&'static str, Arity, BuiltinFn)] = &[
        ("each", Arity::exact(0), enum_each),
        ("each_with_index", Arity::exact(0), enum_each_with_index),
        ("each_with_object", Arity::exact(1), enum_each_with_object),
        ("each_slice", Arity::exact(1), enum_each_slice),
        ("map", Arity::exact(0), enum_map),
        ("collect", Arity::exact(0), enum_map),
        ("flat_map", Arity::exact(0), enum_flat_map),
        ("partition", Arity::exact(0), enum_partition),
        ("group_by", Arity::exact(0), enum_group_by),
        ("find", Arity::exact(0), enum_find),
        ("detect", Arity::exact(0), enum_find),
        ("any?", Arity::exact(0), enum_any),
        ("all?", Arity::exact(0), enum_all),
        ("none?", Arity::exact(0), enum_none),
        ("count", Arity::range(0, 1), enum_count),
        ("sum", Arity::range(0, 1), enum_sum),
        ("inject", Arity::range(0, 2), enum_inject),
        ("reduce", Arity::range(0, 2), enum_inject),
        ("min", Arity::exact(0), enum_min),
        ("max", Arity::exact(0), enum_max),
        ("min_by", Arity::exact(0), enum_min_by),
        ("max_by", Arity::exact(0), enum_max_by),
        ("sort", Arity::exact(0), enum_sort),
        ("sort_by", Arity::exact(0), enum_sort_by),
        ("to_a", Arity::exact(0), enum_to_a),
        ("entries", Arity::exact(0), enum_to_a),
        ("first", Arity::range(0, 1), enum_first),
        ("take", Arity::exact(1), enum_take),
        ("drop", Arity::exact(1), enum_drop),
        ("zip", Arity::any(), enum_zip),
        ("uniq", Arity::exact(0), enum_uniq),
    ];
    let classes: [ClassPick; 3] = [pick::array, pick::hash, pick::range];
    for class in classes {
        for (name, arity, fun) in shared {
            r.register(class, name, *arity, *fun);
        }
    }
    r.register(pick::array, "include?", Arity::exact(1), enum_include);
    r.register(pick::array, "select", Arity::exact(0), enum_select);
    r.register(pick::array, "filter", Arity::exact(0), enum_select);
    r.register(pick::array, "reject", Arity::exact(0), enum_reject);
    r.register(pick::range, "select", Arity::exact(0), enum_select);
    r.register(pick::range, "filter", Arity::exact(0), enum_select);
    r.register(pick::range, "reject", Arity::exact(0), enum_reject);

    r.register_singleton(pick::array, "new", Arity::range(0, 2), ary_s_new);
    r.register(pick::array, "[]", Arity::range(1, 2), ary_aref);
    r.register(pick::array, "slice", Arity::range(1, 2), ary_aref);
    r.register(pick::array, "[]=", Arity::range(2, 3), ary_aset);
    r.register(pick::array, "<<", Arity::exact(1), ary_push);
    r.register(pick::array, "push", Arity::any(), ary_push);
    r.register(pick::array, "append", Arity::any(), ary_push);
    r.register(pick::array, "pop", Arity::exact(0), ary_pop);
    r.register(pick::array, "shift", Arity::exact(0), ary_shift);
    r.register(pick::array, "unshift", Arity::any(), ary_unshift);
    r.register(pick::array, "prepend", Arity::any(), ary_unshift);
    r.register(pick::array, "insert", Arity::at_least(1), ary_insert);
    r.register(pick::array, "length", Arity::exact(0), ary_len);
    r.register(pick::array, "size", Arity::exact(0), ary_len);
    r.register(pick::array, "empty?", Arity::exact(0), ary_empty);
    r.register(pick::array, "last", Arity::range(0, 1), ary_last);
    r.register(pick::array, "index", Arity::range(0, 1), ary_index);
    r.register(pick::array, "find_index", Arity::range(0, 1), ary_index);
    r.register(pick::array, "join", Arity::range(0, 1), ary_join);
    r.register(pick::array, "reverse", Arity::exact(0), ary_reverse);
    r.register(pick::array, "concat", Arity::any(), ary_concat);
    r.register(pick::array, "+", Arity::exact(1), ary_plus);
    r.register(pick::array, "-", Arity::exact(1), ary_minus);
    r.register(pick::array, "*", Arity::exact(1), ary_times);
    r.register(pick::array, "==", Arity::exact(1), ary_eq);
    r.register(pick::array, "compact", Arity::exact(0), ary_compact);
    r.register(pick::array, "flatten", Arity::range(0, 1), ary_flatten);
    r.register(pick::array, "clear", Arity::exact(0), ary_clear);
    r.register(pick::array, "dup", Arity::exact(0), ary_dup);
    r.register(pick::array, "clone", Arity::exact(0), ary_dup);
    r.register(pick::array, "delete", Arity::exact(1), ary_delete);
    r.register(pick::array, "delete_at", Arity::exact(1), ary_delete_at);
    r.register(pick::array, "map!", Arity::exact(0), ary_map_bang);
    r.register(pick::array, "collect!", Arity::exact(0), ary_map_bang);
    r.register(pick::array, "select!", Arity::exact(0), ary_select_bang);
    r.register(pick::array, "reject!", Arity::exact(0), ary_reject_bang);
    r.register(pick::array, "sort!", Arity::exact(0), ary_sort_bang);
    r.register(pick::array, "replace", Arity::exact(1), ary_replace);
    r.register(pick::array, "rotate", Arity::range(0, 1), ary_rotate);

    r.register_singleton(pick::hash, "new", Arity::range(0, 1), hash_s_new);
    r.register(pick::hash, "[]", Arity::exact(1), hash_aref);
    r.register(pick::hash, "[]=", Arity::exact(2), hash_aset);
    r.register(pick::hash, "store", Arity::exact(2), hash_aset);
    r.register(pick::hash, "fetch", Arity::range(1, 2), hash_fetch);
    r.register(pick::hash, "key?", Arity::exact(1), hash_key_p);
    r.register(pick::hash, "has_key?", Arity::exact(1), hash_key_p);
    r.register(pick::hash, "include?", Arity::exact(1), hash_key_p);
    r.register(pick::hash, "member?", Arity::exact(1), hash_key_p);
    r.register(pick::hash, "value?", Arity::exact(1), hash_value_p);
    r.register(pick::hash, "has_value?", Arity::exact(1), hash_value_p);
    r.register(pick::hash, "delete", Arity::exact(1), hash_delete);
    r.register(pick::hash, "keys", Arity::exact(0), hash_keys);
    r.register(pick::hash, "values", Arity::exact(0), hash_values);
    r.register(pick::hash, "length", Arity::exact(0), hash_len);
    r.register(pick::hash, "size", Arity::exact(0), hash_len);
    r.register(pick::hash, "empty?", Arity::exact(0), hash_empty);
    r.register(pick::hash, "each_pair", Arity::exact(0), enum_each);
    r.register(pick::hash, "each_key", Arity::exact(0), hash_each_key);
    r.register(pick::hash, "each_value", Arity::exact(0), hash_each_value);
    r.register(pick::hash, "select", Arity::exact(0), hash_select);
    r.register(pick::hash, "filter", Arity::exact(0), hash_select);
    r.register(pick::hash, "reject", Arity::exact(0), hash_reject);
    r.register(pick::hash, "merge", Arity::any(), hash_merge);
    r.register(pick::hash, "merge!", Arity::any(), hash_update);
    r.register(pick::hash, "update", Arity::any(), hash_update);
    r.register(pick::hash, "default", Arity::exact(0), hash_default);
    r.register(pick::hash, "default=", Arity::exact(1), hash_set_default);
    r.register(pick::hash, "==", Arity::exact(1), hash_eq);
    r.register(pick::hash, "clear", Arity::exact(0), hash_clear);
    r.register(pick::hash, "transform_values", Arity::exact(0), hash_transform_values);
    r.register(pick::hash, "invert", Arity::exact(0), hash_invert);
    r.register(pick::hash, "dig", Arity::at_least(1), hash_dig);
    r.register(pick::hash, "dup", Arity::exact(0), hash_dup);
    r.register(pick::hash, "to_h", Arity::exact(0), hash_dup);
    r.register(pick::array, "dig", Arity::at_least(1), hash_dig);

    r.register(pick::range, "begin", Arity::exact(0), range_begin);
    r.register(pick::range, "end", Arity::exact(0), range_end);
    r.register(pick::range, "last", Arity::range(0, 1), range_last);
    r.register(pick::range, "exclude_end?", Arity::exact(0), range_exclude_end);
    r.register(pick::range, "include?", Arity::exact(1), range_cover);
    r.register(pick::range, "member?", Arity::exact(1), range_cover);
    r.register(pick::range, "cover?", Arity::exact(1), range_cover);
    r.register(pick::range, "===", Arity::exact(1), range_cover);
    r.register(pick::range, "size", Arity::exact(0), range_size);
    r.register(pick::range, "step", Arity::exact(1), range_step);
    r.register(pick::range, "==", Arity::exact(1), range_eq);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_clamp_to_length() {
        assert_eq!(slice_bounds(1, 2, 5), Some((1, 3)));
        assert_eq!(slice_bounds(4, 10, 5), Some((4, 5)));
        assert_eq!(slice_bounds(5, 1, 5), Some((5, 5)));
        assert_eq!(slice_bounds(6, 1, 5), None);
        assert_eq!(slice_bounds(-2, 5, 5), Some((3, 5)));
        assert_eq!(slice_bounds(0, -1, 5), None);
    }

    #[test]
    fn range_slices() {
        let r = |lo, hi, exclusive| RRange {
            lo: Value::Int(lo),
            hi: Value::Int(hi),
            exclusive,
        };
        assert_eq!(range_bounds(&r(1, 3, false), 5), Some((1, 4)));
        assert_eq!(range_bounds(&r(1, 3, true), 5), Some((1, 3)));
        assert_eq!(range_bounds(&r(0, -1, false), 5), Some((0, 5)));
        assert_eq!(range_bounds(&r(3, 1, false), 5), Some((3, 3)));
    }
}
