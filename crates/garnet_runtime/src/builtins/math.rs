//! Integer, Float and Comparable.
//!
//! `num_binop` is shared with the inline operator path, so an inlined `a + b` and a
//! dispatched `Integer#+` give the same answer, overflow and division errors included.

use std::cmp::Ordering;
use std::sync::Arc;

use garnet_syntax::DiagnosticKind;

use super::common::{int_arg, need_block, pick, to_f64};
use crate::builtins_registry::BuiltinRegistry;
use crate::compile::fast::OpKind;
use crate::core::{Symbol, Value};
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;

fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }
}

fn float_mod(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

fn compare_result(op: OpKind, ord: Option<Ordering>) -> Value {
    let Some(ord) = ord else {
        return Value::FALSE;
    };
    Value::Bool(match op {
        OpKind::Lt => ord == Ordering::Less,
        OpKind::Le => ord != Ordering::Greater,
        OpKind::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    })
}

/// Arithmetic and ordering on two numbers. `None` when either side is not a number or the
/// operator is not arithmetic.
pub(crate) fn num_binop(rt: &mut Runtime, op: OpKind, a: &Value, b: &Value) -> Option<Eval> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let (x, y) = (*x, *y);
            let v = match op {
                OpKind::Plus => x.checked_add(y),
                OpKind::Minus => x.checked_sub(y),
                OpKind::Mult => x.checked_mul(y),
                OpKind::Div | OpKind::Mod if y == 0 => {
                    return Some(Err(rt.error(Exc::ZeroDivision, DiagnosticKind::DivisionByZero)));
                }
                OpKind::Div => floor_div(x, y),
                OpKind::Mod => Some(floor_mod(x, y)),
                OpKind::Lt | OpKind::Le | OpKind::Gt | OpKind::Ge => {
                    return Some(Ok(compare_result(op, Some(x.cmp(&y)))));
                }
                _ => return None,
            };
            Some(match v {
                Some(v) => Ok(Value::Int(v)),
                None => Err(rt.error(Exc::Range, DiagnosticKind::IntegerOverflow)),
            })
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = to_f64(a)?;
            let y = to_f64(b)?;
            Some(Ok(match op {
                OpKind::Plus => Value::Float(x + y),
                OpKind::Minus => Value::Float(x - y),
                OpKind::Mult => Value::Float(x * y),
                OpKind::Div => Value::Float(x / y),
                OpKind::Mod => Value::Float(float_mod(x, y)),
                OpKind::Lt | OpKind::Le | OpKind::Gt | OpKind::Ge => compare_result(op, x.partial_cmp(&y)),
                _ => return None,
            }))
        }
        _ => None,
    }
}

pub(crate) fn num_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        _ => match (to_f64(a), to_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

pub(crate) fn num_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => to_f64(a)?.partial_cmp(&to_f64(b)?),
    }
}

fn ordering_value(ord: Option<Ordering>) -> Value {
    match ord {
        Some(Ordering::Less) => Value::Int(-1),
        Some(Ordering::Equal) => Value::Int(0),
        Some(Ordering::Greater) => Value::Int(1),
        None => Value::Nil,
    }
}

fn arith(rt: &mut Runtime, recv: &Value, arg: &Value, op: OpKind) -> Eval {
    if let Some(result) = num_binop(rt, op, recv, arg) {
        return result;
    }
    let from = rt.vm.model.real_class_of(arg).name();
    let to = rt.vm.model.real_class_of(recv).name();
    if matches!(op, OpKind::Lt | OpKind::Le | OpKind::Gt | OpKind::Ge) {
        return Err(rt.error_msg(Exc::Argument, format!("comparison of {to} with {from} failed")));
    }
    Err(rt.error(Exc::Type, DiagnosticKind::CantCoerce { from, to }))
}

macro_rules! binops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            fn $name(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
                arith(rt, recv, &args[0], OpKind::$op)
            }
        )*
    };
}

binops!(
    num_plus => Plus,
    num_minus => Minus,
    num_mult => Mult,
    num_div => Div,
    num_mod => Mod,
    num_lt => Lt,
    num_le => Le,
    num_gt => Gt,
    num_ge => Ge,
);

fn num_equal(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(num_eq(recv, &args[0])))
}

fn num_spaceship(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(ordering_value(num_cmp(recv, &args[0])))
}

fn num_pow(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match (recv, &args[0]) {
        (Value::Int(x), Value::Int(y)) if *y >= 0 => {
            let exp = u32::try_from(*y).ok();
            match exp.and_then(|e| x.checked_pow(e)) {
                Some(v) => Ok(Value::Int(v)),
                None => Err(rt.error(Exc::Range, DiagnosticKind::IntegerOverflow)),
            }
        }
        (a, b) => match (to_f64(a), to_f64(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
            _ => arith(rt, recv, b, OpKind::Mult),
        },
    }
}

fn num_neg(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Int(i) => match i.checked_neg() {
            Some(v) => Ok(Value::Int(v)),
            None => Err(rt.error(Exc::Range, DiagnosticKind::IntegerOverflow)),
        },
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Ok(other.clone()),
    }
}

fn num_abs(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Int(i) => match i.checked_abs() {
            Some(v) => Ok(Value::Int(v)),
            None => Err(rt.error(Exc::Range, DiagnosticKind::IntegerOverflow)),
        },
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Ok(other.clone()),
    }
}

fn float_to_int(rt: &mut Runtime, f: f64) -> Eval {
    if !f.is_finite() {
        let shown = if f.is_nan() {
            "NaN"
        } else if f > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        };
        return Err(rt.error_msg(Exc::FloatDomain, shown));
    }
    if f >= i64::MAX as f64 || f < i64::MIN as f64 {
        return Err(rt.error(Exc::Range, DiagnosticKind::IntegerOverflow));
    }
    Ok(Value::Int(f as i64))
}

fn num_to_i(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Float(f) => float_to_int(rt, f.trunc()),
        other => Ok(other.clone()),
    }
}

fn num_to_f(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(to_f64(recv).map_or(Value::Nil, Value::Float))
}

fn num_floor(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Float(f) => float_to_int(rt, f.floor()),
        other => Ok(other.clone()),
    }
}

fn num_ceil(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Float(f) => float_to_int(rt, f.ceil()),
        other => Ok(other.clone()),
    }
}

fn num_round(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let digits = match args.first() {
        Some(v) => int_arg(rt, v)?,
        None => 0,
    };
    match recv {
        Value::Float(f) if digits > 0 => {
            let scale = 10f64.powi(digits.min(15) as i32);
            Ok(Value::Float((f * scale).round() / scale))
        }
        Value::Float(f) => float_to_int(rt, f.round()),
        other => Ok(other.clone()),
    }
}

fn num_zero(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(to_f64(recv) == Some(0.0)))
}

fn int_even(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.as_int().is_some_and(|i| i % 2 == 0)))
}

fn int_odd(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.as_int().is_some_and(|i| i % 2 != 0)))
}

fn int_succ(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    arith(rt, recv, &Value::Int(1), OpKind::Plus)
}

fn int_pred(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    arith(rt, recv, &Value::Int(1), OpKind::Minus)
}

fn int_divmod(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let q = arith(rt, recv, &args[0], OpKind::Div)?;
    let r = arith(rt, recv, &args[0], OpKind::Mod)?;
    let q = match q {
        Value::Float(f) => Value::Float(f.floor()),
        other => other,
    };
    Ok(Value::array(vec![q, r]))
}

fn int_times(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let n = recv.as_int().unwrap_or(0);
    for i in 0..n {
        rt.call_block(&block, vec![Value::Int(i)])?;
    }
    Ok(recv.clone())
}

fn int_upto(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let from = recv.as_int().unwrap_or(0);
    let to = int_arg(rt, &args[0])?;
    for i in from..=to {
        rt.call_block(&block, vec![Value::Int(i)])?;
    }
    Ok(recv.clone())
}

fn int_downto(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let from = recv.as_int().unwrap_or(0);
    let to = int_arg(rt, &args[0])?;
    for i in (to..=from).rev() {
        rt.call_block(&block, vec![Value::Int(i)])?;
    }
    Ok(recv.clone())
}

fn float_nan(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(matches!(recv, Value::Float(f) if f.is_nan())))
}

fn float_infinite(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(match recv {
        Value::Float(f) if f.is_infinite() => Value::Int(if *f > 0.0 { 1 } else { -1 }),
        _ => Value::Nil,
    })
}

/// `<=>` through guest dispatch, as an ordering.
pub(crate) fn guest_cmp(rt: &mut Runtime, a: &Value, b: &Value) -> Result<Ordering, Flow> {
    let r = rt.call_method(a, Symbol::intern("<=>"), vec![b.clone()], None, CallKind::FCall)?;
    match r.as_int() {
        Some(i) => Ok(i.cmp(&0)),
        None => {
            let to = rt.vm.model.real_class_of(a).name();
            let from = rt.vm.model.real_class_of(b).name();
            Err(rt.error_msg(Exc::Argument, format!("comparison of {to} with {from} failed")))
        }
    }
}

macro_rules! comparable_ops {
    ($($name:ident => $test:expr),* $(,)?) => {
        $(
            fn $name(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
                let ord = guest_cmp(rt, recv, &args[0])?;
                let test: fn(Ordering) -> bool = $test;
                Ok(Value::Bool(test(ord)))
            }
        )*
    };
}

comparable_ops!(
    cmp_lt => |o| o == Ordering::Less,
    cmp_le => |o| o != Ordering::Greater,
    cmp_gt => |o| o == Ordering::Greater,
    cmp_ge => |o| o != Ordering::Less,
);

fn cmp_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    if recv.identical(&args[0]) {
        return Ok(Value::TRUE);
    }
    let r = rt.call_method(recv, Symbol::intern("<=>"), vec![args[0].clone()], None, CallKind::FCall)?;
    Ok(Value::Bool(r.as_int() == Some(0)))
}

fn cmp_between(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let above = guest_cmp(rt, recv, &args[0])? != Ordering::Less;
    let below = guest_cmp(rt, recv, &args[1])? != Ordering::Greater;
    Ok(Value::Bool(above && below))
}

fn cmp_clamp(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    if guest_cmp(rt, recv, &args[0])? == Ordering::Less {
        return Ok(args[0].clone());
    }
    if guest_cmp(rt, recv, &args[1])? == Ordering::Greater {
        return Ok(args[1].clone());
    }
    Ok(recv.clone())
}

pub(crate) fn install(r: &mut BuiltinRegistry) {
    for class in [pick::integer, pick::float] {
        r.register(class, "+", Arity::exact(1), num_plus);
        r.register(class, "-", Arity::exact(1), num_minus);
        r.register(class, "*", Arity::exact(1), num_mult);
        r.register(class, "/", Arity::exact(1), num_div);
        r.register(class, "%", Arity::exact(1), num_mod);
        r.register(class, "modulo", Arity::exact(1), num_mod);
        r.register(class, "**", Arity::exact(1), num_pow);
        r.register(class, "<", Arity::exact(1), num_lt);
        r.register(class, "<=", Arity::exact(1), num_le);
        r.register(class, ">", Arity::exact(1), num_gt);
        r.register(class, ">=", Arity::exact(1), num_ge);
        r.register(class, "==", Arity::exact(1), num_equal);
        r.register(class, "===", Arity::exact(1), num_equal);
        r.register(class, "<=>", Arity::exact(1), num_spaceship);
        r.register(class, "-@", Arity::exact(0), num_neg);
        r.register(class, "abs", Arity::exact(0), num_abs);
        r.register(class, "to_i", Arity::exact(0), num_to_i);
        r.register(class, "to_int", Arity::exact(0), num_to_i);
        r.register(class, "to_f", Arity::exact(0), num_to_f);
        r.register(class, "floor", Arity::exact(0), num_floor);
        r.register(class, "ceil", Arity::exact(0), num_ceil);
        r.register(class, "round", Arity::range(0, 1), num_round);
        r.register(class, "zero?", Arity::exact(0), num_zero);
        r.register(class, "divmod", Arity::exact(1), int_divmod);
    }

    r.register(pick::integer, "even?", Arity::exact(0), int_even);
    r.register(pick::integer, "odd?", Arity::exact(0), int_odd);
    r.register(pick::integer, "succ", Arity::exact(0), int_succ);
    r.register(pick::integer, "next", Arity::exact(0), int_succ);
    r.register(pick::integer, "pred", Arity::exact(0), int_pred);
    r.register(pick::integer, "times", Arity::exact(0), int_times);
    r.register(pick::integer, "upto", Arity::exact(1), int_upto);
    r.register(pick::integer, "downto", Arity::exact(1), int_downto);

    r.register(pick::float, "nan?", Arity::exact(0), float_nan);
    r.register(pick::float, "infinite?", Arity::exact(0), float_infinite);

    r.register(pick::comparable, "<", Arity::exact(1), cmp_lt);
    r.register(pick::comparable, "<=", Arity::exact(1), cmp_le);
    r.register(pick::comparable, ">", Arity::exact(1), cmp_gt);
    r.register(pick::comparable, ">=", Arity::exact(1), cmp_ge);
    r.register(pick::comparable, "==", Arity::exact(1), cmp_eq);
    r.register(pick::comparable, "between?", Arity::exact(2), cmp_between);
    r.register(pick::comparable, "clamp", Arity::exact(2), cmp_clamp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(i64::MIN, -1), None);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
    }

    #[test]
    fn mixed_equality() {
        assert!(num_eq(&Value::Int(2), &Value::Float(2.0)));
        assert!(!num_eq(&Value::Int(2), &Value::str("2")));
    }
}
