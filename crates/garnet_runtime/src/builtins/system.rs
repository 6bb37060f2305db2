//! `Kernel#sleep` and `Thread`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use super::common::{need_block, pick, sym_arg, to_f64};
use crate::builtins_registry::BuiltinRegistry;
use crate::core::Value;
use crate::errors::messages;
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::exception::Exc;
use crate::runtime::thread::{ThreadHandle, ThreadOutcome, ThreadStatus};

const THREAD_STACK_SIZE: usize = 16 * 1024 * 1024;

/// How often a blocked `join` looks for a kill request against the joining thread.
const JOIN_POLL: Duration = Duration::from_millis(20);

/// Records an outcome for a guest thread that unwound without reaching `finish`.
struct FinishGuard {
    handle: Arc<ThreadHandle>,
    armed: bool,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.finish(ThreadOutcome::Killed);
        }
    }
}

fn seconds_arg(rt: &mut Runtime, value: &Value) -> Result<Option<Duration>, Flow> {
    if value.is_nil() {
        return Ok(None);
    }
    match to_f64(value) {
        Some(secs) if secs.is_nan() => Err(rt.error_msg(Exc::FloatDomain, "NaN")),
        Some(secs) if secs < 0.0 => Err(rt.error_msg(Exc::Argument, "time interval must not be negative")),
        Some(secs) if secs.is_infinite() => Err(rt.error_msg(Exc::FloatDomain, "Infinity")),
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(d) => Ok(Some(d)),
            Err(_) => {
                let shown = super::conversion::format_float(secs);
                Err(rt.error_msg(Exc::Range, format!("time interval {shown} out of range")))
            }
        },
        None => Err(super::common::conversion_error(rt, value, "time interval")),
    }
}

fn handle_of<'a>(rt: &mut Runtime, recv: &'a Value) -> Result<&'a Arc<ThreadHandle>, Flow> {
    match recv {
        Value::Thread(t) => Ok(t),
        other => Err(super::common::conversion_error(rt, other, "Thread")),
    }
}

fn k_sleep(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let duration = match args.first() {
        Some(v) => seconds_arg(rt, v)?,
        None => None,
    };
    let slept = rt.thread.handle.sleep(duration)?;
    Ok(Value::Int(slept.as_secs_f64().round() as i64))
}

fn thread_s_new(rt: &mut Runtime, _: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    rt.reify_block(&block);
    let vm = rt.vm.clone();
    let handle = ThreadHandle::new(vm.next_thread_id());
    let child = handle.clone();
    let args = args.to_vec();
    let spawned = std::thread::Builder::new()
        .name(format!("garnet-thread-{}", handle.id()))
        .stack_size(THREAD_STACK_SIZE)
        .spawn(move || {
            let mut guard = FinishGuard {
                handle: child.clone(),
                armed: true,
            };
            let mut runtime = Runtime::for_thread(vm, child.clone());
            let outcome = match runtime.call_proc(&block, args, None) {
                Ok(value) => ThreadOutcome::Value(value),
                Err(Flow::Raise(exc)) => ThreadOutcome::Raised(exc),
                Err(Flow::Kill) => ThreadOutcome::Killed,
                Err(other) => {
                    let message = runtime.host_error(other).to_string();
                    let class = runtime.vm.model.core().thread_error.clone();
                    ThreadOutcome::Raised(runtime.new_exception(&class, &message))
                }
            };
            debug!("guest thread {} finished", child.id());
            guard.armed = false;
            child.finish(outcome);
        });
    match spawned {
        Ok(os) => {
            handle.attach(os);
            Ok(Value::Thread(handle))
        }
        Err(err) => Err(rt.error_msg(Exc::Thread, format!("can't create Thread: {err}"))),
    }
}

/// Waits for `target`, staying responsive to a kill of the joining thread.
fn wait_for(rt: &mut Runtime, target: &Arc<ThreadHandle>, limit: Option<Duration>) -> Result<Option<ThreadOutcome>, Flow> {
    if Arc::ptr_eq(target, &rt.thread.handle) {
        return Err(rt.error_msg(Exc::Thread, messages::THREAD_JOIN_SELF));
    }
    let deadline = limit.and_then(|d| Instant::now().checked_add(d));
    loop {
        let slice = match deadline {
            Some(at) => at.saturating_duration_since(Instant::now()).min(JOIN_POLL),
            None => JOIN_POLL,
        };
        if let Some(outcome) = target.join(Some(slice)) {
            rt.thread.last_status = Value::Int(match outcome {
                ThreadOutcome::Value(_) => 0,
                _ => 1,
            });
            return Ok(Some(outcome));
        }
        rt.thread.handle.check()?;
        if deadline.is_some_and(|at| Instant::now() >= at) {
            return Ok(None);
        }
    }
}

fn thread_join(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let target = handle_of(rt, recv)?.clone();
    let limit = match args.first() {
        Some(v) => seconds_arg(rt, v)?,
        None => None,
    };
    match wait_for(rt, &target, limit)? {
        None => Ok(Value::Nil),
        Some(ThreadOutcome::Raised(exc)) => Err(rt.raise(exc)),
        Some(_) => Ok(recv.clone()),
    }
}

fn thread_value(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let target = handle_of(rt, recv)?.clone();
    match wait_for(rt, &target, None)? {
        Some(ThreadOutcome::Value(v)) => Ok(v),
        Some(ThreadOutcome::Raised(exc)) => Err(rt.raise(exc)),
        Some(ThreadOutcome::Killed) | None => Ok(Value::Nil),
    }
}

fn thread_alive(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(handle_of(rt, recv)?.is_alive()))
}

/// `"run"`, `"sleep"`, `false` once finished normally, `nil` after an exception or kill.
fn thread_status(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(match handle_of(rt, recv)?.status() {
        ThreadStatus::Run => Value::str("run"),
        ThreadStatus::Sleep => Value::str("sleep"),
        ThreadStatus::Finished => Value::FALSE,
        ThreadStatus::Aborted => Value::Nil,
    })
}

fn thread_kill(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let target = handle_of(rt, recv)?.clone();
    debug!("kill requested for guest thread {}", target.id());
    if Arc::ptr_eq(&target, &rt.thread.handle) {
        return Err(Flow::Kill);
    }
    target.kill();
    Ok(recv.clone())
}

fn thread_wakeup(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let target = handle_of(rt, recv)?;
    if !target.is_alive() {
        return Err(rt.error_msg(Exc::Thread, "killed thread"));
    }
    target.wakeup();
    Ok(recv.clone())
}

fn thread_s_current(rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Thread(rt.thread.handle.clone()))
}

fn thread_s_main(rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Thread(rt.vm.main_thread.clone()))
}

fn thread_s_pass(_rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    std::thread::yield_now();
    Ok(Value::Nil)
}

fn thread_aref(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let key = sym_arg(rt, &args[0])?;
    Ok(handle_of(rt, recv)?.local_get(key))
}

fn thread_aset(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let key = sym_arg(rt, &args[0])?;
    handle_of(rt, recv)?.local_set(key, args[1].clone());
    Ok(args[1].clone())
}

pub(crate) fn install(r: &mut BuiltinRegistry) {
    r.register_private(pick::kernel, "sleep", Arity::range(0, 1), k_sleep);

    r.register_singleton(pick::thread, "new", Arity::any(), thread_s_new);
    r.register_singleton(pick::thread, "start", Arity::any(), thread_s_new);
    r.register_singleton(pick::thread, "current", Arity::exact(0), thread_s_current);
    r.register_singleton(pick::thread, "main", Arity::exact(0), thread_s_main);
    r.register_singleton(pick::thread, "pass", Arity::exact(0), thread_s_pass);
    r.register(pick::thread, "join", Arity::range(0, 1), thread_join);
    r.register(pick::thread, "value", Arity::exact(0), thread_value);
    r.register(pick::thread, "alive?", Arity::exact(0), thread_alive);
    r.register(pick::thread, "status", Arity::exact(0), thread_status);
    r.register(pick::thread, "kill", Arity::exact(0), thread_kill);
    r.register(pick::thread, "exit", Arity::exact(0), thread_kill);
    r.register(pick::thread, "terminate", Arity::exact(0), thread_kill);
    r.register(pick::thread, "wakeup", Arity::exact(0), thread_wakeup);
    r.register(pick::thread, "run", Arity::exact(0), thread_wakeup);
    r.register(pick::thread, "[]", Arity::exact(1), thread_aref);
    r.register(pick::thread, "[]=", Arity::exact(2), thread_aset);
}
