//! Guest threads: per-thread interpreter state and the shared handle behind `Thread`.
//!
//! Every guest thread is an OS thread running its own `Runtime` over the shared `Vm`.
//! Cancellation is cooperative: `kill` raises a flag and wakes a sleeping thread, and the
//! target unwinds with `Flow::Kill` the next time it enters a method, takes a loop
//! back-edge or sleeps. The flag is consumed when seen; `Kill` is not rescuable but runs
//! every pending `ensure`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{FastIndexMap, Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::config::Flow;
use crate::runtime::frame::FrameId;
use crate::runtime::unit::Visibility;

/// One entry of the class-context stack: where `def` installs methods and with which
/// default visibility.
#[derive(Clone)]
pub struct CrefEntry {
    pub class: ClassRef,
    pub visibility: Visibility,
    pub module_function: bool,
}

impl CrefEntry {
    pub fn new(class: ClassRef, visibility: Visibility) -> Self {
        Self {
            class,
            visibility,
            module_function: false,
        }
    }
}

/// A live guest invocation, for backtraces and the depth limit.
pub struct CallRecord {
    pub label: Arc<str>,
    pub file: Arc<str>,
    /// Line the caller was executing when it made the call.
    pub caller_line: u32,
}

pub struct VmThreadState {
    pub(crate) cref: Vec<CrefEntry>,
    /// Exceptions being handled, innermost last; `$!` is the top.
    pub(crate) exceptions: Vec<Value>,
    pub(crate) calls: Vec<CallRecord>,
    pub(crate) line: u32,
    /// Frames a block `return` may still land on.
    pub(crate) homes: Vec<FrameId>,
    /// Blocks whose literal call site is still running.
    pub(crate) break_targets: Vec<u64>,
    pub(crate) last_match: Option<Vec<Option<String>>>,
    pub(crate) safe_level: i64,
    /// Exit status of the last joined thread (`$?`).
    pub(crate) last_status: Value,
    pub(crate) missing_reason: Option<super::MissingReason>,
    pub(crate) handle: Arc<ThreadHandle>,
}

impl VmThreadState {
    pub fn new(handle: Arc<ThreadHandle>, top: ClassRef) -> Self {
        Self {
            cref: vec![CrefEntry::new(top, Visibility::Private)],
            exceptions: Vec::new(),
            calls: Vec::new(),
            line: 0,
            homes: Vec::new(),
            break_targets: Vec::new(),
            last_match: None,
            safe_level: 0,
            last_status: Value::Nil,
            missing_reason: None,
            handle,
        }
    }

    #[inline]
    pub fn cref(&self) -> &CrefEntry {
        match self.cref.last() {
            Some(entry) => entry,
            None => panic!("class context stack is empty"),
        }
    }

    pub fn cref_mut(&mut self) -> &mut CrefEntry {
        match self.cref.last_mut() {
            Some(entry) => entry,
            None => panic!("class context stack is empty"),
        }
    }

    pub fn current_exception(&self) -> Option<&Value> {
        self.exceptions.last()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Run,
    Sleep,
    Finished,
    /// Ended by an exception or a kill.
    Aborted,
}

/// How a guest thread ended.
#[derive(Clone)]
pub enum ThreadOutcome {
    Value(Value),
    Raised(Value),
    Killed,
}

struct Slot {
    status: ThreadStatus,
    outcome: Option<ThreadOutcome>,
    wakeup: bool,
}

pub struct ThreadHandle {
    id: u64,
    slot: Mutex<Slot>,
    killed: AtomicBool,
    wake: Condvar,
    done: Condvar,
    os: Mutex<Option<JoinHandle<()>>>,
    locals: Mutex<FastIndexMap<Symbol, Value>>,
}

impl ThreadHandle {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            slot: Mutex::new(Slot {
                status: ThreadStatus::Run,
                outcome: None,
                wakeup: false,
            }),
            killed: AtomicBool::new(false),
            wake: Condvar::new(),
            done: Condvar::new(),
            os: Mutex::new(None),
            locals: Mutex::new(FastIndexMap::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn attach(&self, os: JoinHandle<()>) {
        *self.os.lock() = Some(os);
    }

    /// Consumes a pending kill request. Only the first observer sees it, so `ensure` bodies
    /// run by the resulting unwind can still call methods.
    #[inline]
    fn take_kill(&self) -> bool {
        self.killed.load(Ordering::Relaxed) && self.killed.swap(false, Ordering::AcqRel)
    }

    /// `Err(Flow::Kill)` the first time after a kill was requested.
    #[inline]
    pub(crate) fn check(&self) -> Result<(), Flow> {
        if self.take_kill() { Err(Flow::Kill) } else { Ok(()) }
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
        let _slot = self.slot.lock();
        self.wake.notify_all();
    }

    pub fn wakeup(&self) {
        let mut slot = self.slot.lock();
        slot.wakeup = true;
        self.wake.notify_all();
    }

    /// Blocks for `duration` (forever when `None` or past the clock's range) or until woken
    /// or killed.
    pub(crate) fn sleep(&self, duration: Option<Duration>) -> Result<Duration, Flow> {
        let start = Instant::now();
        let deadline = duration.and_then(|d| start.checked_add(d));
        let mut slot = self.slot.lock();
        slot.status = ThreadStatus::Sleep;
        loop {
            if self.take_kill() {
                slot.status = ThreadStatus::Run;
                return Err(Flow::Kill);
            }
            if slot.wakeup {
                slot.wakeup = false;
                break;
            }
            match deadline {
                Some(at) => {
                    if Instant::now() >= at {
                        break;
                    }
                    self.wake.wait_until(&mut slot, at);
                }
                None => self.wake.wait(&mut slot),
            }
        }
        slot.status = ThreadStatus::Run;
        Ok(start.elapsed())
    }

    pub(crate) fn finish(&self, outcome: ThreadOutcome) {
        let mut slot = self.slot.lock();
        slot.status = match outcome {
            ThreadOutcome::Value(_) => ThreadStatus::Finished,
            _ => ThreadStatus::Aborted,
        };
        slot.outcome = Some(outcome);
        self.done.notify_all();
    }

    pub fn status(&self) -> ThreadStatus {
        self.slot.lock().status
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.status(), ThreadStatus::Finished | ThreadStatus::Aborted)
    }

    /// Waits for the thread to end. `None` when `limit` elapsed first.
    pub(crate) fn join(&self, limit: Option<Duration>) -> Option<ThreadOutcome> {
        let outcome = {
            let mut slot = self.slot.lock();
            let deadline = limit.and_then(|d| Instant::now().checked_add(d));
            while slot.outcome.is_none() {
                match deadline {
                    Some(at) => {
                        if self.done.wait_until(&mut slot, at).timed_out() {
                            return None;
                        }
                    }
                    None => self.done.wait(&mut slot),
                }
            }
            slot.outcome.clone()
        };
        if let Some(os) = self.os.lock().take() {
            if os.join().is_err() {
                log::error!("guest thread {} panicked", self.id);
            }
        }
        outcome
    }

    pub fn local_get(&self, key: Symbol) -> Value {
        self.locals.lock().get(&key).cloned().unwrap_or(Value::Nil)
    }

    pub fn local_set(&self, key: Symbol, value: Value) {
        self.locals.lock().insert(key, value);
    }
}
