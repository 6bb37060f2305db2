//! State shared by every guest thread of one VM.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::bridge::{ForeignBridge, NullBridge};
use crate::builtins_registry::{BuiltinProvider, BuiltinRegistry, StdBuiltinProvider};
use crate::core::{FastHashMap, RObject, Symbol, Value};
use crate::gc::{Collector, RefCountCollector};
use crate::model::{ObjectModel, StdObjectModel};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::frame::FrameId;
use crate::runtime::registry::MethodRegistry;
use crate::runtime::thread::ThreadHandle;

/// Counters exposed through `Runtime::stats`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Stat {
    CacheHit,
    CacheMiss,
    Dispatch,
    FastPath,
    MethodMissing,
    ForeignForward,
    NamedArgRetry,
    AlternateSpelling,
    BlockCreated,
    BlockReused,
    BlockEscaped,
    ArityAdjusted,
    ExceptionRaised,
}

const STAT_COUNT: usize = Stat::ExceptionRaised as usize + 1;

pub struct RuntimeStats {
    counters: [AtomicU64; STAT_COUNT],
}

impl RuntimeStats {
    fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn bump(&self, stat: Stat) {
        self.counters[stat as usize].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, stat: Stat) -> u64 {
        self.counters[stat as usize].load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dispatches: u64,
    pub fast_path_hits: u64,
    pub method_missing_calls: u64,
    pub foreign_forwards: u64,
    pub named_arg_retries: u64,
    pub alternate_spellings: u64,
    pub blocks_created: u64,
    pub blocks_reused: u64,
    pub block_escapes: u64,
    pub arity_adjustments: u64,
    pub exceptions_raised: u64,
    pub compiles: u64,
}

pub struct Vm {
    pub(crate) model: Arc<dyn ObjectModel>,
    pub(crate) registry: MethodRegistry,
    pub(crate) collector: Arc<dyn Collector>,
    pub(crate) bridge: Arc<dyn ForeignBridge>,
    pub(crate) globals: RwLock<FastHashMap<Symbol, Value>>,
    pub(crate) stats: RuntimeStats,
    pub(crate) config: RuntimeConfig,
    pub(crate) main_obj: Value,
    pub(crate) main_thread: Arc<ThreadHandle>,
    output: Mutex<String>,
    next_frame: AtomicU64,
    next_block: AtomicU64,
    next_thread: AtomicU64,
}

impl Vm {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Self::with_seams(
            config,
            Arc::new(StdObjectModel::new()),
            Arc::new(RefCountCollector::new()),
            Arc::new(NullBridge),
        )
    }

    /// Builds a VM over caller-supplied collaborators and installs the core library.
    pub fn with_seams(
        config: RuntimeConfig,
        model: Arc<dyn ObjectModel>,
        collector: Arc<dyn Collector>,
        bridge: Arc<dyn ForeignBridge>,
    ) -> Arc<Self> {
        let registry = MethodRegistry::new(collector.clone(), config.eager_compile);
        let main_obj = Value::Object(Arc::new(RObject::new(model.core().object.clone())));
        let vm = Arc::new(Self {
            model,
            registry,
            collector,
            bridge,
            globals: RwLock::new(FastHashMap::default()),
            stats: RuntimeStats::new(),
            config,
            main_obj,
            main_thread: ThreadHandle::new(0),
            output: Mutex::new(String::new()),
            next_frame: AtomicU64::new(1),
            next_block: AtomicU64::new(1),
            next_thread: AtomicU64::new(1),
        });
        let mut builtins = BuiltinRegistry::new();
        StdBuiltinProvider.install(&mut builtins);
        debug!("installing {} core methods", builtins.len());
        builtins.install_into(vm.model.as_ref(), &vm.registry);
        vm
    }

    pub fn model(&self) -> &dyn ObjectModel {
        self.model.as_ref()
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.stats;
        StatsSnapshot {
            cache_hits: s.get(Stat::CacheHit),
            cache_misses: s.get(Stat::CacheMiss),
            dispatches: s.get(Stat::Dispatch),
            fast_path_hits: s.get(Stat::FastPath),
            method_missing_calls: s.get(Stat::MethodMissing),
            foreign_forwards: s.get(Stat::ForeignForward),
            named_arg_retries: s.get(Stat::NamedArgRetry),
            alternate_spellings: s.get(Stat::AlternateSpelling),
            blocks_created: s.get(Stat::BlockCreated),
            blocks_reused: s.get(Stat::BlockReused),
            block_escapes: s.get(Stat::BlockEscaped),
            arity_adjustments: s.get(Stat::ArityAdjusted),
            exceptions_raised: s.get(Stat::ExceptionRaised),
            compiles: self.registry.compile_count(),
        }
    }

    pub(crate) fn write_output(&self, s: &str, echo: bool) {
        if echo {
            print!("{s}");
        }
        self.output.lock().push_str(s);
    }

    pub(crate) fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock())
    }

    #[inline]
    pub(crate) fn next_frame_id(&self) -> FrameId {
        self.next_frame.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn next_block_id(&self) -> u64 {
        self.next_block.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_thread_id(&self) -> u64 {
        self.next_thread.fetch_add(1, Ordering::Relaxed)
    }
}
