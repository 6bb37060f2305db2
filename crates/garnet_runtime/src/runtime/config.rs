//! Runtime configuration, result types and the control-flow signal.

use std::sync::Arc;

use crate::core::Value;
use crate::runtime::frame::FrameId;

/// Result of executing a program.
#[derive(Debug)]
pub struct ExecResult {
    pub value: Value,
    pub output: String,
}

/// Runtime configuration options.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Compile method bodies when they are defined instead of on first call.
    pub eager_compile: bool,
    /// Emit guarded inline paths for core operators.
    pub optimized_dispatch: bool,
    pub max_call_depth: usize,
    /// Also write guest output to the process stdout.
    pub echo_output: bool,
    pub backtrace_limit: usize,
    pub file_name: Arc<str>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            eager_compile: false,
            optimized_dispatch: true,
            max_call_depth: 2_000,
            echo_output: false,
            backtrace_limit: 64,
            file_name: Arc::from("main.rb"),
        }
    }
}

/// Where a `break` lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakTag {
    /// The innermost `while`/`until` of the same body.
    Loop,
    /// The call that was handed the block with this id.
    Block(u64),
}

/// Everything that can end an evaluation early.
///
/// Guest exceptions and non-local exits travel up as the `Err` side of `Eval`; each frame
/// decides whether a signal is addressed to it.
#[derive(Clone, Debug)]
pub enum Flow {
    Raise(Value),
    Break { value: Value, tag: BreakTag },
    Next(Value),
    Redo,
    Retry,
    Return(Value),
    /// `return` inside a block: lands on the method (or lambda) invocation `home`.
    BlockReturn { value: Value, home: FrameId },
    /// Thread cancellation. Runs `ensure` regions but no `rescue`.
    Kill,
    /// A jump with no valid target in its lexical position.
    BadTransfer(&'static str),
}

pub type Eval = Result<Value, Flow>;
