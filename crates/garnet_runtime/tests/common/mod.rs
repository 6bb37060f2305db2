use garnet_ir::Node;
use garnet_runtime::{ExecError, ExecResult, Runtime, Value};

/// Honors `RUST_LOG`; repeated calls are harmless.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn runtime() -> Runtime {
    init_logging();
    Runtime::new()
}

pub fn run(program: &Node) -> Result<ExecResult, ExecError> {
    runtime().compile_and_run(program)
}

pub fn eval(program: &Node) -> Value {
    match run(program) {
        Ok(result) => result.value,
        Err(err) => panic!("program failed: {err}"),
    }
}

pub fn eval_err(program: &Node) -> ExecError {
    match run(program) {
        Ok(result) => panic!("expected an error, got {:?}", result.value),
        Err(err) => err,
    }
}

pub fn ints(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .expect("array")
        .to_vec()
        .iter()
        .map(|v| v.as_int().expect("integer"))
        .collect()
}
