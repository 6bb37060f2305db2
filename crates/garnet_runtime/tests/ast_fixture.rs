mod common;

use std::path::PathBuf;

use common::runtime;
use garnet_ir::Node;
use garnet_runtime::Value;

fn fixture(name: &str) -> Node {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let text = std::fs::read_to_string(&path).expect("fixture readable");
    serde_json::from_str(&text).expect("fixture parses")
}

#[test]
fn serialized_program_runs() {
    let prog = fixture("counter.json");
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap();
    assert_eq!(out.value, Value::from(15));
    assert_eq!(out.output, "5\n");
}

#[test]
fn methods_compile_once_on_first_call() {
    let prog = fixture("counter.json");
    let mut rt = runtime();
    rt.compile_and_run(&prog).unwrap();
    let compiles = rt.stats().compiles;
    rt.compile_and_run(&garnet_ir::build::call(
        garnet_ir::build::call(garnet_ir::build::constant("Counter"), "new", vec![]),
        "bump",
        vec![garnet_ir::build::int(1)],
    ))
    .unwrap();
    assert_eq!(rt.stats().compiles, compiles);
}

#[test]
fn eager_mode_compiles_at_definition() {
    let prog = fixture("counter.json");
    let mut rt = runtime();
    rt.set_eager_compile(true);
    rt.compile_and_run(&prog).unwrap();
    assert_eq!(rt.compile_all_pending(), 0);
    assert!(rt.stats().compiles >= 2);
}

#[test]
fn uncalled_methods_stay_pending_until_forced() {
    let prog = garnet_ir::build::class(
        "Idle",
        None,
        garnet_ir::build::seq(vec![
            garnet_ir::build::def("a", &[], garnet_ir::build::int(1)),
            garnet_ir::build::def("b", &[], garnet_ir::build::int(2)),
        ]),
    );
    let mut rt = runtime();
    rt.compile_and_run(&prog).unwrap();
    assert_eq!(rt.compile_all_pending(), 2);
    assert_eq!(rt.compile_all_pending(), 0);
}
