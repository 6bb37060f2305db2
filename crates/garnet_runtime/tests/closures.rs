mod common;

use common::{eval, ints, runtime};
use garnet_ir::build::*;
use garnet_runtime::Value;

fn make_counter() -> garnet_ir::Node {
    def(
        "make_counter",
        &[],
        seq(vec![
            lasgn("n", int(0)),
            fcall_block("proc", block(&[], op_asgn(garnet_ir::OpTarget::Local("n".into()), "+", int(1)))),
        ]),
    )
}

fn fcall_block(name: &str, blk: garnet_ir::BlockNode) -> garnet_ir::Node {
    call_block(None, name, vec![], blk)
}

#[test]
fn escaped_block_keeps_counting() {
    let prog = lines(vec![
        make_counter(),
        lasgn("c", fcall("make_counter", vec![])),
        array(vec![call(lvar("c"), "call", vec![]), call(lvar("c"), "call", vec![])]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(ints(&out), [1, 2]);
    assert_eq!(rt.stats().block_escapes, 1);
}

#[test]
fn each_counter_owns_its_own_cell() {
    let prog = lines(vec![
        make_counter(),
        lasgn("a", fcall("make_counter", vec![])),
        lasgn("b", fcall("make_counter", vec![])),
        call(lvar("a"), "call", vec![]),
        call(lvar("a"), "call", vec![]),
        array(vec![call(lvar("a"), "call", vec![]), call(lvar("b"), "call", vec![])]),
    ]);
    assert_eq!(ints(&eval(&prog)), [3, 1]);
}

#[test]
fn blocks_sharing_a_local_see_each_others_writes() {
    let pair = def(
        "pair",
        &[],
        seq(vec![
            lasgn("x", int(10)),
            lasgn("set", fcall_block("lambda", block(&["v"], lasgn("x", lvar("v"))))),
            lasgn("get", fcall_block("lambda", block(&[], lvar("x")))),
            lasgn("x", int(11)),
            array(vec![lvar("set"), lvar("get")]),
        ]),
    );
    let prog = lines(vec![
        pair,
        masgn(vec![local("s"), local("g")], None, vec![], fcall("pair", vec![])),
        lasgn("before", call(lvar("g"), "call", vec![])),
        call(lvar("s"), "call", vec![int(99)]),
        array(vec![lvar("before"), call(lvar("g"), "call", vec![])]),
    ]);
    assert_eq!(ints(&eval(&prog)), [11, 99]);
}

#[test]
fn block_with_exact_arguments_skips_adjustment() {
    let prog = lines(vec![
        lasgn("pr", fcall_block("proc", block(&["a", "b"], array(vec![lvar("a"), lvar("b")])))),
        lasgn("spread", call(lvar("pr"), "call", vec![int(1), int(2)])),
        lasgn("packed", call(lvar("pr"), "call", vec![array(vec![int(1), int(2)])])),
        array(vec![lvar("spread"), lvar("packed")]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    let items = out.as_array().unwrap().to_vec();
    assert_eq!(ints(&items[0]), [1, 2]);
    assert_eq!(items[0], items[1]);
    assert_eq!(rt.stats().arity_adjustments, 0);
}

#[test]
fn loose_block_pads_and_truncates() {
    let prog = lines(vec![
        lasgn("pr", fcall_block("proc", block(&["a", "b"], array(vec![lvar("a"), lvar("b")])))),
        array(vec![
            call(lvar("pr"), "call", vec![int(1)]),
            call(lvar("pr"), "call", vec![int(1), int(2), int(3)]),
        ]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    let expected = Value::array(vec![
        Value::array(vec![Value::from(1), Value::Nil]),
        Value::array(vec![Value::from(1), Value::from(2)]),
    ]);
    assert_eq!(out, expected);
    assert_eq!(rt.stats().arity_adjustments, 2);
}

#[test]
fn lambda_rejects_wrong_argument_count() {
    let prog = lines(vec![
        lasgn("l", lambda(&["a", "b"], lvar("a"))),
        begin(
            call(lvar("l"), "call", vec![int(1)]),
            vec![rescue(vec![constant("ArgumentError")], None, sym("strict"))],
            None,
            None,
        ),
    ]);
    assert_eq!(eval(&prog), Value::sym("strict"));
}

#[test]
fn yield_spreads_array_over_block_params() {
    let prog = lines(vec![
        def("twice", &[], seq(vec![yield_(vec![array(vec![int(1), int(2)])]), yield_(vec![int(3), int(4)])])),
        lasgn("sum", int(0)),
        call_block(
            None,
            "twice",
            vec![],
            block(
                &["a", "b"],
                lasgn("sum", call(lvar("sum"), "+", vec![call(lvar("a"), "*", vec![lvar("b")])])),
            ),
        ),
        lvar("sum"),
    ]);
    assert_eq!(eval(&prog), Value::from(14));
}

#[test]
fn block_literal_in_a_loop_is_reused_until_it_escapes() {
    let prog = lines(vec![
        lasgn("total", int(0)),
        lasgn("i", int(0)),
        while_(
            call(lvar("i"), "<", vec![int(5)]),
            seq(vec![
                call_block(
                    Some(array(vec![int(1), int(2)])),
                    "each",
                    vec![],
                    block(&["x"], lasgn("total", call(lvar("total"), "+", vec![lvar("x")]))),
                ),
                lasgn("i", call(lvar("i"), "+", vec![int(1)])),
            ]),
        ),
        lvar("total"),
    ]);
    let mut rt = runtime();
    assert_eq!(rt.compile_and_run(&prog).unwrap().value, Value::from(15));
    let stats = rt.stats();
    assert_eq!(stats.blocks_created, 1);
    assert_eq!(stats.blocks_reused, 4);
    assert_eq!(stats.block_escapes, 0);
}

#[test]
fn break_from_block_ends_the_call() {
    let prog = call_block(
        Some(array(vec![int(1), int(2), int(3)])),
        "each",
        vec![],
        block(&["x"], if_(call(lvar("x"), "==", vec![int(2)]), break_(Some(sym("stopped"))), None)),
    );
    assert_eq!(eval(&prog), Value::sym("stopped"));
}

#[test]
fn next_in_block_supplies_the_block_value() {
    let prog = call_block(
        Some(array(vec![int(1), int(2), int(3)])),
        "map",
        vec![],
        block(
            &["x"],
            seq(vec![
                if_(call(lvar("x"), "==", vec![int(2)]), next(Some(int(0))), None),
                call(lvar("x"), "*", vec![int(10)]),
            ]),
        ),
    );
    assert_eq!(ints(&eval(&prog)), [10, 0, 30]);
}

#[test]
fn return_inside_block_leaves_the_home_method() {
    let prog = lines(vec![
        def(
            "first_even",
            &["items"],
            seq(vec![
                call_block(
                    Some(lvar("items")),
                    "each",
                    vec![],
                    block(
                        &["x"],
                        if_(call(call(lvar("x"), "%", vec![int(2)]), "==", vec![int(0)]), return_(Some(lvar("x"))), None),
                    ),
                ),
                nil(),
            ]),
        ),
        fcall("first_even", vec![array(vec![int(3), int(8), int(5)])]),
    ]);
    assert_eq!(eval(&prog), Value::from(8));
}

#[test]
fn symbol_to_proc_maps_selectors() {
    let prog = call_args(
        Some(array(vec![str("a"), str("b")])),
        "map",
        vec![garnet_ir::Arg::BlockPass(sym("upcase"))],
        None,
    );
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::str("A"), Value::str("B")])
    );
}
