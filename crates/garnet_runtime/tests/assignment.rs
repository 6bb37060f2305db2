mod common;

use common::{eval, ints};
use garnet_ir::build::*;
use garnet_ir::{MultiTarget, Node, Target};
use garnet_runtime::Value;

fn nested(pre: Vec<Target>) -> Target {
    Target::Nested(Box::new(MultiTarget {
        pre: pre.into(),
        splat: None,
        post: Box::new([]),
    }))
}

fn read_back(names: &[&str]) -> Node {
    array(names.iter().map(|n| lvar(n)).collect())
}

#[test]
fn pairs_assign_positionally() {
    let prog = lines(vec![
        masgn(vec![local("a"), local("b")], None, vec![], array(vec![int(1), int(2)])),
        read_back(&["a", "b"]),
    ]);
    assert_eq!(ints(&eval(&prog)), [1, 2]);
}

#[test]
fn swap_reads_every_value_before_writing() {
    let prog = lines(vec![
        lasgn("a", int(1)),
        lasgn("b", int(2)),
        masgn(vec![local("a"), local("b")], None, vec![], array(vec![lvar("b"), lvar("a")])),
        read_back(&["a", "b"]),
    ]);
    assert_eq!(ints(&eval(&prog)), [2, 1]);
}

#[test]
fn splat_collects_the_middle() {
    let prog = lines(vec![
        masgn(
            vec![local("first")],
            Some(local("mid")),
            vec![local("last")],
            array(vec![int(1), int(2), int(3), int(4)]),
        ),
        array(vec![lvar("first"), lvar("mid"), lvar("last")]),
    ]);
    let expected = Value::array(vec![
        Value::from(1),
        Value::array(vec![Value::from(2), Value::from(3)]),
        Value::from(4),
    ]);
    assert_eq!(eval(&prog), expected);
}

#[test]
fn missing_values_become_nil_and_extras_are_dropped() {
    let short = lines(vec![
        masgn(vec![local("a"), local("b"), local("c")], None, vec![], array(vec![int(1)])),
        read_back(&["a", "b", "c"]),
    ]);
    assert_eq!(eval(&short), Value::array(vec![Value::from(1), Value::Nil, Value::Nil]));

    let long = lines(vec![
        masgn(vec![local("a")], None, vec![], array(vec![int(1), int(2)])),
        lvar("a"),
    ]);
    assert_eq!(eval(&long), Value::from(1));
}

#[test]
fn scalar_source_fills_the_first_target() {
    let prog = lines(vec![
        masgn(vec![local("a"), local("b")], None, vec![], int(5)),
        read_back(&["a", "b"]),
    ]);
    assert_eq!(eval(&prog), Value::array(vec![Value::from(5), Value::Nil]));
}

#[test]
fn nested_targets_destructure_inner_arrays() {
    let prog = lines(vec![
        masgn(
            vec![local("a"), nested(vec![local("b"), local("c")])],
            None,
            vec![],
            array(vec![int(1), array(vec![int(2), int(3)])]),
        ),
        read_back(&["a", "b", "c"]),
    ]);
    assert_eq!(ints(&eval(&prog)), [1, 2, 3]);
}

#[test]
fn round_trip_through_array_literal() {
    let prog = lines(vec![
        lasgn("src", array(vec![int(4), int(5), int(6)])),
        masgn(vec![local("x"), local("y"), local("z")], None, vec![], lvar("src")),
        call(read_back(&["x", "y", "z"]), "==", vec![lvar("src")]),
    ]);
    assert_eq!(eval(&prog), Value::TRUE);
}

#[test]
fn attribute_and_index_targets_dispatch_setters() {
    let prog = lines(vec![
        class(
            "Box",
            None,
            fcall("attr_accessor", vec![sym("content")]),
        ),
        lasgn("b", call(constant("Box"), "new", vec![])),
        lasgn("h", hash(vec![])),
        masgn(
            vec![
                Target::Attr {
                    recv: lvar("b"),
                    name: "content".into(),
                },
                Target::Index {
                    recv: lvar("h"),
                    args: plain(vec![sym("k")]),
                },
            ],
            None,
            vec![],
            array(vec![int(1), int(2)]),
        ),
        array(vec![call(lvar("b"), "content", vec![]), index(lvar("h"), sym("k"))]),
    ]);
    assert_eq!(ints(&eval(&prog)), [1, 2]);
}

fn index(recv: Node, key: Node) -> Node {
    call(recv, "[]", vec![key])
}

#[test]
fn operator_assignment_on_locals_ivars_and_or_and() {
    let prog = lines(vec![
        lasgn("n", int(1)),
        op_asgn(garnet_ir::OpTarget::Local("n".into()), "+", int(4)),
        op_asgn(garnet_ir::OpTarget::Local("missing".into()), "||", int(9)),
        op_asgn(garnet_ir::OpTarget::Local("n".into()), "&&", call(lvar("n"), "*", vec![int(2)])),
        read_back(&["n", "missing"]),
    ]);
    assert_eq!(ints(&eval(&prog)), [10, 9]);
}
