mod common;

use common::{eval, ints};
use garnet_ir::build::*;
use garnet_ir::{Arg, Node};
use garnet_runtime::Value;

fn with_block(recv: Node, name: &str, args: Vec<Node>, params: &[&str], body: Node) -> Node {
    call_block(Some(recv), name, args, block(params, body))
}

fn to_proc(recv: Node, name: &str, selector: &str) -> Node {
    call_args(Some(recv), name, vec![Arg::BlockPass(sym(selector))], None)
}

#[test]
fn sort_then_map() {
    let prog = with_block(
        call(array(vec![int(3), int(1), int(2)]), "sort", vec![]),
        "map",
        vec![],
        &["x"],
        call(lvar("x"), "*", vec![int(2)]),
    );
    assert_eq!(ints(&eval(&prog)), [2, 4, 6]);
}

#[test]
fn inject_over_a_range() {
    let with_init = with_block(
        range(int(1), int(4), false),
        "inject",
        vec![int(0)],
        &["s", "x"],
        call(lvar("s"), "+", vec![lvar("x")]),
    );
    assert_eq!(eval(&with_init), Value::from(10));
    let by_symbol = call(range(int(1), int(5), true), "inject", vec![sym("*")]);
    assert_eq!(eval(&by_symbol), Value::from(24));
}

#[test]
fn hash_keeps_insertion_order() {
    let prog = lines(vec![
        lasgn("h", hash(vec![(sym("a"), int(1))])),
        index_asgn(lvar("h"), vec![sym("b")], int(2)),
        index_asgn(lvar("h"), vec![sym("a")], int(3)),
        array(vec![call(lvar("h"), "keys", vec![]), call(lvar("h"), "values", vec![])]),
    ]);
    let expected = Value::array(vec![
        Value::array(vec![Value::sym("a"), Value::sym("b")]),
        Value::array(vec![Value::from(3), Value::from(2)]),
    ]);
    assert_eq!(eval(&prog), expected);
}

#[test]
fn hash_and_array_inspect() {
    let prog = call(
        hash(vec![(sym("a"), int(1)), (str("b"), array(vec![nil(), float(1.5)]))]),
        "inspect",
        vec![],
    );
    assert_eq!(eval(&prog), Value::str("{:a=>1, \"b\"=>[nil, 1.5]}"));
}

#[test]
fn words_capitalized_through_symbol_procs() {
    let prog = call(
        to_proc(call(str("hello big world"), "split", vec![str(" ")]), "map", "capitalize"),
        "join",
        vec![str(" ")],
    );
    assert_eq!(eval(&prog), Value::str("Hello Big World"));
}

#[test]
fn substitution_with_strings_and_patterns() {
    let prog = array(vec![
        call(str("a-b-c"), "gsub", vec![str("-"), str("+")]),
        call(str("abc123def45"), "sub", vec![regexp("\\d+"), str("#")]),
        call(str("john smith"), "gsub", vec![regexp("(\\w+) (\\w+)"), str("\\2, \\1")]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            Value::str("a+b+c"),
            Value::str("abc#def45"),
            Value::str("smith, john"),
        ])
    );
}

#[test]
fn match_sets_numbered_groups() {
    let prog = lines(vec![
        call(regexp("(\\d+)-(\\d+)"), "=~", vec![str("call 555-1234 now")]),
        array(vec![gvar("$1"), gvar("$2")]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::str("555"), Value::str("1234")])
    );
}

#[test]
fn interpolation_converts_with_to_s() {
    let prog = dstr(vec![str("n="), int(3), str(", f="), float(2.5), str(", s="), sym("x"), str(", nil="), nil()]);
    assert_eq!(eval(&prog), Value::str("n=3, f=2.5, s=x, nil="));
}

#[test]
fn float_formatting() {
    let prog = array(vec![
        call(float(1e20), "to_s", vec![]),
        call(call(float(0.1), "+", vec![float(0.2)]), "to_s", vec![]),
        call(float(100.0), "to_s", vec![]),
        call(float(0.0001), "to_s", vec![]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            Value::str("1.0e+20"),
            Value::str("0.30000000000000004"),
            Value::str("100.0"),
            Value::str("0.0001"),
        ])
    );
}

#[test]
fn kernel_conversions() {
    let prog = array(vec![
        call(fcall("Integer", vec![str("42")]), "+", vec![fcall("Float", vec![str("1.5")])]),
        call(str("12abc"), "to_i", vec![]),
        call(int(255), "to_s", vec![int(16)]),
        fcall("String", vec![sym("sym")]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            Value::Float(43.5),
            Value::from(12),
            Value::str("ff"),
            Value::str("sym"),
        ])
    );
}

#[test]
fn bad_integer_string_raises_argument_error() {
    let prog = begin(
        fcall("Integer", vec![str("zz")]),
        vec![garnet_ir::build::rescue(vec![constant("ArgumentError")], None, sym("rejected"))],
        None,
        None,
    );
    assert_eq!(eval(&prog), Value::sym("rejected"));
}

#[test]
fn case_matches_ranges_and_classes() {
    let classify = |n: i64| {
        case(
            Some(int(n)),
            vec![
                (vec![range(int(1), int(5), false)], sym("low")),
                (vec![constant("Integer")], sym("int")),
            ],
            Some(sym("other")),
        )
    };
    assert_eq!(eval(&classify(3)), Value::sym("low"));
    assert_eq!(eval(&classify(7)), Value::sym("int"));
}

#[test]
fn module_method_reached_through_super() {
    let prog = lines(vec![
        module("Greet", def("hi", &[], call(str("hi "), "+", vec![vcall("name")]))),
        class(
            "Person",
            None,
            seq(vec![
                fcall("include", vec![constant("Greet")]),
                def("name", &[], str("ann")),
                def("hi", &[], call(zsuper(), "+", vec![str("!")])),
            ]),
        ),
        array(vec![
            call(call(constant("Person"), "new", vec![]), "hi", vec![]),
            call(call(constant("Person"), "ancestors", vec![]), "include?", vec![constant("Greet")]),
        ]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::str("hi ann!"), Value::TRUE])
    );
}

#[test]
fn explicit_super_passes_new_arguments() {
    let prog = lines(vec![
        class("Base", None, def("scale", &["x"], call(lvar("x"), "*", vec![int(10)]))),
        class(
            "Derived",
            Some(constant("Base")),
            def("scale", &["x"], call(super_(vec![call(lvar("x"), "+", vec![int(1)])]), "+", vec![int(1)])),
        ),
        call(call(constant("Derived"), "new", vec![]), "scale", vec![int(2)]),
    ]);
    assert_eq!(eval(&prog), Value::from(31));
}

#[test]
fn define_method_from_a_block() {
    let prog = lines(vec![
        class(
            "Doubler",
            None,
            call_block(None, "define_method", vec![sym("twice")], block(&["x"], call(lvar("x"), "*", vec![int(2)]))),
        ),
        call(call(constant("Doubler"), "new", vec![]), "twice", vec![int(4)]),
    ]);
    assert_eq!(eval(&prog), Value::from(8));
}

#[test]
fn comparable_derives_operators_from_spaceship() {
    let prog = lines(vec![
        class(
            "Version",
            None,
            seq(vec![
                fcall("include", vec![constant("Comparable")]),
                fcall("attr_reader", vec![sym("n")]),
                def("initialize", &["n"], iasgn("@n", lvar("n"))),
                def("<=>", &["other"], call(ivar("@n"), "<=>", vec![call(lvar("other"), "n", vec![])])),
            ]),
        ),
        lasgn("a", call(constant("Version"), "new", vec![int(1)])),
        lasgn("b", call(constant("Version"), "new", vec![int(2)])),
        array(vec![
            call(lvar("a"), "<", vec![lvar("b")]),
            call(lvar("a"), ">=", vec![lvar("b")]),
            call(lvar("a"), "==", vec![call(constant("Version"), "new", vec![int(1)])]),
        ]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::TRUE, Value::FALSE, Value::TRUE])
    );
}

#[test]
fn reflection_on_objects() {
    let prog = lines(vec![
        class(
            "Bag",
            None,
            seq(vec![
                def("initialize", &[], iasgn("@items", array(vec![]))),
                def("fill", &[], nil()),
            ]),
        ),
        lasgn("bag", call(constant("Bag"), "new", vec![])),
        array(vec![
            call(lvar("bag"), "respond_to?", vec![sym("fill")]),
            call(lvar("bag"), "respond_to?", vec![sym("empty")]),
            call(lvar("bag"), "is_a?", vec![constant("Object")]),
            call(lvar("bag"), "instance_variables", vec![]),
            call(call(lvar("bag"), "instance_variable_get", vec![sym("@items")]), "empty?", vec![]),
            call(call(lvar("bag"), "class", vec![]), "name", vec![]),
        ]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            Value::TRUE,
            Value::FALSE,
            Value::TRUE,
            Value::array(vec![Value::sym("@items")]),
            Value::TRUE,
            Value::str("Bag"),
        ])
    );
}

#[test]
fn send_reaches_private_methods_but_public_send_does_not() {
    let prog = lines(vec![
        def("hidden", &[], sym("found")),
        lasgn("direct", call(self_(), "send", vec![sym("hidden")])),
        lasgn(
            "blocked",
            begin(
                call(self_(), "public_send", vec![sym("hidden")]),
                vec![garnet_ir::build::rescue(vec![constant("NoMethodError")], None, sym("blocked"))],
                None,
                None,
            ),
        ),
        array(vec![lvar("direct"), lvar("blocked")]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::sym("found"), Value::sym("blocked")])
    );
}

#[test]
fn integer_iteration_helpers() {
    let prog = lines(vec![
        lasgn("acc", array(vec![])),
        with_block(int(3), "times", vec![], &["i"], call(lvar("acc"), "<<", vec![lvar("i")])),
        with_block(int(5), "downto", vec![int(4)], &["i"], call(lvar("acc"), "<<", vec![lvar("i")])),
        lvar("acc"),
    ]);
    assert_eq!(ints(&eval(&prog)), [0, 1, 2, 5, 4]);
}

#[test]
fn loop_stops_on_break() {
    let prog = lines(vec![
        lasgn("i", int(0)),
        call_block(
            None,
            "loop",
            vec![],
            block(
                &[],
                seq(vec![
                    lasgn("i", call(lvar("i"), "+", vec![int(1)])),
                    if_(call(lvar("i"), ">=", vec![int(4)]), break_(Some(lvar("i"))), None),
                ]),
            ),
        ),
    ]);
    assert_eq!(eval(&prog), Value::from(4));
}

#[test]
fn string_helpers() {
    let prog = array(vec![
        call(str("  pad  "), "strip", vec![]),
        call(str("abc"), "reverse", vec![]),
        call(str("az"), "succ", vec![]),
        call(str("zz"), "succ", vec![]),
        call(str("ab"), "center", vec![int(6), str("*")]),
        call(str("a\"b\n"), "inspect", vec![]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            Value::str("pad"),
            Value::str("cba"),
            Value::str("ba"),
            Value::str("aaa"),
            Value::str("**ab**"),
            Value::str("\"a\\\"b\\n\""),
        ])
    );
}

#[test]
fn instance_variable_names_need_the_at_sign() {
    let prog = begin(
        call(self_(), "instance_variable_get", vec![sym("count")]),
        vec![garnet_ir::build::rescue(vec![constant("NameError")], Some("e"), call(lvar("e"), "message", vec![]))],
        None,
        None,
    );
    assert_eq!(
        eval(&prog),
        Value::str("`count' is not allowed as an instance variable name")
    );
}

#[test]
fn oversized_arrays_raise_instead_of_allocating() {
    let failure = |body: Node| {
        begin(
            body,
            vec![garnet_ir::build::rescue(
                vec![constant("StandardError")],
                Some("e"),
                array(vec![
                    call(call(lvar("e"), "class", vec![]), "name", vec![]),
                    call(lvar("e"), "message", vec![]),
                ]),
            )],
            None,
            None,
        )
    };
    let prog = array(vec![
        failure(index_asgn(array(vec![]), vec![int(i64::MAX)], int(1))),
        failure(call(constant("Array"), "new", vec![int(1 << 40)])),
        failure(call(array(vec![int(1), int(2)]), "*", vec![int(1 << 62)])),
    ]);
    let pair = |class: &str, message: &str| Value::array(vec![Value::str(class), Value::str(message)]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![
            pair("IndexError", &format!("index {} too big", i64::MAX)),
            pair("ArgumentError", "array size too big"),
            pair("ArgumentError", "argument too big"),
        ])
    );
}

#[test]
fn assigning_past_the_end_pads_with_nil() {
    let prog = lines(vec![
        lasgn("a", array(vec![int(1)])),
        index_asgn(lvar("a"), vec![int(3)], int(4)),
        lvar("a"),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::from(1), Value::Nil, Value::Nil, Value::from(4)])
    );
}
