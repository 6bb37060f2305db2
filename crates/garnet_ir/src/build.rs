//! Constructor helpers for assembling trees by hand.
//!
//! ```
//! use garnet_ir::build::*;
//! let prog = seq(vec![lasgn("a", int(1)), call(lvar("a"), "+", vec![int(2)])]);
//! assert!(matches!(prog, garnet_ir::Node::Seq(_)));
//! ```

use crate::ast::*;

pub fn nil() -> Node {
    Node::Nil
}

pub fn true_() -> Node {
    Node::True
}

pub fn false_() -> Node {
    Node::False
}

pub fn self_() -> Node {
    Node::SelfRef
}

pub fn int(v: i64) -> Node {
    Node::Int(v)
}

pub fn float(v: f64) -> Node {
    Node::Float(v)
}

pub fn str(s: &str) -> Node {
    Node::Str(s.to_string())
}

pub fn dstr(parts: Vec<Node>) -> Node {
    Node::DStr(parts.into())
}

pub fn sym(s: &str) -> Node {
    Node::Sym(s.to_string())
}

pub fn array(items: Vec<Node>) -> Node {
    Node::Array(items.into())
}

pub fn hash(pairs: Vec<(Node, Node)>) -> Node {
    Node::Hash(pairs.into())
}

pub fn range(lo: Node, hi: Node, exclusive: bool) -> Node {
    Node::Range {
        lo: Box::new(lo),
        hi: Box::new(hi),
        exclusive,
    }
}

pub fn regexp(source: &str) -> Node {
    Node::Regexp {
        source: source.to_string(),
        ignore_case: false,
    }
}

pub fn splat(node: Node) -> Node {
    Node::Splat(Box::new(node))
}

pub fn seq(items: Vec<Node>) -> Node {
    Node::Seq(items.into())
}

pub fn line(line: u32, node: Node) -> Node {
    Node::Newline {
        line,
        node: Box::new(node),
    }
}

/// Wraps each statement in a `Newline` node, numbering from 1.
pub fn lines(items: Vec<Node>) -> Node {
    seq(items
        .into_iter()
        .enumerate()
        .map(|(i, n)| line(i as u32 + 1, n))
        .collect())
}

pub fn lvar(name: &str) -> Node {
    Node::LVar(name.to_string())
}

pub fn lasgn(name: &str, value: Node) -> Node {
    Node::LAsgn(name.to_string(), Box::new(value))
}

pub fn ivar(name: &str) -> Node {
    Node::IVar(name.to_string())
}

pub fn iasgn(name: &str, value: Node) -> Node {
    Node::IAsgn(name.to_string(), Box::new(value))
}

pub fn cvar(name: &str) -> Node {
    Node::CVar(name.to_string())
}

pub fn cvasgn(name: &str, value: Node) -> Node {
    Node::CVAsgn(name.to_string(), Box::new(value))
}

pub fn gvar(name: &str) -> Node {
    Node::GVar(name.to_string())
}

pub fn gasgn(name: &str, value: Node) -> Node {
    Node::GAsgn(name.to_string(), Box::new(value))
}

pub fn constant(name: &str) -> Node {
    Node::Const(name.to_string())
}

pub fn colon2(scope: Node, name: &str) -> Node {
    Node::Colon2 {
        scope: Box::new(scope),
        name: name.to_string(),
    }
}

pub fn cdecl(name: &str, value: Node) -> Node {
    Node::CDecl {
        scope: None,
        name: name.to_string(),
        value: Box::new(value),
    }
}

pub fn attr_asgn(recv: Node, name: &str, value: Node) -> Node {
    Node::AttrAsgn {
        recv: Box::new(recv),
        selector: format!("{name}="),
        args: Box::new([]),
        value: Box::new(value),
    }
}

pub fn index_asgn(recv: Node, index: Vec<Node>, value: Node) -> Node {
    Node::AttrAsgn {
        recv: Box::new(recv),
        selector: "[]=".to_string(),
        args: plain(index),
        value: Box::new(value),
    }
}

pub fn op_asgn(target: OpTarget, op: &str, value: Node) -> Node {
    Node::OpAsgn {
        target: Box::new(target),
        op: op.to_string(),
        value: Box::new(value),
    }
}

pub fn masgn(pre: Vec<Target>, splat: Option<Target>, post: Vec<Target>, value: Node) -> Node {
    Node::MAsgn {
        targets: Box::new(MultiTarget {
            pre: pre.into(),
            splat,
            post: post.into(),
        }),
        value: Box::new(value),
    }
}

pub fn local(name: &str) -> Target {
    Target::Local(name.to_string())
}

pub fn if_(cond: Node, then: Node, els: Option<Node>) -> Node {
    Node::If {
        cond: Box::new(cond),
        then: Some(Box::new(then)),
        els: els.map(Box::new),
    }
}

pub fn unless(cond: Node, body: Node) -> Node {
    Node::If {
        cond: Box::new(cond),
        then: None,
        els: Some(Box::new(body)),
    }
}

pub fn and(l: Node, r: Node) -> Node {
    Node::And(Box::new(l), Box::new(r))
}

pub fn or(l: Node, r: Node) -> Node {
    Node::Or(Box::new(l), Box::new(r))
}

pub fn not(n: Node) -> Node {
    Node::Not(Box::new(n))
}

pub fn case(subject: Option<Node>, whens: Vec<(Vec<Node>, Node)>, els: Option<Node>) -> Node {
    Node::Case {
        subject: subject.map(Box::new),
        whens: whens
            .into_iter()
            .map(|(conds, body)| When {
                conds: conds.into(),
                body,
            })
            .collect(),
        els: els.map(Box::new),
    }
}

pub fn while_(cond: Node, body: Node) -> Node {
    Node::While {
        cond: Box::new(cond),
        body: Box::new(body),
        do_while: false,
        until: false,
    }
}

pub fn until(cond: Node, body: Node) -> Node {
    Node::While {
        cond: Box::new(cond),
        body: Box::new(body),
        do_while: false,
        until: true,
    }
}

pub fn break_(value: Option<Node>) -> Node {
    Node::Break(value.map(Box::new))
}

pub fn next(value: Option<Node>) -> Node {
    Node::Next(value.map(Box::new))
}

pub fn return_(value: Option<Node>) -> Node {
    Node::Return(value.map(Box::new))
}

pub fn plain(args: Vec<Node>) -> Box<[Arg]> {
    args.into_iter().map(Arg::Plain).collect()
}

/// `recv.name(args)`
pub fn call(recv: Node, name: &str, args: Vec<Node>) -> Node {
    call_args(Some(recv), name, plain(args).into_vec(), None)
}

/// `name(args)` with an implicit receiver.
pub fn fcall(name: &str, args: Vec<Node>) -> Node {
    call_args(None, name, plain(args).into_vec(), None)
}

pub fn vcall(name: &str) -> Node {
    Node::VCall(name.to_string())
}

pub fn call_args(recv: Option<Node>, name: &str, args: Vec<Arg>, block: Option<BlockNode>) -> Node {
    Node::Call(Box::new(CallNode {
        recv,
        name: name.to_string(),
        args: args.into(),
        block,
    }))
}

pub fn call_block(recv: Option<Node>, name: &str, args: Vec<Node>, block: BlockNode) -> Node {
    call_args(recv, name, plain(args).into_vec(), Some(block))
}

pub fn named(pairs: Vec<(&str, Node)>) -> Arg {
    Arg::Named(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

pub fn block(params: &[&str], body: Node) -> BlockNode {
    BlockNode {
        params: params_of(params),
        body,
    }
}

pub fn lambda(params: &[&str], body: Node) -> Node {
    Node::Lambda(Box::new(block(params, body)))
}

pub fn yield_(args: Vec<Node>) -> Node {
    Node::Yield(plain(args))
}

pub fn zsuper() -> Node {
    Node::Super {
        args: None,
        block: None,
    }
}

pub fn super_(args: Vec<Node>) -> Node {
    Node::Super {
        args: Some(plain(args)),
        block: None,
    }
}

pub fn defined(node: Node) -> Node {
    Node::Defined(Box::new(node))
}

/// Required positional parameters only.
pub fn params_of(names: &[&str]) -> Params {
    Params {
        required: names.iter().map(|s| s.to_string()).collect(),
        ..Params::default()
    }
}

pub fn def(name: &str, params: &[&str], body: Node) -> Node {
    def_params(name, params_of(params), body)
}

pub fn def_params(name: &str, params: Params, body: Node) -> Node {
    Node::Def(Box::new(DefNode {
        name: name.to_string(),
        params,
        body,
    }))
}

pub fn defs(recv: Node, name: &str, params: &[&str], body: Node) -> Node {
    Node::Defs {
        recv: Box::new(recv),
        def: Box::new(DefNode {
            name: name.to_string(),
            params: params_of(params),
            body,
        }),
    }
}

pub fn class(name: &str, superclass: Option<Node>, body: Node) -> Node {
    Node::Class {
        scope: None,
        name: name.to_string(),
        superclass: superclass.map(Box::new),
        body: Box::new(body),
    }
}

pub fn module(name: &str, body: Node) -> Node {
    Node::Module {
        scope: None,
        name: name.to_string(),
        body: Box::new(body),
    }
}

pub fn sclass(target: Node, body: Node) -> Node {
    Node::SClass {
        target: Box::new(target),
        body: Box::new(body),
    }
}

pub fn rescue(classes: Vec<Node>, var: Option<&str>, body: Node) -> RescueClause {
    RescueClause {
        classes: classes.into(),
        var: var.map(local),
        body,
    }
}

pub fn begin(body: Node, rescues: Vec<RescueClause>, els: Option<Node>, ensure: Option<Node>) -> Node {
    Node::Begin(Box::new(BeginNode {
        body,
        rescues: rescues.into(),
        els,
        ensure,
    }))
}

pub fn raise(args: Vec<Node>) -> Node {
    fcall("raise", args)
}
