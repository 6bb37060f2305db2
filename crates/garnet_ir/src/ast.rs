//! The tree handed to the runtime by an external parser.

use garnet_syntax::{Diagnostic, DiagnosticKind, codes};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    // Literals
    Nil,
    True,
    False,
    SelfRef,
    Int(i64),
    Float(f64),
    Str(String),
    /// Interpolated string; every part is converted with `to_s` and concatenated.
    DStr(Box<[Node]>),
    Sym(String),
    /// Elements may be `Node::Splat`.
    Array(Box<[Node]>),
    Hash(Box<[(Node, Node)]>),
    Range {
        lo: Box<Node>,
        hi: Box<Node>,
        exclusive: bool,
    },
    Regexp {
        source: String,
        ignore_case: bool,
    },
    /// Only meaningful inside array literals, `when` lists and `rescue` lists.
    Splat(Box<Node>),

    // Sequencing
    Seq(Box<[Node]>),
    Newline {
        line: u32,
        node: Box<Node>,
    },

    // Variables
    LVar(String),
    LAsgn(String, Box<Node>),
    IVar(String),
    IAsgn(String, Box<Node>),
    CVar(String),
    CVAsgn(String, Box<Node>),
    GVar(String),
    GAsgn(String, Box<Node>),
    Const(String),
    /// `Scope::Name`
    Colon2 {
        scope: Box<Node>,
        name: String,
    },
    /// `::Name`
    Colon3(String),
    CDecl {
        scope: Option<Box<Node>>,
        name: String,
        value: Box<Node>,
    },
    /// `recv.name = value` and `recv[args] = value`; `selector` already carries the `=`.
    AttrAsgn {
        recv: Box<Node>,
        selector: String,
        args: Box<[Arg]>,
        value: Box<Node>,
    },
    /// `target op= value`; `op` is the binary selector, or `||` / `&&`.
    OpAsgn {
        target: Box<OpTarget>,
        op: String,
        value: Box<Node>,
    },
    MAsgn {
        targets: Box<MultiTarget>,
        value: Box<Node>,
    },

    // Control flow
    If {
        cond: Box<Node>,
        then: Option<Box<Node>>,
        els: Option<Box<Node>>,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Case {
        subject: Option<Box<Node>>,
        whens: Box<[When]>,
        els: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
        /// `begin ... end while cond`
        do_while: bool,
        until: bool,
    },
    Break(Option<Box<Node>>),
    Next(Option<Box<Node>>),
    Redo,
    Retry,
    Return(Option<Box<Node>>),

    // Calls
    Call(Box<CallNode>),
    /// A bare identifier that was neither a known local nor an explicit call.
    VCall(String),
    /// `args: None` is the implicit-argument form (`super` without parentheses).
    Super {
        args: Option<Box<[Arg]>>,
        block: Option<Box<BlockNode>>,
    },
    Yield(Box<[Arg]>),
    Defined(Box<Node>),
    Lambda(Box<BlockNode>),

    // Definitions
    Def(Box<DefNode>),
    Defs {
        recv: Box<Node>,
        def: Box<DefNode>,
    },
    Class {
        scope: Option<Box<Node>>,
        name: String,
        superclass: Option<Box<Node>>,
        body: Box<Node>,
    },
    Module {
        scope: Option<Box<Node>>,
        name: String,
        body: Box<Node>,
    },
    SClass {
        target: Box<Node>,
        body: Box<Node>,
    },
    Undef(Box<[String]>),
    Alias {
        new: String,
        old: String,
    },

    // Exceptions
    Begin(Box<BeginNode>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallNode {
    /// `None` means an implicit `self` receiver.
    pub recv: Option<Node>,
    pub name: String,
    pub args: Box<[Arg]>,
    pub block: Option<BlockNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Plain(Node),
    Splat(Node),
    /// Trailing `key: value` aggregate.
    Named(Box<[(String, Node)]>),
    BlockPass(Node),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub params: Params,
    pub body: Node,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub required: Box<[String]>,
    pub optional: Box<[(String, Node)]>,
    /// `Some("")` is an anonymous `*`.
    pub rest: Option<String>,
    pub post: Box<[String]>,
    pub block: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefNode {
    pub name: String,
    pub params: Params,
    pub body: Node,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct When {
    /// Entries may be `Node::Splat`.
    pub conds: Box<[Node]>,
    pub body: Node,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeginNode {
    pub body: Node,
    pub rescues: Box<[RescueClause]>,
    pub els: Option<Node>,
    pub ensure: Option<Node>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RescueClause {
    /// Empty means `StandardError`. Entries may be `Node::Splat`.
    pub classes: Box<[Node]>,
    pub var: Option<Target>,
    pub body: Node,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Local(String),
    Ivar(String),
    Gvar(String),
    Cvar(String),
    Const(String),
    Attr {
        recv: Node,
        name: String,
    },
    Index {
        recv: Node,
        args: Box<[Arg]>,
    },
    Nested(Box<MultiTarget>),
    /// Bare `*` in a multiple assignment.
    Discard,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiTarget {
    pub pre: Box<[Target]>,
    pub splat: Option<Target>,
    pub post: Box<[Target]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpTarget {
    Local(String),
    Ivar(String),
    Gvar(String),
    Cvar(String),
    Const(String),
    Attr { recv: Node, name: String },
    Index { recv: Node, args: Box<[Arg]> },
}

impl Node {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Node::Nil
                | Node::True
                | Node::False
                | Node::Int(_)
                | Node::Float(_)
                | Node::Str(_)
                | Node::Sym(_)
        )
    }

    /// Strips `Newline` wrappers.
    pub fn unwrap_newline(&self) -> &Node {
        let mut node = self;
        while let Node::Newline { node: inner, .. } = node {
            node = inner;
        }
        node
    }

    /// True for bodies that evaluate to nil without side effects.
    pub fn is_empty_body(&self) -> bool {
        match self.unwrap_newline() {
            Node::Nil => true,
            Node::Seq(items) => items.iter().all(Node::is_empty_body),
            _ => false,
        }
    }
}

impl Params {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
            && self.optional.is_empty()
            && self.rest.is_none()
            && self.post.is_empty()
            && self.block.is_none()
    }

    /// Names in declaration order, skipping the anonymous rest.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .map(String::as_str)
            .chain(self.optional.iter().map(|(n, _)| n.as_str()))
            .chain(self.rest.iter().map(String::as_str).filter(|n| !n.is_empty()))
            .chain(self.post.iter().map(String::as_str))
            .chain(self.block.iter().map(String::as_str))
    }

    pub fn check(&self) -> Option<Diagnostic> {
        let names: Vec<&str> = self.names().collect();
        for (i, name) in names.iter().enumerate() {
            if name.starts_with('_') {
                continue;
            }
            if names[..i].contains(name) {
                return Some(
                    Diagnostic::error_kind(DiagnosticKind::DuplicateParam(name.to_string()), None)
                        .with_code(codes::DUPLICATE_PARAM),
                );
            }
        }
        None
    }
}
