#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    // Compiler
    InvalidJump(&'static str),
    UnreachableAfterReturn,
    DuplicateParam(String),

    // Argument shape
    ArgumentCount {
        given: usize,
        expected_min: usize,
        expected_max: Option<usize>,
    },

    // Dispatch
    UndefinedMethod {
        name: String,
        recv: String,
    },
    PrivateMethod {
        name: String,
        recv: String,
    },
    ProtectedMethod {
        name: String,
        recv: String,
    },
    UndefinedLocalOrMethod {
        name: String,
        recv: String,
    },
    UndefinedMethodForClass {
        name: String,
        class: String,
    },
    NoSuperclassMethod(String),
    DidYouMean(String),

    // Names and classes
    UninitializedConstant(String),
    UninitializedClassVariable {
        name: String,
        class: String,
    },
    SuperclassMismatch(String),
    NotAClass(String),
    NotAModule(String),
    NoSingletonClass(String),
    InvalidName {
        kind: &'static str,
        name: String,
    },

    // Control flow
    NoBlockGiven,
    UnexpectedReturn,
    BreakFromProcClosure,
    StackLevelTooDeep,

    // Values
    NoImplicitConversion {
        from: String,
        to: String,
    },
    CantCoerce {
        from: String,
        to: String,
    },
    DivisionByZero,
    IntegerOverflow,
    IndexOutOfRange(i64),
    IndexTooBig(i64),
    KeyNotFound(String),
    InvalidRegexp(String),
    NotAnException(String),

    // Foreign bridge
    ForeignConversion {
        value: String,
        tag: String,
    },
    ForeignCall(String),

    // Custom
    Raw(String),
}

pub struct DiagnosticsFormatter;

impl DiagnosticsFormatter {
    fn format_en(kind: &DiagnosticKind) -> String {
        match kind {
            DiagnosticKind::InvalidJump(kw) => format!("Invalid {}", kw),
            DiagnosticKind::UnreachableAfterReturn => "statement not reached".into(),
            DiagnosticKind::DuplicateParam(name) => {
                format!("duplicated argument name `{}'", name)
            }

            DiagnosticKind::ArgumentCount {
                given,
                expected_min,
                expected_max,
            } => match expected_max {
                Some(max) if max == expected_min => format!(
                    "wrong number of arguments (given {}, expected {})",
                    given, expected_min
                ),
                Some(max) => format!(
                    "wrong number of arguments (given {}, expected {}..{})",
                    given, expected_min, max
                ),
                None => format!(
                    "wrong number of arguments (given {}, expected {}+)",
                    given, expected_min
                ),
            },

            DiagnosticKind::UndefinedMethod { name, recv } => {
                format!("undefined method `{}' for {}", name, recv)
            }
            DiagnosticKind::PrivateMethod { name, recv } => {
                format!("private method `{}' called for {}", name, recv)
            }
            DiagnosticKind::ProtectedMethod { name, recv } => {
                format!("protected method `{}' called for {}", name, recv)
            }
            DiagnosticKind::UndefinedLocalOrMethod { name, recv } => {
                format!("undefined local variable or method `{}' for {}", name, recv)
            }
            DiagnosticKind::UndefinedMethodForClass { name, class } => {
                format!("undefined method `{}' for class `{}'", name, class)
            }
            DiagnosticKind::NoSuperclassMethod(name) => {
                format!("super: no superclass method `{}'", name)
            }
            DiagnosticKind::DidYouMean(s) => format!("Did you mean?  {}", s),

            DiagnosticKind::UninitializedConstant(name) => {
                format!("uninitialized constant {}", name)
            }
            DiagnosticKind::UninitializedClassVariable { name, class } => {
                format!("uninitialized class variable {} in {}", name, class)
            }
            DiagnosticKind::SuperclassMismatch(name) => {
                format!("superclass mismatch for class {}", name)
            }
            DiagnosticKind::NotAClass(name) => format!("{} is not a class", name),
            DiagnosticKind::NotAModule(name) => format!("{} is not a module", name),
            DiagnosticKind::NoSingletonClass(ty) => format!("can't define singleton for {}", ty),
            DiagnosticKind::InvalidName { kind, name } => {
                format!("`{}' is not allowed as {} name", name, kind)
            }

            DiagnosticKind::NoBlockGiven => "no block given (yield)".into(),
            DiagnosticKind::UnexpectedReturn => "unexpected return".into(),
            DiagnosticKind::BreakFromProcClosure => "break from proc-closure".into(),
            DiagnosticKind::StackLevelTooDeep => "stack level too deep".into(),

            DiagnosticKind::NoImplicitConversion { from, to } => {
                format!("no implicit conversion of {} into {}", from, to)
            }
            DiagnosticKind::CantCoerce { from, to } => {
                format!("{} can't be coerced into {}", from, to)
            }
            DiagnosticKind::DivisionByZero => "divided by 0".into(),
            DiagnosticKind::IntegerOverflow => "integer overflow".into(),
            DiagnosticKind::IndexOutOfRange(i) => format!("index {} out of range", i),
            DiagnosticKind::IndexTooBig(i) => format!("index {} too big", i),
            DiagnosticKind::KeyNotFound(key) => format!("key not found: {}", key),
            DiagnosticKind::InvalidRegexp(msg) => format!("invalid regexp: {}", msg),
            DiagnosticKind::NotAnException(ty) => {
                format!("exception class/object expected (got {})", ty)
            }

            DiagnosticKind::ForeignConversion { value, tag } => {
                format!("cannot convert {} to native type {}", value, tag)
            }
            DiagnosticKind::ForeignCall(msg) => format!("native call failed: {}", msg),

            DiagnosticKind::Raw(s) => s.clone(),
        }
    }

    pub fn format(kind: &DiagnosticKind) -> String {
        Self::format_en(kind)
    }
}
