//! Host-facing errors and common message constants.

pub mod messages {
    pub const TRIED_TO_CREATE_PROC: &str = "tried to create Proc object without a block";
    pub const UNHANDLED_EXCEPTION: &str = "unhandled exception";
    pub const NOT_A_SYMBOL: &str = "is not a symbol nor a string";
    pub const CANT_MODIFY_FROZEN: &str = "can't modify frozen";
    pub const THREAD_JOIN_SELF: &str = "Target thread must not be current thread";
    pub const ALLOCATOR_UNDEFINED: &str = "allocator undefined for";
}

/// Outcome of running a program that did not complete normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("{message} ({class}){}", render_backtrace(.backtrace))]
    Uncaught {
        class: String,
        message: String,
        backtrace: Vec<String>,
    },
    #[error("bad control transfer: {0}")]
    BadControlTransfer(String),
    #[error("unexpected return")]
    UnexpectedReturn,
    #[error("thread killed")]
    Killed,
}

fn render_backtrace(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str("\n\tfrom ");
        out.push_str(line);
    }
    out
}

impl ExecError {
    pub fn class_name(&self) -> Option<&str> {
        match self {
            ExecError::Uncaught { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ExecError::Uncaught { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
