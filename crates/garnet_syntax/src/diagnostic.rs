//! Compile-time diagnostics.

use crate::{DiagnosticKind, DiagnosticsFormatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub code: Option<&'static str>,
    pub line: Option<u32>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, line: Option<u32>) -> Self {
        Self {
            severity,
            message: DiagnosticsFormatter::format(&kind),
            code: None,
            line,
            help: None,
        }
    }

    pub fn error_kind(kind: DiagnosticKind, line: Option<u32>) -> Self {
        Self::new(Severity::Error, kind, line)
    }

    pub fn warning_kind(kind: DiagnosticKind, line: Option<u32>) -> Self {
        Self::new(Severity::Warning, kind, line)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// `file:line: warning: message [code]`
    pub fn render(&self, file: &str) -> String {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let mut out = match self.line {
            Some(line) => format!("{}:{}: {}: {}", file, line, sev, self.message),
            None => format!("{}: {}: {}", file, sev, self.message),
        };
        if let Some(c) = self.code {
            out.push_str(&format!(" [{c}]"));
        }
        if let Some(h) = &self.help {
            out.push_str("\n  = help: ");
            out.push_str(h);
        }
        out
    }
}

pub mod codes {
    pub const INVALID_JUMP: &str = "W0001";
    pub const UNREACHABLE_CODE: &str = "W0002";
    pub const DUPLICATE_PARAM: &str = "E0001";
}
