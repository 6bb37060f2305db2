//! Diagnostics and naming helpers shared by the Garnet IR and runtime.

mod diagnostic;
mod loc;
mod util;

pub use diagnostic::{Diagnostic, Severity, codes};
pub use loc::{DiagnosticKind, DiagnosticsFormatter};
pub use util::{find_best_match, is_const_name, levenshtein_distance, plain_symbol_name};
