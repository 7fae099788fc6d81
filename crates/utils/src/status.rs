//! Leveled, human readable status lines for the operator.
//!
//! These are distinct from tracing output: they are always shown,
//! go to stderr, and are colored when the terminal supports it.

use std::fmt::Display;
use std::io::Write as _;

use owo_colors::OwoColorize;

/// Print an informational status line.
pub fn print_info(msg: impl Display) {
    let mut stderr = anstream::stderr();
    // Don't panic if writing fails.
    let _ = writeln!(stderr, "{}{msg}", "info: ".green());
}

/// Print a warning status line.
pub fn print_warning(msg: impl Display) {
    let mut stderr = anstream::stderr();
    let _ = writeln!(stderr, "{}{msg}", "warning: ".yellow());
}

/// Print an error status line.
pub fn print_error(msg: impl Display) {
    let mut stderr = anstream::stderr();
    let _ = writeln!(stderr, "{}{msg}", "error: ".red());
}
