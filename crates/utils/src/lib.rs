//! The inevitable catchall "utils" crate. Generally only add
//! things here that only depend on the standard library and
//! "core" crates.
//!
mod command;
pub use command::*;
mod path;
pub use path::*;
mod status;
pub use status::*;
mod tracing_util;
pub use tracing_util::*;

/// The name of our binary
pub const NAME: &str = "luks-fido2-enroll";

/// Intended for use in `main`, calls an inner function and
/// handles errors by printing them. The process exit code is
/// chosen by `exit_code` from the returned error.
pub fn run_main<F>(f: F, exit_code: fn(&anyhow::Error) -> i32)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if let Err(e) = f() {
        print_error(format_args!("{e:#}"));
        std::process::exit(exit_code(&e));
    }
}
