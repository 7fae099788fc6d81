//! The main entrypoint for luks-fido2-enroll, a thin wrapper around the
//! library crate.

use luks_enroll_lib::cli;

fn run() -> anyhow::Result<()> {
    tracing::trace!("starting {}", env!("CARGO_PKG_NAME"));
    cli::run_from_iter(std::env::args_os())
}

fn main() {
    luks_enroll_utils::initialize_tracing();
    luks_enroll_utils::run_main(run, cli::exit_code);
}
