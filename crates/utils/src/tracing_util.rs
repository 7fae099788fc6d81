//! Helpers related to tracing, used by main entrypoints

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// Initialize tracing with the default configuration.
pub fn initialize_tracing() {
    // We mutate LUKS headers and /etc/crypttab as root; make sure a record
    // of that lands in the journal even if RUST_LOG is unset.
    let journald_layer = if rustix::process::getuid().is_root() {
        tracing_journald::layer().ok().map(|layer| {
            layer
                .with_syslog_identifier(crate::NAME.to_owned())
                .with_filter(LevelFilter::INFO)
        })
    } else {
        None
    };

    // Operator-facing output goes through the status helpers; the
    // stderr layer is for debugging via RUST_LOG.
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    match journald_layer {
        Some(journald) => {
            tracing_subscriber::registry()
                .with(fmt_layer)
                .with(journald)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(fmt_layer).init();
        }
    }
}
