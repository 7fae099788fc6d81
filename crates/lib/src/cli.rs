//! # Command line interface
//!
//! Parses arguments, runs the preflight checks and confirmation, then hands
//! off to the enrollment sequence against the live host.

use std::ffi::OsString;

use anyhow::Result;
use clap::Parser;
use luks_enroll_utils::print_info;

use crate::config::{RunConfig, Settings};
use crate::system::{HostSystem, Runner};
use crate::{error, pipeline, preflight, prompt};

/// Enroll a FIDO2 security token on every LUKS volume and configure the
/// system to unlock them with it at boot.
///
/// The volume backing the root filesystem is enrolled first. Volumes that
/// already carry a FIDO2 token are skipped. Afterwards `/etc/crypttab` gains
/// `fido2-device=auto` for every entry and rpm-ostree is asked to regenerate
/// the initramfs. Must run as root.
///
/// Site settings are read from the TOML file named by the
/// LUKS_FIDO2_ENROLL_CONFIG environment variable, or from
/// /etc/luks-fido2-enroll/config.toml if present.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "luks-fido2-enroll", version)]
pub(crate) struct Opt {
    /// Perform detection and checks and print every change that would be
    /// made, without making any
    #[clap(long)]
    pub(crate) dry_run: bool,

    /// Do not ask for confirmation
    #[clap(long, short = 'y')]
    pub(crate) yes: bool,
}

impl Opt {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            dry_run: self.dry_run,
            auto_confirm: self.yes,
        }
    }
}

fn run(opt: Opt) -> Result<()> {
    let cfg = opt.run_config();
    let settings = Settings::load()?;
    preflight::run_checks()?;

    if cfg.dry_run {
        print_info("Dry run: no changes will be made");
    } else {
        prompt::print_banner();
        if !cfg.auto_confirm {
            prompt::confirm()?;
        }
    }

    let runner = Runner::new(&HostSystem, cfg).with_query_timeout(settings.command_timeout());
    let report = pipeline::run(&runner, &settings)?;
    report.print(cfg.dry_run);
    Ok(())
}

/// Parse the provided arguments and execute.
/// Calls [`std::process::exit`] on argument errors and `--help`.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run(Opt::parse_from(args))
}

/// The process exit code for a failed run, chosen by the stage that failed.
pub fn exit_code(e: &anyhow::Error) -> i32 {
    error::exit_code(e)
}
