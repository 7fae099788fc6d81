//! Ask rpm-ostree to build a local initramfs on every deployment, so the
//! rewritten crypttab and the FIDO2 unlock plumbing reach early boot.

use std::process::Command;

use anyhow::Result;
use fn_error_context::context;
use luks_enroll_utils::print_info;
use regex::Regex;

use crate::error::BootImageError;
use crate::system::Runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BootImageOutcome {
    Enabled,
    AlreadyEnabled,
    DryRun,
}

impl std::fmt::Display for BootImageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BootImageOutcome::Enabled => "enabled",
            BootImageOutcome::AlreadyEnabled => "already enabled",
            BootImageOutcome::DryRun => "would enable",
        })
    }
}

// rpm-ostree exits non-zero with e.g. "error: Initramfs regeneration is already enabled"
const ALREADY_ENABLED: &str = r"(?i)already\s+enabled";

fn enable_command() -> Command {
    let mut cmd = Command::new("rpm-ostree");
    cmd.args(["initramfs", "--enable"]);
    cmd
}

/// Turn on client-side initramfs regeneration. Takes effect on the next
/// deployment, so a reboot is needed afterwards.
#[context("Enabling initramfs regeneration")]
pub(crate) fn enable_initramfs_regen(runner: &Runner) -> Result<BootImageOutcome> {
    let Some(out) = runner.mutate(enable_command())? else {
        return Ok(BootImageOutcome::DryRun);
    };
    if out.success() {
        tracing::info!("Enabled initramfs regeneration");
        return Ok(BootImageOutcome::Enabled);
    }
    if Regex::new(ALREADY_ENABLED)?.is_match(&out.combined()) {
        print_info("Initramfs regeneration is already enabled");
        return Ok(BootImageOutcome::AlreadyEnabled);
    }
    Err(BootImageError(out.diagnostic()).into())
}
