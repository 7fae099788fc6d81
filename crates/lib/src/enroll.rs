//! Per-device FIDO2 enrollment.

use std::fmt::Display;

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;
use luks_enroll_utils::print_info;

use crate::config::EnrollSettings;
use crate::cryptsetup;
use crate::error::EnrollmentError;
use crate::system::Runner;

/// Why a device was left alone. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    NotBlockDevice,
    NotLuks,
    AlreadyEnrolled,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NotBlockDevice => "not a block device",
            SkipReason::NotLuks => "not a LUKS device",
            SkipReason::AlreadyEnrolled => "a FIDO2 token is already enrolled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnrollmentOutcome {
    Skipped(SkipReason),
    Enrolled,
    DryRun,
}

impl Display for EnrollmentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            EnrollmentOutcome::Enrolled => f.write_str("enrolled"),
            EnrollmentOutcome::DryRun => f.write_str("would enroll"),
        }
    }
}

/// Run the pre-checks for `dev`, returning the reason to skip it, if any.
fn precheck(runner: &Runner, dev: &Utf8Path) -> Result<Option<SkipReason>> {
    if !runner.sys().is_block_device(dev) {
        return Ok(Some(SkipReason::NotBlockDevice));
    }
    if !runner.query(cryptsetup::is_luks_command(dev))?.success() {
        return Ok(Some(SkipReason::NotLuks));
    }
    let dump = runner.query(cryptsetup::luks_dump_command(dev))?;
    if !dump.success() {
        // Can't see any tokens; treat as none enrolled.
        tracing::debug!("luksDump {dev}: {}", dump.diagnostic());
        return Ok(None);
    }
    if cryptsetup::has_fido2_token(&dump.stdout) {
        return Ok(Some(SkipReason::AlreadyEnrolled));
    }
    Ok(None)
}

/// Enroll a FIDO2 token on `dev` unless it already has one or is not a
/// LUKS block device. The enrollment tool talks to the operator directly
/// (PIN entry, token touch).
#[context("Enrolling {dev}")]
pub(crate) fn enroll_if_absent(
    runner: &Runner,
    dev: &Utf8Path,
    opts: &EnrollSettings,
) -> Result<EnrollmentOutcome> {
    if let Some(reason) = precheck(runner, dev).context("Checking device")? {
        tracing::info!("Skipping {dev}: {reason}");
        return Ok(EnrollmentOutcome::Skipped(reason));
    }

    let cmd = cryptsetup::enroll_command(dev, opts);
    if !runner.cfg().dry_run {
        print_info(format_args!(
            "Enrolling a FIDO2 token on {dev}; touch the token when it blinks"
        ));
    }
    let Some(status) = runner.mutate_interactive(cmd)? else {
        return Ok(EnrollmentOutcome::DryRun);
    };
    if !status.success() {
        return Err(EnrollmentError {
            device: dev.to_owned(),
            status,
        }
        .into());
    }
    tracing::info!("Enrolled a FIDO2 token on {dev}");
    Ok(EnrollmentOutcome::Enrolled)
}
