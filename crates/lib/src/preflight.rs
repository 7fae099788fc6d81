//! Checks that must pass before anything is inspected or changed.

use anyhow::Result;
use rustix::process::getuid;

use crate::error::PreflightError;

/// External programs the run depends on.
pub(crate) const REQUIRED_TOOLS: &[&str] = &[
    "findmnt",
    "lsblk",
    "dmsetup",
    "cryptsetup",
    "systemd-cryptenroll",
    "rpm-ostree",
];

pub(crate) fn check_privileges() -> Result<()> {
    if !getuid().is_root() {
        return Err(PreflightError::NotRoot.into());
    }
    Ok(())
}

/// Fail listing every tool `found` does not locate.
pub(crate) fn check_tools(found: impl Fn(&str) -> bool) -> Result<()> {
    let missing: Vec<&'static str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| !found(tool))
        .collect();
    if !missing.is_empty() {
        return Err(PreflightError::MissingTools(missing).into());
    }
    Ok(())
}

/// All checks against the live host.
pub(crate) fn run_checks() -> Result<()> {
    check_privileges()?;
    check_tools(|tool| which::which(tool).is_ok())
}
