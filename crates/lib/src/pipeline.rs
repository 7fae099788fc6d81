//! The end-to-end enrollment sequence.

use anyhow::Result;
use camino::Utf8PathBuf;
use luks_enroll_utils::{print_info, print_warning};

use crate::config::Settings;
use crate::crypttab::{self, CrypttabUpdate};
use crate::enroll::{self, EnrollmentOutcome};
use crate::initramfs::{self, BootImageOutcome};
use crate::scan::{self, LuksDevice};
use crate::system::Runner;
use crate::topology;

/// What a run did (or under dry-run, would do).
#[derive(Debug)]
pub(crate) struct RunReport {
    pub(crate) root: Utf8PathBuf,
    pub(crate) devices: Vec<(LuksDevice, EnrollmentOutcome)>,
    /// Unset when there was nothing to enroll.
    pub(crate) crypttab: Option<CrypttabUpdate>,
    pub(crate) boot_image: Option<BootImageOutcome>,
}

impl RunReport {
    pub(crate) fn print(&self, dry_run: bool) {
        println!();
        if dry_run {
            println!("Dry run summary (nothing was changed):");
        } else {
            println!("Summary:");
        }
        println!("  root device: {}", self.root);
        for (dev, outcome) in &self.devices {
            let tag = if dev.is_root { " (root)" } else { "" };
            println!("  {}{tag}: {outcome}", dev.path);
        }
        if let Some(update) = &self.crypttab {
            if update.updated.is_empty() {
                println!("  crypttab: unchanged");
            } else {
                let verb = if dry_run { "would update" } else { "updated" };
                println!("  crypttab: {verb}: {}", update.updated.join(", "));
            }
            if !update.unchanged.is_empty() {
                let already = update.unchanged.join(", ");
                println!("  crypttab: already set: {already}");
            }
            if let Some(backup) = &update.backup {
                println!("  crypttab backup: {backup}");
            }
        }
        if let Some(boot_image) = &self.boot_image {
            println!("  initramfs regeneration: {boot_image}");
        }
        if !dry_run && self.boot_image.is_some() {
            println!();
            println!("Reboot to unlock with the FIDO2 token.");
        }
    }
}

/// Run every stage in order. The first fatal error aborts; nothing already
/// applied is rolled back.
pub(crate) fn run(runner: &Runner, settings: &Settings) -> Result<RunReport> {
    let root = topology::resolve_root_luks_device(runner)?;
    print_info(format_args!("Root filesystem is on LUKS device {root}"));

    let devices = scan::list_luks_devices(runner, &root);
    let mut report = RunReport {
        root,
        devices: Vec::with_capacity(devices.len()),
        crypttab: None,
        boot_image: None,
    };
    if devices.is_empty() {
        print_warning("No LUKS devices found; nothing to enroll");
        return Ok(report);
    }
    // Checked up front so a missing file fails before any token is enrolled.
    crypttab::ensure_present(&settings.crypttab)?;

    for dev in devices {
        let outcome = enroll::enroll_if_absent(runner, &dev.path, &settings.enroll)?;
        match outcome {
            EnrollmentOutcome::Skipped(reason) => {
                print_info(format_args!("Skipping {}: {reason}", dev.path))
            }
            EnrollmentOutcome::Enrolled => {
                print_info(format_args!("Enrolled a FIDO2 token on {}", dev.path))
            }
            EnrollmentOutcome::DryRun => {}
        }
        report.devices.push((dev, outcome));
    }

    report.crypttab = Some(crypttab::add_unlock_option(
        &settings.crypttab,
        runner.cfg(),
    )?);
    report.boot_image = Some(initramfs::enable_initramfs_regen(runner)?);
    Ok(report)
}
