//! Enumerate every LUKS container on the system.

use camino::{Utf8Path, Utf8PathBuf};
use luks_enroll_utils::print_warning;

use crate::system::Runner;

/// A LUKS container discovered in this run. FIDO2 enrollment state is
/// looked up fresh by the enrollment step, never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LuksDevice {
    pub(crate) path: Utf8PathBuf,
    pub(crate) is_root: bool,
}

/// Move `root` to the front if present; everything else keeps scan order.
/// Returns whether the root device was found.
pub(crate) fn order_root_first(
    scanned: Vec<Utf8PathBuf>,
    root: &Utf8Path,
) -> (Vec<LuksDevice>, bool) {
    let (roots, rest): (Vec<_>, Vec<_>) = scanned.into_iter().partition(|p| p == root);
    let found = !roots.is_empty();
    let devices = roots
        .into_iter()
        .take(1)
        .map(|path| LuksDevice {
            path,
            is_root: true,
        })
        .chain(rest.into_iter().map(|path| LuksDevice {
            path,
            is_root: false,
        }))
        .collect();
    (devices, found)
}

/// Scan for LUKS devices. Enumeration problems are reported and yield an
/// empty list rather than failing the run.
fn scan(runner: &Runner) -> Vec<Utf8PathBuf> {
    let out = match runner.query(luks_enroll_blockdev::lsblk_command()) {
        Ok(out) if out.success() => out,
        Ok(out) => {
            print_warning(format_args!(
                "Listing block devices failed: {}",
                out.diagnostic()
            ));
            return Vec::new();
        }
        Err(e) => {
            print_warning(format_args!("Listing block devices failed: {e:#}"));
            return Vec::new();
        }
    };
    match luks_enroll_blockdev::parse_devices(&out.stdout) {
        Ok(devices) => luks_enroll_blockdev::luks_devices(&devices),
        Err(e) => {
            print_warning(format_args!("{e:#}"));
            Vec::new()
        }
    }
}

/// All LUKS devices, root first.
pub(crate) fn list_luks_devices(runner: &Runner, root: &Utf8Path) -> Vec<LuksDevice> {
    let scanned = scan(runner);
    tracing::debug!("Scanned LUKS devices: {scanned:?}");
    let (devices, found) = order_root_first(scanned, root);
    if !found && !devices.is_empty() {
        print_warning(format_args!(
            "Root device {root} was not among the scanned LUKS devices; continuing with those found"
        ));
    }
    devices
}
