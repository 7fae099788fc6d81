//! Block device enumeration via `lsblk`.

use std::process::Command;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

/// The `FSTYPE` lsblk (via libblkid) reports for a LUKS container.
pub const LUKS_FSTYPE: &str = "crypto_LUKS";

#[derive(Debug, Deserialize)]
struct DevicesOutput {
    blockdevices: Vec<Device>,
}

/// A block device as reported by `lsblk --json --list --paths`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Device {
    /// Full device node path (we always pass `--paths`).
    pub name: Utf8PathBuf,
    /// Device type: `disk`, `part`, `crypt`, `lvm`, `loop`, ...
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Filesystem or container signature, if any.
    pub fstype: Option<String>,
}

impl Device {
    /// The device node.
    pub fn path(&self) -> &Utf8Path {
        &self.name
    }

    /// Whether this device carries a LUKS header.
    pub fn is_luks(&self) -> bool {
        self.fstype.as_deref() == Some(LUKS_FSTYPE)
    }
}

/// Build the lsblk invocation enumerating every block device on the system
/// as a flat list in discovery order.
pub fn lsblk_command() -> Command {
    let mut cmd = Command::new("lsblk");
    cmd.args([
        "--json",
        "--list",
        "--paths",
        "--output",
        "NAME,TYPE,FSTYPE",
    ]);
    cmd
}

/// Parse the JSON output of [`lsblk_command`].
#[context("Parsing lsblk output")]
pub fn parse_devices(buf: &str) -> Result<Vec<Device>> {
    let devs: DevicesOutput = serde_json::from_str(buf).context("Invalid JSON")?;
    Ok(devs.blockdevices)
}

/// Filter to LUKS containers, preserving discovery order and dropping
/// duplicate nodes (a multipath member can be listed more than once).
pub fn luks_devices(devices: &[Device]) -> Vec<Utf8PathBuf> {
    let mut r: Vec<Utf8PathBuf> = Vec::new();
    for dev in devices.iter().filter(|d| d.is_luks()) {
        if r.iter().any(|p| p == dev.path()) {
            tracing::trace!("Skipping duplicate {}", dev.path());
            continue;
        }
        r.push(dev.path().to_owned());
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;

    const FIXTURE: &str = indoc! { r#"
        {
           "blockdevices": [
              {"name": "/dev/sda", "type": "disk", "fstype": null},
              {"name": "/dev/sda1", "type": "part", "fstype": "vfat"},
              {"name": "/dev/sda2", "type": "part", "fstype": "ext4"},
              {"name": "/dev/sda3", "type": "part", "fstype": "crypto_LUKS"},
              {"name": "/dev/nvme0n1", "type": "disk", "fstype": null},
              {"name": "/dev/nvme0n1p1", "type": "part", "fstype": "crypto_LUKS"},
              {"name": "/dev/mapper/luks-7f3a", "type": "crypt", "fstype": "btrfs"},
              {"name": "/dev/mapper/luks-91bc", "type": "crypt", "fstype": "xfs"},
              {"name": "/dev/zram0", "type": "disk", "fstype": "swap"}
           ]
        }
    "# };

    #[test]
    fn test_parse_devices() -> Result<()> {
        let devs = parse_devices(FIXTURE)?;
        assert_eq!(devs.len(), 9);
        assert_eq!(devs[3].path(), "/dev/sda3");
        assert_eq!(devs[3].kind.as_deref(), Some("part"));
        assert!(devs[3].is_luks());
        assert!(!devs[6].is_luks());
        assert_eq!(devs[0].fstype, None);
        Ok(())
    }

    #[test]
    fn test_luks_devices_in_scan_order() -> Result<()> {
        let devs = parse_devices(FIXTURE)?;
        similar_asserts::assert_eq!(
            luks_devices(&devs),
            vec![
                Utf8PathBuf::from("/dev/sda3"),
                Utf8PathBuf::from("/dev/nvme0n1p1")
            ]
        );
        Ok(())
    }

    #[test]
    fn test_luks_devices_dedup() -> Result<()> {
        let devs = parse_devices(
            r#"{"blockdevices": [
                {"name": "/dev/sdb1", "type": "part", "fstype": "crypto_LUKS"},
                {"name": "/dev/sdc1", "type": "part", "fstype": "crypto_LUKS"},
                {"name": "/dev/sdb1", "type": "part", "fstype": "crypto_LUKS"}
            ]}"#,
        )?;
        assert_eq!(
            luks_devices(&devs),
            vec![
                Utf8PathBuf::from("/dev/sdb1"),
                Utf8PathBuf::from("/dev/sdc1")
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_devices("not json").is_err());
        assert!(parse_devices(r#"{"devices": []}"#).is_err());
    }
}
