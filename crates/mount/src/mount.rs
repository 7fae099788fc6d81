//! Helpers for interacting with mountpoints, via `findmnt`.

use std::process::Command;

use anyhow::{Context, Result};
use fn_error_context::context;
use serde::Deserialize;

/// The columns we request from findmnt.
const FINDMNT_COLUMNS: &str = "SOURCE,TARGET,FSTYPE,MAJ:MIN";

/// One mounted filesystem as reported by `findmnt --json`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Filesystem {
    /// The mount source. For btrfs subvolumes and bind mounts this
    /// carries a bracketed sub-path, e.g. `/dev/sda3[/root]`.
    pub source: Option<String>,
    /// The mountpoint.
    pub target: String,
    /// Filesystem type.
    pub fstype: Option<String>,
    /// Device number of the source.
    #[serde(rename = "maj:min")]
    pub maj_min: Option<String>,
}

impl Filesystem {
    /// The mount source with any bracketed sub-path annotation removed.
    /// Returns `None` if findmnt reported no source at all.
    pub fn device_source(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(strip_subpath)
            .filter(|s| !s.is_empty())
    }
}

/// Top level `findmnt --json` document.
#[derive(Deserialize, Debug)]
pub struct Findmnt {
    /// The matched filesystems.
    pub filesystems: Vec<Filesystem>,
}

/// Build the findmnt invocation that inspects the filesystem mounted at `mountpoint`.
pub fn findmnt_command(mountpoint: &str) -> Command {
    let mut cmd = Command::new("findmnt");
    cmd.args(["-J", "--output", FINDMNT_COLUMNS, "--mountpoint", mountpoint]);
    cmd
}

/// Parse the JSON output of [`findmnt_command`], expecting exactly one filesystem.
#[context("Parsing findmnt output")]
pub fn parse_single(buf: &str) -> Result<Filesystem> {
    let findmnt: Findmnt = serde_json::from_str(buf).context("Invalid JSON")?;
    let mut filesystems = findmnt.filesystems.into_iter();
    let fs = filesystems
        .next()
        .ok_or_else(|| anyhow::anyhow!("findmnt reported no filesystems"))?;
    if filesystems.next().is_some() {
        anyhow::bail!("findmnt reported more than one filesystem");
    }
    Ok(fs)
}

/// Remove a trailing bracketed sub-path from a mount source and trim
/// surrounding whitespace: `/dev/sda3[/root]` becomes `/dev/sda3`.
/// Sources without a bracketed suffix are returned as-is (minus whitespace).
pub fn strip_subpath(source: &str) -> &str {
    let source = source.trim();
    match source.strip_suffix(']').and_then(|s| s.find('[')) {
        Some(idx) => source[..idx].trim_end(),
        None => source,
    }
}
