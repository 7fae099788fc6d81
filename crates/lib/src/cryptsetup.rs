//! Invocations of `cryptsetup`, `dmsetup` and `systemd-cryptenroll`, and
//! parsers for the parts of their output we depend on.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::EnrollSettings;
use crate::error::ParseError;

/// Substring identifying a FIDO2 token in `cryptsetup luksDump` output.
/// systemd registers these with the token type `systemd-fido2`.
const FIDO2_TOKEN_MARKER: &str = "fido2";

/// `cryptsetup status <name>`
pub(crate) fn status_command(name: &str) -> Command {
    let mut cmd = Command::new("cryptsetup");
    cmd.args(["status", name]);
    cmd
}

/// `cryptsetup isLuks <dev>`; success means the device has a LUKS header.
pub(crate) fn is_luks_command(dev: &Utf8Path) -> Command {
    let mut cmd = Command::new("cryptsetup");
    cmd.args(["isLuks", dev.as_str()]);
    cmd
}

/// `cryptsetup luksDump <dev>`, which lists registered tokens.
pub(crate) fn luks_dump_command(dev: &Utf8Path) -> Command {
    let mut cmd = Command::new("cryptsetup");
    cmd.args(["luksDump", dev.as_str()]);
    cmd
}

/// Ask device-mapper for the logical name of a raw `/dev/dm-N` node.
pub(crate) fn dmsetup_name_command(node: &Utf8Path) -> Command {
    let mut cmd = Command::new("dmsetup");
    cmd.args(["info", "-c", "--noheadings", "-o", "name", node.as_str()]);
    cmd
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

/// Enroll a FIDO2 token on `dev`, letting systemd pick the authenticator.
pub(crate) fn enroll_command(dev: &Utf8Path, opts: &EnrollSettings) -> Command {
    let mut cmd = Command::new("systemd-cryptenroll");
    cmd.arg("--fido2-device=auto")
        .arg(format!("--fido2-with-user-presence={}", yes_no(opts.user_presence)))
        .arg(format!("--fido2-with-client-pin={}", yes_no(opts.client_pin)))
        .arg(format!(
            "--fido2-with-user-verification={}",
            yes_no(opts.user_verification)
        ))
        .arg(dev.as_str());
    cmd
}

/// Extract the backing device from `cryptsetup status` output:
///
/// ```text
/// /dev/mapper/luks-abc is active and is in use.
///   type:    LUKS2
///   device:  /dev/nvme0n1p3
/// ```
pub(crate) fn parse_status_device(buf: &str) -> Result<Utf8PathBuf, ParseError> {
    let value = buf
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("device:"))
        .ok_or(ParseError::MissingField("device"))?
        .trim();
    if !value.starts_with('/') {
        return Err(ParseError::UnexpectedFormat(format!(
            "device is not an absolute path: {value:?}"
        )));
    }
    Ok(value.into())
}

/// Extract the mapping name from `dmsetup info -c --noheadings -o name`.
pub(crate) fn parse_dmsetup_name(buf: &str) -> Result<String, ParseError> {
    let mut lines = buf.lines().map(str::trim).filter(|l| !l.is_empty());
    let name = lines.next().ok_or(ParseError::MissingField("name"))?;
    if lines.next().is_some() || name.contains(char::is_whitespace) {
        return Err(ParseError::UnexpectedFormat(format!(
            "expected a single mapping name, got {buf:?}"
        )));
    }
    Ok(name.to_owned())
}

/// Whether `cryptsetup luksDump` output shows a FIDO2 token.
pub(crate) fn has_fido2_token(dump: &str) -> bool {
    dump.to_ascii_lowercase().contains(FIDO2_TOKEN_MARKER)
}
