//! Find the LUKS block device that backs the running root filesystem.
//!
//! The chain is: mount source of `/` (possibly `device[/subvol]`), the
//! canonical device node, the device-mapper name for that node, and finally
//! the backing device reported by `cryptsetup status`.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;

use crate::cryptsetup;
use crate::error::DetectionError;
use crate::system::Runner;

const DEV_MAPPER: &str = "/dev/mapper/";
/// On ostree systems `/` may be a composefs overlay; the physical root is here.
const OSTREE_SYSROOT: &str = "/sysroot";

/// How a resolved root device node maps to a dm-crypt mapping name.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MapperNode<'a> {
    /// `/dev/mapper/<name>`
    Named(&'a str),
    /// A raw `/dev/dm-N` node; the name must be asked of device-mapper.
    DmNode(&'a Utf8Path),
    /// Anything else; cryptsetup is handed the path itself.
    Other(&'a Utf8Path),
}

pub(crate) fn classify(path: &Utf8Path) -> MapperNode<'_> {
    if let Some(name) = path.as_str().strip_prefix(DEV_MAPPER) {
        return MapperNode::Named(name);
    }
    let is_dm_node = path
        .as_str()
        .strip_prefix("/dev/dm-")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if is_dm_node {
        MapperNode::DmNode(path)
    } else {
        MapperNode::Other(path)
    }
}

fn query_failed(what: impl Into<String>, e: anyhow::Error) -> DetectionError {
    DetectionError::Query {
        what: what.into(),
        reason: format!("{e:#}"),
    }
}

/// The stripped mount source of `mountpoint`, if it names a device path.
fn mount_source(runner: &Runner, mountpoint: &str) -> Result<Option<Utf8PathBuf>> {
    let out = runner
        .query(luks_enroll_mount::findmnt_command(mountpoint))
        .map_err(|e| query_failed(format!("querying mount source of {mountpoint}"), e))?;
    if !out.success() {
        tracing::debug!("findmnt {mountpoint}: {}", out.diagnostic());
        return Ok(None);
    }
    let fs = luks_enroll_mount::parse_single(&out.stdout)
        .map_err(|e| query_failed(format!("inspecting {mountpoint}"), e))?;
    let source = fs.device_source().map(Utf8PathBuf::from);
    tracing::debug!("Mount source of {mountpoint}: {source:?}");
    Ok(source.filter(|s| s.is_absolute()))
}

/// The device node the root filesystem is mounted from.
fn root_mount_source(runner: &Runner) -> Result<Utf8PathBuf> {
    if let Some(source) = mount_source(runner, "/")? {
        return Ok(source);
    }
    tracing::debug!("/ has no device source, trying {OSTREE_SYSROOT}");
    mount_source(runner, OSTREE_SYSROOT)?.ok_or_else(|| DetectionError::NoSource.into())
}

/// Determine the device-mapper name for the canonical device node `real`.
fn mapper_name(runner: &Runner, real: &Utf8Path) -> Result<String> {
    let name = match classify(real) {
        MapperNode::Named(name) => name.to_owned(),
        MapperNode::DmNode(node) => {
            let out = runner
                .query(cryptsetup::dmsetup_name_command(node))
                .map_err(|e| query_failed(format!("querying device-mapper name of {node}"), e))?;
            if out.success() {
                cryptsetup::parse_dmsetup_name(&out.stdout).unwrap_or_default()
            } else {
                tracing::debug!("dmsetup info {node}: {}", out.diagnostic());
                String::new()
            }
        }
        MapperNode::Other(path) => path.as_str().to_owned(),
    };
    if name.is_empty() {
        return Err(DetectionError::NoMapperName(real.to_owned()).into());
    }
    Ok(name)
}

/// Resolve the LUKS block device backing the mounted root filesystem.
#[context("Resolving the root LUKS device")]
pub(crate) fn resolve_root_luks_device(runner: &Runner) -> Result<Utf8PathBuf> {
    let source = root_mount_source(runner)?;
    let real = runner
        .sys()
        .canonicalize(&source)
        .map_err(|e| query_failed(format!("resolving {source}"), e))?;
    tracing::debug!("Root source {source} resolves to {real}");

    let name = mapper_name(runner, &real)?;
    tracing::debug!("Root mapping name: {name}");

    let out = runner
        .query(cryptsetup::status_command(&name))
        .map_err(|e| query_failed(format!("querying cryptsetup status of {name}"), e))?;
    if !out.success() {
        return Err(DetectionError::NotActive {
            name,
            reason: out.diagnostic(),
        }
        .into());
    }
    let backing = cryptsetup::parse_status_device(&out.stdout)
        .map_err(|source| DetectionError::NoBackingDevice {
            name: name.clone(),
            source,
        })?;

    if !runner.sys().is_block_device(&backing) {
        return Err(DetectionError::NotBlockDevice(backing).into());
    }
    let is_luks = runner
        .query(cryptsetup::is_luks_command(&backing))
        .with_context(|| format!("Checking {backing} for a LUKS header"))?;
    if !is_luks.success() {
        return Err(DetectionError::NotLuks(backing).into());
    }
    tracing::info!("Root filesystem is backed by LUKS device {backing} ({name})");
    Ok(backing)
}
