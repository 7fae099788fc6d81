//! Fatal error kinds.
//!
//! Plumbing uses [`anyhow`]; these types are the root causes (or context
//! markers) that identify which stage failed, so the entrypoint can pick an
//! exit code by downcasting. Skip decisions are not errors and never appear here.

use std::process::ExitStatus;

use camino::Utf8PathBuf;

/// A structured parser rejected the output of an external tool.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),
}

/// The LUKS device backing the root filesystem could not be established.
/// Raised before anything is mutated.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DetectionError {
    #[error("the root filesystem mount has no source device")]
    NoSource,
    #[error("could not derive a device-mapper name from {0}")]
    NoMapperName(Utf8PathBuf),
    #[error("{name} is not an active dm-crypt mapping: {reason}")]
    NotActive { name: String, reason: String },
    #[error("cryptsetup status for {name}: {source}")]
    NoBackingDevice {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("{0} is not a block device")]
    NotBlockDevice(Utf8PathBuf),
    #[error("{0} is not a LUKS device")]
    NotLuks(Utf8PathBuf),
    #[error("{what}: {reason}")]
    Query { what: String, reason: String },
}

/// The enrollment tool itself reported failure.
#[derive(Debug, thiserror::Error)]
#[error("enrolling a FIDO2 token on {device} failed ({status})")]
pub(crate) struct EnrollmentError {
    pub(crate) device: Utf8PathBuf,
    pub(crate) status: ExitStatus,
}

/// The boot-unlock configuration could not be read or rewritten.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("{0} does not exist")]
    Missing(Utf8PathBuf),
    #[error("updating {0}")]
    Update(Utf8PathBuf),
}

/// Regeneration of the early-boot image failed for a reason other than
/// it already being enabled.
#[derive(Debug, thiserror::Error)]
#[error("enabling initramfs regeneration failed: {0}")]
pub(crate) struct BootImageError(pub(crate) String);

/// The run was refused before touching anything.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PreflightError {
    #[error("must run as the root user")]
    NotRoot,
    #[error("required tools not found in PATH: {}", .0.join(", "))]
    MissingTools(Vec<&'static str>),
    #[error("aborted: confirmation declined")]
    Declined,
    #[error("no confirmation received (pass --yes for non-interactive use)")]
    NoConfirmation,
}

/// Exit code for generic failures, preflight refusals and declined confirmation.
pub(crate) const EXIT_FAILURE: i32 = 1;
pub(crate) const EXIT_DETECTION: i32 = 3;
pub(crate) const EXIT_ENROLLMENT: i32 = 4;
pub(crate) const EXIT_CONFIG: i32 = 5;
pub(crate) const EXIT_BOOT_IMAGE: i32 = 6;

/// Map a fatal error to the process exit code of its stage.
pub(crate) fn exit_code(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<DetectionError>().is_some() {
        EXIT_DETECTION
    } else if e.downcast_ref::<EnrollmentError>().is_some() {
        EXIT_ENROLLMENT
    } else if e.downcast_ref::<ConfigError>().is_some() {
        EXIT_CONFIG
    } else if e.downcast_ref::<BootImageError>().is_some() {
        EXIT_BOOT_IMAGE
    } else {
        EXIT_FAILURE
    }
}
