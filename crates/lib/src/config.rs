//! Run configuration.
//!
//! [`RunConfig`] comes from the command line and never changes during a run.
//! [`Settings`] is optional site configuration loaded from TOML.

use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use luks_enroll_utils::PathQuotedDisplay;
use serde::Deserialize;

/// The environment variable that can be used to point at a config file.
pub(crate) const CONFIG_VAR: &str = "LUKS_FIDO2_ENROLL_CONFIG";
/// Consulted when [`CONFIG_VAR`] is unset; absence means defaults.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/luks-fido2-enroll/config.toml";
pub(crate) const DEFAULT_CRYPTTAB: &str = "/etc/crypttab";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

/// Immutable flags for one run, threaded explicitly through every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunConfig {
    /// Perform detection and checks, log mutating actions, apply none.
    pub(crate) dry_run: bool,
    /// Skip the interactive confirmation.
    pub(crate) auto_confirm: bool,
}

/// Site configuration.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub(crate) struct Settings {
    /// The boot-unlock table to rewrite.
    pub(crate) crypttab: Utf8PathBuf,
    /// Upper bound in seconds for non-interactive tool invocations.
    pub(crate) command_timeout: u64,
    pub(crate) enroll: EnrollSettings,
}

/// Flags passed through to `systemd-cryptenroll`.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub(crate) struct EnrollSettings {
    pub(crate) user_presence: bool,
    pub(crate) client_pin: bool,
    pub(crate) user_verification: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            crypttab: DEFAULT_CRYPTTAB.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT_SECS,
            enroll: EnrollSettings::default(),
        }
    }
}

impl Default for EnrollSettings {
    fn default() -> Self {
        Self {
            user_presence: true,
            client_pin: true,
            user_verification: false,
        }
    }
}

impl Settings {
    /// Load from [`CONFIG_VAR`] if set (the file must exist), otherwise from
    /// [`DEFAULT_CONFIG_PATH`] if present, otherwise defaults.
    #[context("Loading configuration")]
    pub(crate) fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_VAR) {
            let path = Utf8PathBuf::try_from(std::path::PathBuf::from(path))
                .with_context(|| format!("{CONFIG_VAR} is not valid UTF-8"))?;
            return Self::load_from(&path);
        }
        let default_path = Utf8Path::new(DEFAULT_CONFIG_PATH);
        if default_path.try_exists()? {
            return Self::load_from(default_path);
        }
        tracing::debug!("No config file; using defaults");
        Ok(Self::default())
    }

    pub(crate) fn load_from(path: &Utf8Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("Reading {}", PathQuotedDisplay::new(path)))?;
        let r = Self::parse(&buf)
            .with_context(|| format!("Parsing {}", PathQuotedDisplay::new(path)))?;
        tracing::debug!("Loaded config from {path}: {r:?}");
        Ok(r)
    }

    pub(crate) fn parse(buf: &str) -> Result<Self> {
        let r: Self = toml::from_str(buf)?;
        anyhow::ensure!(r.command_timeout > 0, "command-timeout must be positive");
        Ok(r)
    }

    pub(crate) fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}
