//! The seam between our logic and the live system.
//!
//! Everything that inspects or changes host state through a subprocess, a
//! symlink lookup or a device-node test goes through [`System`], so the
//! resolver, scanner and enrollment logic can be driven by a scripted fake.

use std::os::unix::fs::FileTypeExt;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use luks_enroll_utils::{print_info, CapturedOutput, CommandRunExt};

use crate::config::RunConfig;

pub(crate) trait System {
    /// Run a non-interactive command, capturing its output. The child is
    /// killed once `timeout` elapses.
    fn output(&self, cmd: &mut Command, timeout: Option<Duration>) -> Result<CapturedOutput>;

    /// Run a command attached to the operator's terminal.
    fn interactive(&self, cmd: &mut Command) -> Result<ExitStatus>;

    /// Resolve symbolic links to the canonical path.
    fn canonicalize(&self, path: &Utf8Path) -> Result<Utf8PathBuf>;

    /// Whether `path` exists and is a block device node.
    fn is_block_device(&self, path: &Utf8Path) -> bool;
}

/// The real host.
#[derive(Debug)]
pub(crate) struct HostSystem;

impl System for HostSystem {
    fn output(&self, cmd: &mut Command, timeout: Option<Duration>) -> Result<CapturedOutput> {
        cmd.log_debug().run_capture_output(timeout)
    }

    fn interactive(&self, cmd: &mut Command) -> Result<ExitStatus> {
        cmd.log_debug().run_inherited_status()
    }

    fn canonicalize(&self, path: &Utf8Path) -> Result<Utf8PathBuf> {
        path.canonicalize_utf8()
            .with_context(|| format!("Resolving {path}"))
    }

    fn is_block_device(&self, path: &Utf8Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }
}

/// Pairs a [`System`] with the [`RunConfig`] of this run. Queries always
/// execute; anything that changes state is only logged under dry-run.
///
/// Only queries are bounded by the query timeout. A mutation killed halfway
/// could leave a volume or the boot configuration half updated.
pub(crate) struct Runner<'a> {
    sys: &'a dyn System,
    cfg: RunConfig,
    query_timeout: Option<Duration>,
}

impl<'a> Runner<'a> {
    pub(crate) fn new(sys: &'a dyn System, cfg: RunConfig) -> Self {
        Self {
            sys,
            cfg,
            query_timeout: None,
        }
    }

    /// Kill read-only commands that run longer than `timeout`.
    pub(crate) fn with_query_timeout(self, timeout: Duration) -> Self {
        Self {
            query_timeout: Some(timeout),
            ..self
        }
    }

    pub(crate) fn sys(&self) -> &dyn System {
        self.sys
    }

    pub(crate) fn cfg(&self) -> &RunConfig {
        &self.cfg
    }

    /// Run a read-only command.
    pub(crate) fn query(&self, mut cmd: Command) -> Result<CapturedOutput> {
        self.sys.output(&mut cmd, self.query_timeout)
    }

    /// Run a state-changing command, capturing output. Returns `None` under dry-run.
    pub(crate) fn mutate(&self, mut cmd: Command) -> Result<Option<CapturedOutput>> {
        if self.skip_for_dry_run(&cmd) {
            return Ok(None);
        }
        self.sys.output(&mut cmd, None).map(Some)
    }

    /// Run a state-changing command on the operator's terminal. Returns `None` under dry-run.
    pub(crate) fn mutate_interactive(&self, mut cmd: Command) -> Result<Option<ExitStatus>> {
        if self.skip_for_dry_run(&cmd) {
            return Ok(None);
        }
        self.sys.interactive(&mut cmd).map(Some)
    }

    fn skip_for_dry_run(&self, cmd: &Command) -> bool {
        if !self.cfg.dry_run {
            return false;
        }
        let pretty = cmd.to_string_pretty();
        tracing::info!("dry-run: skipping {pretty}");
        print_info(format_args!("dry-run: would run: {pretty}"));
        true
    }
}

impl std::fmt::Debug for Runner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("cfg", &self.cfg)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
