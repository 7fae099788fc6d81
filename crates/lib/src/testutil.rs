//! A scripted [`System`] for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use luks_enroll_utils::CapturedOutput;

use crate::system::System;

/// Commands are matched by their program and arguments joined with single
/// spaces, without any quoting.
#[derive(Debug, Default)]
pub(crate) struct FakeSystem {
    outputs: HashMap<String, (i32, String, String)>,
    interactive: HashMap<String, i32>,
    links: HashMap<Utf8PathBuf, Utf8PathBuf>,
    block_devices: HashSet<Utf8PathBuf>,
    log: RefCell<Vec<String>>,
    timeouts: RefCell<HashMap<String, Option<Duration>>>,
}

pub(crate) fn cmdline(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

impl FakeSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, cmd: &str, code: i32, stdout: &str) -> Self {
        self.outputs
            .insert(cmd.to_owned(), (code, stdout.to_owned(), String::new()));
        self
    }

    pub(crate) fn respond_stderr(mut self, cmd: &str, code: i32, stderr: &str) -> Self {
        self.outputs
            .insert(cmd.to_owned(), (code, String::new(), stderr.to_owned()));
        self
    }

    pub(crate) fn interactive(mut self, cmd: &str, code: i32) -> Self {
        self.interactive.insert(cmd.to_owned(), code);
        self
    }

    pub(crate) fn link(mut self, from: &str, to: &str) -> Self {
        self.links.insert(from.into(), to.into());
        self
    }

    pub(crate) fn block_device(mut self, path: &str) -> Self {
        self.block_devices.insert(path.into());
        self
    }

    /// A block device carrying a LUKS header.
    pub(crate) fn luks_device(self, path: &str) -> Self {
        self.block_device(path)
            .respond(&format!("cryptsetup isLuks {path}"), 0, "")
    }

    /// Every command run so far, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// The timeout the last captured run of `cmd` was given.
    pub(crate) fn timeout_of(&self, cmd: &str) -> Option<Duration> {
        self.timeouts.borrow().get(cmd).copied().flatten()
    }

    /// Whether any executed command starts with `prefix`.
    pub(crate) fn ran(&self, prefix: &str) -> bool {
        self.log.borrow().iter().any(|c| c.starts_with(prefix))
    }
}

impl System for FakeSystem {
    fn output(&self, cmd: &mut Command, timeout: Option<Duration>) -> Result<CapturedOutput> {
        let line = cmdline(cmd);
        self.log.borrow_mut().push(line.clone());
        self.timeouts.borrow_mut().insert(line.clone(), timeout);
        let Some((code, stdout, stderr)) = self.outputs.get(&line) else {
            // Unscripted queries behave like a tool reporting failure.
            return Ok(CapturedOutput {
                status: status(1),
                stdout: String::new(),
                stderr: format!("unscripted command: {line}"),
            });
        };
        Ok(CapturedOutput {
            status: status(*code),
            stdout: stdout.clone(),
            stderr: stderr.clone(),
        })
    }

    fn interactive(&self, cmd: &mut Command) -> Result<ExitStatus> {
        let line = cmdline(cmd);
        self.log.borrow_mut().push(line.clone());
        match self.interactive.get(&line) {
            Some(code) => Ok(status(*code)),
            None => anyhow::bail!("unscripted interactive command: {line}"),
        }
    }

    fn canonicalize(&self, path: &Utf8Path) -> Result<Utf8PathBuf> {
        Ok(self
            .links
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_owned()))
    }

    fn is_block_device(&self, path: &Utf8Path) -> bool {
        self.block_devices.contains(path)
    }
}
