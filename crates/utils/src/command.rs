//! Helpers intended for [`std::process::Command`] and related structures.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The result of a child process whose output was captured.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Exit status of the child.
    pub status: ExitStatus,
    /// Standard output, lossily decoded as UTF-8.
    pub stdout: String,
    /// Standard error, lossily decoded as UTF-8.
    pub stderr: String,
}

impl CapturedOutput {
    /// Whether the child exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Standard output followed by standard error, for pattern matching
    /// against tool messages that may land on either stream.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    /// A short human readable description of a failure, preferring stderr.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let msg = if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        };
        if msg.is_empty() {
            format!("{}", self.status)
        } else {
            format!("{}: {msg}", self.status)
        }
    }
}

/// Helpers intended for [`std::process::Command`].
pub trait CommandRunExt {
    /// Log (at debug level) the full child commandline.
    fn log_debug(&mut self) -> &mut Self;

    /// Render the program and arguments as a shell-quoted string.
    fn to_string_pretty(&self) -> String;

    /// Execute the child process with stdin closed, capturing stdout and stderr.
    /// If `timeout` is set and expires, the child is killed and an error is returned.
    /// A non-zero exit is not an error; inspect [`CapturedOutput::status`].
    fn run_capture_output(&mut self, timeout: Option<Duration>) -> Result<CapturedOutput>;

    /// Execute the child process with inherited stdio, for tools that need to
    /// interact with the operator. A non-zero exit is not an error.
    fn run_inherited_status(&mut self) -> Result<ExitStatus>;
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("exec: {}", self.to_string_pretty());
        self
    }

    fn to_string_pretty(&self) -> String {
        std::iter::once(self.get_program())
            .chain(self.get_args())
            .map(|arg| {
                let arg = arg.to_string_lossy();
                match shlex::try_quote(&arg) {
                    Ok(quoted) => quoted.into_owned(),
                    Err(_) => arg.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn run_capture_output(&mut self, timeout: Option<Duration>) -> Result<CapturedOutput> {
        let description = self.to_string_pretty();
        let mut child = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Spawning {description}"))?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => child.wait().map_err(Into::into),
        }
        .with_context(|| format!("Waiting for {description}"))?;

        let stdout =
            join_reader(stdout).with_context(|| format!("Reading stdout of {description}"))?;
        let stderr =
            join_reader(stderr).with_context(|| format!("Reading stderr of {description}"))?;
        Ok(CapturedOutput {
            status,
            stdout,
            stderr,
        })
    }

    fn run_inherited_status(&mut self) -> Result<ExitStatus> {
        let description = self.to_string_pretty();
        self.status()
            .with_context(|| format!("Running {description}"))
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("timed out after {timeout:?}");
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<std::io::Result<String>>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: JoinHandle<std::io::Result<String>>) -> Result<String> {
    let r = handle
        .join()
        .map_err(|_| anyhow::anyhow!("output reader thread panicked"))??;
    Ok(r)
}
