//! Synchronous remote execution channels.
//!
//! A channel runs one shell script per call against a single endpoint and
//! blocks until it returns. Connection reuse is the channel's concern: the
//! SSH channel relies on OpenSSH connection multiplexing so repeated calls
//! against the same credential do not renegotiate a session.

use crate::credential::Credential;
use crate::error::{ExecError, Result};
use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};
use std::thread;
use tracing::{debug, trace, warn};

/// Maximum output size in bytes (1 MB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long an idle multiplexed SSH master connection is kept open.
const SSH_CONTROL_PERSIST: &str = "120";

/// Result of a remote invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit status (-1 if the process was killed by a signal).
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A synchronous command channel to one endpoint.
pub trait RemoteExec {
    /// Printable name of the endpoint this channel talks to.
    fn endpoint(&self) -> &str;

    /// Run `script` on the endpoint and capture its output.
    ///
    /// A nonzero exit is returned as [`ExecError::Remote`] when
    /// `raise_on_error` is set; otherwise it is logged and the captured
    /// output is returned as-is.
    fn execute(&self, script: &str, raise_on_error: bool) -> Result<ExecOutput>;
}

/// Opens channels for credentials.
pub trait Connector {
    /// Open a channel to the endpoint identified by `credential`.
    fn open(&self, credential: &Credential) -> Result<Box<dyn RemoteExec>>;
}

/// Apply the `raise_on_error` policy to a finished invocation.
pub fn check_status(
    endpoint: &str,
    script: &str,
    output: ExecOutput,
    raise_on_error: bool,
) -> Result<ExecOutput> {
    if output.success() {
        return Ok(output);
    }
    if raise_on_error {
        return Err(ExecError::Remote {
            endpoint: endpoint.to_string(),
            command: script.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    warn!(
        endpoint = %endpoint,
        exit_code = output.exit_code,
        stderr = %output.stderr.trim(),
        "ignoring failed command"
    );
    Ok(output)
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

fn collect_output(out: Output) -> ExecOutput {
    ExecOutput {
        exit_code: out.status.code().unwrap_or(-1),
        stdout: truncate_output(
            String::from_utf8_lossy(&out.stdout).into_owned(),
            MAX_OUTPUT_SIZE,
        ),
        stderr: truncate_output(
            String::from_utf8_lossy(&out.stderr).into_owned(),
            MAX_OUTPUT_SIZE,
        ),
    }
}

/// Run `cmd` with `input` on its stdin and collect its output.
///
/// Stdin is written from its own thread while the output pipes are drained,
/// so a child that answers before reading all of its input cannot block on a
/// full pipe. The child is always waited for, even when the write fails.
fn output_with_stdin(mut cmd: Command, input: &str) -> std::io::Result<Output> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdin = child.stdin.take();
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
                stdin.write_all(b"\n")?;
            }
            Ok(())
        });
        let output = child.wait_with_output();
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
        (written, output)
    });
    let output = output?;
    match written {
        // The child exited without reading everything; its status says why.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!(exit_code = ?output.status.code(), "child closed stdin early");
            Ok(output)
        }
        Err(e) => Err(e),
        Ok(()) => Ok(output),
    }
}

/// Runs scripts with `sh -c` on the local host.
///
/// Used when the controller and farms are all emulated on the machine
/// driving the test.
#[derive(Debug, Clone)]
pub struct LocalShell {
    endpoint: String,
}

impl LocalShell {
    /// Create a local channel labelled with `endpoint` in logs and errors.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl RemoteExec for LocalShell {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn execute(&self, script: &str, raise_on_error: bool) -> Result<ExecOutput> {
        debug!(endpoint = %self.endpoint, "executing local script");
        trace!(script = %script, "script body");
        let out = Command::new("sh").args(["-c", script]).output()?;
        let output = collect_output(out);
        debug!(
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "script completed"
        );
        check_status(&self.endpoint, script, output, raise_on_error)
    }
}

/// Runs scripts on a remote host through the system `ssh` client.
///
/// The script is fed to `bash -s` on stdin. A multiplexed master connection
/// (`ControlMaster=auto`) is shared by every call against the same
/// credential.
#[derive(Debug, Clone)]
pub struct SshChannel {
    credential: Credential,
    endpoint: String,
}

impl SshChannel {
    /// Create a channel for `credential`. No connection is made until the
    /// first call.
    pub fn new(credential: Credential) -> Self {
        let endpoint = credential.endpoint();
        Self {
            credential,
            endpoint,
        }
    }

    fn command(&self) -> Command {
        let cred = &self.credential;
        let mut cmd = match (&cred.key, &cred.password) {
            (None, Some(password)) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", password);
                cmd
            }
            _ => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };
        cmd.args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "ControlMaster=auto"])
            .args(["-o", "ControlPath=/tmp/ovn-scale-ssh-%r@%h:%p"])
            .args(["-o", &format!("ControlPersist={SSH_CONTROL_PERSIST}")])
            .args(["-p", &cred.port.to_string()]);
        if let Some(key) = &cred.key {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", cred.user, cred.host))
            .args(["bash", "-s"]);
        cmd
    }
}

impl RemoteExec for SshChannel {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn execute(&self, script: &str, raise_on_error: bool) -> Result<ExecOutput> {
        debug!(endpoint = %self.endpoint, script_len = script.len(), "executing remote script");
        trace!(script = %script, "script body");

        let output = collect_output(output_with_stdin(self.command(), script)?);
        debug!(
            endpoint = %self.endpoint,
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            "remote script completed"
        );
        trace!(stdout = %output.stdout, stderr = %output.stderr, "remote output");
        check_status(&self.endpoint, script, output, raise_on_error)
    }
}

/// Opens [`SshChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn open(&self, credential: &Credential) -> Result<Box<dyn RemoteExec>> {
        Ok(Box::new(SshChannel::new(credential.clone())))
    }
}

/// Opens [`LocalShell`]s, ignoring the credential except for its name.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl Connector for LocalConnector {
    fn open(&self, credential: &Credential) -> Result<Box<dyn RemoteExec>> {
        Ok(Box::new(LocalShell::new(credential.endpoint())))
    }
}
