//! Command batching client.
//!
//! A [`CtlClient`] owns one channel and one command buffer. In immediate mode
//! every [`CtlClient::run`] is one remote invocation. While batching, commands
//! accumulate in the buffer and [`CtlClient::flush`] sends all of them as a
//! single invocation:
//!
//! ```text
//!   Idle ──begin_batch/enable_batch_mode(true)──▶ Buffering
//!    ▲                                               │ run: buffer.push
//!    └──────── commit / abort / flush ◀──────────────┘
//! ```
//!
//! The buffer is taken before it is sent, so a failed flush never leaves
//! commands behind to be re-sent.

use crate::channel::RemoteExec;
use crate::commands::{quote, Command};
use crate::error::{ExecError, Result};
use crate::install::{ClientKind, InstallMethod, Target};
use std::mem;
use tracing::{debug, trace, warn};

/// A batching client for one tool on one endpoint.
pub struct CtlClient {
    kind: ClientKind,
    channel: Box<dyn RemoteExec>,
    target: Target,
    batch_mode: bool,
    buffer: Vec<Command>,
}

impl std::fmt::Debug for CtlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtlClient")
            .field("kind", &self.kind)
            .field("endpoint", &self.channel.endpoint())
            .field("target", &self.target)
            .field("batch_mode", &self.batch_mode)
            .field("pending", &self.buffer.len())
            .finish()
    }
}

impl CtlClient {
    /// Create an idle client of `kind` over `channel`.
    pub fn new(kind: ClientKind, channel: Box<dyn RemoteExec>) -> Self {
        Self {
            kind,
            channel,
            target: Target::default(),
            batch_mode: false,
            buffer: Vec::new(),
        }
    }

    /// Client kind.
    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Endpoint of the underlying channel.
    pub fn endpoint(&self) -> &str {
        self.channel.endpoint()
    }

    /// Current addressing.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Replace the addressing used for subsequent invocations.
    pub fn set_target(&mut self, target: Target) {
        self.target = target;
    }

    /// Point the client at another sandbox, keeping the daemon socket.
    pub fn set_sandbox(
        &mut self,
        sandbox: &str,
        install_method: InstallMethod,
        host_container: Option<&str>,
    ) {
        self.target.sandbox = sandbox.to_string();
        self.target.install_method = install_method;
        self.target.host_container = host_container.map(str::to_string);
    }

    /// Toggle buffering. Either way the buffer starts out empty.
    pub fn enable_batch_mode(&mut self, enabled: bool) {
        self.discard("batch mode toggled");
        self.batch_mode = enabled;
    }

    /// Whether commands are being buffered.
    pub fn is_batching(&self) -> bool {
        self.batch_mode
    }

    /// Number of buffered commands.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Run `cmd`, raising on a nonzero exit.
    ///
    /// Returns the captured stdout in immediate mode, and `None` when the
    /// command was buffered.
    pub fn run(&mut self, cmd: Command) -> Result<Option<String>> {
        self.execute(cmd, true)
    }

    /// Run `cmd`, logging rather than raising on a nonzero exit.
    pub fn run_best_effort(&mut self, cmd: Command) -> Result<Option<String>> {
        self.execute(cmd, false)
    }

    /// Run or buffer `cmd` according to the batch mode.
    pub fn execute(&mut self, cmd: Command, raise_on_error: bool) -> Result<Option<String>> {
        if self.batch_mode {
            trace!(kind = %self.kind, command = %cmd, "buffering command");
            self.buffer.push(cmd);
            return Ok(None);
        }
        let output = self.send(std::slice::from_ref(&cmd), raise_on_error)?;
        Ok(Some(output))
    }

    /// Run `cmd` immediately and return its stdout, bypassing the buffer.
    pub fn query(&mut self, cmd: Command) -> Result<String> {
        self.send(std::slice::from_ref(&cmd), true)
    }

    /// Send every buffered command as one invocation. No-op when empty.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_with(true)
    }

    /// Like [`flush`](Self::flush), but a nonzero exit is only logged.
    pub fn flush_best_effort(&mut self) -> Result<()> {
        self.flush_with(false)
    }

    fn flush_with(&mut self, raise_on_error: bool) -> Result<()> {
        let cmds = mem::take(&mut self.buffer);
        if cmds.is_empty() {
            return Ok(());
        }
        self.send(&cmds, raise_on_error).map(drop)
    }

    /// Start a scoped batch. Buffered commands are only sent by
    /// [`BatchSession::flush`] or [`BatchSession::commit`]; dropping the
    /// session without committing discards them.
    pub fn begin_batch(&mut self) -> BatchSession<'_> {
        let previous_mode = self.batch_mode;
        self.enable_batch_mode(true);
        BatchSession {
            client: self,
            previous_mode,
        }
    }

    fn discard(&mut self, reason: &str) {
        if !self.buffer.is_empty() {
            warn!(
                kind = %self.kind,
                endpoint = %self.channel.endpoint(),
                discarded = self.buffer.len(),
                reason,
                "discarding buffered commands"
            );
            self.buffer.clear();
        }
    }

    fn send(&self, cmds: &[Command], raise_on_error: bool) -> Result<String> {
        let script = self.render_script(cmds)?;
        debug!(
            kind = %self.kind,
            endpoint = %self.channel.endpoint(),
            sandbox = %self.target.sandbox,
            commands = cmds.len(),
            "sending invocation"
        );
        trace!(script = %script, "invocation body");
        let output = self.channel.execute(&script, raise_on_error)?;
        Ok(output.stdout)
    }

    /// Render the full script for `cmds`, including install-method prefixing.
    pub fn render_script(&self, cmds: &[Command]) -> Result<String> {
        let Some(binary) = self.kind.binary() else {
            let body = join_lines(cmds.iter().map(Command::render));
            return Ok(match self.target.install_method {
                InstallMethod::Container => format!(
                    "sudo docker exec {} sh -c {}",
                    self.target.container_for(self.kind),
                    quote(&body)
                ),
                _ => body,
            });
        };

        let lines = self.tool_lines(binary, cmds);
        let target = &self.target;
        let daemon = self
            .kind
            .daemon_env()
            .zip(target.daemon_socket.as_deref());
        let script = match (target.install_method, daemon) {
            (InstallMethod::Container, daemon) => {
                let container = target.container_for(self.kind);
                let env = daemon
                    .map(|(env, socket)| format!("-e {env}={socket} "))
                    .unwrap_or_default();
                join_lines(
                    lines
                        .iter()
                        .map(|line| format!("sudo docker exec {env}{container} {line}")),
                )
            }
            (_, Some((env, socket))) => {
                join_lines(lines.iter().map(|line| format!("{env}={socket} {line}")))
            }
            (InstallMethod::Daemon, None) => return Err(ExecError::MissingDaemonSocket),
            _ if target.sandbox.is_empty() => join_lines(lines),
            _ => join_lines(
                std::iter::once(format!(". {}/sandbox.rc", target.sandbox)).chain(lines),
            ),
        };
        Ok(script)
    }

    /// One tool invocation per line. Chaining tools take every command in a
    /// single invocation separated by `--`.
    fn tool_lines(&self, binary: &str, cmds: &[Command]) -> Vec<String> {
        if self.kind.chains_commands() {
            let mut globals: Vec<&str> = Vec::new();
            for g in cmds.iter().flat_map(Command::globals) {
                if !globals.contains(&g.as_str()) {
                    globals.push(g);
                }
            }
            let chained = cmds
                .iter()
                .map(Command::render)
                .collect::<Vec<_>>()
                .join(" -- ");
            vec![join_words(binary, &globals, &chained)]
        } else {
            cmds.iter()
                .map(|cmd| {
                    let globals: Vec<&str> = cmd.globals().iter().map(String::as_str).collect();
                    join_words(binary, &globals, &cmd.render())
                })
                .collect()
        }
    }
}

fn join_words(binary: &str, globals: &[&str], rest: &str) -> String {
    std::iter::once(binary)
        .chain(globals.iter().copied())
        .chain((!rest.is_empty()).then_some(rest))
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_lines<I: IntoIterator<Item = String>>(lines: I) -> String {
    lines.into_iter().collect::<Vec<_>>().join("\n")
}

/// A scoped batch on a [`CtlClient`].
///
/// `commit` sends the remaining buffer; `abort` or dropping the session
/// discards it. Either way the client's previous batch mode is restored.
#[must_use = "buffered commands are discarded unless the batch is committed"]
pub struct BatchSession<'a> {
    client: &'a mut CtlClient,
    previous_mode: bool,
}

impl BatchSession<'_> {
    /// Buffer `cmd`.
    pub fn run(&mut self, cmd: Command) {
        trace!(kind = %self.client.kind, command = %cmd, "buffering command");
        self.client.buffer.push(cmd);
    }

    /// Number of buffered commands.
    pub fn pending(&self) -> usize {
        self.client.buffer.len()
    }

    /// Send what is buffered so far and keep batching.
    pub fn flush(&mut self) -> Result<()> {
        self.client.flush()
    }

    /// Send what is buffered so far, logging failures, and keep batching.
    pub fn flush_best_effort(&mut self) -> Result<()> {
        self.client.flush_best_effort()
    }

    /// Send the remaining buffer and end the batch.
    pub fn commit(mut self) -> Result<()> {
        self.flush()
    }

    /// Send the remaining buffer, logging failures, and end the batch.
    pub fn commit_best_effort(mut self) -> Result<()> {
        self.flush_best_effort()
    }

    /// Discard the remaining buffer and end the batch.
    pub fn abort(self) {
        if !self.client.buffer.is_empty() {
            debug!(
                kind = %self.client.kind,
                discarded = self.client.buffer.len(),
                "batch aborted"
            );
            self.client.buffer.clear();
        }
    }
}

impl Drop for BatchSession<'_> {
    fn drop(&mut self) {
        self.client.discard("batch session dropped without commit");
        self.client.batch_mode = self.previous_mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{nbctl, vsctl};
    use crate::testing::RecordingConnector;

    fn client(kind: ClientKind, rec: &RecordingConnector) -> CtlClient {
        CtlClient::new(kind, rec.channel("controller"))
    }

    #[test]
    fn test_immediate_mode_sends_each_command() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.set_target(Target::new("/root/sandbox", InstallMethod::Direct));
        let out = nb.run(nbctl::ls_add("sw0")).unwrap();
        assert_eq!(out, Some(String::new()));
        assert_eq!(
            rec.scripts(),
            [". /root/sandbox/sandbox.rc\novn-nbctl ls-add sw0"]
        );
    }

    #[test]
    fn test_batch_mode_chains_commands_into_one_invocation() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        assert_eq!(nb.run(nbctl::ls_add("sw0")).unwrap(), None);
        assert_eq!(nb.run(nbctl::ls_add("sw1")).unwrap(), None);
        assert!(rec.scripts().is_empty());
        nb.flush().unwrap();
        assert_eq!(rec.scripts(), ["ovn-nbctl ls-add sw0 -- ls-add sw1"]);
        assert_eq!(nb.pending(), 0);
    }

    #[test]
    fn test_flush_of_empty_buffer_is_noop() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        nb.flush().unwrap();
        assert!(rec.scripts().is_empty());
    }

    #[test]
    fn test_failed_flush_clears_buffer() {
        let rec = RecordingConnector::new();
        rec.fail_when("ls-add", 1);
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        nb.run(nbctl::ls_add("sw0")).unwrap();
        let err = nb.flush().unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(nb.pending(), 0);
        nb.flush().unwrap();
        assert_eq!(rec.scripts().len(), 1);
    }

    #[test]
    fn test_best_effort_swallows_failure() {
        let rec = RecordingConnector::new();
        rec.fail_when("lr-del", 1);
        let mut nb = client(ClientKind::NbCtl, &rec);
        assert!(nb.run_best_effort(nbctl::lr_del("r0")).is_ok());
    }

    #[test]
    fn test_reentering_batch_mode_resets_buffer() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        nb.run(nbctl::ls_add("sw0")).unwrap();
        nb.enable_batch_mode(true);
        assert_eq!(nb.pending(), 0);
        nb.flush().unwrap();
        assert!(rec.scripts().is_empty());
    }

    #[test]
    fn test_globals_are_hoisted_once() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        nb.run(nbctl::sync("hv")).unwrap();
        nb.run(nbctl::sync("hv")).unwrap();
        nb.flush().unwrap();
        assert_eq!(rec.scripts(), ["ovn-nbctl --wait=hv sync -- sync"]);
    }

    #[test]
    fn test_containerized_prefix() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.set_target(Target::new("sandbox-1", InstallMethod::Container));
        nb.run(nbctl::ls_add("sw0")).unwrap();

        let mut vs = client(ClientKind::VsCtl, &rec);
        vs.set_target(Target::new("sandbox-1", InstallMethod::Container));
        vs.run(vsctl::del_port("lp_1")).unwrap();

        let mut sh = client(ClientKind::Ssh, &rec);
        sh.set_target(Target::new("sandbox-1", InstallMethod::Container));
        sh.run(Command::shell("ip netns add lp_1")).unwrap();

        assert_eq!(
            rec.scripts(),
            [
                "sudo docker exec ovn-database ovn-nbctl ls-add sw0",
                "sudo docker exec sandbox-1 ovs-vsctl --if-exists del-port lp_1",
                "sudo docker exec sandbox-1 sh -c 'ip netns add lp_1'",
            ]
        );
    }

    #[test]
    fn test_daemon_prefix_requires_socket() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.set_target(Target::new("controller-sandbox", InstallMethod::Daemon));
        assert!(matches!(
            nb.run(nbctl::ls_list()),
            Err(ExecError::MissingDaemonSocket)
        ));

        nb.set_target(
            Target::new("controller-sandbox", InstallMethod::Daemon)
                .daemon_socket(Some("/tmp/nbctl.ctl")),
        );
        nb.run(nbctl::ls_list()).unwrap();
        assert_eq!(rec.scripts(), ["OVN_NB_DAEMON=/tmp/nbctl.ctl ovn-nbctl ls-list"]);
    }

    #[test]
    fn test_daemon_socket_inside_container() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.set_target(
            Target::new("controller-sandbox", InstallMethod::Container)
                .daemon_socket(Some("/var/run/ovn/ovn-nbctl.9.ctl")),
        );
        nb.run(nbctl::ls_list()).unwrap();

        let mut vs = client(ClientKind::VsCtl, &rec);
        vs.set_target(
            Target::new("sandbox-1", InstallMethod::Container)
                .daemon_socket(Some("/var/run/ovn/ovn-nbctl.9.ctl")),
        );
        vs.run(vsctl::del_port("lp_1")).unwrap();

        let mut direct = client(ClientKind::NbCtl, &rec);
        direct.set_target(
            Target::new("controller-sandbox", InstallMethod::Direct)
                .daemon_socket(Some("/tmp/nbctl.ctl")),
        );
        direct.run(nbctl::ls_list()).unwrap();

        assert_eq!(
            rec.scripts(),
            [
                "sudo docker exec -e OVN_NB_DAEMON=/var/run/ovn/ovn-nbctl.9.ctl ovn-database ovn-nbctl ls-list",
                "sudo docker exec sandbox-1 ovs-vsctl --if-exists del-port lp_1",
                "OVN_NB_DAEMON=/tmp/nbctl.ctl ovn-nbctl ls-list",
            ]
        );
    }

    #[test]
    fn test_ofctl_does_not_chain() {
        let rec = RecordingConnector::new();
        let mut of = client(ClientKind::OfCtl, &rec);
        of.enable_batch_mode(true);
        of.run(crate::commands::ofctl::dump_flows("br-int")).unwrap();
        of.run(crate::commands::ofctl::dump_flows("br-ex")).unwrap();
        of.flush().unwrap();
        assert_eq!(
            rec.scripts(),
            ["ovs-ofctl dump-flows br-int\novs-ofctl dump-flows br-ex"]
        );
    }

    #[test]
    fn test_batch_session_commit() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        let mut batch = nb.begin_batch();
        batch.run(nbctl::lr_add("r0"));
        batch.run(nbctl::lr_add("r1"));
        assert_eq!(batch.pending(), 2);
        batch.commit().unwrap();
        assert!(!nb.is_batching());
        assert_eq!(rec.scripts(), ["ovn-nbctl lr-add r0 -- lr-add r1"]);
    }

    #[test]
    fn test_batch_session_drop_discards() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        {
            let mut batch = nb.begin_batch();
            batch.run(nbctl::lr_add("r0"));
        }
        assert_eq!(nb.pending(), 0);
        assert!(!nb.is_batching());
        let batch = nb.begin_batch();
        batch.abort();
        assert!(rec.scripts().is_empty());
    }

    #[test]
    fn test_batch_session_intermediate_flush() {
        let rec = RecordingConnector::new();
        let mut nb = client(ClientKind::NbCtl, &rec);
        let mut batch = nb.begin_batch();
        batch.run(nbctl::ls_add("sw0"));
        batch.flush().unwrap();
        batch.run(nbctl::ls_add("sw1"));
        batch.commit().unwrap();
        assert_eq!(
            rec.scripts(),
            ["ovn-nbctl ls-add sw0", "ovn-nbctl ls-add sw1"]
        );
    }

    #[test]
    fn test_query_bypasses_buffer() {
        let rec = RecordingConnector::new();
        rec.respond_when("lr-list", "uuid-1 (r0)\n");
        let mut nb = client(ClientKind::NbCtl, &rec);
        nb.enable_batch_mode(true);
        nb.run(nbctl::ls_add("sw0")).unwrap();
        let out = nb.query(nbctl::lr_list()).unwrap();
        assert_eq!(out, "uuid-1 (r0)\n");
        assert_eq!(nb.pending(), 1);
    }
}
