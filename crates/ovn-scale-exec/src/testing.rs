//! Recording channel double.
//!
//! [`RecordingConnector`] hands out channels that record every script instead
//! of running it. Failures and canned stdout can be scripted by substring.

use crate::channel::{check_status, Connector, ExecOutput, RemoteExec};
use crate::credential::Credential;
use crate::error::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Endpoint the script was sent to.
    pub endpoint: String,
    /// Full script.
    pub script: String,
}

#[derive(Debug, Default)]
struct Recorder {
    invocations: Vec<Invocation>,
    failures: Vec<(String, usize)>,
    responses: Vec<(String, String)>,
    opened: usize,
}

impl Recorder {
    fn outcome(&mut self, script: &str) -> ExecOutput {
        if let Some((_, remaining)) = self
            .failures
            .iter_mut()
            .find(|(needle, remaining)| *remaining > 0 && script.contains(needle.as_str()))
        {
            *remaining -= 1;
            return ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "injected failure".to_string(),
            };
        }
        let stdout = self
            .responses
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();
        ExecOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        }
    }
}

/// A [`Connector`] whose channels record scripts instead of running them.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    inner: Rc<RefCell<Recorder>>,
}

impl RecordingConnector {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` scripts containing `needle` exit with status 1.
    pub fn fail_when(&self, needle: &str, times: usize) {
        self.inner
            .borrow_mut()
            .failures
            .push((needle.to_string(), times));
    }

    /// Answer scripts containing `needle` with `stdout`.
    pub fn respond_when(&self, needle: &str, stdout: &str) {
        self.inner
            .borrow_mut()
            .responses
            .push((needle.to_string(), stdout.to_string()));
    }

    /// A channel labelled `endpoint` sharing this recorder.
    pub fn channel(&self, endpoint: &str) -> Box<dyn RemoteExec> {
        Box::new(RecordingChannel {
            endpoint: endpoint.to_string(),
            inner: Rc::clone(&self.inner),
        })
    }

    /// Every invocation so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.borrow().invocations.clone()
    }

    /// Every script so far, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.inner
            .borrow()
            .invocations
            .iter()
            .map(|i| i.script.clone())
            .collect()
    }

    /// Scripts sent to `endpoint`.
    pub fn scripts_for(&self, endpoint: &str) -> Vec<String> {
        self.inner
            .borrow()
            .invocations
            .iter()
            .filter(|i| i.endpoint == endpoint)
            .map(|i| i.script.clone())
            .collect()
    }

    /// Number of scripts containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.inner
            .borrow()
            .invocations
            .iter()
            .filter(|i| i.script.contains(needle))
            .count()
    }

    /// Number of channels opened through [`Connector::open`].
    pub fn opened(&self) -> usize {
        self.inner.borrow().opened
    }

    /// Forget recorded invocations, keeping scripted behavior.
    pub fn reset(&self) {
        self.inner.borrow_mut().invocations.clear();
    }
}

impl Connector for RecordingConnector {
    fn open(&self, credential: &Credential) -> Result<Box<dyn RemoteExec>> {
        self.inner.borrow_mut().opened += 1;
        Ok(self.channel(&credential.endpoint()))
    }
}

struct RecordingChannel {
    endpoint: String,
    inner: Rc<RefCell<Recorder>>,
}

impl RemoteExec for RecordingChannel {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn execute(&self, script: &str, raise_on_error: bool) -> Result<ExecOutput> {
        let output = {
            let mut rec = self.inner.borrow_mut();
            rec.invocations.push(Invocation {
                endpoint: self.endpoint.clone(),
                script: script.to_string(),
            });
            rec.outcome(script)
        };
        check_status(&self.endpoint, script, output, raise_on_error)
    }
}
