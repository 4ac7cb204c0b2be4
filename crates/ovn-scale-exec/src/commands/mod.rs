//! Control-plane command model.
//!
//! A [`Command`] is one verb with its command-local options and arguments,
//! plus any tool-level options (`--wait=hv`, `--bare`) that must precede the
//! first verb of an invocation. Builders for each tool live in submodules and
//! render the exact syntax of `ovn-nbctl`, `ovn-sbctl`, `ovs-vsctl` and
//! `ovs-ofctl`.

pub mod db;
pub mod nbctl;
pub mod ofctl;
pub mod sbctl;
pub mod vsctl;

use std::fmt;

pub use db::{ColumnValue, DbValue};

/// One logical control-plane command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    opts: Vec<String>,
    args: Vec<String>,
    globals: Vec<String>,
}

impl Command {
    /// Start a command with `verb`.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            opts: Vec::new(),
            args: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// A raw shell line, sent as-is through a shell client.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new(line)
    }

    /// Add a command-local option such as `--may-exist`.
    pub fn opt(mut self, opt: impl Into<String>) -> Self {
        self.opts.push(opt.into());
        self
    }

    /// Add a command-local option when `enabled`.
    pub fn opt_if(self, enabled: bool, opt: impl Into<String>) -> Self {
        if enabled {
            self.opt(opt)
        } else {
            self
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a tool-level option, hoisted to the front of the invocation.
    pub fn global(mut self, opt: impl Into<String>) -> Self {
        self.globals.push(opt.into());
        self
    }

    /// The verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Arguments, already quoted where needed.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Tool-level options.
    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    /// Render `opts verb args`, without tool-level options.
    ///
    /// An empty verb renders nothing, for invocations made of tool-level
    /// options only.
    pub fn render(&self) -> String {
        self.opts
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.verb.as_str()).filter(|v| !v.is_empty()))
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
}

/// Quote `s` for a POSIX shell. Safe words are returned unchanged.
pub fn quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(is_shell_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_orders_opts_before_verb() {
        let cmd = Command::new("add-port")
            .opt("--may-exist")
            .args(["br-int", "lp_10.0.0.1"]);
        assert_eq!(cmd.render(), "--may-exist add-port br-int lp_10.0.0.1");
    }

    #[test]
    fn test_globals_are_not_rendered_inline() {
        let cmd = Command::new("sync").global("--wait=hv");
        assert_eq!(cmd.render(), "sync");
        assert_eq!(cmd.globals(), ["--wait=hv"]);
    }

    #[test]
    fn test_opt_if() {
        assert_eq!(Command::new("x").opt_if(false, "--log").render(), "x");
        assert_eq!(Command::new("x").opt_if(true, "--log").render(), "--log x");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("lswitch_1"), "lswitch_1");
        assert_eq!(quote("10.0.0.0/24"), "10.0.0.0/24");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("ip4.src == 10.0.0.0/24"), "'ip4.src == 10.0.0.0/24'");
        assert_eq!(quote("it's"), r#"'it'"'"'s'"#);
    }
}
