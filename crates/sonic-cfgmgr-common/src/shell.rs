//! OS command execution for the cfgmgr daemons.
//!
//! Managers build `ip`, `teamd` and `teamdctl` command lines with
//! [`shellquote`]d arguments and issue them through a [`ShellExecutor`]:
//! [`SystemShell`] in production, [`DryRunShell`] for `--dry-run` and tests.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{CfgMgrError, CfgMgrResult};

/// `ip` binary.
pub const IP_CMD: &str = "/sbin/ip";

/// `teamd` binary.
pub const TEAMD_CMD: &str = "/usr/bin/teamd";

/// `teamdctl` binary.
pub const TEAMDCTL_CMD: &str = "/usr/bin/teamdctl";

// $ ` " \ and newline keep their meaning inside double quotes.
static DQUOTE_SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("static pattern"));

/// Wraps `s` in double quotes, backslash-escaping the characters the shell
/// would still interpret there.
///
/// ```
/// use sonic_cfgmgr_common::shell::shellquote;
///
/// assert_eq!(shellquote("Ethernet0"), "\"Ethernet0\"");
/// assert_eq!(shellquote("a$b"), "\"a\\$b\"");
/// ```
pub fn shellquote(s: &str) -> String {
    format!("\"{}\"", DQUOTE_SPECIAL.replace_all(s, r"\$1"))
}

/// Exit status and trimmed output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 if the command was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr if there is any, otherwise stdout.
    fn failure_text(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Runs `cmd` through `/bin/sh -c` and collects its output.
///
/// Only a failure to spawn is an error; a non-zero exit is reported in the
/// returned [`CommandOutput`].
pub async fn run(cmd: &str) -> CfgMgrResult<CommandOutput> {
    debug!(command = %cmd, "exec");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CfgMgrError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Runs `cmd` and turns a non-zero exit into
/// [`CfgMgrError::ShellCommandFailed`]. Returns stdout.
pub async fn exec_or_throw(cmd: &str) -> CfgMgrResult<String> {
    let output = run(cmd).await?;
    if output.success() {
        return Ok(output.stdout);
    }

    warn!(command = %cmd, exit_code = output.exit_code, "command failed");
    Err(CfgMgrError::ShellCommandFailed {
        command: cmd.to_string(),
        exit_code: output.exit_code,
        output: output.failure_text().to_string(),
    })
}

/// Runs the OS commands issued by the managers.
///
/// Managers never call [`exec_or_throw`] directly; they go through this
/// trait so tests and `--dry-run` can observe commands instead of running
/// them.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Runs `cmd`, returning stdout or [`CfgMgrError::ShellCommandFailed`].
    async fn exec_or_throw(&self, cmd: &str) -> CfgMgrResult<String>;
}

/// Executes commands on the host through `/bin/sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

#[async_trait]
impl ShellExecutor for SystemShell {
    async fn exec_or_throw(&self, cmd: &str) -> CfgMgrResult<String> {
        exec_or_throw(cmd).await
    }
}

/// Records commands instead of running them.
///
/// Every command succeeds with empty output unless it contains one of the
/// injected failure patterns. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct DryRunShell {
    commands: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl DryRunShell {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later command containing `pattern` fail with exit code 1.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.failures.lock().push(pattern.into());
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Returns every command issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Returns the commands containing `pattern`.
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(pattern))
            .cloned()
            .collect()
    }

    /// Forgets the recorded commands.
    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

#[async_trait]
impl ShellExecutor for DryRunShell {
    async fn exec_or_throw(&self, cmd: &str) -> CfgMgrResult<String> {
        info!(command = %cmd, "dry-run");
        self.commands.lock().push(cmd.to_string());

        let failed = self.failures.lock().iter().any(|p| cmd.contains(p.as_str()));
        if failed {
            return Err(CfgMgrError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: 1,
                output: "injected failure".to_string(),
            });
        }
        Ok(String::new())
    }
}
