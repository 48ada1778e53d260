//! Command execution seam.
//!
//! Every mutation of host network state goes through a [`CommandRunner`].
//! The production implementation forks the standard tools (`ip`,
//! `iptables`, `sysctl`); tests substitute a scripted runner so executor
//! sequences can be asserted without touching the kernel.

use std::process::{Command, Stdio};

use crate::error::{NetError, Result};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
}

/// Executes external commands on behalf of the host executor.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, blocking until it exits, and captures
    /// its output. Tool failures are classified into typed errors.
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;

    /// Spawns `program` with `args` detached from the calling process
    /// (stdio closed, never waited on) and returns its pid.
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<u32>;
}

/// Production runner that forks the host's network tools.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        tracing::debug!(command = %render(program, args), "exec");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| NetError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(CmdOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let err = classify(&render(program, args), &stderr);
        tracing::debug!(command = %render(program, args), error = %err, "exec failed");
        Err(err)
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<u32> {
        tracing::debug!(command = %render(program, args), "spawn detached");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| NetError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        Ok(child.id())
    }
}

/// Classifies a failed command from its stderr.
///
/// The patterns cover the iproute2 and iptables phrasings for the three
/// outcomes the reconciler distinguishes; everything else is reported
/// verbatim.
fn classify(command: &str, stderr: &str) -> NetError {
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("file exists") || lower.contains("already exists") {
        return NetError::AlreadyExists(command.to_string());
    }
    if lower.contains("cannot find device")
        || lower.contains("does not exist")
        || lower.contains("no such file or directory")
        || lower.contains("no such process")
        || lower.contains("bad rule")
        || lower.contains("no such device")
    {
        return NetError::NotFound(command.to_string());
    }
    if lower.contains("operation not permitted") || lower.contains("permission denied") {
        return NetError::PermissionDenied(command.to_string());
    }

    NetError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.trim().to_string(),
    }
}

fn render(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
