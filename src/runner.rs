//! Plugin process execution.
//!
//! Spawns one plugin instance as a child process, captures its first output
//! line and parses it. A single wall-clock deadline (the polling interval)
//! governs the whole invocation: if it expires the child is killed and the
//! invocation is a failed cycle. Every spawned child is reaped exactly once.

use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::api::Instance;
use crate::parser::{self, ParseError, PluginOutput};
use crate::registry::PluginMetadata;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("cannot spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("cannot read output of '{command}': {source}")]
    Read {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' took more than {timeout:?} to execute and was killed")]
    Timeout {
        command: String,
        timeout: Duration,
    },

    #[error("'{command}' was terminated by a signal")]
    Signaled { command: String },

    #[error("'{command}' produced no output")]
    NoOutput { command: String },

    #[error("cannot parse output of '{command}': {source}")]
    Parse {
        command: String,
        source: ParseError,
    },
}

/// Builds the argument vector for one instance.
///
/// Positional/flag tokens from `args_list` come first, followed by
/// `--key value` pairs for the named args. Named args are flags, not
/// positional, so their iteration order is not significant.
pub fn build_args(instance: &Instance) -> Vec<String> {
    let mut args = instance.args_list.clone();
    for (name, value) in &instance.args {
        args.push(format!("--{}", name));
        args.push(value.clone());
    }
    args
}

/// Runs one plugin instance and parses its first output line.
///
/// Standard output is captured; standard error is not part of the parsing
/// contract and is inherited for diagnostics. The read and the wait race a
/// single `deadline`; when it fires first the child is killed, reaped and
/// the invocation fails. No metric and no rate update happen for a failed
/// cycle — the caller just logs and moves on.
pub async fn run(
    plugin: &PluginMetadata,
    instance: &Instance,
    deadline: Duration,
) -> Result<PluginOutput, RunError> {
    let status_path = plugin.status_path();
    let command = status_path.display().to_string();
    let args = build_args(instance);

    debug!("Running command {} {}", command, args.join(" "));

    let mut child = Command::new(&status_path)
        .args(&args)
        .stdout(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            command: command.clone(),
            source,
        })?;

    // stdout handle is taken out so the child itself stays borrowable for
    // the kill path after the deadline future is dropped
    let mut stdout = child.stdout.take().ok_or_else(|| RunError::Read {
        command: command.clone(),
        source: std::io::Error::other("stdout not captured"),
    })?;

    let mut output = String::new();
    let waited = tokio::time::timeout(deadline, async {
        stdout.read_to_string(&mut output).await?;
        child.wait().await
    })
    .await;

    let status = match waited {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            // reap whatever is left before reporting the failure
            let _ = child.kill().await;
            return Err(RunError::Read { command, source });
        }
        Err(_elapsed) => {
            let _ = child.kill().await;
            return Err(RunError::Timeout {
                command,
                timeout: deadline,
            });
        }
    };

    let exit_code = match status.code() {
        Some(code) => code,
        None => return Err(RunError::Signaled { command }),
    };

    let first_line = match output.lines().next() {
        Some(line) => line,
        None => return Err(RunError::NoOutput { command }),
    };
    debug!("Output of plugin {} is {}", command, first_line);

    parser::parse(plugin.output, exit_code, first_line, Utc::now())
        .map_err(|source| RunError::Parse { command, source })
}

/// Runs a plugin's `should_monitor` probe under the same deadline discipline.
///
/// Returns true when the probe exists and exits successfully, meaning the
/// software the plugin monitors is present on this host.
pub async fn probe_should_monitor(plugin: &PluginMetadata, deadline: Duration) -> bool {
    let probe_path = plugin.should_monitor_path();

    let mut child = match Command::new(&probe_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(
                "Doesn't seem like {} is installed on this server: {}",
                plugin.name, e
            );
            return false;
        }
    };

    match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("Cannot wait for probe {}: {}", probe_path.display(), e);
            false
        }
        Err(_elapsed) => {
            let _ = child.kill().await;
            debug!("Probe {} timed out and was killed", probe_path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn build_args_expands_named_flags() {
        let instance = Instance {
            name: "cache".to_string(),
            args_list: vec!["-v".to_string(), "fast".to_string()],
            args: HashMap::from([("port".to_string(), "6380".to_string())]),
        };

        let args = build_args(&instance);
        assert_eq!(&args[..2], &["-v".to_string(), "fast".to_string()]);
        assert_eq!(&args[2..], &["--port".to_string(), "6380".to_string()]);
    }

    #[test]
    fn build_args_empty_instance() {
        assert!(build_args(&Instance::default()).is_empty());
    }
}
