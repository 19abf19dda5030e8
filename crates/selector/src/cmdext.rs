//! Extension traits for running external commands

use std::process::{Command, Output, Stdio};

/// Ways an external command invocation can fail.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The program could not be spawned at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Name of the program we tried to launch.
        program: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },
    /// The command ran and exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Name of the program.
        program: String,
        /// Exit status reported by the OS.
        status: std::process::ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// The command succeeded but its output was not decodable.
    #[error("failed to parse {program} output: {source}")]
    Parse {
        /// Name of the program.
        program: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl CommandError {
    /// Whether this failure means the program is not installed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CommandError::Spawn { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Helpers for commands whose output we consume.
pub trait CommandRunExt {
    /// Run the command, capturing stdout as a UTF-8 string.
    fn run_capture_stdout(&mut self) -> Result<String, CommandError>;
    /// Run the command and deserialize its stdout as JSON.
    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, CommandError>;
}

impl CommandRunExt for Command {
    fn run_capture_stdout(&mut self) -> Result<String, CommandError> {
        let out = run_captured(self)?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn run_and_parse_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, CommandError> {
        let out = run_captured(self)?;
        serde_json::from_slice(&out.stdout).map_err(|e| CommandError::Parse {
            program: program_name(self),
            source: e,
        })
    }
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run with both output streams captured; stderr only surfaces in errors.
fn run_captured(cmd: &mut Command) -> Result<Output, CommandError> {
    let out = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| CommandError::Spawn {
            program: program_name(cmd),
            source: e,
        })?;
    if !out.status.success() {
        return Err(CommandError::Failed {
            program: program_name(cmd),
            status: out.status,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(out)
}
