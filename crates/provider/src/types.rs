//! Core types exchanged with providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

/// Something a provider may or may not be able to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Execute shell commands on the target
    RunCommand,
    /// Stat and read files on the target
    FileSystem,
    /// Identify the target platform
    Platform,
}

impl Capability {
    /// All capabilities, in declaration order
    pub const ALL: [Capability; 3] = [Self::RunCommand, Self::FileSystem, Self::Platform];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::RunCommand => write!(f, "running commands"),
            Capability::FileSystem => write!(f, "filesystem access"),
            Capability::Platform => write!(f, "platform detection"),
        }
    }
}

/// Output from a command run on the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: output.status.code().unwrap_or(-1),
        }
    }
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Metadata about a file on the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    /// Permission bits only (e.g. `0o644`)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Identification of the target platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Distribution or OS name (e.g. "debian", "macos")
    pub name: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub arch: String,
    /// Families this platform belongs to, most specific first
    #[serde(default)]
    pub family: Vec<String>,
    /// Kind of connection ("local", "mock", ...)
    #[serde(default)]
    pub kind: String,
}
