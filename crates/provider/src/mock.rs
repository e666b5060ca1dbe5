//! In-memory provider for tests and recorded fixtures.
//!
//! A mock is built either programmatically or from a TOML fixture:
//!
//! ```toml
//! capabilities = ["run_command", "file_system", "platform"]
//!
//! [platform]
//! name = "debian"
//! release = "12"
//! arch = "x86_64"
//! family = ["linux", "unix"]
//!
//! [files."/etc/passwd"]
//! content = "root:x:0:0:root:/root:/bin/bash\n"
//! mode = 0o644
//!
//! [commands."hostname"]
//! stdout = "box\n"
//! ```
//!
//! Every operation is counted so tests can assert how often the target was
//! actually contacted.

use crate::error::{Error, Result};
use crate::types::{Capability, CommandOutput, FileInfo, Platform};
use crate::Provider;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

fn default_mode() -> u32 {
    0o644
}

/// A file served by [`MockProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFile {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub is_dir: bool,
    /// Reported size; defaults to the content length
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

/// A canned command result served by [`MockProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockCommand {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_status: i32,
}

/// On-disk fixture format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockFixture {
    #[serde(default)]
    pub capabilities: Option<Vec<Capability>>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub files: BTreeMap<String, MockFile>,
    #[serde(default)]
    pub commands: BTreeMap<String, MockCommand>,
}

#[derive(Debug, Default)]
struct Counters {
    stat: usize,
    read: usize,
    commands: HashMap<String, usize>,
}

/// Provider backed by in-memory files and commands.
#[derive(Debug)]
pub struct MockProvider {
    capabilities: Vec<Capability>,
    data: RwLock<MockFixture>,
    counters: Mutex<Counters>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create an empty mock with every capability.
    pub fn new() -> Self {
        Self::from_fixture(MockFixture::default())
    }

    /// Create a mock from an already parsed fixture.
    pub fn from_fixture(fixture: MockFixture) -> Self {
        let capabilities = fixture
            .capabilities
            .clone()
            .unwrap_or_else(|| Capability::ALL.to_vec());
        Self {
            capabilities,
            data: RwLock::new(fixture),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Parse a TOML fixture.
    pub fn from_toml(content: &str) -> Result<Self> {
        let fixture: MockFixture =
            toml::from_str(content).map_err(|e| Error::InvalidMock(e.to_string()))?;
        Ok(Self::from_fixture(fixture))
    }

    /// Load a TOML fixture from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::InvalidMock(msg) => Error::InvalidMock(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Restrict the capabilities this mock reports.
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    /// Add a regular file.
    pub fn with_file(self, path: &str, content: &str, mode: u32) -> Self {
        self.set_file(
            path,
            MockFile {
                content: content.to_string(),
                mode,
                ..Default::default()
            },
        );
        self
    }

    /// Add a command that succeeds with the given stdout.
    pub fn with_command(self, cmd: &str, stdout: &str) -> Self {
        self.set_command(
            cmd,
            MockCommand {
                stdout: stdout.to_string(),
                ..Default::default()
            },
        );
        self
    }

    /// Set the reported platform.
    pub fn with_platform(self, platform: Platform) -> Self {
        self.data.write().platform = Some(platform);
        self
    }

    /// Insert or replace a file. Usable after construction to simulate
    /// changes on the target.
    pub fn set_file(&self, path: &str, file: MockFile) {
        self.data.write().files.insert(path.to_string(), file);
    }

    /// Remove a file.
    pub fn remove_file(&self, path: &str) {
        self.data.write().files.remove(path);
    }

    /// Insert or replace a command result.
    pub fn set_command(&self, cmd: &str, command: MockCommand) {
        self.data.write().commands.insert(cmd.to_string(), command);
    }

    /// Number of `stat` calls so far
    pub fn stat_calls(&self) -> usize {
        self.counters.lock().stat
    }

    /// Number of `read_file` calls so far
    pub fn read_calls(&self) -> usize {
        self.counters.lock().read
    }

    /// Number of times a specific command was run
    pub fn command_calls(&self, cmd: &str) -> usize {
        self.counters.lock().commands.get(cmd).copied().unwrap_or(0)
    }

    /// Total number of commands run
    pub fn total_command_calls(&self) -> usize {
        self.counters.lock().commands.values().sum()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn run_command(&self, cmd: &str) -> Result<CommandOutput> {
        self.require(Capability::RunCommand)?;
        *self
            .counters
            .lock()
            .commands
            .entry(cmd.to_string())
            .or_default() += 1;

        let data = self.data.read();
        match data.commands.get(cmd) {
            Some(command) => Ok(CommandOutput {
                stdout: command.stdout.clone().into_bytes(),
                stderr: command.stderr.clone().into_bytes(),
                exit_status: command.exit_status,
            }),
            None => {
                log::debug!("mock> no recorded output for command: {cmd}");
                Ok(CommandOutput {
                    stdout: Vec::new(),
                    stderr: format!("{cmd}: command not found").into_bytes(),
                    exit_status: 127,
                })
            }
        }
    }

    fn stat(&self, path: &str) -> Result<FileInfo> {
        self.require(Capability::FileSystem)?;
        self.counters.lock().stat += 1;

        let data = self.data.read();
        let file = data.files.get(path).ok_or_else(|| Error::not_found(path))?;
        Ok(FileInfo {
            path: path.to_string(),
            size: file.size.unwrap_or(file.content.len() as u64),
            mode: file.mode,
            uid: file.uid,
            gid: file.gid,
            is_dir: file.is_dir,
            modified: file.modified,
        })
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.require(Capability::FileSystem)?;
        self.counters.lock().read += 1;

        let data = self.data.read();
        let file = data.files.get(path).ok_or_else(|| Error::not_found(path))?;
        if file.is_dir {
            return Err(Error::Other(format!("{path} is a directory")));
        }
        Ok(file.content.clone().into_bytes())
    }

    fn platform(&self) -> Result<Platform> {
        self.require(Capability::Platform)?;
        let data = self.data.read();
        Ok(data.platform.clone().unwrap_or_else(|| Platform {
            name: "mock".to_string(),
            kind: "mock".to_string(),
            ..Default::default()
        }))
    }
}
