//! Provider for the machine sonda itself runs on.

use crate::error::{Error, Result};
use crate::types::{Capability, CommandOutput, FileInfo, Platform};
use crate::Provider;
use chrono::{DateTime, Utc};
use std::fs;
use std::process::Command;

/// Provider that executes commands and reads files locally.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    shell: String,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    /// Create a provider that runs commands through `sh -c`.
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different shell for [`Provider::run_command`].
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> &[Capability] {
        &Capability::ALL
    }

    fn run_command(&self, cmd: &str) -> Result<CommandOutput> {
        log::debug!("local> run command: {cmd}");
        let output = Command::new(&self.shell)
            .args(["-c", cmd])
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {}", self.shell, e),
                stderr: String::new(),
            })?;
        Ok(output.into())
    }

    fn stat(&self, path: &str) -> Result<FileInfo> {
        log::trace!("local> stat {path}");
        let meta = fs::metadata(path).map_err(|e| Error::from_io(path, e))?;
        let modified = meta.modified().ok().map(DateTime::<Utc>::from);
        let (mode, uid, gid) = ownership(&meta);

        Ok(FileInfo {
            path: path.to_string(),
            size: meta.len(),
            mode,
            uid,
            gid,
            is_dir: meta.is_dir(),
            modified,
        })
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        log::trace!("local> read {path}");
        fs::read(path).map_err(|e| Error::from_io(path, e))
    }

    fn platform(&self) -> Result<Platform> {
        let mut platform = Platform {
            name: std::env::consts::OS.to_string(),
            release: String::new(),
            arch: std::env::consts::ARCH.to_string(),
            family: vec![std::env::consts::FAMILY.to_string()],
            kind: "local".to_string(),
        };

        if let Ok(content) = fs::read_to_string("/etc/os-release") {
            apply_os_release(&mut platform, &content);
        }

        Ok(platform)
    }
}

#[cfg(unix)]
fn ownership(meta: &fs::Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode() & 0o7777, meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn ownership(meta: &fs::Metadata) -> (u32, u32, u32) {
    let mode = if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    (mode, 0, 0)
}

/// Fill platform fields from `/etc/os-release` content
fn apply_os_release(platform: &mut Platform, content: &str) {
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "ID" => platform.name = value,
            "VERSION_ID" => platform.release = value,
            "ID_LIKE" => {
                let mut family: Vec<String> =
                    value.split_whitespace().map(str::to_string).collect();
                family.append(&mut platform.family);
                platform.family = family;
            }
            _ => {}
        }
    }
}
