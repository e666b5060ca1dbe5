//! # provider
//!
//! System access boundary for resource resolvers.
//!
//! Resource resolvers never touch the operating system directly. They go
//! through a [`Provider`], which runs commands, stats and reads files, and
//! identifies the platform of whatever target it is connected to. Swapping
//! the provider is how the same resource graph queries a local machine, a
//! recorded fixture, or anything else that implements the trait.
//!
//! ## Example
//!
//! ```no_run
//! use provider::{MockProvider, Provider};
//!
//! let mock = MockProvider::new()
//!     .with_file("/etc/hostname", "box\n", 0o644)
//!     .with_command("uname -m", "x86_64\n");
//!
//! let info = mock.stat("/etc/hostname").unwrap();
//! assert_eq!(info.size, 4);
//! assert_eq!(mock.stat_calls(), 1);
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod local;
pub mod mock;
pub mod types;

pub use error::{Error, Result};
pub use local::LocalProvider;
pub use mock::{MockCommand, MockFile, MockProvider};
pub use types::{Capability, CommandOutput, FileInfo, Platform};

/// Backend trait for reaching a target system.
///
/// Every operation is capability-gated: callers that need a capability
/// should check [`Provider::has_capability`] (or call [`Provider::require`])
/// before relying on it, and implementations return
/// [`Error::Unsupported`] for operations they cannot perform.
pub trait Provider: Send + Sync {
    /// Short name of this provider ("local", "mock", ...)
    fn name(&self) -> &str;

    /// Capabilities this provider offers
    fn capabilities(&self) -> &[Capability];

    /// Check whether a capability is available
    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Fail with [`Error::Unsupported`] unless the capability is available
    fn require(&self, capability: Capability) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(Error::Unsupported {
                capability,
                provider: self.name().to_string(),
            })
        }
    }

    /// Run a shell command line.
    ///
    /// A non-zero exit status is reported in [`CommandOutput::exit_status`],
    /// not as an error.
    fn run_command(&self, cmd: &str) -> Result<CommandOutput>;

    /// Stat a file
    fn stat(&self, path: &str) -> Result<FileInfo>;

    /// Read a file's full contents
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Identify the target platform
    fn platform(&self) -> Result<Platform>;

    /// Read a file as (lossy) UTF-8
    fn read_to_string(&self, path: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_file(path)?).to_string())
    }
}
