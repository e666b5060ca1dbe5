//! # resgraph
//!
//! Resource graph runtime.
//!
//! A [`Runtime`] instantiates typed resources on demand, memoizes their
//! fields (errors included), deduplicates instances by identity and keeps
//! derived fields consistent through watch edges. Resolvers that prefer
//! one batched provider call over many small ones can [`Runtime::defer`]
//! a field: it is marked pending, and the queued gather fills every
//! pending field at once when [`Runtime::run_gathers`] runs.
//!
//! ## Example
//!
//! ```
//! use provider::MockProvider;
//! use resgraph::{Args, Registry, ResourceType, Runtime, Value, ValueType};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     ResourceType::builder("file")
//!         .key("path", ValueType::String)
//!         .field("content", ValueType::String, |_rt, res| {
//!             let path = res.string("path")?;
//!             Ok(Value::from(res.provider().read_to_string(&path)?))
//!         })
//!         .build(),
//! );
//!
//! let mock = Arc::new(MockProvider::new().with_file("/etc/hostname", "box\n", 0o644));
//! let runtime = Runtime::new(Arc::new(registry), mock);
//!
//! let mut args = Args::new();
//! args.insert("path".to_string(), Value::from("/etc/hostname"));
//! let file = runtime.create_resource("file", args).unwrap();
//! assert_eq!(runtime.resolve(&file, "content").unwrap(), Value::from("box\n"));
//! ```

pub mod cache;
pub mod error;
mod gather;
mod inflight;
pub mod observer;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod value;

pub use cache::CacheEntry;
pub use error::{ErrorKind, ResourceError, Result};
pub use observer::{Callback, ObserverTable};
pub use registry::{
    FieldDescriptor, Init, Registry, ResourceType, ResourceTypeBuilder, ResourceTypeDescriptor,
};
pub use resource::{Args, FieldKey, FieldRef, ID_FIELD, Resource, Seeds};
pub use runtime::{Runtime, RuntimeStats};
pub use value::{Value, ValueType};
