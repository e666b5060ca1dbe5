//! # querygraph
//!
//! Compiled queries and their evaluation against a [`resgraph::Runtime`].
//!
//! A [`CompiledQuery`] is a flat, checksum-addressed expression graph with
//! designated entrypoints (which decide pass/fail) and datapoints (which
//! are only reported). The [`Evaluator`] walks it, creating resources and
//! resolving fields through the runtime, and produces a [`Report`] with one
//! value-or-error per checksum. A failing sub-expression never blanks out
//! the others.
//!
//! ## Example
//!
//! ```
//! use provider::MockProvider;
//! use querygraph::{Evaluator, Operator, QueryBuilder};
//! use resgraph::{Registry, ResourceType, Runtime, Value, ValueType};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     ResourceType::builder("file")
//!         .key("path", ValueType::String)
//!         .field("size", ValueType::Int, |_rt, res| {
//!             Ok(Value::from(res.provider().stat(&res.string("path")?)?.size))
//!         })
//!         .build(),
//! );
//! let mock = Arc::new(MockProvider::new().with_file("/etc/motd", "hi\n", 0o644));
//! let runtime = Runtime::new(Arc::new(registry), mock);
//!
//! let mut q = QueryBuilder::new();
//! let path = q.literal("/etc/motd");
//! let file = q.resource("file", &[("path", &path)]);
//! let size = q.field(&file, "size");
//! let three = q.literal(3);
//! let check = q.op(Operator::Eq, &[&size, &three]);
//! q.entrypoint(&check, "file(\"/etc/motd\").size == 3");
//! let query = q.build();
//!
//! let report = Evaluator::new(&runtime, &query).run();
//! assert!(report.success);
//! ```

pub mod builder;
pub mod error;
pub mod evaluator;
pub mod query;
pub mod report;

pub use builder::{QueryBuilder, checksum_of};
pub use error::{EvalError, QueryError};
pub use evaluator::{DEFAULT_MAX_PASSES, EvalOptions, Evaluator};
pub use query::{BlockOp, CompiledQuery, DEFAULT_BINDING, Node, NodeKind, Operator};
pub use report::{Assessment, RawData, RawResult, Report};
