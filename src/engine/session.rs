use anyhow::{Context, Result, bail};
use provider::{LocalProvider, MockProvider, Provider};
use querygraph::{CompiledQuery, EvalOptions, Evaluator, Report};
use resgraph::{Runtime, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ProviderKind, SondaConfig};
use crate::resource;

/// A runtime over the bundled resource types, bound to one provider
pub struct Session {
    runtime: Runtime,
}

impl Session {
    /// Open a session. An explicit mock fixture wins over the configured
    /// provider.
    pub fn open(config: &SondaConfig, mock: Option<&Path>) -> Result<Self> {
        let provider: Arc<dyn Provider> = match (mock, config.provider.kind) {
            (Some(path), _) => Arc::new(load_mock(path)?),
            (None, ProviderKind::Mock) => {
                let Some(path) = config.provider.mock_path() else {
                    bail!("provider.kind = \"mock\" but no provider.mock fixture is configured");
                };
                Arc::new(load_mock(&path)?)
            }
            (None, ProviderKind::Local) => Arc::new(LocalProvider::new()),
        };
        Ok(Self::with_provider(provider))
    }

    pub fn with_provider(provider: Arc<dyn Provider>) -> Self {
        log::info!("Using provider '{}'", provider.name());
        Self {
            runtime: Runtime::new(Arc::new(resource::registry()), provider),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Evaluate a query with caller-supplied properties
    pub fn evaluate(
        &self,
        query: &CompiledQuery,
        props: BTreeMap<String, Value>,
        max_passes: usize,
    ) -> Report {
        let options = EvalOptions {
            max_passes,
            ..EvalOptions::default()
        };
        let report = Evaluator::new(&self.runtime, query)
            .with_props(props)
            .with_options(options)
            .run();
        log::debug!(
            "Evaluated {} in {} passes: {:?}",
            query.checksum,
            report.passes,
            self.runtime.stats()
        );
        report
    }
}

fn load_mock(path: &Path) -> Result<MockProvider> {
    MockProvider::load(path).with_context(|| format!("Could not load mock fixture {}", path.display()))
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else is a string.
pub fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let Some((key, raw)) = pair.split_once('=') else {
                bail!("expected key=value, got '{pair}'");
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("empty key in '{pair}'");
            }
            let value = serde_json::from_str::<serde_json::Value>(raw)
                .map_or_else(|_| Value::from(raw), |json| Value::from_json(&json));
            Ok((key.to_string(), value))
        })
        .collect()
}
