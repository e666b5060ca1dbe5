use anyhow::{Context as _, Result};
use querygraph::{CompiledQuery, QueryBuilder, RawData};
use resgraph::{Registry, Value, ValueType};
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::GetArgs;
use crate::config::{OutputFormat, SondaConfig};
use crate::engine::{Session, session};
use crate::ui;

/// Read fields of one resource. Returns whether every field resolved.
pub fn run(_ctx: &Context, args: GetArgs) -> Result<bool> {
    let config = SondaConfig::load()?;
    let json = args.target.json || config.output.format == OutputFormat::Json;
    let session = Session::open(&config, args.target.mock.as_deref())?;

    let seeds = session::parse_pairs(&args.args).context("Invalid --arg")?;
    let query = build_query(
        session.runtime().registry(),
        &args.resource,
        seeds,
        &args.fields,
    )?;
    let report = session.evaluate(&query, BTreeMap::new(), config.eval.max_passes);

    let prefix = format!("{}.", args.resource);
    let fields: Vec<(&str, &RawData)> = report
        .datapoints
        .iter()
        .map(|d| {
            let field = d
                .label
                .as_deref()
                .and_then(|l| l.strip_prefix(&prefix))
                .unwrap_or(&d.checksum);
            (field, &d.data)
        })
        .collect();
    let ok = fields.iter().all(|(_, d)| d.error.is_none());

    if json {
        let by_field: BTreeMap<&str, &RawData> = fields.into_iter().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&by_field).context("Failed to serialize fields")?
        );
        return Ok(ok);
    }

    ui::header(&describe(&args.resource, &args.args));
    for (field, data) in &fields {
        match &data.error {
            Some(err) => ui::errored(field, &err.to_string()),
            None => ui::kv(field, &data.value.to_string()),
        }
    }
    Ok(ok)
}

fn describe(resource: &str, args: &[String]) -> String {
    if args.is_empty() {
        resource.to_string()
    } else {
        format!("{resource}({})", args.join(", "))
    }
}

/// One datapoint per requested field, in order. Arguments declared as
/// strings stay strings even when they look like JSON.
fn build_query(
    registry: &Registry,
    resource: &str,
    seeds: BTreeMap<String, Value>,
    fields: &[String],
) -> Result<CompiledQuery> {
    let ty = registry.lookup(resource)?;
    for field in fields {
        if field != resgraph::ID_FIELD && ty.descriptor().field(field).is_none() {
            anyhow::bail!("resource '{resource}' has no field '{field}'");
        }
    }

    let mut q = QueryBuilder::new();
    let literals: Vec<(String, String)> = seeds
        .into_iter()
        .map(|(name, value)| {
            let declared = ty.descriptor().field(&name).map(|f| &f.value_type);
            let json = match (declared, &value) {
                (Some(ValueType::String), v) if v.as_str().is_none() => {
                    serde_json::Value::String(v.to_string())
                }
                _ => value.to_json(),
            };
            (name, q.literal(json))
        })
        .collect();
    let pairs: Vec<(&str, &str)> = literals
        .iter()
        .map(|(name, checksum)| (name.as_str(), checksum.as_str()))
        .collect();

    let target = q.resource(resource, &pairs);
    for field in fields {
        let node = q.field(&target, field);
        q.datapoint(&node, &format!("{resource}.{field}"));
    }
    Ok(q.build())
}
