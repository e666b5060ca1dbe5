use anyhow::{Context as _, Result};
use querygraph::CompiledQuery;

use crate::Context;
use crate::cli::RunArgs;
use crate::config::{OutputFormat, SondaConfig};
use crate::engine::{Session, report, session};
use crate::progress;

/// Evaluate a compiled query. Returns whether every check passed.
pub fn run(ctx: &Context, args: RunArgs) -> Result<bool> {
    let config = SondaConfig::load()?;
    let query = CompiledQuery::load(&args.query)
        .with_context(|| format!("Could not load query {}", args.query.display()))?;
    let props = session::parse_pairs(&args.props).context("Invalid --prop")?;
    let max_passes = args
        .max_passes
        .map_or(config.eval.max_passes, usize::from);
    let json = args.target.json || config.output.format == OutputFormat::Json;

    let session = Session::open(&config, args.target.mock.as_deref())?;
    log::info!(
        "Evaluating {} ({} nodes, {} checks, {} data points)",
        args.query.display(),
        query.code.len(),
        query.entrypoints.len(),
        query.datapoints.len()
    );

    let pb = progress::spinner(
        &format!("Evaluating {}", args.query.display()),
        ctx.quiet || json,
    );
    let report = session.evaluate(&query, props, max_passes);
    if report.success {
        progress::finish_success(&pb, "Query passed");
    } else {
        progress::finish_error(&pb, "Query failed");
    }

    if json {
        println!("{}", report::to_json(&report)?);
    } else {
        report::print_text(&report, &format!("Query {}", args.query.display()));
    }
    Ok(report.success)
}
