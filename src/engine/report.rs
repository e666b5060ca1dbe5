//! Rendering of evaluation reports

use anyhow::{Context, Result};
use colored::Colorize;
use querygraph::{Assessment, RawResult, Report};
use serde::Serialize;

use crate::ui;

/// Longest value printed on one line in text output
const MAX_VALUE_WIDTH: usize = 72;

/// Pass/fail counts over the entrypoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl Summary {
    pub fn of(report: &Report) -> Self {
        let mut summary = Self::default();
        for entry in &report.entrypoints {
            if entry.data.error.is_some() {
                summary.errors += 1;
            } else if entry.data.is_success() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors
    }
}

fn label(result: &RawResult) -> &str {
    result.label.as_deref().unwrap_or(&result.checksum)
}

/// Why a failing entrypoint failed, from its assessments
fn reason(result: &RawResult, assessments: &[Assessment]) -> String {
    let own: Vec<String> = assessments
        .iter()
        .filter(|a| a.checksum == result.checksum)
        .map(|a| format!("(got {}, expected {} {})", a.actual, a.operator, a.expected))
        .collect();
    if own.is_empty() {
        format!("(got {})", ui::truncate(&result.data.value.to_string(), MAX_VALUE_WIDTH))
    } else {
        own.join(" ")
    }
}

pub fn print_text(report: &Report, title: &str) {
    ui::header(title);

    if !report.entrypoints.is_empty() {
        ui::section("Checks");
        for entry in &report.entrypoints {
            match &entry.data.error {
                Some(err) => ui::errored(label(entry), &err.to_string()),
                None if entry.data.is_success() => ui::pass(label(entry)),
                None => ui::fail(label(entry), &reason(entry, &report.assessments)),
            }
        }
    }

    // assessments of comparisons nested inside a failing entrypoint
    let nested: Vec<&Assessment> = report
        .assessments
        .iter()
        .filter(|a| !report.entrypoints.iter().any(|e| e.checksum == a.checksum))
        .collect();
    if !nested.is_empty() {
        ui::section("Assessments");
        for a in nested {
            let name = a.label.as_deref().unwrap_or(&a.checksum);
            ui::fail(
                name,
                &format!("(got {}, expected {} {})", a.actual, a.operator, a.expected),
            );
        }
    }

    if !report.datapoints.is_empty() {
        ui::section("Data");
        for data in &report.datapoints {
            match &data.data.error {
                Some(err) => ui::kv(label(data), &err.to_string().yellow().to_string()),
                None => ui::kv(
                    label(data),
                    &ui::truncate(&data.data.value.to_string(), MAX_VALUE_WIDTH),
                ),
            }
        }
    }

    println!();
    let summary = Summary::of(report);
    if summary.total() > 0 {
        let line = format!(
            "{} passed, {} failed, {} errors",
            summary.passed, summary.failed, summary.errors
        );
        if report.success {
            ui::success(&line);
        } else {
            ui::error(&line);
        }
    }
    ui::dim(&format!(
        "score {} in {} pass{}",
        report.score.checksum,
        report.passes,
        if report.passes == 1 { "" } else { "es" }
    ));
}

pub fn to_json(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::MockProvider;
    use querygraph::{Evaluator, Operator, QueryBuilder};
    use resgraph::Runtime;
    use std::sync::Arc;

    fn report() -> Report {
        let mock = Arc::new(
            MockProvider::new().with_file("/etc/passwd", "root:x:0:0:root:/root:/bin/bash\n", 0o644),
        );
        let runtime = Runtime::new(Arc::new(crate::resource::registry()), mock);

        let mut q = QueryBuilder::new();
        let path = q.literal("/etc/passwd");
        let file = q.resource("file", &[("path", &path)]);
        let size = q.field(&file, "size");
        let zero = q.literal(0);
        let big = q.literal(4096);
        let nonempty = q.op(Operator::Gt, &[&size, &zero]);
        let huge = q.op(Operator::Gt, &[&size, &big]);
        let missing_path = q.literal("/etc/missing");
        let missing = q.resource("file", &[("path", &missing_path)]);
        let missing_size = q.field(&missing, "size");
        let broken = q.op(Operator::Gt, &[&missing_size, &zero]);
        q.entrypoint(&nonempty, "passwd is not empty")
            .entrypoint(&huge, "passwd is huge")
            .entrypoint(&broken, "missing is not empty")
            .datapoint(&size, "passwd size");
        let query = q.build();
        Evaluator::new(&runtime, &query).run()
    }

    #[test]
    fn test_summary_counts() {
        let report = report();
        assert!(!report.success);
        assert_eq!(
            Summary::of(&report),
            Summary {
                passed: 1,
                failed: 1,
                errors: 1
            }
        );
        assert_eq!(Summary::of(&report).total(), 3);
    }

    #[test]
    fn test_reason_uses_assessment() {
        let report = report();
        let huge = &report.entrypoints[1];
        assert_eq!(reason(huge, &report.assessments), "(got 32, expected > 4096)");
    }

    #[test]
    fn test_json_output() {
        let report = report();
        let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert_eq!(json["success"], serde_json::json!(false));
        assert_eq!(json["datapoints"][0]["value"], serde_json::json!(32));
        assert!(json["entrypoints"][2]["error"].is_string());
    }
}
