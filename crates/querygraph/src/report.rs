//! Evaluation results.

use crate::error::EvalError;
use resgraph::Value;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Value or error of one checksum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawData {
    pub value: Value,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub error: Option<EvalError>,
}

impl RawData {
    pub fn from_outcome(outcome: Result<Value, EvalError>) -> Self {
        match outcome {
            Ok(value) => Self { value, error: None },
            Err(error) => Self {
                value: Value::Nil,
                error: Some(error),
            },
        }
    }

    /// No error and a truthy value
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.value.truthy()
    }
}

fn serialize_error<S: Serializer>(error: &Option<EvalError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_str(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// A reported checksum with its label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResult {
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub data: RawData,
}

/// Explanation of a failed comparison entrypoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub operator: String,
    pub actual: Value,
    pub expected: Value,
}

/// Everything one evaluation produced
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Every evaluated checksum
    pub results: BTreeMap<String, RawData>,
    pub entrypoints: Vec<RawResult>,
    pub datapoints: Vec<RawResult>,
    /// Terminal result keyed by the query checksum
    pub score: RawResult,
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assessments: Vec<Assessment>,
    pub passes: usize,
}

impl Report {
    pub fn get(&self, checksum: &str) -> Option<&RawData> {
        self.results.get(checksum)
    }

    /// Reported checksums that carry an error
    pub fn errors(&self) -> impl Iterator<Item = &RawResult> {
        self.entrypoints
            .iter()
            .chain(&self.datapoints)
            .filter(|r| r.data.error.is_some())
    }
}
