//! Memoization slots.

use crate::error::{ResourceError, Result};
use crate::value::Value;
use chrono::{DateTime, Utc};

/// One memoized field (or synthetic key) of a resource instance.
///
/// Errors are stored next to values so a failing resolver is only paid
/// for once. An entry with `valid == false` is unresolved.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub error: Option<ResourceError>,
    pub valid: bool,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// A resolved value
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            error: None,
            valid: true,
            timestamp: Utc::now(),
        }
    }

    /// A resolved error
    pub fn err(error: ResourceError) -> Self {
        Self {
            value: Value::Nil,
            error: Some(error),
            valid: true,
            timestamp: Utc::now(),
        }
    }

    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::err(error),
        }
    }

    /// The value or the cached error
    pub fn result(&self) -> Result<Value> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.value.clone()),
        }
    }

    /// Whether this entry holds the NotReady marker of an in-flight gather
    pub fn is_pending(&self) -> bool {
        self.error.as_ref().is_some_and(ResourceError::is_not_ready)
    }

    /// Whether both entries hold the same value or the same error
    pub fn same_result(&self, other: &Self) -> bool {
        match (&self.error, &other.error) {
            (None, None) => self.value == other.value,
            (a, b) => a == b,
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }
}
