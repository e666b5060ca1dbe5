//! Resource instances.

use crate::cache::CacheEntry;
use crate::error::{ResourceError, Result};
use crate::value::Value;
use parking_lot::Mutex;
use provider::Provider;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Name of the implicit identity field every resource exposes
pub const ID_FIELD: &str = "id";

/// Constructor arguments, by field name
pub type Args = BTreeMap<String, Value>;

/// Address of one field of one instance, used by the observer table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub uid: u64,
    pub field: String,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.uid, self.field)
    }
}

/// A field of a live instance
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub resource: Arc<Resource>,
    pub field: String,
}

impl FieldRef {
    pub fn new(resource: &Arc<Resource>, field: &str) -> Self {
        Self {
            resource: Arc::clone(resource),
            field: field.to_string(),
        }
    }

    pub fn key(&self) -> FieldKey {
        self.resource.field_key(&self.field)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.field)
    }
}

/// A typed, identity-keyed bag of cache entries.
///
/// Instances are only created by [`crate::Runtime`], which also guarantees
/// that two instances with the same type and identity are never both
/// handed out.
pub struct Resource {
    uid: u64,
    type_name: String,
    id: OnceLock<String>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    provider: Arc<dyn Provider>,
}

impl Resource {
    pub(crate) fn new(uid: u64, type_name: &str, seeds: Args, provider: Arc<dyn Provider>) -> Self {
        let cache = seeds
            .into_iter()
            .map(|(name, value)| (name, CacheEntry::ok(value)))
            .collect();
        Self {
            uid,
            type_name: type_name.to_string(),
            id: OnceLock::new(),
            cache: Mutex::new(cache),
            provider,
        }
    }

    /// Runtime-unique instance number
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identity key. Empty for singletons and before identity is assigned.
    pub fn id(&self) -> &str {
        self.id.get().map_or("", String::as_str)
    }

    pub fn has_identity(&self) -> bool {
        self.id.get().is_some()
    }

    /// Provider the instance resolves its fields against
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn field_key(&self, field: &str) -> FieldKey {
        FieldKey {
            uid: self.uid,
            field: field.to_string(),
        }
    }

    /// Snapshot of a cache entry
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.cache.lock().get(key).cloned()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.cache.lock().get(key).is_some_and(|e| e.valid)
    }

    /// A valid, error-free cached value
    pub fn value(&self, key: &str) -> Option<Value> {
        self.cache
            .lock()
            .get(key)
            .filter(|e| e.valid && e.error.is_none())
            .map(|e| e.value.clone())
    }

    /// Read a seeded string argument.
    pub fn string(&self, key: &str) -> Result<String> {
        match self.value(key) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(self.missing(key, "string")),
        }
    }

    /// Read a seeded integer argument.
    pub fn int(&self, key: &str) -> Result<i64> {
        self.value(key)
            .and_then(|v| v.as_int())
            .ok_or_else(|| self.missing(key, "int"))
    }

    fn missing(&self, key: &str, expected: &str) -> ResourceError {
        ResourceError::InvalidArgument(format!(
            "{self} has no {expected} argument '{key}'"
        ))
    }

    /// Names of all cached keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Store an entry, returning the previous one.
    pub(crate) fn store(&self, key: &str, entry: CacheEntry) -> Option<CacheEntry> {
        self.cache.lock().insert(key.to_string(), entry)
    }

    /// Clear an entry's valid flag. Returns whether it was valid.
    pub(crate) fn invalidate(&self, key: &str) -> bool {
        let mut cache = self.cache.lock();
        match cache.get_mut(key) {
            Some(entry) if entry.valid => {
                entry.invalidate();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_identity(&self, id: String) {
        if self.id.set(id).is_err() {
            log::warn!("identity of {} assigned twice", self.type_name);
        }
    }

    /// Drop every cached entry, breaking reference cycles between instances
    pub(crate) fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id();
        if id.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}({})", self.type_name, id.replace('\0', ", "))
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uid", &self.uid)
            .field("type", &self.type_name)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

/// Read-only view of constructor arguments handed to identity functions.
///
/// It deliberately offers no way to resolve fields, so computing an
/// identity can never re-enter field resolution.
pub struct Seeds<'a> {
    resource: &'a str,
    args: &'a Args,
}

impl<'a> Seeds<'a> {
    pub(crate) fn new(resource: &'a str, args: &'a Args) -> Self {
        Self { resource, args }
    }

    /// Resource type being constructed
    pub fn resource(&self) -> &str {
        self.resource
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.args.get(name).filter(|v| !v.is_nil())
    }

    pub fn require(&self, name: &str) -> Result<&'a Value> {
        self.get(name).ok_or_else(|| {
            ResourceError::InvalidArgument(format!(
                "missing required argument '{name}' for {}",
                self.resource
            ))
        })
    }

    pub fn str(&self, name: &str) -> Result<&'a str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| self.wrong(name, value))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        value.as_int().ok_or_else(|| self.wrong(name, value))
    }

    fn wrong(&self, name: &str, value: &Value) -> ResourceError {
        ResourceError::InvalidArgument(format!(
            "argument '{name}' for {} has unexpected type {}",
            self.resource,
            value.value_type()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::MockProvider;

    fn resource(seeds: Args) -> Resource {
        Resource::new(1, "file", seeds, Arc::new(MockProvider::new()))
    }

    #[test]
    fn test_seeds_are_valid_entries() {
        let mut args = Args::new();
        args.insert("path".to_string(), Value::from("/etc/passwd"));
        let res = resource(args);
        assert!(res.is_valid("path"));
        assert_eq!(res.string("path").unwrap(), "/etc/passwd");
        assert!(res.int("path").is_err());
        assert!(!res.is_valid("size"));
    }

    #[test]
    fn test_display_uses_identity() {
        let res = resource(Args::new());
        assert_eq!(res.to_string(), "file");
        res.set_identity("a\0b".to_string());
        assert_eq!(res.to_string(), "file(a, b)");
        assert_eq!(res.id(), "a\0b");
    }

    #[test]
    fn test_invalidate_reports_previous_state() {
        let res = resource(Args::new());
        res.store("size", CacheEntry::ok(Value::Int(1)));
        assert!(res.invalidate("size"));
        assert!(!res.invalidate("size"));
        assert!(res.value("size").is_none());
        assert!(!res.invalidate("missing"));
    }

    #[test]
    fn test_seeds_view() {
        let mut args = Args::new();
        args.insert("gid".to_string(), Value::Int(0));
        args.insert("name".to_string(), Value::Nil);
        let seeds = Seeds::new("group", &args);
        assert_eq!(seeds.int("gid").unwrap(), 0);
        assert!(seeds.get("name").is_none());
        assert!(matches!(
            seeds.require("name"),
            Err(ResourceError::InvalidArgument(_))
        ));
        assert!(seeds.str("gid").is_err());
    }
}
