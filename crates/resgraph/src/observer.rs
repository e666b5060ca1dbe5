//! Dependency and observer table.
//!
//! Two kinds of edges live here:
//!
//! - **watch edges** from a source field to a target field on another
//!   instance; invalidating the source invalidates the target.
//! - **subscriptions** of an outside party (usually an evaluator) to a
//!   field; they are notified whenever the field is invalidated or filled.

use crate::error::{ResourceError, Result};
use crate::resource::{FieldKey, FieldRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Notification callback. Receives the field that changed.
pub type Callback = Arc<dyn Fn(&FieldKey) + Send + Sync>;

struct Subscriber {
    watcher: String,
    tag: String,
    callback: Callback,
}

#[derive(Default)]
struct Tables {
    targets: HashMap<FieldKey, Vec<FieldRef>>,
    sources: HashMap<FieldKey, Vec<FieldRef>>,
    subscribers: HashMap<FieldKey, Vec<Subscriber>>,
}

/// Watch edges and field subscriptions of one runtime
#[derive(Default)]
pub struct ObserverTable {
    inner: Mutex<Tables>,
}

impl ObserverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source -> target`. Returns `false` if the edge already
    /// existed. Edges that would close a cycle are rejected.
    pub fn watch(&self, source: &FieldRef, target: &FieldRef) -> Result<bool> {
        let source_key = source.key();
        let target_key = target.key();
        let mut tables = self.inner.lock();

        if tables
            .targets
            .get(&source_key)
            .is_some_and(|ts| ts.iter().any(|t| t.key() == target_key))
        {
            return Ok(false);
        }
        if reaches(&tables.targets, &target_key, &source_key) {
            return Err(ResourceError::InvalidArgument(format!(
                "watching {source} from {target} would create a cycle"
            )));
        }

        log::trace!("observer> watch {source} -> {target}");
        tables
            .targets
            .entry(source_key)
            .or_default()
            .push(target.clone());
        tables
            .sources
            .entry(target_key)
            .or_default()
            .push(source.clone());
        Ok(true)
    }

    /// Fields that watch `key`
    pub fn targets_of(&self, key: &FieldKey) -> Vec<FieldRef> {
        self.inner
            .lock()
            .targets
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Fields `key` watches
    pub fn sources_of(&self, key: &FieldKey) -> Vec<FieldRef> {
        self.inner
            .lock()
            .sources
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Subscribe `watcher` to changes of `key`. Subscribing twice with the
    /// same watcher and tag is a no-op; returns whether it was added.
    pub fn subscribe(&self, key: FieldKey, watcher: &str, tag: &str, callback: Callback) -> bool {
        let mut tables = self.inner.lock();
        let subscribers = tables.subscribers.entry(key).or_default();
        if subscribers
            .iter()
            .any(|s| s.watcher == watcher && s.tag == tag)
        {
            return false;
        }
        subscribers.push(Subscriber {
            watcher: watcher.to_string(),
            tag: tag.to_string(),
            callback,
        });
        true
    }

    /// Remove every subscription of `watcher`. Returns how many were removed.
    pub fn unsubscribe(&self, watcher: &str) -> usize {
        let mut tables = self.inner.lock();
        let mut removed = 0;
        tables.subscribers.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.watcher != watcher);
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });
        removed
    }

    /// Callbacks registered on `key`, cloned out so they can run unlocked
    pub fn callbacks_for(&self, key: &FieldKey) -> Vec<Callback> {
        self.inner
            .lock()
            .subscribers
            .get(key)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().targets.values().map(Vec::len).sum()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscribers.values().map(Vec::len).sum()
    }

    pub(crate) fn clear(&self) {
        let mut tables = self.inner.lock();
        tables.targets.clear();
        tables.sources.clear();
        tables.subscribers.clear();
    }
}

/// Whether `to` is reachable from `from` along watch edges
fn reaches(targets: &HashMap<FieldKey, Vec<FieldRef>>, from: &FieldKey, to: &FieldKey) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from.clone()];
    while let Some(key) = stack.pop() {
        if &key == to {
            return true;
        }
        if !seen.insert(key.clone()) {
            continue;
        }
        if let Some(next) = targets.get(&key) {
            stack.extend(next.iter().map(FieldRef::key));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Args, Resource};
    use provider::MockProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn field(uid: u64, name: &str) -> FieldRef {
        let res = Arc::new(Resource::new(
            uid,
            "thing",
            Args::new(),
            Arc::new(MockProvider::new()),
        ));
        FieldRef::new(&res, name)
    }

    #[test]
    fn test_watch_records_both_directions() {
        let table = ObserverTable::new();
        let content = field(1, "content");
        let params = field(2, "params");
        assert!(table.watch(&content, &params).unwrap());
        assert!(!table.watch(&content, &params).unwrap());

        assert_eq!(table.targets_of(&content.key())[0].key(), params.key());
        assert_eq!(table.sources_of(&params.key())[0].key(), content.key());
        assert_eq!(table.edge_count(), 1);
    }

    #[test]
    fn test_watch_rejects_cycles() {
        let table = ObserverTable::new();
        let a = field(1, "a");
        let b = field(2, "b");
        let c = field(3, "c");
        table.watch(&a, &b).unwrap();
        table.watch(&b, &c).unwrap();
        assert!(matches!(
            table.watch(&c, &a),
            Err(ResourceError::InvalidArgument(_))
        ));
        assert!(table.watch(&a, &a).is_err());
    }

    #[test]
    fn test_subscriptions_are_idempotent_per_watcher() {
        let table = ObserverTable::new();
        let key = field(1, "state").key();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callback: Callback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(table.subscribe(key.clone(), "eval-1", "abc", Arc::clone(&callback)));
        assert!(!table.subscribe(key.clone(), "eval-1", "abc", Arc::clone(&callback)));
        assert!(table.subscribe(key.clone(), "eval-2", "abc", callback));
        assert_eq!(table.subscription_count(), 2);

        for cb in table.callbacks_for(&key) {
            cb(&key);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert_eq!(table.unsubscribe("eval-1"), 1);
        assert_eq!(table.subscription_count(), 1);
        assert_eq!(table.unsubscribe("eval-1"), 0);
    }
}
