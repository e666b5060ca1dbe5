//! Instance store and field resolution.

use crate::cache::CacheEntry;
use crate::error::{ResourceError, Result};
use crate::gather::{Gather, GatherQueue};
use crate::inflight::InFlight;
use crate::observer::{Callback, ObserverTable};
use crate::registry::{FieldDescriptor, Init, Registry, ResourceType};
use crate::resource::{Args, FieldKey, FieldRef, ID_FIELD, Resource, Seeds};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use provider::Provider;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the state of a runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub instances: usize,
    pub singletons: usize,
    pub watch_edges: usize,
    pub subscriptions: usize,
    pub pending_gathers: usize,
}

/// Owns the registry, the active provider and every resource instance
/// created against them.
///
/// All caching is scoped to one runtime. Dropping it clears every
/// instance cache, since cached values may reference other instances.
pub struct Runtime {
    registry: Arc<Registry>,
    provider: Arc<dyn Provider>,
    instances: RwLock<HashMap<(String, String), Arc<Resource>>>,
    singletons: Mutex<HashMap<String, Arc<Resource>>>,
    observers: ObserverTable,
    in_flight: InFlight,
    gathers: GatherQueue,
    next_uid: AtomicU64,
}

impl Runtime {
    pub fn new(registry: Arc<Registry>, provider: Arc<dyn Provider>) -> Self {
        Self {
            registry,
            provider,
            instances: RwLock::new(HashMap::new()),
            singletons: Mutex::new(HashMap::new()),
            observers: ObserverTable::new(),
            in_flight: InFlight::default(),
            gathers: GatherQueue::default(),
            next_uid: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Create (or find) an instance of `type_name`.
    ///
    /// The type's `init` hook runs first and may hand back an existing
    /// instance. Otherwise a new instance is seeded with `args` and
    /// deduplicated by identity: if an instance with the same identity
    /// exists, it is returned and `args` are ignored.
    pub fn create_resource(&self, type_name: &str, args: Args) -> Result<Arc<Resource>> {
        let ty = Arc::clone(self.registry.lookup(type_name)?);
        for capability in &ty.descriptor().requires {
            self.provider.require(*capability)?;
        }
        check_args(&ty, &args)?;

        let args = match ty.init() {
            Some(init) => match init(self, args)? {
                Init::Existing(existing) => {
                    if existing.type_name() != type_name {
                        return Err(ResourceError::InvalidArgument(format!(
                            "init of {type_name} returned a {} instance",
                            existing.type_name()
                        )));
                    }
                    log::trace!("runtime> {existing} provided by init");
                    return Ok(existing);
                }
                Init::Construct(args) => {
                    check_args(&ty, &args)?;
                    args
                }
                Init::Insufficient(args) => args,
            },
            None => args,
        };

        let identity = ty.compute_identity(&Seeds::new(type_name, &args))?;
        let key = (type_name.to_string(), identity);
        if let Some(existing) = self.instances.read().get(&key) {
            log::trace!("runtime> reuse {existing}");
            return Ok(Arc::clone(existing));
        }

        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
        let resource = Arc::new(Resource::new(
            uid,
            type_name,
            args,
            Arc::clone(&self.provider),
        ));
        resource.set_identity(key.1.clone());

        let instance = Arc::clone(
            self.instances
                .write()
                .entry(key)
                .or_insert_with(|| Arc::clone(&resource)),
        );

        if Arc::ptr_eq(&instance, &resource) {
            log::debug!("runtime> created {instance}");
        } else {
            log::debug!("runtime> discarding duplicate of {instance}");
        }
        Ok(instance)
    }

    /// The per-runtime instance of a type without identity contributors.
    pub fn singleton(&self, type_name: &str) -> Result<Arc<Resource>> {
        if let Some(existing) = self.singletons.lock().get(type_name) {
            return Ok(Arc::clone(existing));
        }
        let resource = self.create_resource(type_name, Args::new())?;
        Ok(Arc::clone(
            self.singletons
                .lock()
                .entry(type_name.to_string())
                .or_insert(resource),
        ))
    }

    /// Find a materialized instance by identity
    pub fn lookup(&self, type_name: &str, id: &str) -> Option<Arc<Resource>> {
        self.instances
            .read()
            .get(&(type_name.to_string(), id.to_string()))
            .cloned()
    }

    /// All materialized instances of a type, in creation order
    pub fn instances_of(&self, type_name: &str) -> Vec<Arc<Resource>> {
        let mut found: Vec<Arc<Resource>> = self
            .instances
            .read()
            .iter()
            .filter(|((name, _), _)| name == type_name)
            .map(|(_, res)| Arc::clone(res))
            .collect();
        found.sort_by_key(|r| r.uid());
        found
    }

    /// Resolve a field, running its resolver at most once until the field
    /// is invalidated. Concurrent callers for the same field wait for the
    /// first one and share its result.
    pub fn resolve(&self, resource: &Arc<Resource>, field: &str) -> Result<Value> {
        if field == ID_FIELD {
            return Ok(Value::String(resource.id().to_string()));
        }
        if let Some(entry) = resource.entry(field)
            && entry.valid
        {
            return entry.result();
        }
        let _claim = self.in_flight.claim(resource.field_key(field));
        if let Some(entry) = resource.entry(field)
            && entry.valid
        {
            return entry.result();
        }

        let ty = Arc::clone(self.registry.lookup(resource.type_name())?);
        let descriptor = ty
            .descriptor()
            .field(field)
            .ok_or_else(|| ResourceError::UnknownField {
                resource: resource.type_name().to_string(),
                field: field.to_string(),
            })?;

        // a failed source poisons the target without running its resolver
        for source in self.observers.sources_of(&resource.field_key(field)) {
            if let Err(err) = self.resolve(&source.resource, &source.field) {
                if !err.is_not_ready() {
                    log::debug!("runtime> {resource}.{field} poisoned by {source}: {err}");
                    self.store(resource, field, Err(err.clone()));
                }
                return Err(err);
            }
        }

        let Some(resolver) = ty.resolver(field) else {
            let err = ResourceError::NotFound(format!("{resource}.{field} was not provided"));
            self.store(resource, field, Err(err.clone()));
            return Err(err);
        };

        log::trace!("runtime> resolve {resource}.{field}");
        let result = resolver(self, resource).and_then(|value| check_type(resource, descriptor, value));
        match &result {
            // only a deferring resolver stores the pending marker
            Err(err) if err.is_not_ready() => {}
            _ => self.store(resource, field, result.clone()),
        }
        result
    }

    /// Cache a computation under a private key with field semantics.
    pub fn memoize<F>(&self, resource: &Arc<Resource>, key: &str, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(entry) = resource.entry(key)
            && entry.valid
        {
            return entry.result();
        }
        let _claim = self.in_flight.claim(resource.field_key(key));
        if let Some(entry) = resource.entry(key)
            && entry.valid
        {
            return entry.result();
        }
        let result = compute();
        if !matches!(&result, Err(err) if err.is_not_ready()) {
            self.store(resource, key, result.clone());
        }
        result
    }

    /// Write an entry. Every field watching it is invalidated unless the
    /// entry replaces a valid one holding the same result.
    pub fn store(&self, resource: &Arc<Resource>, key: &str, result: Result<Value>) {
        let entry = CacheEntry::from_result(result);
        let previous = resource.store(key, entry.clone());
        let changed = previous.is_none_or(|p| !p.valid || p.is_pending() || !p.same_result(&entry));
        if changed {
            for target in self.observers.targets_of(&resource.field_key(key)) {
                self.invalidate(&target.resource, &target.field);
            }
        }
    }

    /// Store a gathered result and wake the field's subscribers
    pub fn fill(&self, resource: &Arc<Resource>, field: &str, result: Result<Value>) {
        self.store(resource, field, result);
        self.trigger(resource, field);
    }

    /// Notify subscribers of a field without touching its entry
    pub fn trigger(&self, resource: &Arc<Resource>, field: &str) {
        let key = resource.field_key(field);
        for callback in self.observers.callbacks_for(&key) {
            callback(&key);
        }
    }

    /// Invalidate a field and, recursively, everything watching it, then
    /// notify subscribers of every invalidated field.
    pub fn invalidate(&self, resource: &Arc<Resource>, field: &str) {
        let mut visited = HashSet::new();
        let mut invalidated = Vec::new();
        let mut stack = vec![FieldRef::new(resource, field)];

        while let Some(current) = stack.pop() {
            let key = current.key();
            if !visited.insert(key.clone()) {
                continue;
            }
            current.resource.invalidate(&current.field);
            log::trace!("runtime> invalidate {current}");
            stack.extend(self.observers.targets_of(&key));
            invalidated.push(key);
        }

        for key in &invalidated {
            for callback in self.observers.callbacks_for(key) {
                callback(key);
            }
        }
    }

    /// Make `target_field` of `target` depend on `source_field` of `source`.
    ///
    /// Call this before reading the source from the target's resolver.
    pub fn watch(
        &self,
        source: &Arc<Resource>,
        source_field: &str,
        target: &Arc<Resource>,
        target_field: &str,
    ) -> Result<()> {
        self.observers
            .watch(
                &FieldRef::new(source, source_field),
                &FieldRef::new(target, target_field),
            )
            .map(|_| ())
    }

    /// Subscribe to changes of a field
    pub fn subscribe(&self, key: FieldKey, watcher: &str, tag: &str, callback: Callback) -> bool {
        self.observers.subscribe(key, watcher, tag, callback)
    }

    /// Drop every subscription of `watcher`
    pub fn unsubscribe(&self, watcher: &str) -> usize {
        let removed = self.observers.unsubscribe(watcher);
        log::trace!("runtime> removed {removed} subscriptions of {watcher}");
        removed
    }

    /// Mark `field` as pending and queue a batch gather for it.
    ///
    /// Every field deferred under the same `key` before the queue runs is
    /// handed to the same gather. Returns the NotReady error the resolver
    /// should return.
    pub fn defer<F>(&self, key: &str, resource: &Arc<Resource>, field: &str, gather: F) -> ResourceError
    where
        F: FnOnce(&Runtime, &[FieldRef]) -> Result<()> + Send + 'static,
    {
        let err = ResourceError::NotReady {
            uid: resource.uid(),
            resource: resource.to_string(),
            field: field.to_string(),
        };
        resource.store(field, CacheEntry::err(err.clone()));
        if self
            .gathers
            .enqueue(key, FieldRef::new(resource, field), Box::new(gather))
        {
            log::debug!("runtime> queued gather '{key}' for {resource}.{field}");
        }
        err
    }

    pub fn has_pending_gathers(&self) -> bool {
        self.gathers.len() > 0
    }

    /// Run every queued gather. Independent gathers run in parallel.
    /// Returns how many ran.
    pub fn run_gathers(&self) -> usize {
        let batch = self.gathers.take();
        let count = batch.len();
        if count > 0 {
            batch.into_par_iter().for_each(|gather| self.finish_gather(gather));
        }
        count
    }

    fn finish_gather(&self, gather: Gather) {
        let Gather { key, pending, run } = gather;
        log::debug!("runtime> gather '{key}' for {} fields", pending.len());
        let result = run(self, &pending);
        if let Err(err) = &result {
            log::debug!("runtime> gather '{key}' failed: {err}");
        }

        for field in &pending {
            let still_pending = field
                .resource
                .entry(&field.field)
                .is_none_or(|e| e.is_pending());
            if still_pending {
                let err = match &result {
                    Err(err) => err.clone(),
                    Ok(()) => ResourceError::NotFound(format!("gather '{key}' did not produce {field}")),
                };
                self.fill(&field.resource, &field.field, Err(err));
            }
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            instances: self.instances.read().len(),
            singletons: self.singletons.lock().len(),
            watch_edges: self.observers.edge_count(),
            subscriptions: self.observers.subscription_count(),
            pending_gathers: self.gathers.len(),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        drop(self.gathers.take());
        self.observers.clear();
        self.singletons.lock().clear();
        for resource in self.instances.get_mut().values() {
            resource.clear();
        }
        self.instances.get_mut().clear();
    }
}

fn check_args(ty: &ResourceType, args: &Args) -> Result<()> {
    for (name, value) in args {
        let Some(descriptor) = ty.descriptor().field(name) else {
            return Err(ResourceError::InvalidArgument(format!(
                "resource '{}' has no argument '{name}'",
                ty.name()
            )));
        };
        if !descriptor.value_type.accepts(value) {
            return Err(ResourceError::WrongType {
                resource: ty.name().to_string(),
                field: name.clone(),
                expected: descriptor.value_type.clone(),
                actual: value.value_type(),
            });
        }
    }
    Ok(())
}

fn check_type(resource: &Resource, descriptor: &FieldDescriptor, value: Value) -> Result<Value> {
    if descriptor.value_type.accepts(&value) {
        Ok(value)
    } else {
        Err(ResourceError::WrongType {
            resource: resource.type_name().to_string(),
            field: descriptor.name.clone(),
            expected: descriptor.value_type.clone(),
            actual: value.value_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResourceType;
    use crate::value::ValueType;
    use provider::{Capability, MockFile, MockProvider};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn hits(c: &AtomicUsize) -> usize {
        c.load(Ordering::SeqCst)
    }

    fn args(pairs: &[(&str, Value)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    struct Fixture {
        runtime: Runtime,
        mock: Arc<MockProvider>,
        content_calls: Arc<AtomicUsize>,
        lines_calls: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let mock = Arc::new(
            MockProvider::new()
                .with_file("/etc/hosts", "127.0.0.1 localhost\n", 0o644)
                .with_command("ps", "1 S\n2 R\n"),
        );
        let content_calls = counter();
        let lines_calls = counter();

        let mut registry = Registry::new();
        let calls = Arc::clone(&content_calls);
        registry.register(
            ResourceType::builder("file")
                .key("path", ValueType::String)
                .field("content", ValueType::String, move |_, res| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let path = res.string("path")?;
                    Ok(Value::from(res.provider().read_to_string(&path)?))
                })
                .field("size", ValueType::Int, |rt, res| {
                    let stat = rt.memoize(res, "_stat", || {
                        let info = res.provider().stat(&res.string("path")?)?;
                        Ok(Value::from(info.size))
                    })?;
                    Ok(stat)
                })
                .field("broken", ValueType::Int, |_, _| Ok(Value::from("oops")))
                .arg("note", ValueType::String)
                .requires(Capability::FileSystem)
                .init(|_, mut args| {
                    if let Some(Value::String(path)) = args.get("path")
                        && path.len() > 1
                        && path.ends_with('/')
                    {
                        let trimmed = path.trim_end_matches('/').to_string();
                        args.insert("path".to_string(), Value::from(trimmed));
                        return Ok(Init::Construct(args));
                    }
                    Ok(Init::Insufficient(args))
                })
                .build(),
        );

        let calls = Arc::clone(&lines_calls);
        registry.register(
            ResourceType::builder("lines")
                .key("path", ValueType::String)
                .field("count", ValueType::Int, move |rt, res| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let file = rt.create_resource("file", args(&[("path", Value::from(res.string("path")?))]))?;
                    rt.watch(&file, "content", res, "count")?;
                    let content = rt.resolve(&file, "content")?;
                    Ok(Value::from(content.as_str().unwrap_or_default().lines().count() as u64))
                })
                .build(),
        );

        registry.register(
            ResourceType::builder("proc")
                .key("pid", ValueType::Int)
                .field("state", ValueType::String, |rt, res| {
                    Err(rt.defer("ps", res, "state", |rt, pending| {
                        let out = rt.provider().run_command("ps")?;
                        for line in out.stdout_str().lines() {
                            let mut parts = line.split_whitespace();
                            let (Some(pid), Some(state)) = (parts.next(), parts.next()) else {
                                continue;
                            };
                            if let Some(p) = pending.iter().find(|p| p.resource.id() == pid) {
                                rt.fill(&p.resource, "state", Ok(Value::from(state)));
                            }
                        }
                        Ok(())
                    }))
                })
                .field("label", ValueType::String, |rt, res| {
                    let state = rt.resolve(res, "state")?;
                    Ok(Value::from(format!("{}:{state}", res.id())))
                })
                .build(),
        );

        registry.register(
            ResourceType::builder("host")
                .field("name", ValueType::String, |_, _| Ok(Value::from("box")))
                .build(),
        );

        let runtime = Runtime::new(Arc::new(registry), mock.clone());
        Fixture {
            runtime,
            mock,
            content_calls,
            lines_calls,
        }
    }

    #[test]
    fn test_dedup_by_identity() {
        let f = fixture();
        let a = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/"))]))
            .unwrap();
        let b = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc")), ("note", Value::from("x"))]))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), "/etc");
        // the existing instance wins
        assert!(a.value("note").is_none());
        assert_eq!(f.runtime.stats().instances, 1);
        assert!(Arc::ptr_eq(&f.runtime.lookup("file", "/etc").unwrap(), &a));
    }

    #[test]
    fn test_construction_errors() {
        let f = fixture();
        assert_eq!(
            f.runtime.create_resource("nope", Args::new()).unwrap_err(),
            ResourceError::UnknownResource("nope".to_string())
        );
        assert!(matches!(
            f.runtime.create_resource("file", args(&[("path", Value::Int(1))])),
            Err(ResourceError::WrongType { .. })
        ));
        assert!(matches!(
            f.runtime.create_resource("file", args(&[("mode", Value::Int(1))])),
            Err(ResourceError::InvalidArgument(_))
        ));
        // init declines and the key is still missing
        assert!(matches!(
            f.runtime.create_resource("file", Args::new()),
            Err(ResourceError::InvalidArgument(_))
        ));
        assert_eq!(f.runtime.stats().instances, 0);
    }

    #[test]
    fn test_unsupported_capability() {
        let mut registry = Registry::new();
        registry.register(
            ResourceType::builder("file")
                .key("path", ValueType::String)
                .requires(Capability::FileSystem)
                .build(),
        );
        let mock = Arc::new(MockProvider::new().with_capabilities(&[Capability::RunCommand]));
        let runtime = Runtime::new(Arc::new(registry), mock);
        let err = runtime
            .create_resource("file", args(&[("path", Value::from("/x"))]))
            .unwrap_err();
        assert!(matches!(err, ResourceError::Unsupported(_)));
    }

    #[test]
    fn test_memoization_and_invalidation() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        for _ in 0..3 {
            assert_eq!(
                f.runtime.resolve(&file, "content").unwrap(),
                Value::from("127.0.0.1 localhost\n")
            );
        }
        assert_eq!(hits(&f.content_calls), 1);
        assert_eq!(f.mock.read_calls(), 1);

        f.runtime.invalidate(&file, "content");
        f.runtime.resolve(&file, "content").unwrap();
        assert_eq!(hits(&f.content_calls), 2);
    }

    #[test]
    fn test_synthetic_key_shared() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        assert_eq!(f.runtime.resolve(&file, "size").unwrap(), Value::Int(20));
        f.runtime.invalidate(&file, "size");
        assert_eq!(f.runtime.resolve(&file, "size").unwrap(), Value::Int(20));
        assert_eq!(f.mock.stat_calls(), 1);
        assert!(file.keys().contains(&"_stat".to_string()));
    }

    #[test]
    fn test_errors_are_cached() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/missing"))]))
            .unwrap();
        let first = f.runtime.resolve(&file, "content").unwrap_err();
        assert!(first.is_not_found());
        let second = f.runtime.resolve(&file, "content").unwrap_err();
        assert_eq!(first, second);
        assert_eq!(hits(&f.content_calls), 1);
        assert_eq!(f.mock.read_calls(), 1);
    }

    #[test]
    fn test_resolver_output_is_type_checked() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        let err = f.runtime.resolve(&file, "broken").unwrap_err();
        assert!(matches!(err, ResourceError::WrongType { ref field, .. } if field == "broken"));
        assert!(file.entry("broken").unwrap().valid);
    }

    #[test]
    fn test_unknown_and_unseeded_fields() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        assert!(matches!(
            f.runtime.resolve(&file, "nope"),
            Err(ResourceError::UnknownField { .. })
        ));
        assert!(f.runtime.resolve(&file, "note").unwrap_err().is_not_found());
        assert_eq!(
            f.runtime.resolve(&file, "id").unwrap(),
            Value::from("/etc/hosts")
        );
    }

    #[test]
    fn test_watch_propagation() {
        let f = fixture();
        let lines = f
            .runtime
            .create_resource("lines", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        assert_eq!(f.runtime.resolve(&lines, "count").unwrap(), Value::Int(1));
        assert_eq!(f.runtime.resolve(&lines, "count").unwrap(), Value::Int(1));
        assert_eq!(hits(&f.lines_calls), 1);

        f.mock.set_file(
            "/etc/hosts",
            MockFile {
                content: "a\nb\nc\n".to_string(),
                ..Default::default()
            },
        );
        let file = f.runtime.lookup("file", "/etc/hosts").unwrap();
        f.runtime.invalidate(&file, "content");
        assert!(!lines.is_valid("count"));

        assert_eq!(f.runtime.resolve(&lines, "count").unwrap(), Value::Int(3));
        assert_eq!(hits(&f.lines_calls), 2);
        assert_eq!(f.runtime.stats().watch_edges, 1);
    }

    #[test]
    fn test_refilled_source_invalidates_watchers() {
        let f = fixture();
        let lines = f
            .runtime
            .create_resource("lines", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        assert_eq!(f.runtime.resolve(&lines, "count").unwrap(), Value::Int(1));
        let file = f.runtime.lookup("file", "/etc/hosts").unwrap();

        // same result: watchers keep their value
        f.runtime
            .fill(&file, "content", Ok(Value::from("127.0.0.1 localhost\n")));
        assert!(lines.is_valid("count"));

        f.runtime.fill(&file, "content", Ok(Value::from("a\nb\n")));
        assert!(!lines.is_valid("count"));
        assert_eq!(f.runtime.resolve(&lines, "count").unwrap(), Value::Int(2));
        assert_eq!(hits(&f.lines_calls), 2);
        assert_eq!(hits(&f.content_calls), 1);
    }

    #[test]
    fn test_invalidation_notifies_watcher_subscribers() {
        let f = fixture();
        let lines = f
            .runtime
            .create_resource("lines", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        f.runtime.resolve(&lines, "count").unwrap();

        let fired = counter();
        let n = Arc::clone(&fired);
        f.runtime.subscribe(
            lines.field_key("count"),
            "test",
            "count",
            Arc::new(move |key: &FieldKey| {
                assert_eq!(key.field, "count");
                n.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let file = f.runtime.lookup("file", "/etc/hosts").unwrap();
        f.runtime.invalidate(&file, "content");
        assert_eq!(hits(&fired), 1);
        assert!(!lines.is_valid("count"));
    }

    #[test]
    fn test_parallel_gathers_resolve_shared_field_once() {
        let slow_calls = counter();
        let calls = Arc::clone(&slow_calls);
        let mut registry = Registry::new();
        registry.register(
            ResourceType::builder("shared")
                .field("slow", ValueType::Int, move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    Ok(Value::Int(7))
                })
                .build(),
        );
        registry.register(
            ResourceType::builder("task")
                .key("n", ValueType::Int)
                .field("value", ValueType::Int, |rt, res| {
                    let key = format!("task-{}", res.id());
                    Err(rt.defer(&key, res, "value", |rt, pending| {
                        let shared = rt.singleton("shared")?;
                        let slow = rt.resolve(&shared, "slow");
                        for p in pending {
                            rt.fill(&p.resource, &p.field, slow.clone());
                        }
                        Ok(())
                    }))
                })
                .build(),
        );
        let runtime = Runtime::new(Arc::new(registry), Arc::new(MockProvider::new()));
        runtime.singleton("shared").unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|n| {
                runtime
                    .create_resource("task", args(&[("n", Value::Int(n))]))
                    .unwrap()
            })
            .collect();
        for task in &tasks {
            assert!(runtime.resolve(task, "value").unwrap_err().is_not_ready());
        }
        assert_eq!(runtime.stats().pending_gathers, 4);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        assert_eq!(pool.install(|| runtime.run_gathers()), 4);

        assert_eq!(hits(&slow_calls), 1);
        for task in &tasks {
            assert_eq!(runtime.resolve(task, "value").unwrap(), Value::Int(7));
        }
    }

    #[test]
    fn test_watch_source_error_poisons_target() {
        let f = fixture();
        let lines = f
            .runtime
            .create_resource("lines", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        f.runtime.resolve(&lines, "count").unwrap();

        f.mock.remove_file("/etc/hosts");
        let file = f.runtime.lookup("file", "/etc/hosts").unwrap();
        f.runtime.invalidate(&file, "content");

        let err = f.runtime.resolve(&lines, "count").unwrap_err();
        assert!(err.is_not_found());
        // the target resolver did not run again
        assert_eq!(hits(&f.lines_calls), 1);
        assert!(lines.entry("count").unwrap().error.is_some());
    }

    #[test]
    fn test_watch_cycle_rejected() {
        let f = fixture();
        let a = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/a"))]))
            .unwrap();
        let b = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/b"))]))
            .unwrap();
        f.runtime.watch(&a, "content", &b, "content").unwrap();
        assert!(f.runtime.watch(&b, "content", &a, "content").is_err());
    }

    #[test]
    fn test_deferred_gather_fills_all_pending() {
        let f = fixture();
        let p1 = f
            .runtime
            .create_resource("proc", args(&[("pid", Value::Int(1))]))
            .unwrap();
        let p2 = f
            .runtime
            .create_resource("proc", args(&[("pid", Value::Int(2))]))
            .unwrap();

        let woken = counter();
        let w = Arc::clone(&woken);
        let callback: Callback = Arc::new(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });
        f.runtime
            .subscribe(p1.field_key("state"), "test", "c1", Arc::clone(&callback));

        assert!(f.runtime.resolve(&p1, "state").unwrap_err().is_not_ready());
        assert!(f.runtime.resolve(&p2, "state").unwrap_err().is_not_ready());
        // reading a pending sibling is not cached
        assert!(f.runtime.resolve(&p1, "label").unwrap_err().is_not_ready());
        assert!(p1.entry("label").is_none());
        assert!(f.runtime.has_pending_gathers());
        assert_eq!(f.runtime.stats().pending_gathers, 1);

        assert_eq!(f.runtime.run_gathers(), 1);
        assert_eq!(f.mock.command_calls("ps"), 1);
        assert_eq!(hits(&woken), 1);
        assert_eq!(f.runtime.resolve(&p1, "state").unwrap(), Value::from("S"));
        assert_eq!(f.runtime.resolve(&p2, "state").unwrap(), Value::from("R"));
        assert_eq!(f.runtime.resolve(&p1, "label").unwrap(), Value::from("1:S"));
        assert!(!f.runtime.has_pending_gathers());
        assert_eq!(f.runtime.run_gathers(), 0);
    }

    #[test]
    fn test_gather_leaving_field_unfilled() {
        let f = fixture();
        let ghost = f
            .runtime
            .create_resource("proc", args(&[("pid", Value::Int(99))]))
            .unwrap();
        assert!(f.runtime.resolve(&ghost, "state").unwrap_err().is_not_ready());
        f.runtime.run_gathers();
        let err = f.runtime.resolve(&ghost, "state").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_failed_gather_fills_error() {
        let mut registry = Registry::new();
        registry.register(
            ResourceType::builder("proc")
                .key("pid", ValueType::Int)
                .field("state", ValueType::String, |rt, res| {
                    Err(rt.defer("ps", res, "state", |_, _| {
                        Err(ResourceError::Upstream("ps exploded".to_string()))
                    }))
                })
                .build(),
        );
        let runtime = Runtime::new(Arc::new(registry), Arc::new(MockProvider::new()));
        let p = runtime
            .create_resource("proc", args(&[("pid", Value::Int(1))]))
            .unwrap();
        runtime.resolve(&p, "state").unwrap_err();
        runtime.run_gathers();
        assert_eq!(
            runtime.resolve(&p, "state").unwrap_err(),
            ResourceError::Upstream("ps exploded".to_string())
        );
    }

    #[test]
    fn test_singleton() {
        let f = fixture();
        let a = f.runtime.singleton("host").unwrap();
        let b = f.runtime.singleton("host").unwrap();
        let c = f.runtime.create_resource("host", Args::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(a.id(), "");
        assert_eq!(f.runtime.stats().singletons, 1);
    }

    #[test]
    fn test_unsubscribe() {
        let f = fixture();
        let host = f.runtime.singleton("host").unwrap();
        let callback: Callback = Arc::new(|_| {});
        assert!(f
            .runtime
            .subscribe(host.field_key("name"), "w", "t", Arc::clone(&callback)));
        assert!(!f.runtime.subscribe(host.field_key("name"), "w", "t", callback));
        assert_eq!(f.runtime.unsubscribe("w"), 1);
        assert_eq!(f.runtime.stats().subscriptions, 0);
    }

    #[test]
    fn test_drop_clears_caches() {
        let f = fixture();
        let file = f
            .runtime
            .create_resource("file", args(&[("path", Value::from("/etc/hosts"))]))
            .unwrap();
        f.runtime.resolve(&file, "content").unwrap();
        drop(f.runtime);
        assert!(file.entry("content").is_none());
        assert!(file.entry("path").is_none());
    }
}
