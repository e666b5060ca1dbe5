//! Bundled resource types
//!
//! Every type here resolves its fields through the runtime's provider, so
//! the same pack answers queries against the local machine or a mock
//! fixture. Each module registers its types into a shared [`Registry`].

mod command;
mod file;
mod groups;
mod os;
mod parse;
mod processes;
mod users;

use provider::FileInfo;
use resgraph::{Args, Registry, Resource, ResourceError, Result, Runtime, Value};
use std::sync::Arc;

/// Registry with every bundled resource type
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    os::register(&mut registry);
    command::register(&mut registry);
    file::register(&mut registry);
    parse::register(&mut registry);
    users::register(&mut registry);
    groups::register(&mut registry);
    processes::register(&mut registry);
    registry
}

/// Build constructor arguments from pairs
pub(crate) fn args<const N: usize>(pairs: [(&str, Value); N]) -> Args {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Resolve a field that holds another resource
pub(crate) fn resource_field(rt: &Runtime, res: &Arc<Resource>, field: &str) -> Result<Arc<Resource>> {
    match rt.resolve(res, field)? {
        Value::Resource(inner) => Ok(inner),
        other => Err(ResourceError::InvalidArgument(format!(
            "{res}.{field} is {}, not a resource",
            other.value_type()
        ))),
    }
}

/// Resolve a field that holds a list, failing on anything else
pub(crate) fn list_field(rt: &Runtime, res: &Arc<Resource>, field: &str) -> Result<Vec<Value>> {
    rt.resolve(res, field)?.into_array().ok_or_else(|| {
        ResourceError::InvalidArgument(format!("{res}.{field} is not a list"))
    })
}

/// Stat a path once per instance; the result (or NotFound) is cached under
/// `_stat` until invalidated.
pub(crate) fn stat(rt: &Runtime, res: &Arc<Resource>) -> Result<FileInfo> {
    let value = rt.memoize(res, "_stat", || {
        let path = res.string("path")?;
        let info = res.provider().stat(&path)?;
        serde_json::to_value(info)
            .map(Value::Dict)
            .map_err(|e| ResourceError::Upstream(format!("stat {path}: {e}")))
    })?;
    match value {
        Value::Dict(json) => serde_json::from_value(json)
            .map_err(|e| ResourceError::Upstream(format!("cached stat of {res}: {e}"))),
        other => Err(ResourceError::Upstream(format!(
            "cached stat of {res} is {}",
            other.value_type()
        ))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use provider::MockProvider;

    pub const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
alice:x:1000:1000:Alice P. Liddell,Room 101,555-0100,,:/home/alice:/bin/zsh
bob:x:1001:1001::/home/bob:/bin/bash
";

    pub const GROUP: &str = "\
root:x:0:
daemon:x:1:
sudo:x:27:alice,ghost
alice:x:1000:
bob:x:1001:
";

    pub const PS_LIST: &str = "ps -eo pid=";
    pub const PS_DETAIL: &str = "ps -eo pid=,ppid=,stat=,args=";

    pub fn mock() -> MockProvider {
        MockProvider::new()
            .with_file("/etc/passwd", PASSWD, 0o644)
            .with_file("/etc/group", GROUP, 0o644)
            .with_file("/etc/hostname", "probe\n", 0o644)
            .with_file("/etc/app.json", r#"{"port": 8080, "debug": false}"#, 0o600)
            .with_command(PS_LIST, "    1\n   42\n  314\n")
            .with_command(
                PS_DETAIL,
                "    1     0 Ss   /sbin/init splash\n   42     1 S    /usr/sbin/sshd -D\n  314    42 R+   ps -eo pid=\n",
            )
    }

    pub fn runtime(mock: &Arc<MockProvider>) -> Runtime {
        Runtime::new(Arc::new(registry()), Arc::clone(mock) as Arc<dyn provider::Provider>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_every_bundled_type() {
        let registry = registry();
        for name in [
            "os",
            "command",
            "file",
            "file.permissions",
            "parse.json",
            "users",
            "user",
            "groups",
            "group",
            "processes",
            "process",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert_eq!(registry.len(), 11);
    }

    #[test]
    fn test_singletons_are_the_types_without_keys() {
        let registry = registry();
        let singletons: Vec<&str> = registry
            .descriptors()
            .filter(|d| d.is_singleton())
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(singletons, vec!["groups", "os", "processes", "users"]);
    }

    #[test]
    fn test_args_helper() {
        let a = args([("path", Value::from("/etc")), ("mode", Value::from(0o755))]);
        assert_eq!(a.len(), 2);
        assert_eq!(a["mode"], Value::Int(0o755));
    }
}
