//! `file` and `file.permissions`

use super::{args, resource_field, stat};
use provider::Capability;
use resgraph::{Init, Registry, ResourceType, Result, Runtime, Value, ValueType};
use std::path::Path;
use std::sync::Arc;

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("file")
            .doc("A file on the target")
            .key("path", ValueType::String)
            .requires(Capability::FileSystem)
            .field("exists", ValueType::Bool, |rt, res| match stat(rt, res) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.is_not_found() => Ok(Value::Bool(false)),
                Err(err) => Err(err),
            })
            .field("size", ValueType::Int, |rt, res| Ok(Value::from(stat(rt, res)?.size)))
            .field("uid", ValueType::Int, |rt, res| Ok(Value::from(stat(rt, res)?.uid)))
            .field("gid", ValueType::Int, |rt, res| Ok(Value::from(stat(rt, res)?.gid)))
            .field("directory", ValueType::Bool, |rt, res| {
                Ok(Value::Bool(stat(rt, res)?.is_dir))
            })
            .field("modified", ValueType::Time, |rt, res| {
                Ok(stat(rt, res)?.modified.map_or(Value::Nil, Value::Time))
            })
            .field(
                "permissions",
                ValueType::resource("file.permissions"),
                |rt, res| {
                    let info = stat(rt, res)?;
                    rt.create_resource(
                        "file.permissions",
                        args([
                            ("path", Value::from(res.string("path")?)),
                            ("mode", Value::from(info.mode)),
                        ]),
                    )
                    .map(Value::Resource)
                },
            )
            .field("content", ValueType::String, |_rt, res| {
                let path = res.string("path")?;
                Ok(Value::from(res.provider().read_to_string(&path)?))
            })
            .field("basename", ValueType::String, |_rt, res| {
                let path = res.string("path")?;
                Ok(Value::from(basename(&path)))
            })
            .field("dirname", ValueType::String, |_rt, res| {
                let path = res.string("path")?;
                Ok(Value::from(dirname(&path)))
            })
            .build(),
    );

    let mut permissions = ResourceType::builder("file.permissions")
        .doc("Permission bits of a file")
        .key("path", ValueType::String)
        .arg("mode", ValueType::Int)
        .init(permissions_init)
        .field("string", ValueType::String, |_rt, res| {
            Ok(Value::from(mode_string(res.int("mode")?)))
        });
    for (name, bit) in PERMISSION_BITS {
        permissions = permissions.field(name, ValueType::Bool, move |_rt, res| {
            Ok(Value::Bool(res.int("mode")? & bit != 0))
        });
    }
    registry.register(permissions.build());
}

const PERMISSION_BITS: [(&str, i64); 9] = [
    ("user_readable", 0o400),
    ("user_writable", 0o200),
    ("user_executable", 0o100),
    ("group_readable", 0o040),
    ("group_writable", 0o020),
    ("group_executable", 0o010),
    ("other_readable", 0o004),
    ("other_writable", 0o002),
    ("other_executable", 0o001),
];

/// `file.permissions(path)` without a mode asks the file for it
fn permissions_init(rt: &Runtime, seeds: resgraph::Args) -> Result<Init> {
    if seeds.get("mode").is_some_and(|m| !m.is_nil()) {
        return Ok(Init::Construct(seeds));
    }
    let Some(path) = seeds.get("path").filter(|p| !p.is_nil()).cloned() else {
        return Ok(Init::Insufficient(seeds));
    };
    let file = rt.create_resource("file", args([("path", path)]))?;
    Ok(Init::Existing(resource_field(rt, &file, "permissions")?))
}

/// `rwxr-x---` rendering of the low nine permission bits
fn mode_string(mode: i64) -> String {
    PERMISSION_BITS
        .iter()
        .zip("rwxrwxrwx".chars())
        .map(|((_, bit), c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn dirname(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_string(),
        Some(parent) => parent.to_string_lossy().to_string(),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing;
    use provider::{MockFile, MockProvider};
    use resgraph::{ErrorKind, Resource};

    fn file(rt: &Runtime, path: &str) -> Arc<Resource> {
        rt.create_resource("file", args([("path", Value::from(path))]))
            .unwrap()
    }

    #[test]
    fn test_stat_is_shared_between_fields() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let passwd = file(&rt, "/etc/passwd");

        assert_eq!(rt.resolve(&passwd, "size").unwrap(), Value::Int(193));
        assert_eq!(rt.resolve(&passwd, "exists").unwrap(), Value::Bool(true));
        assert_eq!(rt.resolve(&passwd, "uid").unwrap(), Value::Int(0));
        assert_eq!(rt.resolve(&passwd, "size").unwrap(), Value::Int(193));
        assert_eq!(mock.stat_calls(), 1);

        let perms = resource_field(&rt, &passwd, "permissions").unwrap();
        assert_eq!(rt.resolve(&perms, "mode").unwrap(), Value::Int(0o644));
        assert_eq!(rt.resolve(&perms, "string").unwrap(), Value::from("rw-r--r--"));
        assert_eq!(rt.resolve(&perms, "user_writable").unwrap(), Value::Bool(true));
        assert_eq!(rt.resolve(&perms, "group_writable").unwrap(), Value::Bool(false));
        assert_eq!(rt.resolve(&perms, "other_readable").unwrap(), Value::Bool(true));
        assert_eq!(mock.stat_calls(), 1);
    }

    #[test]
    fn test_missing_file_caches_not_found() {
        let mock = Arc::new(MockProvider::new());
        let rt = testing::runtime(&mock);
        let missing = file(&rt, "/etc/shadow");

        assert_eq!(rt.resolve(&missing, "exists").unwrap(), Value::Bool(false));
        let err = rt.resolve(&missing, "size").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(rt.resolve(&missing, "permissions").is_err());
        assert_eq!(mock.stat_calls(), 1);
    }

    #[test]
    fn test_invalidated_stat_sees_new_file() {
        let mock = Arc::new(MockProvider::new());
        let rt = testing::runtime(&mock);
        let motd = file(&rt, "/etc/motd");
        assert_eq!(rt.resolve(&motd, "exists").unwrap(), Value::Bool(false));

        mock.set_file(
            "/etc/motd",
            MockFile {
                content: "welcome\n".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(rt.resolve(&motd, "exists").unwrap(), Value::Bool(false));

        rt.invalidate(&motd, "_stat");
        rt.invalidate(&motd, "exists");
        assert_eq!(rt.resolve(&motd, "exists").unwrap(), Value::Bool(true));
        assert_eq!(rt.resolve(&motd, "size").unwrap(), Value::Int(8));
    }

    #[test]
    fn test_path_fields() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let app = file(&rt, "/etc/app.json");
        assert_eq!(rt.resolve(&app, "basename").unwrap(), Value::from("app.json"));
        assert_eq!(rt.resolve(&app, "dirname").unwrap(), Value::from("/etc"));
        assert_eq!(rt.resolve(&app, "id").unwrap(), Value::from("/etc/app.json"));
        assert_eq!(mock.stat_calls(), 0);

        assert_eq!(dirname("/"), "/");
        assert_eq!(dirname("relative"), ".");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_permissions_without_mode_asks_the_file() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let perms = rt
            .create_resource("file.permissions", args([("path", Value::from("/etc/app.json"))]))
            .unwrap();
        assert_eq!(rt.resolve(&perms, "string").unwrap(), Value::from("rw-------"));

        let app = file(&rt, "/etc/app.json");
        let via_file = resource_field(&rt, &app, "permissions").unwrap();
        assert!(Arc::ptr_eq(&perms, &via_file));
    }

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(0o755), "rwxr-xr-x");
        assert_eq!(mode_string(0o4750), "rwxr-x---");
        assert_eq!(mode_string(0), "---------");
    }
}
