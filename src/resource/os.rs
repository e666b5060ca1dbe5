//! `os`: the target platform

use provider::{Capability, Platform};
use resgraph::{Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType};
use std::sync::Arc;

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("os")
            .doc("Operating system of the target")
            .requires(Capability::Platform)
            .field("name", ValueType::String, |rt, res| {
                Ok(Value::from(platform(rt, res)?.name))
            })
            .field("release", ValueType::String, |rt, res| {
                Ok(Value::from(platform(rt, res)?.release))
            })
            .field("arch", ValueType::String, |rt, res| {
                Ok(Value::from(platform(rt, res)?.arch))
            })
            .field("family", ValueType::array(ValueType::String), |rt, res| {
                let family = platform(rt, res)?.family;
                Ok(Value::Array(family.into_iter().map(Value::from).collect()))
            })
            .field("hostname", ValueType::String, hostname)
            .build(),
    );
}

/// Platform detection runs once per runtime and backs every field
fn platform(rt: &Runtime, res: &Arc<Resource>) -> Result<Platform> {
    let value = rt.memoize(res, "_platform", || {
        let platform = res.provider().platform()?;
        serde_json::to_value(platform)
            .map(Value::Dict)
            .map_err(|e| ResourceError::Upstream(format!("platform: {e}")))
    })?;
    match value {
        Value::Dict(json) => serde_json::from_value(json)
            .map_err(|e| ResourceError::Upstream(format!("cached platform: {e}"))),
        other => Err(ResourceError::Upstream(format!(
            "cached platform is {}",
            other.value_type()
        ))),
    }
}

fn hostname(_rt: &Runtime, res: &Arc<Resource>) -> Result<Value> {
    let provider = res.provider();
    if provider.has_capability(Capability::FileSystem) {
        match provider.read_to_string("/etc/hostname") {
            Ok(content) if !content.trim().is_empty() => {
                return Ok(Value::from(content.trim()));
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
    }

    let out = provider.run_command("uname -n")?;
    if !out.success() {
        return Err(ResourceError::Upstream(format!(
            "uname -n exited with {}: {}",
            out.exit_status,
            out.stderr_str().trim()
        )));
    }
    Ok(Value::from(out.stdout_str().trim()))
}

#[cfg(test)]
mod tests {
    use crate::resource::testing;
    use provider::{Capability, MockProvider, Platform};
    use resgraph::{ErrorKind, Value};
    use std::sync::Arc;

    #[test]
    fn test_os_fields_share_one_platform_lookup() {
        let mock = Arc::new(testing::mock().with_platform(Platform {
            name: "debian".to_string(),
            release: "12".to_string(),
            arch: "x86_64".to_string(),
            family: vec!["linux".to_string(), "unix".to_string()],
            kind: "mock".to_string(),
        }));
        let rt = testing::runtime(&mock);
        let os = rt.singleton("os").unwrap();

        assert_eq!(rt.resolve(&os, "name").unwrap(), Value::from("debian"));
        assert_eq!(rt.resolve(&os, "release").unwrap(), Value::from("12"));
        assert_eq!(
            rt.resolve(&os, "family").unwrap(),
            Value::Array(vec![Value::from("linux"), Value::from("unix")])
        );
        assert!(os.is_valid("_platform"));
        assert_eq!(rt.resolve(&os, "hostname").unwrap(), Value::from("probe"));
    }

    #[test]
    fn test_hostname_falls_back_to_uname() {
        let mock = Arc::new(MockProvider::new().with_command("uname -n", "fallback\n"));
        let rt = testing::runtime(&mock);
        let os = rt.singleton("os").unwrap();
        assert_eq!(rt.resolve(&os, "hostname").unwrap(), Value::from("fallback"));
        assert_eq!(mock.command_calls("uname -n"), 1);
    }

    #[test]
    fn test_os_requires_platform_capability() {
        let mock = Arc::new(
            MockProvider::new().with_capabilities(&[Capability::FileSystem, Capability::RunCommand]),
        );
        let rt = testing::runtime(&mock);
        let err = rt.singleton("os").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
}
