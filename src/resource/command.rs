//! `command`: output of a shell command on the target

use provider::Capability;
use resgraph::{Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType};
use serde_json::json;
use std::sync::Arc;

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("command")
            .doc("Run a command on the target and capture its output")
            .key("command", ValueType::String)
            .requires(Capability::RunCommand)
            .field("stdout", ValueType::String, |rt, res| output_field(rt, res, "stdout"))
            .field("stderr", ValueType::String, |rt, res| output_field(rt, res, "stderr"))
            .field("exitcode", ValueType::Int, |rt, res| output_field(rt, res, "exitcode"))
            .build(),
    );
}

/// The command runs once; all three fields read the shared `_output` entry
fn output_field(rt: &Runtime, res: &Arc<Resource>, part: &str) -> Result<Value> {
    let output = rt.memoize(res, "_output", || {
        let cmd = res.string("command")?;
        log::debug!("command> {cmd}");
        let out = res.provider().run_command(&cmd)?;
        Ok(Value::Dict(json!({
            "stdout": out.stdout_str(),
            "stderr": out.stderr_str(),
            "exitcode": out.exit_status,
        })))
    })?;

    match &output {
        Value::Dict(json) => json
            .get(part)
            .map(Value::from_json)
            .ok_or_else(|| ResourceError::Upstream(format!("{res} produced no {part}"))),
        other => Err(ResourceError::Upstream(format!(
            "cached output of {res} is {}",
            other.value_type()
        ))),
    }
}
