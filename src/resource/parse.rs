//! `parse.json`: structured view of a JSON file

use super::{args, resource_field};
use resgraph::{Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType};
use std::sync::Arc;

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("parse.json")
            .doc("Parse a JSON file into a dict")
            .key("path", ValueType::String)
            .field("file", ValueType::resource("file"), |rt, res| {
                let path = res.string("path")?;
                rt.create_resource("file", args([("path", Value::from(path))]))
                    .map(Value::Resource)
            })
            .field("params", ValueType::Dict, params)
            .build(),
    );
}

/// Re-parsed whenever the file's content is invalidated
fn params(rt: &Runtime, res: &Arc<Resource>) -> Result<Value> {
    let file = resource_field(rt, res, "file")?;
    rt.watch(&file, "content", res, "params")?;

    let content = rt.resolve(&file, "content")?;
    let text = content.as_str().unwrap_or_default();
    serde_json::from_str(text).map(Value::Dict).map_err(|e| {
        ResourceError::InvalidArgument(format!("{file} is not valid JSON: {e}"))
    })
}
