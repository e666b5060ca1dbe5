//! `groups` and `group`, read from `/etc/group`

use super::{args, list_field, users};
use provider::Capability;
use resgraph::{
    Args, Init, Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const GROUP: &str = "/etc/group";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GroupEntry {
    gid: i64,
    name: String,
    members: Vec<String>,
}

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("groups")
            .doc("Local groups")
            .requires(Capability::FileSystem)
            .field("list", ValueType::array(ValueType::resource("group")), |rt, res| {
                entries(rt, res)?
                    .into_iter()
                    .map(|entry| {
                        rt.create_resource(
                            "group",
                            args([
                                ("gid", Value::Int(entry.gid)),
                                ("name", Value::from(entry.name)),
                            ]),
                        )
                        .map(Value::Resource)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            })
            .build(),
    );

    registry.register(
        ResourceType::builder("group")
            .doc("A local group")
            .key("gid", ValueType::Int)
            .arg("name", ValueType::String)
            .init(init)
            .field("members", ValueType::array(ValueType::resource("user")), members)
            .build(),
    );
}

/// `/etc/group` parsed once per runtime
fn entries(rt: &Runtime, groups: &Arc<Resource>) -> Result<Vec<GroupEntry>> {
    let value = rt.memoize(groups, "_entries", || {
        let content = groups.provider().read_to_string(GROUP)?;
        let entries: Vec<GroupEntry> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(parse_group_line)
            .collect();
        serde_json::to_value(entries)
            .map(Value::Dict)
            .map_err(|e| ResourceError::Upstream(format!("{GROUP}: {e}")))
    })?;
    match value {
        Value::Dict(json) => serde_json::from_value(json)
            .map_err(|e| ResourceError::Upstream(format!("cached {GROUP}: {e}"))),
        other => Err(ResourceError::Upstream(format!(
            "cached {GROUP} is {}",
            other.value_type()
        ))),
    }
}

/// `name:password:gid:member,member`
fn parse_group_line(line: &str) -> Option<GroupEntry> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 3 {
        log::warn!("{GROUP}: skipping malformed entry '{line}'");
        return None;
    }
    Some(GroupEntry {
        gid: parts[2].parse().ok()?,
        name: parts[0].to_string(),
        members: parts
            .get(3)
            .map(|m| {
                m.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Listed groups by gid, built once per runtime
fn by_gid(rt: &Runtime) -> Result<BTreeMap<String, Value>> {
    let groups = rt.singleton("groups")?;
    let map = rt.memoize(&groups, "_map", || {
        let map = list_field(rt, &groups, "list")?
            .into_iter()
            .filter_map(|group| {
                let gid = group.as_resource()?.id().to_string();
                Some((gid, group))
            })
            .collect();
        Ok(Value::Map(map))
    })?;
    match map {
        Value::Map(map) => Ok(map),
        other => Err(ResourceError::Upstream(format!(
            "cached group index is {}",
            other.value_type()
        ))),
    }
}

/// `group(gid)` hands back the listed instance when there is one
fn init(rt: &Runtime, seeds: Args) -> Result<Init> {
    if seeds.get("name").is_some_and(|v| !v.is_nil()) {
        return Ok(Init::Construct(seeds));
    }
    let Some(gid) = seeds.get("gid").and_then(Value::as_int) else {
        return Ok(Init::Insufficient(seeds));
    };
    match by_gid(rt) {
        Ok(map) => match map.get(&gid.to_string()).and_then(Value::as_resource) {
            Some(group) => Ok(Init::Existing(Arc::clone(group))),
            None => Ok(Init::Insufficient(seeds)),
        },
        Err(err) if err.is_not_found() => Ok(Init::Insufficient(seeds)),
        Err(err) => Err(err),
    }
}

/// Members are listed users; names without an account become placeholders
fn members(rt: &Runtime, res: &Arc<Resource>) -> Result<Value> {
    let gid = res.int("gid")?;
    let groups = rt.singleton("groups")?;
    let names = entries(rt, &groups)?
        .into_iter()
        .find(|e| e.gid == gid)
        .map(|e| e.members)
        .unwrap_or_default();

    let known = match users::by_name(rt) {
        Ok(map) => map,
        Err(err) if err.is_not_found() => BTreeMap::new(),
        Err(err) => return Err(err),
    };

    names
        .into_iter()
        .map(|name| match known.get(&name) {
            Some(user) => Ok(user.clone()),
            None => rt
                .create_resource("user", args([("name", Value::from(name))]))
                .map(Value::Resource),
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing;
    use provider::MockProvider;

    #[test]
    fn test_group_lookup_returns_listed_instance() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let groups = rt.singleton("groups").unwrap();
        let listed = list_field(&rt, &groups, "list").unwrap();
        assert_eq!(listed.len(), 5);

        let root = rt
            .create_resource("group", args([("gid", Value::Int(0))]))
            .unwrap();
        assert!(Arc::ptr_eq(&root, listed[0].as_resource().unwrap()));
        assert_eq!(rt.resolve(&root, "name").unwrap(), Value::from("root"));
        assert_eq!(mock.read_calls(), 1);
    }

    #[test]
    fn test_members_degrade_to_placeholders() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let sudo = rt
            .create_resource("group", args([("gid", Value::Int(27))]))
            .unwrap();
        let members = list_field(&rt, &sudo, "members").unwrap();
        assert_eq!(members.len(), 2);

        let alice = members[0].as_resource().unwrap();
        assert_eq!(alice.id(), "1000");
        assert_eq!(rt.resolve(alice, "home").unwrap(), Value::from("/home/alice"));

        let ghost = members[1].as_resource().unwrap();
        assert_eq!(ghost.id(), "name:ghost");
        assert!(rt.resolve(ghost, "home").is_err());
    }

    #[test]
    fn test_unlisted_gid_is_a_placeholder() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let group = rt
            .create_resource("group", args([("gid", Value::Int(4242))]))
            .unwrap();
        assert_eq!(group.id(), "4242");
        assert!(rt.resolve(&group, "name").is_err());
        assert_eq!(list_field(&rt, &group, "members").unwrap().len(), 0);
    }

    #[test]
    fn test_missing_group_file() {
        let mock = Arc::new(MockProvider::new());
        let rt = testing::runtime(&mock);
        let group = rt
            .create_resource("group", args([("gid", Value::Int(0))]))
            .unwrap();
        assert!(rt.resolve(&group, "members").unwrap_err().is_not_found());
    }

    #[test]
    fn test_parse_group_line() {
        let entry = parse_group_line("sudo:x:27:alice, bob").unwrap();
        assert_eq!(entry.gid, 27);
        assert_eq!(entry.members, vec!["alice", "bob"]);

        let empty = parse_group_line("nogroup:x:65534").unwrap();
        assert!(empty.members.is_empty());

        assert!(parse_group_line("broken").is_none());
        assert!(parse_group_line("bad:x:gid:").is_none());
    }
}
