//! `users` and `user`, read from `/etc/passwd`

use super::{args, list_field};
use provider::Capability;
use resgraph::{
    Args, Init, Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const PASSWD: &str = "/etc/passwd";

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("users")
            .doc("Local user accounts")
            .requires(Capability::FileSystem)
            .field("list", ValueType::array(ValueType::resource("user")), list)
            .build(),
    );

    registry.register(
        ResourceType::builder("user")
            .doc("A local user account; look up by uid or name")
            .key("uid", ValueType::Int)
            .arg("name", ValueType::String)
            .arg("gid", ValueType::Int)
            .arg("home", ValueType::String)
            .arg("shell", ValueType::String)
            .init(init)
            .identity(|seeds| match seeds.get("uid") {
                Some(uid) => Ok(uid.to_string()),
                None => Ok(format!("name:{}", seeds.str("name")?)),
            })
            .field("group", ValueType::resource("group"), |rt, res| {
                let gid = res.int("gid")?;
                rt.create_resource("group", args([("gid", Value::Int(gid))]))
                    .map(Value::Resource)
            })
            .build(),
    );
}

fn list(rt: &Runtime, res: &Arc<Resource>) -> Result<Value> {
    let content = res.provider().read_to_string(PASSWD)?;
    let mut users = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(seeds) = parse_passwd_line(line) else {
            log::warn!("{PASSWD}:{}: skipping malformed entry", lineno + 1);
            continue;
        };
        users.push(Value::Resource(rt.create_resource("user", seeds)?));
    }
    Ok(Value::Array(users))
}

/// `name:password:uid:gid:gecos:home:shell`
fn parse_passwd_line(line: &str) -> Option<Args> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 7 {
        return None;
    }
    let uid: i64 = parts[2].parse().ok()?;
    let gid: i64 = parts[3].parse().ok()?;
    Some(args([
        ("uid", Value::Int(uid)),
        ("name", Value::from(parts[0])),
        ("gid", Value::Int(gid)),
        ("home", Value::from(parts[5])),
        ("shell", Value::from(parts[6])),
    ]))
}

/// Listed users by name, built once per runtime
pub(crate) fn by_name(rt: &Runtime) -> Result<BTreeMap<String, Value>> {
    let users = rt.singleton("users")?;
    let map = rt.memoize(&users, "_map", || {
        let mut map = BTreeMap::new();
        for user in list_field(rt, &users, "list")? {
            let name = user
                .as_resource()
                .and_then(|u| u.value("name"))
                .and_then(Value::into_string);
            if let Some(name) = name {
                map.insert(name, user);
            }
        }
        Ok(Value::Map(map))
    })?;
    match map {
        Value::Map(map) => Ok(map),
        other => Err(ResourceError::Upstream(format!(
            "cached user index is {}",
            other.value_type()
        ))),
    }
}

/// Fully seeded users construct directly. Partial ones are looked up in
/// the user list and become placeholders when nothing matches.
fn init(rt: &Runtime, seeds: Args) -> Result<Init> {
    let seeded = |name: &str| seeds.get(name).is_some_and(|v| !v.is_nil());
    if seeded("uid") && seeded("name") {
        return Ok(Init::Construct(seeds));
    }

    let found = if let Some(uid) = seeds.get("uid").and_then(Value::as_int) {
        let users = rt.singleton("users")?;
        lookup(list_field(rt, &users, "list"), |user| {
            user.value("uid") == Some(Value::Int(uid))
        })?
    } else if let Some(name) = seeds.get("name").and_then(Value::as_str) {
        match by_name(rt) {
            Ok(map) => map.get(name).and_then(|v| v.as_resource().cloned()),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        }
    } else {
        None
    };

    match found {
        Some(user) => Ok(Init::Existing(user)),
        None => {
            log::debug!("user> no listed user matches {seeds:?}, using a placeholder");
            Ok(Init::Insufficient(seeds))
        }
    }
}

fn lookup<F>(listed: Result<Vec<Value>>, matches: F) -> Result<Option<Arc<Resource>>>
where
    F: Fn(&Arc<Resource>) -> bool,
{
    match listed {
        Ok(users) => Ok(users
            .iter()
            .filter_map(Value::as_resource)
            .find(|u| matches(u))
            .cloned()),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
