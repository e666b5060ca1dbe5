//! `processes` and `process`
//!
//! Listing only yields pids. The first read of any detail field defers it
//! to one `ps` gather that fills every pending process at once.

use super::args;
use provider::Capability;
use resgraph::{
    FieldRef, Registry, Resource, ResourceError, ResourceType, Result, Runtime, Value, ValueType,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const LIST_COMMAND: &str = "ps -eo pid=";
const DETAIL_COMMAND: &str = "ps -eo pid=,ppid=,stat=,args=";
const GATHER_KEY: &str = "process.ps";

pub fn register(registry: &mut Registry) {
    registry.register(
        ResourceType::builder("processes")
            .doc("Running processes")
            .requires(Capability::RunCommand)
            .field("list", ValueType::array(ValueType::resource("process")), list)
            .build(),
    );

    registry.register(
        ResourceType::builder("process")
            .doc("A running process")
            .key("pid", ValueType::Int)
            .requires(Capability::RunCommand)
            .field("command", ValueType::String, |rt, res| Err(defer(rt, res, "command")))
            .field("state", ValueType::String, |rt, res| Err(defer(rt, res, "state")))
            .field("ppid", ValueType::Int, |rt, res| Err(defer(rt, res, "ppid")))
            .build(),
    );
}

fn list(rt: &Runtime, res: &Arc<Resource>) -> Result<Value> {
    let out = res.provider().run_command(LIST_COMMAND)?;
    if !out.success() {
        return Err(ResourceError::Upstream(format!(
            "{LIST_COMMAND} exited with {}: {}",
            out.exit_status,
            out.stderr_str().trim()
        )));
    }
    out.stdout_str()
        .split_whitespace()
        .filter_map(|pid| pid.parse::<i64>().ok())
        .map(|pid| {
            rt.create_resource("process", args([("pid", Value::Int(pid))]))
                .map(Value::Resource)
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn defer(rt: &Runtime, res: &Arc<Resource>, field: &str) -> ResourceError {
    rt.defer(GATHER_KEY, res, field, gather)
}

struct ProcessRow {
    ppid: i64,
    state: String,
    command: String,
}

/// Run `ps` once and fill every detail field of the pending processes.
/// Processes missing from the output are left for the runtime to fail.
fn gather(rt: &Runtime, pending: &[FieldRef]) -> Result<()> {
    let out = rt.provider().run_command(DETAIL_COMMAND)?;
    if !out.success() {
        return Err(ResourceError::Upstream(format!(
            "{DETAIL_COMMAND} exited with {}: {}",
            out.exit_status,
            out.stderr_str().trim()
        )));
    }
    let rows = parse_ps(&out.stdout_str());

    let mut seen = HashSet::new();
    for field in pending {
        let process = &field.resource;
        if !seen.insert(process.uid()) {
            continue;
        }
        let Some(row) = process.int("pid").ok().and_then(|pid| rows.get(&pid)) else {
            continue;
        };
        rt.fill(process, "command", Ok(Value::from(row.command.as_str())));
        rt.fill(process, "state", Ok(Value::from(row.state.as_str())));
        rt.fill(process, "ppid", Ok(Value::Int(row.ppid)));
    }
    Ok(())
}

fn parse_ps(output: &str) -> BTreeMap<i64, ProcessRow> {
    let mut rows = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(pid), Some(ppid), Some(stat)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(pid), Ok(ppid)) = (pid.parse::<i64>(), ppid.parse::<i64>()) else {
            continue;
        };
        rows.insert(
            pid,
            ProcessRow {
                ppid,
                state: stat.chars().next().map(String::from).unwrap_or_default(),
                command: parts.collect::<Vec<_>>().join(" "),
            },
        );
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{list_field, testing};
    use resgraph::ErrorKind;

    #[test]
    fn test_details_are_pending_until_gathered() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let sshd = rt
            .create_resource("process", args([("pid", Value::Int(42))]))
            .unwrap();

        let err = rt.resolve(&sshd, "state").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(rt.has_pending_gathers());
        assert_eq!(mock.command_calls(DETAIL_COMMAND), 0);

        assert_eq!(rt.run_gathers(), 1);
        assert_eq!(rt.resolve(&sshd, "state").unwrap(), Value::from("S"));
        assert_eq!(rt.resolve(&sshd, "command").unwrap(), Value::from("/usr/sbin/sshd -D"));
        assert_eq!(rt.resolve(&sshd, "ppid").unwrap(), Value::Int(1));
        assert_eq!(mock.command_calls(DETAIL_COMMAND), 1);
    }

    #[test]
    fn test_one_gather_fills_every_listed_process() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let processes = rt.singleton("processes").unwrap();
        let list = list_field(&rt, &processes, "list").unwrap();
        assert_eq!(list.len(), 3);

        for process in &list {
            let err = rt.resolve(process.as_resource().unwrap(), "command").unwrap_err();
            assert!(err.is_not_ready());
        }
        assert_eq!(rt.stats().pending_gathers, 1);
        assert_eq!(rt.run_gathers(), 1);

        let states: Vec<Value> = list
            .iter()
            .map(|p| rt.resolve(p.as_resource().unwrap(), "state").unwrap())
            .collect();
        assert_eq!(states, vec![Value::from("S"), Value::from("S"), Value::from("R")]);
        assert_eq!(mock.command_calls(DETAIL_COMMAND), 1);
        assert_eq!(mock.command_calls(LIST_COMMAND), 1);
    }

    #[test]
    fn test_vanished_process_is_not_found() {
        let mock = Arc::new(testing::mock());
        let rt = testing::runtime(&mock);
        let gone = rt
            .create_resource("process", args([("pid", Value::Int(9999))]))
            .unwrap();
        assert!(rt.resolve(&gone, "state").unwrap_err().is_not_ready());
        rt.run_gathers();
        assert_eq!(
            rt.resolve(&gone, "state").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_parse_ps() {
        let rows = parse_ps("    1     0 Ss   /sbin/init splash\n garbage\n  7  1 Z\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&1].command, "/sbin/init splash");
        assert_eq!(rows[&1].state, "S");
        assert_eq!(rows[&7].command, "");
        assert_eq!(rows[&7].ppid, 1);
    }
}
