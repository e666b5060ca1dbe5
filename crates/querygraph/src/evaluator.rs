//! Expression graph evaluator.
//!
//! Every checksum moves through `Unvisited -> Resolving -> Resolved`, or
//! parks in `Blocked` when a field it needs is pending on a deferred
//! gather. The evaluator subscribes to every field it is blocked on; after
//! each pass it runs the runtime's queued gathers, and the subscriptions
//! that fired send the affected checksums (and everything depending on
//! them) back to `Unvisited`. Passes stop when nothing is blocked, when a
//! pass makes no progress, or after `max_passes`. Whatever is still
//! blocked then becomes a NotReady error in the report.
//!
//! A block node evaluates its body once per element. Nodes under the body
//! that depend on the block's binding are scoped: their states are dropped
//! before each element and after the block, so no element sees another
//! element's results.

use crate::error::EvalError;
use crate::query::{BlockOp, CompiledQuery, Node, NodeKind, Operator};
use crate::report::{Assessment, RawData, RawResult, Report};
use parking_lot::Mutex;
use regex::Regex;
use resgraph::{Args, FieldKey, ResourceError, Runtime, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Default retry budget
pub const DEFAULT_MAX_PASSES: usize = 16;

static NEXT_WATCHER: AtomicU64 = AtomicU64::new(1);

type Outcome = Result<Value, EvalError>;

/// Evaluation settings
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Upper bound on evaluation passes while waiting for gathers
    pub max_passes: usize,
    /// Name the evaluator subscribes to runtime fields under
    pub watcher: String,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            watcher: format!(
                "evaluator-{}",
                NEXT_WATCHER.fetch_add(1, AtomicOrdering::Relaxed)
            ),
        }
    }
}

#[derive(Debug, Clone)]
enum State {
    Unvisited,
    Resolving,
    Resolved(Outcome),
    Blocked(ResourceError),
}

enum Step {
    Done(Outcome),
    Blocked(ResourceError),
}

/// Evaluates one compiled query against one runtime
pub struct Evaluator<'a> {
    runtime: &'a Runtime,
    query: &'a CompiledQuery,
    index: HashMap<&'a str, &'a Node>,
    props: BTreeMap<String, Value>,
    options: EvalOptions,
    states: HashMap<String, State>,
    dependents: HashMap<String, HashSet<String>>,
    woken: Arc<Mutex<Vec<String>>>,
    regexes: HashMap<String, Regex>,
    bindings: HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(runtime: &'a Runtime, query: &'a CompiledQuery) -> Self {
        Self {
            runtime,
            query,
            index: query
                .code
                .iter()
                .map(|n| (n.checksum.as_str(), n))
                .collect(),
            props: query
                .props
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
            options: EvalOptions::default(),
            states: HashMap::new(),
            dependents: HashMap::new(),
            woken: Arc::new(Mutex::new(Vec::new())),
            regexes: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    /// Supply property values. They override the query's defaults.
    pub fn with_props(mut self, props: BTreeMap<String, Value>) -> Self {
        self.props.extend(props);
        self
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate every entrypoint and datapoint and build the report.
    pub fn run(mut self) -> Report {
        let targets: Vec<String> = self
            .query
            .targets()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut passes = 0;
        loop {
            passes += 1;
            let blocked = targets
                .iter()
                .filter(|t| matches!(self.eval(t), Step::Blocked(_)))
                .count();
            if blocked == 0 {
                break;
            }
            log::debug!("eval> pass {passes}: {blocked} targets blocked");
            if passes >= self.options.max_passes {
                log::debug!("eval> giving up after {passes} passes");
                break;
            }

            let gathered = self.runtime.run_gathers();
            let woken = std::mem::take(&mut *self.woken.lock());
            if woken.is_empty() {
                log::debug!("eval> no progress after {gathered} gathers");
                break;
            }
            for checksum in woken {
                self.wake(&checksum);
            }
        }

        self.expire_blocked(passes);
        for target in &targets {
            self.eval(target);
        }
        self.runtime.unsubscribe(&self.options.watcher);
        self.report(passes)
    }

    fn eval(&mut self, checksum: &str) -> Step {
        match self.states.get(checksum) {
            Some(State::Resolved(outcome)) => return Step::Done(outcome.clone()),
            Some(State::Blocked(err)) => return Step::Blocked(err.clone()),
            Some(State::Resolving) => {
                return Step::Done(Err(EvalError::Cycle(checksum.to_string())));
            }
            Some(State::Unvisited) | None => {}
        }
        let Some(&node) = self.index.get(checksum) else {
            return Step::Done(Err(EvalError::UnknownChecksum(checksum.to_string())));
        };

        self.states.insert(checksum.to_string(), State::Resolving);
        let step = self.eval_node(node);
        let state = match &step {
            Step::Done(outcome) => State::Resolved(outcome.clone()),
            Step::Blocked(err) => State::Blocked(err.clone()),
        };
        self.states.insert(checksum.to_string(), state);
        step
    }

    fn eval_node(&mut self, node: &'a Node) -> Step {
        let checksum = node.checksum.as_str();
        match &node.kind {
            NodeKind::Literal { value } => Step::Done(Ok(Value::from_json(value))),
            NodeKind::Property { name } => Step::Done(
                self.props
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownProperty(name.clone())),
            ),
            NodeKind::Resource { resource, args } => self.eval_resource(checksum, resource, args),
            NodeKind::Field { target, field } => self.eval_field(checksum, target, field),
            NodeKind::Operator { op, operands } => self.eval_operator(checksum, *op, operands),
            NodeKind::Binding { name } => Step::Done(
                self.bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::Unbound(name.clone())),
            ),
            NodeKind::Block {
                op,
                target,
                bind,
                body,
            } => self.eval_block(checksum, *op, target, bind, body),
        }
    }

    /// Evaluate `child` on behalf of `parent`, remembering the edge so a
    /// wake-up of the child also resets the parent.
    fn operand(&mut self, parent: &str, child: &str) -> Step {
        self.dependents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.eval(child)
    }

    fn eval_resource(&mut self, checksum: &str, resource: &str, args: &BTreeMap<String, String>) -> Step {
        let mut built = Args::new();
        for (name, arg) in args {
            match self.operand(checksum, arg) {
                Step::Done(Ok(value)) => {
                    built.insert(name.clone(), value);
                }
                other => return other,
            }
        }

        let singleton = built.is_empty()
            && self
                .runtime
                .registry()
                .get(resource)
                .is_some_and(|t| t.descriptor().is_singleton());
        let created = if singleton {
            self.runtime.singleton(resource)
        } else {
            self.runtime.create_resource(resource, built)
        };
        match created {
            Ok(instance) => Step::Done(Ok(Value::Resource(instance))),
            Err(err) => self.resource_error(checksum, err),
        }
    }

    fn eval_field(&mut self, checksum: &str, target: &str, field: &str) -> Step {
        let value = match self.operand(checksum, target) {
            Step::Done(Ok(value)) => value,
            other => return other,
        };

        let items = match value {
            Value::Array(items) => items,
            other => return self.access(checksum, &other, field),
        };

        // project over the list; keep going after a blocked item so every
        // pending field joins the same gather
        let mut values = Vec::with_capacity(items.len());
        let mut blocked = None;
        let mut failed = None;
        for item in &items {
            match self.access(checksum, item, field) {
                Step::Done(Ok(v)) => values.push(v),
                Step::Done(Err(err)) => {
                    failed.get_or_insert(err);
                }
                Step::Blocked(err) => {
                    blocked.get_or_insert(err);
                }
            }
        }
        match (blocked, failed) {
            (Some(err), _) => Step::Blocked(err),
            (None, Some(err)) => Step::Done(Err(err)),
            (None, None) => Step::Done(Ok(Value::Array(values))),
        }
    }

    fn access(&mut self, checksum: &str, value: &Value, field: &str) -> Step {
        match value {
            Value::Resource(instance) => match self.runtime.resolve(instance, field) {
                Ok(v) => Step::Done(Ok(v)),
                Err(err) => self.resource_error(checksum, err),
            },
            Value::Map(entries) => Step::Done(Ok(entries.get(field).cloned().unwrap_or_default())),
            Value::Dict(json) => Step::Done(Ok(json.get(field).map_or(Value::Nil, Value::from_json))),
            other => Step::Done(Err(EvalError::Type(format!(
                "cannot read '{field}' of {}",
                other.value_type()
            )))),
        }
    }

    fn resource_error(&self, checksum: &str, err: ResourceError) -> Step {
        if let ResourceError::NotReady { uid, field, .. } = &err {
            let woken = Arc::clone(&self.woken);
            let tag = checksum.to_string();
            self.runtime.subscribe(
                FieldKey {
                    uid: *uid,
                    field: field.clone(),
                },
                &self.options.watcher,
                checksum,
                Arc::new(move |_| woken.lock().push(tag.clone())),
            );
            return Step::Blocked(err);
        }
        Step::Done(Err(err.into()))
    }

    fn eval_operator(&mut self, checksum: &str, op: Operator, operands: &[String]) -> Step {
        match op {
            Operator::And | Operator::Or => {
                let short_circuit = op == Operator::Or;
                for operand in operands {
                    match self.operand(checksum, operand) {
                        Step::Done(Ok(v)) => {
                            if v.truthy() == short_circuit {
                                return Step::Done(Ok(Value::Bool(short_circuit)));
                            }
                        }
                        other => return other,
                    }
                }
                Step::Done(Ok(Value::Bool(!short_circuit)))
            }
            _ => {
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    match self.operand(checksum, operand) {
                        Step::Done(Ok(v)) => values.push(v),
                        other => return other,
                    }
                }
                Step::Done(self.apply(op, &values))
            }
        }
    }

    fn eval_block(&mut self, checksum: &str, op: BlockOp, target: &str, bind: &str, body: &str) -> Step {
        let items = match self.operand(checksum, target) {
            Step::Done(Ok(value)) => match elements(&value) {
                Ok(items) => items,
                Err(err) => return Step::Done(Err(err)),
            },
            other => return other,
        };

        let scope = self.scope_of(body, bind);
        let outer = self.bindings.remove(bind);
        // every element runs, even after one blocks, so their pending
        // fields share a gather
        let mut results = Vec::with_capacity(items.len());
        let mut blocked = None;
        let mut failed = None;
        for item in &items {
            for scoped in &scope {
                self.states.remove(scoped);
            }
            self.bindings.insert(bind.to_string(), item.clone());
            match self.operand(checksum, body) {
                Step::Done(Ok(v)) => results.push(v),
                Step::Done(Err(err)) => {
                    failed.get_or_insert(err);
                }
                Step::Blocked(err) => {
                    blocked.get_or_insert(err);
                }
            }
        }
        for scoped in &scope {
            self.states.remove(scoped);
        }
        match outer {
            Some(value) => self.bindings.insert(bind.to_string(), value),
            None => self.bindings.remove(bind),
        };

        match (blocked, failed) {
            (Some(err), _) => Step::Blocked(err),
            (None, Some(err)) => Step::Done(Err(err)),
            (None, None) => Step::Done(Ok(reduce(op, items, results))),
        }
    }

    /// Checksums under `body` whose value depends on the binding `bind`
    fn scope_of(&self, body: &str, bind: &str) -> Vec<String> {
        fn visit<'q>(
            index: &HashMap<&'q str, &'q Node>,
            checksum: &'q str,
            bind: &str,
            memo: &mut HashMap<&'q str, bool>,
        ) -> bool {
            if let Some(&known) = memo.get(checksum) {
                return known;
            }
            memo.insert(checksum, false);
            let Some(&node) = index.get(checksum) else {
                return false;
            };
            let mut bound = matches!(&node.kind, NodeKind::Binding { name } if name == bind);
            for reference in node.kind.references() {
                bound |= visit(index, reference, bind, memo);
            }
            memo.insert(checksum, bound);
            bound
        }

        let mut memo = HashMap::new();
        let Some(&node) = self.index.get(body) else {
            return Vec::new();
        };
        visit(&self.index, &node.checksum, bind, &mut memo);
        memo.into_iter()
            .filter(|(_, bound)| *bound)
            .map(|(checksum, _)| checksum.to_string())
            .collect()
    }

    fn apply(&mut self, op: Operator, values: &[Value]) -> Outcome {
        match (op, values) {
            (Operator::Not, [v]) => Ok(Value::Bool(!v.truthy())),
            (Operator::Eq, [a, b]) => Ok(Value::Bool(equals(a, b))),
            (Operator::Ne, [a, b]) => Ok(Value::Bool(!equals(a, b))),
            (Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge, [a, b]) => {
                let ordering = compare(a, b)?;
                Ok(Value::Bool(match op {
                    Operator::Lt => ordering.is_lt(),
                    Operator::Le => ordering.is_le(),
                    Operator::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            (Operator::Add | Operator::Sub | Operator::Mul | Operator::Div, [a, b]) => {
                arithmetic(op, a, b)
            }
            (Operator::Contains, [a, b]) => contains(a, b).map(Value::Bool),
            (Operator::Length, [v]) => length(v),
            (Operator::Matches, [a, b]) => self.matches(a, b).map(Value::Bool),
            (Operator::Index, [a, b]) => index(a, b),
            (Operator::First, [v]) => Ok(elements(v)?.into_iter().next().unwrap_or_default()),
            (Operator::Last, [v]) => Ok(elements(v)?.pop().unwrap_or_default()),
            (Operator::Keys, [v]) => keys(v),
            (Operator::Values, [v]) => elements(v).map(Value::Array),
            (Operator::Unique, [v]) => {
                let mut unique: Vec<Value> = Vec::new();
                for item in elements(v)? {
                    if !unique.iter().any(|u| equals(u, &item)) {
                        unique.push(item);
                    }
                }
                Ok(Value::Array(unique))
            }
            _ => Err(EvalError::Type(format!(
                "'{op}' cannot take {} operands",
                values.len()
            ))),
        }
    }

    fn matches(&mut self, value: &Value, pattern: &Value) -> Result<bool, EvalError> {
        let Value::String(pattern) = pattern else {
            return Err(EvalError::Type(format!(
                "regex must be a string, got {}",
                pattern.value_type()
            )));
        };
        if !self.regexes.contains_key(pattern) {
            let re = Regex::new(pattern).map_err(|e| EvalError::Regex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            self.regexes.insert(pattern.clone(), re);
        }
        let re = &self.regexes[pattern];
        match value {
            Value::Nil => Ok(false),
            Value::String(text) => Ok(re.is_match(text)),
            Value::Array(items) => Ok(!items.is_empty()
                && items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|text| re.is_match(text)))),
            other => Ok(re.is_match(&other.to_string())),
        }
    }

    /// Send a checksum and everything that depends on it back to Unvisited
    fn wake(&mut self, checksum: &str) {
        let mut seen = HashSet::new();
        let mut stack = vec![checksum.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(state) = self.states.get_mut(&current) {
                *state = State::Unvisited;
            }
            if let Some(parents) = self.dependents.get(&current) {
                stack.extend(parents.iter().cloned());
            }
        }
    }

    /// Turn blocked fields into errors and let blocked operators re-run
    fn expire_blocked(&mut self, passes: usize) {
        let blocked: Vec<(String, ResourceError)> = self
            .states
            .iter()
            .filter_map(|(checksum, state)| match state {
                State::Blocked(err) => Some((checksum.clone(), err.clone())),
                _ => None,
            })
            .collect();

        for (checksum, err) in blocked {
            let leaf = self.index.get(checksum.as_str()).is_some_and(|n| {
                matches!(n.kind, NodeKind::Field { .. } | NodeKind::Resource { .. })
            });
            let state = if leaf {
                let pending = match &err {
                    ResourceError::NotReady {
                        resource, field, ..
                    } => format!("{resource}.{field}"),
                    other => other.to_string(),
                };
                State::Resolved(Err(EvalError::NotReady { pending, passes }))
            } else {
                State::Unvisited
            };
            self.states.insert(checksum, state);
        }
    }

    fn outcome(&self, checksum: &str, passes: usize) -> RawData {
        match self.states.get(checksum) {
            Some(State::Resolved(outcome)) => RawData::from_outcome(outcome.clone()),
            _ => RawData::from_outcome(Err(EvalError::NotReady {
                pending: checksum.to_string(),
                passes,
            })),
        }
    }

    fn value_of(&self, checksum: &str) -> Value {
        match self.states.get(checksum) {
            Some(State::Resolved(Ok(value))) => value.clone(),
            _ => Value::Nil,
        }
    }

    fn assess(&self, checksum: &str) -> Vec<Assessment> {
        let Some(node) = self.index.get(checksum) else {
            return Vec::new();
        };
        match &node.kind {
            NodeKind::Operator {
                op: Operator::And,
                operands,
            } => operands
                .iter()
                .filter(|o| !self.outcome(o, 0).is_success())
                .flat_map(|o| self.assess(o))
                .collect(),
            NodeKind::Operator { op, operands } if op.is_comparison() && operands.len() == 2 => {
                vec![Assessment {
                    checksum: checksum.to_string(),
                    label: self.query.label(checksum).map(str::to_string),
                    operator: op.symbol().to_string(),
                    actual: self.value_of(&operands[0]),
                    expected: self.value_of(&operands[1]),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn report(&self, passes: usize) -> Report {
        let results: BTreeMap<String, RawData> = self
            .states
            .iter()
            .filter_map(|(checksum, state)| match state {
                State::Resolved(outcome) => {
                    Some((checksum.clone(), RawData::from_outcome(outcome.clone())))
                }
                _ => None,
            })
            .collect();

        let collect = |list: &[String]| -> Vec<RawResult> {
            list.iter()
                .map(|checksum| RawResult {
                    checksum: checksum.clone(),
                    label: self.query.label(checksum).map(str::to_string),
                    data: self.outcome(checksum, passes),
                })
                .collect()
        };
        let entrypoints = collect(&self.query.entrypoints);
        let datapoints = collect(&self.query.datapoints);

        let success = entrypoints.iter().all(|r| r.data.is_success());
        let assessments = entrypoints
            .iter()
            .filter(|r| !r.data.is_success())
            .flat_map(|r| self.assess(&r.checksum))
            .collect();

        log::debug!(
            "eval> done after {passes} passes: {} checksums, success={success}",
            results.len()
        );
        Report {
            results,
            entrypoints,
            datapoints,
            score: RawResult {
                checksum: self.query.query_checksum(),
                label: None,
                data: RawData::from_outcome(Ok(Value::Bool(success))),
            },
            success,
            assessments,
            passes,
        }
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a.as_float() == b.as_float(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    let incomparable = || {
        EvalError::Type(format!(
            "cannot compare {} with {}",
            a.value_type(),
            b.value_type()
        ))
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (a.as_float(), b.as_float());
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Time(x), Value::Time(y)) => Ok(x.cmp(y)),
        _ => Err(incomparable()),
    }
}

fn arithmetic(op: Operator, a: &Value, b: &Value) -> Outcome {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let result = match op {
                Operator::Add => x.checked_add(*y),
                Operator::Sub => x.checked_sub(*y),
                Operator::Mul => x.checked_mul(*y),
                _ if *y == 0 => return Err(EvalError::DivisionByZero),
                _ => x.checked_div(*y),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| EvalError::Type(format!("integer overflow in {x} {op} {y}")))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = a.as_float().unwrap_or_default();
            let y = b.as_float().unwrap_or_default();
            Ok(Value::Float(match op {
                Operator::Add => x + y,
                Operator::Sub => x - y,
                Operator::Mul => x * y,
                _ if y == 0.0 => return Err(EvalError::DivisionByZero),
                _ => x / y,
            }))
        }
        (Value::String(x), Value::String(y)) if op == Operator::Add => {
            Ok(Value::String(format!("{x}{y}")))
        }
        (Value::Array(x), Value::Array(y)) if op == Operator::Add => {
            Ok(Value::Array(x.iter().chain(y).cloned().collect()))
        }
        _ => Err(EvalError::Type(format!(
            "cannot apply '{op}' to {} and {}",
            a.value_type(),
            b.value_type()
        ))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match (haystack, needle) {
        (Value::Nil, _) => Ok(false),
        (Value::String(h), Value::String(n)) => Ok(h.contains(n.as_str())),
        (Value::Array(items), needle) => Ok(items.iter().any(|item| equals(item, needle))),
        (Value::Map(entries), Value::String(key)) => Ok(entries.contains_key(key)),
        (Value::Dict(json), Value::String(key)) => Ok(json.get(key).is_some()),
        _ => Err(EvalError::Type(format!(
            "{} cannot contain {}",
            haystack.value_type(),
            needle.value_type()
        ))),
    }
}

fn length(value: &Value) -> Outcome {
    let n = match value {
        Value::Nil => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Map(entries) => entries.len(),
        Value::Dict(serde_json::Value::Array(items)) => items.len(),
        Value::Dict(serde_json::Value::Object(entries)) => entries.len(),
        other => {
            return Err(EvalError::Type(format!(
                "{} has no length",
                other.value_type()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

/// Elements of a list, or the values of a map
fn elements(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::Map(entries) => Ok(entries.values().cloned().collect()),
        Value::Dict(serde_json::Value::Array(items)) => Ok(items.iter().map(Value::from_json).collect()),
        Value::Dict(serde_json::Value::Object(entries)) => {
            Ok(entries.values().map(Value::from_json).collect())
        }
        other => Err(EvalError::Type(format!(
            "cannot iterate over {}",
            other.value_type()
        ))),
    }
}

fn keys(value: &Value) -> Outcome {
    match value {
        Value::Nil => Ok(Value::Array(Vec::new())),
        Value::Map(entries) => Ok(Value::Array(entries.keys().map(|k| Value::from(k.as_str())).collect())),
        Value::Dict(serde_json::Value::Object(entries)) => {
            Ok(Value::Array(entries.keys().map(|k| Value::from(k.as_str())).collect()))
        }
        other => Err(EvalError::Type(format!("{} has no keys", other.value_type()))),
    }
}

fn reduce(op: BlockOp, items: Vec<Value>, results: Vec<Value>) -> Value {
    let truthy = results.iter().filter(|v| v.truthy()).count();
    match op {
        BlockOp::Where => Value::Array(
            items
                .into_iter()
                .zip(&results)
                .filter(|(_, keep)| keep.truthy())
                .map(|(item, _)| item)
                .collect(),
        ),
        BlockOp::All => Value::Bool(truthy == results.len()),
        BlockOp::Any => Value::Bool(truthy > 0),
        BlockOp::None => Value::Bool(truthy == 0),
        BlockOp::One => Value::Bool(truthy == 1),
        BlockOp::Map => Value::Array(results),
    }
}

fn index(container: &Value, key: &Value) -> Outcome {
    match (container, key) {
        (Value::Nil, _) => Ok(Value::Nil),
        (Value::Array(items), Value::Int(i)) => {
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let position = if *i < 0 { len + i } else { *i };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|p| items.get(p))
                .cloned()
                .unwrap_or_default())
        }
        (Value::Map(entries), Value::String(k)) => Ok(entries.get(k).cloned().unwrap_or_default()),
        (Value::Dict(json), Value::String(k)) => Ok(json.get(k).map_or(Value::Nil, Value::from_json)),
        (Value::Dict(json), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|p| json.get(p))
            .map_or(Value::Nil, Value::from_json)),
        _ => Err(EvalError::Type(format!(
            "cannot index {} with {}",
            container.value_type(),
            key.value_type()
        ))),
    }
}
