//! The compiled query artifact.
//!
//! A compiled query is a flat list of checksum-addressed nodes. Nodes refer
//! to each other by checksum only, so a shared sub-expression appears once
//! and is evaluated once. On disk it is JSON:
//!
//! ```json
//! {
//!   "code": [
//!     {"checksum": "a1", "kind": "literal", "value": "/etc/passwd"},
//!     {"checksum": "b2", "kind": "resource", "resource": "file", "args": {"path": "a1"}},
//!     {"checksum": "c3", "kind": "field", "target": "b2", "field": "size"},
//!     {"checksum": "d4", "kind": "literal", "value": 0},
//!     {"checksum": "e5", "kind": "operator", "op": "gt", "operands": ["c3", "d4"]}
//!   ],
//!   "entrypoints": ["e5"],
//!   "datapoints": ["c3"],
//!   "labels": {"e5": "file(\"/etc/passwd\").size > 0"}
//! }
//! ```
//!
//! List checks use a `block` node: its `body` is evaluated once per element
//! of `target`, with the element available to the body through `binding`
//! nodes of the same name (`_` unless `bind` says otherwise).
//!
//! ```json
//! {"checksum": "s1", "kind": "binding", "name": "_"},
//! {"checksum": "s2", "kind": "field", "target": "s1", "field": "shell"},
//! {"checksum": "s3", "kind": "operator", "op": "ne", "operands": ["s2", "nologin"]},
//! {"checksum": "s4", "kind": "block", "op": "all", "target": "list", "body": "s3"}
//! ```

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Operators understood by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Contains,
    Length,
    Matches,
    Index,
    First,
    Last,
    Keys,
    Values,
    Unique,
}

impl Operator {
    /// Minimum and maximum operand count
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::And | Self::Or => (1, None),
            Self::Not
            | Self::Length
            | Self::First
            | Self::Last
            | Self::Keys
            | Self::Values
            | Self::Unique => (1, Some(1)),
            _ => (2, Some(2)),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Contains | Self::Matches
        )
    }

    /// Operator as written in query source
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Contains => "contains",
            Self::Length => "length",
            Self::Matches => "=~",
            Self::Index => "[]",
            Self::First => "first",
            Self::Last => "last",
            Self::Keys => "keys",
            Self::Values => "values",
            Self::Unique => "unique",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// List functions that run a block once per element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOp {
    /// Elements for which the block is truthy
    Where,
    /// Block is truthy for every element (true for an empty list)
    All,
    /// Block is truthy for at least one element
    Any,
    /// Block is truthy for no element
    None,
    /// Block is truthy for exactly one element
    One,
    /// The block's value for each element
    Map,
}

impl BlockOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::All => "all",
            Self::Any => "any",
            Self::None => "none",
            Self::One => "one",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for BlockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_binding() -> String {
    DEFAULT_BINDING.to_string()
}

/// Name a block binds its element to unless told otherwise
pub const DEFAULT_BINDING: &str = "_";

/// What a node computes. Node references are checksums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    Literal {
        value: serde_json::Value,
    },
    Resource {
        resource: String,
        /// Constructor argument name -> checksum of its value
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        args: BTreeMap<String, String>,
    },
    Field {
        target: String,
        field: String,
    },
    Operator {
        op: Operator,
        operands: Vec<String>,
    },
    Property {
        name: String,
    },
    /// The element bound by the enclosing block named `name`
    Binding {
        #[serde(default = "default_binding")]
        name: String,
    },
    Block {
        op: BlockOp,
        target: String,
        #[serde(default = "default_binding")]
        bind: String,
        body: String,
    },
}

impl NodeKind {
    /// Checksums this node depends on, in evaluation order
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Literal { .. } | Self::Property { .. } | Self::Binding { .. } => Vec::new(),
            Self::Resource { args, .. } => args.values().map(String::as_str).collect(),
            Self::Field { target, .. } => vec![target.as_str()],
            Self::Operator { operands, .. } => operands.iter().map(String::as_str).collect(),
            Self::Block { target, body, .. } => vec![target.as_str(), body.as_str()],
        }
    }
}

/// One checksum-addressed sub-expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub checksum: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// A query ready for evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledQuery {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    pub code: Vec<Node>,
    #[serde(default)]
    pub entrypoints: Vec<String>,
    #[serde(default)]
    pub datapoints: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Default values for `property` nodes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, serde_json::Value>,
}

impl CompiledQuery {
    /// Parse and validate a query from JSON.
    pub fn from_json(content: &str) -> Result<Self, QueryError> {
        let query: Self = serde_json::from_str(content)?;
        query.validate()?;
        Ok(query)
    }

    /// Load and validate a query file.
    pub fn load(path: &Path) -> Result<Self, QueryError> {
        let content = std::fs::read_to_string(path).map_err(|source| QueryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn node(&self, checksum: &str) -> Option<&Node> {
        self.code.iter().find(|n| n.checksum == checksum)
    }

    pub fn label(&self, checksum: &str) -> Option<&str> {
        self.labels.get(checksum).map(String::as_str)
    }

    /// Query checksum, derived from the reported checksums when the query
    /// does not carry one.
    pub fn query_checksum(&self) -> String {
        if !self.checksum.is_empty() {
            return self.checksum.clone();
        }
        let mut hasher = blake3::Hasher::new();
        for checksum in self.entrypoints.iter().chain(&self.datapoints) {
            hasher.update(checksum.as_bytes());
            hasher.update(b"\0");
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }

    /// Entrypoints followed by datapoints, without duplicates
    pub fn targets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entrypoints
            .iter()
            .chain(&self.datapoints)
            .map(String::as_str)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Check the query is well formed: unique checksums, no dangling
    /// references or cycles, operator arity, and reported checksums that
    /// exist.
    pub fn validate(&self) -> Result<(), QueryError> {
        let mut index: HashMap<&str, &Node> = HashMap::new();
        for node in &self.code {
            if index.insert(node.checksum.as_str(), node).is_some() {
                return Err(QueryError::DuplicateChecksum(node.checksum.clone()));
            }
        }

        for node in &self.code {
            for reference in node.kind.references() {
                if !index.contains_key(reference) {
                    return Err(QueryError::DanglingReference {
                        from: node.checksum.clone(),
                        to: reference.to_string(),
                    });
                }
            }
            if let NodeKind::Operator { op, operands } = &node.kind {
                let (min, max) = op.arity();
                if operands.len() < min || max.is_some_and(|m| operands.len() > m) {
                    return Err(QueryError::Arity {
                        checksum: node.checksum.clone(),
                        op: format!("{op:?}").to_lowercase(),
                        expected: match max {
                            Some(m) if m == min => m.to_string(),
                            Some(m) => format!("{min}..{m}"),
                            None => format!("at least {min}"),
                        },
                        actual: operands.len(),
                    });
                }
            }
        }

        for (kind, list) in [("entrypoint", &self.entrypoints), ("datapoint", &self.datapoints)] {
            if let Some(missing) = list.iter().find(|c| !index.contains_key(c.as_str())) {
                return Err(QueryError::UnknownTarget {
                    kind,
                    checksum: missing.clone(),
                });
            }
        }

        let mut done = HashSet::new();
        for node in &self.code {
            check_acyclic(&index, &node.checksum, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }
}

fn check_acyclic<'a>(
    index: &HashMap<&str, &'a Node>,
    checksum: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Result<(), QueryError> {
    if done.contains(checksum) {
        return Ok(());
    }
    if path.contains(&checksum) {
        return Err(QueryError::Cycle(checksum.to_string()));
    }
    let Some(&node) = index.get(checksum) else {
        return Ok(());
    };
    path.push(checksum);
    for reference in node.kind.references() {
        check_acyclic(index, reference, path, done)?;
    }
    path.pop();
    done.insert(checksum);
    Ok(())
}
