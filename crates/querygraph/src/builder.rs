//! Programmatic construction of compiled queries.

use crate::query::{BlockOp, CompiledQuery, Node, NodeKind, Operator};
use std::collections::{BTreeMap, HashSet};

/// Content checksum of a node: blake3 over its canonical JSON, truncated to
/// 16 hex characters. Since operands are referenced by checksum, equal
/// sub-expressions get equal checksums.
pub fn checksum_of(kind: &NodeKind) -> String {
    let canonical = serde_json::to_vec(kind).unwrap_or_default();
    blake3::hash(&canonical).to_hex().as_str()[..16].to_string()
}

/// Builds a [`CompiledQuery`] node by node.
///
/// ```
/// use querygraph::{Operator, QueryBuilder};
///
/// let mut q = QueryBuilder::new();
/// let path = q.literal("/etc/passwd");
/// let file = q.resource("file", &[("path", &path)]);
/// let size = q.field(&file, "size");
/// let zero = q.literal(0);
/// let check = q.op(Operator::Gt, &[&size, &zero]);
/// q.entrypoint(&check, "file(\"/etc/passwd\").size > 0");
/// q.datapoint(&size, "file(\"/etc/passwd\").size");
///
/// let query = q.build();
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct QueryBuilder {
    code: Vec<Node>,
    known: HashSet<String>,
    entrypoints: Vec<String>,
    datapoints: Vec<String>,
    labels: BTreeMap<String, String>,
    props: BTreeMap<String, serde_json::Value>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(&mut self, value: impl Into<serde_json::Value>) -> String {
        self.add(NodeKind::Literal {
            value: value.into(),
        })
    }

    /// A resource constructed from `(argument, checksum)` pairs
    pub fn resource(&mut self, name: &str, args: &[(&str, &str)]) -> String {
        self.add(NodeKind::Resource {
            resource: name.to_string(),
            args: args
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        })
    }

    pub fn field(&mut self, target: &str, field: &str) -> String {
        self.add(NodeKind::Field {
            target: target.to_string(),
            field: field.to_string(),
        })
    }

    pub fn op(&mut self, op: Operator, operands: &[&str]) -> String {
        self.add(NodeKind::Operator {
            op,
            operands: operands.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    pub fn property(&mut self, name: &str) -> String {
        self.add(NodeKind::Property {
            name: name.to_string(),
        })
    }

    /// The element bound by the block named `name`
    pub fn binding(&mut self, name: &str) -> String {
        self.add(NodeKind::Binding {
            name: name.to_string(),
        })
    }

    /// Run `body` once per element of `target`, with the element bound to
    /// `bind`
    pub fn block(&mut self, op: BlockOp, target: &str, bind: &str, body: &str) -> String {
        self.add(NodeKind::Block {
            op,
            target: target.to_string(),
            bind: bind.to_string(),
            body: body.to_string(),
        })
    }

    /// Default value for a property
    pub fn prop(&mut self, name: &str, value: impl Into<serde_json::Value>) -> &mut Self {
        self.props.insert(name.to_string(), value.into());
        self
    }

    pub fn entrypoint(&mut self, checksum: &str, label: &str) -> &mut Self {
        push_unique(&mut self.entrypoints, checksum);
        self.label(checksum, label)
    }

    pub fn datapoint(&mut self, checksum: &str, label: &str) -> &mut Self {
        push_unique(&mut self.datapoints, checksum);
        self.label(checksum, label)
    }

    fn label(&mut self, checksum: &str, label: &str) -> &mut Self {
        if !label.is_empty() {
            self.labels.insert(checksum.to_string(), label.to_string());
        }
        self
    }

    pub fn build(self) -> CompiledQuery {
        let mut query = CompiledQuery {
            checksum: String::new(),
            code: self.code,
            entrypoints: self.entrypoints,
            datapoints: self.datapoints,
            labels: self.labels,
            props: self.props,
        };
        query.checksum = query.query_checksum();
        query
    }

    fn add(&mut self, kind: NodeKind) -> String {
        let checksum = checksum_of(&kind);
        if self.known.insert(checksum.clone()) {
            self.code.push(Node {
                checksum: checksum.clone(),
                kind,
            });
        }
        checksum
    }
}

fn push_unique(list: &mut Vec<String>, checksum: &str) {
    if !list.iter().any(|c| c == checksum) {
        list.push(checksum.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_subexpressions_share_checksum() {
        let mut q = QueryBuilder::new();
        let a = q.literal("/etc/passwd");
        let b = q.literal("/etc/passwd");
        assert_eq!(a, b);

        let f1 = q.resource("file", &[("path", &a)]);
        let f2 = q.resource("file", &[("path", &b)]);
        assert_eq!(f1, f2);
        assert_eq!(q.field(&f1, "size"), q.field(&f2, "size"));

        let query = q.build();
        assert_eq!(query.code.len(), 3);
    }

    #[test]
    fn test_checksums_differ_by_content() {
        let mut q = QueryBuilder::new();
        let one = q.literal(1);
        let two = q.literal(2);
        let text = q.literal("1");
        assert_ne!(one, two);
        assert_ne!(one, text);
        assert_eq!(one.len(), 16);
    }

    #[test]
    fn test_block_over_binding() {
        let mut q = QueryBuilder::new();
        let list = q.literal(serde_json::json!(["a", "b"]));
        let it = q.binding("_");
        let a = q.literal("a");
        let is_a = q.op(Operator::Eq, &[&it, &a]);
        let any = q.block(BlockOp::Any, &list, "_", &is_a);
        let none = q.block(BlockOp::None, &list, "_", &is_a);
        assert_ne!(any, none);
        assert_eq!(q.binding("_"), it);

        let query = q.build();
        assert!(query.validate().is_ok());
        assert_eq!(query.code.len(), 6);
    }

    #[test]
    fn test_build_is_valid_and_deduplicates_targets() {
        let mut q = QueryBuilder::new();
        let t = q.literal(true);
        q.entrypoint(&t, "true");
        q.entrypoint(&t, "");
        q.datapoint(&t, "");
        q.prop("min", 3);
        let query = q.build();

        assert!(query.validate().is_ok());
        assert_eq!(query.entrypoints.len(), 1);
        assert_eq!(query.label(&t), Some("true"));
        assert_eq!(query.props["min"], serde_json::json!(3));
        assert!(!query.checksum.is_empty());
    }
}
