//! Decoded value tree.

use std::collections::HashMap;

use crate::tables::Fxy;

/// One occurrence of one descriptor within one decoded subset.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub mnemonic: String,
    pub fxy: Fxy,
    /// 1-based position among siblings with the same mnemonic.
    pub ordinal: usize,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Decoded number, None when the bits were all ones.
    Numeric(Option<f64>),
    /// Character data, None when the bits were all ones.
    Text(Option<String>),
    Sequence(Vec<Node>),
    /// Replicated group; each instance carries the group's mnemonic.
    Replication(Vec<Node>),
}

impl Node {
    pub fn numeric(mnemonic: &str, fxy: Fxy, value: Option<f64>) -> Self {
        Self::with_kind(mnemonic, fxy, NodeKind::Numeric(value))
    }

    pub fn text(mnemonic: &str, fxy: Fxy, value: Option<String>) -> Self {
        Self::with_kind(mnemonic, fxy, NodeKind::Text(value))
    }

    pub fn sequence(mnemonic: &str, fxy: Fxy, mut children: Vec<Node>) -> Self {
        assign_ordinals(&mut children);
        Self::with_kind(mnemonic, fxy, NodeKind::Sequence(children))
    }

    pub fn replication(mnemonic: &str, fxy: Fxy, mut instances: Vec<Node>) -> Self {
        for (i, instance) in instances.iter_mut().enumerate() {
            instance.ordinal = i + 1;
        }
        Self::with_kind(mnemonic, fxy, NodeKind::Replication(instances))
    }

    fn with_kind(mnemonic: &str, fxy: Fxy, kind: NodeKind) -> Self {
        Self {
            mnemonic: mnemonic.to_string(),
            fxy,
            ordinal: 1,
            kind,
        }
    }

    /// Child nodes: sequence members or replication instances.
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Sequence(children) | NodeKind::Replication(children) => children,
            _ => &[],
        }
    }

    pub fn is_replication(&self) -> bool {
        matches!(self.kind, NodeKind::Replication(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, NodeKind::Numeric(None) | NodeKind::Text(None))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.kind {
            NodeKind::Numeric(v) => *v,
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(v) => v.as_deref(),
            _ => None,
        }
    }

    /// First descendant (depth-first, in tree order) named `mnemonic`.
    pub fn find(&self, mnemonic: &str) -> Option<&Node> {
        let mut stack: Vec<&Node> = self.children().iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.mnemonic == mnemonic {
                return Some(node);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children());
        }
        count
    }
}

fn assign_ordinals(children: &mut [Node]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for child in children.iter_mut() {
        let count = seen.entry(child.mnemonic.clone()).or_insert(0);
        *count += 1;
        child.ordinal = *count;
    }
}
