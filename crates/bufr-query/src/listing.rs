//! Enumerating the query paths a subset shape supports.

use std::collections::HashMap;

use bufr_common::ValueType;
use bufr_parser::{Shape, ShapeNode};

/// One addressable element.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInfo {
    pub path: String,
    /// Number of repeating dimensions below the record dimension.
    pub dims: usize,
    pub value_type: ValueType,
}

/// Every element path under `shape`, in table order.
pub fn list_queries(shape: &Shape) -> Vec<QueryInfo> {
    let mut out = Vec::new();
    // (children, path prefix, repeating dimensions so far)
    let mut stack: Vec<(&[ShapeNode], String, usize)> =
        vec![(shape.root().children(), "*".to_string(), 0)];

    while let Some((children, prefix, dims)) = stack.pop() {
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for name in children.iter().filter_map(ShapeNode::mnemonic) {
            *totals.entry(name).or_insert(0) += 1;
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut pending = Vec::new();
        for child in children {
            let Some(name) = child.mnemonic() else {
                continue;
            };
            let ordinal = seen.entry(name).or_insert(0);
            *ordinal += 1;
            let segment = if totals.get(name).copied().unwrap_or(0) > 1 {
                format!("{}{{{}}}", name, ordinal)
            } else {
                name.to_string()
            };
            let path = format!("{}/{}", prefix, segment);

            match child {
                ShapeNode::Element(e) => out.push(QueryInfo {
                    path,
                    dims,
                    value_type: e.value_type(),
                }),
                ShapeNode::Sequence { children, .. } => pending.push((children.as_slice(), path, dims)),
                ShapeNode::Replication { mnemonic, body, .. } => match body.as_slice() {
                    [ShapeNode::Element(e)] if &e.mnemonic == mnemonic => out.push(QueryInfo {
                        path,
                        dims: dims + 1,
                        value_type: e.value_type(),
                    }),
                    [ShapeNode::Sequence {
                        mnemonic: inner,
                        children,
                        ..
                    }] if inner == mnemonic => pending.push((children.as_slice(), path, dims + 1)),
                    _ => pending.push((body.as_slice(), path, dims + 1)),
                },
                ShapeNode::Operator(_) => {}
            }
        }

        // Depth-first, preserving table order.
        stack.extend(pending.into_iter().rev());
    }

    out
}
