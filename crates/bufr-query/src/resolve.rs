//! Path resolution against table shapes and decoded trees.
//!
//! A segment searches the descendants of the previous match. Plain
//! sequences are transparent, but a replication must be named by a segment
//! to be crossed; each instance of a named replication is one match.

use bufr_common::ValueType;
use bufr_parser::{Node, NodeKind, ShapeNode};

use crate::path::{QueryPath, Segment};

/// What a path resolves to under one subset shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Per segment after the root: does it add a dimension?
    pub repeating: Vec<bool>,
    pub value_type: ValueType,
}

/// A match found in the table shape.
struct ShapeMatch<'a> {
    node: &'a ShapeNode,
    /// Upper bound on how many nodes this match stands for.
    max_count: usize,
    replicated: bool,
}

/// Direct and transparent-descendant matches of `segment` below `node`.
fn shape_matches<'a>(node: &'a ShapeNode, segment: &Segment) -> Vec<ShapeMatch<'a>> {
    let mut matches = Vec::new();
    let mut stack: Vec<&ShapeNode> = node.children().iter().rev().collect();

    while let Some(child) = stack.pop() {
        match child {
            ShapeNode::Operator(_) => {}
            ShapeNode::Element(e) => {
                if segment.accepts(&e.mnemonic) {
                    matches.push(ShapeMatch {
                        node: child,
                        max_count: 1,
                        replicated: false,
                    });
                }
            }
            ShapeNode::Sequence {
                mnemonic, children, ..
            } => {
                if segment.accepts(mnemonic) {
                    matches.push(ShapeMatch {
                        node: child,
                        max_count: 1,
                        replicated: false,
                    });
                } else if segment != &Segment::Any {
                    stack.extend(children.iter().rev());
                }
            }
            ShapeNode::Replication {
                mnemonic, count, ..
            } => {
                if segment.accepts(mnemonic) {
                    matches.push(ShapeMatch {
                        node: child,
                        max_count: count.max(),
                        replicated: true,
                    });
                }
            }
        }
    }
    matches
}

/// Element entry reached by a shape match, if it is a leaf.
fn shape_leaf(node: &ShapeNode) -> Option<ValueType> {
    match node {
        ShapeNode::Element(e) => Some(e.value_type()),
        ShapeNode::Replication { body, mnemonic, .. } => match body.as_slice() {
            [ShapeNode::Element(e)] if &e.mnemonic == mnemonic => Some(e.value_type()),
            _ => None,
        },
        _ => None,
    }
}

/// Validate `path` against one subset shape.
pub fn plan(path: &QueryPath, root: &ShapeNode) -> Result<Plan, String> {
    let segments = path.segments();
    let root_name = root.mnemonic().unwrap_or_default();
    if !segments[0].accepts(root_name) {
        return Err(format!("subset {} does not match '{}'", root_name, segments[0]));
    }
    if segments[0].index().is_some_and(|n| n > 1) {
        return Err(format!("subset root {} occurs once per record", root_name));
    }

    let mut current: Vec<&ShapeNode> = vec![root];
    let mut repeating = Vec::with_capacity(segments.len() - 1);

    for segment in &segments[1..] {
        let mut found = Vec::new();
        for &node in &current {
            found.extend(shape_matches(node, segment));
        }
        if found.is_empty() {
            return Err(format!("'{}' is not reachable from '{}'", segment, current_names(&current)));
        }

        let max: usize = found.iter().map(|m| m.max_count).fold(0, usize::saturating_add);
        match segment.index() {
            Some(n) if n > max => {
                return Err(format!("index {} exceeds the maximum of {} for '{}'", n, max, segment));
            }
            Some(_) => repeating.push(false),
            None => repeating.push(found.len() > 1 || found.iter().any(|m| m.replicated)),
        }
        current = found.into_iter().map(|m| m.node).collect();
    }

    let value_type = current
        .iter()
        .map(|node| shape_leaf(node))
        .collect::<Option<Vec<_>>>()
        .and_then(|types| types.first().copied())
        .ok_or_else(|| format!("'{}' does not name an element", segments[segments.len() - 1]))?;

    Ok(Plan {
        repeating,
        value_type,
    })
}

fn current_names(nodes: &[&ShapeNode]) -> String {
    nodes
        .iter()
        .filter_map(|n| n.mnemonic())
        .collect::<Vec<_>>()
        .join(",")
}

// ===== Concrete resolution =====

/// A leaf value reached by a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(Option<f64>),
    Text(Option<String>),
}

/// Matches of `segment` below a decoded node, in tree order.
fn tree_matches<'a>(node: &'a Node, segment: &Segment) -> Vec<&'a Node> {
    let mut matches = Vec::new();
    let mut stack: Vec<&Node> = node.children().iter().rev().collect();

    while let Some(child) = stack.pop() {
        match &child.kind {
            NodeKind::Replication(instances) => {
                if segment.accepts(&child.mnemonic) {
                    matches.extend(instances.iter());
                }
            }
            NodeKind::Sequence(children) => {
                if segment.accepts(&child.mnemonic) {
                    matches.push(child);
                } else if segment != &Segment::Any {
                    stack.extend(children.iter().rev());
                }
            }
            NodeKind::Numeric(_) | NodeKind::Text(_) => {
                if segment.accepts(&child.mnemonic) {
                    matches.push(child);
                }
            }
        }
    }
    matches
}

/// Resolve `path` over one subset tree.
///
/// Returns one `(coordinates, value)` pair per reached leaf, where the
/// coordinates hold a 0-based position for each repeating segment. An
/// indexed segment with too few matches contributes nothing.
pub fn resolve(root: &Node, path: &QueryPath, repeating: &[bool]) -> Vec<(Vec<usize>, Value)> {
    let segments = path.segments();
    let mut out = Vec::new();
    if !segments[0].accepts(&root.mnemonic) || segments[0].index().is_some_and(|n| n > 1) {
        return out;
    }

    // (node, next segment, coordinates so far)
    let mut stack: Vec<(&Node, usize, Vec<usize>)> = vec![(root, 1, Vec::new())];

    while let Some((node, seg_idx, coords)) = stack.pop() {
        if seg_idx == segments.len() {
            match &node.kind {
                NodeKind::Numeric(v) => out.push((coords, Value::Numeric(*v))),
                NodeKind::Text(v) => out.push((coords, Value::Text(v.clone()))),
                _ => {}
            }
            continue;
        }

        let segment = &segments[seg_idx];
        let matches = tree_matches(node, segment);
        let repeats = repeating.get(seg_idx - 1).copied().unwrap_or(false);

        if let Some(n) = segment.index() {
            if let Some(selected) = matches.get(n - 1).copied() {
                stack.push((selected, seg_idx + 1, coords));
            }
        } else if repeats {
            for (i, m) in matches.iter().enumerate().rev() {
                let mut next = coords.clone();
                next.push(i);
                stack.push((*m, seg_idx + 1, next));
            }
        } else if let Some(first) = matches.first().copied() {
            stack.push((first, seg_idx + 1, coords));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_parser::{Fxy, Shape};
    use test_utils::sample_table;

    fn nc021023() -> Shape {
        Shape::for_subset(&sample_table(), "NC021023").unwrap()
    }

    fn path(text: &str) -> QueryPath {
        QueryPath::parse(text).unwrap()
    }

    #[test]
    fn test_plan_scalar() {
        let plan = plan(&path("*/CLAT"), nc021023().root()).unwrap();
        assert_eq!(plan.repeating, vec![false]);
        assert_eq!(plan.value_type, ValueType::Float32);
    }

    #[test]
    fn test_plan_through_transparent_sequence() {
        let plan = plan(&path("*/YEAR"), nc021023().root()).unwrap();
        assert_eq!(plan.value_type, ValueType::Int32);
        let plan = super::plan(&path("NC021023/YYMMDD/YEAR"), nc021023().root()).unwrap();
        assert_eq!(plan.repeating, vec![false, false]);
    }

    #[test]
    fn test_plan_replication() {
        let plan = plan(&path("*/BRIT/TMBR"), nc021023().root()).unwrap();
        assert_eq!(plan.repeating, vec![true, false]);
        let plan = super::plan(&path("*/BRIT{3}/TMBR"), nc021023().root()).unwrap();
        assert_eq!(plan.repeating, vec![false, false]);
    }

    #[test]
    fn test_replication_must_be_named() {
        let err = plan(&path("*/TMBR"), nc021023().root()).unwrap_err();
        assert!(err.contains("not reachable"));
    }

    #[test]
    fn test_index_above_table_maximum() {
        // DRPF is 8 bits wide: at most 255 repeats.
        assert!(plan(&path("*/BRIT{255}/TMBR"), nc021023().root()).is_ok());
        assert!(plan(&path("*/BRIT{256}/TMBR"), nc021023().root()).is_err());
        assert!(plan(&path("*/CLAT{2}"), nc021023().root()).is_err());
    }

    #[test]
    fn test_sequence_is_not_a_leaf() {
        assert!(plan(&path("*/BRIT"), nc021023().root()).is_err());
    }

    #[test]
    fn test_resolve_repeating() {
        let f = Fxy::new(0, 0, 0);
        let instance = |ch: f64, tb: Option<f64>| {
            Node::sequence(
                "BRIT",
                f,
                vec![Node::numeric("CHNM", f, Some(ch)), Node::numeric("TMBR", f, tb)],
            )
        };
        let root = Node::sequence(
            "NC021023",
            f,
            vec![
                Node::numeric("CLAT", f, Some(10.0)),
                Node::replication("BRIT", f, vec![instance(1.0, Some(200.0)), instance(2.0, None)]),
            ],
        );

        let all = resolve(&root, &path("*/BRIT/TMBR"), &[true, false]);
        assert_eq!(
            all,
            vec![
                (vec![0], Value::Numeric(Some(200.0))),
                (vec![1], Value::Numeric(None)),
            ]
        );

        let second = resolve(&root, &path("*/BRIT{2}/CHNM"), &[false, false]);
        assert_eq!(second, vec![(vec![], Value::Numeric(Some(2.0)))]);

        let absent = resolve(&root, &path("*/BRIT{5}/CHNM"), &[false, false]);
        assert!(absent.is_empty());

        let other_root = resolve(&root, &path("NC000001/CLAT"), &[false]);
        assert!(other_root.is_empty());
    }
}
