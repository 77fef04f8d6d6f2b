//! Expansion of descriptor lists into a structural shape tree.
//!
//! The shape is what the table predicts for every subset; the decoder walks
//! it once per subset, reading delayed replication counts from the stream.
//! Width and scale operators (2-01, 2-02) are folded into the element
//! entries they govern, so every element carries its effective width, scale
//! and output type.

use crate::bits::all_ones;
use crate::error::{BufrError, BufrResult};
use crate::tables::{DescriptorTable, ElementEntry, ElementKind, Fxy};

/// Mnemonic given to a subset root when the descriptor list is not a single sequence.
pub const SUBSET_ROOT: &str = "SUBSET";

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeNode {
    Element(ElementEntry),
    Sequence {
        fxy: Fxy,
        mnemonic: String,
        children: Vec<ShapeNode>,
    },
    Replication {
        fxy: Fxy,
        mnemonic: String,
        count: ReplicationCount,
        body: Vec<ShapeNode>,
    },
    Operator(Operator),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationCount {
    Fixed(usize),
    /// Count read from the stream using this factor element.
    Delayed(ElementEntry),
}

impl ReplicationCount {
    /// Largest count the table allows.
    pub fn max(&self) -> usize {
        match self {
            ReplicationCount::Fixed(n) => *n,
            ReplicationCount::Delayed(factor) => {
                usize::try_from(all_ones(factor.width)).unwrap_or(usize::MAX)
            }
        }
    }
}

/// Data description operators (Table C) that consume data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// 2-05-YYY: YYY characters of inline text.
    Characters(usize),
    /// 2-06-YYY: the next descriptor is a local element of YYY bits.
    SkipLocal(usize),
}

impl ShapeNode {
    pub fn mnemonic(&self) -> Option<&str> {
        match self {
            ShapeNode::Element(e) => Some(&e.mnemonic),
            ShapeNode::Sequence { mnemonic, .. } | ShapeNode::Replication { mnemonic, .. } => {
                Some(mnemonic)
            }
            ShapeNode::Operator(_) => None,
        }
    }

    /// Structural children: sequence members or the replicated body.
    pub fn children(&self) -> &[ShapeNode] {
        match self {
            ShapeNode::Sequence { children, .. } => children,
            ShapeNode::Replication { body, .. } => body,
            _ => &[],
        }
    }
}

/// Compiled shape of one subset type.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    root: ShapeNode,
}

impl Shape {
    /// Expand a section 3 descriptor list through the table.
    pub fn compile(table: &DescriptorTable, descriptors: &[Fxy]) -> BufrResult<Self> {
        let mut active = Vec::new();
        let mut modifiers = Modifiers::default();
        let mut nodes = compile_list(table, descriptors, &mut active, &mut modifiers)?;

        let root = if matches!(nodes.as_slice(), [ShapeNode::Sequence { .. }]) {
            nodes.remove(0)
        } else {
            ShapeNode::Sequence {
                fxy: Fxy::default(),
                mnemonic: SUBSET_ROOT.to_string(),
                children: nodes,
            }
        };
        Ok(Self { root })
    }

    /// Shape of the table sequence named `mnemonic`.
    pub fn for_subset(table: &DescriptorTable, mnemonic: &str) -> BufrResult<Self> {
        let sequence = table
            .sequence_by_mnemonic(mnemonic)
            .ok_or_else(|| BufrError::UnknownDescriptor(mnemonic.to_string()))?;
        Self::compile(table, &[sequence.fxy])
    }

    pub fn root(&self) -> &ShapeNode {
        &self.root
    }

    pub fn root_mnemonic(&self) -> &str {
        self.root.mnemonic().unwrap_or(SUBSET_ROOT)
    }
}

/// Width and scale changes in effect at the current descriptor.
#[derive(Debug, Default)]
struct Modifiers {
    width: i32,
    scale: i32,
}

impl Modifiers {
    /// The entry as it is encoded under the active operators. Text, code and
    /// flag table elements are never adjusted.
    fn apply(&self, element: &ElementEntry) -> BufrResult<ElementEntry> {
        let adjustable = element.kind() == ElementKind::Numeric && !element.is_coded();
        if !adjustable || (self.width == 0 && self.scale == 0) {
            return Ok(element.clone());
        }

        let width = element.width as i32 + self.width;
        if !(1..=64).contains(&width) {
            return Err(BufrError::InvalidTable(format!(
                "element {} has effective width {} under operator 2-01",
                element.mnemonic, width
            )));
        }
        let mut adjusted = element.clone();
        adjusted.width = width as u32;
        adjusted.scale += self.scale;
        Ok(adjusted)
    }
}

fn compile_list(
    table: &DescriptorTable,
    descriptors: &[Fxy],
    active: &mut Vec<Fxy>,
    modifiers: &mut Modifiers,
) -> BufrResult<Vec<ShapeNode>> {
    let mut nodes = Vec::with_capacity(descriptors.len());
    let mut i = 0;

    while i < descriptors.len() {
        let fxy = descriptors[i];
        i += 1;

        match fxy.f {
            0 => {
                let element = table
                    .element(fxy)
                    .ok_or_else(|| BufrError::UnknownDescriptor(fxy.to_string()))?;
                nodes.push(ShapeNode::Element(modifiers.apply(element)?));
            }
            1 => {
                let count = if fxy.y == 0 {
                    let factor = descriptors.get(i).copied().ok_or_else(|| {
                        BufrError::InvalidTable(format!("{} has no delayed replication factor", fxy))
                    })?;
                    i += 1;
                    let entry = table
                        .element(factor)
                        .filter(|e| e.kind() == ElementKind::ReplicationFactor)
                        .ok_or_else(|| {
                            BufrError::InvalidTable(format!(
                                "{} follows {} but is not a replication factor",
                                factor, fxy
                            ))
                        })?;
                    ReplicationCount::Delayed(entry.clone())
                } else {
                    ReplicationCount::Fixed(fxy.y as usize)
                };

                let end = i + fxy.x as usize;
                if fxy.x == 0 || end > descriptors.len() {
                    return Err(BufrError::InvalidTable(format!(
                        "{} replicates {} descriptors but {} follow",
                        fxy,
                        fxy.x,
                        descriptors.len() - i
                    )));
                }
                let body = compile_list(table, &descriptors[i..end], active, modifiers)?;
                i = end;

                nodes.push(ShapeNode::Replication {
                    fxy,
                    mnemonic: replication_name(&body),
                    count,
                    body,
                });
            }
            2 => {
                // YYY = 0 cancels a width or scale change.
                let delta = if fxy.y == 0 { 0 } else { fxy.y as i32 - 128 };
                let op = match fxy.x {
                    1 => {
                        modifiers.width = delta;
                        continue;
                    }
                    2 => {
                        modifiers.scale = delta;
                        continue;
                    }
                    5 => Operator::Characters(fxy.y as usize),
                    6 => {
                        if i >= descriptors.len() {
                            return Err(BufrError::InvalidTable(format!(
                                "{} is not followed by a local descriptor",
                                fxy
                            )));
                        }
                        i += 1;
                        Operator::SkipLocal(fxy.y as usize)
                    }
                    _ => return Err(BufrError::UnsupportedOperator(fxy.to_string())),
                };
                nodes.push(ShapeNode::Operator(op));
            }
            _ => nodes.push(compile_sequence(table, fxy, active, modifiers)?),
        }
    }

    Ok(nodes)
}

fn compile_sequence(
    table: &DescriptorTable,
    fxy: Fxy,
    active: &mut Vec<Fxy>,
    modifiers: &mut Modifiers,
) -> BufrResult<ShapeNode> {
    let sequence = table
        .sequence(fxy)
        .ok_or_else(|| BufrError::UnknownDescriptor(fxy.to_string()))?;
    if active.contains(&fxy) {
        return Err(BufrError::InvalidTable(format!(
            "sequence {} ({}) contains itself",
            sequence.mnemonic, fxy
        )));
    }

    active.push(fxy);
    let children = compile_list(table, &sequence.descriptors, active, modifiers)?;
    active.pop();

    Ok(ShapeNode::Sequence {
        fxy,
        mnemonic: sequence.mnemonic.clone(),
        children,
    })
}

/// A replicated single element or sequence keeps its own name; larger
/// groups are named after their first member with a leading underscore.
fn replication_name(body: &[ShapeNode]) -> String {
    match body {
        [ShapeNode::Element(e)] => e.mnemonic.clone(),
        [ShapeNode::Sequence { mnemonic, .. }] => mnemonic.clone(),
        _ => {
            let first = body.iter().find_map(ShapeNode::mnemonic).unwrap_or("REPL");
            format!("_{}", first.trim_start_matches('_'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableBuilder;
    use bufr_common::ValueType;

    fn table() -> DescriptorTable {
        TableBuilder::new()
            .element(Fxy::new(0, 5, 2), "CLAT", "DEGREES", 2, -9000, 15)
            .element(Fxy::new(0, 6, 2), "CLON", "DEGREES", 2, -18000, 16)
            .element(Fxy::new(0, 2, 150), "CHNM", "NUMERIC", 0, 0, 6)
            .element(Fxy::new(0, 12, 163), "TMBR", "K", 2, 0, 16)
            .element(Fxy::new(0, 31, 1), "DRPF", "NUMERIC", 0, 0, 8)
            .sequence(
                Fxy::new(3, 50, 1),
                "BRIT",
                vec![Fxy::new(0, 2, 150), Fxy::new(0, 12, 163)],
            )
            .sequence(
                Fxy::new(3, 61, 1),
                "NC021023",
                vec![
                    Fxy::new(0, 5, 2),
                    Fxy::new(0, 6, 2),
                    Fxy::new(1, 1, 0),
                    Fxy::new(0, 31, 1),
                    Fxy::new(3, 50, 1),
                ],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_compile_subset() {
        let shape = Shape::for_subset(&table(), "NC021023").unwrap();
        assert_eq!(shape.root_mnemonic(), "NC021023");

        let children = shape.root().children();
        assert_eq!(children.len(), 3);
        match &children[2] {
            ShapeNode::Replication {
                mnemonic, count, ..
            } => {
                assert_eq!(mnemonic, "BRIT");
                assert_eq!(count.max(), 255);
            }
            other => panic!("expected replication, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_descriptor_list_gets_synthetic_root() {
        let shape = Shape::compile(&table(), &[Fxy::new(0, 5, 2), Fxy::new(0, 6, 2)]).unwrap();
        assert_eq!(shape.root_mnemonic(), SUBSET_ROOT);
        assert_eq!(shape.root().children().len(), 2);
    }

    #[test]
    fn test_group_replication_name() {
        let shape = Shape::compile(
            &table(),
            &[Fxy::new(1, 2, 3), Fxy::new(0, 2, 150), Fxy::new(0, 12, 163)],
        )
        .unwrap();
        match &shape.root().children()[0] {
            ShapeNode::Replication {
                mnemonic, count, ..
            } => {
                assert_eq!(mnemonic, "_CHNM");
                assert_eq!(count, &ReplicationCount::Fixed(3));
            }
            other => panic!("expected replication, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_descriptor() {
        let err = Shape::compile(&table(), &[Fxy::new(0, 7, 4)]).unwrap_err();
        assert!(matches!(err, BufrError::UnknownDescriptor(_)));
    }

    #[test]
    fn test_recursive_sequence_rejected() {
        let table = TableBuilder::new()
            .sequence(Fxy::new(3, 0, 1), "LOOP", vec![Fxy::new(3, 0, 1)])
            .build()
            .unwrap();
        assert!(Shape::compile(&table, &[Fxy::new(3, 0, 1)]).is_err());
    }

    #[test]
    fn test_unsupported_operator() {
        let err = Shape::compile(&table(), &[Fxy::new(2, 22, 0)]).unwrap_err();
        assert!(matches!(err, BufrError::UnsupportedOperator(_)));
    }

    fn element_at(shape: &Shape, index: usize) -> &ElementEntry {
        match &shape.root().children()[index] {
            ShapeNode::Element(e) => e,
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_scale_operator_folds_into_elements() {
        let table = TableBuilder::new()
            .element(Fxy::new(0, 7, 2), "HMSL", "M", 0, 0, 16)
            .build()
            .unwrap();
        let shape = Shape::compile(
            &table,
            &[
                Fxy::new(2, 2, 129),
                Fxy::new(0, 7, 2),
                Fxy::new(2, 2, 0),
                Fxy::new(0, 7, 2),
            ],
        )
        .unwrap();

        assert_eq!(shape.root().children().len(), 2);
        let scaled = element_at(&shape, 0);
        assert_eq!(scaled.scale, 1);
        assert_eq!(scaled.value_type(), ValueType::Float32);
        let restored = element_at(&shape, 1);
        assert_eq!(restored.scale, 0);
        assert_eq!(restored.value_type(), ValueType::Int32);
    }

    #[test]
    fn test_width_operator_skips_text_and_code_tables() {
        let table = TableBuilder::new()
            .element(Fxy::new(0, 1, 7), "SAID", "CODE TABLE", 0, 0, 10)
            .text_element(Fxy::new(0, 1, 19), "SITE", 4)
            .element(Fxy::new(0, 7, 2), "HMSL", "M", 0, 0, 16)
            .build()
            .unwrap();
        let shape = Shape::compile(
            &table,
            &[
                Fxy::new(2, 1, 136),
                Fxy::new(0, 1, 7),
                Fxy::new(0, 1, 19),
                Fxy::new(0, 7, 2),
            ],
        )
        .unwrap();

        assert_eq!(element_at(&shape, 0).width, 10);
        assert_eq!(element_at(&shape, 1).width, 32);
        assert_eq!(element_at(&shape, 2).width, 24);
    }

    #[test]
    fn test_operator_reaches_into_sequences() {
        let table = TableBuilder::new()
            .element(Fxy::new(0, 7, 2), "HMSL", "M", 0, 0, 16)
            .sequence(Fxy::new(3, 0, 2), "HEIGHT", vec![Fxy::new(0, 7, 2)])
            .build()
            .unwrap();
        let shape = Shape::compile(&table, &[Fxy::new(2, 2, 130), Fxy::new(3, 0, 2)]).unwrap();
        match &shape.root().children()[0] {
            ShapeNode::Sequence { children, .. } => {
                assert!(matches!(&children[0], ShapeNode::Element(e) if e.scale == 2));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_width_operator_out_of_range() {
        let table = TableBuilder::new()
            .element(Fxy::new(0, 7, 2), "HMSL", "M", 0, 0, 16)
            .build()
            .unwrap();
        let err = Shape::compile(&table, &[Fxy::new(2, 1, 100), Fxy::new(0, 7, 2)]).unwrap_err();
        assert!(matches!(err, BufrError::InvalidTable(_)));
    }
}
