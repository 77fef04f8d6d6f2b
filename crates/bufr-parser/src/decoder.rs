//! Value tree decoding for uncompressed and compressed data sections.

use serde::{Deserialize, Serialize};

use crate::bits::{all_ones, is_missing, BitReader};
use crate::error::{BufrError, BufrResult};
use crate::sections::Message;
use crate::shape::{Operator, ReplicationCount, Shape, ShapeNode};
use crate::tables::{DescriptorTable, ElementEntry, ElementKind, Fxy};
use crate::tree::Node;

/// What a batch decode does with a message that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Log the failure and continue with the next message.
    #[default]
    Skip,
    /// Stop and return the error.
    Abort,
}

/// Decode every subset of `message` into one root node each.
pub fn decode_message(message: &Message, table: &DescriptorTable) -> BufrResult<Vec<Node>> {
    let shape = Shape::compile(table, &message.description.descriptors)?;
    decode_with_shape(message, &shape)
}

/// Decode using an already compiled shape.
pub fn decode_with_shape(message: &Message, shape: &Shape) -> BufrResult<Vec<Node>> {
    let mut reader = BitReader::new(&message.data);
    let subsets = message.subset_count();

    let roots = if message.is_compressed() {
        let mut decoder = CompressedDecoder {
            reader: &mut reader,
            subsets,
        };
        decoder.decode_nodes(std::slice::from_ref(shape.root()))?
            .into_iter()
            .flatten()
            .collect()
    } else {
        let mut roots = Vec::with_capacity(subsets);
        for _ in 0..subsets {
            let mut decoder = SubsetDecoder {
                reader: &mut reader,
            };
            roots.extend(decoder.decode_nodes(std::slice::from_ref(shape.root()))?);
        }
        roots
    };

    tracing::trace!(
        subsets,
        compressed = message.is_compressed(),
        unused_bits = reader.remaining(),
        "Decoded message"
    );
    Ok(roots)
}

impl Message {
    pub fn decode(&self, table: &DescriptorTable) -> BufrResult<Vec<Node>> {
        decode_message(self, table)
    }
}

/// `(raw + reference) * 10^-scale`, using the element's effective scale.
fn numeric_value(raw: u64, element: &ElementEntry) -> f64 {
    let value = raw as f64 + element.reference as f64;
    if element.scale >= 0 {
        value / 10f64.powi(element.scale)
    } else {
        value * 10f64.powi(-element.scale)
    }
}

/// Byte length of a character element.
fn text_len(element: &ElementEntry) -> BufrResult<usize> {
    if element.width % 8 != 0 {
        return Err(BufrError::malformed(format!(
            "character element {} width {} is not a whole number of bytes",
            element.mnemonic, element.width
        )));
    }
    Ok(element.width as usize / 8)
}

fn text_value(bytes: &[u8]) -> Option<String> {
    if !bytes.is_empty() && bytes.iter().all(|b| *b == 0xFF) {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    Some(text.trim_end_matches([' ', '\0']).to_string())
}

/// A replicated single node is its own instance; groups are wrapped.
fn replication_instance(mnemonic: &str, fxy: Fxy, mut body: Vec<Node>) -> Node {
    if body.len() == 1 && body[0].mnemonic == mnemonic {
        if let Some(node) = body.pop() {
            return node;
        }
    }
    Node::sequence(mnemonic, fxy, body)
}

fn factor_count(value: u64, factor: &ElementEntry) -> BufrResult<usize> {
    let count = i64::try_from(value)
        .ok()
        .and_then(|v| v.checked_add(factor.reference))
        .and_then(|count| usize::try_from(count).ok());
    count.ok_or_else(|| {
        BufrError::malformed(format!(
            "replication count {} + {} from {} is out of range",
            value, factor.reference, factor.mnemonic
        ))
    })
}

// ===== Uncompressed =====

struct SubsetDecoder<'r, 'a> {
    reader: &'r mut BitReader<'a>,
}

impl SubsetDecoder<'_, '_> {
    fn decode_nodes(&mut self, nodes: &[ShapeNode]) -> BufrResult<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                ShapeNode::Element(element) => out.push(self.decode_element(element)?),
                ShapeNode::Sequence {
                    fxy,
                    mnemonic,
                    children,
                } => {
                    let children = self.decode_nodes(children)?;
                    out.push(Node::sequence(mnemonic, *fxy, children));
                }
                ShapeNode::Replication {
                    fxy,
                    mnemonic,
                    count,
                    body,
                } => {
                    let count = match count {
                        ReplicationCount::Fixed(n) => *n,
                        ReplicationCount::Delayed(factor) => {
                            let raw = self.reader.read(factor.width)?;
                            factor_count(raw, factor)?
                        }
                    };
                    let mut instances = Vec::new();
                    for _ in 0..count {
                        let decoded = self.decode_nodes(body)?;
                        instances.push(replication_instance(mnemonic, *fxy, decoded));
                    }
                    out.push(Node::replication(mnemonic, *fxy, instances));
                }
                ShapeNode::Operator(op) => self.apply(*op)?,
            }
        }
        Ok(out)
    }

    fn decode_element(&mut self, element: &ElementEntry) -> BufrResult<Node> {
        if element.kind() == ElementKind::String {
            let bytes = self.reader.read_bytes(text_len(element)?)?;
            return Ok(Node::text(&element.mnemonic, element.fxy, text_value(&bytes)));
        }

        let raw = self.reader.read(element.width)?;
        let value = (!is_missing(raw, element.width)).then(|| numeric_value(raw, element));
        Ok(Node::numeric(&element.mnemonic, element.fxy, value))
    }

    fn apply(&mut self, op: Operator) -> BufrResult<()> {
        match op {
            Operator::Characters(count) => self.reader.skip(count * 8)?,
            Operator::SkipLocal(bits) => self.reader.skip(bits)?,
        }
        Ok(())
    }
}

// ===== Compressed =====

/// Walks the shape once for all subsets; every element is stored as a
/// reference value, an increment width, and one increment per subset.
struct CompressedDecoder<'r, 'a> {
    reader: &'r mut BitReader<'a>,
    subsets: usize,
}

impl CompressedDecoder<'_, '_> {
    /// Returns the decoded nodes per subset.
    fn decode_nodes(&mut self, nodes: &[ShapeNode]) -> BufrResult<Vec<Vec<Node>>> {
        let mut out: Vec<Vec<Node>> = (0..self.subsets).map(|_| Vec::new()).collect();
        for node in nodes {
            match node {
                ShapeNode::Element(element) => {
                    for (subset, value) in self.decode_element(element)?.into_iter().enumerate() {
                        out[subset].push(value);
                    }
                }
                ShapeNode::Sequence {
                    fxy,
                    mnemonic,
                    children,
                } => {
                    for (subset, children) in self.decode_nodes(children)?.into_iter().enumerate() {
                        out[subset].push(Node::sequence(mnemonic, *fxy, children));
                    }
                }
                ShapeNode::Replication {
                    fxy,
                    mnemonic,
                    count,
                    body,
                } => {
                    let count = match count {
                        ReplicationCount::Fixed(n) => *n,
                        ReplicationCount::Delayed(factor) => self.read_factor(factor)?,
                    };
                    let mut instances: Vec<Vec<Node>> =
                        (0..self.subsets).map(|_| Vec::with_capacity(count)).collect();
                    for _ in 0..count {
                        for (subset, decoded) in self.decode_nodes(body)?.into_iter().enumerate() {
                            instances[subset].push(replication_instance(mnemonic, *fxy, decoded));
                        }
                    }
                    for (subset, instances) in instances.into_iter().enumerate() {
                        out[subset].push(Node::replication(mnemonic, *fxy, instances));
                    }
                }
                ShapeNode::Operator(op) => self.apply(*op)?,
            }
        }
        Ok(out)
    }

    fn decode_element(&mut self, element: &ElementEntry) -> BufrResult<Vec<Node>> {
        if element.kind() == ElementKind::String {
            let base = self.reader.read_bytes(text_len(element)?)?;
            let nbinc = self.reader.read(6)? as usize;
            let mut nodes = Vec::with_capacity(self.subsets);
            for _ in 0..self.subsets {
                let value = if nbinc == 0 {
                    text_value(&base)
                } else {
                    text_value(&self.reader.read_bytes(nbinc)?)
                };
                nodes.push(Node::text(&element.mnemonic, element.fxy, value));
            }
            return Ok(nodes);
        }

        let values = self.read_compressed(element.width)?;
        Ok(values
            .into_iter()
            .map(|raw| {
                let value = raw.map(|raw| numeric_value(raw, element));
                Node::numeric(&element.mnemonic, element.fxy, value)
            })
            .collect())
    }

    /// Raw per-subset values, None where missing. A missing base makes
    /// every subset missing whatever the increments hold.
    fn read_compressed(&mut self, width: u32) -> BufrResult<Vec<Option<u64>>> {
        let base = self.reader.read(width)?;
        let nbinc = self.reader.read(6)? as u32;
        let base_missing = is_missing(base, width);

        if nbinc == 0 {
            return Ok(vec![(!base_missing).then_some(base); self.subsets]);
        }
        if nbinc > width {
            return Err(BufrError::malformed(format!(
                "increment width {} exceeds element width {}",
                nbinc, width
            )));
        }

        let mut values = Vec::with_capacity(self.subsets);
        for _ in 0..self.subsets {
            let increment = self.reader.read(nbinc)?;
            if base_missing || increment == all_ones(nbinc) {
                values.push(None);
                continue;
            }
            let value = base.checked_add(increment).ok_or_else(|| {
                BufrError::malformed(format!(
                    "compressed value {} + {} overflows {} bits",
                    base, increment, width
                ))
            })?;
            values.push(Some(value));
        }
        Ok(values)
    }

    /// Delayed replication factors must agree across subsets.
    fn read_factor(&mut self, factor: &ElementEntry) -> BufrResult<usize> {
        let values = self.read_compressed(factor.width)?;
        let first = values.first().copied().flatten();
        if values.iter().any(|v| *v != first) {
            return Err(BufrError::malformed(format!(
                "replication factor {} differs between compressed subsets",
                factor.mnemonic
            )));
        }
        match first {
            Some(raw) => factor_count(raw, factor),
            None if self.subsets == 0 => Ok(0),
            None => Err(BufrError::malformed(format!(
                "replication factor {} is missing",
                factor.mnemonic
            ))),
        }
    }

    fn apply(&mut self, op: Operator) -> BufrResult<()> {
        match op {
            Operator::Characters(count) => {
                self.reader.skip(count * 8)?;
                let nbinc = self.reader.read(6)? as usize;
                self.reader.skip(nbinc * 8 * self.subsets)?;
            }
            Operator::SkipLocal(bits) => {
                self.reader.skip(bits)?;
                let nbinc = self.reader.read(6)? as usize;
                self.reader.skip(nbinc * self.subsets)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(scale: i32, reference: i64, width: u32) -> ElementEntry {
        ElementEntry {
            fxy: Fxy::new(0, 7, 2),
            mnemonic: "HMSL".to_string(),
            name: String::new(),
            unit: "M".to_string(),
            scale,
            reference,
            width,
            kind: None,
        }
    }

    #[test]
    fn test_numeric_value() {
        // CLAT: scale 2, reference -9000
        let v = numeric_value(25679, &element(2, -9000, 15));
        assert!((v - 166.79).abs() < 1e-9);
        assert_eq!(numeric_value(12, &element(-1, 0, 8)), 120.0);
        assert_eq!(numeric_value(2020, &element(0, 0, 12)), 2020.0);
    }

    #[test]
    fn test_numeric_value_full_width() {
        let raw = 1u64 << 63;
        assert_eq!(numeric_value(raw, &element(0, 0, 64)), 9_223_372_036_854_775_808.0);
    }

    #[test]
    fn test_factor_count_range() {
        let factor = element(0, 0, 64);
        assert_eq!(factor_count(3, &factor).unwrap(), 3);
        assert!(factor_count(u64::MAX, &factor).is_err());
        assert!(factor_count(1, &element(0, -2, 8)).is_err());
    }

    #[test]
    fn test_text_len() {
        assert_eq!(text_len(&element(0, 0, 64)).unwrap(), 8);
        assert!(text_len(&element(0, 0, 12)).is_err());
    }

    #[test]
    fn test_text_value() {
        assert_eq!(text_value(b"KBOS    ").as_deref(), Some("KBOS"));
        assert_eq!(text_value(&[0xFF, 0xFF]), None);
        assert_eq!(text_value(b"AB\0\0").as_deref(), Some("AB"));
    }
}
