//! Descriptor tables (BUFR Tables B and D).
//!
//! Tables are loaded from YAML and are immutable once built:
//!
//! ```yaml
//! elements:
//!   - {fxy: "0-05-002", mnemonic: CLAT, name: Latitude, unit: DEGREES, scale: 2, reference: -9000, width: 15}
//! sequences:
//!   - {fxy: "3-61-001", mnemonic: NC021023, name: AMSU-A, descriptors: ["0-05-002", "1-01-000", ...]}
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use bufr_common::ValueType;
use serde::{Deserialize, Serialize};

use crate::error::{BufrError, BufrResult};

/// A packed descriptor: F (2 bits), X (6 bits), Y (8 bits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fxy {
    pub f: u8,
    pub x: u8,
    pub y: u8,
}

impl Fxy {
    pub const fn new(f: u8, x: u8, y: u8) -> Self {
        Self { f, x, y }
    }

    /// Decode the 16-bit form used in section 3.
    pub fn from_u16(raw: u16) -> Self {
        Self {
            f: (raw >> 14) as u8,
            x: ((raw >> 8) & 0x3F) as u8,
            y: (raw & 0xFF) as u8,
        }
    }

    pub fn to_u16(self) -> u16 {
        ((self.f as u16 & 0x3) << 14) | ((self.x as u16 & 0x3F) << 8) | self.y as u16
    }

    pub fn is_element(&self) -> bool {
        self.f == 0
    }

    pub fn is_sequence(&self) -> bool {
        self.f == 3
    }

    /// Class 31 delayed replication factors (0-31-000, 0-31-001, 0-31-002).
    pub fn is_delayed_factor(&self) -> bool {
        self.f == 0 && self.x == 31 && self.y <= 2
    }
}

impl fmt::Display for Fxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:03}", self.f, self.x, self.y)
    }
}

impl FromStr for Fxy {
    type Err = BufrError;

    /// Accepts `F-XX-YYY` and `FXXYYY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        let invalid = || BufrError::InvalidTable(format!("invalid descriptor '{}'", s));

        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if s.contains('-') {
            let parts: Vec<&str> = s.split('-').collect();
            if parts.len() != 3 || parts[0].len() != 1 || parts[1].len() != 2 || parts[2].len() != 3 {
                return Err(invalid());
            }
        }

        let f: u8 = digits[0..1].parse().map_err(|_| invalid())?;
        let x: u8 = digits[1..3].parse().map_err(|_| invalid())?;
        let y: u16 = digits[3..6].parse().map_err(|_| invalid())?;
        if f > 3 || x > 63 || y > 255 {
            return Err(invalid());
        }
        Ok(Fxy::new(f, x, y as u8))
    }
}

impl TryFrom<String> for Fxy {
    type Error = BufrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fxy> for String {
    fn from(value: Fxy) -> Self {
        value.to_string()
    }
}

/// How an element's bits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Numeric,
    String,
    ReplicationFactor,
}

/// Table B entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub fxy: Fxy,
    pub mnemonic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub scale: i32,
    #[serde(default)]
    pub reference: i64,
    pub width: u32,
    #[serde(default)]
    pub kind: Option<ElementKind>,
}

impl ElementEntry {
    pub fn kind(&self) -> ElementKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        if self.fxy.is_delayed_factor() {
            ElementKind::ReplicationFactor
        } else if is_character_unit(&self.unit) {
            ElementKind::String
        } else {
            ElementKind::Numeric
        }
    }

    /// Output type for decoded values of this element.
    pub fn value_type(&self) -> ValueType {
        match self.kind() {
            ElementKind::String => ValueType::Text,
            _ if self.scale > 0 => ValueType::Float32,
            _ if self.width > 31 => ValueType::Int64,
            _ => ValueType::Int32,
        }
    }

    /// Code and flag tables are not affected by the width/scale operators.
    pub fn is_coded(&self) -> bool {
        let unit = self.unit.to_ascii_uppercase();
        unit.contains("CODE TABLE") || unit.contains("FLAG TABLE")
    }
}

fn is_character_unit(unit: &str) -> bool {
    let unit = unit.to_ascii_uppercase();
    unit == "CCITT IA5" || unit == "CCITT_IA5" || unit == "CHARACTER"
}

/// Table D entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub fxy: Fxy,
    pub mnemonic: String,
    #[serde(default)]
    pub name: String,
    pub descriptors: Vec<Fxy>,
}

#[derive(Debug, Default, Deserialize)]
struct TableDocument {
    #[serde(default)]
    elements: Vec<ElementEntry>,
    #[serde(default)]
    sequences: Vec<SequenceEntry>,
}

/// Immutable lookup from descriptors and mnemonics to table entries.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    elements: HashMap<Fxy, ElementEntry>,
    sequences: HashMap<Fxy, SequenceEntry>,
    mnemonics: HashMap<String, Fxy>,
}

impl DescriptorTable {
    pub fn from_yaml_str(yaml: &str) -> BufrResult<Self> {
        let doc: TableDocument = serde_yaml::from_str(yaml)?;
        let mut builder = TableBuilder::new();
        for element in doc.elements {
            builder = builder.add_element(element);
        }
        for sequence in doc.sequences {
            builder = builder.add_sequence(sequence);
        }
        builder.build()
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> BufrResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let table = Self::from_yaml_str(&yaml)?;
        tracing::debug!(
            path = %path.display(),
            elements = table.elements.len(),
            sequences = table.sequences.len(),
            "Loaded descriptor table"
        );
        Ok(table)
    }

    pub fn element(&self, fxy: Fxy) -> Option<&ElementEntry> {
        self.elements.get(&fxy)
    }

    pub fn sequence(&self, fxy: Fxy) -> Option<&SequenceEntry> {
        self.sequences.get(&fxy)
    }

    pub fn lookup(&self, mnemonic: &str) -> Option<Fxy> {
        self.mnemonics.get(mnemonic).copied()
    }

    pub fn contains_mnemonic(&self, mnemonic: &str) -> bool {
        self.mnemonics.contains_key(mnemonic)
    }

    pub fn sequence_by_mnemonic(&self, mnemonic: &str) -> Option<&SequenceEntry> {
        self.lookup(mnemonic).and_then(|fxy| self.sequence(fxy))
    }

    /// Mnemonic bound to an element or sequence descriptor.
    pub fn mnemonic(&self, fxy: Fxy) -> Option<&str> {
        self.elements
            .get(&fxy)
            .map(|e| e.mnemonic.as_str())
            .or_else(|| self.sequences.get(&fxy).map(|s| s.mnemonic.as_str()))
    }

    /// Sequences that no other sequence references, ordered by descriptor.
    ///
    /// These are the subset types the table can describe.
    pub fn subset_roots(&self) -> Vec<&SequenceEntry> {
        let referenced: BTreeSet<Fxy> = self
            .sequences
            .values()
            .flat_map(|s| s.descriptors.iter().copied())
            .filter(Fxy::is_sequence)
            .collect();

        let mut roots: Vec<&SequenceEntry> = self
            .sequences
            .values()
            .filter(|s| !referenced.contains(&s.fxy))
            .collect();
        roots.sort_by_key(|s| s.fxy);
        roots
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }
}

/// Incremental table construction, validated by [`TableBuilder::build`].
#[derive(Debug, Default)]
pub struct TableBuilder {
    elements: Vec<ElementEntry>,
    sequences: Vec<SequenceEntry>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(mut self, entry: ElementEntry) -> Self {
        self.elements.push(entry);
        self
    }

    pub fn add_sequence(mut self, entry: SequenceEntry) -> Self {
        self.sequences.push(entry);
        self
    }

    /// Numeric element shorthand.
    pub fn element(
        self,
        fxy: Fxy,
        mnemonic: &str,
        unit: &str,
        scale: i32,
        reference: i64,
        width: u32,
    ) -> Self {
        self.add_element(ElementEntry {
            fxy,
            mnemonic: mnemonic.to_string(),
            name: String::new(),
            unit: unit.to_string(),
            scale,
            reference,
            width,
            kind: None,
        })
    }

    /// Character element of `chars` bytes.
    pub fn text_element(self, fxy: Fxy, mnemonic: &str, chars: u32) -> Self {
        self.element(fxy, mnemonic, "CCITT IA5", 0, 0, chars * 8)
    }

    pub fn sequence(self, fxy: Fxy, mnemonic: &str, descriptors: Vec<Fxy>) -> Self {
        self.add_sequence(SequenceEntry {
            fxy,
            mnemonic: mnemonic.to_string(),
            name: String::new(),
            descriptors,
        })
    }

    pub fn build(self) -> BufrResult<DescriptorTable> {
        let mut table = DescriptorTable::default();

        for element in self.elements {
            if !element.fxy.is_element() {
                return Err(BufrError::InvalidTable(format!(
                    "element {} must have F = 0",
                    element.fxy
                )));
            }
            if element.kind() == ElementKind::String && element.width % 8 != 0 {
                return Err(BufrError::InvalidTable(format!(
                    "character element {} width {} is not a whole number of bytes",
                    element.mnemonic, element.width
                )));
            }
            register(&mut table.mnemonics, &element.mnemonic, element.fxy)?;
            if table.elements.insert(element.fxy, element.clone()).is_some() {
                return Err(duplicate_fxy(element.fxy));
            }
        }

        for sequence in self.sequences {
            if !sequence.fxy.is_sequence() {
                return Err(BufrError::InvalidTable(format!(
                    "sequence {} must have F = 3",
                    sequence.fxy
                )));
            }
            register(&mut table.mnemonics, &sequence.mnemonic, sequence.fxy)?;
            if table.sequences.insert(sequence.fxy, sequence.clone()).is_some() {
                return Err(duplicate_fxy(sequence.fxy));
            }
        }

        Ok(table)
    }
}

fn register(mnemonics: &mut HashMap<String, Fxy>, mnemonic: &str, fxy: Fxy) -> BufrResult<()> {
    if mnemonic.is_empty()
        || !mnemonic
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(BufrError::InvalidTable(format!(
            "invalid mnemonic '{}' for {}",
            mnemonic, fxy
        )));
    }
    if let Some(existing) = mnemonics.insert(mnemonic.to_string(), fxy) {
        return Err(BufrError::InvalidTable(format!(
            "mnemonic {} bound to both {} and {}",
            mnemonic, existing, fxy
        )));
    }
    Ok(())
}

fn duplicate_fxy(fxy: Fxy) -> BufrError {
    BufrError::InvalidTable(format!("descriptor {} defined twice", fxy))
}
