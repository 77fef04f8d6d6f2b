//! BUFR decoder (WMO FM 94 BUFR editions 3 and 4).
//!
//! Messages are decoded against a pre-loaded [`DescriptorTable`] into a
//! [`Node`] tree per subset. The tree's shape is fixed by the table and the
//! message's own delayed replication counts.

pub mod bits;
pub mod decoder;
pub mod error;
pub mod file;
pub mod sections;
pub mod shape;
pub mod tables;
pub mod tree;

pub use decoder::{decode_message, DecodePolicy};
pub use error::{BufrError, BufrResult};
pub use file::{BufrFile, MessageIter};
pub use sections::Message;
pub use shape::{Operator, ReplicationCount, Shape, ShapeNode};
pub use tables::{DescriptorTable, ElementEntry, ElementKind, Fxy, SequenceEntry, TableBuilder};
pub use tree::{Node, NodeKind};
