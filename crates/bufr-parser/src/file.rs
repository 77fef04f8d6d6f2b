//! Splitting files of concatenated BUFR messages.

use std::path::Path;

use bytes::Bytes;

use crate::error::{BufrError, BufrResult};
use crate::sections::Message;

const MAGIC: &[u8; 4] = b"BUFR";

/// A buffer of concatenated BUFR messages.
///
/// Leading junk, record padding and per-record length words between
/// messages are skipped while scanning for the next `BUFR` marker.
#[derive(Debug, Clone)]
pub struct BufrFile {
    data: Bytes,
}

impl BufrFile {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn open(path: impl AsRef<Path>) -> BufrResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Opened BUFR file");
        Ok(Self::from_bytes(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lazily iterate the messages in file order.
    pub fn messages(&self) -> MessageIter {
        MessageIter {
            data: self.data.clone(),
            offset: 0,
        }
    }

    /// Number of message markers in the file, whether or not they parse.
    pub fn message_count(&self) -> usize {
        self.messages().count()
    }
}

/// Iterator over the messages of a [`BufrFile`].
///
/// A message that cannot be parsed is yielded as an error and scanning
/// resumes after its marker.
#[derive(Debug, Clone)]
pub struct MessageIter {
    data: Bytes,
    offset: usize,
}

impl Iterator for MessageIter {
    type Item = BufrResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = find_magic(&self.data, self.offset)?;

        if start + 8 > self.data.len() {
            self.offset = self.data.len();
            return Some(Err(BufrError::malformed(format!(
                "truncated message header at byte {}",
                start
            ))));
        }

        let length = ((self.data[start + 4] as usize) << 16)
            | ((self.data[start + 5] as usize) << 8)
            | self.data[start + 6] as usize;

        if length < 8 || start + length > self.data.len() {
            self.offset = start + MAGIC.len();
            return Some(Err(BufrError::malformed(format!(
                "message at byte {} declares {} bytes, {} remain",
                start,
                length,
                self.data.len() - start
            ))));
        }

        match Message::parse(self.data.slice(start..start + length)) {
            Ok(message) => {
                self.offset = start + length;
                Some(Ok(message))
            }
            Err(err) => {
                self.offset = start + MAGIC.len();
                Some(Err(err))
            }
        }
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(MAGIC.len())
        .position(|w| w == MAGIC)
        .map(|pos| from + pos)
}
