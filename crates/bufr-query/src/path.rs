//! Query path syntax.
//!
//! ```text
//! path    := segment ('/' segment)*
//! segment := mnemonic | '*' | mnemonic '{' positive-integer '}'
//! ```
//!
//! The first segment names the subset root; `*` accepts any root.

use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `*`: any node at this level.
    Any,
    /// A mnemonic, optionally with a 1-based repetition index.
    Name { mnemonic: String, index: Option<usize> },
}

impl Segment {
    pub fn name(mnemonic: &str) -> Self {
        Segment::Name {
            mnemonic: mnemonic.to_string(),
            index: None,
        }
    }

    pub fn mnemonic(&self) -> Option<&str> {
        match self {
            Segment::Any => None,
            Segment::Name { mnemonic, .. } => Some(mnemonic),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Any => None,
            Segment::Name { index, .. } => *index,
        }
    }

    /// Whether a node named `mnemonic` satisfies this segment.
    pub fn accepts(&self, mnemonic: &str) -> bool {
        match self {
            Segment::Any => true,
            Segment::Name { mnemonic: m, .. } => m == mnemonic,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Any => f.write_str("*"),
            Segment::Name {
                mnemonic,
                index: None,
            } => f.write_str(mnemonic),
            Segment::Name {
                mnemonic,
                index: Some(n),
            } => write!(f, "{}{{{}}}", mnemonic, n),
        }
    }
}

/// A parsed, syntactically valid query path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPath {
    segments: Vec<Segment>,
}

impl QueryPath {
    pub fn parse(text: &str) -> QueryResult<Self> {
        if text.is_empty() {
            return Err(QueryError::invalid(text, "empty path"));
        }

        let segments = text
            .split('/')
            .map(|part| parse_segment(text, part))
            .collect::<QueryResult<Vec<_>>>()?;

        if segments.len() < 2 {
            return Err(QueryError::invalid(
                text,
                "a path needs a subset root and at least one element",
            ));
        }
        if matches!(segments.last(), Some(Segment::Any)) {
            return Err(QueryError::invalid(text, "the last segment must name an element"));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn root(&self) -> &Segment {
        &self.segments[0]
    }

    /// Text of the first `len` segments, with the root written as `*`.
    pub fn prefix(&self, len: usize) -> String {
        let mut parts = vec!["*".to_string()];
        parts.extend(self.segments[1..len].iter().map(Segment::to_string));
        parts.join("/")
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(Segment::to_string).collect();
        f.write_str(&parts.join("/"))
    }
}

impl FromStr for QueryPath {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_segment(path: &str, part: &str) -> QueryResult<Segment> {
    if part == "*" {
        return Ok(Segment::Any);
    }
    if part.is_empty() {
        return Err(QueryError::invalid(path, "empty segment"));
    }

    let (name, index) = match part.find('{') {
        Some(open) => {
            let rest = &part[open + 1..];
            let digits = rest
                .strip_suffix('}')
                .ok_or_else(|| QueryError::invalid(path, format!("unterminated index in '{}'", part)))?;
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(QueryError::invalid(path, format!("bad index in '{}'", part)));
            }
            let n: usize = digits
                .parse()
                .map_err(|_| QueryError::invalid(path, format!("bad index in '{}'", part)))?;
            if n == 0 {
                return Err(QueryError::invalid(path, "indices start at 1"));
            }
            (&part[..open], Some(n))
        }
        None => (part, None),
    };

    if name.is_empty() {
        return Err(QueryError::invalid(path, format!("missing mnemonic in '{}'", part)));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_'))
    {
        return Err(QueryError::invalid(
            path,
            format!("unexpected character '{}' in '{}'", bad, part),
        ));
    }

    Ok(Segment::Name {
        mnemonic: name.to_string(),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wildcard_root() {
        let path = QueryPath::parse("*/BRIT/TMBR").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Any, Segment::name("BRIT"), Segment::name("TMBR")]
        );
        assert_eq!(path.to_string(), "*/BRIT/TMBR");
    }

    #[test]
    fn test_parse_index() {
        let path = QueryPath::parse("NC021023/BRIT{2}/TMBR").unwrap();
        assert_eq!(path.segments()[1].index(), Some(2));
        assert_eq!(path.to_string(), "NC021023/BRIT{2}/TMBR");
        assert_eq!(path.prefix(2), "*/BRIT{2}");
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "",
            "*",
            "*/",
            "*//CLAT",
            "*/CLAT ",
            "*/clat",
            "*/CLAT{0}",
            "*/CLAT{x}",
            "*/CLAT{2",
            "*/{2}",
            "*/CL-AT",
            "*/BRIT/*",
        ] {
            assert!(
                matches!(QueryPath::parse(bad), Err(QueryError::InvalidQuery { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }
}
