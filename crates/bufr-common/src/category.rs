//! Category labels used to partition data by discriminator values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A tuple of discriminator values (one per split), e.g. `["metop-a"]`.
///
/// The empty label is the uncategorised ("main") category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category(Vec<String>);

impl Category {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// The uncategorised label.
    pub fn main() -> Self {
        Self(Vec::new())
    }

    pub fn is_main(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Label extended with one more split value.
    pub fn with(&self, part: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("__MAIN__")
        } else {
            f.write_str(&self.0.join("_"))
        }
    }
}

impl From<Vec<String>> for Category {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

impl From<&str> for Category {
    fn from(part: &str) -> Self {
        Self(vec![part.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Category::main().to_string(), "__MAIN__");
        assert_eq!(Category::new(["metop-a", "asc"]).to_string(), "metop-a_asc");
    }

    #[test]
    fn test_with_extends_label() {
        let cat = Category::main().with("goes-16").with("band7");
        assert_eq!(cat.parts(), &["goes-16".to_string(), "band7".to_string()]);
        assert!(!cat.is_main());
    }
}
