//! Category splits that label each row with a discriminator value.

use std::collections::BTreeMap;

use bufr_common::DataArray;

use crate::error::{IngestionError, Result};

/// Splits rows by the value of one variable.
///
/// Values are looked up in `map` under `_<value>`; without a map the value
/// itself names the category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySplit {
    pub name: String,
    pub variable: String,
    pub map: BTreeMap<String, String>,
}

impl CategorySplit {
    pub fn new(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            map: BTreeMap::new(),
        }
    }

    pub fn with_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.map = map;
        self
    }

    /// Category name for every row of `data`.
    pub fn labels(&self, data: &DataArray) -> Result<Vec<String>> {
        let row_len = data.row_len();
        (0..data.rows())
            .map(|row| {
                let idx = row * row_len;
                let value = if data.value_type().is_numeric() {
                    data.get_i64(idx).map(|v| v.to_string())
                } else {
                    data.get_string(idx)
                };
                let value = value.ok_or_else(|| self.error(format!("row {} has no value", row)))?;
                self.name_for(&value)
            })
            .collect()
    }

    fn name_for(&self, value: &str) -> Result<String> {
        if self.map.is_empty() {
            return Ok(value.to_string());
        }
        self.map
            .get(&format!("_{}", value))
            .cloned()
            .ok_or_else(|| self.error(format!("no category mapped for value {}", value)))
    }

    fn error(&self, reason: String) -> IngestionError {
        IngestionError::Split {
            split: self.name.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_labels() {
        let split = CategorySplit::new("satId", "satelliteId").with_map(BTreeMap::from([
            ("_3".to_string(), "metop-b".to_string()),
            ("_4".to_string(), "metop-a".to_string()),
        ]));
        let data = DataArray::from_i32(vec![4, 3, 4]);
        assert_eq!(
            split.labels(&data).unwrap(),
            vec!["metop-a", "metop-b", "metop-a"]
        );

        let unmapped = DataArray::from_i32(vec![5]);
        assert!(matches!(
            split.labels(&unmapped),
            Err(IngestionError::Split { .. })
        ));
    }

    #[test]
    fn test_raw_labels() {
        let split = CategorySplit::new("satId", "satelliteId");
        let data = DataArray::from_f32(vec![209.0, 223.0]);
        assert_eq!(split.labels(&data).unwrap(), vec!["209", "223"]);
    }
}
