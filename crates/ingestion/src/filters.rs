//! Row filters applied before export.

use bufr_common::DataArray;

use crate::error::{IngestionError, Result};

/// Keeps rows whose value lies within optional inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingFilter {
    pub variable: String,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

impl BoundingFilter {
    pub fn new(variable: impl Into<String>, lower_bound: Option<f64>, upper_bound: Option<f64>) -> Self {
        Self {
            variable: variable.into(),
            lower_bound,
            upper_bound,
        }
    }

    #[inline]
    pub fn is_valid(&self, value: f64) -> bool {
        self.lower_bound.map_or(true, |lower| value >= lower)
            && self.upper_bound.map_or(true, |upper| value <= upper)
    }

    /// Rows to keep, judged on the first value of each row. Missing values
    /// are dropped.
    pub fn keep_rows(&self, data: &DataArray) -> Result<Vec<usize>> {
        if !data.value_type().is_numeric() {
            return Err(IngestionError::InvalidConfig(format!(
                "bounding filter on {} needs numeric data, found {}",
                self.variable,
                data.value_type()
            )));
        }
        let row_len = data.row_len();
        Ok((0..data.rows())
            .filter(|&row| {
                data.get_f64(row * row_len)
                    .map_or(false, |value| self.is_valid(value))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_common::ValueType;

    #[test]
    fn test_keep_rows() {
        let filter = BoundingFilter::new("latitude", Some(-10.0), Some(10.0));
        let data = DataArray::from_values(
            ValueType::Float32,
            vec![4],
            &[Some(-12.0), Some(0.0), None, Some(10.0)],
        )
        .unwrap();
        assert_eq!(filter.keep_rows(&data).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_open_bound() {
        let filter = BoundingFilter::new("latitude", None, Some(0.0));
        assert!(filter.is_valid(-1000.0));
        assert!(!filter.is_valid(0.5));
    }

    #[test]
    fn test_text_rejected() {
        let filter = BoundingFilter::new("station", Some(0.0), None);
        let data = DataArray::from_strings(vec!["A".to_string()]);
        assert!(filter.keep_rows(&data).is_err());
    }
}
