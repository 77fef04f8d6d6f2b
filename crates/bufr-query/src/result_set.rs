//! Query results as typed, fill-aware arrays.

use bufr_common::{timestamp_from_parts, DataArray, DateTimeArray, ValueType, TIMESTAMP_FILL};

use crate::error::{QueryError, QueryResult};

/// The materialised result of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub query: String,
    /// Path prefix that introduces each dimension, the record dimension first.
    pub dim_paths: Vec<String>,
    pub data: DataArray,
}

/// Results of executing one query set over one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    fields: Vec<Field>,
    records: usize,
}

impl ResultSet {
    pub(crate) fn new(fields: Vec<Field>, records: usize) -> Self {
        Self { fields, records }
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of subsets the queries were applied to.
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn field(&self, name: &str) -> QueryResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))
    }

    pub fn dim_paths(&self, name: &str) -> QueryResult<&[String]> {
        Ok(&self.field(name)?.dim_paths)
    }

    /// Array for `name`, optionally grouped by another field and cast.
    ///
    /// Grouping flattens the group-by field's dimensions into the row
    /// dimension. Fields with fewer dimensions are broadcast onto those
    /// rows; fields nested below it keep their extra dimensions.
    pub fn get(
        &self,
        name: &str,
        group_by: Option<&str>,
        value_type: Option<ValueType>,
    ) -> QueryResult<DataArray> {
        let field = self.field(name)?;
        let grouped = match group_by {
            Some(by) => {
                let by = self.field(by)?;
                group(field, by)?
            }
            None => field.data.clone(),
        };

        match value_type {
            Some(target) if target != grouped.value_type() => Ok(grouped.cast(target)?),
            _ => Ok(grouped),
        }
    }

    /// Timestamps assembled element-wise from date/time component fields.
    ///
    /// A record with any missing component, or components that do not form a
    /// valid date, holds the fill timestamp (the epoch). Missing minute or
    /// second fields count as zero.
    #[allow(clippy::too_many_arguments)]
    pub fn get_datetime(
        &self,
        year: &str,
        month: &str,
        day: &str,
        hour: &str,
        minute: Option<&str>,
        second: Option<&str>,
        group_by: Option<&str>,
    ) -> QueryResult<DateTimeArray> {
        let fetch = |name: &str| self.get(name, group_by, Some(ValueType::Int64));

        let year = fetch(year)?;
        let dims = year.dims().to_vec();
        let mut components = vec![year];
        for name in [month, day, hour] {
            components.push(fetch(name)?);
        }
        for name in [minute, second] {
            match name {
                Some(name) => components.push(fetch(name)?),
                None => components.push(DataArray::from_values(
                    ValueType::Int64,
                    dims.clone(),
                    &vec![Some(0.0); dims.iter().product()],
                )?),
            }
        }

        if let Some(bad) = components.iter().find(|c| c.dims() != dims.as_slice()) {
            return Err(QueryError::ShapeMismatch(format!(
                "datetime components have dimensions {:?} and {:?}",
                dims,
                bad.dims()
            )));
        }

        let len: usize = dims.iter().product();
        let seconds = (0..len)
            .map(|i| {
                let parts: Option<Vec<i64>> = components.iter().map(|c| c.get_i64(i)).collect();
                parts
                    .and_then(|p| timestamp_from_parts(p[0], p[1], p[2], p[3], p[4], p[5]))
                    .unwrap_or(TIMESTAMP_FILL)
            })
            .collect();

        Ok(DateTimeArray::new(dims, seconds))
    }
}

fn group(field: &Field, by: &Field) -> QueryResult<DataArray> {
    let g_dims = by.data.dims();
    let f_dims = field.data.dims();
    let k = by.dim_paths.len();
    let m = field.dim_paths.len();
    let rows: usize = g_dims.iter().product();

    if m <= k && by.dim_paths[..m] == field.dim_paths[..] {
        let indices: Vec<Option<usize>> = (0..rows)
            .map(|r| ravel(&unravel(r, g_dims)[..m], f_dims))
            .collect();
        Ok(field.data.take(&indices, vec![rows])?)
    } else if m > k && field.dim_paths[..k] == by.dim_paths[..] {
        let inner = &f_dims[k..];
        let inner_len: usize = inner.iter().product();
        let mut indices = Vec::with_capacity(rows * inner_len);
        for r in 0..rows {
            match ravel(&unravel(r, g_dims), &f_dims[..k]) {
                Some(base) => indices.extend((0..inner_len).map(|j| Some(base * inner_len + j))),
                None => indices.extend(std::iter::repeat(None).take(inner_len)),
            }
        }
        let mut dims = vec![rows];
        dims.extend_from_slice(inner);
        Ok(field.data.take(&indices, dims)?)
    } else {
        Err(QueryError::IncompatibleGroupBy {
            field: field.name.clone(),
            group_by: by.name.clone(),
        })
    }
}

fn unravel(mut flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (axis, extent) in dims.iter().enumerate().rev() {
        if *extent > 0 {
            coords[axis] = flat % extent;
            flat /= extent;
        }
    }
    coords
}

/// Flat index of `coords` in `dims`, None when out of range.
fn ravel(coords: &[usize], dims: &[usize]) -> Option<usize> {
    let mut flat = 0;
    for (c, extent) in coords.iter().zip(dims) {
        if c >= extent {
            return None;
        }
        flat = flat * extent + c;
    }
    Some(flat)
}
