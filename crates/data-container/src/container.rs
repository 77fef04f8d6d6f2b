//! Named arrays whose rows carry category labels.
//!
//! Every array in a container shares the leading row dimension. Row `i` of
//! every array belongs to the same record, and that record carries one
//! [`Category`] label (the tuple of split values assigned at parse time).
//! Category labels are interned in first-seen order, so
//! [`DataContainer::all_sub_categories`] is a plain read.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

use bufr_common::{Category, DataArray, KeyAtom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContainerError, ContainerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Field {
    path: String,
    data: DataArray,
    /// Mnemonic paths the data was resolved from.
    source_paths: Vec<String>,
    /// Categories whose rows have been written.
    written: BTreeSet<Category>,
}

/// A collection of row-aligned, category-labelled arrays keyed by path
/// (for example `variables/latitude`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataContainer {
    /// Distinct labels in first-seen order.
    categories: Vec<Category>,
    /// Index into `categories` for every row.
    rows: Vec<usize>,
    fields: Vec<Field>,
}

impl DataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty container with one label per row and no fields yet.
    pub fn with_categories(labels: impl IntoIterator<Item = Category>) -> Self {
        let mut container = Self::default();
        container.push_labels(labels);
        container
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Field paths in insertion order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn has(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    /// Source mnemonic paths recorded for a field.
    pub fn paths(&self, path: &str) -> ContainerResult<&[String]> {
        Ok(&self.field(path)?.source_paths)
    }

    pub fn has_category(&self, category: &Category) -> bool {
        self.categories.contains(category)
    }

    /// Label of one row.
    pub fn category_of(&self, row: usize) -> Option<&Category> {
        self.rows.get(row).map(|&idx| &self.categories[idx])
    }

    /// Number of rows in `category`, or all rows when `None`.
    pub fn row_count(&self, category: Option<&Category>) -> usize {
        match category {
            None => self.len(),
            Some(category) => self.rows_for(category).len(),
        }
    }

    /// Iterate over (path, array) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataArray)> {
        self.fields.iter().map(|f| (f.path.as_str(), &f.data))
    }

    /// Stored array for `path`, restricted to the rows of `category` if given.
    pub fn get(&self, path: &str, category: Option<&Category>) -> ContainerResult<DataArray> {
        let field = self.field(path)?;
        match category {
            None => Ok(field.data.clone()),
            Some(category) => {
                if !self.has_category(category) {
                    return Err(ContainerError::UnknownCategory(category.to_string()));
                }
                Ok(field.data.slice_rows(&self.rows_for(category))?)
            }
        }
    }

    /// Insert an array.
    ///
    /// Without a category the array must cover every row and the path must
    /// be new. With a category the array covers only that category's rows;
    /// the path may already exist as long as this category has not been
    /// written to it yet, and rows of categories never written hold fill.
    pub fn add(
        &mut self,
        path: &str,
        data: DataArray,
        source_paths: Vec<String>,
        category: Option<&Category>,
    ) -> ContainerResult<()> {
        if self.fields.is_empty() && self.rows.is_empty() && category.is_none() {
            self.push_labels(std::iter::repeat(Category::main()).take(data.rows()));
        }

        let Some(category) = category else {
            if self.has(path) {
                return Err(ContainerError::DuplicateField {
                    path: path.to_string(),
                    category: "all rows".to_string(),
                });
            }
            if data.rows() != self.len() {
                return Err(ContainerError::ShapeMismatch(format!(
                    "{} has {} rows but the container has {}",
                    path,
                    data.rows(),
                    self.len()
                )));
            }
            self.fields.push(Field {
                path: path.to_string(),
                data,
                source_paths,
                written: self.categories.iter().cloned().collect(),
            });
            debug!(path = %path, rows = self.len(), "Added field");
            return Ok(());
        };

        let rows = self.rows_for(category);
        if rows.is_empty() {
            return Err(ContainerError::UnknownCategory(category.to_string()));
        }
        if data.rows() != rows.len() {
            return Err(ContainerError::ShapeMismatch(format!(
                "{} has {} rows but category {} has {}",
                path,
                data.rows(),
                category,
                rows.len()
            )));
        }

        let total = self.len();
        match self.position(path) {
            Some(idx) => {
                let field = &mut self.fields[idx];
                if field.written.contains(category) {
                    return Err(ContainerError::DuplicateField {
                        path: path.to_string(),
                        category: category.to_string(),
                    });
                }
                if field.data.value_type() != data.value_type()
                    || field.data.dims().len() != data.dims().len()
                {
                    return Err(ContainerError::ShapeMismatch(format!(
                        "{} is {} with {} dimensions, got {} with {}",
                        path,
                        field.data.value_type(),
                        field.data.dims().len(),
                        data.value_type(),
                        data.dims().len()
                    )));
                }

                let inner: Vec<usize> = field
                    .data
                    .inner_dims()
                    .iter()
                    .zip(data.inner_dims())
                    .map(|(a, b)| *a.max(b))
                    .collect();
                let mut merged = field.data.pad_inner(&inner)?;
                merged.scatter_rows(&rows, &data.pad_inner(&inner)?)?;
                field.data = merged;
                field.written.insert(category.clone());
            }
            None => {
                let mut dims = vec![total];
                dims.extend_from_slice(data.inner_dims());
                let mut full = DataArray::filled(data.value_type(), dims);
                full.scatter_rows(&rows, &data)?;
                self.fields.push(Field {
                    path: path.to_string(),
                    data: full,
                    source_paths,
                    written: BTreeSet::from([category.clone()]),
                });
            }
        }
        debug!(path = %path, category = %category, rows = rows.len(), "Added field rows");
        Ok(())
    }

    /// Overwrite an existing field; the new array must have the same shape.
    pub fn replace(&mut self, path: &str, data: DataArray) -> ContainerResult<()> {
        let idx = self
            .position(path)
            .ok_or_else(|| ContainerError::UnknownField(path.to_string()))?;
        let field = &mut self.fields[idx];
        if field.data.dims() != data.dims() {
            return Err(ContainerError::ShapeMismatch(format!(
                "cannot replace {} of shape {:?} with shape {:?}",
                path,
                field.data.dims(),
                data.dims()
            )));
        }
        field.data = data;
        Ok(())
    }

    /// Concatenate the rows of `other` onto this container.
    ///
    /// Both containers must hold the same paths. Nothing is modified when
    /// any field is incompatible.
    pub fn append(&mut self, other: &DataContainer) -> ContainerResult<()> {
        if self.fields.is_empty() && self.rows.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        if other.fields.is_empty() && other.rows.is_empty() {
            return Ok(());
        }

        let mine: BTreeSet<&str> = self.fields.iter().map(|f| f.path.as_str()).collect();
        let theirs: BTreeSet<&str> = other.fields.iter().map(|f| f.path.as_str()).collect();
        if mine != theirs {
            return Err(ContainerError::ShapeMismatch(format!(
                "path sets differ: {:?} vs {:?}",
                mine, theirs
            )));
        }

        for field in &self.fields {
            let incoming = &other.field(&field.path)?.data;
            if field.data.value_type() != incoming.value_type()
                || field.data.dims().len() != incoming.dims().len()
            {
                return Err(ContainerError::ShapeMismatch(format!(
                    "cannot append {} {:?} to {} {:?} for {}",
                    incoming.value_type(),
                    incoming.dims(),
                    field.data.value_type(),
                    field.data.dims(),
                    field.path
                )));
            }
        }

        for field in &mut self.fields {
            let incoming = other.field(&field.path)?;
            field.data.append(&incoming.data)?;
            field.written.extend(incoming.written.iter().cloned());
        }
        self.push_labels(other.rows.iter().map(|&idx| other.categories[idx].clone()));
        Ok(())
    }

    /// New container with only the rows whose label is in `categories`,
    /// keeping their relative order.
    pub fn get_sub_container(&self, categories: &[Category]) -> ContainerResult<DataContainer> {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&row| categories.contains(&self.categories[self.rows[row]]))
            .collect();
        self.select_rows(&rows)
    }

    /// Distinct category labels in first-seen order.
    pub fn all_sub_categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    /// Drop rows whose key tuple over `key_paths` was already seen.
    ///
    /// The first occurrence wins and row order is kept. Returns the number
    /// of rows removed.
    pub fn deduplicate_local(&mut self, key_paths: &[&str]) -> ContainerResult<usize> {
        let (keep, _) = self.unique_rows(key_paths)?;
        let removed = self.len() - keep.len();
        if removed > 0 {
            *self = self.select_rows(&keep)?;
        }
        debug!(keys = ?key_paths, removed, remaining = self.len(), "Deduplicated rows");
        Ok(removed)
    }

    /// Rows kept by deduplication plus a digest of their key tuples.
    pub(crate) fn unique_rows(&self, key_paths: &[&str]) -> ContainerResult<(Vec<usize>, u64)> {
        let keys = key_paths
            .iter()
            .map(|path| self.field(path).map(|f| &f.data))
            .collect::<ContainerResult<Vec<_>>>()?;

        let mut seen: HashSet<Vec<KeyAtom>> = HashSet::with_capacity(self.len());
        let mut keep = Vec::with_capacity(self.len());
        let mut hasher = DefaultHasher::new();
        for row in 0..self.len() {
            let key: Vec<KeyAtom> = keys.iter().flat_map(|data| data.row_key(row)).collect();
            if !seen.contains(&key) {
                key.hash(&mut hasher);
                seen.insert(key);
                keep.push(row);
            }
        }
        keep.len().hash(&mut hasher);
        Ok((keep, hasher.finish()))
    }

    fn select_rows(&self, rows: &[usize]) -> ContainerResult<DataContainer> {
        let mut out = DataContainer::with_categories(
            rows.iter().map(|&row| self.categories[self.rows[row]].clone()),
        );
        for field in &self.fields {
            out.fields.push(Field {
                path: field.path.clone(),
                data: field.data.slice_rows(rows)?,
                source_paths: field.source_paths.clone(),
                written: field.written.clone(),
            });
        }
        Ok(out)
    }

    fn push_labels(&mut self, labels: impl IntoIterator<Item = Category>) {
        for label in labels {
            let idx = match self.categories.iter().position(|c| *c == label) {
                Some(idx) => idx,
                None => {
                    self.categories.push(label);
                    self.categories.len() - 1
                }
            };
            self.rows.push(idx);
        }
    }

    fn rows_for(&self, category: &Category) -> Vec<usize> {
        match self.categories.iter().position(|c| c == category) {
            Some(target) => (0..self.rows.len())
                .filter(|&row| self.rows[row] == target)
                .collect(),
            None => Vec::new(),
        }
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.path == path)
    }

    fn field(&self, path: &str) -> ContainerResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.path == path)
            .ok_or_else(|| ContainerError::UnknownField(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_common::ValueType;

    fn labelled() -> DataContainer {
        let mut container = DataContainer::with_categories(vec![
            Category::from("metop-a"),
            Category::from("metop-b"),
            Category::from("metop-a"),
        ]);
        container
            .add(
                "variables/latitude",
                DataArray::from_f32(vec![10.0, 20.0, 30.0]),
                vec!["*/CLAT".to_string()],
                None,
            )
            .unwrap();
        container
            .add(
                "variables/satelliteId",
                DataArray::from_i32(vec![4, 3, 4]),
                vec!["*/SAID".to_string()],
                None,
            )
            .unwrap();
        container
    }

    #[test]
    fn test_add_establishes_rows() {
        let mut container = DataContainer::new();
        container
            .add("variables/x", DataArray::from_i32(vec![1, 2]), vec![], None)
            .unwrap();
        assert_eq!(container.len(), 2);
        assert_eq!(container.all_sub_categories(), vec![Category::main()]);

        let err = container
            .add("variables/y", DataArray::from_i32(vec![1, 2, 3]), vec![], None)
            .unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch(_)));

        let err = container
            .add("variables/x", DataArray::from_i32(vec![5, 6]), vec![], None)
            .unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateField { .. }));
    }

    #[test]
    fn test_get_by_category() {
        let container = labelled();
        let lat = container
            .get("variables/latitude", Some(&Category::from("metop-a")))
            .unwrap();
        assert_eq!(lat.as_f32().unwrap(), &[10.0, 30.0]);
        assert_eq!(container.row_count(Some(&Category::from("metop-b"))), 1);
        assert_eq!(container.paths("variables/latitude").unwrap(), &["*/CLAT"]);

        assert!(matches!(
            container.get("variables/latitude", Some(&Category::from("noaa-19"))),
            Err(ContainerError::UnknownCategory(_))
        ));
        assert!(matches!(
            container.get("variables/missing", None),
            Err(ContainerError::UnknownField(_))
        ));
    }

    #[test]
    fn test_add_per_category() {
        let mut container = labelled();
        let a = Category::from("metop-a");
        let b = Category::from("metop-b");

        container
            .add("variables/radiance", DataArray::from_f32(vec![1.0, 3.0]), vec![], Some(&a))
            .unwrap();
        let partial = container.get("variables/radiance", None).unwrap();
        assert!(partial.is_missing(1));

        let err = container
            .add("variables/radiance", DataArray::from_f32(vec![9.0, 9.0]), vec![], Some(&a))
            .unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateField { .. }));

        let err = container
            .add("variables/radiance", DataArray::from_f32(vec![2.0, 2.0]), vec![], Some(&b))
            .unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch(_)));

        container
            .add("variables/radiance", DataArray::from_f32(vec![2.0]), vec![], Some(&b))
            .unwrap();
        let full = container.get("variables/radiance", None).unwrap();
        assert_eq!(full.as_f32().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_replace_requires_same_shape() {
        let mut container = labelled();
        container
            .replace("variables/latitude", DataArray::from_f32(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(
            container.get("variables/latitude", None).unwrap().as_f32().unwrap(),
            &[1.0, 2.0, 3.0]
        );

        assert!(matches!(
            container.replace("variables/latitude", DataArray::from_f32(vec![1.0])),
            Err(ContainerError::ShapeMismatch(_))
        ));
        assert!(matches!(
            container.replace("variables/other", DataArray::from_f32(vec![1.0])),
            Err(ContainerError::UnknownField(_))
        ));
    }

    #[test]
    fn test_append_self() {
        let a = labelled();
        let mut doubled = a.clone();
        doubled.append(&a).unwrap();

        assert_eq!(doubled.len(), 6);
        for path in a.field_names() {
            let mut expected = a.get(path, None).unwrap();
            expected.append(&a.get(path, None).unwrap()).unwrap();
            assert_eq!(doubled.get(path, None).unwrap(), expected);
        }
        assert_eq!(doubled.category_of(3), Some(&Category::from("metop-a")));
        assert_eq!(doubled.all_sub_categories(), a.all_sub_categories());
    }

    #[test]
    fn test_append_rejects_different_paths() {
        let mut a = labelled();
        let mut b = labelled();
        b.add("variables/extra", DataArray::from_i32(vec![0, 0, 0]), vec![], None)
            .unwrap();

        assert!(matches!(a.append(&b), Err(ContainerError::ShapeMismatch(_))));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_append_pads_inner_dims() {
        let mut a = DataContainer::new();
        a.add(
            "variables/radiance",
            DataArray::from_values(ValueType::Float32, vec![1, 2], &[Some(1.0), Some(2.0)])
                .unwrap(),
            vec![],
            None,
        )
        .unwrap();
        let mut b = DataContainer::new();
        b.add(
            "variables/radiance",
            DataArray::from_values(
                ValueType::Float32,
                vec![1, 3],
                &[Some(4.0), Some(5.0), Some(6.0)],
            )
            .unwrap(),
            vec![],
            None,
        )
        .unwrap();

        a.append(&b).unwrap();
        let radiance = a.get("variables/radiance", None).unwrap();
        assert_eq!(radiance.dims(), &[2, 3]);
        assert!(radiance.is_missing(2));
        assert_eq!(radiance.get_f64(3), Some(4.0));
    }

    #[test]
    fn test_sub_container_keeps_order() {
        let container = labelled();
        let sub = container
            .get_sub_container(&[Category::from("metop-a")])
            .unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(
            sub.get("variables/latitude", None).unwrap().as_f32().unwrap(),
            &[10.0, 30.0]
        );
        assert_eq!(sub.all_sub_categories(), vec![Category::from("metop-a")]);
    }

    #[test]
    fn test_all_sub_categories_first_seen() {
        let container = DataContainer::with_categories(vec![
            Category::from("c"),
            Category::from("a"),
            Category::from("c"),
            Category::from("b"),
        ]);
        assert_eq!(
            container.all_sub_categories(),
            vec![Category::from("c"), Category::from("a"), Category::from("b")]
        );
    }

    #[test]
    fn test_deduplicate_local() {
        let mut container = labelled();
        let removed = container.deduplicate_local(&["variables/satelliteId"]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            container.get("variables/latitude", None).unwrap().as_f32().unwrap(),
            &[10.0, 20.0]
        );

        assert!(matches!(
            container.deduplicate_local(&["variables/nope"]),
            Err(ContainerError::UnknownField(_))
        ));
    }
}
