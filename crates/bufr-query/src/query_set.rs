//! Named, table-validated query paths.

use std::sync::Arc;

use bufr_common::ValueType;
use bufr_parser::{DescriptorTable, Shape};

use crate::error::{QueryError, QueryResult};
use crate::path::QueryPath;
use crate::resolve::plan;

/// One validated query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub path: QueryPath,
    /// Per segment after the root: does it add a dimension?
    pub repeating: Vec<bool>,
    pub value_type: ValueType,
    /// Path prefix that introduces each dimension, the record dimension first.
    pub dim_paths: Vec<String>,
}

/// Ordered mapping from field name to query path.
#[derive(Debug, Clone)]
pub struct QuerySet {
    table: Arc<DescriptorTable>,
    subsets: Vec<String>,
    roots: Vec<Shape>,
    queries: Vec<Query>,
}

impl QuerySet {
    /// Queries over every subset type the table defines.
    pub fn new(table: Arc<DescriptorTable>) -> Self {
        let roots = table
            .subset_roots()
            .into_iter()
            .filter_map(|seq| match Shape::for_subset(&table, &seq.mnemonic) {
                Ok(shape) => Some(shape),
                Err(e) => {
                    tracing::warn!(subset = %seq.mnemonic, error = %e, "Skipping subset that does not expand");
                    None
                }
            })
            .collect();

        Self {
            table,
            subsets: Vec::new(),
            roots,
            queries: Vec::new(),
        }
    }

    /// Queries restricted to the named subsets.
    pub fn with_subsets<I, S>(table: Arc<DescriptorTable>, subsets: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subsets: Vec<String> = subsets.into_iter().map(Into::into).collect();
        let mut set = Self::new(table);

        for subset in &subsets {
            if !set.roots.iter().any(|r| r.root_mnemonic() == subset) {
                return Err(QueryError::invalid(
                    subset.as_str(),
                    "not a subset sequence of the table",
                ));
            }
        }
        set.roots.retain(|r| subsets.iter().any(|s| s == r.root_mnemonic()));
        set.subsets = subsets;
        Ok(set)
    }

    /// Parse and validate `path`, registering it under `name`.
    ///
    /// Re-adding a name replaces its path and keeps its position.
    pub fn add(&mut self, name: &str, path: &str) -> QueryResult<()> {
        if name.is_empty() {
            return Err(QueryError::invalid(path, "field name is empty"));
        }
        let parsed = QueryPath::parse(path)?;

        if self.roots.is_empty() {
            return Err(QueryError::invalid(path, "the table defines no subset sequences"));
        }

        let mut plans = Vec::new();
        let mut reasons = Vec::new();
        for root in &self.roots {
            match plan(&parsed, root.root()) {
                Ok(p) => plans.push(p),
                Err(reason) => reasons.push(reason),
            }
        }

        let Some(first) = plans.first() else {
            let reason = if parsed.root().mnemonic().is_some() {
                reasons
                    .into_iter()
                    .find(|r| !r.starts_with("subset "))
                    .unwrap_or_else(|| "unknown subset".to_string())
            } else {
                reasons.join("; ")
            };
            return Err(QueryError::invalid(path, reason));
        };

        let mut repeating = first.repeating.clone();
        for p in &plans[1..] {
            for (r, other) in repeating.iter_mut().zip(&p.repeating) {
                *r |= *other;
            }
        }

        let mut dim_paths = vec!["*".to_string()];
        for (i, repeats) in repeating.iter().enumerate() {
            if *repeats {
                dim_paths.push(parsed.prefix(i + 2));
            }
        }

        let query = Query {
            name: name.to_string(),
            path: parsed,
            repeating,
            value_type: first.value_type,
            dim_paths,
        };

        match self.queries.iter_mut().find(|q| q.name == name) {
            Some(existing) => *existing = query,
            None => self.queries.push(query),
        }
        tracing::debug!(field = name, path, "Added query");
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.iter()
    }

    /// Whether records of subset type `subset` are processed.
    pub fn includes_subset(&self, subset: &str) -> bool {
        self.subsets.is_empty() || self.subsets.iter().any(|s| s == subset)
    }

    pub fn subsets(&self) -> &[String] {
        &self.subsets
    }

    pub fn table(&self) -> &Arc<DescriptorTable> {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::sample_table;

    fn query_set() -> QuerySet {
        QuerySet::new(Arc::new(sample_table()))
    }

    #[test]
    fn test_add_and_order() {
        let mut qs = query_set();
        qs.add("longitude", "*/CLON").unwrap();
        qs.add("latitude", "*/CLAT").unwrap();
        qs.add("radiance", "*/BRIT/TMBR").unwrap();
        assert_eq!(qs.names(), vec!["longitude", "latitude", "radiance"]);
        assert_eq!(qs.get("radiance").unwrap().dim_paths, vec!["*", "*/BRIT"]);
        assert_eq!(qs.get("latitude").unwrap().value_type, ValueType::Float32);
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let mut qs = query_set();
        qs.add("a", "*/CLAT").unwrap();
        qs.add("b", "*/CLON").unwrap();
        qs.add("a", "*/YEAR").unwrap();
        assert_eq!(qs.names(), vec!["a", "b"]);
        assert_eq!(qs.get("a").unwrap().path.to_string(), "*/YEAR");
    }

    #[test]
    fn test_unknown_mnemonic_rejected() {
        let mut qs = query_set();
        let err = qs.add("bad", "*/NOPE").unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery { .. }));
        assert!(qs.is_empty());
    }

    #[test]
    fn test_subset_specific_paths() {
        let mut qs = query_set();
        qs.add("station", "NC000001/STID").unwrap();
        qs.add("temperature", "*/TMDB").unwrap();
        assert_eq!(qs.get("temperature").unwrap().repeating, vec![true]);
        assert!(qs.add("bad", "NC021023/STID").is_err());
        assert!(qs.add("bad", "NC999999/CLAT").is_err());
    }

    #[test]
    fn test_with_subsets() {
        let table = Arc::new(sample_table());
        let mut qs = QuerySet::with_subsets(table.clone(), ["NC021023"]).unwrap();
        assert!(qs.includes_subset("NC021023"));
        assert!(!qs.includes_subset("NC000001"));
        assert!(qs.add("station", "*/STID").is_err());
        assert!(QuerySet::with_subsets(table, ["NC123456"]).is_err());
    }
}
