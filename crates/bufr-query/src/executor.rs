//! Applying a query set to every subset of every message in a file.

use std::collections::HashMap;

use bufr_common::{DataArray, ValueType};
use bufr_parser::decoder::decode_with_shape;
use bufr_parser::{BufrError, BufrFile, BufrResult, DecodePolicy, Fxy, Message, Node, Shape};

use crate::error::{QueryError, QueryResult};
use crate::query_set::QuerySet;
use crate::resolve::{resolve, Value};
use crate::result_set::{Field, ResultSet};

/// Counters collected while executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub messages: usize,
    pub skipped_messages: usize,
    pub table_messages: usize,
    pub subsets: usize,
}

#[derive(Debug, Default)]
struct FieldAccumulator {
    extents: Vec<usize>,
    /// (record, coordinates, value)
    entries: Vec<(usize, Vec<usize>, Value)>,
}

/// Incremental query execution; feed messages in file order, then `finish`.
pub struct Executor<'q> {
    queries: &'q QuerySet,
    policy: DecodePolicy,
    shapes: HashMap<Vec<Fxy>, Shape>,
    fields: Vec<FieldAccumulator>,
    records: usize,
    stats: ExecutionStats,
}

impl<'q> Executor<'q> {
    pub fn new(queries: &'q QuerySet, policy: DecodePolicy) -> Self {
        let fields = queries
            .iter()
            .map(|q| FieldAccumulator {
                extents: vec![0; q.dim_paths.len() - 1],
                entries: Vec::new(),
            })
            .collect();

        Self {
            queries,
            policy,
            shapes: HashMap::new(),
            fields,
            records: 0,
            stats: ExecutionStats::default(),
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    pub fn add_file(&mut self, file: &BufrFile) -> QueryResult<()> {
        for item in file.messages() {
            self.add_parsed(item)?;
        }
        Ok(())
    }

    /// Add the outcome of splitting one message from a file.
    pub fn add_parsed(&mut self, item: BufrResult<Message>) -> QueryResult<()> {
        match item {
            Ok(message) => self.add_message(&message),
            Err(err) => self.handle_failure(err),
        }
    }

    pub fn add_message(&mut self, message: &Message) -> QueryResult<()> {
        if message.is_table_message() {
            self.stats.table_messages += 1;
            tracing::debug!("Skipping embedded table message");
            return Ok(());
        }

        // Decode fully before touching any accumulated rows.
        let roots = match self.decode(message) {
            Ok(roots) => roots,
            Err(err) => return self.handle_failure(err),
        };

        self.stats.messages += 1;
        for root in &roots {
            if self.queries.includes_subset(&root.mnemonic) {
                self.add_subset(root);
            }
        }
        Ok(())
    }

    /// Apply every query to one decoded subset, adding one record.
    pub fn add_subset(&mut self, root: &Node) {
        let record = self.records;
        for (query, field) in self.queries.iter().zip(self.fields.iter_mut()) {
            for (coords, value) in resolve(root, &query.path, &query.repeating) {
                for (extent, c) in field.extents.iter_mut().zip(&coords) {
                    *extent = (*extent).max(c + 1);
                }
                field.entries.push((record, coords, value));
            }
        }
        self.records += 1;
        self.stats.subsets += 1;
    }

    fn decode(&mut self, message: &Message) -> BufrResult<Vec<Node>> {
        let descriptors = &message.description.descriptors;
        if !self.shapes.contains_key(descriptors) {
            let shape = Shape::compile(self.queries.table(), descriptors)?;
            self.shapes.insert(descriptors.clone(), shape);
        }
        match self.shapes.get(descriptors) {
            Some(shape) => decode_with_shape(message, shape),
            None => Err(BufrError::malformed("descriptor shape unavailable")),
        }
    }

    fn handle_failure(&mut self, err: BufrError) -> QueryResult<()> {
        if self.policy == DecodePolicy::Abort || !err.is_message_local() {
            return Err(QueryError::Decode(err));
        }
        self.stats.skipped_messages += 1;
        tracing::warn!(error = %err, "Skipping message that failed to decode");
        Ok(())
    }

    /// Materialise one array per field.
    ///
    /// Ragged repeating dimensions are padded with fill up to the largest
    /// extent seen.
    pub fn finish(self) -> QueryResult<ResultSet> {
        let mut fields = Vec::with_capacity(self.fields.len());

        for (query, acc) in self.queries.iter().zip(self.fields) {
            let mut dims = vec![self.records];
            dims.extend_from_slice(&acc.extents);
            let row_len: usize = acc.extents.iter().product();
            let total = self.records * row_len;

            let data = if query.value_type == ValueType::Text {
                let mut values: Vec<Option<String>> = vec![None; total];
                for (record, coords, value) in acc.entries {
                    let idx = record * row_len + flat_index(&coords, &acc.extents);
                    values[idx] = match value {
                        Value::Text(t) => t,
                        Value::Numeric(n) => n.map(|v| v.to_string()),
                    };
                }
                DataArray::from_text(dims, values)?
            } else {
                let mut values: Vec<Option<f64>> = vec![None; total];
                for (record, coords, value) in acc.entries {
                    let idx = record * row_len + flat_index(&coords, &acc.extents);
                    values[idx] = match value {
                        Value::Numeric(n) => n,
                        Value::Text(t) => t.and_then(|s| s.trim().parse().ok()),
                    };
                }
                DataArray::from_values(query.value_type, dims, &values)?
            };

            fields.push(Field {
                name: query.name.clone(),
                query: query.path.to_string(),
                dim_paths: query.dim_paths.clone(),
                data,
            });
        }

        tracing::debug!(
            records = self.records,
            messages = self.stats.messages,
            skipped = self.stats.skipped_messages,
            "Query execution finished"
        );
        Ok(ResultSet::new(fields, self.records))
    }
}

fn flat_index(coords: &[usize], extents: &[usize]) -> usize {
    coords
        .iter()
        .zip(extents)
        .fold(0, |acc, (c, extent)| acc * extent + c)
}

/// Execute `queries` over every message of `file`, in file order.
pub fn execute(file: &BufrFile, queries: &QuerySet, policy: DecodePolicy) -> QueryResult<ResultSet> {
    let mut executor = Executor::new(queries, policy);
    executor.add_file(file)?;
    executor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index() {
        assert_eq!(flat_index(&[], &[]), 0);
        assert_eq!(flat_index(&[2], &[5]), 2);
        assert_eq!(flat_index(&[1, 2], &[3, 4]), 6);
    }
}
