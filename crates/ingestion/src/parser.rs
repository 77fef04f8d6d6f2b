//! Turning one BUFR file plus a mapping description into a container.
//!
//! Parsing runs in three phases: execute the description's queries over
//! the file, filter and split the resulting rows, then export every
//! variable (with its transforms) to `variables/<name>`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bufr_common::{Category, DataArray};
use bufr_parser::{BufrFile, DecodePolicy, DescriptorTable};
use bufr_query::{Executor, QuerySet, ResultSet};
use data_container::{CacheError, Communicator, DataCache, DataContainer};
use tracing::{debug, info};

use crate::description::Description;
use crate::error::{IngestionError, Result};
use crate::variables::Variable;

/// Options for a parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum number of messages to read; 0 reads the whole file.
    pub max_messages: usize,
    /// What to do with messages that fail to decode.
    pub policy: DecodePolicy,
}

impl ParseOptions {
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Parser for one (source file, mapping description) pair.
pub struct Parser {
    source: String,
    file: BufrFile,
    description: Description,
    table: Arc<DescriptorTable>,
}

impl Parser {
    /// Open `source` for parsing with `description` against `table`.
    pub fn new(
        source: impl AsRef<Path>,
        description: Description,
        table: Arc<DescriptorTable>,
    ) -> Result<Self> {
        let source = source.as_ref();
        let file = BufrFile::open(source)?;
        info!(file = %source.display(), bytes = file.len(), "Parsing file");
        Ok(Self::from_file(source.display().to_string(), file, description, table))
    }

    /// Parser over an already loaded file.
    pub fn from_file(
        source: impl Into<String>,
        file: BufrFile,
        description: Description,
        table: Arc<DescriptorTable>,
    ) -> Self {
        Self {
            source: source.into(),
            file,
            description,
            table,
        }
    }

    /// Load the mapping at `mapping` and its descriptor table.
    ///
    /// `table` overrides the table named in the mapping.
    pub fn from_mapping(
        source: impl AsRef<Path>,
        mapping: impl AsRef<Path>,
        table: Option<&Path>,
    ) -> Result<Self> {
        let description = Description::from_yaml_path(mapping.as_ref())?;
        let table_path = table
            .map(Path::to_path_buf)
            .or_else(|| description.bufr.table.clone())
            .ok_or_else(|| {
                IngestionError::InvalidConfig(format!(
                    "no descriptor table given for {}",
                    mapping.as_ref().display()
                ))
            })?;
        let table = Arc::new(DescriptorTable::from_yaml_path(&table_path)?);
        Self::new(source, description, table)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Parse the file (or its first `max_messages` messages).
    pub fn parse(&self, options: &ParseOptions) -> Result<DataContainer> {
        self.parse_block(0, self.message_total(options), options.policy)
    }

    /// Parse this rank's contiguous block of messages.
    ///
    /// Messages are divided evenly in file order, lower ranks first. The
    /// result holds only local rows; gather afterwards to combine them.
    pub fn parse_in_parallel(
        &self,
        comm: &dyn Communicator,
        options: &ParseOptions,
    ) -> Result<DataContainer> {
        let total = self.message_total(options);
        let (start, end) = block_range(total, comm.rank(), comm.size());
        info!(
            rank = comm.rank(),
            ranks = comm.size(),
            first_message = start,
            messages = end - start,
            "Parsing message block"
        );
        self.parse_block(start, end - start, options.policy)
    }

    /// Fetch the container for this parser from `cache`, parsing and
    /// registering it on first use under every category it holds.
    pub fn parse_cached(
        &self,
        cache: &DataCache,
        mapping: &str,
        options: &ParseOptions,
    ) -> Result<Arc<DataContainer>> {
        match cache.get(&self.source, mapping) {
            Ok(shared) => return Ok(shared),
            Err(CacheError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let container = self.parse(options)?;
        let categories = container.all_sub_categories();
        match cache.add(&self.source, mapping, &categories, container) {
            Ok(shared) => Ok(shared),
            Err(CacheError::AlreadyExists { .. }) => Ok(cache.get(&self.source, mapping)?),
            Err(err) => Err(err.into()),
        }
    }

    fn message_total(&self, options: &ParseOptions) -> usize {
        let count = self.file.message_count();
        if options.max_messages == 0 {
            count
        } else {
            count.min(options.max_messages)
        }
    }

    fn parse_block(&self, skip: usize, take: usize, policy: DecodePolicy) -> Result<DataContainer> {
        let started = Instant::now();
        let queries = self.query_set()?;

        info!(queries = queries.len(), "Executing queries");
        let mut executor = Executor::new(&queries, policy);
        for item in self.file.messages().skip(skip).take(take) {
            executor.add_parsed(item)?;
        }
        let stats = executor.stats();
        let results = executor.finish()?;

        info!(
            messages = stats.messages,
            skipped = stats.skipped_messages,
            records = results.record_count(),
            "Exporting data"
        );
        let container = self.export(&results)?;

        info!(
            rows = container.len(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "Finished"
        );
        Ok(container)
    }

    fn query_set(&self) -> Result<QuerySet> {
        let bufr = &self.description.bufr;
        let table = Arc::clone(&self.table);
        let mut queries = if bufr.subsets.is_empty() {
            QuerySet::new(table)
        } else {
            QuerySet::with_subsets(table, bufr.subsets.iter().cloned())?
        };

        for variable in &bufr.variables {
            for (name, path) in variable.queries() {
                queries.add(&name, &path)?;
            }
        }
        Ok(queries)
    }

    fn export(&self, results: &ResultSet) -> Result<DataContainer> {
        let bufr = &self.description.bufr;
        let group_by = bufr.group_by_variable.as_deref();

        let mut data: Vec<(&Variable, DataArray)> = bufr
            .variables
            .iter()
            .map(|variable| Ok((variable, variable.fetch(results, group_by)?)))
            .collect::<Result<_>>()?;

        for filter in &bufr.filters {
            let keep = filter.keep_rows(lookup(&data, &filter.variable)?)?;
            let rows = data.first().map_or(0, |(_, array)| array.rows());
            if keep.len() == rows {
                continue;
            }
            debug!(variable = %filter.variable, kept = keep.len(), rows, "Applied bounding filter");
            for (_, array) in data.iter_mut() {
                *array = array.slice_rows(&keep)?;
            }
        }

        let rows = data.first().map_or(0, |(_, array)| array.rows());
        let mut labels = vec![Category::main(); rows];
        for split in &bufr.splits {
            let names = split.labels(lookup(&data, &split.variable)?)?;
            for (label, name) in labels.iter_mut().zip(names) {
                *label = label.with(name);
            }
        }

        let mut container = DataContainer::with_categories(labels);
        for (variable, array) in data {
            let exported = variable.transform(array)?;
            container.add(
                &format!("variables/{}", variable.name),
                exported,
                variable.source_paths(),
                None,
            )?;
        }
        debug!(
            categories = container.all_sub_categories().len(),
            "Exported variables"
        );
        Ok(container)
    }
}

fn lookup<'a>(data: &'a [(&Variable, DataArray)], name: &str) -> Result<&'a DataArray> {
    data.iter()
        .find(|(variable, _)| variable.name == name)
        .map(|(_, array)| array)
        .ok_or_else(|| IngestionError::InvalidConfig(format!("unknown variable {}", name)))
}

/// Half-open range of items assigned to `rank` out of `total`.
fn block_range(total: usize, rank: usize, size: usize) -> (usize, usize) {
    let size = size.max(1);
    (rank * total / size, (rank + 1) * total / size)
}
