//! Shared cache of parsed containers.
//!
//! Several consumers (typically one encoder per category) can share a
//! single parse of a (source, mapping) pair. Each consumer marks its
//! category finished when done; the entry is evicted once every category
//! registered at `add` time has been finished.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bufr_common::Category;
use tracing::{debug, info};

use crate::container::DataContainer;
use crate::error::{CacheError, CacheResult};

type CacheKey = (String, String);

struct CacheEntry {
    container: Arc<DataContainer>,
    pending: BTreeSet<Category>,
    registered: BTreeSet<Category>,
}

/// Statistics for the container cache
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Cache of parsed containers keyed by (source path, mapping path).
///
/// Construct one per run and share it by reference or through an `Arc`.
/// Reads take a shared lock; `add` and `mark_finished` are serialized.
#[derive(Default)]
pub struct DataCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    stats: RwLock<CacheStats>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a container for the given categories.
    ///
    /// An empty category list registers the main category.
    pub fn add(
        &self,
        source: &str,
        mapping: &str,
        categories: &[Category],
        container: DataContainer,
    ) -> CacheResult<Arc<DataContainer>> {
        let key = (source.to_string(), mapping.to_string());
        let mut entries = self.write_entries();
        if entries.contains_key(&key) {
            return Err(CacheError::AlreadyExists {
                source_path: key.0,
                mapping_path: key.1,
            });
        }

        let mut registered: BTreeSet<Category> = categories.iter().cloned().collect();
        if registered.is_empty() {
            registered.insert(Category::main());
        }
        let container = Arc::new(container);
        debug!(
            source = %source,
            mapping = %mapping,
            categories = registered.len(),
            rows = container.len(),
            "Cached container"
        );
        entries.insert(
            key,
            CacheEntry {
                container: Arc::clone(&container),
                pending: registered.clone(),
                registered,
            },
        );
        self.write_stats().entries = entries.len();
        Ok(container)
    }

    pub fn has(&self, source: &str, mapping: &str) -> bool {
        self.read_entries()
            .contains_key(&(source.to_string(), mapping.to_string()))
    }

    /// Shared handle to a cached container.
    pub fn get(&self, source: &str, mapping: &str) -> CacheResult<Arc<DataContainer>> {
        let found = self
            .read_entries()
            .get(&(source.to_string(), mapping.to_string()))
            .map(|entry| Arc::clone(&entry.container));

        let mut stats = self.write_stats();
        match found {
            Some(container) => {
                stats.hits += 1;
                Ok(container)
            }
            None => {
                stats.misses += 1;
                Err(CacheError::NotFound {
                    source_path: source.to_string(),
                    mapping_path: mapping.to_string(),
                })
            }
        }
    }

    /// Record that one consumer is done with `category`.
    ///
    /// Returns true when this call evicted the entry. Finishing the same
    /// category twice has no further effect.
    pub fn mark_finished(
        &self,
        source: &str,
        mapping: &str,
        category: &Category,
    ) -> CacheResult<bool> {
        let key = (source.to_string(), mapping.to_string());
        let mut entries = self.write_entries();
        let entry = entries.get_mut(&key).ok_or_else(|| CacheError::NotFound {
            source_path: source.to_string(),
            mapping_path: mapping.to_string(),
        })?;

        if !entry.registered.contains(category) {
            return Err(CacheError::UnknownCategory {
                category: category.to_string(),
                source_path: source.to_string(),
                mapping_path: mapping.to_string(),
            });
        }
        entry.pending.remove(category);
        if !entry.pending.is_empty() {
            debug!(
                source = %source,
                category = %category,
                remaining = entry.pending.len(),
                "Category finished"
            );
            return Ok(false);
        }

        entries.remove(&key);
        let mut stats = self.write_stats();
        stats.entries = entries.len();
        stats.evictions += 1;
        debug!(source = %source, mapping = %mapping, "Evicted container");
        Ok(true)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_stats(&self) -> RwLockWriteGuard<'_, CacheStats> {
        self.stats
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DataCache {
    fn drop(&mut self) {
        let entries = self.read_entries();
        if !entries.is_empty() {
            let keys: Vec<String> = entries
                .keys()
                .map(|(source, mapping)| format!("{} ({})", source, mapping))
                .collect();
            info!(entries = entries.len(), keys = ?keys, "Data cache dropped with unfinished entries");
        }
    }
}
