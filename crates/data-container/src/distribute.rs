//! Collective operations over cooperating ranks.
//!
//! Every rank must call the same collective in the same order. Payloads are
//! opaque [`Bytes`]; containers travel as JSON so the receiving side can
//! rebuild them exactly.

use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, info};

use crate::container::DataContainer;
use crate::error::{ContainerError, ContainerResult};

/// Blocking collectives between a fixed set of ranks.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Collect one payload per rank at `root`, in rank order. Other ranks
    /// receive `None`.
    fn gather(&self, payload: Bytes, root: usize) -> ContainerResult<Option<Vec<Bytes>>>;

    /// Collect one payload per rank on every rank, in rank order.
    fn all_gather(&self, payload: Bytes) -> ContainerResult<Vec<Bytes>>;

    /// Send `root`'s payload to every rank. The payload passed by other
    /// ranks is ignored.
    fn broadcast(&self, payload: Bytes, root: usize) -> ContainerResult<Bytes>;
}

/// The trivial communicator for a run with one rank.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn gather(&self, payload: Bytes, root: usize) -> ContainerResult<Option<Vec<Bytes>>> {
        check_root(root, 1)?;
        Ok(Some(vec![payload]))
    }

    fn all_gather(&self, payload: Bytes) -> ContainerResult<Vec<Bytes>> {
        Ok(vec![payload])
    }

    fn broadcast(&self, payload: Bytes, root: usize) -> ContainerResult<Bytes> {
        check_root(root, 1)?;
        Ok(payload)
    }
}

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Bytes>>>,
}

/// In-process ranks that rendezvous on a shared barrier.
///
/// Create the whole group with [`LocalGroup::new`] and hand one member to
/// each worker thread.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// One communicator per rank.
    pub fn new(size: usize) -> Vec<LocalGroup> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![None; size]),
        });
        (0..size)
            .map(|rank| LocalGroup {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<Bytes>>> {
        self.shared
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish this rank's payload and wait for every rank to do the same.
    fn exchange(&self, payload: Option<Bytes>) -> ContainerResult<Vec<Option<Bytes>>> {
        if let Some(payload) = payload {
            self.slots()[self.rank] = Some(payload);
        }
        self.shared.barrier.wait();
        let snapshot = self.slots().clone();
        self.shared.barrier.wait();
        self.slots()[self.rank] = None;
        Ok(snapshot)
    }
}

impl Communicator for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn gather(&self, payload: Bytes, root: usize) -> ContainerResult<Option<Vec<Bytes>>> {
        check_root(root, self.size)?;
        let slots = self.exchange(Some(payload))?;
        if self.rank != root {
            return Ok(None);
        }
        collect(slots).map(Some)
    }

    fn all_gather(&self, payload: Bytes) -> ContainerResult<Vec<Bytes>> {
        collect(self.exchange(Some(payload))?)
    }

    fn broadcast(&self, payload: Bytes, root: usize) -> ContainerResult<Bytes> {
        check_root(root, self.size)?;
        let payload = (self.rank == root).then_some(payload);
        let mut slots = self.exchange(payload)?;
        slots[root].take().ok_or_else(|| {
            ContainerError::Communication(format!("rank {} sent no broadcast payload", root))
        })
    }
}

fn check_root(root: usize, size: usize) -> ContainerResult<()> {
    if root >= size {
        return Err(ContainerError::Communication(format!(
            "root rank {} outside group of {}",
            root, size
        )));
    }
    Ok(())
}

fn collect(slots: Vec<Option<Bytes>>) -> ContainerResult<Vec<Bytes>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(rank, slot)| {
            slot.ok_or_else(|| {
                ContainerError::Communication(format!("rank {} sent no payload", rank))
            })
        })
        .collect()
}

// ===== Container collectives =====

fn encode(container: &DataContainer) -> ContainerResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(container)?))
}

fn concatenate(payloads: &[Bytes]) -> ContainerResult<DataContainer> {
    let mut combined = DataContainer::new();
    for payload in payloads {
        let part: DataContainer = serde_json::from_slice(payload)?;
        combined.append(&part)?;
    }
    Ok(combined)
}

impl DataContainer {
    /// Concatenate every rank's container onto rank 0, in rank order.
    ///
    /// Other ranks keep their local container unchanged.
    pub fn gather(&mut self, comm: &dyn Communicator) -> ContainerResult<()> {
        let payload = encode(self)?;
        if let Some(payloads) = comm.gather(payload, 0)? {
            *self = concatenate(&payloads)?;
            info!(ranks = comm.size(), rows = self.len(), "Gathered container");
        }
        Ok(())
    }

    /// Concatenate every rank's container on every rank, in rank order.
    pub fn all_gather(&mut self, comm: &dyn Communicator) -> ContainerResult<()> {
        let payload = encode(self)?;
        let payloads = comm.all_gather(payload)?;
        *self = concatenate(&payloads)?;
        debug!(rank = comm.rank(), rows = self.len(), "All-gathered container");
        Ok(())
    }

    /// Remove rows whose key tuple was already seen, first occurrence wins.
    ///
    /// Expects every rank to hold the full combined container (call
    /// [`DataContainer::all_gather`] first). Ranks compare their result with
    /// rank 0 and fail if any disagrees.
    pub fn deduplicate(
        &mut self,
        comm: &dyn Communicator,
        key_paths: &[&str],
    ) -> ContainerResult<usize> {
        let (keep, digest) = self.unique_rows(key_paths)?;
        let fingerprint = format!("{}:{:016x}", keep.len(), digest);

        let agreed = comm.broadcast(Bytes::from(fingerprint.clone()), 0)?;
        if agreed.as_ref() != fingerprint.as_bytes() {
            return Err(ContainerError::Communication(format!(
                "rank {} deduplicated to {} but rank 0 reported {}",
                comm.rank(),
                fingerprint,
                String::from_utf8_lossy(&agreed)
            )));
        }

        self.deduplicate_local(key_paths)
    }
}
