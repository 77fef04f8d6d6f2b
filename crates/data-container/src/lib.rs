//! Containers of resolved arrays and the machinery to share them.
//!
//! A [`DataContainer`] holds named arrays whose rows carry a category
//! label. Containers can be combined across cooperating ranks through a
//! [`Communicator`] and shared between consumers with a [`DataCache`].

pub mod cache;
pub mod container;
pub mod distribute;
pub mod error;

pub use cache::{CacheStats, DataCache};
pub use container::DataContainer;
pub use distribute::{Communicator, LocalGroup, SingleProcess};
pub use error::{CacheError, CacheResult, ContainerError, ContainerResult};
