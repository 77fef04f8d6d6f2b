//! Mnemonic path queries over decoded BUFR messages.
//!
//! A [`QuerySet`] maps field names to paths such as `*/BRIT/TMBR`. Paths are
//! validated against the descriptor table when they are added; executing the
//! set over a file produces a [`ResultSet`] of typed, fill-aware arrays.

pub mod error;
pub mod executor;
pub mod listing;
pub mod path;
pub mod query_set;
pub mod resolve;
pub mod result_set;

pub use error::{QueryError, QueryResult};
pub use executor::{execute, ExecutionStats, Executor};
pub use listing::{list_queries, QueryInfo};
pub use path::{QueryPath, Segment};
pub use query_set::{Query, QuerySet};
pub use result_set::{Field, ResultSet};
