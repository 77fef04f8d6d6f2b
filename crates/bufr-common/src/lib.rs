//! Common types shared across the BUFR decoding and query crates.

pub mod array;
pub mod category;
pub mod error;
pub mod time;

pub use array::{ArrayData, DataArray, KeyAtom, ValueType};
pub use category::Category;
pub use error::{CommonError, CommonResult};
pub use time::{timestamp_from_parts, DateTimeArray, TIMESTAMP_FILL};
