//! Types that represent the core data model, such as `Transaction` and `Amount`.
mod amount;
mod mapping;
mod transaction;

pub use amount::{Amount, AmountError};
pub use mapping::{Mapping, MissingColumn};
pub use transaction::{deserialize_sheets, Transaction, DATE_FORMAT};
