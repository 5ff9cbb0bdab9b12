//! Backend-neutral filter representation and its translation into native queries.

mod compile;
mod expr;

pub use compile::{compile_filter, Predicate, QueryDialect};
pub use expr::{FieldFilter, FieldPath, FilterExpression, Operator, AND_KEY, OR_KEY};
