//! Infrastructure layer: fact stores, schema migrations, data checks and
//! the Thanos request shaping used by the collector.

pub mod check;
pub mod db;
pub mod memory;
pub mod postgres;
pub mod thanos;


pub use check::{DimensionTable, Missing, MissingField, find_missing};
pub use memory::{InMemoryFactStore, InMemorySnapshot};
pub use postgres::{PostgresFactStore, PostgresSnapshot};
pub use thanos::ThanosRequestShaper;
