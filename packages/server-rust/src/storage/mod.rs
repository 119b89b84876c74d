//! Backing-store connectivity probes.

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresProbe, StorageConfig};
