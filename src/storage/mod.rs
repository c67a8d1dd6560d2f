//! Physical storage layer: the per-partition data file and WAL.

pub mod data_file;
pub mod wal;

pub use data_file::DataFile;
pub use wal::{PartitionWal, WalRecord};
