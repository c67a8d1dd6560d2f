//! Transaction subsystem: MVCC allocation, transaction lifecycle, SSI-lite
//! conflict checking, the 2PC coordinator log, and recovery.

pub mod coordinator_log;
pub mod manager;
pub mod mvcc;
pub mod recovery;
pub mod ssi;

pub use coordinator_log::{CoordinatorLog, Decision};
pub use manager::{OverlayResult, PendingOp, Transaction, TransactionManager, TxState};
pub use mvcc::MvccAllocator;
pub use ssi::{has_conflict, CommitHistory, CommitRecord, Key};
