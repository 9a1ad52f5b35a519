//! The transactional key-value façade the execution engine runs against.
//!
//! The engine treats storage as opaque: named ordered byte-keyed storages,
//! transactions with point ops and scans, and durability notifications
//! delivered out of line. This crate provides the in-memory implementation
//! used by the embedded server, plus the process-wide storage directory
//! with shared/exclusive storage controls that arbitrates DML vs DDL.

pub mod durability;
pub mod engine;
pub mod manager;
pub mod sequence;
pub mod transaction;

pub use durability::DurabilityCore;
pub use engine::{Storage, StorageEngine, StorageId};
pub use manager::{SharedLock, StorageControl, StorageManager, UniqueLock};
pub use sequence::SequenceRepository;
pub use transaction::{PutMode, ScanBound, StorageTransaction, TransactionType};

/// Log sequence number assigned at commit; durability notifications carry
/// the highest LSN known durable.
pub type Lsn = u64;
