pub mod flow;
pub mod input_partition;
pub mod priority_queue_reader;
pub mod reader;

pub use flow::ExchangeFlow;
pub use priority_queue_reader::{PriorityQueueReader, ReaderState};
pub use reader::ExchangeReader;

use cascade_lib::record::RecordMeta;

use crate::executor::function::AggregateFunctionKind;

/// Key columns a group exchange groups and orders by.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub key_indices: Vec<usize>,
}

/// One output column of an aggregate exchange.
#[derive(Debug, Clone)]
pub struct AggregateColumn {
    pub function: AggregateFunctionKind,
    /// Input field index of the argument; `None` for COUNT(*).
    pub argument: Option<usize>,
}

/// Keys plus aggregate columns of an aggregate exchange. The output record
/// layout is the key values in `key_indices` order followed by one value
/// per aggregate column.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub key_indices: Vec<usize>,
    pub columns: Vec<AggregateColumn>,
}

/// What an exchange does with the records flowing through it.
#[derive(Debug, Clone)]
pub enum ExchangeKind {
    /// 1:1 passthrough.
    Forward,
    /// Pregroup by key, k-way merge to a key-ordered read.
    Group(GroupSpec),
    /// Group with incremental aggregation applied on insertion.
    Aggregate(AggregateSpec),
    /// Copy every input partition to every downstream partition.
    Broadcast,
}

/// Static definition of an exchange step. Partition counts are derived
/// from the neighboring process steps at activation.
#[derive(Debug, Clone)]
pub struct ExchangeSpec {
    pub kind: ExchangeKind,
    /// Shape of the records entering the exchange.
    pub meta: RecordMeta,
}

impl ExchangeSpec {
    pub fn new(kind: ExchangeKind, meta: RecordMeta) -> Self {
        Self { kind, meta }
    }
}
