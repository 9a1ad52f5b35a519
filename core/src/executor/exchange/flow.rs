use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use cascade_lib::compare::RecordComparator;
use cascade_lib::error::EngineResult;
use cascade_lib::hash::hash_record;
use cascade_lib::record::{Record, RecordMeta};
use tracing::trace;

use crate::executor::exchange::input_partition::{AggregateGroup, InputPartition};
use crate::executor::exchange::priority_queue_reader::PriorityQueueReader;
use crate::executor::exchange::reader::ExchangeReader;
use crate::executor::exchange::{ExchangeKind, ExchangeSpec};
use crate::executor::partitioner::Partitioner;

/// One transferred run of records, tagged with its sink of origin so ties
/// keep insertion order across partitions.
struct Run {
    origin: usize,
    records: Vec<Record>,
}

#[derive(Default)]
struct SourceState {
    runs: Vec<Run>,
    merged_groups: HashMap<u64, Vec<AggregateGroup>>,
}

/// Runtime object of an exchange step.
///
/// Sinks receive records from upstream process tasks; `transfer` pushes
/// each sink's per-partition buffers into the sources at the handoff
/// boundary; sources serve reads to downstream process tasks.
pub struct ExchangeFlow {
    spec: ExchangeSpec,
    input_partitions: usize,
    output_partitions: usize,
    partitioner: Option<Partitioner>,
    sinks: Vec<Mutex<InputPartition>>,
    sources: Vec<Mutex<SourceState>>,
    transferred: AtomicBool,
}

impl ExchangeFlow {
    pub fn new(spec: ExchangeSpec, input_partitions: usize, output_partitions: usize) -> Self {
        let output_partitions = output_partitions.max(1);
        let partitioner = match &spec.kind {
            ExchangeKind::Group(g) => {
                Some(Partitioner::new(output_partitions, g.key_indices.clone()))
            }
            ExchangeKind::Aggregate(a) => {
                Some(Partitioner::new(output_partitions, a.key_indices.clone()))
            }
            _ => None,
        };
        let sinks = (0..input_partitions.max(1))
            .map(|_| Mutex::new(InputPartition::new(output_partitions)))
            .collect();
        let sources = (0..output_partitions)
            .map(|_| Mutex::new(SourceState::default()))
            .collect();
        Self {
            spec,
            input_partitions: input_partitions.max(1),
            output_partitions,
            partitioner,
            sinks,
            sources,
            transferred: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &ExchangeKind {
        &self.spec.kind
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.spec.meta
    }

    pub fn input_partitions(&self) -> usize {
        self.input_partitions
    }

    pub fn output_partitions(&self) -> usize {
        self.output_partitions
    }

    /// Writes one record into the given sink, routing it per the exchange
    /// kind.
    pub fn write(&self, sink: usize, record: Record) -> EngineResult<()> {
        let mut partition = self.sinks[sink].lock().unwrap();
        match &self.spec.kind {
            ExchangeKind::Forward => {
                partition.push(sink % self.output_partitions, record);
            }
            ExchangeKind::Group(_) => {
                let p = self
                    .partitioner
                    .as_ref()
                    .expect("group exchange has a partitioner")
                    .partition(record.values());
                partition.push(p, record);
            }
            ExchangeKind::Aggregate(spec) => {
                partition.aggregate(spec, record)?;
            }
            ExchangeKind::Broadcast => {
                partition.push_all(record);
            }
        }
        Ok(())
    }

    /// Moves every sink's buffers into the sources. Runs once, when the
    /// upstream steps completed; for the group kind the runs are sorted by
    /// key here so sources can merge them.
    pub fn transfer(&self) {
        if self.transferred.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(kind = ?self.spec.kind, "exchange transfer");
        match &self.spec.kind {
            ExchangeKind::Aggregate(spec) => {
                let partitioner = self.partitioner.as_ref().expect("aggregate partitioner");
                for sink_index in 0..self.input_partitions {
                    let groups = self.sinks[sink_index].lock().unwrap().take_groups();
                    for group in groups {
                        let p = if spec.key_indices.is_empty() {
                            0
                        } else {
                            partitioner.partition_key_values(&group.key)
                        };
                        let mut source = self.sources[p].lock().unwrap();
                        merge_group(&mut source.merged_groups, group);
                    }
                }
            }
            kind => {
                let sort_keys = match kind {
                    ExchangeKind::Group(g) => Some(g.key_indices.clone()),
                    _ => None,
                };
                for sink_index in 0..self.input_partitions {
                    for p in 0..self.output_partitions {
                        let mut records =
                            self.sinks[sink_index].lock().unwrap().take_buffer(p);
                        if records.is_empty() {
                            continue;
                        }
                        if let Some(keys) = &sort_keys {
                            let comparator = RecordComparator::with_key_indices(keys.clone());
                            records
                                .sort_by(|a, b| comparator.compare(a.values(), b.values()));
                        }
                        self.sources[p].lock().unwrap().runs.push(Run {
                            origin: sink_index,
                            records,
                        });
                    }
                }
            }
        }
    }

    pub fn transferred(&self) -> bool {
        self.transferred.load(Ordering::SeqCst)
    }

    /// Read handle for one output partition. Valid after `transfer`.
    pub fn reader(&self, output_partition: usize) -> ExchangeReader {
        debug_assert!(self.transferred(), "reading an untransferred exchange");
        let mut source = self.sources[output_partition].lock().unwrap();
        match &self.spec.kind {
            ExchangeKind::Group(g) => {
                let mut runs: Vec<Run> = std::mem::take(&mut source.runs);
                runs.sort_by_key(|r| r.origin);
                let runs = runs.into_iter().map(|r| r.records).collect();
                ExchangeReader::group(PriorityQueueReader::new(g.key_indices.clone(), runs))
            }
            ExchangeKind::Aggregate(spec) => {
                let mut groups: Vec<AggregateGroup> = source
                    .merged_groups
                    .drain()
                    .flat_map(|(_, bucket)| bucket)
                    .collect();
                let comparator = RecordComparator::new();
                groups.sort_by(|a, b| comparator.compare(&a.key, &b.key));
                let records = groups
                    .into_iter()
                    .map(|g| {
                        let mut values = g.key;
                        for state in g.states {
                            values.push(state.finish());
                        }
                        Record::new(values)
                    })
                    .collect();
                ExchangeReader::records(records)
            }
            _ => {
                let mut runs: Vec<Run> = std::mem::take(&mut source.runs);
                runs.sort_by_key(|r| r.origin);
                let records = runs.into_iter().flat_map(|r| r.records).collect();
                ExchangeReader::records(records)
            }
        }
    }
}

fn merge_group(target: &mut HashMap<u64, Vec<AggregateGroup>>, group: AggregateGroup) {
    let hash = hash_record(&group.key);
    let bucket = target.entry(hash).or_default();
    let position = bucket.iter().position(|g| {
        g.key
            .iter()
            .zip(group.key.iter())
            .all(|(a, b)| cascade_lib::compare::equal_values(a, b))
    });
    match position {
        Some(i) => {
            let existing = &mut bucket[i];
            for (state, incoming) in existing.states.iter_mut().zip(group.states) {
                // states of the same column always share a kind
                let _ = state.combine(incoming);
            }
        }
        None => bucket.push(group),
    }
}

impl Partitioner {
    /// Partition for already-extracted key values.
    pub fn partition_key_values(&self, key: &[cascade_lib::value::Value]) -> usize {
        (hash_record(key) % self.partitions() as u64) as usize
    }
}
