use std::collections::HashMap;

use cascade_lib::error::EngineResult;
use cascade_lib::hash::hash_record_keys;
use cascade_lib::record::Record;

use crate::executor::exchange::AggregateSpec;
use crate::executor::function::AggregateState;

/// Accumulated aggregate states for one distinct key.
#[derive(Debug, Clone)]
pub struct AggregateGroup {
    pub key: Vec<cascade_lib::value::Value>,
    pub states: Vec<AggregateState>,
}

/// Receiving side of an exchange for one upstream writer: per-downstream
/// buffers for record-routing kinds, and the running group table for the
/// aggregate kind.
#[derive(Default)]
pub struct InputPartition {
    buffers: Vec<Vec<Record>>,
    groups: HashMap<u64, Vec<AggregateGroup>>,
}

impl InputPartition {
    pub fn new(downstream_partitions: usize) -> Self {
        Self {
            buffers: (0..downstream_partitions).map(|_| Vec::new()).collect(),
            groups: HashMap::new(),
        }
    }

    pub fn push(&mut self, downstream: usize, record: Record) {
        self.buffers[downstream].push(record);
    }

    pub fn push_all(&mut self, record: Record) {
        for buffer in &mut self.buffers {
            buffer.push(record.clone());
        }
    }

    /// Pre-phase aggregation applied on insertion.
    pub fn aggregate(&mut self, spec: &AggregateSpec, record: Record) -> EngineResult<()> {
        let values = record.into_values();
        let hash = hash_record_keys(&values, &spec.key_indices);
        let bucket = self.groups.entry(hash).or_default();
        let position = bucket.iter().position(|g| {
            g.key
                .iter()
                .zip(spec.key_indices.iter().map(|&i| &values[i]))
                .all(|(a, b)| cascade_lib::compare::equal_values(a, b))
        });
        let index = match position {
            Some(i) => i,
            None => {
                let key = spec.key_indices.iter().map(|&i| values[i].clone()).collect();
                let states = spec.columns.iter().map(|c| c.function.new_state()).collect();
                bucket.push(AggregateGroup { key, states });
                bucket.len() - 1
            }
        };
        let group = &mut bucket[index];
        for (state, column) in group.states.iter_mut().zip(spec.columns.iter()) {
            state.accumulate(column.argument.map(|i| &values[i]))?;
        }
        Ok(())
    }

    pub fn take_buffer(&mut self, downstream: usize) -> Vec<Record> {
        std::mem::take(&mut self.buffers[downstream])
    }

    pub fn take_groups(&mut self) -> Vec<AggregateGroup> {
        let mut out = Vec::new();
        for (_, mut bucket) in self.groups.drain() {
            out.append(&mut bucket);
        }
        out
    }

    pub fn buffered(&self, downstream: usize) -> usize {
        self.buffers[downstream].len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().map(|b| b.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::exchange::AggregateColumn;
    use crate::executor::function::AggregateFunctionKind;
    use cascade_lib::value::Value;

    #[test]
    fn test_routed_buffers() {
        let mut p = InputPartition::new(2);
        p.push(0, Record::new(vec![Value::Int4(1)]));
        p.push(1, Record::new(vec![Value::Int4(2)]));
        p.push(1, Record::new(vec![Value::Int4(3)]));
        assert_eq!(p.buffered(0), 1);
        assert_eq!(p.buffered(1), 2);
        assert_eq!(p.take_buffer(1).len(), 2);
        assert_eq!(p.buffered(1), 0);
    }

    #[test]
    fn test_aggregate_groups_by_key() {
        let spec = AggregateSpec {
            key_indices: vec![0],
            columns: vec![AggregateColumn {
                function: AggregateFunctionKind::Sum,
                argument: Some(1),
            }],
        };
        let mut p = InputPartition::new(1);
        for (k, v) in [(1, 10), (2, 20), (1, 5)] {
            p.aggregate(&spec, Record::new(vec![Value::Int4(k), Value::Int4(v)]))
                .unwrap();
        }
        assert_eq!(p.group_count(), 2);
        let mut groups = p.take_groups();
        groups.sort_by_key(|g| g.key[0].as_int());
        let sums: Vec<_> = groups
            .into_iter()
            .map(|g| g.states.into_iter().next().unwrap().finish())
            .collect();
        assert_eq!(sums, vec![Value::Int8(15), Value::Int8(20)]);
    }
}
