use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cascade_lib::record::Record;

use crate::executor::process::ProcessLogic;

/// Runtime object of a process step: the logic, the partition count, and
/// the side data loaded by prepare-phase tasks (one slot per sub-input).
pub struct ProcessFlow {
    partitions: usize,
    logic: Arc<dyn ProcessLogic>,
    side_data: Mutex<HashMap<usize, Vec<Record>>>,
}

impl ProcessFlow {
    pub fn new(partitions: usize, logic: Arc<dyn ProcessLogic>) -> Self {
        Self {
            partitions,
            logic,
            side_data: Mutex::new(HashMap::new()),
        }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn logic(&self) -> Arc<dyn ProcessLogic> {
        Arc::clone(&self.logic)
    }

    pub fn store_side_data(&self, sub_input: usize, records: Vec<Record>) {
        self.side_data.lock().unwrap().insert(sub_input, records);
    }

    pub fn side_data(&self, sub_input: usize) -> Vec<Record> {
        self.side_data
            .lock()
            .unwrap()
            .get(&sub_input)
            .cloned()
            .unwrap_or_default()
    }
}
