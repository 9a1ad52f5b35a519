use std::collections::HashMap;

use crate::dag::step_state::{StepStateKind, TaskKind, TaskStateKind};
use crate::model::task::{TaskId, UNINITIALIZED_TASK_ID};

/// Per-step task bookkeeping: the primary state plus one slot per
/// scheduled task and its latest observed state. Slots can be assigned
/// before the tasks exist; a step is complete in a kind when every slot of
/// that kind reports `Completed`.
#[derive(Default)]
pub struct StepStateTable {
    pub state: StepStateKind,
    main_slots: Vec<TaskId>,
    pre_slots: Vec<TaskId>,
    main_status: HashMap<TaskId, TaskStateKind>,
    pre_status: HashMap<TaskId, TaskStateKind>,
}

impl StepStateTable {
    /// Reserves `n` more slots of the kind.
    pub fn assign_slot(&mut self, kind: TaskKind, n: usize) {
        let slots = self.slots_mut(kind);
        let len = slots.len();
        slots.resize(len + n, UNINITIALIZED_TASK_ID);
    }

    pub fn slots(&self, kind: TaskKind) -> usize {
        match kind {
            TaskKind::Main => self.main_slots.len(),
            TaskKind::Pre => self.pre_slots.len(),
        }
    }

    pub fn uninitialized_slot(&self, kind: TaskKind, index: usize) -> bool {
        let slots = match kind {
            TaskKind::Main => &self.main_slots,
            TaskKind::Pre => &self.pre_slots,
        };
        slots
            .get(index)
            .map(|id| *id == UNINITIALIZED_TASK_ID)
            .unwrap_or(true)
    }

    /// Fills one slot with a scheduled task's identity.
    ///
    /// # Panics
    /// Panics when the slot does not exist.
    pub fn register_task(&mut self, kind: TaskKind, slot: usize, id: TaskId) {
        let slots = self.slots_mut(kind);
        assert!(slot < slots.len(), "insufficient slots");
        slots[slot] = id;
        match kind {
            TaskKind::Main => self.main_status.insert(id, TaskStateKind::Init),
            TaskKind::Pre => self.pre_status.insert(id, TaskStateKind::Init),
        };
    }

    /// Records a task's state; returns which kind the task belongs to, or
    /// `None` when the identity is unknown to this step.
    pub fn record_task_state(&mut self, id: TaskId, state: TaskStateKind) -> Option<TaskKind> {
        if self.main_slots.contains(&id) {
            self.main_status.insert(id, state);
            return Some(TaskKind::Main);
        }
        if self.pre_slots.contains(&id) {
            self.pre_status.insert(id, state);
            return Some(TaskKind::Pre);
        }
        None
    }

    /// Whether every slot of the kind reports completion.
    pub fn completed(&self, kind: TaskKind) -> bool {
        let (slots, status) = match kind {
            TaskKind::Main => (&self.main_slots, &self.main_status),
            TaskKind::Pre => (&self.pre_slots, &self.pre_status),
        };
        slots.iter().all(|id| {
            *id != UNINITIALIZED_TASK_ID
                && status.get(id) == Some(&TaskStateKind::Completed)
        })
    }

    fn slots_mut(&mut self, kind: TaskKind) -> &mut Vec<TaskId> {
        match kind {
            TaskKind::Main => &mut self.main_slots,
            TaskKind::Pre => &mut self.pre_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_kind_is_trivially_complete() {
        let table = StepStateTable::default();
        assert!(table.completed(TaskKind::Main));
        assert!(table.completed(TaskKind::Pre));
    }

    #[test]
    fn test_unfilled_slots_block_completion() {
        let mut table = StepStateTable::default();
        table.assign_slot(TaskKind::Main, 2);
        assert!(!table.completed(TaskKind::Main));
        table.register_task(TaskKind::Main, 0, 10);
        table.register_task(TaskKind::Main, 1, 11);
        assert!(!table.completed(TaskKind::Main));
        assert_eq!(
            table.record_task_state(10, TaskStateKind::Completed),
            Some(TaskKind::Main)
        );
        assert!(!table.completed(TaskKind::Main));
        table.record_task_state(11, TaskStateKind::Completed);
        assert!(table.completed(TaskKind::Main));
    }

    #[test]
    fn test_unknown_task_identity() {
        let mut table = StepStateTable::default();
        table.assign_slot(TaskKind::Main, 1);
        table.register_task(TaskKind::Main, 0, 5);
        assert_eq!(table.record_task_state(99, TaskStateKind::Completed), None);
    }

    #[test]
    fn test_pre_and_main_tracked_separately() {
        let mut table = StepStateTable::default();
        table.assign_slot(TaskKind::Main, 1);
        table.assign_slot(TaskKind::Pre, 1);
        table.register_task(TaskKind::Main, 0, 1);
        table.register_task(TaskKind::Pre, 0, 2);
        assert_eq!(
            table.record_task_state(2, TaskStateKind::Completed),
            Some(TaskKind::Pre)
        );
        assert!(table.completed(TaskKind::Pre));
        assert!(!table.completed(TaskKind::Main));
    }

    #[test]
    #[should_panic(expected = "insufficient slots")]
    fn test_register_out_of_range_panics() {
        let mut table = StepStateTable::default();
        table.register_task(TaskKind::Main, 0, 1);
    }

    #[test]
    fn test_uninitialized_slot_queries() {
        let mut table = StepStateTable::default();
        table.assign_slot(TaskKind::Main, 1);
        assert!(table.uninitialized_slot(TaskKind::Main, 0));
        table.register_task(TaskKind::Main, 0, 42);
        assert!(!table.uninitialized_slot(TaskKind::Main, 0));
        assert!(table.uninitialized_slot(TaskKind::Main, 5));
    }
}
