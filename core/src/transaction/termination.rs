/// Termination state: task use count and going-to-{commit, abort} flags
/// packed in one unsigned 64-bit word.
///
/// The word is only read and written under the owning transaction's state
/// lock; this type is the plain value arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationState(u64);

impl TerminationState {
    /// Bit mask for the going-to-abort flag.
    pub const BIT_MASK_GOING_TO_ABORT: u64 = 1u64 << 63;

    /// Bit mask for the going-to-commit flag.
    pub const BIT_MASK_GOING_TO_COMMIT: u64 = 1u64 << 62;

    /// Bit mask for the task use count.
    pub const BIT_MASK_TASK_USE_COUNT: u64 = Self::BIT_MASK_GOING_TO_COMMIT - 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// The number of in-transaction tasks using the transaction context.
    pub fn task_use_count(&self) -> u64 {
        self.0 & Self::BIT_MASK_TASK_USE_COUNT
    }

    pub fn set_task_use_count(&mut self, value: u64) {
        self.0 = (self.0 & !Self::BIT_MASK_TASK_USE_COUNT)
            | (value & Self::BIT_MASK_TASK_USE_COUNT);
    }

    pub fn increment_task_use_count(&mut self) {
        debug_assert!(self.task_use_count() < Self::BIT_MASK_TASK_USE_COUNT);
        self.set_task_use_count(self.task_use_count() + 1);
    }

    pub fn decrement_task_use_count(&mut self) {
        debug_assert!(self.task_use_count() > 0);
        self.set_task_use_count(self.task_use_count() - 1);
    }

    pub fn going_to_abort(&self) -> bool {
        (self.0 & Self::BIT_MASK_GOING_TO_ABORT) != 0
    }

    pub fn set_going_to_abort(&mut self) {
        self.0 |= Self::BIT_MASK_GOING_TO_ABORT;
    }

    pub fn going_to_commit(&self) -> bool {
        (self.0 & Self::BIT_MASK_GOING_TO_COMMIT) != 0
    }

    pub fn set_going_to_commit(&mut self) {
        self.0 |= Self::BIT_MASK_GOING_TO_COMMIT;
    }

    /// Whether either termination flag is up, refusing new tasks.
    pub fn terminating(&self) -> bool {
        self.going_to_abort() || self.going_to_commit()
    }

    /// True when no in-transaction task uses the transaction context.
    pub fn task_empty(&self) -> bool {
        self.task_use_count() == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl From<TerminationState> for u64 {
    fn from(value: TerminationState) -> u64 {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_count_and_flags_do_not_interfere() {
        let mut s = TerminationState::new();
        s.set_task_use_count(42);
        s.set_going_to_commit();
        s.set_going_to_abort();
        assert_eq!(s.task_use_count(), 42);
        assert!(s.going_to_commit());
        assert!(s.going_to_abort());
        s.set_task_use_count(0);
        assert!(s.going_to_commit());
        assert!(s.going_to_abort());
        assert!(s.task_empty());
    }

    #[test]
    fn test_count_saturates_at_mask_without_corrupting_flags() {
        let mut s = TerminationState::new();
        s.set_going_to_commit();
        s.set_task_use_count(TerminationState::BIT_MASK_TASK_USE_COUNT);
        assert_eq!(s.task_use_count(), TerminationState::BIT_MASK_TASK_USE_COUNT);
        assert!(s.going_to_commit());
        assert!(!s.going_to_abort());
    }

    #[test]
    fn test_increment_decrement() {
        let mut s = TerminationState::new();
        s.increment_task_use_count();
        s.increment_task_use_count();
        assert_eq!(s.task_use_count(), 2);
        s.decrement_task_use_count();
        assert_eq!(s.task_use_count(), 1);
        assert!(!s.task_empty());
        s.decrement_task_use_count();
        assert!(s.task_empty());
    }

    proptest! {
        #[test]
        fn prop_set_count_never_touches_flags(count in 0u64..=TerminationState::BIT_MASK_TASK_USE_COUNT) {
            let mut s = TerminationState::new();
            s.set_going_to_abort();
            s.set_task_use_count(count);
            prop_assert!(s.going_to_abort());
            prop_assert!(!s.going_to_commit());
            prop_assert_eq!(s.task_use_count(), count);
        }
    }
}
