/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStateKind {
    Undefined,
    /// Created but not yet provided to the client.
    Init,
    /// Provided to the client and actively accepting operations.
    Active,
    /// Commit requested, not yet handed to concurrency control.
    GoingToCommit,
    /// Commit running in the storage layer.
    CcCommitting,
    /// Committed and readable; durability pending.
    CommittedAvailable,
    /// Committed and durably stored.
    CommittedStored,
    /// Abort requested, not yet handed to concurrency control.
    GoingToAbort,
    Aborted,
    Unknown,
}

impl TransactionStateKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionStateKind::Undefined => "undefined",
            TransactionStateKind::Init => "init",
            TransactionStateKind::Active => "active",
            TransactionStateKind::GoingToCommit => "going_to_commit",
            TransactionStateKind::CcCommitting => "cc_committing",
            TransactionStateKind::CommittedAvailable => "committed_available",
            TransactionStateKind::CommittedStored => "committed_stored",
            TransactionStateKind::GoingToAbort => "going_to_abort",
            TransactionStateKind::Aborted => "aborted",
            TransactionStateKind::Unknown => "unknown",
        }
    }

    /// Whether new statements may run under the transaction.
    pub fn accepts_operations(&self) -> bool {
        matches!(
            self,
            TransactionStateKind::Init | TransactionStateKind::Active
        )
    }

    pub fn ended(&self) -> bool {
        matches!(
            self,
            TransactionStateKind::CommittedAvailable
                | TransactionStateKind::CommittedStored
                | TransactionStateKind::Aborted
        )
    }
}

impl std::fmt::Display for TransactionStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
