use serde::{Deserialize, Serialize};

/// Actions a user can be authorized for on a table.
///
/// `Control` subsumes every other action: adding it grants everything and
/// individual actions cannot be carved back out while it is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Control,
    Select,
    Insert,
    Update,
    Delete,
}

pub const ALL_ACTION_KINDS: [ActionKind; 5] = [
    ActionKind::Control,
    ActionKind::Select,
    ActionKind::Insert,
    ActionKind::Update,
    ActionKind::Delete,
];

impl ActionKind {
    fn bit(&self) -> u8 {
        match self {
            ActionKind::Control => 1 << 0,
            ActionKind::Select => 1 << 1,
            ActionKind::Insert => 1 << 2,
            ActionKind::Update => 1 << 3,
            ActionKind::Delete => 1 << 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Control => "control",
            ActionKind::Select => "select",
            ActionKind::Insert => "insert",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of actions over the closed [`ActionKind`] universe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    bits: u8,
}

impl ActionSet {
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    pub fn of(actions: &[ActionKind]) -> Self {
        let mut set = Self::new();
        for a in actions {
            set.add_action(*a);
        }
        set
    }

    /// Whether the action is permitted; `Control` permits everything.
    pub fn action_allowed(&self, action: ActionKind) -> bool {
        self.has_action(ActionKind::Control) || self.has_action(action)
    }

    /// Whether the action itself is a member (no control subsumption).
    pub fn has_action(&self, action: ActionKind) -> bool {
        self.bits & action.bit() != 0
    }

    pub fn add_action(&mut self, action: ActionKind) {
        if action == ActionKind::Control {
            // control subsumes the individual actions
            self.bits = ActionKind::Control.bit();
            return;
        }
        if self.has_action(ActionKind::Control) {
            return;
        }
        self.bits |= action.bit();
    }

    pub fn add_actions(&mut self, other: &ActionSet) {
        for a in ALL_ACTION_KINDS {
            if other.has_action(a) {
                self.add_action(a);
            }
        }
    }

    /// Removes a single action. Removing a non-control action while
    /// control is held is a no-op; control itself can be removed.
    pub fn remove_action(&mut self, action: ActionKind) {
        if action == ActionKind::Control {
            self.bits &= !ActionKind::Control.bit();
            return;
        }
        if self.has_action(ActionKind::Control) {
            return;
        }
        self.bits &= !action.bit();
    }

    pub fn remove_actions(&mut self, other: &ActionSet) {
        for a in ALL_ACTION_KINDS {
            if other.has_action(a) {
                self.remove_action(a);
            }
        }
    }

    /// Whether every action in `actions` is allowed by this set.
    pub fn allows(&self, actions: &ActionSet) -> bool {
        ALL_ACTION_KINDS
            .iter()
            .filter(|a| actions.has_action(**a))
            .all(|a| self.action_allowed(*a))
    }

    pub fn empty(&self) -> bool {
        self.bits == 0
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionKind> + '_ {
        ALL_ACTION_KINDS.into_iter().filter(|a| self.has_action(*a))
    }
}

impl std::fmt::Display for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action_set[")?;
        for (i, a) in self.iter().enumerate() {
            if i != 0 {
                write!(f, ",")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, "]")
    }
}
