use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::action_set::{ActionKind, ActionSet};

/// Per-table map of user name → authorized action set.
///
/// Adding an empty set is a no-op; removing a user's last action removes
/// the user entry entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUsersActionSet {
    map: HashMap<String, ActionSet>,
}

impl AuthorizedUsersActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_actions(&mut self, name: &str, actions: ActionSet) {
        if actions.empty() {
            return;
        }
        self.map
            .entry(name.to_string())
            .or_default()
            .add_actions(&actions);
    }

    pub fn remove_user_all_actions(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub fn remove_user_action(&mut self, name: &str, action: ActionKind) {
        if let Some(set) = self.map.get_mut(name) {
            set.remove_action(action);
            if set.empty() {
                self.map.remove(name);
            }
        }
    }

    pub fn remove_user_actions(&mut self, name: &str, actions: ActionSet) {
        if let Some(set) = self.map.get_mut(name) {
            set.remove_actions(&actions);
            if set.empty() {
                self.map.remove(name);
            }
        }
    }

    /// The user's action set; empty when the user is unknown.
    pub fn find_user_actions(&self, name: &str) -> ActionSet {
        self.map.get(name).copied().unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.map.len()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionSet)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_empty_is_noop() {
        let mut users = AuthorizedUsersActionSet::new();
        users.add_user_actions("alice", ActionSet::new());
        assert_eq!(users.user_count(), 0);
    }

    #[test]
    fn test_successive_adds_union() {
        let mut users = AuthorizedUsersActionSet::new();
        users.add_user_actions("alice", ActionSet::of(&[ActionKind::Select]));
        users.add_user_actions("alice", ActionSet::of(&[ActionKind::Insert]));
        assert_eq!(
            users.find_user_actions("alice"),
            ActionSet::of(&[ActionKind::Select, ActionKind::Insert])
        );
        // same end state as adding the union at once
        let mut direct = AuthorizedUsersActionSet::new();
        direct.add_user_actions(
            "alice",
            ActionSet::of(&[ActionKind::Select, ActionKind::Insert]),
        );
        assert_eq!(users, direct);
    }

    #[test]
    fn test_removing_last_action_removes_user() {
        let mut users = AuthorizedUsersActionSet::new();
        users.add_user_actions("bob", ActionSet::of(&[ActionKind::Select]));
        users.remove_user_action("bob", ActionKind::Select);
        assert_eq!(users.user_count(), 0);
        assert!(users.find_user_actions("bob").empty());
    }

    #[test]
    fn test_control_grant_survives_piecewise_removal() {
        let mut users = AuthorizedUsersActionSet::new();
        users.add_user_actions("carol", ActionSet::of(&[ActionKind::Control]));
        users.remove_user_action("carol", ActionKind::Select);
        users.remove_user_action("carol", ActionKind::Delete);
        assert!(users
            .find_user_actions("carol")
            .action_allowed(ActionKind::Select));
        assert_eq!(users.user_count(), 1);
    }

    #[test]
    fn test_unknown_user_has_empty_set() {
        let users = AuthorizedUsersActionSet::new();
        assert!(users.find_user_actions("nobody").empty());
    }
}
