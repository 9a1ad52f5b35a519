pub mod action_set;
pub mod users;

pub use action_set::{ActionKind, ActionSet};
pub use users::AuthorizedUsersActionSet;
