use std::collections::HashSet;

/// Items that can receive a personal override gate.
///
/// The id must be stable and unique across all actor types sharing a flag,
/// so prefixing it with the type (`"user:42"`) is a good habit.
pub trait Identity: Sync {
    fn actor_id(&self) -> String;
}

/// Items that belong to named groups.
pub trait GroupMembership: Sync {
    fn groups(&self) -> HashSet<String>;
}

/// The capabilities of one item a flag is evaluated for.
///
/// An item may expose an identity, group memberships, both, or neither.
/// Evaluation skips whatever is missing.
#[derive(Clone, Copy, Default)]
pub struct Target<'a> {
    identity: Option<&'a dyn Identity>,
    membership: Option<&'a dyn GroupMembership>,
}

impl<'a> Target<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn actor(item: &'a dyn Identity) -> Self {
        Self {
            identity: Some(item),
            membership: None,
        }
    }

    pub fn member(item: &'a dyn GroupMembership) -> Self {
        Self {
            identity: None,
            membership: Some(item),
        }
    }

    /// Item implementing both capabilities.
    pub fn of<T: Identity + GroupMembership>(item: &'a T) -> Self {
        Self {
            identity: Some(item),
            membership: Some(item),
        }
    }

    pub fn with_identity(mut self, item: &'a dyn Identity) -> Self {
        self.identity = Some(item);
        self
    }

    pub fn with_membership(mut self, item: &'a dyn GroupMembership) -> Self {
        self.membership = Some(item);
        self
    }

    pub fn actor_id(&self) -> Option<String> {
        self.identity.map(|i| i.actor_id())
    }

    pub fn groups(&self) -> Option<HashSet<String>> {
        self.membership.map(|m| m.groups())
    }
}

impl<'a, T: Identity + GroupMembership> From<&'a T> for Target<'a> {
    fn from(item: &'a T) -> Self {
        Target::of(item)
    }
}
