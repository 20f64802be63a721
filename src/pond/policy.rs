//! Who counts as staff.

use std::collections::HashSet;

use crate::config::RelayConfig;
use crate::pond::model::{Actor, RoleId};

/// Trust check against the configured staff roles.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    staff_roles: HashSet<RoleId>,
}

impl AuthorizationPolicy {
    pub fn new(staff_roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            staff_roles: staff_roles.into_iter().collect(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.staff_roles.iter().copied())
    }

    /// True iff the actor holds at least one staff role. Non-members have no
    /// roles and are never trusted.
    pub fn is_trusted(&self, actor: &Actor) -> bool {
        actor
            .roles
            .as_deref()
            .is_some_and(|roles| roles.iter().any(|r| self.staff_roles.contains(r)))
    }
}
