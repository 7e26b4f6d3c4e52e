//! Role-based capability checks
//!
//! Handlers that read or mutate data declare the roles allowed to call them.
//! The check runs before any repository or reconciler call and yields
//! [`Access::Allow`] or [`Access::Deny`]; turning a denial into an HTTP
//! response is the caller's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Application roles seeded into the `roles` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Supervisor,
    Staff,
    Security,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Supervisor, Role::Staff, Role::Security];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Supervisor => "Supervisor",
            Role::Staff => "Staff",
            Role::Security => "Security",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown role: {}", s)))
    }
}

/// Outcome of a capability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allow
    }
}

/// Something that can decide whether a caller may proceed
pub trait Capability {
    fn check(&self, principal: &Principal) -> Access;
}

/// Role sets: any listed role grants access
impl Capability for [Role] {
    fn check(&self, principal: &Principal) -> Access {
        if self.iter().any(|role| principal.roles.contains(role)) {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

impl<const N: usize> Capability for [Role; N] {
    fn check(&self, principal: &Principal) -> Access {
        self.as_slice().check(principal)
    }
}

/// Any authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

impl Capability for Authenticated {
    fn check(&self, _principal: &Principal) -> Access {
        Access::Allow
    }
}

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub user_name: String,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    /// Build from role names as stored; names that are not application roles
    /// are skipped
    pub fn new(user_id: String, user_name: String, role_names: &[String]) -> Self {
        let roles = role_names
            .iter()
            .filter_map(|name| name.parse::<Role>().ok())
            .collect();
        Self {
            user_id,
            user_name,
            roles,
        }
    }

    pub fn may<C: Capability + ?Sized>(&self, capability: &C) -> Access {
        capability.check(self)
    }
}
