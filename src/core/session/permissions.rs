// src/core/session/permissions.rs

//! The authoritative role-to-permission table.
//!
//! Permissions are `resource:action` strings. The table is fixed at compile
//! time and consulted on every permission query; a role that is not listed
//! here is granted nothing.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The wildcard grant token.
pub const WILDCARD: &str = "*";

/// What a single role is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGrant {
    /// Every permission, including ones not known to this table.
    All,
    /// Exactly the listed permissions.
    Only(&'static [&'static str]),
}

impl RoleGrant {
    /// Returns true if this grant covers `permission`.
    pub fn allows(&self, permission: &str) -> bool {
        match self {
            RoleGrant::All => true,
            RoleGrant::Only(list) => list.contains(&WILDCARD) || list.contains(&permission),
        }
    }
}

const OPERATOR: &[&str] = &[
    "cameras:read",
    "cameras:write",
    "subjects:read",
    "subjects:write",
    "sightings:read",
    "alerts:read",
    "alerts:write",
    "analytics:read",
];

const VIEWER: &[&str] = &[
    "cameras:read",
    "subjects:read",
    "sightings:read",
    "alerts:read",
    "analytics:read",
];

const AUDITOR: &[&str] = &["audit:read", "reports:read"];

static ROLE_PERMISSIONS: Lazy<HashMap<&'static str, RoleGrant>> = Lazy::new(|| {
    HashMap::from([
        ("admin", RoleGrant::All),
        ("operator", RoleGrant::Only(OPERATOR)),
        ("viewer", RoleGrant::Only(VIEWER)),
        ("auditor", RoleGrant::Only(AUDITOR)),
    ])
});

/// Looks up the grant for `role`. Role names are matched exactly.
pub fn grant_for(role: &str) -> Option<RoleGrant> {
    ROLE_PERMISSIONS.get(role).copied()
}

/// Fail-closed permission check for a role name.
pub fn role_has_permission(role: &str, permission: &str) -> bool {
    grant_for(role).is_some_and(|grant| grant.allows(permission))
}

/// Lists the roles present in the table, sorted by name.
pub fn known_roles() -> Vec<&'static str> {
    let mut roles: Vec<&'static str> = ROLE_PERMISSIONS.keys().copied().collect();
    roles.sort_unstable();
    roles
}
