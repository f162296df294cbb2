//! Role-based permission evaluation for admin routes.
//!
//! Flow Overview:
//! 1) Every admin role maps to a static set of permission patterns.
//! 2) `has_permission` evaluates `(role, resource, action, scope)` with no
//!    side effects and no request history.
//! 3) `can_access_route` maps route prefixes to a required permission and
//!    defaults to deny for unmapped routes.
//!
//! Security boundaries: evaluation only returns a boolean. The API layer is
//! responsible for converting a denial into `403` and an audit entry.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Admin role hierarchy. Single tenant; roles are not composable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Analyst,
    Viewer,
}

impl AdminRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::Viewer => "viewer",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "super_admin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            "analyst" => Some(Self::Analyst),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Static permission patterns for this role.
    ///
    /// Pattern grammar: `*` grants everything; otherwise
    /// `resource.action[:scope]` where a missing scope makes the pattern
    /// scope-agnostic.
    #[must_use]
    pub const fn permission_patterns(self) -> &'static [&'static str] {
        match self {
            Self::SuperAdmin => &["*"],
            Self::Admin => &[
                "users.read",
                "users.write",
                "analytics.read",
                "reports.read",
                "reports.write",
                "settings.read",
                "settings.write",
            ],
            Self::Analyst => &[
                "users.read",
                "analytics.read",
                "reports.read",
                "reports.write",
            ],
            Self::Viewer => &["users.read", "analytics.read", "reports.read"],
        }
    }
}

/// A single permission check: resource, action and an optional scope
/// narrowing the permission to a subset of the resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Permission<'a> {
    pub resource: &'a str,
    pub action: &'a str,
    pub scope: Option<&'a str>,
}

impl<'a> Permission<'a> {
    #[must_use]
    pub const fn new(resource: &'a str, action: &'a str) -> Self {
        Self {
            resource,
            action,
            scope: None,
        }
    }

    #[must_use]
    pub const fn scoped(resource: &'a str, action: &'a str, scope: &'a str) -> Self {
        Self {
            resource,
            action,
            scope: Some(scope),
        }
    }
}

/// True iff `role` is allowed `permission`.
///
/// Pure and total: any `(role, resource, action, scope)` input yields a
/// boolean, never an error.
#[must_use]
pub fn has_permission(role: AdminRole, permission: Permission<'_>) -> bool {
    role.permission_patterns()
        .iter()
        .any(|pattern| pattern_matches(pattern, permission))
}

/// True iff `role` is allowed at least one of `permissions`.
///
/// An empty list grants nothing.
#[must_use]
pub fn has_any(role: AdminRole, permissions: &[Permission<'_>]) -> bool {
    permissions
        .iter()
        .any(|permission| has_permission(role, *permission))
}

/// True iff `role` is allowed every one of `permissions`.
///
/// Vacuously true for an empty list.
#[must_use]
pub fn has_all(role: AdminRole, permissions: &[Permission<'_>]) -> bool {
    permissions
        .iter()
        .all(|permission| has_permission(role, *permission))
}

/// Route prefix table: the permission required to enter each admin area.
/// Longest prefix wins so `/admin/users/...` resolves before `/admin`.
const ROUTE_PERMISSIONS: &[(&str, Permission<'static>)] = &[
    ("/admin/users", Permission::new("users", "read")),
    ("/admin/analytics", Permission::new("analytics", "read")),
    ("/admin/reports", Permission::new("reports", "read")),
    ("/admin/settings", Permission::new("settings", "read")),
    ("/admin/system", Permission::new("system", "read")),
];

/// Coarse route gate: maps a path to its required permission and delegates
/// to [`has_permission`]. Unmapped routes are denied.
#[must_use]
pub fn can_access_route(role: AdminRole, path: &str) -> bool {
    route_permission(path).is_some_and(|permission| has_permission(role, permission))
}

/// The permission guarding `path`, if the path is mapped at all.
#[must_use]
pub fn route_permission(path: &str) -> Option<Permission<'static>> {
    ROUTE_PERMISSIONS
        .iter()
        .filter(|(prefix, _)| path_has_prefix(path, prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, permission)| *permission)
}

/// Prefix match on path-segment boundaries: `/admin/users` covers
/// `/admin/users` and `/admin/users/42`, not `/admin/userscan`.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

fn pattern_matches(pattern: &str, permission: Permission<'_>) -> bool {
    if pattern == "*" {
        return true;
    }

    let (resource_action, pattern_scope) = match pattern.split_once(':') {
        Some((head, scope)) => (head, Some(scope)),
        None => (pattern, None),
    };
    let Some((pattern_resource, pattern_action)) = resource_action.split_once('.') else {
        return false;
    };

    if !component_matches(pattern_resource, permission.resource) {
        return false;
    }
    if !component_matches(pattern_action, permission.action) {
        return false;
    }

    // A scope-agnostic pattern covers any requested scope; a scoped pattern
    // only covers a matching requested scope.
    match (pattern_scope, permission.scope) {
        (None, _) => true,
        (Some(pattern_scope), Some(scope)) => component_matches(pattern_scope, scope),
        (Some(_), None) => false,
    }
}

fn component_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

#[cfg(test)]
mod tests {
    use super::{AdminRole, Permission, can_access_route, has_all, has_any, has_permission};

    const ALL_ROLES: [AdminRole; 4] = [
        AdminRole::SuperAdmin,
        AdminRole::Admin,
        AdminRole::Analyst,
        AdminRole::Viewer,
    ];

    // Every concrete permission named in any role's table.
    const ALL_PERMISSIONS: [Permission<'static>; 7] = [
        Permission::new("users", "read"),
        Permission::new("users", "write"),
        Permission::new("analytics", "read"),
        Permission::new("reports", "read"),
        Permission::new("reports", "write"),
        Permission::new("settings", "read"),
        Permission::new("settings", "write"),
    ];

    #[test]
    fn super_admin_allows_everything() {
        for permission in ALL_PERMISSIONS {
            assert!(has_permission(AdminRole::SuperAdmin, permission));
        }
        assert!(has_permission(
            AdminRole::SuperAdmin,
            Permission::scoped("audit", "purge", "own")
        ));
    }

    #[test]
    fn non_super_roles_deny_everything_outside_their_table() {
        for role in [AdminRole::Admin, AdminRole::Analyst, AdminRole::Viewer] {
            let table = role.permission_patterns();
            for permission in ALL_PERMISSIONS {
                let listed = table.contains(&format!(
                    "{}.{}",
                    permission.resource, permission.action
                )
                .as_str());
                assert_eq!(
                    has_permission(role, permission),
                    listed,
                    "{role:?} vs {permission:?}"
                );
            }
        }
    }

    #[test]
    fn viewer_cannot_write() {
        assert!(!has_permission(
            AdminRole::Viewer,
            Permission::new("users", "write")
        ));
        assert!(!has_permission(
            AdminRole::Viewer,
            Permission::new("reports", "write")
        ));
    }

    #[test]
    fn analyst_can_write_reports_only() {
        assert!(has_permission(
            AdminRole::Analyst,
            Permission::new("reports", "write")
        ));
        assert!(!has_permission(
            AdminRole::Analyst,
            Permission::new("users", "write")
        ));
        assert!(!has_permission(
            AdminRole::Analyst,
            Permission::new("settings", "read")
        ));
    }

    #[test]
    fn scope_agnostic_pattern_covers_scoped_checks() {
        // "users.read" has no scope, so any requested scope is covered.
        assert!(has_permission(
            AdminRole::Viewer,
            Permission::scoped("users", "read", "own")
        ));
    }

    #[test]
    fn has_any_and_has_all_compose() {
        let mixed = [
            Permission::new("users", "write"),
            Permission::new("users", "read"),
        ];
        assert!(has_any(AdminRole::Viewer, &mixed));
        assert!(!has_all(AdminRole::Viewer, &mixed));
        assert!(has_all(AdminRole::Admin, &mixed));
        assert!(!has_any(AdminRole::Viewer, &[]));
        assert!(has_all(AdminRole::Viewer, &[]));
    }

    #[test]
    fn route_access_maps_prefixes() {
        assert!(can_access_route(AdminRole::Viewer, "/admin/users"));
        assert!(can_access_route(AdminRole::Viewer, "/admin/users/42"));
        assert!(can_access_route(AdminRole::Admin, "/admin/settings"));
        assert!(!can_access_route(AdminRole::Viewer, "/admin/settings"));
        assert!(!can_access_route(AdminRole::Analyst, "/admin/system"));
        assert!(can_access_route(AdminRole::SuperAdmin, "/admin/system"));
    }

    #[test]
    fn unmapped_routes_default_to_deny() {
        // Deny applies even to super_admin: no mapping means no entry point.
        for role in ALL_ROLES {
            assert!(!can_access_route(role, "/admin/unknown"));
            assert!(!can_access_route(role, "/somewhere/else"));
        }
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        assert!(!can_access_route(AdminRole::SuperAdmin, "/admin/userscan"));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in ALL_ROLES {
            assert_eq!(AdminRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(AdminRole::from_str("root"), None);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let permission = Permission::new("reports", "write");
        let first = has_permission(AdminRole::Analyst, permission);
        for _ in 0..3 {
            assert_eq!(has_permission(AdminRole::Analyst, permission), first);
        }
    }
}
