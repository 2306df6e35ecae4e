//! Pure permission model: which capabilities each role holds.
//!
//! No IO and no identity here; the session layer decides *who* the caller
//! is, this module only answers "does role R hold capability C".

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Named, fine-grained action right, orthogonal to the role ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    // Administration
    ViewAdminPanel,
    ManageUsers,
    ApproveAccounts,

    // Dispatch board
    ViewDispatch,
    ManageDispatch,

    // Incident handling
    ViewIncidents,
    ReportIncidents,
    UpdateIncidentStatus,

    // Reporting
    ViewReports,
    ExportReports,
}

/// Capability set granted to a role.
pub fn role_permissions(role: Role) -> HashSet<Permission> {
    let permissions: &[Permission] = match role {
        Role::Admin => &[
            Permission::ViewAdminPanel,
            Permission::ManageUsers,
            Permission::ApproveAccounts,
            Permission::ViewDispatch,
            Permission::ManageDispatch,
            Permission::ViewIncidents,
            Permission::ReportIncidents,
            Permission::UpdateIncidentStatus,
            Permission::ViewReports,
            Permission::ExportReports,
        ],
        Role::Dispatcher => &[
            Permission::ViewDispatch,
            Permission::ManageDispatch,
            Permission::ViewIncidents,
            Permission::UpdateIncidentStatus,
            Permission::ViewReports,
        ],
        Role::Responder => &[
            Permission::ViewIncidents,
            Permission::ReportIncidents,
            Permission::UpdateIncidentStatus,
        ],
        Role::User => &[Permission::ViewIncidents, Permission::ReportIncidents],
    };
    permissions.iter().copied().collect()
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role_permissions(role).contains(&permission)
}

/// Every listed permission must be held.
pub fn has_all(role: Role, permissions: &[Permission]) -> bool {
    let granted = role_permissions(role);
    permissions.iter().all(|p| granted.contains(p))
}

/// At least one listed permission must be held.
pub fn has_any(role: Role, permissions: &[Permission]) -> bool {
    let granted = role_permissions(role);
    permissions.iter().any(|p| granted.contains(p))
}
