//! Access gate: decides, for a requested destination, whether to render
//! protected content or one of the blocking states.
//!
//! Pure function over (principal, loading flag, requirement); there is no
//! gate state beyond the principal itself, so every evaluation is computed
//! fresh.

use serde::{Deserialize, Serialize};

use crate::models::{ApprovalStatus, Principal, Role};
use crate::permissions::{Permission, has_all, has_any};

pub const LOGIN_PATH: &str = "/login";
pub const ROOT_PATH: &str = "/";

/// Role-appropriate landing destination after sign-in.
pub fn landing_path(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        Role::Dispatcher => "/dispatch",
        Role::Responder => "/responder",
        Role::User => "/dashboard",
    }
}

/// What a destination requires of the current principal.
#[derive(Debug, Clone)]
pub struct RouteRequirement {
    /// Minimum role rank; higher ranks always satisfy it.
    pub min_role: Role,
    /// Permissions that must ALL be held.
    pub all_permissions: Vec<Permission>,
    /// Permissions where ANY suffices; an empty set is vacuously satisfied.
    pub any_permissions: Vec<Permission>,
    pub require_verified_email: bool,
    pub require_approval: bool,
}

impl Default for RouteRequirement {
    fn default() -> Self {
        Self {
            min_role: Role::User,
            all_permissions: Vec::new(),
            any_permissions: Vec::new(),
            require_verified_email: true,
            require_approval: true,
        }
    }
}

impl RouteRequirement {
    pub fn min_role(role: Role) -> Self {
        Self {
            min_role: role,
            ..Default::default()
        }
    }

    pub fn with_all(mut self, permissions: &[Permission]) -> Self {
        self.all_permissions = permissions.to_vec();
        self
    }

    pub fn with_any(mut self, permissions: &[Permission]) -> Self {
        self.any_permissions = permissions.to_vec();
        self
    }
}

/// Terminal gate states; each maps to one render decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    /// A session check is in flight; render a loading indicator only.
    Loading,
    /// Unauthenticated; redirect to the entry surface, preserving the
    /// originally requested location for the post-login redirect.
    RedirectToLogin { from: String },
    /// Authenticated principal on the login or root path; send them to
    /// their landing destination.
    Redirect { to: String },
    /// Account was rejected; terminal notice with a sign-out action.
    Rejected { reason: Option<String> },
    /// Account awaits human approval.
    PendingApproval,
    /// Email address has not been verified yet.
    VerificationRequired,
    /// Authenticated and in good standing, but short on rank/permissions.
    Denied,
    /// Render the protected content.
    Authorized,
}

/// Evaluate the gate for a requested path. First match wins.
pub fn evaluate(
    principal: Option<&Principal>,
    loading: bool,
    path: &str,
    requirement: &RouteRequirement,
) -> GateOutcome {
    if loading {
        return GateOutcome::Loading;
    }

    let Some(principal) = principal else {
        return GateOutcome::RedirectToLogin {
            from: path.to_string(),
        };
    };

    if path == LOGIN_PATH || path == ROOT_PATH {
        return GateOutcome::Redirect {
            to: landing_path(principal.role).to_string(),
        };
    }

    // Rejection is terminal regardless of the requirement.
    if principal.approval_status == ApprovalStatus::Rejected {
        return GateOutcome::Rejected {
            reason: principal.rejection_reason.clone(),
        };
    }

    let bypasses_review = principal.role.bypasses_review();
    if requirement.require_approval
        && !bypasses_review
        && principal.approval_status != ApprovalStatus::Approved
    {
        return GateOutcome::PendingApproval;
    }
    if requirement.require_verified_email && !bypasses_review && !principal.email_confirmed {
        return GateOutcome::VerificationRequired;
    }

    if principal.role < requirement.min_role {
        return GateOutcome::Denied;
    }
    if !has_all(principal.role, &requirement.all_permissions) {
        return GateOutcome::Denied;
    }
    if !requirement.any_permissions.is_empty()
        && !has_any(principal.role, &requirement.any_permissions)
    {
        return GateOutcome::Denied;
    }

    GateOutcome::Authorized
}
