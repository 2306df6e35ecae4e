//! Race-tolerant profile provisioning: every authenticated identity ends up
//! with exactly one profile row, created on first login if missing.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AuthError;
use crate::models::{
    ApprovalStatus, Identity, Principal, Profile, ProfileSeed, display_name_from_email,
};
use crate::repository::ProfileRepository;

/// The single normalization step for privileged roles.
///
/// Admin principals are always treated as verified and approved regardless
/// of stored values; every other role passes through unmodified. Role
/// coercion for out-of-set values happens at deserialization (`Role` falls
/// back to `User`).
pub fn normalize(mut principal: Principal) -> Principal {
    if principal.role.bypasses_review() {
        principal.email_confirmed = true;
        principal.approval_status = ApprovalStatus::Approved;
    }
    principal
}

pub struct ProfileProvisioner {
    profiles: Arc<dyn ProfileRepository>,
}

impl ProfileProvisioner {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }

    /// Resolve the profile for an authenticated identity, creating it when
    /// absent: lookup, insert, fall back to an idempotent upsert on
    /// conflict, then re-fetch the canonical row.
    ///
    /// A failing lookup aborts provisioning; the caller must treat that as
    /// "no profile, no principal".
    pub async fn resolve(
        &self,
        identity: &Identity,
        seed: Option<&ProfileSeed>,
    ) -> Result<Principal, AuthError> {
        if let Some(profile) = self.profiles.find_by_id(&identity.id).await? {
            return Ok(normalize(Principal::from_parts(identity, &profile)));
        }

        let fresh = default_profile(identity, seed);
        match self.profiles.insert(fresh.clone()).await {
            Ok(profile) => {
                debug!(id = %identity.id, "provisioned profile on first login");
                Ok(normalize(Principal::from_parts(identity, &profile)))
            }
            Err(insert_err) => {
                // A concurrent request may have created the row already, or
                // the insert failed transiently; the upsert is idempotent
                // either way, and the re-fetch yields the canonical row.
                warn!(id = %identity.id, error = %insert_err, "profile insert failed, retrying via upsert");
                self.profiles.upsert(fresh).await?;
                match self.profiles.find_by_id(&identity.id).await? {
                    Some(profile) => Ok(normalize(Principal::from_parts(identity, &profile))),
                    None => Err(AuthError::ProfileCreationFailed),
                }
            }
        }
    }
}

/// Default profile for an identity with no row yet.
fn default_profile(identity: &Identity, seed: Option<&ProfileSeed>) -> Profile {
    let role = seed.map(|s| s.role).unwrap_or_default();
    let name = seed
        .and_then(|s| s.name.clone())
        .unwrap_or_else(|| display_name_from_email(&identity.email));

    let mut profile = Profile::new(identity.id.clone(), identity.email.clone(), role, name);
    profile.phone_number = seed.and_then(|s| s.phone_number.clone());
    profile.approval_status = if role.bypasses_review() {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Pending
    };
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_repository::MemoryProfileRepository;
    use crate::models::{Role, new_id};

    fn identity(email: &str) -> Identity {
        Identity {
            id: new_id(),
            email: email.to_string(),
            email_confirmed: false,
        }
    }

    #[tokio::test]
    async fn creates_default_profile_on_first_login() {
        let repo = Arc::new(MemoryProfileRepository::new());
        let provisioner = ProfileProvisioner::new(repo.clone());
        let id = identity("kim@example.com");

        let principal = provisioner.resolve(&id, None).await.unwrap();

        assert_eq!(principal.role, Role::User);
        assert_eq!(principal.approval_status, ApprovalStatus::Pending);
        assert_eq!(principal.name, "kim");
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn existing_profile_wins_over_seed() {
        let repo = Arc::new(MemoryProfileRepository::new());
        let provisioner = ProfileProvisioner::new(repo.clone());
        let id = identity("kim@example.com");

        let first = provisioner.resolve(&id, None).await.unwrap();
        let seed = ProfileSeed {
            role: Role::Dispatcher,
            name: Some("Someone Else".to_string()),
            phone_number: None,
        };
        let second = provisioner.resolve(&id, Some(&seed)).await.unwrap();

        assert_eq!(second.role, first.role);
        assert_eq!(second.name, first.name);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn admin_seed_is_approved_and_confirmed() {
        let repo = Arc::new(MemoryProfileRepository::new());
        let provisioner = ProfileProvisioner::new(repo);
        let id = identity("root@example.com");

        let seed = ProfileSeed {
            role: Role::Admin,
            name: None,
            phone_number: None,
        };
        let principal = provisioner.resolve(&id, Some(&seed)).await.unwrap();

        assert_eq!(principal.approval_status, ApprovalStatus::Approved);
        assert!(principal.email_confirmed, "normalization forces confirmation");
    }

    #[tokio::test]
    async fn concurrent_first_login_yields_one_row() {
        let repo = Arc::new(MemoryProfileRepository::new());
        let provisioner = Arc::new(ProfileProvisioner::new(repo.clone()));
        let id = identity("kim@example.com");

        let (a, b) = tokio::join!(
            provisioner.resolve(&id, None),
            provisioner.resolve(&id, None)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(repo.len(), 1, "exactly one profile row");
        assert_eq!(a.id, b.id);
        assert_eq!(a.email, b.email);
    }

    #[test]
    fn normalize_overrides_stored_admin_flags() {
        let id = identity("root@example.com");
        let mut profile = Profile::new(
            id.id.clone(),
            id.email.clone(),
            Role::Admin,
            "Root".to_string(),
        );
        profile.approval_status = ApprovalStatus::Pending;

        let principal = normalize(Principal::from_parts(&id, &profile));
        assert!(principal.email_confirmed);
        assert_eq!(principal.approval_status, ApprovalStatus::Approved);

        // Non-admin roles pass through untouched
        profile.role = Role::Responder;
        let principal = normalize(Principal::from_parts(&id, &profile));
        assert!(!principal.email_confirmed);
        assert_eq!(principal.approval_status, ApprovalStatus::Pending);
    }
}
