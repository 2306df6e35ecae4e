//! Bootstrap admin seeding.
//!
//! A fresh deployment has no accounts and no one who could approve them,
//! so startup seeds one approved admin from configuration. Idempotent:
//! an existing row with the configured email short-circuits.

use std::sync::Arc;

use shared::config::Config;
use tracing::{info, warn};

use crate::credential::{CredentialErrorCode, CredentialStore};
use crate::error::AuthError;
use crate::models::{ApprovalStatus, Profile, Role};
use crate::repository::ProfileRepository;

const BOOTSTRAP_ADMIN_NAME: &str = "Administrator";

/// Ensure the bootstrap admin exists in both the credential store and the
/// profile store. Safe to call on every startup.
pub async fn seed_bootstrap_admin(
    credentials: &dyn CredentialStore,
    profiles: &Arc<dyn ProfileRepository>,
    config: &Config,
) -> Result<(), AuthError> {
    let email = config.bootstrap_admin_email.trim().to_lowercase();

    if profiles.find_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let identity = match credentials
        .register(&email, &config.bootstrap_admin_password)
        .await
    {
        Ok((identity, _)) => identity,
        Err(CredentialErrorCode::AlreadyRegistered) => {
            // Identity exists but the profile row is missing; sign-in will
            // provision it through the normal path.
            warn!(%email, "bootstrap admin identity exists without a profile row");
            return Ok(());
        }
        Err(code) => return Err(code.into_auth_error()),
    };

    // Admins never sit behind the verification gate.
    if let Err(code) = credentials.force_confirm_email(&email).await {
        warn!(error = ?code, "failed to confirm bootstrap admin email");
    }

    let mut profile = Profile::new(
        identity.id,
        email.clone(),
        Role::Admin,
        BOOTSTRAP_ADMIN_NAME.to_string(),
    );
    profile.approval_status = ApprovalStatus::Approved;
    profiles.upsert(profile).await?;

    info!(%email, "bootstrap admin seeded");
    Ok(())
}
