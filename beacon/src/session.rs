//! Session lifecycle manager.
//!
//! Owns the current authenticated principal, drives first-login profile
//! provisioning, keeps the short-lived credential fresh, and tears
//! everything down on sign-out. Consumers read snapshots through
//! [`SessionManager::current_principal`]; all mutation happens here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use shared::config::Config;
use tracing::{debug, info, warn};

use crate::credential::{AuthSession, CredentialStore, VerificationOutcome};
use crate::error::AuthError;
use crate::models::{ApprovalStatus, Identity, Principal, ProfileSeed, ProfileUpdate, Role};
use crate::password::validate_password_strength;
use crate::provisioning::{ProfileProvisioner, normalize};
use crate::repository::{LocalStore, ProfileRepository};
use crate::timer::RefreshTimer;

const PRINCIPAL_KEY: &str = "principal";
const RETURN_TO_KEY: &str = "return_to";

/// Outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The backend returned an active session; the principal is current.
    SignedIn(Principal),
    /// Registration recorded; the account awaits verification/approval.
    PendingApproval,
}

/// Outcome of a verification-email resend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    AlreadyVerified,
    /// A resend is already in flight; this request was dropped.
    InFlight,
}

/// Clears the loading flag on every exit path, including early returns
/// and propagated errors.
struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LoadingGuard<'a> {
    fn begin(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    profiles: Arc<dyn ProfileRepository>,
    provisioner: ProfileProvisioner,
    local: Arc<dyn LocalStore>,
    // The only shared mutable state: the current principal slot and the
    // single pending refresh timer.
    current: RwLock<Option<Principal>>,
    timer: RefreshTimer,
    loading: AtomicBool,
    // Bumped on sign-out; operations that started under an older epoch
    // must not commit their results.
    epoch: AtomicU64,
    resend_in_flight: AtomicBool,
    refresh_lead: Duration,
    storage_prefix: String,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        profiles: Arc<dyn ProfileRepository>,
        local: Arc<dyn LocalStore>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            credentials,
            provisioner: ProfileProvisioner::new(profiles.clone()),
            profiles,
            local,
            current: RwLock::new(None),
            timer: RefreshTimer::new(),
            loading: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            resend_in_flight: AtomicBool::new(false),
            refresh_lead: Duration::from_secs(config.refresh_lead_secs),
            storage_prefix: config.storage_prefix.clone(),
        })
    }

    /// Snapshot of the current principal, if any.
    pub fn current_principal(&self) -> Option<Principal> {
        self.current.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Query the credential store for an existing valid credential and
    /// restore the session from it.
    pub async fn check_session(self: &Arc<Self>) -> Result<Option<Principal>, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _loading = LoadingGuard::begin(&self.loading);

        match self.credentials.current_session().await {
            Ok(Some(session)) => self.establish(epoch, session, None).await.map(Some),
            Ok(None) => {
                self.clear_principal();
                Ok(None)
            }
            Err(code) => {
                debug!(error = ?code, "session check failed, treating as signed out");
                self.clear_principal();
                Ok(None)
            }
        }
    }

    /// Authenticate with email and password.
    pub async fn sign_in(
        self: &Arc<Self>,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _loading = LoadingGuard::begin(&self.loading);

        // Role pre-lookup: admins bypass the verification gate, so their
        // email is force-confirmed before the authenticate call.
        match self.profiles.find_by_email(email).await {
            Ok(Some(profile)) if profile.role == Role::Admin => {
                if let Err(code) = self.credentials.force_confirm_email(email).await {
                    debug!(error = ?code, "admin pre-confirmation failed");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "role pre-lookup failed"),
        }

        let session = self
            .credentials
            .authenticate(email, password)
            .await
            .map_err(|code| code.into_auth_error())?;
        self.establish(epoch, session, None).await
    }

    /// Create a new identity and its profile row.
    pub async fn sign_up(
        self: &Arc<Self>,
        email: &str,
        password: &str,
        seed: ProfileSeed,
    ) -> Result<SignUpOutcome, AuthError> {
        validate_password_strength(password)?;

        let epoch = self.epoch.load(Ordering::SeqCst);
        let _loading = LoadingGuard::begin(&self.loading);

        let (identity, session) = self
            .credentials
            .register(email, password)
            .await
            .map_err(|code| code.into_auth_error())?;

        match session {
            Some(session) => {
                let principal = self.establish(epoch, session, Some(&seed)).await?;
                Ok(SignUpOutcome::SignedIn(principal))
            }
            None => {
                // Provision the row now so the approval queue can proceed
                // while the caller completes verification.
                self.provisioner.resolve(&identity, Some(&seed)).await?;
                info!(email = %identity.email, "registration pending verification");
                Ok(SignUpOutcome::PendingApproval)
            }
        }
    }

    /// Tear the session down. Idempotent; every step past clearing the
    /// in-memory principal is independent and best-effort.
    pub async fn sign_out(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.timer.cancel();
        self.clear_principal();

        if let Err(e) = self.local.remove_prefix(&self.storage_prefix).await {
            warn!(error = %e, "failed to clear local storage on sign-out");
        }
        if let Err(code) = self.credentials.sign_out().await {
            warn!(error = ?code, "credential revocation failed on sign-out");
        }
        info!("signed out");
    }

    /// Resend the verification challenge. Debounced: while one resend is
    /// in flight, further requests are dropped.
    pub async fn send_verification_email(&self, email: &str) -> Result<ResendOutcome, AuthError> {
        if self
            .resend_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(ResendOutcome::InFlight);
        }

        let result = self.credentials.resend_verification(email).await;
        self.resend_in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(VerificationOutcome::Sent) => Ok(ResendOutcome::Sent),
            Ok(VerificationOutcome::AlreadyVerified) => Ok(ResendOutcome::AlreadyVerified),
            Err(code) => Err(code.into_auth_error()),
        }
    }

    /// Start a password-recovery flow. Always reports success so the
    /// caller cannot probe which addresses exist.
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        if let Err(code) = self.credentials.send_recovery(email).await {
            debug!(error = ?code, "recovery initiation failed");
        }
        Ok(())
    }

    /// Complete a password-recovery flow with the emailed token.
    pub async fn reset_password_confirm(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password_strength(new_password)?;

        self.credentials
            .verify_recovery_token(token)
            .await
            .map_err(|_| AuthError::RecoveryTokenInvalid)?;
        self.credentials
            .update_credential_secret(new_password)
            .await
            .map_err(|code| code.into_auth_error())?;
        Ok(())
    }

    /// Change the password of the signed-in principal. Fails closed when
    /// re-authentication with the current password fails.
    pub async fn update_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let email = self
            .current
            .read()
            .as_ref()
            .map(|p| p.email.clone())
            .ok_or(AuthError::NotAuthenticated)?;

        validate_password_strength(new_password)?;

        self.credentials
            .authenticate(&email, current_password)
            .await
            .map_err(|_| AuthError::ReauthenticationFailed)?;
        self.credentials
            .update_credential_secret(new_password)
            .await
            .map_err(|code| code.into_auth_error())?;
        Ok(())
    }

    /// Update display attributes of the signed-in principal. Changing the
    /// email re-keys the credential store identity and flips the confirmed
    /// flag back to false (re-verification).
    pub async fn update_profile(&self, changes: ProfileUpdate) -> Result<Principal, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let current = self
            .current
            .read()
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;

        let new_email = changes.email.as_deref().map(|e| e.trim().to_lowercase());
        let email_changed = new_email
            .as_deref()
            .map(|e| e != current.email)
            .unwrap_or(false);

        if email_changed {
            // The credential store holds its own copy of the address; it
            // must follow, or the next session check restores the old one
            // still marked confirmed.
            if let Some(new_email) = new_email.as_deref() {
                self.credentials
                    .update_email(new_email)
                    .await
                    .map_err(|code| code.into_auth_error())?;
            }
        }

        let profile = self.profiles.update(&current.id, changes).await?;

        let identity = Identity {
            id: current.id.clone(),
            email: profile.email.clone(),
            email_confirmed: !email_changed && current.email_confirmed,
        };
        let principal = normalize(Principal::from_parts(&identity, &profile));

        // A sign-out during the awaits above owns the slot and the storage.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(id = %principal.id, "profile update superseded by sign-out");
            return Err(AuthError::Superseded);
        }

        {
            let mut slot = self.current.write();
            if slot.as_ref().map(|p| p.id == principal.id).unwrap_or(false) {
                *slot = Some(principal.clone());
            }
        }
        self.persist_snapshot(&principal).await;
        Ok(principal)
    }

    /// Remember the originally requested location for the post-login
    /// redirect.
    pub async fn remember_return_to(&self, path: &str) {
        let key = format!("{}{RETURN_TO_KEY}", self.storage_prefix);
        if let Err(e) = self.local.set(&key, path).await {
            debug!(error = %e, "failed to persist return location");
        }
    }

    /// Take (and clear) the remembered post-login location.
    pub async fn take_return_to(&self) -> Option<String> {
        let key = format!("{}{RETURN_TO_KEY}", self.storage_prefix);
        let value = self.local.get(&key).await.ok().flatten();
        if value.is_some() {
            let _ = self.local.remove(&key).await;
        }
        value
    }

    /// Provision the profile for an authenticated session, commit the
    /// principal (unless superseded) and schedule the refresh.
    async fn establish(
        self: &Arc<Self>,
        epoch: u64,
        session: AuthSession,
        seed: Option<&ProfileSeed>,
    ) -> Result<Principal, AuthError> {
        let principal = match self.provisioner.resolve(&session.identity, seed).await {
            Ok(principal) => principal,
            Err(e) => {
                // An unresolvable profile must not leave a half-authenticated
                // principal behind.
                warn!(error = %e, "profile provisioning failed, forcing sign-out");
                self.sign_out().await;
                return Err(e);
            }
        };

        if !self.commit(epoch, principal.clone()) {
            debug!(id = %principal.id, "session superseded before commit, discarding");
            return Err(AuthError::Superseded);
        }

        // Best-effort bookkeeping; failures must not block the sign-in.
        let touch = ProfileUpdate {
            last_sign_in_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.profiles.update(&principal.id, touch).await {
            debug!(error = %e, "failed to record last sign-in time");
        }

        // A sign-out may have landed during the awaits above; it already
        // cleared the principal and storage, so write nothing back.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(id = %principal.id, "session superseded after commit");
            return Err(AuthError::Superseded);
        }
        self.persist_snapshot(&principal).await;
        self.schedule_refresh(epoch, session.credential.expires_in);
        info!(id = %principal.id, role = %principal.role, "session established");
        Ok(principal)
    }

    /// Store the principal unless a newer epoch has superseded this
    /// operation. Last writer wins within an epoch.
    fn commit(&self, epoch: u64, principal: Principal) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *self.current.write() = Some(principal);
        true
    }

    fn clear_principal(&self) {
        self.current.write().take();
    }

    async fn persist_snapshot(&self, principal: &Principal) {
        let key = format!("{}{PRINCIPAL_KEY}", self.storage_prefix);
        match serde_json::to_string(principal) {
            Ok(json) => {
                if let Err(e) = self.local.set(&key, &json).await {
                    debug!(error = %e, "failed to persist principal snapshot");
                }
            }
            Err(e) => debug!(error = %e, "failed to serialize principal snapshot"),
        }
    }

    /// Schedule the one-shot refresh, firing `refresh_lead` before expiry.
    /// Scheduling always cancels the previous pending timer first.
    fn schedule_refresh(self: &Arc<Self>, epoch: u64, expires_in: u64) {
        let delay = Duration::from_secs(expires_in).saturating_sub(self.refresh_lead);
        let weak = Arc::downgrade(self);
        let superseded = self.timer.schedule(delay, async move {
            if let Some(manager) = weak.upgrade() {
                manager.run_refresh(epoch).await;
            }
        });
        if superseded {
            debug!("previous refresh timer superseded");
        }
    }

    async fn run_refresh(self: Arc<Self>, epoch: u64) {
        // The stored handle refers to this very task; drop it without
        // aborting so teardown paths below cannot cut us short.
        self.timer.disarm();

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("stale refresh timer ignored");
            return;
        }

        let session = match self.credentials.refresh().await {
            Ok(session) => session,
            Err(code) => {
                // An expired, unrefreshable session is equivalent to
                // signed-out; no retry, no silent degradation.
                warn!(error = ?code, "credential refresh failed, clearing session");
                self.sign_out().await;
                return;
            }
        };

        // Detect deletion or rejection that happened mid-session.
        match self.profiles.find_by_id(&session.identity.id).await {
            Ok(None) => {
                warn!(id = %session.identity.id, "profile deleted mid-session, invalidating");
                self.sign_out().await;
            }
            Ok(Some(profile)) if profile.approval_status == ApprovalStatus::Rejected => {
                warn!(id = %session.identity.id, "account rejected mid-session, invalidating");
                self.sign_out().await;
            }
            Ok(Some(profile)) => {
                let refreshed = normalize(Principal::from_parts(&session.identity, &profile));
                if self.commit(epoch, refreshed) {
                    self.schedule_refresh(epoch, session.credential.expires_in);
                    debug!("credential refreshed");
                }
            }
            Err(e) => {
                // Transient lookup failure: keep the session, try again on
                // the next cycle.
                warn!(error = %e, "profile lookup failed during refresh");
                self.schedule_refresh(epoch, session.credential.expires_in);
            }
        }
    }
}
