//! In-memory credential store.
//!
//! Backs tests, local development and the seeded bootstrap admin. Deploys
//! against a hosted identity provider swap this out behind the
//! [`CredentialStore`] port.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use shared::TtlSeconds;

use crate::credential::{
    AuthSession, Credential, CredentialErrorCode, CredentialStore, VerificationOutcome,
};
use crate::models::{Identity, new_id};
use crate::password::{hash_password, verify_password};

fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Generate a random 32-byte hex token.
fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct IdentityRecord {
    identity: Identity,
    password_hash: String,
}

struct StoredSession {
    token: String,
    email: String,
    expires_at_ms: u64,
}

impl StoredSession {
    fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at_ms
    }

    fn remaining_secs(&self) -> u64 {
        let now = current_timestamp_ms();
        if now >= self.expires_at_ms {
            0
        } else {
            (self.expires_at_ms - now) / 1000
        }
    }
}

pub struct MemoryCredentialStore {
    // Keyed by lowercase email
    identities: DashMap<String, IdentityRecord>,
    // Single-client store: at most one active session
    session: RwLock<Option<StoredSession>>,
    // token -> email
    recovery_tokens: DashMap<String, String>,
    // Out-of-band delivery hook; a real backend would email the token
    last_recovery_token: RwLock<Option<String>>,
    session_ttl: TtlSeconds,
    auto_confirm: bool,
}

impl MemoryCredentialStore {
    pub fn new(session_ttl: TtlSeconds) -> Self {
        Self {
            identities: DashMap::new(),
            session: RwLock::new(None),
            recovery_tokens: DashMap::new(),
            last_recovery_token: RwLock::new(None),
            session_ttl,
            auto_confirm: false,
        }
    }

    /// Default settings: 1 hour credential lifetime, explicit confirmation.
    pub fn with_defaults() -> Self {
        Self::new(TtlSeconds(3600))
    }

    /// Confirm registrations immediately and hand out a session from
    /// `register` (mirrors providers with email confirmation disabled).
    pub fn auto_confirm(mut self, enabled: bool) -> Self {
        self.auto_confirm = enabled;
        self
    }

    /// Complete the emailed verification challenge for `email`.
    pub fn confirm_email(&self, email: &str) {
        if let Some(mut record) = self.identities.get_mut(&normalize_email(email)) {
            record.identity.email_confirmed = true;
        }
    }

    /// The most recently issued recovery token (delivery hook).
    pub fn last_recovery_token(&self) -> Option<String> {
        self.last_recovery_token.read().clone()
    }

    /// Invalidate the active session backend-side, as a provider would when
    /// a refresh token is revoked.
    pub fn revoke_current_session(&self) {
        *self.session.write() = None;
    }

    fn identity_for(&self, email: &str) -> Option<Identity> {
        self.identities
            .get(&normalize_email(email))
            .map(|r| r.identity.clone())
    }

    fn issue_session(&self, identity: Identity) -> AuthSession {
        let token = generate_token();
        let expires_at_ms = current_timestamp_ms() + self.session_ttl.0 * 1000;
        *self.session.write() = Some(StoredSession {
            token: token.clone(),
            email: identity.email.clone(),
            expires_at_ms,
        });
        AuthSession {
            identity,
            credential: Credential {
                access_token: token,
                expires_in: self.session_ttl.0,
            },
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn current_session(&self) -> Result<Option<AuthSession>, CredentialErrorCode> {
        let (email, token, remaining) = {
            let guard = self.session.read();
            match guard.as_ref() {
                Some(stored) if !stored.is_expired() => (
                    stored.email.clone(),
                    stored.token.clone(),
                    stored.remaining_secs(),
                ),
                _ => return Ok(None),
            }
        };

        match self.identity_for(&email) {
            Some(identity) => Ok(Some(AuthSession {
                identity,
                credential: Credential {
                    access_token: token,
                    expires_in: remaining,
                },
            })),
            None => Ok(None),
        }
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, CredentialErrorCode> {
        let key = normalize_email(email);
        let (identity, hash) = match self.identities.get(&key) {
            Some(record) => (record.identity.clone(), record.password_hash.clone()),
            None => return Err(CredentialErrorCode::InvalidCredentials),
        };

        let valid = verify_password(password, &hash)
            .map_err(|e| CredentialErrorCode::Other(e.to_string()))?;
        if !valid {
            return Err(CredentialErrorCode::InvalidCredentials);
        }
        if !identity.email_confirmed {
            return Err(CredentialErrorCode::EmailNotConfirmed);
        }

        Ok(self.issue_session(identity))
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, Option<AuthSession>), CredentialErrorCode> {
        let key = normalize_email(email);
        if self.identities.contains_key(&key) {
            return Err(CredentialErrorCode::AlreadyRegistered);
        }

        let password_hash =
            hash_password(password).map_err(|e| CredentialErrorCode::Other(e.to_string()))?;
        let identity = Identity {
            id: new_id(),
            email: key.clone(),
            email_confirmed: self.auto_confirm,
        };
        self.identities.insert(
            key,
            IdentityRecord {
                identity: identity.clone(),
                password_hash,
            },
        );

        let session = if self.auto_confirm {
            Some(self.issue_session(identity.clone()))
        } else {
            None
        };
        Ok((identity, session))
    }

    async fn refresh(&self) -> Result<AuthSession, CredentialErrorCode> {
        let email = {
            let guard = self.session.read();
            match guard.as_ref() {
                Some(stored) if !stored.is_expired() => stored.email.clone(),
                _ => return Err(CredentialErrorCode::SessionExpired),
            }
        };

        let identity = self
            .identity_for(&email)
            .ok_or(CredentialErrorCode::SessionExpired)?;
        Ok(self.issue_session(identity))
    }

    async fn sign_out(&self) -> Result<(), CredentialErrorCode> {
        *self.session.write() = None;
        Ok(())
    }

    async fn send_recovery(&self, email: &str) -> Result<(), CredentialErrorCode> {
        // Anti-enumeration: succeed whether or not the identity exists.
        if self.identity_for(email).is_some() {
            let token = generate_token();
            self.recovery_tokens
                .insert(token.clone(), normalize_email(email));
            *self.last_recovery_token.write() = Some(token);
        }
        Ok(())
    }

    async fn verify_recovery_token(&self, token: &str) -> Result<Identity, CredentialErrorCode> {
        let email = self
            .recovery_tokens
            .remove(token)
            .map(|(_, email)| email)
            .ok_or_else(|| CredentialErrorCode::Other("invalid recovery token".to_string()))?;

        let identity = self
            .identity_for(&email)
            .ok_or_else(|| CredentialErrorCode::Other("invalid recovery token".to_string()))?;

        // Establish a recovery session so the secret can be replaced.
        self.issue_session(identity.clone());
        Ok(identity)
    }

    async fn update_credential_secret(
        &self,
        new_secret: &str,
    ) -> Result<(), CredentialErrorCode> {
        let email = {
            let guard = self.session.read();
            match guard.as_ref() {
                Some(stored) if !stored.is_expired() => stored.email.clone(),
                _ => return Err(CredentialErrorCode::SessionExpired),
            }
        };

        let password_hash =
            hash_password(new_secret).map_err(|e| CredentialErrorCode::Other(e.to_string()))?;
        match self.identities.get_mut(&email) {
            Some(mut record) => {
                record.password_hash = password_hash;
                Ok(())
            }
            None => Err(CredentialErrorCode::SessionExpired),
        }
    }

    async fn update_email(&self, new_email: &str) -> Result<(), CredentialErrorCode> {
        let old_key = {
            let guard = self.session.read();
            match guard.as_ref() {
                Some(stored) if !stored.is_expired() => stored.email.clone(),
                _ => return Err(CredentialErrorCode::SessionExpired),
            }
        };

        let new_key = normalize_email(new_email);
        if new_key == old_key {
            return Ok(());
        }
        if self.identities.contains_key(&new_key) {
            return Err(CredentialErrorCode::AlreadyRegistered);
        }

        let (_, mut record) = self
            .identities
            .remove(&old_key)
            .ok_or(CredentialErrorCode::SessionExpired)?;
        record.identity.email = new_key.clone();
        // The new address has to complete verification again.
        record.identity.email_confirmed = false;
        self.identities.insert(new_key.clone(), record);

        if let Some(stored) = self.session.write().as_mut() {
            stored.email = new_key;
        }
        Ok(())
    }

    async fn resend_verification(
        &self,
        email: &str,
    ) -> Result<VerificationOutcome, CredentialErrorCode> {
        match self.identity_for(email) {
            Some(identity) if identity.email_confirmed => Ok(VerificationOutcome::AlreadyVerified),
            // Anti-enumeration: report "sent" for unknown addresses too.
            _ => Ok(VerificationOutcome::Sent),
        }
    }

    async fn force_confirm_email(&self, email: &str) -> Result<(), CredentialErrorCode> {
        self.confirm_email(email);
        Ok(())
    }
}
