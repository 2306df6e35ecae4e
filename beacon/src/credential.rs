//! Credential store port: the external system that owns long-lived
//! identities and issues short-lived credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::models::Identity;

/// Short-lived proof of authentication. The engine keeps only what it needs
/// to schedule the refresh; the token itself is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Seconds until this credential expires.
    pub expires_in: u64,
}

/// An authenticated session as reported by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub identity: Identity,
    pub credential: Credential,
}

/// Outcome of a verification-email resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Sent,
    AlreadyVerified,
}

/// Structured error codes on the credential store contract.
///
/// Implementations should return a precise code; `Other` carries raw backend
/// text and is classified by substring matching as a fallback only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialErrorCode {
    InvalidCredentials,
    EmailNotConfirmed,
    RateLimited,
    AlreadyRegistered,
    SessionExpired,
    Other(String),
}

impl CredentialErrorCode {
    /// Map a store error to the user-facing taxonomy. Never reveals whether
    /// an email exists: unknown backend text surfaces as a generic error.
    pub fn into_auth_error(self) -> AuthError {
        match self {
            CredentialErrorCode::InvalidCredentials => AuthError::InvalidCredentials,
            CredentialErrorCode::EmailNotConfirmed => AuthError::EmailNotVerified,
            CredentialErrorCode::RateLimited => AuthError::RateLimited,
            CredentialErrorCode::AlreadyRegistered => AuthError::InvalidCredentials,
            CredentialErrorCode::SessionExpired => AuthError::RefreshFailed,
            CredentialErrorCode::Other(message) => classify_message(&message).into_auth_error_flat(),
        }
    }

    fn into_auth_error_flat(self) -> AuthError {
        match self {
            CredentialErrorCode::Other(message) => AuthError::Unknown(message),
            code => code.into_auth_error(),
        }
    }
}

/// Fallback classification for backends that only return free-form text.
pub fn classify_message(message: &str) -> CredentialErrorCode {
    let lower = message.to_lowercase();
    if lower.contains("invalid login") || lower.contains("invalid credentials") {
        CredentialErrorCode::InvalidCredentials
    } else if lower.contains("not confirmed") || lower.contains("not verified") {
        CredentialErrorCode::EmailNotConfirmed
    } else if lower.contains("rate limit") || lower.contains("too many") {
        CredentialErrorCode::RateLimited
    } else if lower.contains("already registered") || lower.contains("already exists") {
        CredentialErrorCode::AlreadyRegistered
    } else {
        CredentialErrorCode::Other(message.to_string())
    }
}

/// Port for the external credential store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the currently valid session, if any.
    async fn current_session(&self) -> Result<Option<AuthSession>, CredentialErrorCode>;

    /// Authenticate with email and password.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, CredentialErrorCode>;

    /// Create a new identity. Returns the identity and, when the backend
    /// signs the caller in immediately, an active session.
    async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, Option<AuthSession>), CredentialErrorCode>;

    /// Exchange the current credential for a fresh one.
    async fn refresh(&self) -> Result<AuthSession, CredentialErrorCode>;

    /// Revoke the current credential.
    async fn sign_out(&self) -> Result<(), CredentialErrorCode>;

    /// Start a password-recovery flow. Whether the email exists must not be
    /// observable from the result.
    async fn send_recovery(&self, email: &str) -> Result<(), CredentialErrorCode>;

    /// Verify a recovery token. On success the store establishes a session
    /// for the owning identity so the secret can be replaced.
    async fn verify_recovery_token(&self, token: &str) -> Result<Identity, CredentialErrorCode>;

    /// Replace the secret of the current session's identity.
    async fn update_credential_secret(&self, new_secret: &str)
    -> Result<(), CredentialErrorCode>;

    /// Change the email of the current session's identity and reset its
    /// confirmation flag; the new address must complete verification.
    async fn update_email(&self, new_email: &str) -> Result<(), CredentialErrorCode>;

    /// Resend the verification challenge for an email address.
    async fn resend_verification(
        &self,
        email: &str,
    ) -> Result<VerificationOutcome, CredentialErrorCode>;

    /// Mark an identity's email as confirmed without a challenge.
    ///
    /// Only the admin bootstrap path calls this; see the session manager's
    /// sign-in pre-lookup.
    async fn force_confirm_email(&self, email: &str) -> Result<(), CredentialErrorCode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_fallback() {
        assert_eq!(
            classify_message("Invalid login credentials"),
            CredentialErrorCode::InvalidCredentials
        );
        assert_eq!(
            classify_message("Email not confirmed"),
            CredentialErrorCode::EmailNotConfirmed
        );
        assert_eq!(
            classify_message("Rate limit exceeded"),
            CredentialErrorCode::RateLimited
        );
        assert_eq!(
            classify_message("User already registered"),
            CredentialErrorCode::AlreadyRegistered
        );
        assert!(matches!(
            classify_message("backend melted"),
            CredentialErrorCode::Other(_)
        ));
    }

    #[test]
    fn structured_codes_take_priority() {
        assert!(matches!(
            CredentialErrorCode::InvalidCredentials.into_auth_error(),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            CredentialErrorCode::SessionExpired.into_auth_error(),
            AuthError::RefreshFailed
        ));
        // free-form text goes through the fallback classifier
        assert!(matches!(
            CredentialErrorCode::Other("email not verified yet".to_string()).into_auth_error(),
            AuthError::EmailNotVerified
        ));
        assert!(matches!(
            CredentialErrorCode::Other("???".to_string()).into_auth_error(),
            AuthError::Unknown(_)
        ));
    }
}
