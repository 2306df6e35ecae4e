use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Too many attempts, please try again later")]
    RateLimited,

    #[error("Profile could not be created")]
    ProfileCreationFailed,

    #[error("Session could not be refreshed")]
    RefreshFailed,

    #[error("Recovery token is invalid or expired")]
    RecoveryTokenInvalid,

    #[error("Re-authentication failed")]
    ReauthenticationFailed,

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Operation superseded by a newer session change")]
    Superseded,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Profile already exists")]
    ProfileAlreadyExists,

    #[error("Password does not meet strength requirements")]
    WeakPassword,

    #[error("Password hashing error: {0}")]
    PasswordHashError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Authentication backend error: {0}")]
    Unknown(String),
}

impl From<sled::Error> for AuthError {
    fn from(err: sled::Error) -> Self {
        AuthError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::SerializationError(err.to_string())
    }
}
