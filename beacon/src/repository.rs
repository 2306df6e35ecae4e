use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::{Profile, ProfileUpdate};

/// Port for the keyed profile record store (one row per identity).
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Find a profile by identity id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Profile>, AuthError>;

    /// Find a profile by email (used by the sign-in role pre-lookup).
    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, AuthError>;

    /// Insert a new profile. Fails with `ProfileAlreadyExists` when a row
    /// with the same id is present.
    async fn insert(&self, profile: Profile) -> Result<Profile, AuthError>;

    /// Insert or replace, keyed by id. Idempotent; used to settle
    /// first-login provisioning races.
    async fn upsert(&self, profile: Profile) -> Result<Profile, AuthError>;

    /// Apply a partial update and return the resulting row.
    async fn update(&self, id: &str, changes: ProfileUpdate) -> Result<Profile, AuthError>;
}

/// Port for the local key-value state this engine persists between page
/// loads. Every key the engine writes carries a recognizable prefix so
/// sign-out can remove exactly its own entries.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    async fn remove(&self, key: &str) -> Result<(), AuthError>;

    /// Remove every key under `prefix`; returns how many were removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, AuthError>;
}
