use async_trait::async_trait;
use sled::Db;
use std::path::Path;

use crate::error::AuthError;
use crate::models::{Profile, ProfileUpdate};
use crate::repository::ProfileRepository;

const PROFILES_TREE: &str = "profiles";
const PROFILES_BY_EMAIL_TREE: &str = "profiles_by_email";

/// Durable profile repository backed by sled, with a by-email index tree
/// for the sign-in role pre-lookup.
#[derive(Clone)]
pub struct SledProfileRepository {
    db: Db,
}

impl SledProfileRepository {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn profiles_tree(&self) -> Result<sled::Tree, AuthError> {
        Ok(self.db.open_tree(PROFILES_TREE)?)
    }

    fn email_tree(&self) -> Result<sled::Tree, AuthError> {
        Ok(self.db.open_tree(PROFILES_BY_EMAIL_TREE)?)
    }

    fn write_row(&self, profile: &Profile) -> Result<(), AuthError> {
        let profiles = self.profiles_tree()?;
        let emails = self.email_tree()?;

        let row = serde_json::to_vec(profile)?;
        profiles.insert(profile.id.as_bytes(), row)?;
        emails.insert(profile.email.as_bytes(), profile.id.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for SledProfileRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Profile>, AuthError> {
        let profiles = self.profiles_tree()?;

        if let Some(row) = profiles.get(id.as_bytes())? {
            let profile: Profile = serde_json::from_slice(&row)?;
            return Ok(Some(profile));
        }
        Ok(None)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, AuthError> {
        let emails = self.email_tree()?;
        let normalized = email.trim().to_lowercase();

        if let Some(id) = emails.get(normalized.as_bytes())? {
            let profiles = self.profiles_tree()?;
            if let Some(row) = profiles.get(&id)? {
                let profile: Profile = serde_json::from_slice(&row)?;
                return Ok(Some(profile));
            }
        }
        Ok(None)
    }

    async fn insert(&self, profile: Profile) -> Result<Profile, AuthError> {
        let profiles = self.profiles_tree()?;

        // compare_and_swap so a concurrent first insert surfaces as a
        // conflict instead of silently overwriting the winner.
        let row = serde_json::to_vec(&profile)?;
        let swapped = profiles.compare_and_swap(
            profile.id.as_bytes(),
            None as Option<&[u8]>,
            Some(row),
        )?;
        if swapped.is_err() {
            return Err(AuthError::ProfileAlreadyExists);
        }

        let emails = self.email_tree()?;
        emails.insert(profile.email.as_bytes(), profile.id.as_bytes())?;
        Ok(profile)
    }

    async fn upsert(&self, profile: Profile) -> Result<Profile, AuthError> {
        self.write_row(&profile)?;
        Ok(profile)
    }

    async fn update(&self, id: &str, changes: ProfileUpdate) -> Result<Profile, AuthError> {
        let profiles = self.profiles_tree()?;

        let row = profiles
            .get(id.as_bytes())?
            .ok_or(AuthError::ProfileNotFound)?;
        let mut profile: Profile = serde_json::from_slice(&row)?;
        let old_email = profile.email.clone();

        changes.apply_to(&mut profile);
        self.write_row(&profile)?;

        if profile.email != old_email {
            let emails = self.email_tree()?;
            emails.remove(old_email.as_bytes())?;
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, Role, new_id};
    use tempfile::TempDir;

    fn repo() -> (TempDir, SledProfileRepository) {
        let dir = TempDir::new().unwrap();
        let repo = SledProfileRepository::new(dir.path().join("profiles.sled")).unwrap();
        (dir, repo)
    }

    fn profile(email: &str, role: Role) -> Profile {
        Profile::new(new_id(), email.to_string(), role, "Test".to_string())
    }

    #[tokio::test]
    async fn insert_and_find() {
        let (_dir, repo) = repo();
        let row = profile("kim@example.com", Role::Responder);

        repo.insert(row.clone()).await.unwrap();

        let by_id = repo.find_by_id(&row.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "kim@example.com");
        assert_eq!(by_id.role, Role::Responder);

        let by_email = repo.find_by_email("KIM@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, row.id);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let (_dir, repo) = repo();
        let row = profile("kim@example.com", Role::User);

        repo.insert(row.clone()).await.unwrap();
        let err = repo.insert(row).await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileAlreadyExists));
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_dir, repo) = repo();
        let mut row = profile("kim@example.com", Role::User);

        repo.upsert(row.clone()).await.unwrap();
        row.approval_status = ApprovalStatus::Approved;
        repo.upsert(row.clone()).await.unwrap();

        let stored = repo.find_by_id(&row.id).await.unwrap().unwrap();
        assert_eq!(stored.approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn update_moves_email_index() {
        let (_dir, repo) = repo();
        let row = profile("old@example.com", Role::User);
        repo.insert(row.clone()).await.unwrap();

        let updated = repo
            .update(
                &row.id,
                ProfileUpdate {
                    email: Some("new@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "new@example.com");

        assert!(repo.find_by_email("old@example.com").await.unwrap().is_none());
        assert!(repo.find_by_email("new@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_missing_profile_fails() {
        let (_dir, repo) = repo();
        let err = repo
            .update("missing", ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProfileNotFound));
    }
}
