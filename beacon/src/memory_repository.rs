use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::AuthError;
use crate::models::{Profile, ProfileUpdate};
use crate::repository::{LocalStore, ProfileRepository};

/// In-memory profile repository with a by-email secondary index.
#[derive(Default)]
pub struct MemoryProfileRepository {
    // Primary index: id -> profile
    profiles: DashMap<String, Profile>,
    // Secondary index: email -> id
    by_email: DashMap<String, String>,
}

impl MemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Profile>, AuthError> {
        Ok(self.profiles.get(id).map(|p| p.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>, AuthError> {
        let normalized = email.trim().to_lowercase();
        match self.by_email.get(&normalized) {
            Some(id) => Ok(self.profiles.get(id.value()).map(|p| p.clone())),
            None => Ok(None),
        }
    }

    async fn insert(&self, profile: Profile) -> Result<Profile, AuthError> {
        match self.profiles.entry(profile.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::ProfileAlreadyExists),
            Entry::Vacant(slot) => {
                self.by_email
                    .insert(profile.email.clone(), profile.id.clone());
                slot.insert(profile.clone());
                Ok(profile)
            }
        }
    }

    async fn upsert(&self, profile: Profile) -> Result<Profile, AuthError> {
        self.by_email
            .insert(profile.email.clone(), profile.id.clone());
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn update(&self, id: &str, changes: ProfileUpdate) -> Result<Profile, AuthError> {
        let mut entry = self
            .profiles
            .get_mut(id)
            .ok_or(AuthError::ProfileNotFound)?;

        let old_email = entry.email.clone();
        changes.apply_to(entry.value_mut());
        let updated = entry.clone();
        drop(entry);

        if updated.email != old_email {
            self.by_email.remove(&old_email);
            self.by_email.insert(updated.email.clone(), updated.id.clone());
        }
        Ok(updated)
    }
}

/// In-memory key-value store standing in for browser local storage.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: DashMap<String, String>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize, AuthError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, new_id};

    fn profile(email: &str) -> Profile {
        Profile::new(new_id(), email.to_string(), Role::User, "Test".to_string())
    }

    #[tokio::test]
    async fn insert_conflict_on_same_id() {
        let repo = MemoryProfileRepository::new();
        let row = profile("kim@example.com");

        repo.insert(row.clone()).await.unwrap();
        let err = repo.insert(row).await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileAlreadyExists));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn email_index_follows_updates() {
        let repo = MemoryProfileRepository::new();
        let row = profile("old@example.com");
        repo.insert(row.clone()).await.unwrap();

        repo.update(
            &row.id,
            ProfileUpdate {
                email: Some("new@example.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(repo.find_by_email("old@example.com").await.unwrap().is_none());
        let found = repo.find_by_email("new@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, row.id);
    }

    #[tokio::test]
    async fn local_store_prefix_removal_spares_other_keys() {
        let store = MemoryLocalStore::new();
        store.set("beacon.auth.principal", "{}").await.unwrap();
        store.set("beacon.auth.return_to", "/reports").await.unwrap();
        store.set("theme", "dark").await.unwrap();

        let removed = store.remove_prefix("beacon.auth.").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("dark"));
        assert!(store.get("beacon.auth.principal").await.unwrap().is_none());
    }
}
