use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dashboard role. The set is closed; unrecognized values coming out of
/// storage deserialize as `User` so a corrupted row can never grant access.
///
/// Declaration order doubles as the authority ranking:
/// `User < Responder < Dispatcher < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Responder,
    Dispatcher,
    Admin,
}

// Hand-written so the declaration order (which the ranking derives from)
// stays authority-ascending while unknown wire values still land on `User`.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "responder" => Role::Responder,
            "dispatcher" => Role::Dispatcher,
            "admin" => Role::Admin,
            // unrecognized values can never grant access
            _ => Role::User,
        })
    }
}

impl Role {
    /// Numeric rank within the hierarchy; higher satisfies lower.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Whether this role skips the email-verification and approval gates.
    ///
    /// This is the single bypass flag; the matching data normalization
    /// lives in [`crate::provisioning::normalize`].
    pub fn bypasses_review(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
            Role::Responder => "responder",
            Role::User => "user",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative approval state of an account, distinct from identity
/// verification: an account can be email-verified yet still awaiting a
/// human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Identity as reported by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub email_confirmed: bool,
}

/// Durable profile row, one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub approval_status: ApprovalStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(id: String, email: String, role: Role, name: String) -> Self {
        Self {
            id,
            email: email.trim().to_lowercase(),
            role,
            name,
            phone_number: None,
            avatar_url: None,
            approval_status: ApprovalStatus::Pending,
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
            created_at: Utc::now(),
            last_sign_in_at: None,
        }
    }
}

/// Caller-supplied attributes for a fresh registration.
#[derive(Debug, Clone, Default)]
pub struct ProfileSeed {
    pub role: Role,
    pub name: Option<String>,
    pub phone_number: Option<String>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.name.is_none()
            && self.phone_number.is_none()
            && self.avatar_url.is_none()
            && self.last_sign_in_at.is_none()
    }

    /// Apply this update to a profile row in place.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(email) = &self.email {
            profile.email = email.trim().to_lowercase();
        }
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(phone) = &self.phone_number {
            profile.phone_number = Some(phone.clone());
        }
        if let Some(avatar) = &self.avatar_url {
            profile.avatar_url = Some(avatar.clone());
        }
        if let Some(ts) = self.last_sign_in_at {
            profile.last_sign_in_at = Some(ts);
        }
    }
}

/// The materialized "who is signed in" record: identity flags merged with
/// the profile row, normalized (see [`crate::provisioning::normalize`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub email_confirmed: bool,
    pub approval_status: ApprovalStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Merge identity flags and the profile row. No normalization here;
    /// callers go through provisioning for that.
    pub fn from_parts(identity: &Identity, profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            role: profile.role,
            name: profile.name.clone(),
            phone_number: profile.phone_number.clone(),
            avatar_url: profile.avatar_url.clone(),
            email_confirmed: identity.email_confirmed,
            approval_status: profile.approval_status,
            approved_at: profile.approved_at,
            approved_by: profile.approved_by.clone(),
            rejection_reason: profile.rejection_reason.clone(),
            created_at: profile.created_at,
            last_sign_in_at: profile.last_sign_in_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Generate a fresh identity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derive a display name from the local part of an email address.
pub fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ranking_is_total() {
        assert!(Role::Admin > Role::Dispatcher);
        assert!(Role::Dispatcher > Role::Responder);
        assert!(Role::Responder > Role::User);
        assert_eq!(Role::Admin.rank(), 3);
        assert_eq!(Role::User.rank(), 0);
    }

    #[test]
    fn unknown_role_coerces_to_user() {
        let role: Role = serde_json::from_str("\"superuser\"").unwrap();
        assert_eq!(role, Role::User);

        let role: Role = serde_json::from_str("\"dispatcher\"").unwrap();
        assert_eq!(role, Role::Dispatcher);
    }

    #[test]
    fn only_admin_bypasses_review() {
        assert!(Role::Admin.bypasses_review());
        assert!(!Role::Dispatcher.bypasses_review());
        assert!(!Role::Responder.bypasses_review());
        assert!(!Role::User.bypasses_review());
    }

    #[test]
    fn profile_update_applies_selected_fields() {
        let mut profile = Profile::new(
            new_id(),
            "Dana@Example.com".to_string(),
            Role::Responder,
            "Dana".to_string(),
        );
        assert_eq!(profile.email, "dana@example.com");

        let update = ProfileUpdate {
            name: Some("Dana R.".to_string()),
            phone_number: Some("+1555".to_string()),
            ..Default::default()
        };
        update.apply_to(&mut profile);

        assert_eq!(profile.name, "Dana R.");
        assert_eq!(profile.phone_number.as_deref(), Some("+1555"));
        assert_eq!(profile.email, "dana@example.com");
    }

    #[test]
    fn display_name_derivation() {
        assert_eq!(display_name_from_email("kim@example.com"), "kim");
        assert_eq!(display_name_from_email("no-at-sign"), "no-at-sign");
    }
}
