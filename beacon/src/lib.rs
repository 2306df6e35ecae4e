#![deny(clippy::all)]

//! Session & authorization engine for the operations dashboard.
//!
//! The engine owns the authenticated principal, keeps the short-lived
//! credential fresh, and decides which destinations a principal may reach.
//! Everything else in the application (screens, charts, messaging) consumes
//! this crate through [`SessionManager`] and [`gate::evaluate`].

pub mod credential;
pub mod defaults;
pub mod error;
pub mod gate;
pub mod memory_credential_store;
pub mod memory_repository;
pub mod models;
pub mod password;
pub mod permissions;
pub mod provisioning;
pub mod repository;
pub mod session;
pub mod sled_repository;
pub mod timer;

// Re-export commonly used types
pub use credential::{AuthSession, Credential, CredentialErrorCode, CredentialStore, VerificationOutcome};
pub use error::AuthError;
pub use gate::{GateOutcome, RouteRequirement};
pub use memory_credential_store::MemoryCredentialStore;
pub use memory_repository::{MemoryLocalStore, MemoryProfileRepository};
pub use models::{ApprovalStatus, Identity, Principal, Profile, ProfileSeed, ProfileUpdate, Role};
pub use permissions::Permission;
pub use repository::{LocalStore, ProfileRepository};
pub use session::{ResendOutcome, SessionManager, SignUpOutcome};
pub use sled_repository::SledProfileRepository;
