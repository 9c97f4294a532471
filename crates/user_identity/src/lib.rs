//! Opaque per-user identifier, generated once and cached on disk.
//!
//! The identifier authenticates collaborator calls (`X-User-Id`). It carries
//! no secret and is not part of transcript correctness.

mod error;
mod paths;
mod schema;
mod store;

pub use error::IdentityError;
pub use paths::{identity_file, identity_root, identity_root_from, IDENTITY_HOME_ENV_VAR};
pub use schema::IdentityRecord;
pub use store::IdentityStore;
