//! Restricted registry access: credentials and sessions

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, Credentials};
pub use session::{RegistrySession, RestrictedRegistry};
