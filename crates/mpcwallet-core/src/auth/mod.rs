//! Authentication module for managing the access token and credentials.
//!
//! This module provides:
//! - `Session`: In-memory owner of the current access token, with coalesced refresh
//! - `CredentialStore`: Secure OS-level credential storage via keyring
//!
//! Tokens are never written to disk; a new process logs in again.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{AccessToken, RefreshOutcome, Session, TokenSnapshot};
