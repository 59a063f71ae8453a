//! Data models for backend API responses.
//!
//! The `/api/v1` endpoints wrap their results in `{"payload": ...}`;
//! organization endpoints return bare JSON.

pub mod auth;
pub mod organization;
pub mod profile;
pub mod transaction;
pub mod wallet;

pub use auth::{
    LoginRequest, LoginResponse, RefreshResponse, SignupRequest, SignupResponse, VerifyLoginRequest,
    VerifyLoginResponse,
};
pub use organization::{
    ApiKey, CreateApiKeyRequest, CreateApiKeyResponse, CreateOrganizationRequest, Organization,
    OrganizationList, UsageStats,
};
pub use profile::Profile;
pub use transaction::{
    SubmitTransactionRequest, Transaction, TransactionFilter, TransactionPage, DEFAULT_CHAIN_ID,
};
pub use wallet::{Amount, WalletBalance};

use serde::Deserialize;

/// Standard success envelope of the `/api/v1` endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    #[serde(default)]
    pub message: Option<String>,
}
