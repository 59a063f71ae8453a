//! Core library for the MPC wallet client.
//!
//! Provides the authenticated API client, the session context that owns the
//! current access token, wire models for the wallet and B2B endpoints, and
//! configuration/credential helpers shared by front ends.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, LoginOutcome, RequestDescriptor};
pub use auth::{AccessToken, CredentialStore, RefreshOutcome, Session};
pub use config::Config;
