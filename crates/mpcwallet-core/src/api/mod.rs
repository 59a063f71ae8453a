//! REST API client module for the wallet backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! backend's `/api/v1` and organization endpoints.
//!
//! Requests carry a bearer token taken from the shared `Session`. When the
//! backend answers 401 the client exchanges the refresh cookie for a new
//! token at `/api/v1/auth/refresh` and retries the request once.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, LoginOutcome};
pub use error::ApiError;
pub use request::RequestDescriptor;
