//! API client for communicating with the wallet backend.
//!
//! This module provides the `ApiClient` struct. Every request goes through
//! [`ApiClient::send`], which attaches the session's bearer token and, on a
//! 401, refreshes the token once and re-issues the request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::auth::{AccessToken, RefreshOutcome, Session};
use crate::config::{Config, DEFAULT_REFRESH_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::models::{
    ApiKey, CreateApiKeyRequest, CreateApiKeyResponse, CreateOrganizationRequest, Envelope,
    LoginRequest, LoginResponse, Organization, OrganizationList, Profile, RefreshResponse,
    SignupRequest, SignupResponse, SubmitTransactionRequest, Transaction, TransactionFilter,
    TransactionPage, UsageStats, VerifyLoginRequest, VerifyLoginResponse, WalletBalance,
};

use super::{ApiError, RequestDescriptor};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/v1/auth/login";
const SIGNUP_PATH: &str = "/api/v1/auth/signup";
const VERIFY_LOGIN_PATH: &str = "/api/v1/auth/verify-login";
const PROFILE_PATH: &str = "/api/v1/users/me";
const BALANCE_PATH: &str = "/api/v1/wallets/balance";
const TRANSACTIONS_PATH: &str = "/api/v1/transactions";
const TRANSACTION_DETAILS_PATH: &str = "/api/v1/transaction/get/transaction/details";
const ORGANIZATIONS_PATH: &str = "/organizations";

/// Result of a password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(AccessToken),
    /// The backend mailed a one-time code; finish with [`ApiClient::verify_login`]
    OtpRequired { message: Option<String> },
}

/// Reject tokens that could never be sent back in an `Authorization` header.
fn usable_token(value: String) -> Result<String, ApiError> {
    if value.is_empty() {
        return Err(ApiError::InvalidResponse("Backend returned an empty access token".to_string()));
    }
    if header::HeaderValue::from_str(&format!("Bearer {}", value)).is_err() {
        return Err(ApiError::InvalidResponse(
            "Backend returned an access token that is not a valid header value".to_string(),
        ));
    }
    Ok(value)
}

/// API client for the wallet backend.
/// Clone is cheap - the HTTP clients, cookie jar and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    /// Sends ambient cookies; used for descriptors with credentials
    client: Client,
    /// Same settings without a cookie store
    bare_client: Client,
    base_url: String,
    refresh_endpoint: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a client for `base_url` with default timeout and refresh endpoint
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> Result<Self> {
        Self::build(
            base_url.into(),
            DEFAULT_REFRESH_ENDPOINT.to_string(),
            DEFAULT_REQUEST_TIMEOUT_SECS,
            session,
        )
    }

    pub fn from_config(config: &Config, session: Arc<Session>) -> Result<Self> {
        Self::build(
            config.api_url(),
            config.refresh_endpoint().to_string(),
            config.request_timeout_secs(),
            session,
        )
    }

    fn build(
        base_url: String,
        refresh_endpoint: String,
        timeout_secs: u64,
        session: Arc<Session>,
    ) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Failed to build HTTP client")?;
        let bare_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            bare_client,
            base_url,
            refresh_endpoint,
            session,
        })
    }

    /// Use a different refresh endpoint (relative to the base URL or absolute)
    pub fn with_refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.refresh_endpoint = endpoint.into();
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(token: Option<&AccessToken>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let mut value = header::HeaderValue::from_str(&token.bearer())
                .map_err(|_| ApiError::InvalidRequest("Access token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Perform one HTTP round trip, no refresh handling
    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&AccessToken>,
    ) -> Result<Response, ApiError> {
        let url = descriptor.url(&self.base_url);
        let http = if descriptor.include_credentials() {
            &self.client
        } else {
            &self.bare_client
        };

        let mut request = http
            .request(descriptor.method().clone(), &url)
            .headers(Self::auth_headers(token)?);
        if !descriptor.query_pairs().is_empty() {
            request = request.query(descriptor.query_pairs());
        }
        if let Some(body) = descriptor.body() {
            request = request.json(body);
        }

        debug!(
            method = %descriptor.method(),
            url = %url,
            authorized = token.is_some(),
            "Sending request"
        );
        let response = request.send().await?;
        debug!(url = %url, status = %response.status(), "Response received");
        Ok(response)
    }

    /// Send a request with the current token, refreshing once on 401.
    ///
    /// Non-401 responses are returned as they are, including error statuses.
    /// On 401 the refresh endpoint is called (coalesced with any other
    /// request doing the same); if a new token comes back the request is
    /// sent again exactly once and that response is returned whatever its
    /// status. If the refresh fails the session is cleared and the original
    /// 401 response is returned.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Response, ApiError> {
        let snapshot = self.session.snapshot().await;
        let response = self.execute(descriptor, snapshot.token.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = descriptor.path(), "Unauthorized, attempting token refresh");
        let outcome = self
            .session
            .refresh_coalesced(snapshot.generation, || {
                self.request_new_token(snapshot.token.clone())
            })
            .await;

        match outcome {
            RefreshOutcome::Renewed(token) => {
                debug!(path = descriptor.path(), "Retrying with refreshed token");
                self.execute(descriptor, Some(&token)).await
            }
            RefreshOutcome::Failed => Ok(response),
        }
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// The rejected token goes along as the bearer; the backend reads the
    /// user from it when the cookie alone is not enough.
    async fn request_new_token(&self, stale: Option<AccessToken>) -> Result<String, ApiError> {
        let descriptor = RequestDescriptor::post(self.refresh_endpoint.as_str()).with_credentials();
        let response = self.execute(&descriptor, stale.as_ref()).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))?;

        body.into_token()
            .ok_or_else(|| ApiError::InvalidResponse("Refresh response carried no access token".to_string()))
            .and_then(usable_token)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a descriptor and decode a successful JSON response
    pub async fn request_json<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let url = descriptor.url(&self.base_url);
        let response = self
            .send(descriptor)
            .await
            .with_context(|| format!("Failed to send {} request to {}", descriptor.method(), url))?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(&RequestDescriptor::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let descriptor = RequestDescriptor::post(path).json(body)?;
        self.request_json(&descriptor).await
    }

    /// Decode a response wrapped in the `{"payload": ...}` envelope
    pub async fn request_payload<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let envelope: Envelope<T> = self.request_json(descriptor).await?;
        Ok(envelope.payload)
    }

    pub async fn get_payload<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_payload(&RequestDescriptor::get(path)).await
    }

    pub async fn post_payload<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let descriptor = RequestDescriptor::post(path).json(body)?;
        self.request_payload(&descriptor).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .send(&RequestDescriptor::delete(path))
            .await
            .with_context(|| format!("Failed to send DELETE request to {}", path))?;
        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Create an account. The backend mails a verification link and
    /// answers with a message; no session is started.
    pub async fn signup(&self, email: &str, password: &str) -> Result<Option<String>> {
        let body = SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let descriptor = RequestDescriptor::post(SIGNUP_PATH).json(&body)?;
        let response = self
            .execute(&descriptor, None)
            .await
            .context("Failed to send signup request")?;
        let response = Self::check_response(response).await?;

        let body: SignupResponse = response
            .json()
            .await
            .context("Failed to parse signup response")?;
        info!("Signed up");
        Ok(body.message)
    }

    /// Log in and store the access token in the session.
    ///
    /// The backend also sets the refresh cookie, which stays in this
    /// client's cookie jar for later refreshes. Accounts protected by a
    /// one-time code get [`LoginOutcome::OtpRequired`] and no token.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let descriptor = RequestDescriptor::post(LOGIN_PATH)
            .json(&body)?
            .with_credentials();

        // A 401 here is a bad password, not an expired token
        let response = self
            .execute(&descriptor, None)
            .await
            .context("Failed to send login request")?;
        let response = Self::check_response(response).await?;

        let envelope: Envelope<Option<LoginResponse>> = response
            .json()
            .await
            .context("Failed to parse login response")?;
        let payload = envelope.payload.unwrap_or_default();
        let Some(value) = payload.access_token else {
            info!("Login needs a one-time code");
            return Ok(LoginOutcome::OtpRequired {
                message: payload.message.or(envelope.message),
            });
        };

        let token = self.session.set_token(usable_token(value)?).await;
        info!("Logged in");
        Ok(LoginOutcome::Authenticated(token))
    }

    /// Finish a login with the one-time code and store the access token
    pub async fn verify_login(&self, email: &str, otp: &str) -> Result<AccessToken> {
        let body = VerifyLoginRequest {
            email: email.to_string(),
            otp: otp.trim().to_string(),
        };
        let descriptor = RequestDescriptor::post(VERIFY_LOGIN_PATH)
            .json(&body)?
            .with_credentials();

        // A 401 here is a wrong code
        let response = self
            .execute(&descriptor, None)
            .await
            .context("Failed to send verify-login request")?;
        let response = Self::check_response(response).await?;

        let body: VerifyLoginResponse = response
            .json()
            .await
            .context("Failed to parse verify-login response")?;
        let value = body
            .into_token()
            .ok_or_else(|| ApiError::InvalidResponse("Verify-login response carried no access token".to_string()))?;

        let token = self.session.set_token(usable_token(value)?).await;
        info!("Logged in with one-time code");
        Ok(token)
    }

    /// Forget the access token
    pub async fn logout(&self) {
        self.session.clear().await;
        info!("Logged out");
    }

    // ===== Wallet =====

    pub async fn fetch_profile(&self) -> Result<Profile> {
        self.get_payload(PROFILE_PATH).await
    }

    pub async fn fetch_balance(&self) -> Result<WalletBalance> {
        self.get_payload(BALANCE_PATH).await
    }

    /// Fetch one page of transactions matching `filter`
    pub async fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<TransactionPage> {
        let descriptor = filter
            .query_pairs()
            .into_iter()
            .fold(RequestDescriptor::get(TRANSACTIONS_PATH).with_credentials(), |d, (key, value)| {
                d.query(key, value)
            });
        self.request_payload(&descriptor).await
    }

    /// Submit a signed transfer; the backend co-signs with its key share
    pub async fn submit_transaction(&self, request: &SubmitTransactionRequest) -> Result<Transaction> {
        debug!(
            to = %request.to_address,
            amount = %request.amount,
            chain_id = request.chain_id,
            "Submitting transaction"
        );
        let descriptor = RequestDescriptor::post(TRANSACTIONS_PATH)
            .json(request)?
            .with_credentials();
        self.request_payload(&descriptor).await
    }

    pub async fn fetch_transaction(&self, id: &str) -> Result<Transaction> {
        let descriptor =
            RequestDescriptor::get(format!("{}/{}", TRANSACTION_DETAILS_PATH, id)).with_credentials();
        self.request_payload(&descriptor).await
    }

    // ===== Organizations (B2B) =====

    pub async fn fetch_organizations(&self, page: u32, limit: u32) -> Result<OrganizationList> {
        let descriptor = RequestDescriptor::get(ORGANIZATIONS_PATH)
            .query("page", page.max(1))
            .query("limit", limit.max(1));
        self.request_json(&descriptor).await
    }

    pub async fn create_organization(&self, request: &CreateOrganizationRequest) -> Result<Organization> {
        self.post_json(ORGANIZATIONS_PATH, request).await
    }

    pub async fn fetch_organization(&self, org_id: &str) -> Result<Organization> {
        self.get_json(&format!("{}/{}", ORGANIZATIONS_PATH, org_id)).await
    }

    pub async fn fetch_api_keys(&self, org_id: &str) -> Result<Vec<ApiKey>> {
        self.get_json(&format!("{}/{}/api-keys", ORGANIZATIONS_PATH, org_id)).await
    }

    pub async fn create_api_key(
        &self,
        org_id: &str,
        request: &CreateApiKeyRequest,
    ) -> Result<CreateApiKeyResponse> {
        self.post_json(&format!("{}/{}/api-keys", ORGANIZATIONS_PATH, org_id), request)
            .await
    }

    pub async fn delete_api_key(&self, org_id: &str, key_id: &str) -> Result<()> {
        self.delete(&format!("{}/{}/api-keys/{}", ORGANIZATIONS_PATH, org_id, key_id))
            .await
    }

    pub async fn fetch_usage(&self, org_id: &str) -> Result<UsageStats> {
        self.get_json(&format!("{}/{}/usage", ORGANIZATIONS_PATH, org_id)).await
    }
}
