use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `payload` of a successful login.
///
/// Accounts with a second factor get no token here; the token arrives from
/// the verify-login step instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

/// Body of `/api/v1/auth/signup`; only the message is meaningful
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyLoginRequest {
    pub email: String,
    pub otp: String,
}

/// Body of the OTP verify-login step: `{"data": "<token>"}` or the login
/// envelope `{"payload": {"access_token": ..}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VerifyLoginResponse {
    Data { data: String },
    Wrapped { payload: LoginResponse },
}

impl VerifyLoginResponse {
    pub fn into_token(self) -> Option<String> {
        let token = match self {
            VerifyLoginResponse::Data { data } => Some(data),
            VerifyLoginResponse::Wrapped { payload } => payload.access_token,
        };
        token.filter(|t| !t.is_empty())
    }
}

/// Body of `/api/v1/auth/refresh`.
///
/// Accepts `{"accessToken": ..}`, `{"access_token": ..}` and either one
/// wrapped in `{"payload": ..}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RefreshResponse {
    // Tried first: a bare RefreshToken also matches `{"payload": ..}`
    Wrapped { payload: RefreshToken },
    Flat(RefreshToken),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: Option<String>,
}

impl RefreshResponse {
    /// The new token, if the body carried a non-empty one
    pub fn into_token(self) -> Option<String> {
        let token = match self {
            RefreshResponse::Flat(t) => t.access_token,
            RefreshResponse::Wrapped { payload } => payload.access_token,
        };
        token.filter(|t| !t.is_empty())
    }
}
