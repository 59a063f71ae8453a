//! Bearer attachment and refresh-on-401 behaviour against a mock backend.

use std::sync::Arc;

use mockito::{Matcher, Server, ServerGuard};
use mpcwallet_core::{ApiClient, ApiError, LoginOutcome, RequestDescriptor, Session};
use reqwest::StatusCode;

const BALANCE: &str = "/api/v1/wallets/balance";
const REFRESH: &str = "/api/v1/auth/refresh";
const BALANCE_BODY: &str = r#"{"payload":{"balance":"1.25"}}"#;

fn client_for(server: &ServerGuard, session: &Arc<Session>) -> ApiClient {
    ApiClient::new(server.url(), Arc::clone(session)).expect("client should build")
}

async fn current_token(session: &Session) -> Option<String> {
    session.token().await.map(|t| t.as_str().to_string())
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BALANCE_BODY)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    m.assert_async().await;
}

#[tokio::test]
async fn test_no_authorization_header_without_token() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", BALANCE)
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(BALANCE_BODY)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    m.assert_async().await;
}

#[tokio::test]
async fn test_refresh_success_retries_once_with_new_token() {
    let mut server = Server::new_async().await;
    let expired = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .match_header("authorization", "Bearer t1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"t2"}"#)
        .expect(1)
        .create_async()
        .await;
    let renewed = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t2")
        .with_status(200)
        .with_body(BALANCE_BODY)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(current_token(&session).await.as_deref(), Some("t2"));

    expired.assert_async().await;
    refresh.assert_async().await;
    renewed.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure_clears_session_and_returns_original_401() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", BALANCE)
        .with_status(401)
        .with_body("original failure")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(401)
        .with_body(r#"{"error":"refresh token expired","error_code":"UNAUTHORIZED"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "original failure");
    assert!(!session.is_authenticated().await);

    original.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refresh_without_token_in_body_is_a_failure() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", BALANCE)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"ok"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session.token().await.is_none());

    original.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_refreshed_token_that_is_not_a_header_value_is_a_failure() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", BALANCE)
        .with_status(401)
        .with_body("original failure")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"bad\ntoken"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "original failure");
    assert!(session.token().await.is_none());

    original.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_refresh_endpoint_is_a_failure() {
    let mut server = Server::new_async().await;
    let original = server
        .mock("GET", BALANCE)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session)
        .with_refresh_endpoint("http://127.0.0.1:1/api/v1/auth/refresh");

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!session.is_authenticated().await);
    original.assert_async().await;
}

#[tokio::test]
async fn test_second_401_after_retry_is_not_refreshed_again() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", BALANCE)
        .with_status(401)
        .with_body("still unauthorized")
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"t2"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "still unauthorized");
    assert_eq!(current_token(&session).await.as_deref(), Some("t2"));

    rejected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_other_failures_are_returned_without_refresh() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", BALANCE)
        .with_status(500)
        .with_body("boom")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(r#"{"accessToken":"t2"}"#)
        .expect(0)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    let response = client.send(&RequestDescriptor::get(BALANCE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(current_token(&session).await.as_deref(), Some("t1"));

    failing.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_network_failure_is_propagated() {
    let session = Arc::new(Session::with_token("t1"));
    let client = ApiClient::new("http://127.0.0.1:1", Arc::clone(&session)).unwrap();

    let result = client.send(&RequestDescriptor::get(BALANCE)).await;
    assert!(matches!(result, Err(mpcwallet_core::ApiError::NetworkError(_))));
    // Transport errors never touch the session
    assert_eq!(current_token(&session).await.as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let mut server = Server::new_async().await;
    let expired = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t1")
        .with_status(401)
        .expect_at_least(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"t2"}"#)
        .expect(1)
        .create_async()
        .await;
    let renewed = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t2")
        .with_status(200)
        .with_body(BALANCE_BODY)
        .expect(5)
        .create_async()
        .await;

    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);
    let descriptor = RequestDescriptor::get(BALANCE);

    let responses = futures::future::join_all((0..5).map(|_| client.send(&descriptor))).await;
    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    assert_eq!(current_token(&session).await.as_deref(), Some("t2"));

    expired.assert_async().await;
    refresh.assert_async().await;
    renewed.assert_async().await;
}

#[tokio::test]
async fn test_login_cookie_is_sent_on_refresh() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/v1/auth/login")
        .match_body(Matcher::PartialJson(serde_json::json!({"email": "alice@example.com"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "refresh_token=abc; Path=/; HttpOnly")
        .with_body(r#"{"payload":{"access_token":"t1"}}"#)
        .expect(1)
        .create_async()
        .await;
    let expired = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .match_header("cookie", Matcher::Regex("refresh_token=abc".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"t2"}"#)
        .expect(1)
        .create_async()
        .await;
    let renewed = server
        .mock("GET", BALANCE)
        .match_header("authorization", "Bearer t2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BALANCE_BODY)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    match client.login("alice@example.com", "hunter2").await.unwrap() {
        LoginOutcome::Authenticated(token) => assert_eq!(token.as_str(), "t1"),
        other => panic!("unexpected login outcome: {:?}", other),
    }

    let balance = client.fetch_balance().await.unwrap();
    assert_eq!(balance.balance.as_f64(), Some(1.25));
    assert_eq!(current_token(&session).await.as_deref(), Some("t2"));

    login.assert_async().await;
    expired.assert_async().await;
    refresh.assert_async().await;
    renewed.assert_async().await;
}

#[tokio::test]
async fn test_failed_login_does_not_refresh() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/v1/auth/login")
        .with_status(401)
        .with_body(r#"{"error":"invalid password","error_code":"INVALID_PASSWORD"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .expect(0)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    let err = client.login("alice@example.com", "wrong").await.unwrap_err();
    assert!(err
        .downcast_ref::<ApiError>()
        .map(|e| e.is_unauthorized())
        .unwrap_or(false));
    assert!(!session.is_authenticated().await);

    login.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_logout_clears_token() {
    let server = Server::new_async().await;
    let session = Arc::new(Session::with_token("t1"));
    let client = client_for(&server, &session);

    client.logout().await;
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn test_login_token_that_is_not_a_header_value_is_rejected() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/v1/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"payload":{"access_token":"t1\r\nX-Injected: 1"}}"#)
        .expect(1)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    let err = client.login("alice@example.com", "hunter2").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::InvalidResponse(_))));
    assert!(!session.is_authenticated().await);

    login.assert_async().await;
}

#[tokio::test]
async fn test_login_requiring_otp_then_verify() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/api/v1/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"OTP sent to your email"}"#)
        .expect(1)
        .create_async()
        .await;
    let verify = server
        .mock("POST", "/api/v1/auth/verify-login")
        .match_body(Matcher::Json(serde_json::json!({"email": "alice@example.com", "otp": "123456"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "refresh_token=abc; Path=/; HttpOnly")
        .with_body(r#"{"data":"t1"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .expect(0)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    let outcome = client.login("alice@example.com", "hunter2").await.unwrap();
    assert_eq!(
        outcome,
        LoginOutcome::OtpRequired {
            message: Some("OTP sent to your email".to_string())
        }
    );
    assert!(!session.is_authenticated().await);

    let token = client.verify_login("alice@example.com", " 123456 ").await.unwrap();
    assert_eq!(token.as_str(), "t1");
    assert_eq!(current_token(&session).await.as_deref(), Some("t1"));

    login.assert_async().await;
    verify.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_wrong_otp_does_not_refresh() {
    let mut server = Server::new_async().await;
    let verify = server
        .mock("POST", "/api/v1/auth/verify-login")
        .with_status(401)
        .with_body(r#"{"error":"invalid otp","error_code":"UNAUTHORIZED"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .expect(0)
        .create_async()
        .await;

    let session = Arc::new(Session::new());
    let client = client_for(&server, &session);

    let err = client.verify_login("alice@example.com", "000000").await.unwrap_err();
    assert!(err.downcast_ref::<ApiError>().map(|e| e.is_unauthorized()).unwrap_or(false));
    assert!(!session.is_authenticated().await);

    verify.assert_async().await;
    refresh.assert_async().await;
}
