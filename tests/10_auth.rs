mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use common::{assert_error, USER_EMAIL, USER_NAME, USER_PASSWORD};

#[tokio::test]
async fn health_and_root_respond() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, body) = server.get("/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = server.get("/", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Product API");
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_not_found() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, body) = server.get("/nope", None).await?;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
    Ok(())
}

#[tokio::test]
async fn login_returns_token_and_profile() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, body) = server.login_with(USER_EMAIL, USER_PASSWORD).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let data = &body["data"];
    assert!(!data["token"].as_str().unwrap_or_default().is_empty());
    assert_eq!(data["token_type"], "bearer");
    assert_eq!(data["expires_in"], 7 * 24 * 3600);
    assert_eq!(data["user"]["email"], USER_EMAIL);
    assert_eq!(data["user"]["name"], USER_NAME);
    assert!(data["user"]["id"].is_i64());
    assert!(data["user"].get("password_hash").is_none());
    Ok(())
}

#[tokio::test]
async fn login_email_is_case_insensitive() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, _) = server.login_with("  TESTER@Example.com ", USER_PASSWORD).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected_uniformly() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, wrong_password) = server.login_with(USER_EMAIL, "wrong password").await?;
    assert_error(status, &wrong_password, StatusCode::UNAUTHORIZED, "invalid_credentials");

    let (status, unknown_email) = server.login_with("nobody@example.com", USER_PASSWORD).await?;
    assert_error(status, &unknown_email, StatusCode::UNAUTHORIZED, "invalid_credentials");

    assert_eq!(wrong_password["message"], unknown_email["message"]);
    assert!(wrong_password.get("data").is_none());
    Ok(())
}

#[tokio::test]
async fn login_validates_fields() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.client.post(server.url("/login")).json(&json!({})).send().await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await?;
    assert_error(status, &body, StatusCode::UNPROCESSABLE_ENTITY, "validation_failed");
    assert!(body["detail"]["errors"]["email"].is_array());
    assert!(body["detail"]["errors"]["password"].is_array());

    let (status, body) = server.login_with("not-an-email", "whatever").await?;
    assert_error(status, &body, StatusCode::UNPROCESSABLE_ENTITY, "validation_failed");
    assert!(body["detail"]["errors"].get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn malformed_login_body_is_a_bad_request() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server
        .client
        .post(server.url("/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await?;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "bad_request");
    Ok(())
}

#[tokio::test]
async fn me_returns_the_token_owner() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token().await?;

    let (status, body) = server.get("/me", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["email"], USER_EMAIL);
    Ok(())
}

#[tokio::test]
async fn me_requires_a_valid_token() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, body) = server.get("/me", None).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "not_authenticated");

    let (status, body) = server.get("/me", Some("garbage.token.value")).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "not_authenticated");
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_token() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token().await?;

    let (status, body) = server.post("/logout", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Successfully logged out.");

    let (status, body) = server.get("/me", Some(&token)).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "not_authenticated");

    let (status, body) = server.post("/logout", Some(&token)).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "not_authenticated");
    Ok(())
}

#[tokio::test]
async fn logout_only_affects_the_presented_token() -> Result<()> {
    let server = common::spawn_server().await?;
    let first = server.token().await?;
    let second = server.token().await?;

    let (status, _) = server.post("/logout", Some(&first)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get("/me", Some(&second)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_swaps_the_token() -> Result<()> {
    let server = common::spawn_server().await?;
    let old = server.token().await?;

    let (status, body) = server.post("/refresh", Some(&old)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token_type"], "bearer");
    let new = body["data"]["token"].as_str().unwrap_or_default().to_string();
    assert!(!new.is_empty());
    assert_ne!(new, old);

    let (status, _) = server.get("/me", Some(&new)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("/me", Some(&old)).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "not_authenticated");
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_missing_or_revoked_tokens() -> Result<()> {
    let server = common::spawn_server().await?;

    let (status, body) = server.post("/refresh", None).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "invalid_token");

    let token = server.token().await?;
    server.post("/logout", Some(&token)).await?;
    let (status, body) = server.post("/refresh", Some(&token)).await?;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "invalid_token");
    Ok(())
}
