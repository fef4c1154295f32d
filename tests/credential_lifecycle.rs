// End-to-end credential lifecycle against mocked provider endpoints.
// Every test uses its own temporary store, so they can run in parallel.

use mockito::{Matcher, Server};
use serde_json::json;
use zen_auth::auth::{CredentialStatus, PollStatus};
use zen_auth::metrics::METRICS;
use zen_auth::{AnthropicOAuth, Config, GitHubOAuth, Provider, TokenManager};

/// Config pointing every endpoint at the mock server and the store at `dir`
fn test_config(server: &Server, dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());
    config.http.timeout_secs = 5;
    config.anthropic.token_url = format!("{}/v1/oauth/token", server.url());
    config.github_copilot.device_code_url = format!("{}/login/device/code", server.url());
    config.github_copilot.access_token_url = format!("{}/login/oauth/access_token", server.url());
    config.github_copilot.api_token_url = format!("{}/copilot_internal/v2/token", server.url());
    config
}

#[tokio::test]
async fn anthropic_login_then_token_manager_serves_cached_token() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server, &dir);

    let token_mock = server
        .mock("POST", "/v1/oauth/token")
        .match_body(Matcher::PartialJson(json!({"grant_type": "authorization_code"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"A","refresh_token":"R","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let oauth = AnthropicOAuth::from_config(&config).unwrap();
    let (url, verifier) = oauth.build_auth_url().unwrap();
    assert!(url.contains(&format!("state={verifier}")));

    let token = oauth.exchange_code("code-1", &verifier, &verifier).await.unwrap();
    assert_eq!(token, "A");

    let manager = TokenManager::from_config(&config).unwrap();
    assert_eq!(manager.get_access_token("anthropic").await.as_deref(), Some("A"));
    assert_eq!(manager.get_access_token("anthropic").await.as_deref(), Some("A"));
    token_mock.assert_async().await;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("auth.json")).unwrap())
            .unwrap();
    assert_eq!(raw["anthropic"]["type"], "oauth");
    assert_eq!(raw["anthropic"]["access"], "A");
    assert_eq!(raw["anthropic"]["refresh"], "R");
    assert!(raw["anthropic"]["expires"].as_u64().unwrap() > 0);

    let exposition = METRICS.render();
    assert!(exposition.contains(r#"endpoint="anthropic_code_exchange",result="success""#));
    assert!(exposition.contains(r#"outcome="cache_hit",provider="anthropic""#));
}

#[tokio::test]
async fn copilot_device_login_then_api_token() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server, &dir);

    server
        .mock("POST", "/login/device/code")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"device_code":"dc","user_code":"WXYZ-0000","verification_uri":"https://github.com/login/device","interval":0,"expires_in":60}"#,
        )
        .create_async()
        .await;
    server
        .mock("POST", "/login/oauth/access_token")
        .match_body(Matcher::PartialJson(json!({
            "device_code": "dc",
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"T"}"#)
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/copilot_internal/v2/token")
        .match_header("authorization", "Bearer T")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"X","expires_at":1700000000}"#)
        .expect(1)
        .create_async()
        .await;

    let oauth = GitHubOAuth::from_config(&config).unwrap();
    let session = oauth.start_device_flow().await.unwrap();
    assert_eq!(session.user_code, "WXYZ-0000");
    assert_eq!(oauth.poll_once(&session.device_code).await, PollStatus::Complete);

    let manager = TokenManager::from_config(&config).unwrap();
    assert_eq!(manager.status()[1], (Provider::GithubCopilot, CredentialStatus::Expired));

    assert_eq!(
        manager.get_access_token("github-copilot").await.as_deref(),
        Some("X")
    );
    api_mock.assert_async().await;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("auth.json")).unwrap())
            .unwrap();
    assert_eq!(raw["github-copilot"]["refresh"], "T");
    assert_eq!(raw["github-copilot"]["access"], "X");
    assert_eq!(raw["github-copilot"]["expires"], 1_700_000_000_000u64);
}

#[tokio::test]
async fn corrupt_store_means_login_required() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server, &dir);
    std::fs::write(dir.path().join("auth.json"), "{ definitely not json").unwrap();

    let manager = TokenManager::from_config(&config).unwrap();
    assert!(manager.get_access_token("anthropic").await.is_none());
    assert!(manager.get_access_token("github-copilot").await.is_none());
    assert!(manager.get_access_token("nonexistent").await.is_none());
    assert!(manager
        .status()
        .iter()
        .all(|(_, s)| *s == CredentialStatus::NotAuthenticated));
}
