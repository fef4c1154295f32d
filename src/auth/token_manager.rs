/// Token manager: routes "give me a valid token" to the right provider flow
use async_trait::async_trait;
use std::str::FromStr;

use super::{AnthropicOAuth, CredentialStore, GitHubOAuth};
use crate::config::Config;
use crate::error::Result;
use crate::types::Provider;

/// What a caller can learn about a stored credential without network I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    NotAuthenticated,
    Valid { expires_at_ms: u64 },
    /// Stored but stale; the next token request will try to refresh it
    Expired,
}

/// A provider flow able to hand out a currently valid bearer token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// `None` means the provider's login flow must be run again.
    async fn access_token(&self) -> Option<String>;

    fn status(&self) -> CredentialStatus;
}

pub struct TokenManager {
    sources: Vec<Box<dyn TokenSource>>,
    store: CredentialStore,
}

impl TokenManager {
    pub fn new(store: CredentialStore, sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self { sources, store }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            CredentialStore::from_config(config),
            vec![
                Box::new(AnthropicOAuth::from_config(config)?) as Box<dyn TokenSource>,
                Box::new(GitHubOAuth::from_config(config)?),
            ],
        ))
    }

    fn source(&self, provider: Provider) -> Option<&dyn TokenSource> {
        self.sources
            .iter()
            .find(|s| s.provider() == provider)
            .map(|s| s.as_ref())
    }

    /// Valid access token for a provider key, refreshing transparently.
    ///
    /// Unknown keys and missing credentials both yield `None`.
    pub async fn get_access_token(&self, provider: &str) -> Option<String> {
        let provider = Provider::from_str(provider).ok()?;
        self.token_for(provider).await
    }

    pub async fn token_for(&self, provider: Provider) -> Option<String> {
        self.source(provider)?.access_token().await
    }

    /// Stored-credential status for every known provider
    pub fn status(&self) -> Vec<(Provider, CredentialStatus)> {
        Provider::ALL
            .iter()
            .map(|&p| {
                let status = self
                    .source(p)
                    .map(|s| s.status())
                    .unwrap_or(CredentialStatus::NotAuthenticated);
                (p, status)
            })
            .collect()
    }

    /// Forget the local credential for a provider
    pub fn logout(&self, provider: Provider) -> Result<bool> {
        self.store.remove(provider.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnthropicTokens, CopilotTokens, now_millis};

    fn mock_source(provider: Provider, token: Option<&'static str>) -> Box<dyn TokenSource> {
        let mut source = MockTokenSource::new();
        source.expect_provider().return_const(provider);
        source
            .expect_access_token()
            .returning(move || token.map(String::from));
        source
            .expect_status()
            .return_const(CredentialStatus::NotAuthenticated);
        Box::new(source)
    }

    fn manager_with(sources: Vec<Box<dyn TokenSource>>) -> (tempfile::TempDir, TokenManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("auth.json"));
        (dir, TokenManager::new(store, sources))
    }

    #[tokio::test]
    async fn test_dispatches_by_provider_key() {
        let (_dir, manager) = manager_with(vec![
            mock_source(Provider::Anthropic, Some("anthropic-token")),
            mock_source(Provider::GithubCopilot, Some("copilot-token")),
        ]);

        assert_eq!(
            manager.get_access_token("anthropic").await.as_deref(),
            Some("anthropic-token")
        );
        assert_eq!(
            manager.get_access_token("github-copilot").await.as_deref(),
            Some("copilot-token")
        );
    }

    #[tokio::test]
    async fn test_unknown_provider_is_none() {
        let (_dir, manager) = manager_with(vec![mock_source(Provider::Anthropic, Some("a"))]);
        assert!(manager.get_access_token("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_none() {
        let (_dir, manager) = manager_with(vec![mock_source(Provider::Anthropic, Some("a"))]);
        assert!(manager.token_for(Provider::GithubCopilot).await.is_none());
    }

    #[tokio::test]
    async fn test_absent_credential_is_none() {
        let (_dir, manager) = manager_with(vec![mock_source(Provider::Anthropic, None)]);
        assert!(manager.get_access_token("claude").await.is_none());
    }

    #[test]
    fn test_status_and_logout_with_real_flows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("auth.json"));
        let config = Config::default();
        let client = reqwest::Client::new();
        let manager = TokenManager::new(
            store.clone(),
            vec![
                Box::new(AnthropicOAuth::new(client.clone(), store.clone(), config.anthropic.clone()))
                    as Box<dyn TokenSource>,
                Box::new(GitHubOAuth::new(client, store.clone(), config.github_copilot.clone())),
            ],
        );

        let expires_at_ms = now_millis() + 60_000;
        store
            .set(
                "anthropic",
                &AnthropicTokens {
                    refresh_token: "R".into(),
                    access_token: "A".into(),
                    expires_at_ms,
                }
                .into(),
            )
            .unwrap();
        store
            .set("github-copilot", &CopilotTokens::from_github_token("T".into()).into())
            .unwrap();

        assert_eq!(
            manager.status(),
            vec![
                (Provider::Anthropic, CredentialStatus::Valid { expires_at_ms }),
                (Provider::GithubCopilot, CredentialStatus::Expired),
            ]
        );

        assert!(manager.logout(Provider::Anthropic).unwrap());
        assert_eq!(manager.status()[0].1, CredentialStatus::NotAuthenticated);
        assert!(store.get("github-copilot").is_some());
    }
}
