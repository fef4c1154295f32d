/// Anthropic OAuth (authorization code + PKCE)
/// The PKCE verifier doubles as `state`, so the exchange can be checked
/// without keeping any server-side session.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::pkce::Pkce;
use super::store::CredentialStore;
use super::token_manager::{CredentialStatus, TokenSource};
use crate::config::{AnthropicConfig, Config};
use crate::error::{AuthError, Result};
use crate::metrics::METRICS;
use crate::types::{now_millis, AnthropicTokens, Provider};

const PROVIDER: Provider = Provider::Anthropic;

#[derive(Serialize)]
struct TokenRequest<'a> {
    code: &'a str,
    state: &'a str,
    grant_type: &'static str,
    client_id: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub account: Option<Account>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub email_address: String,
}

impl TokenResponse {
    fn into_tokens(self, now_ms: u64) -> AnthropicTokens {
        AnthropicTokens {
            refresh_token: self.refresh_token,
            access_token: self.access_token,
            expires_at_ms: now_ms.saturating_add(self.expires_in.saturating_mul(1000)),
        }
    }
}

pub struct AnthropicOAuth {
    client: reqwest::Client,
    store: CredentialStore,
    settings: AnthropicConfig,
}

impl AnthropicOAuth {
    pub fn new(client: reqwest::Client, store: CredentialStore, settings: AnthropicConfig) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.http.build_client()?,
            CredentialStore::from_config(config),
            config.anthropic.clone(),
        ))
    }

    /// Build the authorize URL. Returns `(url, verifier)`; keep the verifier
    /// for `exchange_code`.
    pub fn build_auth_url(&self) -> Result<(String, String)> {
        let pkce = Pkce::generate();
        let url = reqwest::Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("code", "true"),
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", self.settings.scope.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", pkce.verifier.as_str()),
            ],
        )
        .map_err(|e| AuthError::Config(format!("invalid authorize url: {e}")))?;

        Ok((url.into(), pkce.verifier))
    }

    /// Exchange an authorization code and persist the resulting token pair.
    ///
    /// Nothing is written unless the token endpoint answers with success.
    pub async fn exchange_code(&self, code: &str, state: &str, verifier: &str) -> Result<String> {
        if state != verifier {
            return Err(AuthError::StateMismatch);
        }

        let token_request = TokenRequest {
            code,
            state,
            grant_type: "authorization_code",
            client_id: &self.settings.client_id,
            redirect_uri: &self.settings.redirect_uri,
            code_verifier: verifier,
        };

        let token_response = self.post_token(&token_request, "anthropic_code_exchange").await?;

        if let Some(ref account) = token_response.account {
            info!(account = %account.email_address, "anthropic login complete");
        }

        let tokens = token_response.into_tokens(now_millis());
        let access_token = tokens.access_token.clone();
        self.store.set(PROVIDER.as_str(), &tokens.into())?;

        Ok(access_token)
    }

    /// Refresh-token grant. Does not touch the store.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let refresh_request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.settings.client_id,
        };

        self.post_token(&refresh_request, "anthropic_refresh").await
    }

    /// Currently valid access token, refreshing and persisting when stale.
    ///
    /// `None` means the caller has to run the login flow again.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let Some(tokens) = self
            .store
            .get(PROVIDER.as_str())
            .and_then(|record| AnthropicTokens::from_record(&record))
        else {
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        };

        if tokens.is_fresh_at(now_millis()) {
            debug!("using cached anthropic access token");
            METRICS.record_token_request(PROVIDER.as_str(), "cache_hit");
            return Some(tokens.access_token);
        }

        if tokens.refresh_token.is_empty() {
            warn!("anthropic credential has no refresh token, login required");
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        }

        let refreshed = match self.refresh_token(&tokens.refresh_token).await {
            Ok(response) => response.into_tokens(now_millis()),
            Err(e) => {
                warn!(error = %e, "anthropic token refresh failed");
                METRICS.record_token_request(PROVIDER.as_str(), "absent");
                return None;
            }
        };

        let access_token = refreshed.access_token.clone();
        if let Err(e) = self.store.set(PROVIDER.as_str(), &refreshed.into()) {
            warn!(error = %e, "failed to persist refreshed anthropic token");
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        }

        info!("refreshed anthropic access token");
        METRICS.record_token_request(PROVIDER.as_str(), "refreshed");
        Some(access_token)
    }

    async fn post_token<T: Serialize>(&self, body: &T, endpoint: &'static str) -> Result<TokenResponse> {
        let res = match self
            .client
            .post(&self.settings.token_url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                METRICS.record_oauth_request(endpoint, "transport_error");
                return Err(e.into());
            }
        };

        if !res.status().is_success() {
            METRICS.record_oauth_request(endpoint, "http_error");
            return Err(AuthError::from_response(endpoint, res).await);
        }

        METRICS.record_oauth_request(endpoint, "success");
        Ok(res.json().await?)
    }
}

#[async_trait]
impl TokenSource for AnthropicOAuth {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn access_token(&self) -> Option<String> {
        self.get_valid_access_token().await
    }

    fn status(&self) -> CredentialStatus {
        match self
            .store
            .get(PROVIDER.as_str())
            .and_then(|record| AnthropicTokens::from_record(&record))
        {
            None => CredentialStatus::NotAuthenticated,
            Some(tokens) if tokens.is_fresh_at(now_millis()) => CredentialStatus::Valid {
                expires_at_ms: tokens.expires_at_ms,
            },
            Some(_) => CredentialStatus::Expired,
        }
    }
}
