/// GitHub OAuth Device Flow, used for GitHub Copilot access
/// The long-lived GitHub token is stored as the credential's refresh token and
/// traded for short-lived Copilot API tokens on demand.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::store::CredentialStore;
use super::token_manager::{CredentialStatus, TokenSource};
use crate::config::{Config, CopilotConfig};
use crate::error::{AuthError, Result};
use crate::metrics::METRICS;
use crate::types::{now_millis, CopilotTokens, Provider};

const PROVIDER: Provider = Provider::GithubCopilot;
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// RFC 8628 §3.5: each `slow_down` adds 5 seconds to the polling interval
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

fn default_interval() -> u64 {
    5
}

fn default_expires_in() -> u64 {
    900
}

/// One device login attempt. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceFlowSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// When the device code was issued; the `expires_in` budget counts from here
    #[serde(skip, default = "Instant::now")]
    pub issued_at: Instant,
}

impl DeviceFlowSession {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Total time budget for polling, measured from `start_device_flow`
    pub fn expires_after(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }

    /// Instant after which polling is pointless
    pub fn deadline(&self) -> Instant {
        self.issued_at + self.expires_after()
    }
}

/// Outcome of a single poll of the access-token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    SlowDown,
    Complete,
    Failed(String),
}

#[derive(Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

#[derive(Serialize)]
struct PollRequest<'a> {
    client_id: &'a str,
    device_code: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct PollResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct CopilotTokenResponse {
    token: String,
    expires_at: u64,
}

pub struct GitHubOAuth {
    client: reqwest::Client,
    store: CredentialStore,
    settings: CopilotConfig,
}

impl GitHubOAuth {
    pub fn new(client: reqwest::Client, store: CredentialStore, settings: CopilotConfig) -> Self {
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
            config.github_copilot.clone(),
        ))
    }

    /// Request a device/user code pair
    pub async fn start_device_flow(&self) -> Result<DeviceFlowSession> {
        let res = self
            .client
            .post(&self.settings.device_code_url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.settings.user_agent)
            .json(&DeviceCodeRequest {
                client_id: &self.settings.client_id,
                scope: &self.settings.scope,
            })
            .send()
            .await
            .inspect_err(|_| METRICS.record_oauth_request("github_device_code", "transport_error"))?;

        if !res.status().is_success() {
            METRICS.record_oauth_request("github_device_code", "http_error");
            return Err(AuthError::from_response("github_device_code", res).await);
        }

        METRICS.record_oauth_request("github_device_code", "success");
        let session: DeviceFlowSession = res.json().await?;
        debug!(
            verification_uri = %session.verification_uri,
            interval = session.interval,
            expires_in = session.expires_in,
            "device flow started"
        );
        Ok(session)
    }

    /// Poll the access-token endpoint once. Call again after the session's
    /// interval while the result is `Pending` or `SlowDown`.
    pub async fn poll_once(&self, device_code: &str) -> PollStatus {
        let res = match self
            .client
            .post(&self.settings.access_token_url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.settings.user_agent)
            .json(&PollRequest {
                client_id: &self.settings.client_id,
                device_code,
                grant_type: DEVICE_GRANT_TYPE,
            })
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                METRICS.record_oauth_request("github_access_token", "transport_error");
                return PollStatus::Failed(e.to_string());
            }
        };

        if !res.status().is_success() {
            METRICS.record_oauth_request("github_access_token", "http_error");
            return PollStatus::Failed(format!("access token endpoint returned {}", res.status()));
        }
        METRICS.record_oauth_request("github_access_token", "success");

        let body: PollResponse = match res.json().await {
            Ok(body) => body,
            Err(e) => return PollStatus::Failed(format!("unreadable poll response: {e}")),
        };

        if let Some(github_token) = body.access_token.filter(|t| !t.is_empty()) {
            let tokens = CopilotTokens::from_github_token(github_token);
            return match self.store.set(PROVIDER.as_str(), &tokens.into()) {
                Ok(()) => {
                    info!("github device authorization complete");
                    PollStatus::Complete
                }
                Err(e) => PollStatus::Failed(format!("could not store credential: {e}")),
            };
        }

        match body.error.as_deref() {
            None | Some("authorization_pending") => PollStatus::Pending,
            Some("slow_down") => PollStatus::SlowDown,
            Some(other) => PollStatus::Failed(other.to_string()),
        }
    }

    /// Trade the GitHub token for a short-lived Copilot API token
    pub async fn fetch_copilot_token(&self, github_token: &str) -> Result<(String, u64)> {
        let res = self
            .client
            .get(&self.settings.api_token_url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", github_token))
            .header("User-Agent", &self.settings.user_agent)
            .header("Editor-Version", &self.settings.editor_version)
            .header("Editor-Plugin-Version", &self.settings.editor_plugin_version)
            .send()
            .await
            .inspect_err(|_| METRICS.record_oauth_request("copilot_api_token", "transport_error"))?;

        if !res.status().is_success() {
            METRICS.record_oauth_request("copilot_api_token", "http_error");
            return Err(AuthError::from_response("copilot_api_token", res).await);
        }

        METRICS.record_oauth_request("copilot_api_token", "success");
        let copilot_response: CopilotTokenResponse = res.json().await?;
        Ok((copilot_response.token, copilot_response.expires_at))
    }

    /// Currently valid Copilot API token, minting a new one when stale.
    pub async fn get_api_token(&self) -> Option<String> {
        let Some(tokens) = self
            .store
            .get(PROVIDER.as_str())
            .and_then(|record| CopilotTokens::from_record(&record))
        else {
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        };

        if tokens.is_fresh_at(now_millis()) {
            debug!("using cached copilot api token");
            METRICS.record_token_request(PROVIDER.as_str(), "cache_hit");
            return Some(tokens.api_token);
        }

        if tokens.github_token.is_empty() {
            warn!("copilot credential has no github token, login required");
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        }

        let (api_token, expires_at) = match self.fetch_copilot_token(&tokens.github_token).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "copilot token exchange failed");
                METRICS.record_token_request(PROVIDER.as_str(), "absent");
                return None;
            }
        };

        let updated = CopilotTokens {
            github_token: tokens.github_token,
            api_token: api_token.clone(),
            expires_at_ms: expires_at.saturating_mul(1000),
        };
        if let Err(e) = self.store.set(PROVIDER.as_str(), &updated.into()) {
            warn!(error = %e, "failed to persist copilot api token");
            METRICS.record_token_request(PROVIDER.as_str(), "absent");
            return None;
        }

        info!("obtained new copilot api token");
        METRICS.record_token_request(PROVIDER.as_str(), "refreshed");
        Some(api_token)
    }
}

#[async_trait]
impl TokenSource for GitHubOAuth {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn access_token(&self) -> Option<String> {
        self.get_api_token().await
    }

    fn status(&self) -> CredentialStatus {
        match self
            .store
            .get(PROVIDER.as_str())
            .and_then(|record| CopilotTokens::from_record(&record))
        {
            None => CredentialStatus::NotAuthenticated,
            Some(tokens) if tokens.is_fresh_at(now_millis()) => CredentialStatus::Valid {
                expires_at_ms: tokens.expires_at_ms,
            },
            Some(_) => CredentialStatus::Expired,
        }
    }
}
