use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Providers this crate can log in to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    GithubCopilot,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Anthropic, Provider::GithubCopilot];

    /// Key under which the provider's credential is stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::GithubCopilot => "github-copilot",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::GithubCopilot => "GitHub Copilot",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "anthropic_max" | "claude" => Ok(Provider::Anthropic),
            "github-copilot" | "github_copilot" | "copilot" | "github" => {
                Ok(Provider::GithubCopilot)
            }
            _ => Err(AuthError::UnknownProvider(s.to_string())),
        }
    }
}

/// A persisted credential, tagged by `type` on disk.
///
/// Anything that does not decode into one of these variants is treated as
/// an absent credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialRecord {
    Oauth(OAuthCredential),
}

/// Wire shape shared by both providers: `refresh`, `access`, `expires` (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredential {
    pub refresh: String,
    pub access: String,
    pub expires: u64,
}

impl OAuthCredential {
    /// An access token is usable only when present and expiring strictly after `now_ms`.
    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        !self.access.is_empty() && self.expires > now_ms
    }
}

/// Anthropic's view of a stored record: a classic OAuth token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicTokens {
    pub refresh_token: String,
    pub access_token: String,
    pub expires_at_ms: u64,
}

impl AnthropicTokens {
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        match record {
            CredentialRecord::Oauth(cred) => Some(Self {
                refresh_token: cred.refresh.clone(),
                access_token: cred.access.clone(),
                expires_at_ms: cred.expires,
            }),
        }
    }

    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        !self.access_token.is_empty() && self.expires_at_ms > now_ms
    }
}

impl From<AnthropicTokens> for CredentialRecord {
    fn from(tokens: AnthropicTokens) -> Self {
        CredentialRecord::Oauth(OAuthCredential {
            refresh: tokens.refresh_token,
            access: tokens.access_token,
            expires: tokens.expires_at_ms,
        })
    }
}

/// GitHub Copilot's view of a stored record.
///
/// `github_token` is the long-lived device-flow token (stored in the `refresh`
/// field on disk); `api_token` is the short-lived Copilot token minted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopilotTokens {
    pub github_token: String,
    pub api_token: String,
    pub expires_at_ms: u64,
}

impl CopilotTokens {
    /// Fresh device-flow grant with no Copilot token minted yet.
    pub fn from_github_token(github_token: String) -> Self {
        Self {
            github_token,
            api_token: String::new(),
            expires_at_ms: 0,
        }
    }

    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        match record {
            CredentialRecord::Oauth(cred) => Some(Self {
                github_token: cred.refresh.clone(),
                api_token: cred.access.clone(),
                expires_at_ms: cred.expires,
            }),
        }
    }

    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        !self.api_token.is_empty() && self.expires_at_ms > now_ms
    }
}

impl From<CopilotTokens> for CredentialRecord {
    fn from(tokens: CopilotTokens) -> Self {
        CredentialRecord::Oauth(OAuthCredential {
            refresh: tokens.github_token,
            access: tokens.api_token,
            expires: tokens.expires_at_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_on_disk_field_names() {
        let record: CredentialRecord = AnthropicTokens {
            refresh_token: "R".into(),
            access_token: "A".into(),
            expires_at_ms: 42,
        }
        .into();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "oauth", "refresh": "R", "access": "A", "expires": 42})
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type": "api", "refresh": "R", "access": "A", "expires": 1}"#;
        assert!(serde_json::from_str::<CredentialRecord>(json).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let json = r#"{"type": "oauth", "access": "A", "expires": 1}"#;
        assert!(serde_json::from_str::<CredentialRecord>(json).is_err());
    }

    #[test]
    fn expiry_is_strict() {
        let cred = OAuthCredential {
            refresh: "R".into(),
            access: "A".into(),
            expires: 1_000,
        };
        assert!(cred.is_fresh_at(999));
        assert!(!cred.is_fresh_at(1_000));
        assert!(!cred.is_fresh_at(1_001));
    }

    #[test]
    fn empty_access_token_is_never_fresh() {
        let tokens = CopilotTokens::from_github_token("gho_x".into());
        assert!(!tokens.is_fresh_at(0));
        assert_eq!(tokens.expires_at_ms, 0);
    }

    #[test]
    fn copilot_view_reads_github_token_from_refresh_field() {
        let record = CredentialRecord::Oauth(OAuthCredential {
            refresh: "gho_long_lived".into(),
            access: "tid=short".into(),
            expires: 5,
        });
        let view = CopilotTokens::from_record(&record).unwrap();
        assert_eq!(view.github_token, "gho_long_lived");
        assert_eq!(view.api_token, "tid=short");
    }

    #[test]
    fn provider_parsing_accepts_aliases() {
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!(
            "github-copilot".parse::<Provider>().unwrap(),
            Provider::GithubCopilot
        );
        assert_eq!("copilot".parse::<Provider>().unwrap(), Provider::GithubCopilot);
        assert!(matches!(
            "nonexistent".parse::<Provider>(),
            Err(AuthError::UnknownProvider(_))
        ));
    }
}
