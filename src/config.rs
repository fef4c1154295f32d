use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Data directory shared with the MCP server that consumes these credentials.
const APP_NAME: &str = "zen-mcp-server";
const STORE_FILE: &str = "auth.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub github_copilot: CopilotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `auth.json`; defaults to `~/.local/share/zen-mcp-server`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_store_file")]
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_client_id")]
    pub client_id: String,
    #[serde(default = "default_anthropic_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_anthropic_token_url")]
    pub token_url: String,
    #[serde(default = "default_anthropic_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_anthropic_scope")]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopilotConfig {
    #[serde(default = "default_copilot_client_id")]
    pub client_id: String,
    #[serde(default = "default_device_code_url")]
    pub device_code_url: String,
    #[serde(default = "default_access_token_url")]
    pub access_token_url: String,
    #[serde(default = "default_api_token_url")]
    pub api_token_url: String,
    #[serde(default = "default_copilot_scope")]
    pub scope: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_editor_version")]
    pub editor_version: String,
    #[serde(default = "default_editor_plugin_version")]
    pub editor_plugin_version: String,
}

// Defaults
fn default_store_file() -> String { STORE_FILE.to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_log_level() -> String { "warn".to_string() }
fn default_anthropic_client_id() -> String { "c4aa5311-7756-40f1-aa81-b2c43ff8869e".to_string() }
fn default_anthropic_authorize_url() -> String { "https://claude.ai/oauth/authorize".to_string() }
fn default_anthropic_token_url() -> String { "https://console.anthropic.com/v1/oauth/token".to_string() }
fn default_anthropic_redirect_uri() -> String { "https://console.anthropic.com/oauth/code/callback".to_string() }
fn default_anthropic_scope() -> String { "org:create_api_key user:profile user:inference".to_string() }
fn default_copilot_client_id() -> String { "d8e2041f4ccf400ab4d8".to_string() }
fn default_device_code_url() -> String { "https://github.com/login/device/code".to_string() }
fn default_access_token_url() -> String { "https://github.com/login/oauth/access_token".to_string() }
fn default_api_token_url() -> String { "https://api.github.com/copilot_internal/v2/token".to_string() }
fn default_copilot_scope() -> String { "read:user".to_string() }
fn default_user_agent() -> String { "GitHubCopilotChat/0.26.7".to_string() }
fn default_editor_version() -> String { "vscode/1.99.3".to_string() }
fn default_editor_plugin_version() -> String { "copilot-chat/0.26.7".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: default_store_file(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            client_id: default_anthropic_client_id(),
            authorize_url: default_anthropic_authorize_url(),
            token_url: default_anthropic_token_url(),
            redirect_uri: default_anthropic_redirect_uri(),
            scope: default_anthropic_scope(),
        }
    }
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            client_id: default_copilot_client_id(),
            device_code_url: default_device_code_url(),
            access_token_url: default_access_token_url(),
            api_token_url: default_api_token_url(),
            scope: default_copilot_scope(),
            user_agent: default_user_agent(),
            editor_version: default_editor_version(),
            editor_plugin_version: default_editor_plugin_version(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Shared HTTP client with the configured request timeout
    pub fn build_client(&self) -> crate::error::Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout()).build()?)
    }
}

impl StorageConfig {
    /// Full path of the credential file
    pub fn store_path(&self) -> PathBuf {
        let dir = self.data_dir.clone().unwrap_or_else(default_data_dir);
        dir.join(&self.file_name)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join(APP_NAME)
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// A missing config file is not an error; every setting has a default.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config_path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| env::var("ZEN_AUTH_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(default_config_path);

        let mut config = if config_path.exists() {
            #[cfg(unix)]
            Self::validate_file_permissions(&config_path)?;

            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            Self::parse(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            if explicit_path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML content after `${VAR}` substitution
    pub fn parse(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("ZEN_AUTH_DATA_DIR") {
            if !dir.is_empty() {
                self.storage.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(client_id) = env::var("GITHUB_COPILOT_CLIENT_ID") {
            if !client_id.is_empty() {
                self.github_copilot.client_id = client_id;
            }
        }
    }

    /// Substitute ${VAR_NAME} with environment variable values
    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        while let Some(start) = result.find("${") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let value = env::var(var_name).unwrap_or_default();
                result.replace_range(start..start + end + 1, &value);
            } else {
                break;
            }
        }

        result
    }

    /// Config files may carry client ids and endpoints; refuse world-writable ones
    #[cfg(unix)]
    fn validate_file_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read metadata for config file: {}", path.display()))?;
        let mode = metadata.permissions().mode();

        if mode & 0o022 != 0 {
            anyhow::bail!(
                "Config file {} is writable by group or others (mode: {:o}). Run: chmod 600 {}",
                path.display(),
                mode & 0o777,
                path.display()
            );
        }

        if mode & 0o044 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "config file is readable by other users"
            );
        }

        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("zen-auth")
        .join("config.toml")
}
