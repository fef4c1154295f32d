pub mod auth;
pub mod config;
pub mod error;
pub mod login;
pub mod metrics;
pub mod types;

// Re-export commonly used types
pub use auth::{AnthropicOAuth, CredentialStore, GitHubOAuth, TokenManager};
pub use config::Config;
pub use error::{AuthError, Result};
pub use types::{CredentialRecord, Provider};
