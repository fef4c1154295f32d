// OAuth credential flows and the file-backed store they share

pub mod anthropic_oauth;
pub mod github_oauth;
pub mod pkce;
pub mod store;
pub mod token_manager;

pub use anthropic_oauth::AnthropicOAuth;
pub use github_oauth::{DeviceFlowSession, GitHubOAuth, PollStatus};
pub use pkce::Pkce;
pub use store::CredentialStore;
pub use token_manager::{CredentialStatus, TokenManager, TokenSource};
