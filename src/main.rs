/// zen-auth: log in to AI providers and hand out valid bearer tokens
/// Usage:
///   zen-auth login [anthropic|github-copilot]
///   zen-auth token <provider>
///   zen-auth status
///   zen-auth logout [provider]
///   zen-auth --metrics <command>   (Prometheus counters on stderr afterwards)
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zen_auth::{
    auth::CredentialStatus,
    login::{self, DeviceLoginOutcome},
    metrics::METRICS,
    AnthropicOAuth, Config, GitHubOAuth, Provider, TokenManager,
};

#[derive(Parser)]
#[command(name = "zen-auth", version, about = "Manage OAuth credentials for AI providers")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "ZEN_AUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Print this run's Prometheus counters to stderr when the command ends
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in to a provider (prompts for one when omitted)
    Login { provider: Option<String> },
    /// Print a valid access token, refreshing it if needed
    Token { provider: String },
    /// Show stored credential status
    Status,
    /// Remove stored credentials (all providers when omitted)
    Logout { provider: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let result = run(cli.command, &config).await;
    if cli.metrics {
        eprint!("{}", METRICS.render());
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Login { provider } => {
            let provider = match provider {
                Some(name) => name.parse::<Provider>()?,
                None => select_provider()?,
            };
            match provider {
                Provider::Anthropic => login_anthropic(config).await,
                Provider::GithubCopilot => login_copilot(config).await,
            }
        }

        Command::Token { provider } => {
            let provider = provider.parse::<Provider>()?;
            let manager = TokenManager::from_config(config)?;
            match manager.token_for(provider).await {
                Some(token) => {
                    println!("{token}");
                    Ok(())
                }
                None => anyhow::bail!(
                    "No valid {} credential. Run: zen-auth login {}",
                    provider.display_name(),
                    provider
                ),
            }
        }

        Command::Status => {
            let manager = TokenManager::from_config(config)?;
            println!("\n🔐 Authentication Status");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

            for (provider, status) in manager.status() {
                match status {
                    CredentialStatus::Valid { expires_at_ms } => {
                        println!(
                            "✅ {}: authenticated ({} remaining)",
                            provider.display_name(),
                            remaining(expires_at_ms)
                        );
                    }
                    CredentialStatus::Expired => {
                        println!("⚠️  {}: expired (will auto-refresh)", provider.display_name());
                    }
                    CredentialStatus::NotAuthenticated => {
                        println!("❌ {}: not authenticated", provider.display_name());
                    }
                }
            }
            println!("\n   Store: {}\n", config.storage.store_path().display());
            Ok(())
        }

        Command::Logout { provider } => {
            let manager = TokenManager::from_config(config)?;
            let providers = match provider {
                Some(name) => vec![name.parse::<Provider>()?],
                None => Provider::ALL.to_vec(),
            };
            for provider in providers {
                if manager.logout(provider)? {
                    println!("✅ Removed {} credentials", provider.display_name());
                } else {
                    println!("   No {} credentials stored", provider.display_name());
                }
            }
            Ok(())
        }
    }
}

fn remaining(expires_at_ms: u64) -> String {
    let Some(expires) = chrono::DateTime::from_timestamp_millis(expires_at_ms as i64) else {
        return "unknown".to_string();
    };
    let remaining = expires - chrono::Utc::now();
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes();

    if hours > 0 {
        format!("{} hours", hours)
    } else if minutes > 0 {
        format!("{} minutes", minutes)
    } else {
        format!("{} seconds", remaining.num_seconds().max(0))
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn select_provider() -> Result<Provider> {
    println!("\nSelect provider:");
    for (i, provider) in Provider::ALL.iter().enumerate() {
        println!("  {}. {}", i + 1, provider.display_name());
    }

    let selection = prompt("Provider: ")?;
    let provider = selection
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| Provider::ALL.get(i).copied());

    match provider {
        Some(provider) => Ok(provider),
        None => selection
            .parse::<Provider>()
            .with_context(|| format!("Invalid selection: {selection}")),
    }
}

async fn login_anthropic(config: &Config) -> Result<()> {
    println!("\n🔐 Anthropic OAuth");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let oauth = AnthropicOAuth::from_config(config)?;
    let (auth_url, verifier) = oauth.build_auth_url()?;

    println!("\n📱 Open the following URL in your browser and authorize:\n");
    println!("   {}\n", auth_url);
    let _ = opener::open(&auth_url);

    println!("Steps:");
    println!("  1. Log in with your Claude account");
    println!("  2. Click \"Authorize\" to grant access");
    println!("  3. Copy the authorization code (format: code#state)\n");

    let input = prompt("📋 Paste authorization code: ")?;
    let (code, state) = login::parse_code_input(&input)?;

    print!("\n⏳ Exchanging code for tokens...");
    io::stdout().flush()?;

    oauth
        .exchange_code(&code, &state, &verifier)
        .await
        .context("Authorization failed")?;

    println!(" ✓\n");
    println!("✅ Anthropic credentials saved");
    Ok(())
}

async fn login_copilot(config: &Config) -> Result<()> {
    println!("\n🔐 GitHub Copilot OAuth");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let oauth = GitHubOAuth::from_config(config)?;
    let session = oauth
        .start_device_flow()
        .await
        .context("Failed to start device flow")?;

    println!("\nSteps:");
    println!("  1. Visit: {}", session.verification_uri);
    println!("  2. Enter code: {}", session.user_code);
    println!("  3. Authorize the application\n");
    let _ = opener::open(&session.verification_uri);

    print!("⏳ Waiting for authorization...");
    io::stdout().flush()?;

    let cancel = login::cancel_on_signal(tokio::signal::ctrl_c());
    let outcome = login::wait_for_device_authorization(&oauth, &session, cancel).await;

    if outcome != DeviceLoginOutcome::Complete {
        println!();
        anyhow::bail!(outcome.describe());
    }
    println!(" ✓\n");

    print!("⏳ Obtaining Copilot token...");
    io::stdout().flush()?;
    match oauth.get_api_token().await {
        Some(_) => {
            println!(" ✓\n");
            println!("✅ GitHub Copilot credentials saved");
            Ok(())
        }
        None => {
            println!();
            anyhow::bail!("GitHub login stored, but no Copilot API token could be obtained")
        }
    }
}
