//! Login drivers shared by the CLI: pasted-code parsing for the PKCE flow and
//! the polling loop for the device flow. The flows themselves never sleep.

use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::github_oauth::SLOW_DOWN_INCREMENT;
use crate::auth::{DeviceFlowSession, GitHubOAuth, PollStatus};
use crate::error::{AuthError, Result};

/// Terminal result of a device login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLoginOutcome {
    Complete,
    Failed(String),
    /// The session's `expires_in` budget ran out
    TimedOut,
    Cancelled,
}

impl DeviceLoginOutcome {
    pub fn describe(&self) -> String {
        match self {
            DeviceLoginOutcome::Complete => "GitHub authorization complete".to_string(),
            DeviceLoginOutcome::Failed(reason) => format!("Authorization failed: {reason}"),
            DeviceLoginOutcome::TimedOut => "Authorization timed out".to_string(),
            DeviceLoginOutcome::Cancelled => "Authorization cancelled".to_string(),
        }
    }
}

/// Split the value pasted after the Anthropic redirect, `code#state` (or `code|state`).
pub fn parse_code_input(input: &str) -> Result<(String, String)> {
    let input = input.trim();
    let (code, state) = input
        .split_once('#')
        .or_else(|| input.split_once('|'))
        .ok_or(AuthError::InvalidCodeFormat)?;

    if code.is_empty() || state.is_empty() {
        return Err(AuthError::InvalidCodeFormat);
    }
    Ok((code.to_string(), state.to_string()))
}

/// Cancellation future for `wait_for_device_authorization` driven by a
/// signal listener such as `tokio::signal::ctrl_c()`. A listener that fails to
/// register never fires, so the login still ends by completion or timeout.
pub async fn cancel_on_signal<S>(signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "cannot listen for Ctrl-C, login can only end by timeout");
        std::future::pending::<()>().await;
    }
}

/// Poll until the user authorizes, the session expires, or `cancel` resolves.
///
/// Waits the session interval between polls and adds 5 s on every
/// `slow_down`. Cancellation is only observed between HTTP calls and sleeps,
/// so the credential file is never left half-written.
pub async fn wait_for_device_authorization<C>(
    oauth: &GitHubOAuth,
    session: &DeviceFlowSession,
    cancel: C,
) -> DeviceLoginOutcome
where
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let deadline = session.deadline();
    let mut interval = session.poll_interval();
    let mut attempts = 0u32;

    loop {
        if Instant::now() >= deadline {
            debug!(attempts, "device flow expired");
            return DeviceLoginOutcome::TimedOut;
        }

        attempts += 1;
        let status = tokio::select! {
            biased;
            _ = &mut cancel => return DeviceLoginOutcome::Cancelled,
            status = oauth.poll_once(&session.device_code) => status,
        };

        match status {
            PollStatus::Complete => return DeviceLoginOutcome::Complete,
            PollStatus::Failed(reason) => return DeviceLoginOutcome::Failed(reason),
            PollStatus::SlowDown => {
                interval += SLOW_DOWN_INCREMENT;
                debug!(interval_secs = interval.as_secs(), "provider asked to slow down");
            }
            PollStatus::Pending => {}
        }

        let wait = interval.min(deadline.saturating_duration_since(Instant::now()));
        tokio::select! {
            biased;
            _ = &mut cancel => return DeviceLoginOutcome::Cancelled,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
