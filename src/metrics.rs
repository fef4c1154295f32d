use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Process-wide counters for credential lookups and OAuth traffic
pub struct Metrics {
    pub registry: Registry,

    // outcome: cache_hit, refreshed, absent
    pub token_requests_total: CounterVec,

    // result: success, http_error, transport_error
    pub oauth_requests_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let token_requests_total = CounterVec::new(
            Opts::new(
                "zen_auth_token_requests_total",
                "Access token lookups by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        let oauth_requests_total = CounterVec::new(
            Opts::new(
                "zen_auth_oauth_requests_total",
                "HTTP calls to provider OAuth endpoints",
            ),
            &["endpoint", "result"],
        )?;

        registry.register(Box::new(token_requests_total.clone()))?;
        registry.register(Box::new(oauth_requests_total.clone()))?;

        Ok(Self {
            registry,
            token_requests_total,
            oauth_requests_total,
        })
    }

    pub fn record_token_request(&self, provider: &str, outcome: &str) {
        self.token_requests_total
            .with_label_values(&[provider, outcome])
            .inc();
    }

    pub fn record_oauth_request(&self, endpoint: &str, result: &str) {
        self.oauth_requests_total
            .with_label_values(&[endpoint, result])
            .inc();
    }

    /// Prometheus text exposition of everything registered
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::default()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_output() {
        let metrics = Metrics::new().unwrap();
        metrics.record_token_request("anthropic", "cache_hit");
        metrics.record_token_request("anthropic", "cache_hit");
        metrics.record_oauth_request("anthropic_token", "success");

        assert_eq!(
            metrics
                .token_requests_total
                .with_label_values(&["anthropic", "cache_hit"])
                .get(),
            2.0
        );

        let text = metrics.render();
        assert!(text.contains("zen_auth_token_requests_total"));
        assert!(text.contains("endpoint=\"anthropic_token\""));
    }
}
