use std::time::Duration;

/// Delay before the one extra refresh that follows every send.
pub const DEFAULT_POST_SEND_REFRESH: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:3000`
    pub base_url: String,
    /// Bearer token from `/auth/login`
    pub token: String,
    pub post_send_refresh: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            post_send_refresh: DEFAULT_POST_SEND_REFRESH,
        }
    }

    pub fn with_post_send_refresh(mut self, delay: Duration) -> Self {
        self.post_send_refresh = delay;
        self
    }

    /// `TANDEM_URL`, `TANDEM_TOKEN` and optionally `TANDEM_REFRESH_MS`.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("TANDEM_URL").ok()?;
        let token = std::env::var("TANDEM_TOKEN").ok()?;
        let mut config = Self::new(base_url, token);
        if let Some(ms) = std::env::var("TANDEM_REFRESH_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.post_send_refresh = Duration::from_millis(ms);
        }
        Some(config)
    }
}
