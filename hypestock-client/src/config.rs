use std::time::Duration;

/// Dashboard client configuration.
///
/// Carries every timing constant the orchestration layer depends on so tests can
/// shrink the windows instead of waiting out production values.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Live event-channel endpoint.
    pub ws_url: String,
    /// Base URL for the request/response fallback channel.
    pub rest_url: String,
    /// Per-attempt transport connect timeout.
    pub connect_timeout: Duration,
    /// Consecutive failed connect attempts tolerated before parking in Disconnected.
    pub reconnect_attempts: u32,
    /// Grace window before readiness falls open into the degraded state.
    pub ready_grace: Duration,
    /// Pending-request timeout for list fetches.
    pub list_timeout: Duration,
    /// Pending-request timeout for chat messages.
    pub chat_timeout: Duration,
    /// Settle time for search input before a fetch is issued.
    pub search_debounce: Duration,
    /// Settle time for detail range changes before a fetch is issued.
    pub range_debounce: Duration,
    /// Page size requested from the list endpoint.
    pub page_size: u32,
    /// Buffer size for the inbound frame channel.
    pub channel_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/ws".to_string(),
            rest_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(3),
            reconnect_attempts: 3,
            ready_grace: Duration::from_secs(5),
            list_timeout: Duration::from_secs(8),
            chat_timeout: Duration::from_secs(15),
            search_debounce: Duration::from_millis(300),
            range_debounce: Duration::from_millis(300),
            page_size: 24,
            channel_buffer_size: 256,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with a custom event-channel URL.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }

    /// Set the fallback-channel base URL.
    pub fn with_rest_url(mut self, rest_url: impl Into<String>) -> Self {
        self.rest_url = rest_url.into();
        self
    }

    /// Set the per-attempt transport connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the failed connect attempt budget.
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the readiness grace window.
    pub fn with_ready_grace(mut self, grace: Duration) -> Self {
        self.ready_grace = grace;
        self
    }

    /// Set the list fetch timeout.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Set the chat response timeout.
    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Set the search input settle time.
    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce = debounce;
        self
    }

    /// Set the range change settle time.
    pub fn with_range_debounce(mut self, debounce: Duration) -> Self {
        self.range_debounce = debounce;
        self
    }

    /// Set the list page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the inbound frame channel buffer size.
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("ws://localhost:9100/ws")
            .with_rest_url("http://localhost:9100")
            .with_connect_timeout(Duration::from_millis(500))
            .with_reconnect_attempts(1)
            .with_ready_grace(Duration::from_secs(1))
            .with_list_timeout(Duration::from_secs(2))
            .with_chat_timeout(Duration::from_secs(4))
            .with_search_debounce(Duration::from_millis(20))
            .with_range_debounce(Duration::from_millis(25))
            .with_page_size(10)
            .with_channel_buffer_size(32);

        assert_eq!(config.ws_url, "ws://localhost:9100/ws");
        assert_eq!(config.rest_url, "http://localhost:9100");
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.reconnect_attempts, 1);
        assert_eq!(config.ready_grace, Duration::from_secs(1));
        assert_eq!(config.list_timeout, Duration::from_secs(2));
        assert_eq!(config.chat_timeout, Duration::from_secs(4));
        assert_eq!(config.search_debounce, Duration::from_millis(20));
        assert_eq!(config.range_debounce, Duration::from_millis(25));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.channel_buffer_size, 32);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.ready_grace, Duration::from_secs(5));
        assert_eq!(config.list_timeout, Duration::from_secs(8));
        assert_eq!(config.chat_timeout, Duration::from_secs(15));
        assert_eq!(config.search_debounce, Duration::from_millis(300));
        assert_eq!(config.page_size, 24);
    }
}
