//! HypeStock Client - Dashboard Data Core
//!
//! This library implements the data side of the HypeStock market dashboard:
//! - Connection lifecycle for the realtime backend socket: startup handshake,
//!   reconnect with escalating backoff, degraded-ready fallback
//! - Request correlation resolving every issued request exactly once
//! - Paginated, searchable stock-list fetching with single-flight locking
//! - Per-symbol detail caching keyed by range and indicator, served over the
//!   HTTP fallback channel
//! - Analyst chat with seed-matched replies
pub mod cache;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod detail;
pub mod error;
pub mod orchestrator;
pub mod pagination;
pub mod protocol;
pub mod rest;
pub mod types;

use std::sync::Arc;

// Re-export commonly used types for convenience
pub use cache::{SelectionEpoch, SymbolCache};
pub use config::ClientConfig;
pub use connection::{
    ConnectionHandle, ConnectionManager, ConnectionState, Notice, NoticeLevel, Readiness,
};
pub use correlator::{CorrelationKey, PendingResponse, RequestCorrelator};
pub use detail::{DetailView, SymbolDetail};
pub use error::ClientError;
pub use orchestrator::{EmptyKind, FetchOrchestrator, StockListUpdate};
pub use pagination::{PageFetch, PaginationController};
pub use protocol::{ChatReply, ChatRequest, ChatSeed, ClientFrame, RequestId, ServerFrame};
pub use rest::{DetailSource, RestClient};
pub use types::{
    ChatModel, IndicatorKind, IndicatorPoint, MAX_CHART_POINTS, Prediction, PredictionFeature,
    PricePoint, RangeToken, StockListItem, StockSummary, Symbol, SummaryMetrics, TrendLabel,
    decimate,
};

/// One-stop dashboard client wiring the connection, the list orchestrator and
/// the symbol-detail layer together.
#[derive(Clone)]
pub struct DashboardClient {
    connection: ConnectionHandle,
    orchestrator: FetchOrchestrator,
    detail: SymbolDetail,
    config: ClientConfig,
}

impl DashboardClient {
    /// Connect to the backend described by `config` and assemble the client.
    ///
    /// The connection is established in the background; callers typically await
    /// [`DashboardClient::ready`] before the first fetch.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let (connection, inbound_rx) = ConnectionManager::connect(&config)?;
        let orchestrator =
            FetchOrchestrator::start(connection.clone(), inbound_rx, config.clone());
        let source = Arc::new(RestClient::new(&config)?);
        let detail = SymbolDetail::new(source, config.range_debounce);

        Ok(Self {
            connection,
            orchestrator,
            detail,
            config,
        })
    }

    /// Wait out the startup grace period.
    ///
    /// Returns [`Readiness::Degraded`] instead of failing when the handshake
    /// never answers; the dashboard opens either way.
    pub async fn ready(&self) -> Readiness {
        self.connection.await_ready(self.config.ready_grace).await
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub fn detail(&self) -> &SymbolDetail {
        &self.detail
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
