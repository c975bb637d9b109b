//! HypeStock Server - Mock Market Backend
//!
//! Serves the dashboard client a deterministic 150-stock universe:
//! - A realtime WebSocket endpoint answering startup, stock-page and chat
//!   frames on the shared wire contract
//! - REST fallback endpoints for per-symbol summary, price, indicator and
//!   prediction data
//! - A synthetic price engine producing reproducible OHLCV series, moving
//!   averages, RSI/MACD and trend calls per symbol
pub mod dataset;
pub mod engine;
pub mod routes;

pub use dataset::{CATALOG_SIZE, Catalog};
pub use engine::Candle;
pub use routes::{AppState, router};
