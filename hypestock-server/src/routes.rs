use crate::dataset::Catalog;
use crate::engine::{self, Candle};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use fnv::FnvHashMap;
use futures_util::{SinkExt, StreamExt};
use hypestock_client::protocol::{
    ChatReply, ChatRequest, ClientFrame, ErrorMessage, MessageKind, ServerFrame, StartupResponse,
    StockPageRequest,
};
use hypestock_client::types::{
    IndicatorKind, IndicatorPoint, Prediction, PricePoint, RangeToken, StockListItem,
    StockSummary, Symbol,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pause before answering the startup handshake, covering backend warmup.
const STARTUP_DELAY: Duration = Duration::from_millis(200);

/// Pause before answering a chat question, standing in for model latency.
const CHAT_DELAY: Duration = Duration::from_millis(150);

/// Substrings that route a chat question to the data-analysis reply.
const ANALYSIS_KEYWORDS: [&str; 9] = [
    "average",
    "max",
    "min",
    "plot",
    "compare",
    "correlation",
    "trend",
    "price",
    "stock",
];

/// Shared handler state: the catalogue plus lazily generated price series.
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Catalog>,
    series: Arc<RwLock<FnvHashMap<Symbol, Arc<Vec<Candle>>>>>,
    startup_delay: Duration,
    chat_delay: Duration,
    started_at: Instant,
}

impl AppState {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            series: Arc::new(RwLock::new(FnvHashMap::default())),
            startup_delay: STARTUP_DELAY,
            chat_delay: CHAT_DELAY,
            started_at: Instant::now(),
        }
    }

    pub fn with_startup_delay(self, startup_delay: Duration) -> Self {
        Self {
            startup_delay,
            ..self
        }
    }

    pub fn with_chat_delay(self, chat_delay: Duration) -> Self {
        Self { chat_delay, ..self }
    }

    /// Candles for `listing`, generated on first use and memoized.
    fn series_for(&self, listing: &StockListItem) -> Arc<Vec<Candle>> {
        if let Some(series) = self.series.read().get(&listing.stock_code) {
            return Arc::clone(series);
        }

        let computed = Arc::new(engine::price_series(
            &listing.stock_code,
            listing.trading_days,
        ));
        Arc::clone(
            self.series
                .write()
                .entry(listing.stock_code.clone())
                .or_insert(computed),
        )
    }

    fn lookup(&self, symbol: &str) -> Result<StockListItem, StatusCode> {
        self.catalog.get(&Symbol::from(symbol)).cloned().ok_or_else(|| {
            warn!("request for unknown symbol: {}", symbol);
            StatusCode::NOT_FOUND
        })
    }
}

/// Assemble the application router: the realtime socket plus the REST
/// fallback endpoints the dashboard polls per symbol.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/stock/{symbol}/summary", get(summary_handler))
        .route("/stock/{symbol}/price", get(price_handler))
        .route("/stock/{symbol}/indicator", get(indicator_handler))
        .route("/stock/{symbol}/prediction", get(prediction_handler))
        .with_state(state)
}

async fn index_handler() -> &'static str {
    "HypeStock backend running"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection session loop.
///
/// Frames are answered concurrently so a slow chat reply never holds up list
/// pages on the same socket. A writer task owns the sink; handlers feed it
/// through a channel and the session ends when the peer closes or errors.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("websocket client connected");
    let (mut sink, mut source) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match frame.encode() {
                Ok(text) => text,
                Err(error) => {
                    error!("failed to encode outbound frame: {}", error);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                debug!("websocket receive error: {}", error);
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => match ClientFrame::decode(&text) {
                Ok(frame) => {
                    let state = state.clone();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let response = handle_frame(state, frame).await;
                        let _ = out_tx.send(response).await;
                    });
                }
                Err(error) => debug!("ignoring undecodable frame: {}", error),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(out_tx);
    let _ = writer.await;
    info!("websocket client disconnected");
}

/// Answer a single decoded frame.
async fn handle_frame(state: AppState, frame: ClientFrame) -> ServerFrame {
    match frame {
        ClientFrame::Startup(request) => {
            debug!("startup handshake received: {}", request.request_id);
            sleep(state.startup_delay).await;
            ServerFrame::StartupResponse(StartupResponse {
                status: "ready".to_string(),
                server_time: state.started_at.elapsed().as_secs_f64(),
            })
        }
        ClientFrame::RequestStocks(request) => {
            let StockPageRequest {
                request_id,
                page,
                limit,
                query,
            } = request;
            let mut reply = state.catalog.page(page, limit, &query);
            reply.request_id = Some(request_id);
            ServerFrame::StockData(reply)
        }
        ClientFrame::Ai(request) => {
            info!(
                "chat request received (seed: {}, model: {})",
                request.seed, request.model
            );
            if request.content.is_empty() {
                return ServerFrame::Error(ErrorMessage {
                    message: "No content provided".to_string(),
                });
            }

            sleep(state.chat_delay).await;
            let response = analyst_reply(&state, &request);
            ServerFrame::AiResponse(ChatReply {
                kind: MessageKind::Ai,
                seed: request.seed,
                content: Some(request.content),
                response: Some(response),
                model_used: Some(request.model),
            })
        }
    }
}

/// Canned analyst answer.
///
/// A question naming a listed code is answered from that symbol's series and
/// prediction. Other on-topic questions get routed to a usage hint, and
/// off-topic ones get the scope-refusal word.
fn analyst_reply(state: &AppState, request: &ChatRequest) -> String {
    let mentioned = request
        .content
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() == 3)
        .find_map(|token| {
            let symbol = Symbol::new(token.to_ascii_uppercase());
            state.catalog.get(&symbol).cloned()
        });

    if let Some(listing) = mentioned {
        let series = state.series_for(&listing);
        let summary = engine::summary(&listing, &series);
        let prediction = engine::predict(&series, RangeToken::All);
        let metrics = summary.metrics;
        return format!(
            "{} ({}) closed between {:.2} and {:.2} over {} sessions, returning {:.2}% overall. \
             The model currently reads the trend as {} at {:.1}% confidence.",
            listing.company_name,
            listing.stock_code,
            metrics.lowest_close,
            metrics.highest_close,
            metrics.trading_days,
            metrics.cumulative_return,
            prediction.trend,
            prediction.confidence,
        );
    }

    let content = request.content.to_lowercase();
    if ANALYSIS_KEYWORDS
        .iter()
        .any(|keyword| content.contains(keyword))
    {
        return "I track the HypeStock universe. Name a listed code, eg/ \"trend for ACB?\", \
                and I will read its price action and indicators."
            .to_string();
    }

    "banana".to_string()
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    #[serde(default)]
    range: RangeToken,
}

#[derive(Debug, Deserialize)]
struct IndicatorQuery {
    #[serde(rename = "type", default)]
    kind: IndicatorKind,
    #[serde(default)]
    range: RangeToken,
}

async fn summary_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<StockSummary>, StatusCode> {
    let listing = state.lookup(&symbol)?;
    let series = state.series_for(&listing);
    Ok(Json(engine::summary(&listing, &series)))
}

async fn price_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<PricePoint>>, StatusCode> {
    let listing = state.lookup(&symbol)?;
    let series = state.series_for(&listing);
    Ok(Json(engine::price_points(&series, params.range)))
}

async fn indicator_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<IndicatorQuery>,
) -> Result<Json<Vec<IndicatorPoint>>, StatusCode> {
    let listing = state.lookup(&symbol)?;
    let series = state.series_for(&listing);
    Ok(Json(engine::indicator_series(params.kind, &series, params.range)))
}

async fn prediction_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Prediction>, StatusCode> {
    let listing = state.lookup(&symbol)?;
    let series = state.series_for(&listing);
    Ok(Json(engine::predict(&series, params.range)))
}
