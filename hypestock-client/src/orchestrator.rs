use crate::config::ClientConfig;
use crate::connection::{ConnectionHandle, NoticeLevel};
use crate::correlator::{CorrelationKey, RequestCorrelator};
use crate::error::ClientError;
use crate::pagination::{PageFetch, PaginationController};
use crate::protocol::{
    ChatReply, ChatRequest, ChatSeed, ClientFrame, RequestId, ServerFrame, StockPageRequest,
};
use crate::types::{ChatModel, StockListItem};
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Why a page rendered with no items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmptyKind {
    /// The active search matched nothing.
    NoMatches { query: String },
    /// The backend has no catalogue rows at all.
    NoData,
}

impl EmptyKind {
    /// Text shown in place of the list.
    pub fn message(&self) -> String {
        match self {
            EmptyKind::NoMatches { query } => format!("No stocks found matching \"{query}\"."),
            EmptyKind::NoData => "No stock data available.".to_string(),
        }
    }
}

/// One settled list fetch, ready to render.
#[derive(Clone, Debug, PartialEq)]
pub struct StockListUpdate {
    pub items: Vec<StockListItem>,
    pub page: u32,
    /// Page numbers worth offering as direct jumps.
    pub window: RangeInclusive<u32>,
    pub has_more: bool,
    pub total: Option<u64>,
    pub empty: Option<EmptyKind>,
    /// Pagination controls are hidden on an empty first-and-only page.
    pub show_controls: bool,
}

/// Coordinates list fetches and chat requests over the live socket.
///
/// List fetches are single-flight: while one is in flight, further navigation
/// still moves the pagination state but issues no request, and the next
/// completed fetch reconciles the view. The flight lock force-releases on
/// timeout so a dropped connection cannot wedge the list forever.
#[derive(Clone)]
pub struct FetchOrchestrator {
    connection: ConnectionHandle,
    correlator: RequestCorrelator,
    pagination: Arc<Mutex<PaginationController>>,
    list_lock: Arc<AtomicBool>,
    search_gen: Arc<AtomicU64>,
    update_tx: broadcast::Sender<StockListUpdate>,
    config: ClientConfig,
}

impl FetchOrchestrator {
    /// Wire the orchestrator onto a connection and start dispatching its
    /// inbound frames.
    pub fn start(
        connection: ConnectionHandle,
        inbound_rx: mpsc::Receiver<ServerFrame>,
        config: ClientConfig,
    ) -> Self {
        let correlator = RequestCorrelator::new();
        let (update_tx, _) = broadcast::channel(32);

        tokio::spawn(run_dispatch(
            inbound_rx,
            correlator.clone(),
            connection.clone(),
        ));

        Self {
            pagination: Arc::new(Mutex::new(PaginationController::new(config.page_size))),
            list_lock: Arc::new(AtomicBool::new(false)),
            search_gen: Arc::new(AtomicU64::new(0)),
            connection,
            correlator,
            update_tx,
            config,
        }
    }

    /// Fetch the current page again, eg/ on startup or after a reconnect.
    pub async fn refresh(&self) -> Result<Option<StockListUpdate>, ClientError> {
        let fetch = self.pagination.lock().current_fetch();
        self.run_fetch(fetch).await
    }

    /// Jump to `page`. `Ok(None)` when already there or when a fetch is in
    /// flight; the page state advances regardless.
    pub async fn goto_page(&self, page: u32) -> Result<Option<StockListUpdate>, ClientError> {
        let fetch = self.pagination.lock().goto_page(page);
        self.maybe_fetch(fetch).await
    }

    pub async fn next_page(&self) -> Result<Option<StockListUpdate>, ClientError> {
        let fetch = self.pagination.lock().next_page();
        self.maybe_fetch(fetch).await
    }

    pub async fn previous_page(&self) -> Result<Option<StockListUpdate>, ClientError> {
        let fetch = self.pagination.lock().previous_page();
        self.maybe_fetch(fetch).await
    }

    /// Apply a search query after the debounce window settles.
    ///
    /// Call this on every keystroke; only the latest call within the window
    /// proceeds. A fetch is issued when the trimmed query is non-empty, or when
    /// it just transitioned back to empty.
    pub async fn set_query(&self, query: &str) -> Result<Option<StockListUpdate>, ClientError> {
        let query = query.trim().to_string();

        let generation = self.search_gen.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.config.search_debounce).await;
        if self.search_gen.load(Ordering::SeqCst) != generation {
            return Ok(None);
        }

        let fetch = self.pagination.lock().apply_query(query);
        self.maybe_fetch(fetch).await
    }

    /// Ask the analyst a question and await its answer.
    ///
    /// The reply is matched by seed; with no reply within the chat timeout this
    /// resolves once with [`ClientError::ResponseTimeout`], and a straggling
    /// answer is dropped.
    pub async fn send_chat(
        &self,
        content: impl Into<String>,
        model: ChatModel,
    ) -> Result<ChatReply, ClientError> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let request = ChatRequest::new(content, ChatSeed::random(), model);
        let pending = self.correlator.register(request.seed);

        if let Err(error) = self.connection.send(ClientFrame::Ai(request)).await {
            pending.cancel();
            return Err(error);
        }

        match pending.await_within(self.config.chat_timeout).await? {
            ServerFrame::AiResponse(reply) => Ok(reply),
            _ => Err(ClientError::UnexpectedFrame),
        }
    }

    /// Subscribe to settled list fetches.
    pub fn updates(&self) -> broadcast::Receiver<StockListUpdate> {
        self.update_tx.subscribe()
    }

    /// Settled list fetches as a [`Stream`](futures::Stream).
    pub fn update_stream(&self) -> BroadcastStream<StockListUpdate> {
        BroadcastStream::new(self.update_tx.subscribe())
    }

    async fn maybe_fetch(
        &self,
        fetch: Option<PageFetch>,
    ) -> Result<Option<StockListUpdate>, ClientError> {
        match fetch {
            Some(fetch) => self.run_fetch(fetch).await,
            None => Ok(None),
        }
    }

    async fn run_fetch(&self, fetch: PageFetch) -> Result<Option<StockListUpdate>, ClientError> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.list_lock.swap(true, Ordering::SeqCst) {
            debug!(page = fetch.page, "list fetch already in flight, ignoring");
            return Ok(None);
        }
        let _guard = ListLockGuard(Arc::clone(&self.list_lock));

        let request_id = RequestId::random();
        let pending = self.correlator.register(request_id.clone());
        let frame = ClientFrame::RequestStocks(StockPageRequest {
            request_id,
            page: fetch.page,
            limit: fetch.limit,
            query: fetch.query.clone(),
        });

        if let Err(error) = self.connection.send(frame).await {
            pending.cancel();
            return Err(error);
        }

        let frame = match pending.await_within(self.config.list_timeout).await {
            Ok(frame) => frame,
            Err(error) => {
                if error.is_timeout() {
                    warn!(
                        timeout_ms = self.config.list_timeout.as_millis() as u64,
                        "list request timed out, releasing fetch lock"
                    );
                }
                return Err(error);
            }
        };
        let ServerFrame::StockData(page) = frame else {
            return Err(ClientError::UnexpectedFrame);
        };

        let update = {
            let mut pagination = self.pagination.lock();
            pagination.apply_page(page.items.len(), page.has_more);

            let empty = if page.items.is_empty() {
                if fetch.query.is_empty() {
                    Some(EmptyKind::NoData)
                } else {
                    Some(EmptyKind::NoMatches {
                        query: fetch.query.clone(),
                    })
                }
            } else {
                None
            };
            let show_controls =
                !(pagination.page() == 0 && !pagination.has_more() && empty.is_some());

            StockListUpdate {
                items: page.items,
                page: pagination.page(),
                window: pagination.page_window(),
                has_more: pagination.has_more(),
                total: page.total,
                empty,
                show_controls,
            }
        };

        let _ = self.update_tx.send(update.clone());
        Ok(Some(update))
    }
}

/// Releases the single-flight list lock however the fetch ends.
struct ListLockGuard(Arc<AtomicBool>);

impl Drop for ListLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Route inbound frames to their pending requests.
///
/// A `stock_data` frame without the echoed id still resolves when exactly one
/// list request is pending. Backend `error` frames fail pending list requests
/// and surface a notice; chat requests ride out their own timeouts.
async fn run_dispatch(
    mut inbound_rx: mpsc::Receiver<ServerFrame>,
    correlator: RequestCorrelator,
    connection: ConnectionHandle,
) {
    while let Some(frame) = inbound_rx.recv().await {
        match frame {
            ServerFrame::StockData(ref page) => {
                let matched = match &page.request_id {
                    Some(id) => {
                        correlator.resolve(&CorrelationKey::Request(id.clone()), frame.clone())
                    }
                    None => correlator.resolve_sole_request(frame.clone()),
                };
                if !matched {
                    debug!("dropping unmatched stock_data frame");
                }
            }
            ServerFrame::AiResponse(ref reply) => {
                let key = CorrelationKey::Seed(reply.seed);
                if !correlator.resolve(&key, frame.clone()) {
                    debug!(seed = %reply.seed, "dropping unmatched ai_response frame");
                }
            }
            ServerFrame::Error(error) => {
                warn!(message = %error.message, "backend reported an error");
                connection.notify(NoticeLevel::Error, error.message.clone());
                correlator.fail_requests(|| ClientError::Backend(error.message.clone()));
            }
            ServerFrame::StartupResponse(_) => {
                debug!("ignoring startup_response outside the handshake");
            }
        }
    }
    debug!("frame dispatch ended");
}
