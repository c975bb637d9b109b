use crate::error::ClientError;
use crate::protocol::{ChatSeed, RequestId, ServerFrame};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::debug;

/// Key a pending request is matched under.
///
/// List fetches match on the echoed [`RequestId`]; chat requests match on the
/// numeric [`ChatSeed`] the backend sends back.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::From)]
pub enum CorrelationKey {
    Request(RequestId),
    Seed(ChatSeed),
}

type Resolution = Result<ServerFrame, ClientError>;

/// Matches inbound frames to the requests that asked for them.
///
/// Every registered request resolves exactly once: either a matching frame (or
/// injected failure) arrives first, or the caller-side timeout fires and withdraws
/// the registration. Responses with no live registration are dropped.
#[derive(Clone, Default)]
pub struct RequestCorrelator {
    pending: Arc<Mutex<FnvHashMap<CorrelationKey, oneshot::Sender<Resolution>>>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request under `key` and hand back its resolution handle.
    pub fn register(&self, key: impl Into<CorrelationKey>) -> PendingResponse {
        let key = key.into();
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(key.clone(), tx).is_some() {
            debug!(?key, "replaced pending request registered under the same key");
        }
        PendingResponse {
            key,
            rx,
            correlator: self.clone(),
        }
    }

    /// Resolve the pending request under `key` with `frame`.
    ///
    /// Returns false when nothing is pending under the key (late, duplicate, or
    /// unknown response); such frames are dropped by the caller.
    pub fn resolve(&self, key: &CorrelationKey, frame: ServerFrame) -> bool {
        match self.pending.lock().remove(key) {
            Some(tx) => {
                // The receiver may already have timed out; a failed send is the
                // response arriving after the local timeout, which is dropped.
                let _ = tx.send(Ok(frame));
                true
            }
            None => false,
        }
    }

    /// Resolve the sole pending list request, for peers that omit the echoed id.
    ///
    /// Returns false unless exactly one list request is pending.
    pub fn resolve_sole_request(&self, frame: ServerFrame) -> bool {
        let mut pending = self.pending.lock();
        let mut request_keys = pending
            .keys()
            .filter(|key| matches!(key, CorrelationKey::Request(_)));
        let key = match (request_keys.next(), request_keys.next()) {
            (Some(key), None) => key.clone(),
            _ => return false,
        };

        match pending.remove(&key) {
            Some(tx) => {
                let _ = tx.send(Ok(frame));
                true
            }
            None => false,
        }
    }

    /// Fail every pending list request.
    ///
    /// Backend error frames release list fetches immediately; chat requests are
    /// left to ride out their own timeouts. Returns the number failed.
    pub fn fail_requests<F>(&self, mut error: F) -> usize
    where
        F: FnMut() -> ClientError,
    {
        let mut pending = self.pending.lock();
        let keys: Vec<CorrelationKey> = pending
            .keys()
            .filter(|key| matches!(key, CorrelationKey::Request(_)))
            .cloned()
            .collect();

        for key in &keys {
            if let Some(tx) = pending.remove(key) {
                let _ = tx.send(Err(error()));
            }
        }
        keys.len()
    }

    /// Number of live registrations.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn abandon(&self, key: &CorrelationKey) -> bool {
        self.pending.lock().remove(key).is_some()
    }
}

/// Resolution handle for one registered request.
pub struct PendingResponse {
    key: CorrelationKey,
    rx: oneshot::Receiver<Resolution>,
    correlator: RequestCorrelator,
}

impl PendingResponse {
    /// Await the resolution for at most `ttl`.
    ///
    /// On timeout the registration is withdrawn first, so a response landing later
    /// finds nothing to match and is dropped; the caller sees the timeout error
    /// exactly once.
    pub async fn await_within(self, ttl: Duration) -> Resolution {
        match tokio::time::timeout(ttl, self.rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_closed)) => Err(ClientError::Transport(
                "pending request dropped before resolution".to_string(),
            )),
            Err(_elapsed) => {
                self.correlator.abandon(&self.key);
                Err(ClientError::ResponseTimeout(ttl))
            }
        }
    }

    /// Withdraw the registration without resolving, eg/ when the transmit that
    /// followed registration failed.
    pub fn cancel(self) {
        self.correlator.abandon(&self.key);
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorMessage, StockPage};

    fn page_frame(request_id: Option<RequestId>) -> ServerFrame {
        ServerFrame::StockData(StockPage {
            request_id,
            items: vec![],
            total: Some(0),
            has_more: Some(false),
        })
    }

    #[tokio::test]
    async fn resolves_with_matching_frame_before_timeout() {
        let correlator = RequestCorrelator::new();
        let id = RequestId::new("req_test0001");
        let pending = correlator.register(id.clone());

        assert!(correlator.resolve(&CorrelationKey::from(id.clone()), page_frame(Some(id))));

        let resolution = pending.await_within(Duration::from_secs(1)).await;
        assert!(matches!(resolution, Ok(ServerFrame::StockData(_))));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn times_out_exactly_once_and_drops_late_response() {
        let correlator = RequestCorrelator::new();
        let id = RequestId::new("req_test0002");
        let pending = correlator.register(id.clone());

        let resolution = pending.await_within(Duration::from_millis(20)).await;
        assert!(matches!(resolution, Err(ClientError::ResponseTimeout(_))));
        assert_eq!(correlator.pending_len(), 0);

        // The real response lands after the local timeout: unmatched, dropped.
        let late = correlator.resolve(&CorrelationKey::from(id.clone()), page_frame(Some(id)));
        assert!(!late);
    }

    #[tokio::test]
    async fn unknown_seed_is_dropped() {
        let correlator = RequestCorrelator::new();
        let matched = correlator.resolve(
            &CorrelationKey::from(ChatSeed::new(12345)),
            ServerFrame::Error(ErrorMessage {
                message: "nobody asked".to_string(),
            }),
        );
        assert!(!matched);
    }

    #[tokio::test]
    async fn fail_requests_spares_chat_registrations() {
        let correlator = RequestCorrelator::new();
        let list = correlator.register(RequestId::new("req_test0003"));
        let chat = correlator.register(ChatSeed::new(777));

        let failed = correlator.fail_requests(|| ClientError::Backend("boom".to_string()));
        assert_eq!(failed, 1);

        let list_resolution = list.await_within(Duration::from_millis(50)).await;
        assert!(matches!(list_resolution, Err(ClientError::Backend(_))));

        // The chat registration is untouched and times out on its own clock.
        let chat_resolution = chat.await_within(Duration::from_millis(20)).await;
        assert!(matches!(chat_resolution, Err(ClientError::ResponseTimeout(_))));
    }

    #[tokio::test]
    async fn sole_request_matching_requires_exactly_one_pending() {
        let correlator = RequestCorrelator::new();
        assert!(!correlator.resolve_sole_request(page_frame(None)));

        let only = correlator.register(RequestId::new("req_test0004"));
        let _chat = correlator.register(ChatSeed::new(42));
        assert!(correlator.resolve_sole_request(page_frame(None)));
        assert!(matches!(
            only.await_within(Duration::from_secs(1)).await,
            Ok(ServerFrame::StockData(_))
        ));

        let _first = correlator.register(RequestId::new("req_test0005"));
        let _second = correlator.register(RequestId::new("req_test0006"));
        assert!(!correlator.resolve_sole_request(page_frame(None)));
    }

    #[tokio::test]
    async fn cancel_withdraws_the_registration() {
        let correlator = RequestCorrelator::new();
        let id = RequestId::new("req_test0007");
        let pending = correlator.register(id.clone());
        assert_eq!(correlator.pending_len(), 1);

        pending.cancel();
        assert_eq!(correlator.pending_len(), 0);
        assert!(!correlator.resolve(&CorrelationKey::from(id.clone()), page_frame(Some(id))));
    }
}
