use crate::types::{ChatModel, StockListItem};
use derive_more::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

/// Correlation identifier attached to every outbound request.
///
/// Generated as `req_` followed by eight random lowercase base-36 characters.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RequestId(SmolStr);

impl RequestId {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(id.into())
    }

    /// Generate a fresh identifier.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..8)
            .map(|_| {
                let c = rng.sample(rand::distr::Alphanumeric) as char;
                c.to_ascii_lowercase()
            })
            .collect();
        Self(format_smolstr!("req_{}", suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Numeric seed echoed back by the backend to mark which chat request is being
/// answered. Chat responses are matched by seed, not by [`RequestId`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChatSeed(i64);

impl ChatSeed {
    pub fn new(seed: i64) -> Self {
        Self(seed)
    }

    /// Draw a fresh seed uniformly from `[0, 2^31)`.
    pub fn random() -> Self {
        Self(rand::rng().random_range(0..2_147_483_647))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Chat payload discriminator carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Ai,
}

/// Frames sent from the client to the backend.
///
/// #### Raw Payload Examples
/// ```json
/// {"event":"startup","data":{"timestamp":1718031022000,"request_id":"req_k2u91xfa"}}
/// {"event":"request_stocks","data":{"request_id":"req_8fj1am02","page":0,"limit":24,"query":""}}
/// {"event":"ai","data":{"request_id":"req_x01pd3hh","type":"ai","content":"trend for ACB?","seed":903417221,"model":"cloud"}}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Startup(StartupRequest),
    RequestStocks(StockPageRequest),
    Ai(ChatRequest),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frames received from the backend.
///
/// #### Raw Payload Examples
/// ```json
/// {"event":"startup_response","data":{"status":"ready","server_time":84121.77}}
/// {"event":"stock_data","data":{"request_id":"req_8fj1am02","items":[],"total":0,"hasMore":false}}
/// {"event":"error","data":{"message":"Failed to fetch stocks"}}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    StartupResponse(StartupResponse),
    StockData(StockPage),
    AiResponse(ChatReply),
    Error(ErrorMessage),
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Readiness handshake opener.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StartupRequest {
    /// Client wall-clock in epoch milliseconds.
    pub timestamp: i64,
    pub request_id: RequestId,
}

impl StartupRequest {
    /// Handshake payload stamped with the current wall-clock.
    pub fn now(request_id: RequestId) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            request_id,
        }
    }
}

/// Readiness handshake answer. Receipt alone marks the backend Ready; the fields
/// are informational.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StartupResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub server_time: f64,
}

/// One page of the stock catalogue.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StockPageRequest {
    pub request_id: RequestId,
    pub page: u32,
    pub limit: u32,
    pub query: String,
}

/// Page answer. `request_id` is echoed only when the request carried one, and some
/// peers send the items as a bare top-level array, so both shapes decode.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "StockPageWire")]
pub struct StockPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub items: Vec<StockListItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StockPageWire {
    Wrapped {
        #[serde(default)]
        request_id: Option<RequestId>,
        #[serde(default)]
        items: Vec<StockListItem>,
        #[serde(default)]
        total: Option<u64>,
        #[serde(rename = "hasMore", default)]
        has_more: Option<bool>,
    },
    Bare(Vec<StockListItem>),
}

impl From<StockPageWire> for StockPage {
    fn from(wire: StockPageWire) -> Self {
        match wire {
            StockPageWire::Wrapped {
                request_id,
                items,
                total,
                has_more,
            } => Self {
                request_id,
                items,
                total,
                has_more,
            },
            StockPageWire::Bare(items) => Self {
                request_id: None,
                items,
                total: None,
                has_more: None,
            },
        }
    }
}

/// Chat question for the analyst.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChatRequest {
    pub request_id: RequestId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub seed: ChatSeed,
    pub model: ChatModel,
}

impl ChatRequest {
    pub fn new(content: impl Into<String>, seed: ChatSeed, model: ChatModel) -> Self {
        Self {
            request_id: RequestId::random(),
            kind: MessageKind::Ai,
            content: content.into(),
            seed,
            model,
        }
    }
}

/// Analyst answer, matched to its question by `seed`.
///
/// #### Raw Payload Example
/// ```json
/// {"type":"ai","content":"trend for ACB?","response":"ACB has been...","seed":903417221,"model_used":"cloud"}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChatReply {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub seed: ChatSeed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<ChatModel>,
}

/// Backend-reported application error.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ErrorMessage {
    pub message: String,
}
