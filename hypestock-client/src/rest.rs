use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::types::{
    IndicatorKind, IndicatorPoint, Prediction, PricePoint, RangeToken, StockSummary, Symbol,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Per-request deadline on the fallback channel.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of per-symbol detail data.
///
/// `None` is the "missing" sentinel: network failures, rejection statuses and
/// malformed bodies all collapse to it, and the caller retries on the next view
/// instead of memoizing the failure.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn summary(&self, symbol: &Symbol) -> Option<StockSummary>;

    async fn prices(&self, symbol: &Symbol, range: RangeToken) -> Option<Vec<PricePoint>>;

    async fn indicator(
        &self,
        symbol: &Symbol,
        kind: IndicatorKind,
        range: RangeToken,
    ) -> Option<Vec<IndicatorPoint>>;

    async fn prediction(&self, symbol: &Symbol, range: RangeToken) -> Option<Prediction>;
}

/// HTTP fallback channel for detail data, used because detail payloads are too
/// bulky to multiplex onto the realtime socket.
#[derive(Clone, Debug)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(&config.rest_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    async fn fetch<T>(&self, path: String) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.try_fetch(&path).await {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%path, %error, "detail request failed, treating as missing");
                None
            }
        }
    }

    async fn try_fetch<T>(&self, path: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let value = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl DetailSource for RestClient {
    async fn summary(&self, symbol: &Symbol) -> Option<StockSummary> {
        self.fetch(format!("stock/{symbol}/summary")).await
    }

    async fn prices(&self, symbol: &Symbol, range: RangeToken) -> Option<Vec<PricePoint>> {
        self.fetch(format!("stock/{symbol}/price?range={range}")).await
    }

    async fn indicator(
        &self,
        symbol: &Symbol,
        kind: IndicatorKind,
        range: RangeToken,
    ) -> Option<Vec<IndicatorPoint>> {
        self.fetch(format!("stock/{symbol}/indicator?type={kind}&range={range}"))
            .await
    }

    async fn prediction(&self, symbol: &Symbol, range: RangeToken) -> Option<Prediction> {
        self.fetch(format!("stock/{symbol}/prediction?range={range}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        let client = RestClient::new(&ClientConfig::default()).unwrap();

        struct TestCase {
            path: String,
            expected: &'static str,
        }

        let symbol = Symbol::from("ACB");
        let cases = vec![
            TestCase {
                path: format!("stock/{symbol}/summary"),
                expected: "http://127.0.0.1:8000/stock/ACB/summary",
            },
            TestCase {
                path: format!("stock/{symbol}/price?range={}", RangeToken::All),
                expected: "http://127.0.0.1:8000/stock/ACB/price?range=ALL",
            },
            TestCase {
                path: format!(
                    "stock/{symbol}/indicator?type={}&range={}",
                    IndicatorKind::Rsi,
                    RangeToken::OneMonth,
                ),
                expected: "http://127.0.0.1:8000/stock/ACB/indicator?type=RSI&range=1M",
            },
            TestCase {
                path: format!("stock/{symbol}/prediction?range={}", RangeToken::SixMonths),
                expected: "http://127.0.0.1:8000/stock/ACB/prediction?range=6M",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let url = client.endpoint(&test.path).unwrap();
            assert_eq!(url.as_str(), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = ClientConfig::default().with_rest_url("not a url");
        assert!(matches!(
            RestClient::new(&config),
            Err(ClientError::Url(_))
        ));
    }
}
