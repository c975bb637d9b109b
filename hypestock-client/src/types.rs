use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Default point budget used when thinning a series for display.
pub const MAX_CHART_POINTS: usize = 150;

/// Listed instrument code, eg/ "ACB".
#[derive(
    Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Symbol(SmolStr);

impl Symbol {
    pub fn new<S>(symbol: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Symbolic time-window identifier used as part of detail cache keys.
#[derive(
    Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
pub enum RangeToken {
    #[serde(rename = "1M")]
    #[display("1M")]
    OneMonth,
    #[serde(rename = "3M")]
    #[display("3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    #[display("6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    #[display("1Y")]
    OneYear,
    #[default]
    #[serde(rename = "ALL")]
    #[display("ALL")]
    All,
}

impl RangeToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeToken::OneMonth => "1M",
            RangeToken::ThreeMonths => "3M",
            RangeToken::SixMonths => "6M",
            RangeToken::OneYear => "1Y",
            RangeToken::All => "ALL",
        }
    }
}

/// Technical indicator selectable in the detail view.
#[derive(
    Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
pub enum IndicatorKind {
    #[default]
    #[serde(rename = "RSI")]
    #[display("RSI")]
    Rsi,
    #[serde(rename = "MACD")]
    #[display("MACD")]
    Macd,
    #[serde(rename = "Volume")]
    #[display("Volume")]
    Volume,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
            IndicatorKind::Volume => "Volume",
        }
    }
}

/// Model provider answering chat questions.
#[derive(
    Clone, Copy, Debug, Display, Default, PartialEq, Eq, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChatModel {
    #[default]
    #[display("cloud")]
    Cloud,
    #[display("local")]
    Local,
}

/// Catalogue entry shown on the paginated stock list.
///
/// `start_date <= end_date` always holds for well-formed entries. The trading-day
/// count is also accepted under its legacy wire name `entry_count`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StockListItem {
    pub stock_code: Symbol,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(alias = "entry_count")]
    pub trading_days: u32,
}

/// Single close observation on the detail price chart, with optional moving averages.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma20: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma50: Option<f64>,
}

/// Single indicator observation.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Aggregate statistics shown in the detail sidebar.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct SummaryMetrics {
    pub highest_close: f64,
    pub lowest_close: f64,
    pub average_volume: f64,
    pub volatility: f64,
    pub cumulative_return: f64,
    pub trading_days: u32,
}

/// Per-symbol summary served over the fallback channel.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StockSummary {
    pub stock_code: Symbol,
    pub company_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: SummaryMetrics,
}

/// Directional call attached to a [`Prediction`].
#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum TrendLabel {
    #[display("Bullish")]
    Bullish,
    #[display("Bearish")]
    Bearish,
    #[default]
    #[display("Neutral")]
    Neutral,
}

/// Weighted model input backing a [`Prediction`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PredictionFeature {
    pub name: String,
    /// Importance as a percentage in `[0, 100]`.
    pub importance: f64,
}

/// Model forecast for a (symbol, range) pair.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Prediction {
    pub available: bool,
    #[serde(default)]
    pub trend: TrendLabel,
    /// Confidence as a percentage in `[0, 100]`.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub top_features: Vec<PredictionFeature>,
}

impl Prediction {
    /// Features ranked by importance descending, truncated to `max` entries.
    ///
    /// The dashboard sidebar shows at most the leading three.
    pub fn ranked_features(&self, max: usize) -> Vec<&PredictionFeature> {
        let mut ranked: Vec<&PredictionFeature> = self.top_features.iter().collect();
        ranked.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(max);
        ranked
    }

    /// Placeholder returned when a series is too short to judge.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            trend: TrendLabel::default(),
            confidence: 0.0,
            top_features: Vec::new(),
        }
    }
}

/// Thin a series for display, keeping every `ceil(len / max_points)`-th element.
///
/// Series no longer than `max_points` pass through untouched. The first element is
/// always retained.
pub fn decimate<T>(points: &[T], max_points: usize) -> Vec<T>
where
    T: Clone,
{
    if max_points == 0 {
        return Vec::new();
    }
    if points.len() <= max_points {
        return points.to_vec();
    }

    let step = points.len().div_ceil(max_points);
    points
        .iter()
        .enumerate()
        .filter(|(index, _)| index % step == 0)
        .map(|(_, point)| point.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_list_item_de() {
        let input = r#"{
            "stock_code": "ACB",
            "company_name": "Mock Company ACB",
            "sector": "Finance",
            "start_date": "2020-01-01",
            "end_date": "2024-02-14",
            "trading_days": 1043
        }"#;

        let actual = serde_json::from_str::<StockListItem>(input).unwrap();
        assert_eq!(actual.stock_code, Symbol::from("ACB"));
        assert_eq!(actual.trading_days, 1043);
        assert!(actual.start_date <= actual.end_date);
    }

    #[test]
    fn test_stock_list_item_de_legacy_entry_count() {
        let input = r#"{
            "stock_code": "AAA",
            "company_name": "Mock Company AAA",
            "start_date": "2020-01-01",
            "end_date": "2024-02-14",
            "entry_count": 512
        }"#;

        let actual = serde_json::from_str::<StockListItem>(input).unwrap();
        assert_eq!(actual.trading_days, 512);
        assert_eq!(actual.sector, None);
    }

    #[test]
    fn test_range_token_serde_round_trip() {
        struct TestCase {
            input: RangeToken,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: one month
                input: RangeToken::OneMonth,
                expected: "\"1M\"",
            },
            TestCase {
                // TC1: three months
                input: RangeToken::ThreeMonths,
                expected: "\"3M\"",
            },
            TestCase {
                // TC2: full history
                input: RangeToken::All,
                expected: "\"ALL\"",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let json = serde_json::to_string(&test.input).unwrap();
            assert_eq!(json, test.expected, "TC{} failed", index);
            let back = serde_json::from_str::<RangeToken>(&json).unwrap();
            assert_eq!(back, test.input, "TC{} failed", index);
        }
    }

    #[test]
    fn test_prediction_ranked_features_truncates_to_top_three() {
        let prediction = Prediction {
            available: true,
            trend: TrendLabel::Bullish,
            confidence: 62.0,
            top_features: vec![
                PredictionFeature {
                    name: "MACD".to_string(),
                    importance: 18.0,
                },
                PredictionFeature {
                    name: "RSI_14".to_string(),
                    importance: 34.0,
                },
                PredictionFeature {
                    name: "Volume_MA20".to_string(),
                    importance: 9.0,
                },
                PredictionFeature {
                    name: "Dist_from_MA50".to_string(),
                    importance: 27.0,
                },
            ],
        };

        let ranked = prediction.ranked_features(3);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["RSI_14", "Dist_from_MA50", "MACD"]);
    }

    #[test]
    fn test_decimate() {
        struct TestCase {
            len: usize,
            max_points: usize,
            expected_len: usize,
            expected_first: Option<u32>,
        }

        let tests = vec![
            TestCase {
                // TC0: short series passes through
                len: 100,
                max_points: 150,
                expected_len: 100,
                expected_first: Some(0),
            },
            TestCase {
                // TC1: exact double keeps every other point
                len: 300,
                max_points: 150,
                expected_len: 150,
                expected_first: Some(0),
            },
            TestCase {
                // TC2: step rounds up, so fewer than max_points survive
                len: 301,
                max_points: 150,
                expected_len: 101,
                expected_first: Some(0),
            },
            TestCase {
                // TC3: zero budget yields nothing
                len: 10,
                max_points: 0,
                expected_len: 0,
                expected_first: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let series: Vec<u32> = (0..test.len as u32).collect();
            let thinned = decimate(&series, test.max_points);
            assert_eq!(thinned.len(), test.expected_len, "TC{} failed", index);
            assert_eq!(thinned.first().copied(), test.expected_first, "TC{} failed", index);
        }
    }
}
