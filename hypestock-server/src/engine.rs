use chrono::{Datelike, Months, NaiveDate, Weekday};
use fnv::FnvHasher;
use hypestock_client::types::{
    IndicatorKind, IndicatorPoint, Prediction, PredictionFeature, PricePoint, RangeToken,
    StockListItem, StockSummary, Symbol, SummaryMetrics, TrendLabel,
};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hash::Hasher;

/// One generated trading day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Synthesize a daily OHLCV series for `symbol`.
///
/// The walk is seeded from the symbol alone, so every instance produces the
/// same candles for the same code. Only weekdays are emitted, starting at the
/// catalogue epoch, and the close is floored at 1.0.
pub fn price_series(symbol: &Symbol, trading_days: u32) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(symbol_seed(symbol));
    let mut date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");
    let mut close: f64 = rng.random_range(20.0..300.0);
    let drift = rng.random_range(-0.0005..0.001);

    let mut candles = Vec::with_capacity(trading_days as usize);
    while candles.len() < trading_days as usize {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let open = close;
            let step = drift + rng.random_range(-0.02..0.02);
            close = (close * (1.0 + step)).max(1.0);

            candles.push(Candle {
                date,
                open,
                high: open.max(close) * (1.0 + rng.random_range(0.0..0.01)),
                low: open.min(close) * (1.0 - rng.random_range(0.0..0.01)),
                close,
                volume: rng.random_range(100_000.0..5_000_000.0_f64).round(),
            });
        }

        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    candles
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(symbol.as_str().as_bytes());
    hasher.finish()
}

/// Simple moving average, `None` until a full `window` has been observed.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (index, value) in values.iter().enumerate() {
        sum += value;
        if index >= window {
            sum -= values[index - window];
        }
        out.push((index + 1 >= window).then(|| sum / window as f64));
    }
    out
}

/// Exponential moving average with smoothing `2 / (span + 1)`, seeded from the
/// first observation.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current: Option<f64> = None;
    for value in values {
        let next = match current {
            None => *value,
            Some(previous) => alpha * value + (1.0 - alpha) * previous,
        };
        out.push(next);
        current = Some(next);
    }
    out
}

/// Wilder RSI over closes, `None` until fourteen deltas have been smoothed.
///
/// A window with no losses reads 100.
pub fn wilder_rsi(closes: &[f64]) -> Vec<Option<f64>> {
    const PERIOD: usize = 14;
    let alpha = 1.0 / PERIOD as f64;

    let mut out = vec![None; closes.len()];
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (index, delta) in closes
        .iter()
        .tuple_windows()
        .map(|(previous, current)| current - previous)
        .enumerate()
    {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        if index == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        }

        if index + 1 >= PERIOD {
            let rsi = if avg_loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            };
            out[index + 1] = Some(rsi);
        }
    }

    out
}

/// MACD line, `ema(12) - ema(26)`.
pub fn macd(closes: &[f64]) -> Vec<f64> {
    ema(closes, 12)
        .into_iter()
        .zip(ema(closes, 26))
        .map(|(fast, slow)| fast - slow)
        .collect()
}

/// Trailing window of `candles` selected by `range`, anchored at the final date.
pub fn slice_range(candles: &[Candle], range: RangeToken) -> &[Candle] {
    let months = match range {
        RangeToken::OneMonth => 1,
        RangeToken::ThreeMonths => 3,
        RangeToken::SixMonths => 6,
        RangeToken::OneYear => 12,
        RangeToken::All => return candles,
    };

    let Some(last) = candles.last() else {
        return candles;
    };
    let Some(cutoff) = last.date.checked_sub_months(Months::new(months)) else {
        return candles;
    };

    let start = candles.partition_point(|candle| candle.date < cutoff);
    &candles[start..]
}

/// Price chart series for `range`.
///
/// MA20/MA50 are computed over the full history before the window is cut, so
/// a narrow range carries the same moving-average tail the full chart shows.
pub fn price_points(candles: &[Candle], range: RangeToken) -> Vec<PricePoint> {
    let closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();
    let ma20 = sma(&closes, 20);
    let ma50 = sma(&closes, 50);

    let window = slice_range(candles, range);
    let offset = candles.len() - window.len();

    window
        .iter()
        .enumerate()
        .map(|(index, candle)| PricePoint {
            date: candle.date,
            close: round4(candle.close),
            ma20: ma20[offset + index].map(round4),
            ma50: ma50[offset + index].map(round4),
        })
        .collect()
}

/// Indicator chart series for `(kind, range)`.
///
/// RSI drops its warmup rows instead of emitting gaps; MACD and Volume cover
/// every session in the window.
pub fn indicator_series(
    kind: IndicatorKind,
    candles: &[Candle],
    range: RangeToken,
) -> Vec<IndicatorPoint> {
    let window = slice_range(candles, range);
    let offset = candles.len() - window.len();

    match kind {
        IndicatorKind::Rsi => {
            let closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();
            let rsi = wilder_rsi(&closes);
            window
                .iter()
                .enumerate()
                .filter_map(|(index, candle)| {
                    rsi[offset + index].map(|value| IndicatorPoint {
                        date: candle.date,
                        value: round4(value),
                    })
                })
                .collect()
        }
        IndicatorKind::Macd => {
            let closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();
            let line = macd(&closes);
            window
                .iter()
                .enumerate()
                .map(|(index, candle)| IndicatorPoint {
                    date: candle.date,
                    value: round4(line[offset + index]),
                })
                .collect()
        }
        IndicatorKind::Volume => window
            .iter()
            .map(|candle| IndicatorPoint {
                date: candle.date,
                value: candle.volume,
            })
            .collect(),
    }
}

/// Sidebar summary over the full history.
///
/// Volatility is the sample standard deviation of the last twenty closes, and
/// the cumulative return is a percentage of the first close.
pub fn summary(listing: &StockListItem, candles: &[Candle]) -> StockSummary {
    let closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();

    let metrics = if closes.is_empty() {
        SummaryMetrics {
            highest_close: 0.0,
            lowest_close: 0.0,
            average_volume: 0.0,
            volatility: 0.0,
            cumulative_return: 0.0,
            trading_days: 0,
        }
    } else {
        let highest = closes.iter().copied().fold(f64::MIN, f64::max);
        let lowest = closes.iter().copied().fold(f64::MAX, f64::min);
        let average_volume =
            candles.iter().map(|candle| candle.volume).sum::<f64>() / candles.len() as f64;
        let volatility = sample_std(&closes[closes.len().saturating_sub(20)..]);

        let first = closes[0];
        let last = closes[closes.len() - 1];
        let cumulative_return = if first == 0.0 {
            0.0
        } else {
            (last / first - 1.0) * 100.0
        };

        SummaryMetrics {
            highest_close: round4(highest),
            lowest_close: round4(lowest),
            average_volume: round4(average_volume),
            volatility: round4(volatility),
            cumulative_return: round4(cumulative_return),
            trading_days: candles.len() as u32,
        }
    };

    StockSummary {
        stock_code: listing.stock_code.clone(),
        company_name: listing.company_name.clone(),
        start_date: candles
            .first()
            .map(|candle| candle.date)
            .unwrap_or(listing.start_date),
        end_date: candles
            .last()
            .map(|candle| candle.date)
            .unwrap_or(listing.end_date),
        metrics,
    }
}

/// Deterministic trend call for the `range` window of `candles`.
///
/// Windows shorter than thirty sessions are reported unavailable rather than
/// guessed at. The call reads the MACD sign together with the MA20 slope, and
/// the feature importances are derived from the same statistics, normalised
/// to sum to one hundred.
pub fn predict(candles: &[Candle], range: RangeToken) -> Prediction {
    const MIN_OBSERVATIONS: usize = 30;

    let window = slice_range(candles, range);
    if window.len() < MIN_OBSERVATIONS {
        return Prediction::unavailable();
    }

    let closes: Vec<f64> = window.iter().map(|candle| candle.close).collect();
    let ma20 = sma(&closes, 20);
    let line = macd(&closes);
    let rsi = wilder_rsi(&closes);

    let last_close = closes[closes.len() - 1];
    let macd_last = line[line.len() - 1];
    let ma_slope = match (ma20[ma20.len() - 1], ma20[ma20.len() - 6]) {
        (Some(now), Some(then)) => now - then,
        _ => 0.0,
    };

    let trend = if macd_last > 0.0 && ma_slope > 0.0 {
        TrendLabel::Bullish
    } else if macd_last < 0.0 && ma_slope < 0.0 {
        TrendLabel::Bearish
    } else {
        TrendLabel::Neutral
    };

    let strength = (macd_last.abs() / last_close * 2_000.0).min(35.0);
    let confidence = round4(55.0 + strength);

    let full_closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();
    let dist_ma50 = match sma(&full_closes, 50).last().copied().flatten() {
        Some(ma) if last_close != 0.0 => (last_close - ma) / last_close,
        _ => 0.0,
    };

    let volumes: Vec<f64> = window.iter().map(|candle| candle.volume).collect();
    let volume_tail = &volumes[volumes.len().saturating_sub(20)..];
    let volume_ma = volume_tail.iter().sum::<f64>() / volume_tail.len() as f64;
    let volume_deviation = if volume_ma == 0.0 {
        0.0
    } else {
        (volumes[volumes.len() - 1] / volume_ma - 1.0).abs()
    };

    let reference = closes[closes.len() - 6];
    let lagged_return = if reference == 0.0 {
        0.0
    } else {
        last_close / reference - 1.0
    };

    let rsi_last = rsi.last().copied().flatten().unwrap_or(50.0);

    let raw = [
        ("RSI_14", 12.0 + (rsi_last - 50.0).abs() * 0.4),
        ("MACD", 10.0 + macd_last.abs() / last_close * 900.0),
        ("Dist_from_MA50", 8.0 + dist_ma50.abs() * 300.0),
        ("Volume_MA20", 6.0 + volume_deviation * 40.0),
        ("Lagged_Return_t5", 5.0 + lagged_return.abs() * 400.0),
    ];
    let total: f64 = raw.iter().map(|(_, weight)| weight).sum();

    let mut top_features: Vec<PredictionFeature> = raw
        .iter()
        .map(|(name, weight)| PredictionFeature {
            name: name.to_string(),
            importance: round4(weight / total * 100.0),
        })
        .collect();
    top_features.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Prediction {
        available: true,
        trend,
        confidence,
        top_features,
    }
}

/// Round to four decimal places, the precision served on every numeric field.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}
