use crate::cache::{SelectionEpoch, SymbolCache};
use crate::rest::DetailSource;
use crate::types::{
    IndicatorKind, IndicatorPoint, Prediction, PricePoint, RangeToken, StockSummary, Symbol,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Everything the detail panel needs to render one symbol.
///
/// `None` fields were unavailable when the view was assembled; they retry on the
/// next interaction rather than being remembered as failures.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailView {
    pub symbol: Symbol,
    pub range: RangeToken,
    pub indicator_kind: IndicatorKind,
    pub summary: Option<StockSummary>,
    pub prices: Option<Vec<PricePoint>>,
    pub indicator: Option<Vec<IndicatorPoint>>,
    pub prediction: Option<Prediction>,
}

#[derive(Clone, Copy, Debug)]
struct DetailState {
    range: RangeToken,
    indicator: IndicatorKind,
}

impl Default for DetailState {
    fn default() -> Self {
        Self {
            range: RangeToken::default(),
            indicator: IndicatorKind::default(),
        }
    }
}

/// Drives the per-symbol detail panel: selection, range and indicator switches,
/// memoized fetching over the fallback channel.
///
/// Range switches debounce before fetching; selection and indicator switches act
/// immediately. Results from a superseded selection are discarded, never shown
/// or cached against the newer symbol.
#[derive(Clone)]
pub struct SymbolDetail {
    source: Arc<dyn DetailSource>,
    cache: Arc<Mutex<SymbolCache>>,
    state: Arc<Mutex<DetailState>>,
    debounce_gen: Arc<AtomicU64>,
    range_debounce: Duration,
}

impl SymbolDetail {
    pub fn new(source: Arc<dyn DetailSource>, range_debounce: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(Mutex::new(SymbolCache::new())),
            state: Arc::new(Mutex::new(DetailState::default())),
            debounce_gen: Arc::new(AtomicU64::new(0)),
            range_debounce,
        }
    }

    /// Open the detail panel for `symbol`.
    ///
    /// Selecting a different symbol drops the previous cache and resets the view
    /// to the full range with the default indicator; re-selecting the current one
    /// reuses every memoized response. Returns `None` when a newer selection
    /// superseded this one while its data was in flight.
    pub async fn load_symbol(&self, symbol: Symbol) -> Option<DetailView> {
        debug!(%symbol, "loading symbol detail");
        let epoch = self.cache.lock().select(symbol.clone());
        {
            let mut state = self.state.lock();
            state.range = RangeToken::default();
            state.indicator = IndicatorKind::default();
        }
        // Abort any debounced range change still pending for the previous view.
        self.debounce_gen.fetch_add(1, Ordering::SeqCst);

        let range = RangeToken::default();
        let indicator = IndicatorKind::default();
        self.ensure_summary(&symbol, epoch).await;
        self.ensure_series(&symbol, epoch, range, indicator).await;

        self.view_for(epoch, range, indicator)
    }

    /// Switch the detail panel to `range`.
    ///
    /// The range takes effect immediately; the fetch for missing data waits out
    /// the debounce window and is abandoned when a newer switch (or selection)
    /// arrives first. Returns `None` with no fetch when `range` is already
    /// active, and `None` when superseded.
    pub async fn change_range(&self, range: RangeToken) -> Option<DetailView> {
        {
            let mut state = self.state.lock();
            if state.range == range {
                return None;
            }
            state.range = range;
        }

        let generation = self.debounce_gen.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.range_debounce).await;
        if self.debounce_gen.load(Ordering::SeqCst) != generation {
            return None;
        }

        let (symbol, epoch) = self.selection()?;
        let indicator = self.state.lock().indicator;
        self.ensure_series(&symbol, epoch, range, indicator).await;

        if self.debounce_gen.load(Ordering::SeqCst) != generation {
            return None;
        }
        self.view_for(epoch, range, indicator)
    }

    /// Switch the active indicator, fetching its series for the current range if
    /// missing. Unlike range switches this is not debounced.
    pub async fn switch_indicator(&self, kind: IndicatorKind) -> Option<DetailView> {
        let range = {
            let mut state = self.state.lock();
            if state.indicator == kind {
                return None;
            }
            state.indicator = kind;
            state.range
        };

        let (symbol, epoch) = self.selection()?;
        self.ensure_indicator(&symbol, epoch, kind, range).await;

        self.view_for(epoch, range, kind)
    }

    pub fn selected_symbol(&self) -> Option<Symbol> {
        self.cache.lock().symbol().cloned()
    }

    pub fn current_range(&self) -> RangeToken {
        self.state.lock().range
    }

    pub fn current_indicator(&self) -> IndicatorKind {
        self.state.lock().indicator
    }

    fn selection(&self) -> Option<(Symbol, SelectionEpoch)> {
        let cache = self.cache.lock();
        Some((cache.symbol()?.clone(), cache.epoch()))
    }

    async fn ensure_summary(&self, symbol: &Symbol, epoch: SelectionEpoch) {
        if self.cache.lock().summary().is_some() {
            return;
        }
        if let Some(summary) = self.source.summary(symbol).await {
            self.cache.lock().store_summary(epoch, summary);
        }
    }

    async fn ensure_series(
        &self,
        symbol: &Symbol,
        epoch: SelectionEpoch,
        range: RangeToken,
        indicator: IndicatorKind,
    ) {
        if self.cache.lock().prices(range).is_none() {
            if let Some(points) = self.source.prices(symbol, range).await {
                self.cache.lock().store_prices(epoch, range, points);
            }
        }

        if self.cache.lock().prediction(range).is_none() {
            if let Some(prediction) = self.source.prediction(symbol, range).await {
                self.cache.lock().store_prediction(epoch, range, prediction);
            }
        }

        self.ensure_indicator(symbol, epoch, indicator, range).await;
    }

    async fn ensure_indicator(
        &self,
        symbol: &Symbol,
        epoch: SelectionEpoch,
        kind: IndicatorKind,
        range: RangeToken,
    ) {
        if self.cache.lock().indicator(kind, range).is_none() {
            if let Some(points) = self.source.indicator(symbol, kind, range).await {
                self.cache.lock().store_indicator(epoch, kind, range, points);
            }
        }
    }

    fn view_for(
        &self,
        epoch: SelectionEpoch,
        range: RangeToken,
        indicator: IndicatorKind,
    ) -> Option<DetailView> {
        let cache = self.cache.lock();
        if cache.epoch() != epoch {
            return None;
        }
        let symbol = cache.symbol()?.clone();

        Some(DetailView {
            symbol,
            range,
            indicator_kind: indicator,
            summary: cache.summary().cloned(),
            prices: cache.prices(range).map(<[_]>::to_vec),
            indicator: cache.indicator(indicator, range).map(<[_]>::to_vec),
            prediction: cache.prediction(range).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PredictionFeature, SummaryMetrics, TrendLabel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct FakeSource {
        summary_calls: AtomicUsize,
        price_calls: AtomicUsize,
        indicator_calls: AtomicUsize,
        prediction_calls: AtomicUsize,
        fail_summary: AtomicBool,
        slow_symbol: Mutex<Option<Symbol>>,
    }

    impl FakeSource {
        async fn stall_if_slow(&self, symbol: &Symbol) {
            let is_slow = self.slow_symbol.lock().as_ref() == Some(symbol);
            if is_slow {
                sleep(Duration::from_millis(50)).await;
            }
        }
    }

    #[async_trait]
    impl DetailSource for FakeSource {
        async fn summary(&self, symbol: &Symbol) -> Option<StockSummary> {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            self.stall_if_slow(symbol).await;
            if self.fail_summary.load(Ordering::SeqCst) {
                return None;
            }
            Some(StockSummary {
                stock_code: symbol.clone(),
                company_name: format!("Mock Company {symbol}"),
                start_date: "2020-01-01".parse().unwrap(),
                end_date: "2024-02-14".parse().unwrap(),
                metrics: SummaryMetrics {
                    highest_close: 120.5,
                    lowest_close: 80.25,
                    average_volume: 1_250_000.0,
                    volatility: 2.41,
                    cumulative_return: 18.2,
                    trading_days: 1043,
                },
            })
        }

        async fn prices(&self, symbol: &Symbol, _range: RangeToken) -> Option<Vec<PricePoint>> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            self.stall_if_slow(symbol).await;
            Some(vec![
                PricePoint {
                    date: "2024-01-02".parse().unwrap(),
                    close: 101.0,
                    ma20: Some(100.2),
                    ma50: None,
                },
                PricePoint {
                    date: "2024-01-03".parse().unwrap(),
                    close: 102.5,
                    ma20: Some(100.4),
                    ma50: None,
                },
            ])
        }

        async fn indicator(
            &self,
            symbol: &Symbol,
            _kind: IndicatorKind,
            _range: RangeToken,
        ) -> Option<Vec<IndicatorPoint>> {
            self.indicator_calls.fetch_add(1, Ordering::SeqCst);
            self.stall_if_slow(symbol).await;
            Some(vec![IndicatorPoint {
                date: "2024-01-03".parse().unwrap(),
                value: 54.2,
            }])
        }

        async fn prediction(&self, symbol: &Symbol, _range: RangeToken) -> Option<Prediction> {
            self.prediction_calls.fetch_add(1, Ordering::SeqCst);
            self.stall_if_slow(symbol).await;
            Some(Prediction {
                available: true,
                trend: TrendLabel::Bullish,
                confidence: 64.0,
                top_features: vec![PredictionFeature {
                    name: "RSI_14".to_string(),
                    importance: 31.5,
                }],
            })
        }
    }

    fn detail_with(source: &Arc<FakeSource>, debounce: Duration) -> SymbolDetail {
        SymbolDetail::new(Arc::clone(source) as Arc<dyn DetailSource>, debounce)
    }

    #[tokio::test]
    async fn test_load_symbol_memoizes_responses() {
        let source = Arc::new(FakeSource::default());
        let detail = detail_with(&source, Duration::from_millis(1));

        let first = detail.load_symbol(Symbol::from("ACB")).await.unwrap();
        assert_eq!(first.range, RangeToken::All);
        assert_eq!(first.indicator_kind, IndicatorKind::Rsi);
        assert!(first.summary.is_some());
        assert_eq!(first.prices.as_ref().map(Vec::len), Some(2));

        let second = detail.load_symbol(Symbol::from("ACB")).await.unwrap();
        assert_eq!(second, first);

        assert_eq!(source.summary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.indicator_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.prediction_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_range_click_fetches_once() {
        let source = Arc::new(FakeSource::default());
        let detail = detail_with(&source, Duration::from_millis(30));
        detail.load_symbol(Symbol::from("ACB")).await.unwrap();

        let racer = tokio::spawn({
            let detail = detail.clone();
            async move { detail.change_range(RangeToken::ThreeMonths).await }
        });
        sleep(Duration::from_millis(5)).await;

        // Second click on the already-active range: guard refuses immediately.
        assert_eq!(detail.change_range(RangeToken::ThreeMonths).await, None);

        let view = racer.await.unwrap().unwrap();
        assert_eq!(view.range, RangeToken::ThreeMonths);
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rapid_range_switches_fetch_only_the_last() {
        let source = Arc::new(FakeSource::default());
        let detail = detail_with(&source, Duration::from_millis(30));
        detail.load_symbol(Symbol::from("ACB")).await.unwrap();

        let superseded = tokio::spawn({
            let detail = detail.clone();
            async move { detail.change_range(RangeToken::ThreeMonths).await }
        });
        sleep(Duration::from_millis(5)).await;

        let view = detail.change_range(RangeToken::SixMonths).await.unwrap();
        assert_eq!(view.range, RangeToken::SixMonths);
        assert_eq!(superseded.await.unwrap(), None);

        // One series fetch for the initial load, one for the surviving switch.
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_summary_retries_while_series_stays_memoized() {
        let source = Arc::new(FakeSource::default());
        source.fail_summary.store(true, Ordering::SeqCst);
        let detail = detail_with(&source, Duration::from_millis(1));

        let degraded = detail.load_symbol(Symbol::from("ACB")).await.unwrap();
        assert!(degraded.summary.is_none());
        assert!(degraded.prices.is_some());

        source.fail_summary.store(false, Ordering::SeqCst);
        let recovered = detail.load_symbol(Symbol::from("ACB")).await.unwrap();
        assert!(recovered.summary.is_some());

        assert_eq!(source.summary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_newer_selection_discards_stale_completion() {
        let source = Arc::new(FakeSource::default());
        *source.slow_symbol.lock() = Some(Symbol::from("ACB"));
        let detail = detail_with(&source, Duration::from_millis(1));

        let stale = tokio::spawn({
            let detail = detail.clone();
            async move { detail.load_symbol(Symbol::from("ACB")).await }
        });
        sleep(Duration::from_millis(10)).await;

        let current = detail.load_symbol(Symbol::from("ZXY")).await.unwrap();
        assert_eq!(current.symbol, Symbol::from("ZXY"));

        assert_eq!(stale.await.unwrap(), None);
        assert_eq!(detail.selected_symbol(), Some(Symbol::from("ZXY")));

        // Nothing of the stale load leaked into the cache: the current view
        // still answers from memoized data without new fetches.
        let calls_before = source.price_calls.load(Ordering::SeqCst);
        detail.load_symbol(Symbol::from("ZXY")).await.unwrap();
        assert_eq!(source.price_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_switch_indicator_fetches_only_that_series() {
        let source = Arc::new(FakeSource::default());
        let detail = detail_with(&source, Duration::from_millis(1));
        detail.load_symbol(Symbol::from("ACB")).await.unwrap();

        let view = detail.switch_indicator(IndicatorKind::Macd).await.unwrap();
        assert_eq!(view.indicator_kind, IndicatorKind::Macd);
        assert_eq!(source.indicator_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.prediction_calls.load(Ordering::SeqCst), 1);

        // Same indicator again: guard refuses without a fetch.
        assert_eq!(detail.switch_indicator(IndicatorKind::Macd).await, None);
        assert_eq!(source.indicator_calls.load(Ordering::SeqCst), 2);

        // Back to a memoized indicator: no refetch.
        let back = detail.switch_indicator(IndicatorKind::Rsi).await.unwrap();
        assert_eq!(back.indicator_kind, IndicatorKind::Rsi);
        assert_eq!(source.indicator_calls.load(Ordering::SeqCst), 2);
    }
}
