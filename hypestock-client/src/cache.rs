use crate::types::{
    IndicatorKind, IndicatorPoint, Prediction, PricePoint, RangeToken, StockSummary, Symbol,
};
use fnv::FnvHashMap;

/// Token minted by [`SymbolCache::select`], identifying one symbol selection.
///
/// Fetches capture the epoch when they start and present it when storing; a
/// selection change in between invalidates the token and the result is dropped
/// instead of polluting the new symbol's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionEpoch(u64);

/// Response cache for the currently selected symbol.
///
/// One symbol's data lives here at a time. Responses are memoized per range
/// (and per indicator kind); a failed fetch stores nothing, so the next view of
/// that range retries. An empty series is a real response and is kept.
#[derive(Clone, Debug, Default)]
pub struct SymbolCache {
    symbol: Option<Symbol>,
    epoch: u64,
    summary: Option<StockSummary>,
    prices: FnvHashMap<RangeToken, Vec<PricePoint>>,
    indicators: FnvHashMap<(IndicatorKind, RangeToken), Vec<IndicatorPoint>>,
    predictions: FnvHashMap<RangeToken, Prediction>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `symbol` the cached symbol and return the epoch for its fetches.
    ///
    /// Re-selecting the current symbol keeps every memoized response and the
    /// epoch; selecting a different one drops them all and mints a new epoch.
    pub fn select(&mut self, symbol: Symbol) -> SelectionEpoch {
        if self.symbol.as_ref() != Some(&symbol) {
            self.summary = None;
            self.prices.clear();
            self.indicators.clear();
            self.predictions.clear();
            self.symbol = Some(symbol);
            self.epoch += 1;
        }
        SelectionEpoch(self.epoch)
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    pub fn epoch(&self) -> SelectionEpoch {
        SelectionEpoch(self.epoch)
    }

    pub fn summary(&self) -> Option<&StockSummary> {
        self.summary.as_ref()
    }

    pub fn prices(&self, range: RangeToken) -> Option<&[PricePoint]> {
        self.prices.get(&range).map(Vec::as_slice)
    }

    pub fn indicator(&self, kind: IndicatorKind, range: RangeToken) -> Option<&[IndicatorPoint]> {
        self.indicators.get(&(kind, range)).map(Vec::as_slice)
    }

    pub fn prediction(&self, range: RangeToken) -> Option<&Prediction> {
        self.predictions.get(&range)
    }

    /// Store the summary, unless `epoch` is stale. Returns whether it stuck.
    pub fn store_summary(&mut self, epoch: SelectionEpoch, summary: StockSummary) -> bool {
        if epoch.0 != self.epoch {
            return false;
        }
        self.summary = Some(summary);
        true
    }

    pub fn store_prices(
        &mut self,
        epoch: SelectionEpoch,
        range: RangeToken,
        points: Vec<PricePoint>,
    ) -> bool {
        if epoch.0 != self.epoch {
            return false;
        }
        self.prices.insert(range, points);
        true
    }

    pub fn store_indicator(
        &mut self,
        epoch: SelectionEpoch,
        kind: IndicatorKind,
        range: RangeToken,
        points: Vec<IndicatorPoint>,
    ) -> bool {
        if epoch.0 != self.epoch {
            return false;
        }
        self.indicators.insert((kind, range), points);
        true
    }

    pub fn store_prediction(
        &mut self,
        epoch: SelectionEpoch,
        range: RangeToken,
        prediction: Prediction,
    ) -> bool {
        if epoch.0 != self.epoch {
            return false;
        }
        self.predictions.insert(range, prediction);
        true
    }
}
