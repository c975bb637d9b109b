use chrono::NaiveDate;
use hypestock_client::protocol::StockPage;
use hypestock_client::types::{StockListItem, Symbol};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

/// Number of instruments in the generated catalogue.
pub const CATALOG_SIZE: usize = 150;

const SECTORS: [&str; 4] = ["Tech", "Finance", "Health", "Energy"];

/// In-memory stock catalogue, sorted by code.
///
/// The catalogue is generated once at startup from a seed, so every instance
/// started with the same seed serves an identical universe. Lookups and page
/// slicing borrow from the sorted backing `Vec`.
#[derive(Debug)]
pub struct Catalog {
    stocks: Vec<StockListItem>,
}

impl Catalog {
    /// Generate a deterministic mock catalogue from `seed`.
    ///
    /// Codes take the `AA?` shape: the first two letters enumerate AA, AB, AC,
    /// .. in order and the third is drawn at random, eg/ "ACB". Every company
    /// is named after its code.
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let start_date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");
        let end_date = NaiveDate::from_ymd_opt(2024, 2, 14).expect("valid date");

        let mut stocks: Vec<StockListItem> = (0..CATALOG_SIZE)
            .map(|index| {
                let code = format!(
                    "{}{}{}",
                    char::from(b'A' + (index / 26) as u8),
                    char::from(b'A' + (index % 26) as u8),
                    char::from(b'A' + rng.random_range(0..26u8)),
                );

                StockListItem {
                    stock_code: Symbol::new(code.as_str()),
                    company_name: format!("Mock Company {}", code),
                    sector: SECTORS.choose(&mut rng).map(|sector| sector.to_string()),
                    start_date,
                    end_date,
                    trading_days: rng.random_range(500..=5500),
                }
            })
            .collect();

        stocks.sort_by(|a, b| a.stock_code.cmp(&b.stock_code));

        Self { stocks }
    }

    /// Slice one page out of the catalogue, filtered by `query`.
    ///
    /// A non-empty query keeps entries whose code or company name contains it,
    /// case-insensitively. `total` counts the filtered set, and `has_more` is
    /// true while a further page exists beyond this one.
    pub fn page(&self, page: u32, limit: u32, query: &str) -> StockPage {
        let query = query.to_lowercase();
        let filtered: Vec<&StockListItem> = self
            .stocks
            .iter()
            .filter(|item| {
                query.is_empty()
                    || item.stock_code.as_str().to_lowercase().contains(&query)
                    || item.company_name.to_lowercase().contains(&query)
            })
            .collect();

        let start_index = page as usize * limit as usize;
        let end_index = start_index + limit as usize;
        let items: Vec<StockListItem> = filtered
            .iter()
            .skip(start_index)
            .take(limit as usize)
            .map(|item| (*item).clone())
            .collect();

        StockPage {
            request_id: None,
            items,
            total: Some(filtered.len() as u64),
            has_more: Some(end_index < filtered.len()),
        }
    }

    /// Look up a catalogue entry by code.
    pub fn get(&self, symbol: &Symbol) -> Option<&StockListItem> {
        self.stocks
            .binary_search_by(|item| item.stock_code.as_str().cmp(symbol.as_str()))
            .ok()
            .map(|index| &self.stocks[index])
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StockListItem> {
        self.stocks.iter()
    }
}
