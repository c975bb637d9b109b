use std::ops::RangeInclusive;

/// What a pagination step wants fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFetch {
    pub page: u32,
    pub limit: u32,
    pub query: String,
}

/// Tracks the visible catalogue page, the active search query and whether more
/// pages exist past the current one.
///
/// Every navigation method mutates this state first and then reports whether a
/// fetch is warranted; a refused or failed fetch does not roll the state back,
/// matching how the dashboard recovers on the next successful page load.
#[derive(Clone, Debug)]
pub struct PaginationController {
    page: u32,
    page_size: u32,
    query: String,
    has_more: bool,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size,
            query: String::new(),
            has_more: true,
        }
    }

    /// Jump to `page`. Returns `None` when already there; no fetch is owed.
    pub fn goto_page(&mut self, page: u32) -> Option<PageFetch> {
        if page == self.page {
            return None;
        }
        self.page = page;
        Some(self.current_fetch())
    }

    /// Advance one page. Blocked once the backend reported the end.
    pub fn next_page(&mut self) -> Option<PageFetch> {
        if !self.has_more {
            return None;
        }
        self.page += 1;
        Some(self.current_fetch())
    }

    /// Step back one page. Blocked on the first page.
    pub fn previous_page(&mut self) -> Option<PageFetch> {
        if self.page == 0 {
            return None;
        }
        self.page -= 1;
        Some(self.current_fetch())
    }

    /// Return to the first page and assume more pages exist until a response
    /// says otherwise.
    pub fn reset(&mut self) -> PageFetch {
        self.page = 0;
        self.has_more = true;
        self.current_fetch()
    }

    /// Apply a new search query and restart at page zero.
    ///
    /// Returns `None` only when both the new and the old query are empty.
    /// Re-submitting the same non-empty query still refetches; clearing a
    /// previous query refetches the unfiltered catalogue.
    pub fn apply_query(&mut self, query: impl Into<String>) -> Option<PageFetch> {
        let query = query.into();
        if query.is_empty() && self.query.is_empty() {
            return None;
        }
        self.query = query;
        Some(self.reset())
    }

    /// Absorb a page response: `items_len` items and the backend's `has_more`
    /// claim, which is inferred from a full page when absent. An empty page
    /// always marks the end.
    pub fn apply_page(&mut self, items_len: usize, has_more: Option<bool>) {
        self.has_more = if items_len == 0 {
            false
        } else {
            has_more.unwrap_or(items_len >= self.page_size as usize)
        };
    }

    /// Page numbers worth offering as direct jumps: a five-page window centred
    /// on the current page, clamped to zero and pinned to the end once the
    /// backend reported no further pages.
    pub fn page_window(&self) -> RangeInclusive<u32> {
        let mut start = self.page.saturating_sub(2);
        let mut end = start + 4;

        if !self.has_more {
            end = self.page;
            start = end.saturating_sub(4);
        } else if self.page < 2 {
            end = 4;
        }

        start..=end
    }

    pub fn can_go_next(&self) -> bool {
        self.has_more
    }

    pub fn can_go_previous(&self) -> bool {
        self.page > 0
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Fetch parameters for the current state, without mutating anything.
    pub fn current_fetch(&self) -> PageFetch {
        PageFetch {
            page: self.page,
            limit: self.page_size,
            query: self.query.clone(),
        }
    }
}
