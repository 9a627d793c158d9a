//! Leaderboard Client
//!
//! Reads leaderboard pages from the Games ID service. There is no cache:
//! every page change is a fresh fetch.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::network::protocol::{LeaderboardEntry, LeaderboardPage};
use crate::network::upstream::{GamesIdApi, UpstreamError};

/// Leaderboard errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaderboardError {
    /// Page missing, unparsable or below 1.
    #[error("Invalid page number")]
    InvalidPage,

    /// The service answered without a body.
    #[error("Leaderboard page not found")]
    NotFound,

    /// The service could not be reached or answered with an error.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Parse a `page` query parameter.
pub fn parse_page_param(raw: Option<&str>) -> Result<i64, LeaderboardError> {
    let page: i64 = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(LeaderboardError::InvalidPage)?
        .parse()
        .map_err(|_| LeaderboardError::InvalidPage)?;
    if page < 1 {
        return Err(LeaderboardError::InvalidPage);
    }
    Ok(page)
}

/// Fetches leaderboard pages.
pub struct LeaderboardClient<A> {
    api: Arc<A>,
}

impl<A> Clone for LeaderboardClient<A> {
    fn clone(&self) -> Self {
        Self { api: self.api.clone() }
    }
}

impl<A: GamesIdApi> LeaderboardClient<A> {
    /// Create a client over `api`.
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Fetch one page. Pages below 1 are rejected without contacting the
    /// service.
    pub async fn fetch_page(&self, page: i64) -> Result<LeaderboardPage, LeaderboardError> {
        if page < 1 {
            return Err(LeaderboardError::InvalidPage);
        }
        let page = u32::try_from(page).map_err(|_| LeaderboardError::InvalidPage)?;

        debug!("Fetching leaderboard page {}", page);
        self.api
            .leaderboard_page(page)
            .await?
            .ok_or(LeaderboardError::NotFound)
    }
}

/// Proof that a fetch was started; only the latest one may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    page: u32,
}

impl FetchTicket {
    /// Page being fetched.
    pub fn page(&self) -> u32 {
        self.page
    }
}

/// Paginated leaderboard view.
#[derive(Debug, Clone)]
pub struct LeaderboardView {
    page: u32,
    total_pages: u32,
    entries: Vec<LeaderboardEntry>,
    loading: bool,
    generation: u64,
}

impl Default for LeaderboardView {
    fn default() -> Self {
        Self {
            page: 1,
            total_pages: 1,
            entries: Vec::new(),
            loading: false,
            generation: 0,
        }
    }
}

impl LeaderboardView {
    /// A view on page 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current page.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Total pages reported by the last fetch.
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Entries on the current page.
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Whether a fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether `next` would move.
    pub fn has_next(&self) -> bool {
        !self.entries.is_empty() && self.page < self.total_pages
    }

    /// Whether `previous` would move.
    pub fn has_previous(&self) -> bool {
        !self.entries.is_empty() && self.page > 1
    }

    /// Move to the next page. Returns the page to fetch.
    pub fn next(&mut self) -> Option<u32> {
        if !self.has_next() {
            return None;
        }
        self.page += 1;
        Some(self.page)
    }

    /// Move to the previous page. Returns the page to fetch.
    pub fn previous(&mut self) -> Option<u32> {
        if !self.has_previous() {
            return None;
        }
        self.page -= 1;
        Some(self.page)
    }

    /// Mark a fetch of the current page as started. Supersedes any earlier
    /// fetch.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.loading = true;
        FetchTicket {
            generation: self.generation,
            page: self.page,
        }
    }

    /// Land a fetch result. Returns false if the fetch was superseded.
    pub fn complete(&mut self, ticket: FetchTicket, result: Result<LeaderboardPage, LeaderboardError>) -> bool {
        if ticket.generation != self.generation {
            debug!("Dropping superseded leaderboard fetch of page {}", ticket.page);
            return false;
        }
        self.loading = false;
        match result {
            Ok(page) => {
                self.entries = page.data;
                self.total_pages = page.pagination.total_pages.max(1);
            }
            Err(e) => warn!("Error fetching leaderboard: {}", e),
        }
        true
    }

    /// Fetch the current page through `client`.
    pub async fn refresh<A: GamesIdApi>(&mut self, client: &LeaderboardClient<A>) -> bool {
        let ticket = self.begin_fetch();
        let result = client.fetch_page(i64::from(ticket.page)).await;
        self.complete(ticket, result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
