use std::fmt;

/// Scan state of one category
///
/// ```text
/// NotStarted -> InProgress -> Exhausted
/// ```
///
/// A category is exhausted once no further pages will be issued for it.
/// Pages already in flight at that moment are still recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryState {
    /// No page has been issued yet
    NotStarted,

    /// Pages are being issued
    InProgress,

    /// No further pages will be issued
    Exhausted,
}

impl CategoryState {
    /// Returns true if no more pages will be issued
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Checks whether a transition to `next` is allowed
    pub fn can_transition_to(&self, next: CategoryState) -> bool {
        use CategoryState::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (NotStarted, Exhausted)
                | (InProgress, InProgress)
                | (InProgress, Exhausted)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for CategoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Why a category stopped issuing pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// This page returned zero cards
    EmptyPage(u32),

    /// The configured page cap was reached
    PageCap(u32),

    /// This many pages in a row failed
    TooManyFailures(u32),
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPage(page) => write!(f, "page {} had no cards", page),
            Self::PageCap(cap) => write!(f, "page cap {} reached", cap),
            Self::TooManyFailures(count) => write!(f, "{} consecutive page failures", count),
        }
    }
}

/// Page cursor and counters for one category
#[derive(Debug, Clone)]
pub struct CategoryProgress {
    pub state: CategoryState,

    /// Next page number to issue (1-based)
    pub next_page: u32,

    /// Pages issued but not yet reported
    pub in_flight: u32,

    pub pages_succeeded: u32,
    pub pages_failed: u32,

    /// Pages dropped mid-fetch by cancellation
    pub pages_abandoned: u32,

    pub consecutive_failures: u32,

    /// Cards extracted across all pages of this category
    pub cards_seen: u64,

    pub exhaust_reason: Option<ExhaustReason>,
}

impl CategoryProgress {
    pub fn new() -> Self {
        Self {
            state: CategoryState::NotStarted,
            next_page: 1,
            in_flight: 0,
            pages_succeeded: 0,
            pages_failed: 0,
            pages_abandoned: 0,
            consecutive_failures: 0,
            cards_seen: 0,
            exhaust_reason: None,
        }
    }

    /// Issues the next page number, or None once the category is exhausted
    pub fn issue(&mut self, max_pages: Option<u32>) -> Option<u32> {
        if self.state.is_terminal() {
            return None;
        }

        if let Some(cap) = max_pages {
            if self.next_page > cap {
                self.exhaust(ExhaustReason::PageCap(cap));
                return None;
            }
        }

        let page = self.next_page;
        self.next_page += 1;
        self.in_flight += 1;
        self.transition(CategoryState::InProgress);
        Some(page)
    }

    /// Records a fetched page and how many cards it held
    ///
    /// A page with zero cards ends the scan: no page after it is issued.
    pub fn record_success(&mut self, page: u32, cards: usize) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pages_succeeded += 1;
        self.consecutive_failures = 0;
        self.cards_seen += cards as u64;

        if cards == 0 {
            self.exhaust(ExhaustReason::EmptyPage(page));
        }
    }

    /// Records a page that failed after all retries
    pub fn record_failure(&mut self, max_consecutive_failures: u32) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pages_failed += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures >= max_consecutive_failures {
            self.exhaust(ExhaustReason::TooManyFailures(self.consecutive_failures));
        }
    }

    /// Records a page abandoned by cancellation
    pub fn record_abandoned(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pages_abandoned += 1;
    }

    /// Returns true once exhausted with nothing left in flight
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() && self.in_flight == 0
    }

    fn exhaust(&mut self, reason: ExhaustReason) {
        if self.state.is_terminal() {
            return;
        }
        self.exhaust_reason = Some(reason);
        self.transition(CategoryState::Exhausted);
    }

    fn transition(&mut self, next: CategoryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid category transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

impl Default for CategoryProgress {
    fn default() -> Self {
        Self::new()
    }
}
