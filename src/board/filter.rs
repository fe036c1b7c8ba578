//! Filter engine: which cards of the board are visible.
//!
//! Filters compose with logical AND and never touch the store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use super::models::{Card, CardId};
use super::status::{Priority, StatusKey};
use super::store::BoardStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechnicianFilter {
    Assigned(String),
    Unassigned,
}

/// Inclusive date range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFilters<S> {
    pub technician: Option<TechnicianFilter>,
    /// Empty means every priority.
    pub priorities: BTreeSet<Priority>,
    /// Empty means every status.
    pub statuses: BTreeSet<S>,
    /// Matched case-insensitively against customer, description and claim number.
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
}

impl<S> Default for BoardFilters<S> {
    fn default() -> Self {
        Self {
            technician: None,
            priorities: BTreeSet::new(),
            statuses: BTreeSet::new(),
            search: None,
            date_range: None,
        }
    }
}

impl<S: StatusKey> BoardFilters<S> {
    pub fn is_empty(&self) -> bool {
        self.technician.is_none()
            && self.priorities.is_empty()
            && self.statuses.is_empty()
            && self.search_term().is_none()
            && self.date_range.is_none()
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, card: &Card<S>) -> bool {
        self.matches_with_term(card, self.search_term().as_deref())
    }

    fn matches_with_term(&self, card: &Card<S>, term: Option<&str>) -> bool {
        if let Some(ref technician) = self.technician {
            let assigned = card.assigned_technician_id.as_deref();
            let ok = match technician {
                TechnicianFilter::Assigned(id) => assigned == Some(id.as_str()),
                TechnicianFilter::Unassigned => assigned.is_none(),
            };
            if !ok {
                return false;
            }
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&card.priority) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&card.status) {
            return false;
        }
        if let Some(term) = term {
            let hit = [&card.customer_name, &card.description, &card.claim_number]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(term));
            if !hit {
                return false;
            }
        }
        if let Some(range) = self.date_range {
            match card.effective_date() {
                Some(date) if range.contains(date) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Ids of the cards that pass every filter.
pub fn visible_cards<S: StatusKey>(store: &BoardStore<S>, filters: &BoardFilters<S>) -> BTreeSet<CardId> {
    let term = filters.search_term();
    store
        .cards()
        .filter(|card| filters.matches_with_term(card, term.as_deref()))
        .map(|card| card.id.clone())
        .collect()
}

/// Debounces free-text search input: only the last value typed within the
/// delay window settles.
#[derive(Debug, Clone)]
pub struct SearchDebouncer {
    delay: Duration,
    latest: Arc<AtomicU64>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait out the debounce window. Returns the text if no newer input
    /// arrived in the meantime, `None` if it was superseded.
    pub async fn settle(&self, text: String) -> Option<String> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        (self.latest.load(Ordering::SeqCst) == ticket).then_some(text)
    }
}
