//! Pending URLs, the seen set, and the page budget for one crawl run.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

/// Normalize a URL into the frontier's dedup key.
///
/// Only absolute `http`/`https` URLs are admissible. The fragment is dropped;
/// scheme and host case and default ports are normalized by the parser.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

/// A URL claimed for processing, with its position in the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub url: String,
    /// 1-based dispatch counter; never exceeds the page budget.
    pub ordinal: usize,
}

/// Outcome of asking the frontier for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    Next(Dispatch),
    /// No pending URL right now.
    Empty,
    /// The page budget is spent; nothing more will be dispatched.
    BudgetExhausted,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<String>,
    seen: HashSet<String>,
    dispatched: usize,
}

/// FIFO work queue with dedup and the authoritative page budget.
///
/// URLs are marked seen when they are enqueued, so the same link discovered
/// concurrently from two pages is queued once. The dispatch counter is
/// incremented under the same lock as the pop, so concurrent callers can
/// never claim more than `max_pages` dispatches.
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    max_pages: usize,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            max_pages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add the initial URLs, skipping any already seen. Returns how many
    /// were queued.
    pub fn seed<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_all(urls)
    }

    /// Queue newly discovered URLs that have not been seen before. Returns
    /// how many were queued.
    pub fn enqueue_discovered<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_all(urls)
    }

    fn push_all<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut added = 0;
        for raw in urls {
            let Some(url) = normalize_url(raw.as_ref()) else {
                tracing::debug!(url = raw.as_ref(), "Dropping non-http(s) or malformed URL");
                continue;
            };
            if state.seen.insert(url.clone()) {
                state.queue.push_back(url);
                added += 1;
            }
        }
        added
    }

    /// Record a URL as seen without queueing it.
    pub fn mark_seen(&self, raw: &str) -> bool {
        match normalize_url(raw) {
            Some(url) => self.lock().seen.insert(url),
            None => false,
        }
    }

    /// Pop the next URL and claim a dispatch slot for it.
    pub fn dequeue(&self) -> Dequeue {
        let mut state = self.lock();
        if state.dispatched >= self.max_pages {
            return Dequeue::BudgetExhausted;
        }
        match state.queue.pop_front() {
            Some(url) => {
                state.dispatched += 1;
                Dequeue::Next(Dispatch {
                    url,
                    ordinal: state.dispatched,
                })
            }
            None => Dequeue::Empty,
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn dispatched(&self) -> usize {
        self.lock().dispatched
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn seen(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_budget_exhausted(&self) -> bool {
        self.lock().dispatched >= self.max_pages
    }
}
