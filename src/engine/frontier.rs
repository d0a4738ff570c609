//! Breadth-first crawl frontier
//!
//! A FIFO queue of discovered URLs plus the set of URLs already attempted.
//! The visited set only grows; it is the sole deduplication mechanism, so
//! the same URL may sit in the queue several times and is dropped when
//! dequeued after its first attempt.

use std::collections::{HashSet, VecDeque};

/// A URL waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    /// The URL to fetch
    pub url: String,

    /// Link distance from the seed (0 for the seed itself)
    pub depth: u32,

    /// The page this URL was found on
    pub parent_url: Option<String>,
}

/// Work queue and visited set for one job
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedUrl>,
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates a frontier holding only the seed at depth 0
    pub fn new(seed_url: &str) -> Self {
        let mut frontier = Self::default();
        frontier.queue.push_back(QueuedUrl {
            url: seed_url.to_string(),
            depth: 0,
            parent_url: None,
        });
        frontier
    }

    /// Removes the oldest queued URL
    pub fn pop(&mut self) -> Option<QueuedUrl> {
        self.queue.pop_front()
    }

    /// Records `url` as attempted
    ///
    /// Returns false if it was already visited.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if self.visited.contains(url) {
            return false;
        }
        self.visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Appends every not-yet-visited URL at `depth`, in the given order
    ///
    /// Returns the number of URLs queued.
    pub fn enqueue_links<I>(&mut self, urls: I, depth: u32, parent_url: &str) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.queue.len();
        for url in urls {
            if self.visited.contains(&url) {
                continue;
            }
            self.queue.push_back(QueuedUrl {
                url,
                depth,
                parent_url: Some(parent_url.to_string()),
            });
        }
        self.queue.len() - before
    }

    /// Number of queued entries, duplicates included
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}
