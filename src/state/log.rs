use serde::Serialize;
use std::collections::VecDeque;

/// Evicted keys remembered per slot of capacity
const EVICTED_PER_SLOT: usize = 4;

/// Newest-first history, capped and deduplicated by a stable key.
///
/// Keys pushed out by the cap are remembered for a while, so a late
/// redelivery of an evicted entry is still treated as a duplicate.
#[derive(Clone, Debug, Serialize)]
pub struct BoundedLog<T> {
    cap: usize,
    entries: VecDeque<(String, T)>,
    #[serde(skip)]
    evicted: VecDeque<String>,
}

impl<T> BoundedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: VecDeque::with_capacity(cap),
            evicted: VecDeque::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Whether `key` was held once and has since been pushed out
    pub fn was_evicted(&self, key: &str) -> bool {
        self.evicted.iter().any(|k| k == key)
    }

    /// Insert at the front. Returns false, leaving the log untouched, when
    /// `key` is present or was recently evicted. Evicts the oldest entry
    /// past the cap.
    pub fn insert(&mut self, key: impl Into<String>, item: T) -> bool {
        let key = key.into();
        if self.cap == 0 || self.contains(&key) || self.was_evicted(&key) {
            return false;
        }
        self.entries.push_front((key, item));
        while self.entries.len() > self.cap {
            if let Some((old, _)) = self.entries.pop_back() {
                self.evicted.push_front(old);
            }
        }
        self.evicted.truncate(self.cap * EVICTED_PER_SLOT);
        true
    }

    /// Load a newest-first history, as served alongside a REST seed.
    /// Returns how many entries were new.
    pub fn seed<I>(&mut self, newest_first: I) -> usize
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let items: Vec<(String, T)> = newest_first.into_iter().collect();
        let mut added = 0;
        for (key, item) in items.into_iter().rev() {
            if self.insert(key, item) {
                added += 1;
            }
        }
        added
    }

    /// Entries, newest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, item)| item)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn newest(&self) -> Option<&T> {
        self.entries.front().map(|(_, item)| item)
    }
}
