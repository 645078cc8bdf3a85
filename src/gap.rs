//! Gap tracking for burst-read repair.
//!
//! The source keeps an ordered list (`read_gaps`)
//! plus a parallel dict keyed by the `(offset, length)` pair
//! (`read_gap_times`). Here a single ordered container of
//! `{offset, length, last_sent}` records replaces both; pair-identity lookups
//! become linear scans by `(offset, length)`, which is fine at the small
//! backlog sizes this protocol ever reaches (`max_backlog` defaults to 5).

use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapKey {
    pub offset: u32,
    pub length: u8,
}

#[derive(Debug, Clone)]
struct GapEntry {
    key: GapKey,
    last_sent: Option<Instant>,
}

/// Ordered set of not-yet-filled byte ranges in the read sink's prefix.
#[derive(Debug, Default)]
pub struct GapList {
    entries: VecDeque<GapEntry>,
}

impl GapList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Insert a new gap at the tail with last_sent = None ("never sent").
    pub fn push(&mut self, key: GapKey) {
        self.entries.push_back(GapEntry {
            key,
            last_sent: None,
        });
    }

    /// Remove the exact gap `(offset, length)` if present. Returns whether it
    /// was found.
    pub fn remove_exact(&mut self, key: GapKey) -> bool {
        if let Some(idx) = self.entries.iter().position(|e| e.key == key) {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    /// Move the gap to the tail and stamp its last-sent time, incrementing
    /// the caller's backlog counter. Returns the gap's key, or `None` if the
    /// list is empty.
    pub fn send_head(&mut self, now: Instant) -> Option<GapKey> {
        let entry = self.entries.pop_front()?;
        let key = entry.key;
        self.entries.push_back(GapEntry {
            key,
            last_sent: Some(now),
        });
        Some(key)
    }

    pub fn head(&self) -> Option<GapKey> {
        self.entries.front().map(|e| e.key)
    }

    pub fn head_last_sent(&self) -> Option<Option<Instant>> {
        self.entries.front().map(|e| e.last_sent)
    }

    /// Reset the head gap's last-sent time to "never sent" (offset, in the
    /// source, of `self.read_gap_times[g] = 0`).
    pub fn reset_head_last_sent(&mut self) {
        if let Some(e) = self.entries.front_mut() {
            e.last_sent = None;
        }
    }

    /// All gaps that have never been sent (last_sent == None), in order.
    pub fn unsent(&self) -> Vec<GapKey> {
        self.entries
            .iter()
            .filter(|e| e.last_sent.is_none())
            .map(|e| e.key)
            .collect()
    }

    /// Mark a specific gap (by key) as sent now, moving it to the tail.
    pub fn mark_sent(&mut self, key: GapKey, now: Instant) {
        if let Some(idx) = self.entries.iter().position(|e| e.key == key) {
            let mut entry = self.entries.remove(idx).unwrap();
            entry.last_sent = Some(now);
            self.entries.push_back(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_remove_exact() {
        let mut gaps = GapList::new();
        let k = GapKey {
            offset: 80,
            length: 80,
        };
        gaps.push(k);
        assert_eq!(gaps.len(), 1);
        assert!(gaps.remove_exact(k));
        assert!(gaps.is_empty());
    }

    #[test]
    fn remove_exact_missing_is_false() {
        let mut gaps = GapList::new();
        assert!(!gaps.remove_exact(GapKey {
            offset: 0,
            length: 1
        }));
    }

    #[test]
    fn unsent_only_lists_never_sent_gaps() {
        let mut gaps = GapList::new();
        gaps.push(GapKey {
            offset: 0,
            length: 10,
        });
        gaps.push(GapKey {
            offset: 10,
            length: 10,
        });
        let now = Instant::now();
        gaps.mark_sent(
            GapKey {
                offset: 0,
                length: 10,
            },
            now,
        );
        let unsent = gaps.unsent();
        assert_eq!(
            unsent,
            vec![GapKey {
                offset: 10,
                length: 10
            }]
        );
    }
}
