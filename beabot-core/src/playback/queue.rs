//! Bounded track queue and play history
//!
//! The queue holds upcoming tracks only; the active track lives in the
//! session. Both structures are plain data owned by a single session task,
//! so no interior locking is needed.

use super::track::Track;
use crate::error::ValidationError;
use std::collections::VecDeque;

/// Default maximum queue length
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 100;

/// Default number of tracks kept in history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// FIFO queue of upcoming tracks with a hard capacity
#[derive(Debug, Clone)]
pub struct TrackQueue {
    entries: VecDeque<Track>,
    capacity: usize,
}

impl TrackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append to the back
    ///
    /// Returns the 1-based position of the new entry. Fails with `QueueFull`
    /// and leaves the queue untouched when at capacity.
    pub fn push_back(&mut self, track: Track) -> Result<usize, ValidationError> {
        self.check_capacity()?;
        self.entries.push_back(track);
        Ok(self.entries.len())
    }

    /// Insert at the front
    pub fn push_front(&mut self, track: Track) -> Result<(), ValidationError> {
        self.check_capacity()?;
        self.entries.push_front(track);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&Track> {
        self.entries.front()
    }

    /// Drop every entry before `index`, leaving entry `index` at the front
    ///
    /// Returns the number of dropped entries. Out-of-range indices fail and
    /// leave the queue untouched.
    pub fn discard_before(&mut self, index: usize) -> Result<usize, ValidationError> {
        if index >= self.entries.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.entries.drain(..index);
        Ok(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }

    fn check_capacity(&self) -> Result<(), ValidationError> {
        if self.is_full() {
            Err(ValidationError::QueueFull {
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_LENGTH)
    }
}

/// Previously played tracks, most recent last, oldest evicted first
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Track>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, track: Track) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(track);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beabot_common::SubjectId;

    fn create_test_track(name: &str) -> Track {
        Track::new(format!("/music/{}.mp3", name), name, SubjectId(1))
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn test_queue_creation() {
        let queue = TrackQueue::new(3);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.capacity(), 3);
    }

    #[test]
    fn test_push_back_reports_position() {
        let mut queue = TrackQueue::new(3);
        assert_eq!(queue.push_back(create_test_track("a")).unwrap(), 1);
        assert_eq!(queue.push_back(create_test_track("b")).unwrap(), 2);
        assert_eq!(queue.front().unwrap().title, "a");
    }

    #[test]
    fn test_push_beyond_capacity_fails_unchanged() {
        let mut queue = TrackQueue::new(2);
        queue.push_back(create_test_track("a")).unwrap();
        queue.push_back(create_test_track("b")).unwrap();

        let err = queue.push_back(create_test_track("c")).unwrap_err();
        assert_eq!(err, ValidationError::QueueFull { capacity: 2 });
        assert_eq!(titles(&queue.to_vec()), vec!["a", "b"]);

        let err = queue.push_front(create_test_track("d")).unwrap_err();
        assert_eq!(err, ValidationError::QueueFull { capacity: 2 });
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_discard_before() {
        let mut queue = TrackQueue::new(10);
        for name in ["a", "b", "c", "d"] {
            queue.push_back(create_test_track(name)).unwrap();
        }

        assert_eq!(queue.discard_before(2).unwrap(), 2);
        assert_eq!(titles(&queue.to_vec()), vec!["c", "d"]);

        // Index 0 drops nothing
        assert_eq!(queue.discard_before(0).unwrap(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_discard_before_out_of_range() {
        let mut queue = TrackQueue::new(10);
        queue.push_back(create_test_track("a")).unwrap();

        let err = queue.discard_before(1).unwrap_err();
        assert_eq!(err, ValidationError::IndexOutOfRange { index: 1, len: 1 });
        assert_eq!(queue.len(), 1);

        let mut empty = TrackQueue::new(10);
        assert!(empty.discard_before(0).is_err());
    }

    #[test]
    fn test_queue_clear() {
        let mut queue = TrackQueue::new(10);
        queue.push_back(create_test_track("a")).unwrap();
        queue.push_back(create_test_track("b")).unwrap();
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = History::new(2);
        history.push(create_test_track("a"));
        history.push(create_test_track("b"));
        history.push(create_test_track("c"));
        assert_eq!(titles(&history.to_vec()), vec!["b", "c"]);
    }

    #[test]
    fn test_history_zero_limit_keeps_nothing() {
        let mut history = History::new(0);
        history.push(create_test_track("a"));
        assert!(history.is_empty());
    }
}
