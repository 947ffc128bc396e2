//! Temporal buffering and per-track state management.
//!
//! [`TemporalBuffer`] is a fixed-horizon, append-only ring of timestamped
//! samples: pushes evict everything older than the horizon, window queries
//! return samples oldest-first. [`TrackStore`] is the arena of per-track
//! agent state with create-on-first-sight and timer-driven retirement; a
//! track that reappears after retirement starts from fresh state.

use std::collections::{HashMap, VecDeque};

use crate::domain::TrackId;

/// Fixed-horizon ring of timestamped samples for one track.
#[derive(Debug, Clone)]
pub struct TemporalBuffer<T> {
    horizon_secs: f64,
    samples: VecDeque<(f64, T)>,
}

impl<T> TemporalBuffer<T> {
    /// Create a buffer retaining samples for `horizon_secs`.
    pub fn new(horizon_secs: f64) -> Self {
        Self {
            horizon_secs,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample and evict everything older than the horizon.
    /// Amortized O(1).
    pub fn push(&mut self, timestamp: f64, sample: T) {
        self.samples.push_back((timestamp, sample));
        let cutoff = timestamp - self.horizon_secs;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Samples within the last `duration` seconds, oldest first.
    /// Empty when no sample qualifies.
    pub fn window(&self, duration: f64) -> impl Iterator<Item = &(f64, T)> {
        let cutoff = self
            .samples
            .back()
            .map(|(ts, _)| ts - duration)
            .unwrap_or(f64::NEG_INFINITY);
        self.samples.iter().filter(move |(ts, _)| *ts >= cutoff)
    }

    /// All retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(f64, T)> {
        self.samples.iter()
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&(f64, T)> {
        self.samples.back()
    }

    /// Oldest retained sample.
    pub fn oldest(&self) -> Option<&(f64, T)> {
        self.samples.front()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds spanned by the retained samples.
    pub fn span_secs(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some((first, _)), Some((last, _))) => last - first,
            _ => 0.0,
        }
    }

    /// True once the retained span covers the full horizon (within one
    /// typical frame interval of slack).
    pub fn is_full(&self) -> bool {
        self.span_secs() >= self.horizon_secs * 0.95
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Per-track state entry with its last-seen timestamp.
#[derive(Debug, Clone)]
struct TrackEntry<S> {
    state: S,
    last_seen: f64,
}

/// Arena of per-track agent state.
///
/// State is created on first sight of a track identifier and discarded when
/// the track has not been seen for the retirement timeout. Reappearance
/// after retirement yields fresh state with no carried-over history.
#[derive(Debug, Clone)]
pub struct TrackStore<S> {
    retire_timeout_secs: f64,
    entries: HashMap<TrackId, TrackEntry<S>>,
}

impl<S> TrackStore<S> {
    /// Create a store that retires tracks unseen for `retire_timeout_secs`.
    pub fn new(retire_timeout_secs: f64) -> Self {
        Self {
            retire_timeout_secs,
            entries: HashMap::new(),
        }
    }

    /// State for a track, created with `init` on first sight. Updates the
    /// track's last-seen timestamp.
    pub fn entry_or_insert_with(
        &mut self,
        track: TrackId,
        now: f64,
        init: impl FnOnce() -> S,
    ) -> &mut S {
        let entry = self.entries.entry(track).or_insert_with(|| TrackEntry {
            state: init(),
            last_seen: now,
        });
        entry.last_seen = entry.last_seen.max(now);
        &mut entry.state
    }

    /// State for a track without touching the last-seen timestamp.
    pub fn get_mut(&mut self, track: TrackId) -> Option<&mut S> {
        self.entries.get_mut(&track).map(|e| &mut e.state)
    }

    /// Shared access to a track's state.
    pub fn get(&self, track: TrackId) -> Option<&S> {
        self.entries.get(&track).map(|e| &e.state)
    }

    /// Seconds since the track was last seen, if it is known.
    pub fn idle_secs(&self, track: TrackId, now: f64) -> Option<f64> {
        self.entries.get(&track).map(|e| now - e.last_seen)
    }

    /// Remove one track's state.
    pub fn remove(&mut self, track: TrackId) -> Option<S> {
        self.entries.remove(&track).map(|e| e.state)
    }

    /// Discard state for every track unseen for the retirement timeout,
    /// returning the retired identifiers with their state.
    pub fn retire_stale(&mut self, now: f64) -> Vec<(TrackId, S)> {
        let timeout = self.retire_timeout_secs;
        let stale: Vec<TrackId> = self
            .entries
            .iter()
            .filter(|(_, e)| now - e.last_seen > timeout)
            .map(|(id, _)| *id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|e| (id, e.state)))
            .collect()
    }

    /// Iterate over all live tracks.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TrackId, &mut S)> {
        self.entries.iter_mut().map(|(id, e)| (*id, &mut e.state))
    }

    /// Number of live tracks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no track is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all per-track state.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_past_horizon() {
        let mut buf = TemporalBuffer::new(2.0);
        for i in 0..100 {
            buf.push(i as f64 * 0.1, i);
        }

        // 10.0s of data pushed, only the last 2.0s retained
        let (oldest_ts, _) = buf.oldest().unwrap();
        assert!(*oldest_ts >= 9.9 - 2.0);
        assert!(buf.span_secs() <= 2.0 + 1e-9);
    }

    #[test]
    fn test_window_is_oldest_first_and_bounded() {
        let mut buf = TemporalBuffer::new(10.0);
        for i in 0..50 {
            buf.push(i as f64 * 0.1, i);
        }

        let window: Vec<i32> = buf.window(1.0).map(|(_, v)| *v).collect();
        assert!(window.windows(2).all(|w| w[0] < w[1]));
        // 1.0s at 10 samples/s inclusive of both endpoints
        assert_eq!(window.len(), 11);
    }

    #[test]
    fn test_window_empty_buffer() {
        let buf: TemporalBuffer<i32> = TemporalBuffer::new(5.0);
        assert_eq!(buf.window(1.0).count(), 0);
        assert!(!buf.is_full());
    }

    #[test]
    fn test_is_full_tracks_span() {
        let mut buf = TemporalBuffer::new(1.0);
        buf.push(0.0, 0);
        assert!(!buf.is_full());
        buf.push(0.5, 1);
        assert!(!buf.is_full());
        buf.push(1.0, 2);
        assert!(buf.is_full());
    }

    #[test]
    fn test_track_store_creates_on_first_sight() {
        let mut store: TrackStore<u32> = TrackStore::new(5.0);
        *store.entry_or_insert_with(TrackId(1), 0.0, || 0) += 1;
        *store.entry_or_insert_with(TrackId(1), 1.0, || 0) += 1;
        assert_eq!(store.get(TrackId(1)), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_track_store_retires_stale() {
        let mut store: TrackStore<&str> = TrackStore::new(5.0);
        store.entry_or_insert_with(TrackId(1), 0.0, || "a");
        store.entry_or_insert_with(TrackId(2), 4.0, || "b");

        let retired = store.retire_stale(6.0);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].0, TrackId(1));
        assert!(store.get(TrackId(1)).is_none());
        assert!(store.get(TrackId(2)).is_some());
    }

    #[test]
    fn test_reappearance_after_retirement_is_fresh() {
        let mut store: TrackStore<u32> = TrackStore::new(5.0);
        *store.entry_or_insert_with(TrackId(1), 0.0, || 0) = 99;
        store.retire_stale(10.0);

        let state = store.entry_or_insert_with(TrackId(1), 11.0, || 0);
        assert_eq!(*state, 0);
    }
}
