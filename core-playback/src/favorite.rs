//! Favorite tap debouncing.
//!
//! Each tap on a track restarts that track's window. When a window closes
//! without another tap, the engine writes the flag if the tap count is odd;
//! an even count returns the flag to where it started and nothing is written.
//! While a write is in flight its target value stands in for the stored flag.

use core_async::sync::{mpsc, CancellationToken};
use core_async::time::{sleep, Duration};
use std::collections::HashMap;

/// Sent when a track's debounce window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteFlush {
    pub track_id: String,
    pub generation: u64,
}

struct Pending {
    taps: u32,
    generation: u64,
    timer: CancellationToken,
}

pub struct FavoriteDebouncer {
    window: Duration,
    parent: CancellationToken,
    next_generation: u64,
    pending: HashMap<String, Pending>,
    writing: HashMap<String, bool>,
}

impl FavoriteDebouncer {
    pub fn new(window: Duration, parent: CancellationToken) -> Self {
        Self {
            window,
            parent,
            next_generation: 0,
            pending: HashMap::new(),
            writing: HashMap::new(),
        }
    }

    /// Register a tap and (re)arm the track's timer.
    pub fn tap(&mut self, track_id: &str, flushes: mpsc::UnboundedSender<FavoriteFlush>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let timer = self.parent.child_token();

        let taps = match self.pending.remove(track_id) {
            Some(previous) => {
                previous.timer.cancel();
                previous.taps + 1
            }
            None => 1,
        };
        self.pending.insert(
            track_id.to_string(),
            Pending {
                taps,
                generation,
                timer: timer.clone(),
            },
        );

        let flush = FavoriteFlush {
            track_id: track_id.to_string(),
            generation,
        };
        let window = self.window;
        core_async::task::spawn(async move {
            core_async::select! {
                biased;
                _ = timer.cancelled() => {}
                _ = sleep(window) => {
                    flushes.send(flush).ok();
                }
            }
        });
    }

    /// Settle a closed window. Returns whether a write is due.
    pub fn settle(&mut self, flush: &FavoriteFlush) -> bool {
        match self.pending.get(&flush.track_id) {
            Some(pending) if pending.generation == flush.generation => {
                let taps = pending.taps;
                self.pending.remove(&flush.track_id);
                taps % 2 == 1
            }
            _ => false,
        }
    }

    /// Whether taps still waiting on a window would flip the flag.
    pub fn is_flipped(&self, track_id: &str) -> bool {
        self.pending
            .get(track_id)
            .is_some_and(|pending| pending.taps % 2 == 1)
    }

    /// Record a write leaving for the catalog. Returns the value it stores.
    pub fn begin_write(&mut self, track_id: &str, stored: bool) -> bool {
        let value = !self.writing.get(track_id).copied().unwrap_or(stored);
        self.writing.insert(track_id.to_string(), value);
        value
    }

    /// Forget an in-flight write once the catalog has answered.
    pub fn finish_write(&mut self, track_id: &str, value: bool) {
        if self.writing.get(track_id) == Some(&value) {
            self.writing.remove(track_id);
        }
    }

    /// Apply in-flight writes and pending taps to a stored flag value.
    pub fn overlay(&self, track_id: &str, stored: bool) -> bool {
        let base = self.writing.get(track_id).copied().unwrap_or(stored);
        base ^ self.is_flipped(track_id)
    }

    /// Cancel every timer and return the tracks that still owe a write.
    pub fn drain(&mut self) -> Vec<String> {
        let mut due: Vec<String> = self
            .pending
            .drain()
            .filter_map(|(track_id, pending)| {
                pending.timer.cancel();
                (pending.taps % 2 == 1).then_some(track_id)
            })
            .collect();
        due.sort();
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer() -> FavoriteDebouncer {
        FavoriteDebouncer::new(Duration::from_millis(500), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn single_tap_flushes_after_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut favorites = debouncer();
        favorites.tap("a", tx);
        assert!(favorites.is_flipped("a"));

        let flush = rx.recv().await.unwrap();
        assert_eq!(flush.track_id, "a");
        assert!(favorites.settle(&flush));
        assert!(!favorites.is_flipped("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn even_taps_cancel_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut favorites = debouncer();
        favorites.tap("a", tx.clone());
        sleep(Duration::from_millis(200)).await;
        favorites.tap("a", tx);
        assert!(!favorites.is_flipped("a"));
        assert!(favorites.overlay("a", true));

        let flush = rx.recv().await.unwrap();
        assert!(!favorites.settle(&flush));
        // The first timer was cancelled, so only one flush arrives.
        sleep(Duration::from_millis(1_000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_flush_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut favorites = debouncer();
        favorites.tap("a", tx.clone());
        favorites.tap("a", tx.clone());
        favorites.tap("a", tx);

        let stale = FavoriteFlush {
            track_id: "a".to_string(),
            generation: 1,
        };
        assert!(!favorites.settle(&stale));
        assert!(favorites.is_flipped("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_reports_odd_counts_only() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut favorites = debouncer();
        favorites.tap("b", tx.clone());
        favorites.tap("a", tx.clone());
        favorites.tap("c", tx.clone());
        favorites.tap("c", tx);

        assert_eq!(favorites.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(!favorites.is_flipped("a"));
    }

    #[test]
    fn in_flight_write_holds_the_flag_until_answered() {
        let mut favorites = debouncer();
        assert!(favorites.begin_write("a", false));
        // The catalog still reports the old value.
        assert!(favorites.overlay("a", false));
        // A second write before the first lands flips from the in-flight value.
        assert!(!favorites.begin_write("a", false));
        assert!(!favorites.overlay("a", false));

        favorites.finish_write("a", true);
        assert!(!favorites.overlay("a", false));
        favorites.finish_write("a", false);
        assert!(!favorites.overlay("a", false));
        assert!(favorites.overlay("a", true));
    }
}
