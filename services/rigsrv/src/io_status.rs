//! Shared IO status snapshot
//!
//! The router publishes one decoded frame at a time; readers clone the `Arc`
//! and keep a whole frame for as long as they need it. A snapshot is never
//! mutated after publication.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rig_protocol::{PinLevels, NOT_INITIALIZED};

/// One decoded IO board frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSnapshot {
    levels: PinLevels,
    received_at: Instant,
}

impl IoSnapshot {
    pub fn new(levels: PinLevels) -> Self {
        Self {
            levels,
            received_at: Instant::now(),
        }
    }

    pub fn levels(&self) -> &PinLevels {
        &self.levels
    }

    pub fn is_high(&self, pin: usize) -> bool {
        self.levels.is_high(pin)
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match max_age {
            Some(max) => self.age() <= max,
            None => true,
        }
    }
}

impl fmt::Display for IoSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.levels, f)
    }
}

/// Read side of the IO status, as seen by interlocks and positioning machines
pub trait StatusSource: Send + Sync {
    /// Latest usable snapshot; `None` when uninitialized or stale
    fn current(&self) -> Option<Arc<IoSnapshot>>;
}

/// Process-wide IO status, replaced wholesale on every decoded frame
pub struct IoStatusStore {
    latest: RwLock<Option<Arc<IoSnapshot>>>,
    max_age: Option<Duration>,
}

impl IoStatusStore {
    /// `max_age = None` never treats a snapshot as stale
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            latest: RwLock::new(None),
            max_age,
        }
    }

    /// Publish a new frame, returning the one it replaces
    pub fn publish(&self, levels: PinLevels) -> Option<Arc<IoSnapshot>> {
        let snapshot = Arc::new(IoSnapshot::new(levels));
        self.latest.write().replace(snapshot)
    }

    /// Latest snapshot regardless of age
    pub fn latest(&self) -> Option<Arc<IoSnapshot>> {
        self.latest.read().clone()
    }

    /// Comma-joined pin levels, or the not-initialized sentinel
    pub fn render(&self) -> String {
        match self.latest() {
            Some(snapshot) => snapshot.to_string(),
            None => NOT_INITIALIZED.to_string(),
        }
    }
}

impl StatusSource for IoStatusStore {
    fn current(&self) -> Option<Arc<IoSnapshot>> {
        self.latest()
            .filter(|snapshot| snapshot.is_fresh(self.max_age))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn levels(bits: &[bool]) -> PinLevels {
        PinLevels::new(bits.to_vec())
    }

    #[test]
    fn test_starts_uninitialized() {
        let store = IoStatusStore::new(None);
        assert!(store.current().is_none());
        assert_eq!(store.render(), NOT_INITIALIZED);
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let store = IoStatusStore::new(None);
        assert!(store.publish(levels(&[true, false])).is_none());

        let held = store.current().unwrap();
        let previous = store.publish(levels(&[false, true])).unwrap();

        // A reader holding the old Arc still sees the old frame intact
        assert_eq!(held.levels(), previous.levels());
        assert_eq!(held.to_string(), "1,0");
        assert_eq!(store.render(), "0,1");
    }

    #[test]
    fn test_stale_snapshot_is_unavailable() {
        let store = IoStatusStore::new(Some(Duration::from_millis(1)));
        store.publish(levels(&[true]));
        std::thread::sleep(Duration::from_millis(10));

        assert!(store.current().is_none());
        assert!(store.latest().is_some());
    }

    #[test]
    fn test_concurrent_readers_see_whole_frames() {
        let store = Arc::new(IoStatusStore::new(None));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    let bit = i % 2 == 0;
                    store.publish(levels(&[bit; 32]));
                }
            })
        };

        for _ in 0..1000 {
            if let Some(snapshot) = store.current() {
                let first = snapshot.is_high(0);
                assert!(snapshot.levels().as_slice().iter().all(|l| *l == first));
            }
        }
        writer.join().unwrap();
    }
}
