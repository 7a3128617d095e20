use std::time::{Duration, Instant};

/// A monotonic millisecond clock anchored at a fixed [`Instant`].
///
/// Media timing in the receive path (packet arrival, playout, loss records) is
/// carried as 32-bit millisecond counters that wrap at 2^32, the same width as
/// RTP timestamps. `MediaClock` converts between those counters and `Instant`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MediaClock {
    epoch: Instant,
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn with_epoch(epoch: Instant) -> Self {
        Self { epoch }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Milliseconds elapsed between the epoch and `now`, wrapped to 32 bits.
    /// Instants before the epoch map to 0.
    pub fn millis_at(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.epoch).as_millis() as u32
    }

    pub fn now_millis(&self) -> u32 {
        self.millis_at(Instant::now())
    }

    /// The instant `millis` milliseconds after the epoch.
    pub fn instant_at(&self, millis: u32) -> Instant {
        self.epoch + Duration::from_millis(millis as u64)
    }
}
