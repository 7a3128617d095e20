use log::trace;

/// Detects threshold band crossings with hysteresis.
///
/// A value's band is the number of thresholds it has reached. A crossing is
/// notifiable when the band differs from the last notified one, except that
/// falling back into the band notified before that is suppressed until
/// `hysteresis_ms` has passed since the last notification.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HysteresisChecker {
    hysteresis_ms: u32,
    notified_band: usize,
    previous_band: Option<usize>,
    since_notified_ms: u32,
}

impl HysteresisChecker {
    pub fn new(hysteresis_ms: u32) -> Self {
        Self {
            hysteresis_ms,
            ..Default::default()
        }
    }

    /// Clears the crossing history and sets a new hysteresis time.
    pub fn initialize(&mut self, hysteresis_ms: u32) {
        *self = Self::new(hysteresis_ms);
    }

    /// Evaluates `value` after `elapsed_ms` since the previous check and
    /// reports whether the crossing should be notified.
    pub fn check_notifiable(&mut self, thresholds: &[u32], value: u32, elapsed_ms: u32) -> bool {
        self.since_notified_ms = self.since_notified_ms.saturating_add(elapsed_ms);

        let band = thresholds.iter().filter(|t| value >= **t).count();
        if band == self.notified_band {
            return false;
        }

        if Some(band) == self.previous_band && self.since_notified_ms < self.hysteresis_ms {
            trace!(
                "crossing back to band {} suppressed, {}ms since last notification",
                band, self.since_notified_ms
            );
            return false;
        }

        self.previous_band = Some(self.notified_band);
        self.notified_band = band;
        self.since_notified_ms = 0;
        true
    }
}
