use log::trace;

/// Decides the target jitter buffer depth, in packetization intervals.
///
/// The jitter buffer asks for a new size roughly every two seconds of
/// playout. Results are clamped into the configured `[min, max]` by
/// [`JitterAnalyzer`], so a policy does not need to know the bounds.
pub trait BufferSizePolicy: Send {
    /// Called with every transit difference computed on receive.
    fn observe(&mut self, _jitter: i32) {}

    /// Returns the size to adopt next.
    fn next_buffer_size(&mut self, current: u32, now: u32) -> u32;

    fn reset(&mut self) {}
}

/// Keeps whatever size is currently in use.
#[derive(Debug, Default, Copy, Clone)]
pub struct FixedSizePolicy;

impl BufferSizePolicy for FixedSizePolicy {
    fn next_buffer_size(&mut self, current: u32, _now: u32) -> u32 {
        current
    }
}

/// Tracks the transit-time base packet and delegates sizing to a
/// [`BufferSizePolicy`].
pub struct JitterAnalyzer {
    base: Option<(u32, u32)>,
    min_size: u32,
    max_size: u32,
    policy: Box<dyn BufferSizePolicy>,
}

impl JitterAnalyzer {
    pub fn new(policy: Box<dyn BufferSizePolicy>) -> Self {
        Self {
            base: None,
            min_size: 0,
            max_size: u32::MAX,
            policy,
        }
    }

    pub fn set_min_max_size(&mut self, min_size: u32, max_size: u32) {
        self.min_size = min_size;
        self.max_size = max_size.max(min_size);
    }

    /// Difference between the arrival spacing and the timestamp spacing of
    /// the packet against the base packet, in milliseconds. Positive values
    /// mean the packet arrived later than its timestamp predicts.
    pub fn transit_time_difference(&mut self, timestamp: u32, arrival: u32) -> i32 {
        let jitter = match self.base {
            Some((base_ts, base_arrival)) => {
                let arrival_delta = arrival.wrapping_sub(base_arrival) as i32;
                let ts_delta = timestamp.wrapping_sub(base_ts) as i32;
                arrival_delta.wrapping_sub(ts_delta)
            }
            None => 0,
        };

        self.policy.observe(jitter);
        jitter
    }

    pub fn update_base(&mut self, timestamp: u32, arrival: u32) {
        self.base = Some((timestamp, arrival));
    }

    pub fn next_buffer_size(&mut self, current: u32, now: u32) -> u32 {
        let next = self
            .policy
            .next_buffer_size(current, now)
            .clamp(self.min_size, self.max_size);
        if next != current {
            trace!("jitter buffer size {current} -> {next}");
        }
        next
    }

    pub fn reset(&mut self) {
        self.base = None;
        self.policy.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StepPolicy(u32);

    impl BufferSizePolicy for StepPolicy {
        fn next_buffer_size(&mut self, current: u32, _now: u32) -> u32 {
            current + self.0
        }
    }

    #[test]
    fn test_transit_time_difference() {
        let mut analyzer = JitterAnalyzer::new(Box::new(FixedSizePolicy));
        assert_eq!(analyzer.transit_time_difference(0, 1000), 0);

        analyzer.update_base(0, 1000);
        // on time
        assert_eq!(analyzer.transit_time_difference(20, 1020), 0);
        // 15ms late
        assert_eq!(analyzer.transit_time_difference(40, 1055), 15);
        // 5ms early
        assert_eq!(analyzer.transit_time_difference(60, 1055), -5);
    }

    #[test]
    fn test_transit_time_difference_wraps() {
        let mut analyzer = JitterAnalyzer::new(Box::new(FixedSizePolicy));
        analyzer.update_base(u32::MAX - 9, u32::MAX - 19);
        assert_eq!(analyzer.transit_time_difference(10, 5), 5);
    }

    #[test]
    fn test_next_buffer_size_clamped() {
        let mut analyzer = JitterAnalyzer::new(Box::new(StepPolicy(4)));
        analyzer.set_min_max_size(3, 9);
        assert_eq!(analyzer.next_buffer_size(4, 0), 8);
        assert_eq!(analyzer.next_buffer_size(8, 0), 9);

        let mut analyzer = JitterAnalyzer::new(Box::new(FixedSizePolicy));
        analyzer.set_min_max_size(3, 9);
        assert_eq!(analyzer.next_buffer_size(1, 0), 3);
        assert_eq!(analyzer.next_buffer_size(5, 0), 5);
    }

    #[test]
    fn test_reset_clears_base() {
        let mut analyzer = JitterAnalyzer::new(Box::new(FixedSizePolicy));
        analyzer.update_base(100, 100);
        analyzer.reset();
        assert_eq!(analyzer.transit_time_difference(500, 100), 0);
    }
}
