use crate::packet::{QualitySample, RtpStatus};

/// Sink for everything the receive path learns about packets.
///
/// Implemented by the quality analyzer. Calls come from the playout thread
/// and must not block.
pub trait RxStatusReporter: Send + Sync {
    /// A packet arrived, before any playout decision.
    fn collect_packet(&self, sample: QualitySample);

    /// Final delivery outcome of the packet with sequence number `seq`.
    fn collect_rx_status(&self, seq: u16, status: RtpStatus, time: u32);

    /// `count` packets starting at `seq` never arrived.
    fn collect_loss_gap(&self, seq: u16, count: u32, time: u32);

    /// Current and maximum buffering depth in milliseconds.
    fn collect_buffer_size(&self, current: u32, max: u32);
}

/// Reporter that drops everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopReporter;

impl RxStatusReporter for NoopReporter {
    fn collect_packet(&self, _sample: QualitySample) {}

    fn collect_rx_status(&self, _seq: u16, _status: RtpStatus, _time: u32) {}

    fn collect_loss_gap(&self, _seq: u16, _count: u32, _time: u32) {}

    fn collect_buffer_size(&self, _current: u32, _max: u32) {}
}
