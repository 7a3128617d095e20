use media::packet::{QualitySample, RtpStatus};

use crate::analyzer::call_quality::CallQuality;
use crate::analyzer::status::MediaQualityStatus;

/// Auxiliary measurements that are not tied to a received packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OptionalInfo {
    /// Round trip delay in ms, from RTCP.
    RoundTripDelay(u32),
    /// `count` consecutive packets starting at `seq` were never received.
    PacketLossGap { seq: u16, count: u32, time: u32 },
}

/// Input to the analyzer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnalyzerEvent {
    RtpTransmitted(QualitySample),
    RtpReceived(QualitySample),
    RtcpReceived,
    Optional(OptionalInfo),
    /// Playout outcome of a received packet at `time` ms.
    RxStatus {
        seq: u16,
        status: RtpStatus,
        time: u32,
    },
    /// Jitter buffer depth in ms.
    BufferSize { current: u32, max: u32 },
}

/// Output of the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityNotification {
    CallQuality(CallQuality),
    MediaQualityStatus(MediaQualityStatus),
}
