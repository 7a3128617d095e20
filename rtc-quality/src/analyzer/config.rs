use media::codec::AudioCodec;
use serde::{Deserialize, Serialize};

/// Direction of media flow negotiated for the session.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaDirection {
    /// No RTP or RTCP flows at all.
    NoFlow,
    SendOnly,
    ReceiveOnly,
    #[default]
    SendReceive,
    /// RTCP only, no RTP in either direction.
    Inactive,
}

impl MediaDirection {
    pub fn contains_receive(&self) -> bool {
        matches!(self, MediaDirection::ReceiveOnly | MediaDirection::SendReceive)
    }
}

/// Highest audio bandwidth negotiated for EVS.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvsBandwidth {
    #[default]
    None,
    NarrowBand,
    WideBand,
    SuperWideBand,
    FullBand,
}

/// Stream configuration the analyzer depends on.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub codec: AudioCodec,
    pub evs_bandwidth: EvsBandwidth,
    pub direction: MediaDirection,
    /// RTCP report interval; zero disables RTCP.
    pub rtcp_interval_sec: u32,
}

impl AnalyzerConfig {
    /// Reports whether `other` only re-sends what the analyzer already
    /// tracks, so no reset is needed.
    pub(crate) fn is_same_stream(&self, other: &AnalyzerConfig) -> bool {
        self.codec == other.codec
            && self.evs_bandwidth == other.evs_bandwidth
            && self.direction.contains_receive() == other.direction.contains_receive()
    }

    pub(crate) fn rtcp_enabled(&self) -> bool {
        self.rtcp_interval_sec > 0 && self.direction != MediaDirection::NoFlow
    }
}

/// Notification thresholds for [`MediaQualityStatus`](crate::MediaQualityStatus).
///
/// All durations are in milliseconds. Empty lists and zero values disable the
/// corresponding check.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQualityThreshold {
    /// RTP inactivity durations, each notified once until RTP resumes.
    pub rtp_inactivity_timer_millis: Vec<u32>,
    pub rtcp_inactivity_timer_millis: u32,
    /// Time a reversed band crossing is suppressed for.
    pub rtp_hysteresis_time_in_millis: u32,
    /// Window the packet loss rate is evaluated over.
    pub rtp_packet_loss_duration_millis: u32,
    /// Packet loss rate thresholds in percent.
    pub rtp_packet_loss_rate: Vec<u32>,
    pub rtp_jitter_millis: Vec<u32>,
    /// Emit the current status on the next tick regardless of thresholds.
    pub notify_current_status: bool,
}
