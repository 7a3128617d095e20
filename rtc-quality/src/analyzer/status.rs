use serde::{Deserialize, Serialize};

/// Snapshot of the receive-side media quality, recomputed every tick.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQualityStatus {
    pub rtp_inactivity_time_millis: u32,
    pub rtcp_inactivity_time_millis: u32,
    /// Smoothed absolute jitter.
    pub rtp_jitter_millis: u32,
    /// Loss rate in percent over the configured loss window.
    pub rtp_packet_loss_rate: u32,
}
