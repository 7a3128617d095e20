use media::codec::AudioCodec;
use serde::{Deserialize, Serialize};

use crate::analyzer::config::EvsBandwidth;

/// Coarse call quality level derived from the downlink loss rate.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLevel {
    #[default]
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl QualityLevel {
    /// Maps a loss rate in percent onto the level scale.
    pub fn from_loss_rate(loss_rate: f64) -> Self {
        if loss_rate < 1.0 {
            QualityLevel::Excellent
        } else if loss_rate < 3.0 {
            QualityLevel::Good
        } else if loss_rate < 5.0 {
            QualityLevel::Fair
        } else if loss_rate < 8.0 {
            QualityLevel::Poor
        } else {
            QualityLevel::Bad
        }
    }
}

/// Codec and bandwidth the call runs with, as reported in [`CallQuality`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioQuality {
    #[default]
    None,
    Amr,
    AmrWb,
    EvsNb,
    EvsWb,
    EvsSwb,
    EvsFb,
}

impl AudioQuality {
    pub fn new(codec: AudioCodec, bandwidth: EvsBandwidth) -> Self {
        match (codec, bandwidth) {
            (AudioCodec::Amr, _) => AudioQuality::Amr,
            (AudioCodec::AmrWb, _) => AudioQuality::AmrWb,
            (AudioCodec::Evs, EvsBandwidth::NarrowBand) => AudioQuality::EvsNb,
            (AudioCodec::Evs, EvsBandwidth::WideBand) => AudioQuality::EvsWb,
            (AudioCodec::Evs, EvsBandwidth::SuperWideBand) => AudioQuality::EvsSwb,
            (AudioCodec::Evs, EvsBandwidth::FullBand) => AudioQuality::EvsFb,
            _ => AudioQuality::None,
        }
    }
}

/// Call-level quality summary.
///
/// Counters are cumulative since the analyzer was last reset. The playout
/// delay range covers the interval since the previous emission only.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallQuality {
    pub downlink_call_quality_level: QualityLevel,
    pub uplink_call_quality_level: QualityLevel,
    /// Milliseconds since the analyzer started.
    pub call_duration: u32,
    pub num_rtp_packets_transmitted: u32,
    pub num_rtp_packets_received: u32,
    pub num_rtp_packets_transmitted_lost: u32,
    pub num_rtp_packets_not_received: u32,
    pub average_relative_jitter: i32,
    pub max_relative_jitter: i32,
    pub average_round_trip_time: u32,
    pub codec_type: AudioQuality,
    pub rtp_inactivity_detected: bool,
    pub rx_silence_detected: bool,
    pub tx_silence_detected: bool,
    pub num_voice_frames: u32,
    pub num_no_data_frames: u32,
    pub num_dropped_rtp_packets: u32,
    pub min_playout_delay_millis: u32,
    pub max_playout_delay_millis: u32,
    pub num_rtp_sid_packets_received: u32,
    pub num_rtp_duplicate_packets: u32,
}

impl CallQuality {
    /// Widens the playout delay range with `delay`. A zero minimum means no
    /// delay has been recorded yet.
    pub(crate) fn record_playout_delay(&mut self, delay: u32) {
        if delay > self.max_playout_delay_millis {
            self.max_playout_delay_millis = delay;
        }
        if delay < self.min_playout_delay_millis || self.min_playout_delay_millis == 0 {
            self.min_playout_delay_millis = delay;
        }
    }
}
