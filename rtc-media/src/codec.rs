use serde::{Deserialize, Serialize};

/// Audio codecs known to the receive path.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Amr,
    #[default]
    AmrWb,
    Evs,
    Pcmu,
    Pcma,
}

impl AudioCodec {
    /// Reports whether a frame of `size` bytes is a silence descriptor.
    ///
    /// AMR, AMR-WB and EVS carry SID frames of 5 or 6 bytes. G.711 has no
    /// SID frames.
    pub fn is_sid(&self, size: usize) -> bool {
        match self {
            AudioCodec::Amr | AudioCodec::AmrWb | AudioCodec::Evs => size == 5 || size == 6,
            AudioCodec::Pcmu | AudioCodec::Pcma => false,
        }
    }

    /// Sampling rate in kHz used to express jitter in timestamp units.
    pub fn sampling_rate_khz(&self) -> u32 {
        match self {
            AudioCodec::Amr => 8,
            _ => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sid() {
        assert!(AudioCodec::Amr.is_sid(5));
        assert!(AudioCodec::AmrWb.is_sid(6));
        assert!(AudioCodec::Evs.is_sid(6));
        assert!(!AudioCodec::Evs.is_sid(33));
        assert!(!AudioCodec::Pcmu.is_sid(6));
        assert!(!AudioCodec::Pcma.is_sid(5));
    }

    #[test]
    fn test_sampling_rate() {
        assert_eq!(AudioCodec::Amr.sampling_rate_khz(), 8);
        assert_eq!(AudioCodec::AmrWb.sampling_rate_khz(), 16);
        assert_eq!(AudioCodec::Evs.sampling_rate_khz(), 16);
    }
}
