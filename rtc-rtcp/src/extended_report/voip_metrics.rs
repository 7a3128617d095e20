use super::*;

const VM_BLOCK_LENGTH: u16 = 8;
const VM_REPORT_SIZE: usize = XR_HEADER_LENGTH + VM_BLOCK_LENGTH as usize * 4;

/// Minimum gap length, in packets, between two bursts.
pub const DEFAULT_GMIN: u8 = 16;

/// VoipMetricsReportBlock encodes a VoIP Metrics report block
/// as described in RFC 3611, section 4.7.
///
/// ```plain
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     BT=7      |   reserved    |       block length = 8        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        SSRC of source                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   loss rate   | discard rate  | burst density |  gap density  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       burst duration          |         gap duration          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     round trip delay          |       end system delay        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | signal level  |  noise level  |     RERL      |     Gmin      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   R factor    | ext. R factor |    MOS-LQ     |    MOS-CQ     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   RX config   |   reserved    |          JB nominal           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          JB maximum           |          JB abs max           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoipMetricsReportBlock {
    pub ssrc: u32,
    pub loss_rate: u8,
    pub discard_rate: u8,
    pub burst_density: u8,
    pub gap_density: u8,
    pub burst_duration: u16,
    pub gap_duration: u16,
    pub round_trip_delay: u16,
    pub end_system_delay: u16,
    pub signal_level: u8,
    pub noise_level: u8,
    pub rerl: u8,
    pub gmin: u8,
    pub r_factor: u8,
    pub ext_r_factor: u8,
    pub mos_lq: u8,
    pub mos_cq: u8,
    pub rx_config: u8,
    pub jb_nominal: u16,
    pub jb_maximum: u16,
    pub jb_abs_max: u16,
}

impl Default for VoipMetricsReportBlock {
    fn default() -> Self {
        VoipMetricsReportBlock {
            ssrc: 0,
            loss_rate: 0,
            discard_rate: 0,
            burst_density: 0,
            gap_density: 0,
            burst_duration: 0,
            gap_duration: 0,
            round_trip_delay: 0,
            end_system_delay: 0,
            signal_level: UNAVAILABLE,
            noise_level: UNAVAILABLE,
            rerl: UNAVAILABLE,
            gmin: DEFAULT_GMIN,
            r_factor: UNAVAILABLE,
            ext_r_factor: UNAVAILABLE,
            mos_lq: UNAVAILABLE,
            mos_cq: UNAVAILABLE,
            rx_config: UNAVAILABLE,
            jb_nominal: 0,
            jb_maximum: 0,
            jb_abs_max: 0,
        }
    }
}

impl MarshalSize for VoipMetricsReportBlock {
    fn marshal_size(&self) -> usize {
        VM_REPORT_SIZE
    }
}

impl Marshal for VoipMetricsReportBlock {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < VM_REPORT_SIZE {
            return Err(Error::ErrBufferTooShort);
        }

        put_header(&mut buf, BlockType::VoipMetrics, 0, VM_BLOCK_LENGTH);
        buf.put_u32(self.ssrc);
        buf.put_u8(self.loss_rate);
        buf.put_u8(self.discard_rate);
        buf.put_u8(self.burst_density);
        buf.put_u8(self.gap_density);
        buf.put_u16(self.burst_duration);
        buf.put_u16(self.gap_duration);
        buf.put_u16(self.round_trip_delay);
        buf.put_u16(self.end_system_delay);
        buf.put_u8(self.signal_level);
        buf.put_u8(self.noise_level);
        buf.put_u8(self.rerl);
        buf.put_u8(self.gmin);
        buf.put_u8(self.r_factor);
        buf.put_u8(self.ext_r_factor);
        buf.put_u8(self.mos_lq);
        buf.put_u8(self.mos_cq);
        buf.put_u8(self.rx_config);
        buf.put_u8(0);
        buf.put_u16(self.jb_nominal);
        buf.put_u16(self.jb_maximum);
        buf.put_u16(self.jb_abs_max);

        Ok(VM_REPORT_SIZE)
    }
}

impl Unmarshal for VoipMetricsReportBlock {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        get_header(buf, BlockType::VoipMetrics, VM_BLOCK_LENGTH, VM_REPORT_SIZE)?;

        let ssrc = buf.get_u32();
        let loss_rate = buf.get_u8();
        let discard_rate = buf.get_u8();
        let burst_density = buf.get_u8();
        let gap_density = buf.get_u8();
        let burst_duration = buf.get_u16();
        let gap_duration = buf.get_u16();
        let round_trip_delay = buf.get_u16();
        let end_system_delay = buf.get_u16();
        let signal_level = buf.get_u8();
        let noise_level = buf.get_u8();
        let rerl = buf.get_u8();
        let gmin = buf.get_u8();
        let r_factor = buf.get_u8();
        let ext_r_factor = buf.get_u8();
        let mos_lq = buf.get_u8();
        let mos_cq = buf.get_u8();
        let rx_config = buf.get_u8();
        // reserved
        buf.advance(1);

        Ok(VoipMetricsReportBlock {
            ssrc,
            loss_rate,
            discard_rate,
            burst_density,
            gap_density,
            burst_duration,
            gap_duration,
            round_trip_delay,
            end_system_delay,
            signal_level,
            noise_level,
            rerl,
            gmin,
            r_factor,
            ext_r_factor,
            mos_lq,
            mos_cq,
            rx_config,
            jb_nominal: buf.get_u16(),
            jb_maximum: buf.get_u16(),
            jb_abs_max: buf.get_u16(),
        })
    }
}
