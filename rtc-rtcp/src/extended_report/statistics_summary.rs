use super::*;

const SSR_BLOCK_LENGTH: u16 = 9;
const SSR_REPORT_SIZE: usize = XR_HEADER_LENGTH + SSR_BLOCK_LENGTH as usize * 4;

const LOSS_REPORT_FLAG: u8 = 0x80;
const DUPLICATE_REPORT_FLAG: u8 = 0x40;
const JITTER_REPORT_FLAG: u8 = 0x20;
const TOH_SHIFT: u8 = 3;
const TOH_MASK: u8 = 0x03;

/// StatisticsSummaryReportBlock encodes a Statistics Summary report
/// block as described in RFC 3611, section 4.6.
///
/// ```plain
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     BT=6      |L|D|J|ToH|rsvd.|       block length = 9        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        SSRC of source                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          begin_seq            |             end_seq           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        lost_packets                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        dup_packets                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        min_jitter                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        max_jitter                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        mean_jitter                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        dev_jitter                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | min_ttl_or_hl | max_ttl_or_hl |mean_ttl_or_hl | dev_ttl_or_hl |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatisticsSummaryReportBlock {
    pub loss_reports: bool,
    pub duplicate_reports: bool,
    pub jitter_reports: bool,
    pub ttl_or_hop_limit: TtlOrHopLimit,

    pub ssrc: u32,
    pub begin_seq: u16,
    pub end_seq: u16,
    pub lost_packets: u32,
    pub dup_packets: u32,
    pub min_jitter: u32,
    pub max_jitter: u32,
    pub mean_jitter: u32,
    pub dev_jitter: u32,
    pub min_ttl_or_hl: u8,
    pub max_ttl_or_hl: u8,
    pub mean_ttl_or_hl: u8,
    pub dev_ttl_or_hl: u8,
}

impl StatisticsSummaryReportBlock {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.loss_reports {
            flags |= LOSS_REPORT_FLAG;
        }
        if self.duplicate_reports {
            flags |= DUPLICATE_REPORT_FLAG;
        }
        if self.jitter_reports {
            flags |= JITTER_REPORT_FLAG;
        }
        flags | ((self.ttl_or_hop_limit as u8 & TOH_MASK) << TOH_SHIFT)
    }
}

impl MarshalSize for StatisticsSummaryReportBlock {
    fn marshal_size(&self) -> usize {
        SSR_REPORT_SIZE
    }
}

impl Marshal for StatisticsSummaryReportBlock {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < SSR_REPORT_SIZE {
            return Err(Error::ErrBufferTooShort);
        }

        put_header(
            &mut buf,
            BlockType::StatisticsSummary,
            self.flags(),
            SSR_BLOCK_LENGTH,
        );
        buf.put_u32(self.ssrc);
        buf.put_u16(self.begin_seq);
        buf.put_u16(self.end_seq);
        buf.put_u32(self.lost_packets);
        buf.put_u32(self.dup_packets);
        buf.put_u32(self.min_jitter);
        buf.put_u32(self.max_jitter);
        buf.put_u32(self.mean_jitter);
        buf.put_u32(self.dev_jitter);
        buf.put_u8(self.min_ttl_or_hl);
        buf.put_u8(self.max_ttl_or_hl);
        buf.put_u8(self.mean_ttl_or_hl);
        buf.put_u8(self.dev_ttl_or_hl);

        Ok(SSR_REPORT_SIZE)
    }
}

impl Unmarshal for StatisticsSummaryReportBlock {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let flags = get_header(
            buf,
            BlockType::StatisticsSummary,
            SSR_BLOCK_LENGTH,
            SSR_REPORT_SIZE,
        )?;

        Ok(StatisticsSummaryReportBlock {
            loss_reports: flags & LOSS_REPORT_FLAG != 0,
            duplicate_reports: flags & DUPLICATE_REPORT_FLAG != 0,
            jitter_reports: flags & JITTER_REPORT_FLAG != 0,
            ttl_or_hop_limit: TtlOrHopLimit::from((flags >> TOH_SHIFT) & TOH_MASK),
            ssrc: buf.get_u32(),
            begin_seq: buf.get_u16(),
            end_seq: buf.get_u16(),
            lost_packets: buf.get_u32(),
            dup_packets: buf.get_u32(),
            min_jitter: buf.get_u32(),
            max_jitter: buf.get_u32(),
            mean_jitter: buf.get_u32(),
            dev_jitter: buf.get_u32(),
            min_ttl_or_hl: buf.get_u8(),
            max_ttl_or_hl: buf.get_u8(),
            mean_ttl_or_hl: buf.get_u8(),
            dev_ttl_or_hl: buf.get_u8(),
        })
    }
}
