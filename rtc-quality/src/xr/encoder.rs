use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use media::packet::{LostPacket, QualitySample, RtpStatus};
use rtcp::extended_report::{
    ReportBlock, StatisticsSummaryReportBlock, TtlOrHopLimit, VoipMetricsReportBlock, XrBlockTypes,
};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize};

use crate::analyzer::history::History;
use crate::xr::ReportWindow;
use crate::xr::markov::{BurstGapModel, TransitionCounters};

const DEFAULT_SAMPLING_RATE_KHZ: u32 = 16;
const DEFAULT_FRAME_INTERVAL: u32 = 20;

/// Builds RTCP XR Statistics Summary and VoIP Metrics blocks.
///
/// Every playout outcome is stacked into a burst/gap model as it happens; the
/// summary block is computed on demand from the packet history over the
/// report window. Loss and discard counts are cumulative for the lifetime of
/// the encoder.
#[derive(Debug, Clone)]
pub struct RtcpXrEncoder {
    ssrc: u32,
    sampling_rate_khz: u32,
    round_trip_delay: u32,
    frame_interval: u32,
    loss_count: u32,
    discarded_count: u32,
    jb_nominal: u32,
    jb_max: u32,
    jb_abs_max: u32,
    model: BurstGapModel,
}

impl Default for RtcpXrEncoder {
    fn default() -> Self {
        Self {
            ssrc: 0,
            sampling_rate_khz: DEFAULT_SAMPLING_RATE_KHZ,
            round_trip_delay: 0,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            loss_count: 0,
            discarded_count: 0,
            jb_nominal: 0,
            jb_max: 0,
            jb_abs_max: 0,
            model: BurstGapModel::default(),
        }
    }
}

impl RtcpXrEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.ssrc = ssrc;
    }

    /// Sampling rate in kHz, used to express jitter in timestamp units.
    pub fn set_sampling_rate(&mut self, rate_khz: u32) {
        debug!("xr sampling rate {rate_khz}kHz");
        self.sampling_rate_khz = rate_khz;
    }

    pub fn set_round_trip_delay(&mut self, delay: u32) {
        debug!("xr round trip delay {delay}ms");
        self.round_trip_delay = delay;
    }

    /// Packetization interval in ms used for burst and gap durations.
    pub fn set_frame_interval(&mut self, frame_interval: u32) {
        if frame_interval > 0 {
            self.frame_interval = frame_interval;
        }
    }

    /// Current and maximum jitter buffer depth in ms.
    pub fn set_jitter_buffer_status(&mut self, current: u32, max: u32) {
        trace!("xr jitter buffer current[{current}] max[{max}]");
        self.jb_nominal = current;
        self.jb_abs_max = max;
    }

    pub fn counters(&self) -> TransitionCounters {
        self.model.counters()
    }

    pub fn loss_count(&self) -> u32 {
        self.loss_count
    }

    pub fn discarded_count(&self) -> u32 {
        self.discarded_count
    }

    /// Feeds one playout outcome with its playout delay in ms.
    pub fn stack_rx_status(&mut self, status: RtpStatus, delay: u32) {
        match status {
            RtpStatus::Lost => {
                self.loss_count += 1;
                self.model.on_lost();
            }
            RtpStatus::Late | RtpStatus::Discarded | RtpStatus::Duplicated => {
                self.discarded_count += 1;
                self.model.on_lost();
            }
            RtpStatus::NotDefined | RtpStatus::Normal => self.model.on_received(),
        }

        if status == RtpStatus::Normal && delay > self.jb_max {
            self.jb_max = delay;
        }
    }

    /// Writes the requested blocks into `buf`, statistics summary first, and
    /// returns the number of bytes written.
    pub fn create_report_into(
        &mut self,
        block_types: XrBlockTypes,
        rx: &History<QualitySample>,
        lost: &History<LostPacket>,
        window: ReportWindow,
        buf: &mut [u8],
    ) -> Result<usize> {
        let blocks = self.report_blocks(block_types, rx, lost, window)?;

        let mut offset = 0;
        for block in &blocks {
            offset += block.marshal_to(&mut buf[offset..])?;
        }

        trace!("xr report types[{:?}] size[{}]", block_types, offset);
        Ok(offset)
    }

    /// Builds the requested blocks into a new buffer.
    pub fn create_report(
        &mut self,
        block_types: XrBlockTypes,
        rx: &History<QualitySample>,
        lost: &History<LostPacket>,
        window: ReportWindow,
    ) -> Result<Bytes> {
        let blocks = self.report_blocks(block_types, rx, lost, window)?;

        let size = blocks.iter().map(|b| b.marshal_size()).sum();
        let mut buf = BytesMut::zeroed(size);
        let mut offset = 0;
        for block in &blocks {
            offset += block.marshal_to(&mut buf[offset..])?;
        }
        buf.truncate(offset);

        trace!("xr report types[{:?}] size[{}]", block_types, offset);
        Ok(buf.freeze())
    }

    fn report_blocks(
        &mut self,
        block_types: XrBlockTypes,
        rx: &History<QualitySample>,
        lost: &History<LostPacket>,
        window: ReportWindow,
    ) -> Result<Vec<ReportBlock>> {
        if block_types.is_empty() {
            return Err(Error::ErrNoReportBlockRequested);
        }

        let mut blocks = vec![];
        if block_types.contains(XrBlockTypes::STATISTICS_SUMMARY) {
            blocks.push(ReportBlock::StatisticsSummary(
                self.statistics_summary(rx, lost, window),
            ));
        }
        if block_types.contains(XrBlockTypes::VOIP_METRICS) {
            blocks.push(ReportBlock::VoipMetrics(self.voip_metrics()));
        }
        Ok(blocks)
    }

    /// Loss, duplicate and jitter statistics over `window`.
    pub fn statistics_summary(
        &self,
        rx: &History<QualitySample>,
        lost: &History<LostPacket>,
        window: ReportWindow,
    ) -> StatisticsSummaryReportBlock {
        let received = in_window(rx, window).count();
        let mut lost_packets = 0u32;
        for run in lost.iter().filter(|l| window.contains(l.seq)) {
            for i in 0..run.count {
                if !window.contains(run.seq.wrapping_add(i as u16)) {
                    break;
                }
                lost_packets += 1;
            }
        }

        let dup_packets = in_window(rx, window)
            .filter(|p| p.status == RtpStatus::Duplicated)
            .count() as u32;

        let jitter = JitterStats::from_samples(
            in_window(rx, window).map(|p| p.jitter as i64 * self.sampling_rate_khz as i64),
        );

        debug!(
            "xr summary begin[{}] end[{}] received[{}] lost[{}] dup[{}] jitter min[{}] max[{}] mean[{}] dev[{}]",
            window.begin,
            window.end,
            received,
            lost_packets,
            dup_packets,
            jitter.min,
            jitter.max,
            jitter.mean,
            jitter.dev
        );

        StatisticsSummaryReportBlock {
            loss_reports: true,
            duplicate_reports: true,
            jitter_reports: true,
            ttl_or_hop_limit: TtlOrHopLimit::None,
            ssrc: self.ssrc,
            begin_seq: window.begin,
            end_seq: window.end,
            lost_packets,
            dup_packets,
            min_jitter: jitter.min as u32,
            max_jitter: jitter.max as u32,
            mean_jitter: jitter.mean as u32,
            dev_jitter: jitter.dev as u32,
            min_ttl_or_hl: 0,
            max_ttl_or_hl: 0,
            mean_ttl_or_hl: 0,
            dev_ttl_or_hl: 0,
        }
    }

    /// VoIP metrics from the burst/gap model. Closes the current gap, so
    /// received packets stacked since the last loss count as gap packets.
    pub fn voip_metrics(&mut self) -> VoipMetricsReportBlock {
        self.model.close_gap();

        let c = self.model.counters();
        let total = c.total() as f64;
        let p23 = c.p23();
        let p32 = c.p32();

        let denom = if c.c13 == 0 { 1 } else { c.c13 as u64 };
        let interval = self.frame_interval as u64;
        let gap_duration = (c.c11 + c.c14 + c.c13) as u64 * interval / denom;
        let burst_duration = (c.total() as u64 * interval / denom).saturating_sub(gap_duration);

        let block = VoipMetricsReportBlock {
            ssrc: self.ssrc,
            loss_rate: scaled_ratio(self.loss_count as f64, total),
            discard_rate: scaled_ratio(self.discarded_count as f64, total),
            burst_density: scaled_ratio(p23, p23 + p32),
            gap_density: scaled_ratio(c.c14 as f64, (c.c11 + c.c14) as f64),
            burst_duration: clamp_u16(burst_duration),
            gap_duration: clamp_u16(gap_duration),
            round_trip_delay: clamp_u16(self.round_trip_delay as u64),
            end_system_delay: 0,
            gmin: self.model.gmin() as u8,
            jb_nominal: clamp_u16(self.jb_nominal as u64),
            jb_maximum: clamp_u16(self.jb_max as u64),
            jb_abs_max: clamp_u16(self.jb_abs_max as u64),
            ..Default::default()
        };

        debug!(
            "xr voip total[{}] p23[{:.3}] p32[{:.3}] loss[{}] discard[{}] burst density[{}] gap density[{}] burst[{}ms] gap[{}ms]",
            c.total(),
            p23,
            p32,
            block.loss_rate,
            block.discard_rate,
            block.burst_density,
            block.gap_density,
            block.burst_duration,
            block.gap_duration
        );
        block
    }
}

fn in_window(
    rx: &History<QualitySample>,
    window: ReportWindow,
) -> impl Iterator<Item = &QualitySample> {
    rx.iter().filter(move |p| window.contains(p.seq))
}

/// `255 * num / denom`, or 0 when the denominator is 0.
fn scaled_ratio(num: f64, denom: f64) -> u8 {
    if denom <= 0.0 {
        0
    } else {
        (255.0 * num / denom) as u8
    }
}

fn clamp_u16(v: u64) -> u16 {
    v.min(u16::MAX as u64) as u16
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
struct JitterStats {
    min: i32,
    max: i32,
    mean: i32,
    dev: i32,
}

impl JitterStats {
    fn from_samples(samples: impl Iterator<Item = i64>) -> Self {
        let mut count = 0i64;
        let mut sum = 0i64;
        let mut sum_sqr = 0i64;
        let mut min = i64::MAX;
        let mut max = i64::MIN;

        for jitter in samples {
            min = min.min(jitter);
            max = max.max(jitter);
            sum += jitter;
            sum_sqr += jitter * jitter;
            count += 1;
        }

        if count == 0 {
            return Self::default();
        }

        let mean = sum as f64 / count as f64;
        let variance = (sum_sqr as f64 / count as f64 - mean * mean).max(0.0);
        Self {
            min: min as i32,
            max: max as i32,
            mean: mean as i32,
            dev: variance.sqrt() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::marshal::Unmarshal;

    fn sample(seq: u16, jitter: i32, status: RtpStatus) -> QualitySample {
        QualitySample {
            ssrc: 0x1234_5678,
            seq,
            jitter,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_loss_gap_model_scenario() {
        let mut encoder = RtcpXrEncoder::new();
        for _ in 0..5 {
            encoder.stack_rx_status(RtpStatus::Normal, 40);
        }
        encoder.stack_rx_status(RtpStatus::Lost, 0);
        encoder.stack_rx_status(RtpStatus::Lost, 0);
        for _ in 0..3 {
            encoder.stack_rx_status(RtpStatus::Normal, 40);
        }

        let block = encoder.voip_metrics();
        let c = encoder.counters();
        assert_eq!(c.c11, 3);
        assert_eq!(c.c22, 4);
        assert_eq!(c.c23, 1);
        assert_eq!(c.c33, 1);
        assert_eq!(c.total(), 10);

        assert_eq!(block.loss_rate, 51);
        assert_eq!(block.discard_rate, 0);
        // p23 = 0.2, p32 = 0.5
        assert_eq!(block.burst_density, 72);
        assert_eq!(block.gap_density, 0);
        assert_eq!(block.gap_duration, 60);
        assert_eq!(block.burst_duration, 140);
        assert_eq!(block.jb_maximum, 40);
        assert_eq!(block.gmin, 16);
        assert_eq!(block.rx_config, 127);
    }

    #[test]
    fn test_voip_metrics_without_packets() {
        let mut encoder = RtcpXrEncoder::new();
        encoder.set_ssrc(7);
        encoder.set_round_trip_delay(120);
        encoder.set_jitter_buffer_status(80, 180);

        let block = encoder.voip_metrics();
        assert_eq!(block.ssrc, 7);
        assert_eq!(block.loss_rate, 0);
        assert_eq!(block.burst_density, 0);
        assert_eq!(block.gap_density, 0);
        assert_eq!(block.burst_duration, 0);
        assert_eq!(block.gap_duration, 0);
        assert_eq!(block.round_trip_delay, 120);
        assert_eq!(block.jb_nominal, 80);
        assert_eq!(block.jb_abs_max, 180);
    }

    #[test]
    fn test_discards_count_as_bad_packets() {
        let mut encoder = RtcpXrEncoder::new();
        encoder.stack_rx_status(RtpStatus::Normal, 20);
        encoder.stack_rx_status(RtpStatus::Late, 200);
        encoder.stack_rx_status(RtpStatus::Duplicated, 0);
        encoder.stack_rx_status(RtpStatus::Discarded, 0);

        assert_eq!(encoder.discarded_count(), 3);
        assert_eq!(encoder.loss_count(), 0);
        let c = encoder.counters();
        assert_eq!(c.c23, 1);
        assert_eq!(c.c33, 2);

        // late packets do not widen the playout delay maximum
        assert_eq!(encoder.voip_metrics().jb_maximum, 20);
    }

    #[test]
    fn test_statistics_summary_over_window() {
        let mut encoder = RtcpXrEncoder::new();
        encoder.set_ssrc(0x1234_5678);
        encoder.set_sampling_rate(8);

        let mut rx = History::default();
        rx.push(sample(9, 100, RtpStatus::Normal));
        rx.push(sample(10, 2, RtpStatus::Normal));
        rx.push(sample(11, -2, RtpStatus::Normal));
        rx.push(sample(11, 4, RtpStatus::Duplicated));
        rx.push(sample(14, 0, RtpStatus::Normal));
        rx.push(sample(15, 50, RtpStatus::Normal));

        let mut lost = History::default();
        lost.push(LostPacket::new(12, 2, 0));
        // run crossing the end of the window
        lost.push(LostPacket::new(14, 3, 0));

        let block = encoder.statistics_summary(&rx, &lost, ReportWindow::new(10, 15));
        assert_eq!(block.ssrc, 0x1234_5678);
        assert_eq!(block.begin_seq, 10);
        assert_eq!(block.end_seq, 15);
        assert_eq!(block.lost_packets, 4);
        assert_eq!(block.dup_packets, 1);

        // jitter in 8kHz units: 16, -16, 32, 0, 400
        assert_eq!(block.min_jitter, (-16i32) as u32);
        assert_eq!(block.max_jitter, 400);
        assert_eq!(block.mean_jitter, 86);
        assert!(block.loss_reports && block.duplicate_reports && block.jitter_reports);
        assert_eq!(block.ttl_or_hop_limit, TtlOrHopLimit::None);
    }

    #[test]
    fn test_statistics_summary_empty_window() {
        let encoder = RtcpXrEncoder::new();
        let mut rx = History::default();
        rx.push(sample(20, 5, RtpStatus::Normal));

        let block = encoder.statistics_summary(&rx, &History::default(), ReportWindow::empty_from(21));
        assert_eq!(block.lost_packets, 0);
        assert_eq!(block.dup_packets, 0);
        assert_eq!(block.min_jitter, 0);
        assert_eq!(block.max_jitter, 0);
        assert_eq!(block.mean_jitter, 0);
        assert_eq!(block.dev_jitter, 0);
    }

    #[test]
    fn test_jitter_deviation() {
        let stats = JitterStats::from_samples([10i64, 20, 30, 40].into_iter());
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 40);
        assert_eq!(stats.mean, 25);
        // sqrt(750 - 625)
        assert_eq!(stats.dev, 11);
    }

    #[test]
    fn test_create_report_layout() {
        let mut encoder = RtcpXrEncoder::new();
        let rx = History::default();
        let lost = History::default();
        let window = ReportWindow::new(0, 0);

        let report = encoder
            .create_report(XrBlockTypes::all(), &rx, &lost, window)
            .unwrap();
        assert_eq!(report.len(), 40 + 36);
        assert_eq!(report[0], 6);
        assert_eq!(report[40], 7);

        let blocks = ReportBlock::unmarshal_all(&mut report.clone()).unwrap();
        assert_eq!(blocks.len(), 2);

        let voip_only = encoder
            .create_report(XrBlockTypes::VOIP_METRICS, &rx, &lost, window)
            .unwrap();
        assert_eq!(voip_only.len(), 36);
        let block = ReportBlock::unmarshal(&mut voip_only.clone()).unwrap();
        assert_eq!(block.block_type(), rtcp::extended_report::BlockType::VoipMetrics);
    }

    #[test]
    fn test_create_report_into_buffer() {
        let mut encoder = RtcpXrEncoder::new();
        let rx = History::default();
        let lost = History::default();
        let window = ReportWindow::new(0, 0);

        let mut buf = [0u8; 128];
        let n = encoder
            .create_report_into(XrBlockTypes::all(), &rx, &lost, window, &mut buf)
            .unwrap();
        assert_eq!(n, 76);

        let mut short = [0u8; 50];
        assert!(
            encoder
                .create_report_into(XrBlockTypes::all(), &rx, &lost, window, &mut short)
                .is_err()
        );
    }

    #[test]
    fn test_no_block_requested() {
        let mut encoder = RtcpXrEncoder::new();
        let result = encoder.create_report(
            XrBlockTypes::empty(),
            &History::default(),
            &History::default(),
            ReportWindow::default(),
        );
        assert_eq!(result, Err(Error::ErrNoReportBlockRequested));
    }
}
