//! Media quality analyzer - aggregates playout outcomes into call quality
//! summaries, threshold notifications and RTCP XR reports.

pub(crate) mod call_quality;
pub(crate) mod config;
pub(crate) mod event;
pub(crate) mod history;
pub(crate) mod hysteresis;
pub(crate) mod status;


pub use event::{AnalyzerEvent, OptionalInfo, QualityNotification};

use bytes::Bytes;
use log::{debug, info, trace, warn};
use media::packet::{LostPacket, QualitySample, RtpDataType, RtpStatus};
use rtcp::extended_report::XrBlockTypes;
use shared::error::{Error, Result};
use shared::time::MediaClock;
use shared::util::is_newer_seq;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::analyzer::call_quality::{AudioQuality, CallQuality, QualityLevel};
use crate::analyzer::config::{AnalyzerConfig, MediaQualityThreshold};
use crate::analyzer::history::History;
use crate::analyzer::hysteresis::HysteresisChecker;
use crate::analyzer::status::MediaQualityStatus;
use crate::xr::ReportWindow;
use crate::xr::encoder::RtcpXrEncoder;

pub(crate) const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_FRAME_INTERVAL: u32 = 20;
/// Tick at which a call that never received RTP is flagged inactive.
const INACTIVITY_TICKS_FOR_CALL_QUALITY: u32 = 4;
/// Ticks per call quality level evaluation.
const CALL_QUALITY_MONITORING_TICKS: u32 = 5;
const JITTER_SMOOTHING_FACTOR: f64 = 0.0625;
/// Window reported before any packet has been classified.
const EMPTY_WINDOW: ReportWindow = ReportWindow::empty_from(0);

/// Builder for the [`MediaQualityAnalyzer`].
///
/// # Example
///
/// ```
/// use rtc_quality::{AnalyzerConfig, MediaQualityAnalyzerBuilder, MediaQualityThreshold};
/// use std::time::Duration;
///
/// let analyzer = MediaQualityAnalyzerBuilder::new()
///     .with_interval(Duration::from_secs(1))
///     .with_config(AnalyzerConfig::default())
///     .with_threshold(MediaQualityThreshold {
///         rtp_inactivity_timer_millis: vec![2000, 4000],
///         ..Default::default()
///     })
///     .build();
/// assert_eq!(analyzer.rx_history_len(), 0);
/// ```
pub struct MediaQualityAnalyzerBuilder {
    interval: Duration,
    frame_interval: u32,
    clock: MediaClock,
    start_time: Option<Instant>,
    config: AnalyzerConfig,
    threshold: MediaQualityThreshold,
}

impl Default for MediaQualityAnalyzerBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            clock: MediaClock::new(),
            start_time: None,
            config: AnalyzerConfig::default(),
            threshold: MediaQualityThreshold::default(),
        }
    }
}

impl MediaQualityAnalyzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Period of the quality tick. Inactivity durations advance by this
    /// amount per tick.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Codec packetization interval in ms.
    pub fn with_frame_interval(mut self, frame_interval: u32) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// Clock that arrival and outcome times are expressed in. Share it with
    /// the jitter buffer's caller.
    pub fn with_clock(mut self, clock: MediaClock) -> Self {
        self.clock = clock;
        self
    }

    /// Start of the call; defaults to the clock epoch.
    pub fn with_start_time(mut self, start_time: Instant) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_threshold(mut self, threshold: MediaQualityThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn build(self) -> MediaQualityAnalyzer {
        let start_time = self.start_time.unwrap_or_else(|| self.clock.epoch());
        let mut analyzer = MediaQualityAnalyzer::new(self.interval, self.clock, start_time);
        analyzer.encoder.set_frame_interval(self.frame_interval);
        analyzer.set_config(self.config);
        analyzer.set_threshold(self.threshold);
        analyzer
    }
}

/// Sans-IO media quality analyzer.
///
/// Events are fed with `handle_read`, and each elapsed interval passed to
/// `handle_timeout` runs one quality tick. Notifications are drained with
/// `poll_read`. Writing an [`XrBlockTypes`] set builds an RTCP XR report over
/// the current report window, which is then drained with `poll_write`.
pub struct MediaQualityAnalyzer {
    interval: Duration,
    clock: MediaClock,
    started: Instant,
    eto: Instant,
    // latest time seen through start or handle_timeout
    last_now: Instant,
    tick_count: u32,

    config: AnalyzerConfig,
    rx_enabled: bool,
    rtcp_enabled: bool,

    threshold: MediaQualityThreshold,
    armed_rtp_inactivity: Vec<u32>,
    jitter_checker: HysteresisChecker,
    loss_checker: HysteresisChecker,
    notify_status: bool,

    ssrc: Option<u32>,
    window: Option<ReportWindow>,
    rx_history: History<QualitySample>,
    tx_history: History<QualitySample>,
    lost_history: History<LostPacket>,
    encoder: RtcpXrEncoder,

    call_quality: CallQuality,
    sum_relative_jitter: i64,
    sum_round_trip_time: u64,
    count_round_trip_time: u32,
    current_buffer_size: u32,
    max_buffer_size: u32,
    // received and lost packets in the current call quality level window
    level_rx: u32,
    level_lost: u32,

    status: MediaQualityStatus,
    jitter_rx: f64,
    num_rx: u32,
    num_rtcp: u32,
    rtp_inactivity_ms: u32,
    rtcp_inactivity_ms: u32,

    read_queue: VecDeque<QualityNotification>,
    write_queue: VecDeque<Bytes>,
}

impl MediaQualityAnalyzer {
    fn new(interval: Duration, clock: MediaClock, started: Instant) -> Self {
        Self {
            interval,
            clock,
            started,
            eto: started + interval,
            last_now: started,
            tick_count: 0,

            config: AnalyzerConfig::default(),
            rx_enabled: false,
            rtcp_enabled: false,

            threshold: MediaQualityThreshold::default(),
            armed_rtp_inactivity: vec![],
            jitter_checker: HysteresisChecker::default(),
            loss_checker: HysteresisChecker::default(),
            notify_status: false,

            ssrc: None,
            window: None,
            rx_history: History::default(),
            tx_history: History::default(),
            lost_history: History::default(),
            encoder: RtcpXrEncoder::new(),

            call_quality: CallQuality::default(),
            sum_relative_jitter: 0,
            sum_round_trip_time: 0,
            count_round_trip_time: 0,
            current_buffer_size: 0,
            max_buffer_size: 0,
            level_rx: 0,
            level_lost: 0,

            status: MediaQualityStatus::default(),
            jitter_rx: 0.0,
            num_rx: 0,
            num_rtcp: 0,
            rtp_inactivity_ms: 0,
            rtcp_inactivity_ms: 0,

            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
        }
    }

    /// Applies a stream configuration. Anything beyond a re-send of the same
    /// codec, bandwidth and receive direction resets the analyzer.
    pub fn set_config(&mut self, config: AnalyzerConfig) {
        if !self.config.is_same_stream(&config) {
            self.config = config;
            self.reset();
        }

        self.rx_enabled = config.direction.contains_receive();
        self.call_quality.codec_type = AudioQuality::new(config.codec, config.evs_bandwidth);
        self.encoder
            .set_sampling_rate(config.codec.sampling_rate_khz());

        let rtcp_enabled = config.rtcp_enabled();
        if self.rtcp_enabled != rtcp_enabled {
            self.rtcp_enabled = rtcp_enabled;
            self.rtcp_inactivity_ms = 0;
            self.num_rtcp = 0;
        }
        self.config = config;

        info!(
            "analyzer config codec[{:?}] bandwidth[{:?}] rx[{}] rtcp[{}]",
            config.codec, config.evs_bandwidth, self.rx_enabled, self.rtcp_enabled
        );
    }

    /// Replaces the notification thresholds, re-arming every inactivity
    /// threshold and clearing the current status.
    pub fn set_threshold(&mut self, threshold: MediaQualityThreshold) {
        let mut armed = threshold.rtp_inactivity_timer_millis.clone();
        armed.sort_unstable();
        self.armed_rtp_inactivity = armed;
        self.notify_status = threshold.notify_current_status;

        self.rtp_inactivity_ms = 0;
        self.rtcp_inactivity_ms = 0;
        self.num_rtcp = 0;
        self.status = MediaQualityStatus::default();

        self.jitter_checker
            .initialize(threshold.rtp_hysteresis_time_in_millis);
        self.loss_checker
            .initialize(threshold.rtp_hysteresis_time_in_millis);
        debug!("analyzer threshold {threshold:?}");
        self.threshold = threshold;
    }

    /// Restarts tick counting and the call duration at `now`.
    pub fn start(&mut self, now: Instant) {
        debug!("analyzer start");
        self.started = now;
        self.eto = now + self.interval;
        self.last_now = now;
        self.tick_count = 0;
    }

    /// Clears all per-call state. Configuration, thresholds and the report
    /// encoder's cumulative counters are kept.
    pub fn reset(&mut self) {
        self.ssrc = None;
        self.window = None;

        self.call_quality = CallQuality {
            codec_type: AudioQuality::new(self.config.codec, self.config.evs_bandwidth),
            ..Default::default()
        };
        self.sum_relative_jitter = 0;
        self.sum_round_trip_time = 0;
        self.count_round_trip_time = 0;
        self.current_buffer_size = 0;
        self.max_buffer_size = 0;
        self.level_rx = 0;
        self.level_lost = 0;

        self.rx_history.clear();
        self.tx_history.clear();
        self.lost_history.clear();
        self.num_rx = 0;
        self.jitter_rx = 0.0;

        self.rtp_inactivity_ms = 0;
        self.rtcp_inactivity_ms = 0;
        self.num_rtcp = 0;
        self.status = MediaQualityStatus::default();

        self.jitter_checker
            .initialize(self.threshold.rtp_hysteresis_time_in_millis);
        self.loss_checker
            .initialize(self.threshold.rtp_hysteresis_time_in_millis);
    }

    pub fn call_quality(&self) -> CallQuality {
        self.call_quality.clone()
    }

    pub fn media_quality_status(&self) -> MediaQualityStatus {
        self.status
    }

    pub fn rx_history_len(&self) -> usize {
        self.rx_history.len()
    }

    pub fn tx_history_len(&self) -> usize {
        self.tx_history.len()
    }

    /// Number of lost packets across the recorded loss runs.
    pub fn lost_packet_count(&self) -> u32 {
        self.lost_history.iter().map(|l| l.count).sum()
    }

    pub fn report_window(&self) -> Option<ReportWindow> {
        self.window
    }

    pub fn encoder(&self) -> &RtcpXrEncoder {
        &self.encoder
    }

    /// Builds an RTCP XR report over the current window, then advances the
    /// window past its end and evicts the reported history.
    pub fn build_report(&mut self, block_types: XrBlockTypes) -> Result<Bytes> {
        let window = self.window.unwrap_or(EMPTY_WINDOW);
        let report = self
            .encoder
            .create_report(block_types, &self.rx_history, &self.lost_history, window)
            .inspect_err(|err| warn!("failed to build xr report: {err}"))?;

        if let Some(window) = self.window.as_mut() {
            let reported = *window;
            window.advance();

            let end = reported.end;
            let keep = |seq: u16| !reported.contains(seq) && seq != end && is_newer_seq(seq, end);
            self.rx_history.retain(|p| keep(p.seq));
            self.tx_history.retain(|p| keep(p.seq));
            self.lost_history.retain(|l| keep(l.seq));
        }

        debug!(
            "xr report {:?} size[{}] next window {:?}",
            block_types,
            report.len(),
            self.window
        );
        Ok(report)
    }

    fn ingest(&mut self, event: AnalyzerEvent) {
        match event {
            AnalyzerEvent::RtpTransmitted(sample) => {
                self.tx_history.push(sample);
                self.call_quality.num_rtp_packets_transmitted += 1;
                trace!("tx seq[{}] history[{}]", sample.seq, self.tx_history.len());
            }
            AnalyzerEvent::RtpReceived(sample) => self.collect_received(sample),
            AnalyzerEvent::RtcpReceived => {
                self.num_rtcp += 1;
                trace!("rtcp received[{}]", self.num_rtcp);
            }
            AnalyzerEvent::Optional(OptionalInfo::RoundTripDelay(delay)) => {
                self.sum_round_trip_time += delay as u64;
                self.count_round_trip_time += 1;
                self.call_quality.average_round_trip_time =
                    (self.sum_round_trip_time / self.count_round_trip_time as u64) as u32;
                self.encoder.set_round_trip_delay(delay);
            }
            AnalyzerEvent::Optional(OptionalInfo::PacketLossGap { seq, count, time }) => {
                self.lost_history.push(LostPacket::new(seq, count, time));
                for _ in 0..count {
                    self.encoder.stack_rx_status(RtpStatus::Lost, 0);
                }
                self.call_quality.num_rtp_packets_not_received += count;
                self.level_lost += count;
                trace!(
                    "lost seq[{}] count[{}] history[{}]",
                    seq,
                    count,
                    self.lost_history.len()
                );
            }
            AnalyzerEvent::RxStatus { seq, status, time } => {
                self.collect_rx_status(seq, status, time)
            }
            AnalyzerEvent::BufferSize { current, max } => {
                self.current_buffer_size = current;
                self.max_buffer_size = max;
                self.encoder.set_jitter_buffer_status(current, max);
            }
        }
    }

    fn collect_received(&mut self, sample: QualitySample) {
        let quality = &mut self.call_quality;
        quality.num_rtp_packets_received += 1;
        self.sum_relative_jitter += sample.jitter as i64;
        if quality.max_relative_jitter < sample.jitter {
            quality.max_relative_jitter = sample.jitter;
        }
        quality.average_relative_jitter =
            (self.sum_relative_jitter / quality.num_rtp_packets_received as i64) as i32;

        match sample.data_type {
            RtpDataType::NoData => quality.num_no_data_frames += 1,
            RtpDataType::Sid => quality.num_rtp_sid_packets_received += 1,
            RtpDataType::Normal => {}
        }

        let jitter = sample.jitter.unsigned_abs() as f64;
        if self.ssrc != Some(sample.ssrc) {
            debug!("rx ssrc {:?} -> {:#x}", self.ssrc, sample.ssrc);
            self.jitter_rx = jitter;
            self.encoder.set_ssrc(sample.ssrc);
        } else {
            self.jitter_rx += (jitter - self.jitter_rx) * JITTER_SMOOTHING_FACTOR;
        }
        self.ssrc = Some(sample.ssrc);
        self.num_rx += 1;
        self.rx_history.push(sample);

        trace!(
            "rx seq[{}] jitter[{}] history[{}]",
            sample.seq,
            sample.jitter,
            self.rx_history.len()
        );
    }

    fn collect_rx_status(&mut self, seq: u16, status: RtpStatus, time: u32) {
        if self.rx_history.is_empty() {
            return;
        }

        let arrival = match self.rx_history.iter_mut().rev().find(|p| p.seq == seq) {
            Some(packet) => {
                packet.status = status;
                packet.arrival
            }
            None => {
                warn!("no received packet for status seq[{seq}] {status:?}");
                return;
            }
        };

        let delay = time.wrapping_sub(arrival);
        self.encoder.stack_rx_status(status, delay);
        self.call_quality.record_playout_delay(delay);
        trace!("rx status seq[{seq}] {status:?} delay[{delay}]");

        match status {
            RtpStatus::Normal => {
                self.call_quality.num_voice_frames += 1;
                self.level_rx += 1;
            }
            RtpStatus::Late | RtpStatus::Discarded => {
                self.call_quality.num_dropped_rtp_packets += 1;
                self.level_rx += 1;
            }
            RtpStatus::Duplicated => {
                self.call_quality.num_rtp_duplicate_packets += 1;
                self.level_rx += 1;
            }
            RtpStatus::NotDefined | RtpStatus::Lost => {}
        }

        match self.window.as_mut() {
            None => self.window = Some(ReportWindow::new(seq, seq)),
            Some(window) => window.extend(seq),
        }
    }

    fn tick_millis(&self) -> u32 {
        self.interval.as_millis() as u32
    }

    fn process_tick(&mut self, now: Instant) {
        let tick = self.tick_count;
        trace!("tick[{tick}]");

        if tick == INACTIVITY_TICKS_FOR_CALL_QUALITY
            && self.call_quality.num_rtp_packets_received == 0
        {
            self.call_quality.rtp_inactivity_detected = true;
            self.notify_call_quality(now);
        }

        if tick % CALL_QUALITY_MONITORING_TICKS == 0 {
            let loss_rate = if self.level_rx == 0 {
                0.0
            } else {
                self.level_lost as f64 / (self.level_lost + self.level_rx) as f64 * 100.0
            };
            let level = QualityLevel::from_loss_rate(loss_rate);
            debug!(
                "call quality lost[{}] received[{}] level[{:?}]",
                self.level_lost, self.level_rx, level
            );

            if self.call_quality.downlink_call_quality_level != level {
                self.call_quality.downlink_call_quality_level = level;
                self.notify_call_quality(now);
            }
            self.level_lost = 0;
            self.level_rx = 0;
        }

        self.process_media_quality(now);
    }

    fn process_media_quality(&mut self, now: Instant) {
        let tick_ms = self.tick_millis();

        if self.num_rx == 0 && self.rx_enabled {
            self.rtp_inactivity_ms += tick_ms;
        } else {
            self.rtp_inactivity_ms = 0;
            self.num_rx = 0;
            self.armed_rtp_inactivity = self.threshold.rtp_inactivity_timer_millis.clone();
            self.armed_rtp_inactivity.sort_unstable();
        }

        if self.num_rtcp == 0 && self.rtcp_enabled {
            self.rtcp_inactivity_ms += tick_ms;
        } else {
            self.rtcp_inactivity_ms = 0;
            self.num_rtcp = 0;
        }

        self.status.rtp_inactivity_time_millis = self.rtp_inactivity_ms;
        self.status.rtcp_inactivity_time_millis = self.rtcp_inactivity_ms;
        self.status.rtp_jitter_millis = self.jitter_rx as u32;
        self.status.rtp_packet_loss_rate = self.windowed_loss_rate(now);

        let mut should_notify = false;
        if !self.threshold.rtp_jitter_millis.is_empty()
            && self.rx_enabled
            && self.jitter_checker.check_notifiable(
                &self.threshold.rtp_jitter_millis,
                self.status.rtp_jitter_millis,
                tick_ms,
            )
        {
            should_notify = true;
        }
        if !self.threshold.rtp_packet_loss_rate.is_empty()
            && self.rx_enabled
            && self.loss_checker.check_notifiable(
                &self.threshold.rtp_packet_loss_rate,
                self.status.rtp_packet_loss_rate,
                tick_ms,
            )
        {
            should_notify = true;
        }

        trace!(
            "media quality rtp inactivity[{}] rtcp inactivity[{}] loss[{}] jitter[{}]",
            self.status.rtp_inactivity_time_millis,
            self.status.rtcp_inactivity_time_millis,
            self.status.rtp_packet_loss_rate,
            self.status.rtp_jitter_millis
        );

        if self.notify_status {
            self.notify_status = false;
            self.notify_media_quality_status();
            return;
        }

        if self.rx_enabled {
            let inactivity = self.rtp_inactivity_ms;
            if let Some(pos) = self
                .armed_rtp_inactivity
                .iter()
                .position(|t| *t != 0 && inactivity >= *t)
            {
                let crossed = self.armed_rtp_inactivity.remove(pos);
                debug!("rtp inactivity {inactivity}ms crossed {crossed}ms");
                self.notify_media_quality_status();
                return;
            }
        }

        let rtcp_threshold = self.threshold.rtcp_inactivity_timer_millis;
        if self.rtcp_enabled && rtcp_threshold != 0 && self.rtcp_inactivity_ms == rtcp_threshold {
            debug!("rtcp inactivity {rtcp_threshold}ms");
            self.notify_media_quality_status();
            self.rtcp_inactivity_ms = 0;
            return;
        }

        if should_notify {
            self.notify_media_quality_status();
        }
    }

    /// Loss rate in percent over the configured loss window ending at `now`.
    fn windowed_loss_rate(&self, now: Instant) -> u32 {
        let duration = self.threshold.rtp_packet_loss_duration_millis;
        if duration == 0 || self.lost_history.is_empty() {
            return 0;
        }

        let now_ms = self.clock.millis_at(now);
        let received = self
            .rx_history
            .iter()
            .filter(|p| now_ms.wrapping_sub(p.arrival) <= duration)
            .count() as u32;
        let lost: u32 = self
            .lost_history
            .iter()
            .filter(|l| now_ms.wrapping_sub(l.marked_time) <= duration)
            .map(|l| l.count)
            .sum();

        if received == 0 || lost == 0 {
            return 0;
        }
        let loss_rate = lost * 100 / (received + lost);
        debug!("loss rate[{loss_rate}] received[{received}] lost[{lost}]");
        loss_rate
    }

    fn notify_call_quality(&mut self, now: Instant) {
        self.call_quality.call_duration =
            now.saturating_duration_since(self.started).as_millis() as u32;
        debug!("notify call quality duration[{}]", self.call_quality.call_duration);
        self.read_queue
            .push_back(QualityNotification::CallQuality(self.call_quality.clone()));

        self.call_quality.min_playout_delay_millis = 0;
        self.call_quality.max_playout_delay_millis = 0;
    }

    fn notify_media_quality_status(&mut self) {
        debug!("notify media quality status {:?}", self.status);
        self.read_queue
            .push_back(QualityNotification::MediaQualityStatus(self.status));
    }
}

impl sansio::Protocol<AnalyzerEvent, XrBlockTypes, ()> for MediaQualityAnalyzer {
    type Rout = QualityNotification;
    type Wout = Bytes;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: AnalyzerEvent) -> Result<()> {
        self.ingest(msg);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, msg: XrBlockTypes) -> Result<()> {
        let report = self.build_report(msg)?;
        self.write_queue.push_back(report);
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_queue.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        self.last_now = self.last_now.max(now);
        if self.eto <= now {
            self.eto = now + self.interval;
            self.tick_count += 1;
            self.process_tick(now);
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        Some(self.eto)
    }

    /// Emits the final call quality summary, timed at the latest timeout
    /// seen, and clears per-call state.
    fn close(&mut self) -> Result<()> {
        self.notify_call_quality(self.last_now);
        self.reset();
        Ok(())
    }
}
