use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use shared::util::{is_newer_seq, seq_gap, ts_at_or_after};

use crate::audio::jitter_analyzer::{BufferSizePolicy, FixedSizePolicy, JitterAnalyzer};
use crate::codec::AudioCodec;
use crate::packet::{PlayoutFrame, QualitySample, ReceivedPacket, RtpDataType, RtpStatus};
use crate::reporter::{NoopReporter, RxStatusReporter};

pub(crate) const DEFAULT_MIN_SIZE: u32 = 3;
pub(crate) const DEFAULT_MAX_SIZE: u32 = 9;
pub(crate) const DEFAULT_INIT_SIZE: u32 = 4;
pub(crate) const DEFAULT_FRAME_INTERVAL: u32 = 20;

/// Playout time between two buffer size updates, in ms.
const UPDATE_INTERVAL: u32 = 2000;
/// Timestamp drift absorbed without resync, in ms.
const ALLOWABLE_ERROR: u32 = 10;
/// Failed playout time after which catch-up mode is armed, in ms.
const RESET_THRESHOLD: u32 = 10000;
/// Forward timestamp jump treated as a discontinuity, in ms.
const TS_ROUND_GUARD: u32 = 3000;
/// SID run length after which queued SID frames are dropped to cut latency.
const SID_SHRINK_RUN: u32 = 4;

/// Builder for the [`JitterBuffer`].
///
/// # Example
///
/// ```
/// use rtc_media::audio::JitterBufferBuilder;
/// use rtc_media::codec::AudioCodec;
///
/// let jitter_buffer = JitterBufferBuilder::new()
///     .with_codec(AudioCodec::Evs)
///     .with_size_bounds(4, 3, 9)
///     .build();
/// assert_eq!(jitter_buffer.current_size(), 4);
/// ```
pub struct JitterBufferBuilder {
    init_size: u32,
    min_size: u32,
    max_size: u32,
    frame_interval: u32,
    ignore_sid: bool,
    codec: AudioCodec,
    ssrc: u32,
    policy: Option<Box<dyn BufferSizePolicy>>,
    reporter: Option<Arc<dyn RxStatusReporter>>,
}

impl Default for JitterBufferBuilder {
    fn default() -> Self {
        Self {
            init_size: DEFAULT_INIT_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            ignore_sid: false,
            codec: AudioCodec::default(),
            ssrc: 0,
            policy: None,
            reporter: None,
        }
    }
}

impl JitterBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial, minimum and maximum depth in packetization intervals.
    /// Zero keeps the default for that value.
    pub fn with_size_bounds(mut self, init_size: u32, min_size: u32, max_size: u32) -> Self {
        self.init_size = init_size;
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Packetization interval of the codec in ms.
    pub fn with_frame_interval(mut self, frame_interval: u32) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// Tracks the transit base on speech frames only and compensates the
    /// arrival time of frames that arrive behind it.
    pub fn with_ignore_sid(mut self, ignore_sid: bool) -> Self {
        self.ignore_sid = ignore_sid;
        self
    }

    pub fn with_codec(mut self, codec: AudioCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn BufferSizePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RxStatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> JitterBuffer {
        let analyzer = JitterAnalyzer::new(
            self.policy
                .unwrap_or_else(|| Box::new(FixedSizePolicy) as Box<dyn BufferSizePolicy>),
        );
        let mut state = JitterState::new(self.codec, self.ssrc, self.ignore_sid, analyzer);
        state.set_frame_interval(self.frame_interval);
        state.configure(self.init_size, self.min_size, self.max_size);

        JitterBuffer {
            state: Mutex::new(state),
            reporter: self
                .reporter
                .unwrap_or_else(|| Arc::new(NoopReporter) as Arc<dyn RxStatusReporter>),
        }
    }
}

/// Adaptive audio jitter buffer.
///
/// Packets are kept in sequence order, with wraparound-aware comparison, and
/// released by [`get`](JitterBuffer::get) one per packetization interval once
/// the configured depth has been reached. Every packet's fate (played, late,
/// discarded, duplicated) and every loss gap is reported to the
/// [`RxStatusReporter`].
///
/// All methods take `&self`; the queue is guarded by a single mutex so the
/// transport and the playout thread can share one instance.
pub struct JitterBuffer {
    state: Mutex<JitterState>,
    reporter: Arc<dyn RxStatusReporter>,
}

impl JitterBuffer {
    fn lock(&self) -> MutexGuard<'_, JitterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the initial, minimum and maximum depth in packetization intervals.
    ///
    /// Zero keeps the previous value. The initial size is clamped into
    /// `[min, max]` and becomes the current size.
    pub fn configure(&self, init_size: u32, min_size: u32, max_size: u32) {
        self.lock().configure(init_size, min_size, max_size);
    }

    pub fn set_frame_interval(&self, frame_interval: u32) {
        self.lock().set_frame_interval(frame_interval);
    }

    pub fn set_codec(&self, codec: AudioCodec) {
        self.lock().codec = codec;
    }

    pub fn set_ssrc(&self, ssrc: u32) {
        self.lock().ssrc = ssrc;
    }

    pub fn current_size(&self) -> u32 {
        self.lock().curr_size
    }

    pub fn size_bounds(&self) -> (u32, u32) {
        let state = self.lock();
        (state.min_size, state.max_size)
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Queues a received packet.
    ///
    /// A quality sample is reported for every packet. Empty payloads carry no
    /// media and are not queued.
    pub fn add(&self, packet: ReceivedPacket) {
        self.lock().add(packet, &*self.reporter);
    }

    /// Returns the frame due for playout at `now`, or `None` when nothing is
    /// ready this interval.
    pub fn get(&self, now: u32) -> Option<PlayoutFrame> {
        self.lock().get(now, &*self.reporter)
    }

    /// Drops every queued packet, reporting each as discarded, and restarts
    /// filling at the initial size.
    pub fn reset(&self) {
        self.lock().reset(&*self.reporter);
    }
}

struct JitterState {
    codec: AudioCodec,
    ssrc: u32,
    frame_interval: u32,
    ignore_sid: bool,

    init_size: u32,
    min_size: u32,
    max_size: u32,
    curr_size: u32,

    queue: VecDeque<ReceivedPacket>,
    analyzer: JitterAnalyzer,
    // transit base of speech frames, used when SID frames are ignored
    base: Option<(u32, u32)>,
    need_update_base: bool,

    first_frame_received: bool,
    last_played_seq: u16,
    curr_playing_ts: u32,
    dtx_on: bool,
    sid_count: u32,
    waiting: bool,
    delete_count: u32,
    cannot_get_count: u32,
    update_check_count: u32,
    enforce_update: bool,
    last_time: u32,
}

impl JitterState {
    fn new(codec: AudioCodec, ssrc: u32, ignore_sid: bool, analyzer: JitterAnalyzer) -> Self {
        Self {
            codec,
            ssrc,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            ignore_sid,

            init_size: DEFAULT_INIT_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            curr_size: DEFAULT_INIT_SIZE,

            queue: VecDeque::new(),
            analyzer,
            base: None,
            need_update_base: false,

            first_frame_received: false,
            last_played_seq: 0,
            curr_playing_ts: 0,
            dtx_on: false,
            sid_count: 0,
            waiting: true,
            delete_count: 0,
            cannot_get_count: 0,
            update_check_count: 0,
            enforce_update: false,
            last_time: 0,
        }
    }

    fn configure(&mut self, init_size: u32, min_size: u32, max_size: u32) {
        if min_size > 0 {
            self.min_size = min_size;
        }
        if max_size > 0 {
            self.max_size = max_size;
        }
        if self.max_size < self.min_size {
            warn!(
                "jitter buffer max size {} below min size {}, raised",
                self.max_size, self.min_size
            );
            self.max_size = self.min_size;
        }
        if init_size > 0 {
            self.init_size = init_size;
        }
        self.init_size = self.init_size.clamp(self.min_size, self.max_size);
        self.curr_size = self.init_size;

        debug!(
            "jitter buffer size init[{}] min[{}] max[{}]",
            self.init_size, self.min_size, self.max_size
        );
        self.analyzer
            .set_min_max_size(self.min_size, self.max_size);
    }

    fn set_frame_interval(&mut self, frame_interval: u32) {
        if frame_interval == 0 {
            warn!("zero frame interval ignored, keeping {}", self.frame_interval);
            return;
        }
        self.frame_interval = frame_interval;
    }

    fn is_sid(&self, size: usize) -> bool {
        self.codec.is_sid(size)
    }

    fn track_sid(&mut self, size: usize) {
        if self.is_sid(size) {
            self.sid_count += 1;
            self.dtx_on = true;
        } else {
            self.sid_count = 0;
        }
    }

    fn set_base(&mut self, timestamp: u32, arrival: u32) {
        self.base = Some((timestamp, arrival));
        self.analyzer.update_base(timestamp, arrival);
    }

    /// Moves the transit base forward, or pulls the arrival time of a frame
    /// that arrived behind the base back onto it.
    fn compensate_arrival(&mut self, packet: &mut ReceivedPacket) {
        match self.base {
            Some((base_ts, base_arrival)) if !self.need_update_base => {
                if base_ts > packet.timestamp || base_arrival > packet.arrival {
                    // counters wrapped
                    self.set_base(packet.timestamp, packet.arrival);
                } else if packet.timestamp - base_ts > packet.arrival - base_arrival {
                    self.set_base(packet.timestamp, packet.arrival);
                } else {
                    let compensated = base_arrival.wrapping_add(packet.timestamp - base_ts);
                    trace!(
                        "compensate arrival seq[{}] {} -> {}",
                        packet.seq, packet.arrival, compensated
                    );
                    packet.arrival = compensated;
                }
            }
            _ => {
                self.set_base(packet.timestamp, packet.arrival);
                self.need_update_base = false;
            }
        }
    }

    fn add(&mut self, mut packet: ReceivedPacket, reporter: &dyn RxStatusReporter) {
        if self.cannot_get_count > self.max_size {
            debug!(
                "reset after {} intervals without playout",
                self.cannot_get_count
            );
            self.reset(reporter);
        }

        let arrival = packet.arrival;
        let size = packet.size();
        let is_sid = self.is_sid(size);

        let jitter = if !self.ignore_sid {
            let jitter = self
                .analyzer
                .transit_time_difference(packet.timestamp, arrival);
            self.analyzer.update_base(packet.timestamp, arrival);
            jitter
        } else if !is_sid {
            self.compensate_arrival(&mut packet);
            self.analyzer
                .transit_time_difference(packet.timestamp, arrival)
        } else {
            0
        };

        let data_type = if size == 0 {
            RtpDataType::NoData
        } else if is_sid {
            RtpDataType::Sid
        } else {
            RtpDataType::Normal
        };
        reporter.collect_packet(QualitySample {
            ssrc: self.ssrc,
            seq: packet.seq,
            jitter,
            arrival,
            data_type,
            status: RtpStatus::NotDefined,
        });

        if size == 0 || !packet.valid {
            return;
        }

        trace!(
            "add seq[{}] mark[{}] ts[{}] size[{}] queue[{}] arrival[{}]",
            packet.seq,
            packet.mark,
            packet.timestamp,
            size,
            self.queue.len() + 1,
            packet.arrival
        );
        self.insert(packet);
    }

    fn insert(&mut self, packet: ReceivedPacket) {
        match self.queue.back() {
            Some(last) if !is_newer_seq(packet.seq, last.seq) => {
                let pos = self
                    .queue
                    .iter()
                    .position(|entry| !is_newer_seq(packet.seq, entry.seq))
                    .unwrap_or(self.queue.len());
                self.queue.insert(pos, packet);
            }
            _ => self.queue.push_back(packet),
        }
    }

    fn front(&self) -> Option<(u16, u32, usize, u32)> {
        self.queue
            .front()
            .map(|p| (p.seq, p.timestamp, p.size(), p.arrival))
    }

    fn get(&mut self, now: u32, reporter: &dyn RxStatusReporter) -> Option<PlayoutFrame> {
        let interval = self.frame_interval;
        let mut force = false;
        self.last_time = now;
        self.update_check_count += 1;

        if self.update_check_count * interval > UPDATE_INTERVAL {
            self.curr_size = self.analyzer.next_buffer_size(self.curr_size, now);
            self.update_check_count = 0;
        }

        if self.cannot_get_count * interval > RESET_THRESHOLD {
            debug!("enforce update after {} empty intervals", self.cannot_get_count);
            self.enforce_update = true;
            self.waiting = false;
            self.cannot_get_count = 0;
        }

        let Some((seq, _, _, arrival)) = self.front() else {
            trace!("get: empty");
            if !self.waiting {
                self.curr_playing_ts = self.curr_playing_ts.wrapping_add(interval);
            }
            return None;
        };

        if self.waiting {
            let delay = now.wrapping_sub(arrival);
            if delay <= self.curr_size.saturating_sub(1) * interval || !self.resync(now, reporter)
            {
                trace!(
                    "get: wait seq[{}] size[{}] delay[{}] queue[{}]",
                    seq,
                    self.curr_size,
                    delay,
                    self.queue.len()
                );
                return None;
            }
            self.waiting = false;
        }

        if let Some((seq, ts, _, _)) = self.front() {
            let drift = ts.wrapping_sub(self.curr_playing_ts) as i32;
            if drift != 0 && drift.unsigned_abs() < ALLOWABLE_ERROR {
                trace!("sync playing ts {} -> {} seq[{}]", self.curr_playing_ts, ts, seq);
                self.curr_playing_ts = ts;
            }
        }

        while let Some((seq, ts, size, _)) = self.front() {
            let len = self.queue.len() as u32;
            if self.delete_count > self.min_size && len < self.curr_size + 1 {
                self.curr_playing_ts = resync_playing_ts(ts, len, self.curr_size, interval);
                debug!(
                    "resync after {} late packets, playing ts[{}]",
                    self.delete_count, self.curr_playing_ts
                );
                self.need_update_base = true;
                self.delete_count = 0;
                break;
            }

            if self.first_frame_received && seq == self.last_played_seq {
                trace!("get: duplicate seq[{seq}]");
                reporter.collect_rx_status(seq, RtpStatus::Duplicated, now);
                self.queue.pop_front();
                self.delete_count += 1;
                continue;
            }

            if ts_at_or_after(ts, self.curr_playing_ts) {
                let diff = ts.wrapping_sub(self.curr_playing_ts);
                self.delete_count = 0;
                if diff > 0 && diff < interval {
                    force = true;
                }
                break;
            }

            trace!("get: late seq[{}] ts[{}] playing ts[{}]", seq, ts, self.curr_playing_ts);
            self.track_sid(size);
            reporter.collect_rx_status(seq, RtpStatus::Late, now);
            self.delete_count += 1;
            self.queue.pop_front();
        }

        if self.dtx_on && self.sid_count > SID_SHRINK_RUN && self.queue.len() as u32 > self.curr_size
        {
            if let Some((seq, _, size, _)) = self.front() {
                if self.is_sid(size) {
                    trace!("get: drop SID seq[{}] queue[{}]", seq, self.queue.len());
                    self.sid_count += 1;
                    reporter.collect_rx_status(seq, RtpStatus::Discarded, now);
                    self.delete_count += 1;
                    self.queue.pop_front();
                    force = true;
                }
            }
        }

        if let Some((seq, ts, _, _)) = self.front() {
            if ts.wrapping_sub(self.curr_playing_ts) > TS_ROUND_GUARD {
                debug!(
                    "timestamp jump seq[{}] ts[{}] playing ts[{}], force play",
                    seq, ts, self.curr_playing_ts
                );
                force = true;
            }
        }

        if self.enforce_update {
            while self.queue.len() as u32 > self.curr_size + 1 {
                let Some(packet) = self.queue.pop_front() else {
                    break;
                };
                if self.is_sid(packet.size()) {
                    self.sid_count += 1;
                    self.dtx_on = true;
                } else {
                    self.sid_count = 0;
                    self.dtx_on = false;
                }
                reporter.collect_rx_status(packet.seq, RtpStatus::Discarded, now);
            }

            let len = self.queue.len() as u32;
            if len < 2 || len < self.curr_size.saturating_sub(self.min_size) {
                trace!("get: catch-up waiting for {} packets", len);
                return None;
            }
            self.enforce_update = false;
            force = true;
        }

        if let Some((seq, _, _, _)) = self.front() {
            if self.first_frame_received && seq == self.last_played_seq {
                trace!("get: duplicate seq[{seq}]");
                reporter.collect_rx_status(seq, RtpStatus::Duplicated, now);
                self.queue.pop_front();
                self.delete_count += 1;
            }
        }

        let ready = self
            .queue
            .front()
            .is_some_and(|p| p.timestamp == self.curr_playing_ts || force);
        if ready {
            if let Some(packet) = self.queue.pop_front() {
                return Some(self.deliver(packet, now, reporter));
            }
        }

        if !self.dtx_on {
            self.cannot_get_count += 1;
        }
        trace!(
            "get: no data dtx[{}] playing ts[{}]",
            self.dtx_on, self.curr_playing_ts
        );
        self.curr_playing_ts = self.curr_playing_ts.wrapping_add(interval);
        None
    }

    fn deliver(
        &mut self,
        packet: ReceivedPacket,
        now: u32,
        reporter: &dyn RxStatusReporter,
    ) -> PlayoutFrame {
        self.track_sid(packet.size());

        if self.first_frame_received && is_newer_seq(packet.seq, self.last_played_seq) {
            let gap = seq_gap(packet.seq, self.last_played_seq);
            if gap > 1 {
                reporter.collect_loss_gap(
                    self.last_played_seq.wrapping_add(1),
                    (gap - 1) as u32,
                    now,
                );
            }
        }

        trace!(
            "get: ok dtx[{}] seq[{}] ts[{}] size[{}] delay[{}] queue[{}]",
            self.dtx_on,
            packet.seq,
            packet.timestamp,
            packet.size(),
            now.wrapping_sub(packet.arrival),
            self.queue.len()
        );

        self.curr_playing_ts = packet.timestamp.wrapping_add(self.frame_interval);
        self.first_frame_received = true;
        self.last_played_seq = packet.seq;
        self.cannot_get_count = 0;
        reporter.collect_rx_status(packet.seq, RtpStatus::Normal, now);
        reporter.collect_buffer_size(
            self.curr_size * self.frame_interval,
            self.max_size * self.frame_interval,
        );

        packet.into()
    }

    /// Skips packets that waited too long and anchors the playout clock on
    /// the first one still within budget.
    fn resync(&mut self, now: u32, reporter: &dyn RxStatusReporter) -> bool {
        let interval = self.frame_interval;

        while let Some((seq, ts, size, arrival)) = self.front() {
            let delay = now.wrapping_sub(arrival);
            if delay > self.curr_size * interval + ALLOWABLE_ERROR {
                trace!("resync: stale seq[{seq}] delay[{delay}]");
                reporter.collect_rx_status(seq, RtpStatus::Late, now);
                self.queue.pop_front();
                continue;
            }

            if !self.is_sid(size) || delay > self.curr_size.saturating_sub(1) * interval {
                debug!("resync: playing ts[{ts}] delay[{delay}]");
                self.curr_playing_ts = ts;
                return true;
            }
            break;
        }

        false
    }

    fn reset(&mut self, reporter: &dyn RxStatusReporter) {
        for packet in self.queue.drain(..) {
            reporter.collect_rx_status(packet.seq, RtpStatus::Discarded, self.last_time);
        }

        self.curr_size = self.init_size;
        self.base = None;
        self.need_update_base = false;
        self.first_frame_received = false;
        self.last_played_seq = 0;
        self.curr_playing_ts = 0;
        self.dtx_on = false;
        self.sid_count = 0;
        self.waiting = true;
        self.delete_count = 0;
        self.cannot_get_count = 0;
        self.update_check_count = 0;
        self.enforce_update = false;

        self.analyzer.reset();
        self.analyzer
            .set_min_max_size(self.min_size, self.max_size);
    }
}

/// Playing timestamp that leaves `len` queued frames short of the depth
/// halfway between `curr_size` and the default minimum.
fn resync_playing_ts(ts: u32, len: u32, curr_size: u32, interval: u32) -> u32 {
    let target = (curr_size + DEFAULT_MIN_SIZE) / 2;
    if len >= target {
        ts
    } else {
        ts.wrapping_sub((target - len) * interval)
    }
}
