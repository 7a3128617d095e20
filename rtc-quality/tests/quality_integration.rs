//! Integration tests for the quality analyzer fed by the audio jitter buffer.

use bytes::Bytes;
use media::audio::{JitterBuffer, JitterBufferBuilder};
use media::codec::AudioCodec;
use media::packet::{QualitySample, ReceivedPacket, RtpStatus};
use media::reporter::RxStatusReporter;
use rtc_quality::{
    AnalyzerEvent, AnalyzerWorker, CallQuality, MediaQualityAnalyzer,
    MediaQualityAnalyzerBuilder, MediaQualityStatus, MediaQualityThreshold, OptionalInfo,
    QualityListener, QualityNotification, ReportWindow,
};
use rtcp::extended_report::{ReportBlock, XrBlockTypes};
use shared::marshal::Unmarshal;
use shared::time::MediaClock;
use sansio::Protocol;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const FRAME: u32 = 20;
const START: u32 = 1000;
const SSRC: u32 = 0xcafe_f00d;

/// Collects what the jitter buffer reports, in order.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<AnalyzerEvent>>,
}

impl EventLog {
    fn take(&self) -> Vec<AnalyzerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl RxStatusReporter for EventLog {
    fn collect_packet(&self, sample: QualitySample) {
        self.events
            .lock()
            .unwrap()
            .push(AnalyzerEvent::RtpReceived(sample));
    }

    fn collect_rx_status(&self, seq: u16, status: RtpStatus, time: u32) {
        self.events
            .lock()
            .unwrap()
            .push(AnalyzerEvent::RxStatus { seq, status, time });
    }

    fn collect_loss_gap(&self, seq: u16, count: u32, time: u32) {
        self.events
            .lock()
            .unwrap()
            .push(AnalyzerEvent::Optional(OptionalInfo::PacketLossGap {
                seq,
                count,
                time,
            }));
    }

    fn collect_buffer_size(&self, current: u32, max: u32) {
        self.events
            .lock()
            .unwrap()
            .push(AnalyzerEvent::BufferSize { current, max });
    }
}

#[derive(Default)]
struct Recorder {
    qualities: Mutex<Vec<CallQuality>>,
    statuses: Mutex<Vec<MediaQualityStatus>>,
}

impl QualityListener for Recorder {
    fn on_call_quality(&self, quality: &CallQuality) {
        self.qualities.lock().unwrap().push(quality.clone());
    }

    fn on_media_quality_status(&self, status: &MediaQualityStatus) {
        self.statuses.lock().unwrap().push(*status);
    }
}

fn jitter_buffer(reporter: Arc<dyn RxStatusReporter>) -> JitterBuffer {
    let _ = env_logger::builder().is_test(true).try_init();
    JitterBufferBuilder::new()
        .with_codec(AudioCodec::AmrWb)
        .with_ssrc(SSRC)
        .with_size_bounds(4, 3, 9)
        .with_reporter(reporter)
        .build()
}

fn analyzer(start: Instant) -> MediaQualityAnalyzer {
    MediaQualityAnalyzerBuilder::new()
        .with_clock(MediaClock::with_epoch(start))
        .with_start_time(start)
        .build()
}

/// Plays `count` packets one per tick with `missing` never sent.
fn play_stream(jb: &JitterBuffer, count: u16, missing: &[u16], extra: u32) -> Vec<u16> {
    let mut played = vec![];
    for tick in 0..count as u32 + extra {
        let arrival = START + tick * FRAME;
        let seq = tick as u16;
        if tick < count as u32 && !missing.contains(&seq) {
            jb.add(ReceivedPacket::new(
                Bytes::from_static(&[0x3c; 61]),
                tick * FRAME,
                seq,
                false,
                arrival,
            ));
        }
        if let Some(frame) = jb.get(arrival + 5) {
            played.push(frame.seq);
        }
    }
    played
}

fn report_blocks(analyzer: &mut MediaQualityAnalyzer) -> Vec<ReportBlock> {
    analyzer.handle_write(XrBlockTypes::all()).unwrap();
    let report = analyzer.poll_write().unwrap();
    ReportBlock::unmarshal_all(&mut report.clone()).unwrap()
}

#[test]
fn test_jitter_buffer_losses_reach_report() {
    let log = Arc::new(EventLog::default());
    let jb = jitter_buffer(log.clone());
    let played = play_stream(&jb, 20, &[10, 11], 10);
    assert_eq!(played.len(), 18);

    let mut analyzer = analyzer(Instant::now());
    for event in log.take() {
        analyzer.handle_read(event).unwrap();
    }

    let quality = analyzer.call_quality();
    assert_eq!(quality.num_rtp_packets_received, 18);
    assert_eq!(quality.num_voice_frames, 18);
    assert_eq!(quality.num_rtp_packets_not_received, 2);
    assert_eq!(analyzer.report_window(), Some(ReportWindow::new(0, 19)));

    match &report_blocks(&mut analyzer)[..] {
        [ReportBlock::StatisticsSummary(summary), ReportBlock::VoipMetrics(voip)] => {
            assert_eq!(summary.ssrc, SSRC);
            assert_eq!(summary.begin_seq, 0);
            assert_eq!(summary.end_seq, 19);
            assert_eq!(summary.lost_packets, 2);
            assert_eq!(summary.dup_packets, 0);
            assert_eq!(voip.ssrc, SSRC);
            assert!(voip.loss_rate > 0);
            assert_eq!(voip.discard_rate, 0);
            assert!(voip.jb_nominal > 0);
        }
        other => panic!("unexpected blocks {other:?}"),
    }

    // the next report starts after the previous window
    match &report_blocks(&mut analyzer)[..] {
        [ReportBlock::StatisticsSummary(summary), _] => {
            assert_eq!(summary.begin_seq, 20);
            assert_eq!(summary.end_seq, 19);
            assert_eq!(summary.lost_packets, 0);
        }
        other => panic!("unexpected blocks {other:?}"),
    }
    assert_eq!(analyzer.rx_history_len(), 0);
}

#[test]
fn test_duplicates_counted_in_summary() {
    let log = Arc::new(EventLog::default());
    let jb = jitter_buffer(log.clone());

    for tick in 0..16u32 {
        let arrival = START + tick * FRAME;
        let packet = ReceivedPacket::new(
            Bytes::from_static(&[0x3c; 61]),
            tick * FRAME,
            tick as u16,
            false,
            arrival,
        );
        jb.add(packet.clone());
        if tick == 5 {
            jb.add(packet);
        }
        jb.get(arrival + 5);
    }

    let mut analyzer = analyzer(Instant::now());
    for event in log.take() {
        analyzer.handle_read(event).unwrap();
    }
    assert_eq!(analyzer.call_quality().num_rtp_duplicate_packets, 1);

    match &report_blocks(&mut analyzer)[..] {
        [ReportBlock::StatisticsSummary(summary), ReportBlock::VoipMetrics(voip)] => {
            assert_eq!(summary.dup_packets, 1);
            assert_eq!(summary.lost_packets, 0);
            assert!(voip.discard_rate > 0);
        }
        other => panic!("unexpected blocks {other:?}"),
    }
}

#[test]
fn test_silent_call_notifications() {
    let start = Instant::now();
    let mut analyzer = MediaQualityAnalyzerBuilder::new()
        .with_clock(MediaClock::with_epoch(start))
        .with_start_time(start)
        .with_threshold(MediaQualityThreshold {
            rtp_inactivity_timer_millis: vec![2000, 4000],
            ..Default::default()
        })
        .build();

    let mut timeline = vec![];
    for second in 1..=6u64 {
        let now = start + Duration::from_secs(second);
        assert_eq!(analyzer.poll_timeout(), Some(now));
        analyzer.handle_timeout(now).unwrap();
        while let Some(notification) = analyzer.poll_read() {
            timeline.push((second, notification));
        }
    }

    let summary: Vec<(u64, &'static str, u32)> = timeline
        .iter()
        .map(|(second, n)| match n {
            QualityNotification::CallQuality(q) => (*second, "call", q.call_duration),
            QualityNotification::MediaQualityStatus(s) => {
                (*second, "status", s.rtp_inactivity_time_millis)
            }
        })
        .collect();
    assert_eq!(
        summary,
        vec![(2, "status", 2000), (4, "call", 4000), (4, "status", 4000)]
    );
}

#[test]
fn test_hysteresis_suppresses_jitter_flapping() {
    let start = Instant::now();
    let mut analyzer = MediaQualityAnalyzerBuilder::new()
        .with_clock(MediaClock::with_epoch(start))
        .with_start_time(start)
        .with_threshold(MediaQualityThreshold {
            rtp_jitter_millis: vec![20],
            rtp_hysteresis_time_in_millis: 10_000,
            ..Default::default()
        })
        .build();

    let mut seq = 0u16;
    let mut notified = vec![];
    // jitter jumps over the threshold, then straight back under it
    for (second, jitter) in [(1u64, 30), (2, 0), (3, 0), (4, 0)] {
        for _ in 0..16 {
            analyzer
                .handle_read(AnalyzerEvent::RtpReceived(QualitySample {
                    ssrc: SSRC,
                    seq,
                    jitter,
                    arrival: seq as u32 * FRAME,
                    ..Default::default()
                }))
                .unwrap();
            seq += 1;
        }
        analyzer
            .handle_timeout(start + Duration::from_secs(second))
            .unwrap();
        while let Some(n) = analyzer.poll_read() {
            if let QualityNotification::MediaQualityStatus(s) = n {
                notified.push((second, s.rtp_jitter_millis));
            }
        }
    }

    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0], (1, 30));
}

#[test]
fn test_worker_fed_by_jitter_buffer() {
    let recorder = Arc::new(Recorder::default());
    let analyzer = MediaQualityAnalyzerBuilder::new()
        .with_interval(Duration::from_secs(60))
        .build();
    let mut worker = AnalyzerWorker::new(analyzer, recorder.clone());
    worker.start().unwrap();

    let jb = jitter_buffer(Arc::new(worker.handle()));
    let played = play_stream(&jb, 20, &[7], 10);
    assert_eq!(played.len(), 19);
    worker.stop().unwrap();

    let qualities = recorder.qualities.lock().unwrap();
    assert_eq!(qualities.len(), 1);
    assert_eq!(qualities[0].num_rtp_packets_received, 19);
    assert_eq!(qualities[0].num_voice_frames, 19);
    assert_eq!(qualities[0].num_rtp_packets_not_received, 1);
    assert!(recorder.statuses.lock().unwrap().is_empty());
}
