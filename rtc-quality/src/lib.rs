//! RTC Quality - receive-side media quality analysis and RTCP XR reporting.
//!
//! This crate turns the per-packet outcomes reported by the audio jitter
//! buffer (`rtc-media`) into two outputs:
//!
//! - a running [`CallQuality`] summary plus threshold-crossing
//!   [`MediaQualityStatus`] notifications, and
//! - bit-exact RTCP XR report blocks (RFC 3611 Statistics Summary and VoIP
//!   Metrics) describing the current report window.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MediaQualityAnalyzer`] | Sans-IO analyzer core driven through [`sansio::Protocol`] |
//! | [`AnalyzerWorker`] | Dedicated thread running the analyzer on a drain-then-tick loop |
//! | [`AnalyzerHandle`] | Cloneable event sink, usable as the jitter buffer's [`RxStatusReporter`](media::reporter::RxStatusReporter) |
//! | [`RtcpXrEncoder`] | Burst/gap model and report block builder |
//! | [`HysteresisChecker`] | Band-crossing detector that suppresses flapping notifications |
//!
//! # Sans-IO usage
//!
//! ```
//! use rtc_quality::{MediaQualityAnalyzerBuilder, QualityNotification};
//! use rtc_quality::MediaQualityThreshold;
//! use sansio::Protocol;
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut analyzer = MediaQualityAnalyzerBuilder::new()
//!     .with_start_time(start)
//!     .with_threshold(MediaQualityThreshold {
//!         rtp_inactivity_timer_millis: vec![2000],
//!         ..Default::default()
//!     })
//!     .build();
//!
//! analyzer.handle_timeout(start + Duration::from_secs(1)).unwrap();
//! analyzer.handle_timeout(start + Duration::from_secs(2)).unwrap();
//!
//! match analyzer.poll_read() {
//!     Some(QualityNotification::MediaQualityStatus(status)) => {
//!         assert_eq!(status.rtp_inactivity_time_millis, 2000);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! # Threaded usage
//!
//! ```ignore
//! use rtc_quality::{AnalyzerWorker, MediaQualityAnalyzerBuilder};
//! use rtc_media::audio::JitterBufferBuilder;
//! use std::sync::Arc;
//!
//! let mut worker = AnalyzerWorker::new(MediaQualityAnalyzerBuilder::new().build(), listener);
//! worker.start()?;
//!
//! let jitter_buffer = JitterBufferBuilder::new()
//!     .with_reporter(Arc::new(worker.handle()))
//!     .build();
//! ```

#![warn(rust_2018_idioms)]

pub(crate) mod analyzer;
pub(crate) mod worker;
pub(crate) mod xr;

pub use analyzer::{
    AnalyzerEvent, MediaQualityAnalyzer, MediaQualityAnalyzerBuilder, OptionalInfo,
    QualityNotification,
    call_quality::{AudioQuality, CallQuality, QualityLevel},
    config::{AnalyzerConfig, EvsBandwidth, MediaDirection, MediaQualityThreshold},
    history::History,
    hysteresis::HysteresisChecker,
    status::MediaQualityStatus,
};
pub use worker::{AnalyzerHandle, AnalyzerWorker, QualityListener};
pub use xr::{ReportWindow, encoder::RtcpXrEncoder, markov::TransitionCounters};
