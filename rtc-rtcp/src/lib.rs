#![warn(rust_2018_idioms)]

//! RTCP Extended Report (XR) blocks from RFC 3611 used for receive-side
//! quality reporting.
//!
//! Two block types are supported:
//!
//! | Block | Type | Length (words) | Size (bytes) |
//! |-------|------|----------------|--------------|
//! | [`StatisticsSummaryReportBlock`](extended_report::StatisticsSummaryReportBlock) | 6 | 9 | 40 |
//! | [`VoipMetricsReportBlock`](extended_report::VoipMetricsReportBlock) | 7 | 8 | 36 |
//!
//! Blocks implement the `shared::marshal` traits and are written big-endian,
//! ready to be appended after the XR packet header by the transport.

pub mod extended_report;
