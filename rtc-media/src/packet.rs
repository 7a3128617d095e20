use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Delivery classification of a received packet.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtpStatus {
    #[default]
    NotDefined,
    Normal,
    Late,
    Discarded,
    Duplicated,
    Lost,
}

/// Coarse classification of a received payload.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtpDataType {
    NoData,
    Sid,
    #[default]
    Normal,
}

/// Per-packet quality record, created on receive (or transmit) and kept in
/// the analyzer's bounded history.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct QualitySample {
    pub ssrc: u32,
    pub seq: u16,
    /// One-way transit difference in milliseconds.
    pub jitter: i32,
    /// Arrival time in milliseconds of the media clock.
    pub arrival: u32,
    pub data_type: RtpDataType,
    pub status: RtpStatus,
}

/// A run of consecutive lost packets.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LostPacket {
    /// First sequence number of the run.
    pub seq: u16,
    pub count: u32,
    /// Time the loss was recorded, in milliseconds of the media clock.
    pub marked_time: u32,
    pub option: u32,
}

impl LostPacket {
    pub fn new(seq: u16, count: u32, marked_time: u32) -> Self {
        Self {
            seq,
            count,
            marked_time,
            option: 0,
        }
    }
}

/// A packet queued in the jitter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub payload: Bytes,
    pub timestamp: u32,
    pub seq: u16,
    pub mark: bool,
    pub arrival: u32,
    pub valid: bool,
    pub header: bool,
}

impl ReceivedPacket {
    pub fn new(payload: Bytes, timestamp: u32, seq: u16, mark: bool, arrival: u32) -> Self {
        Self {
            payload,
            timestamp,
            seq,
            mark,
            arrival,
            valid: true,
            header: true,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// A payload unit released for playout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayoutFrame {
    pub payload: Bytes,
    pub timestamp: u32,
    pub mark: bool,
    pub seq: u16,
}

impl From<ReceivedPacket> for PlayoutFrame {
    fn from(p: ReceivedPacket) -> Self {
        Self {
            payload: p.payload,
            timestamp: p.timestamp,
            mark: p.mark,
            seq: p.seq,
        }
    }
}
