
pub mod statistics_summary;
pub mod voip_metrics;

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

pub use statistics_summary::StatisticsSummaryReportBlock;
pub use voip_metrics::VoipMetricsReportBlock;

/// Size of the common block header: block type, type-specific byte, block length.
pub const XR_HEADER_LENGTH: usize = 4;

/// Value used by the VoIP metrics block for metrics that are not available.
pub const UNAVAILABLE: u8 = 127;

/// Extended report block type, the first byte of every block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    StatisticsSummary = 6,
    VoipMetrics = 7,
}

impl TryFrom<u8> for BlockType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            6 => Ok(BlockType::StatisticsSummary),
            7 => Ok(BlockType::VoipMetrics),
            _ => Err(Error::ErrInvalidBlockType(value)),
        }
    }
}

bitflags! {
    /// Set of report blocks requested for one extended report.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct XrBlockTypes: u32 {
        const STATISTICS_SUMMARY = 1;
        const VOIP_METRICS = 1 << 1;
    }
}

/// TTL or hop limit field (ToH) of the statistics summary block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TtlOrHopLimit {
    #[default]
    None = 0,
    Ipv4 = 1,
    Ipv6 = 2,
}

impl From<u8> for TtlOrHopLimit {
    fn from(v: u8) -> Self {
        match v {
            1 => TtlOrHopLimit::Ipv4,
            2 => TtlOrHopLimit::Ipv6,
            _ => TtlOrHopLimit::None,
        }
    }
}

/// A single extended report block of one of the supported types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBlock {
    StatisticsSummary(StatisticsSummaryReportBlock),
    VoipMetrics(VoipMetricsReportBlock),
}

impl ReportBlock {
    pub fn block_type(&self) -> BlockType {
        match self {
            ReportBlock::StatisticsSummary(_) => BlockType::StatisticsSummary,
            ReportBlock::VoipMetrics(_) => BlockType::VoipMetrics,
        }
    }

    /// Decodes consecutive blocks until `buf` is exhausted.
    pub fn unmarshal_all<B: Buf>(buf: &mut B) -> Result<Vec<ReportBlock>> {
        let mut blocks = vec![];
        while buf.has_remaining() {
            blocks.push(ReportBlock::unmarshal(buf)?);
        }
        Ok(blocks)
    }
}

impl MarshalSize for ReportBlock {
    fn marshal_size(&self) -> usize {
        match self {
            ReportBlock::StatisticsSummary(b) => b.marshal_size(),
            ReportBlock::VoipMetrics(b) => b.marshal_size(),
        }
    }
}

impl Marshal for ReportBlock {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            ReportBlock::StatisticsSummary(b) => b.marshal_to(buf),
            ReportBlock::VoipMetrics(b) => b.marshal_to(buf),
        }
    }
}

impl Unmarshal for ReportBlock {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < XR_HEADER_LENGTH {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: XR_HEADER_LENGTH,
                actual: buf.remaining(),
            });
        }

        match BlockType::try_from(buf.chunk()[0])? {
            BlockType::StatisticsSummary => Ok(ReportBlock::StatisticsSummary(
                StatisticsSummaryReportBlock::unmarshal(buf)?,
            )),
            BlockType::VoipMetrics => Ok(ReportBlock::VoipMetrics(
                VoipMetricsReportBlock::unmarshal(buf)?,
            )),
        }
    }
}

/// Writes the 4-byte block header.
pub(crate) fn put_header(buf: &mut &mut [u8], block_type: BlockType, type_specific: u8, length: u16) {
    buf.put_u8(block_type as u8);
    buf.put_u8(type_specific);
    buf.put_u16(length);
}

/// Reads and checks the 4-byte block header, returning the type-specific byte.
pub(crate) fn get_header<B: Buf>(
    buf: &mut B,
    block_type: BlockType,
    length: u16,
    size: usize,
) -> Result<u8> {
    if buf.remaining() < size {
        return Err(Error::UnexpectedEndOfBuffer {
            expected: size,
            actual: buf.remaining(),
        });
    }

    let bt = buf.get_u8();
    if bt != block_type as u8 {
        return Err(Error::ErrInvalidBlockType(bt));
    }
    let type_specific = buf.get_u8();
    let block_length = buf.get_u16();
    if block_length != length {
        return Err(Error::ErrInvalidBlockLength(block_length));
    }

    Ok(type_specific)
}
