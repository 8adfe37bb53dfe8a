//! Codec parsers for the elementary streams found in MPEG-TS
//!
//! This module contains the NAL unit splitter, AVC and HEVC parameter set,
//! slice header and SEI decoders, plus the SCTE-35 and SMPTE-2038 decoders.

pub mod avc;
pub mod hevc;
pub mod scte35;
pub mod sei;
pub mod smpte2038;
pub mod utils;

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

pub use avc::Avc;
pub use hevc::Hevc;
pub use sei::{ClockTimestamp, SeiMessage};
pub use utils::split_nalus;

/// Error from a bit-level decoder.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    Truncated,

    #[error("{0}")]
    Invalid(String),
}

impl DecodeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DecodeError::Invalid(msg.into())
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::Truncated,
            _ => DecodeError::Invalid(err.to_string()),
        }
    }
}

/// Role of a NAL unit, common to both video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluKind {
    Vps,
    Sps,
    Pps,
    Sei,
    Idr,
    Slice,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SliceType::P => "P",
            SliceType::B => "B",
            SliceType::I => "I",
            SliceType::Sp => "SP",
            SliceType::Si => "SI",
        })
    }
}

/// Bitstream knowledge the frame builder needs from a video codec.
pub trait VideoCodec {
    /// Codec name used in records and statistics ("AVC", "HEVC")
    const NAME: &'static str;

    type Sps: Serialize + fmt::Debug + Clone;
    type Pps: Serialize + fmt::Debug + Clone;

    /// NAL unit type from the first header byte.
    fn nalu_type(header: u8) -> u8;
    fn nalu_kind(nalu_type: u8) -> NaluKind;
    fn nalu_type_name(nalu_type: u8) -> String;

    fn parse_sps(nalu: &[u8]) -> Result<Self::Sps, DecodeError>;
    fn sps_id(sps: &Self::Sps) -> u32;
    fn parse_pps(nalu: &[u8], spss: &BTreeMap<u32, Self::Sps>)
    -> Result<Self::Pps, DecodeError>;
    fn pps_id(pps: &Self::Pps) -> u32;

    /// Split an SEI NAL unit into its messages.
    fn parse_sei(nalu: &[u8]) -> Result<Vec<SeiMessage>, DecodeError>;

    /// Clock timestamps carried by a timing SEI message. `None` for message
    /// types without clock data or when the SPS needed to decode it is missing.
    fn sei_clocks(
        msg: &SeiMessage,
        sps: Option<&Self::Sps>,
    ) -> Result<Option<Vec<ClockTimestamp>>, DecodeError>;

    /// Slice type of a VCL NAL unit, `None` when the header does not carry it
    /// at a decodable position.
    fn slice_type(
        nalu: &[u8],
        ppss: &BTreeMap<u32, Self::Pps>,
    ) -> Result<Option<SliceType>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncated() {
        let err: DecodeError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, DecodeError::Truncated));
    }

    #[test]
    fn slice_type_display() {
        assert_eq!(format!("[{}]", SliceType::I), "[I]");
        assert_eq!(SliceType::Sp.to_string(), "SP");
    }
}
