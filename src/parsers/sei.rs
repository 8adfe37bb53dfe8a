//! SEI message framing shared by AVC and HEVC.

use std::fmt;
use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader};

use super::DecodeError;

pub const SEI_BUFFERING_PERIOD: u32 = 0;
pub const SEI_PIC_TIMING: u32 = 1;
pub const SEI_TIME_CODE: u32 = 136;

/// One SEI message with its raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload: Vec<u8>,
}

impl SeiMessage {
    pub fn type_name(&self) -> &'static str {
        sei_type_name(self.payload_type)
    }
}

pub fn sei_type_name(payload_type: u32) -> &'static str {
    match payload_type {
        0 => "SEIBufferingPeriod",
        1 => "SEIPicTiming",
        2 => "SEIPanScanRect",
        3 => "SEIFillerPayload",
        4 => "SEIUserDataRegisteredITUT35",
        5 => "SEIUserDataUnregistered",
        6 => "SEIRecoveryPoint",
        45 => "SEIFramePackingArrangement",
        47 => "SEIDisplayOrientation",
        129 => "SEIActiveParameterSets",
        132 => "SEIDecodedPictureHash",
        136 => "SEITimeCode",
        137 => "SEIMasteringDisplayColourVolume",
        144 => "SEIContentLightLevelInformation",
        147 => "SEIAlternativeTransferCharacteristics",
        _ => "SEIUnknown",
    }
}

/// Split an SEI RBSP (NAL header and emulation prevention already removed)
/// into messages. A payload running past the end of the RBSP is an error.
pub fn parse_sei_rbsp(rbsp: &[u8]) -> Result<Vec<SeiMessage>, DecodeError> {
    let mut msgs = Vec::new();
    let mut pos = 0;
    while more_rbsp_data(&rbsp[pos..]) {
        let payload_type = read_ff_coded(rbsp, &mut pos)?;
        let payload_size = read_ff_coded(rbsp, &mut pos)? as usize;
        let end = pos + payload_size;
        if end > rbsp.len() {
            return Err(DecodeError::invalid(format!(
                "SEI payload type {payload_type} size {payload_size} exceeds NALU"
            )));
        }
        msgs.push(SeiMessage {
            payload_type,
            payload: rbsp[pos..end].to_vec(),
        });
        pos = end;
    }
    Ok(msgs)
}

fn read_ff_coded(rbsp: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    let mut value = 0u32;
    loop {
        let b = *rbsp.get(*pos).ok_or(DecodeError::Truncated)?;
        *pos += 1;
        value += b as u32;
        if b != 0xFF {
            return Ok(value);
        }
    }
}

// Only the rbsp_trailing_bits byte (0x80) left means no more messages.
fn more_rbsp_data(rest: &[u8]) -> bool {
    !(rest.is_empty() || rest == [0x80])
}

/// A decoded clock timestamp, as carried by AVC pic_timing and HEVC time_code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockTimestamp {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub n_frames: u16,
    pub time_offset: i32,
}

impl fmt::Display for ClockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.n_frames
        )?;
        if self.time_offset != 0 {
            write!(f, " offset={}", self.time_offset)?;
        }
        Ok(())
    }
}

/// Reads a clock timestamp body starting at full_timestamp_flag.
/// `frame_bits` is 8 for AVC pic_timing and 9 for HEVC time_code.
pub(crate) fn read_clock_time<R: io::Read>(
    br: &mut BitReader<R, BigEndian>,
    frame_bits: u32,
) -> Result<ClockTimestamp, DecodeError> {
    let mut clock = ClockTimestamp::default();
    let full_timestamp = br.read_bit()?;
    let _discontinuity = br.read_bit()?;
    let _cnt_dropped = br.read_bit()?;
    clock.n_frames = br.read_var::<u16>(frame_bits)?;
    if full_timestamp {
        clock.seconds = br.read::<6, u8>()?;
        clock.minutes = br.read::<6, u8>()?;
        clock.hours = br.read::<5, u8>()?;
    } else if br.read_bit()? {
        clock.seconds = br.read::<6, u8>()?;
        if br.read_bit()? {
            clock.minutes = br.read::<6, u8>()?;
            if br.read_bit()? {
                clock.hours = br.read::<5, u8>()?;
            }
        }
    }
    Ok(clock)
}

/// Two's complement value of `bits` width.
pub(crate) fn read_signed<R: io::Read>(
    br: &mut BitReader<R, BigEndian>,
    bits: u32,
) -> Result<i32, DecodeError> {
    if bits == 0 {
        return Ok(0);
    }
    let raw = br.read_var::<u32>(bits)?;
    let shift = 32 - bits;
    Ok(((raw << shift) as i32) >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::utils::rbsp_reader;

    #[test]
    fn splits_messages_and_stops_at_trailing_bits() {
        // user_data_unregistered (5) of 2 bytes, recovery_point (6) of 1 byte
        let rbsp = [0x05, 0x02, 0xAA, 0xBB, 0x06, 0x01, 0x84, 0x80];
        let msgs = parse_sei_rbsp(&rbsp).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].type_name(), "SEIUserDataUnregistered");
        assert_eq!(msgs[0].payload, vec![0xAA, 0xBB]);
        assert_eq!(msgs[1].payload_type, 6);
    }

    #[test]
    fn ff_coded_payload_type() {
        // 0xFF + 0x89 = 136 (time code)
        let rbsp = [0xFF, 0x89, 0x00, 0x80];
        let msgs = parse_sei_rbsp(&rbsp).unwrap();
        assert_eq!(msgs[0].payload_type, SEI_TIME_CODE);
        assert!(msgs[0].payload.is_empty());
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let rbsp = [0x05, 0x10, 0xAA];
        assert!(matches!(parse_sei_rbsp(&rbsp), Err(DecodeError::Invalid(_))));
    }

    #[test]
    fn full_clock_timestamp() {
        // full=1 disc=0 drop=0 | n_frames=12 (8 bits) | s=30 | m=15 | h=10
        let bits: u64 = (0b100 << 25) | (12 << 17) | (30 << 11) | (15 << 5) | 10;
        let data = (bits << 36).to_be_bytes();
        let mut br = rbsp_reader(&data);
        let clock = read_clock_time(&mut br, 8).unwrap();
        assert_eq!(clock.to_string(), "10:15:30:12");
    }

    #[test]
    fn signed_fields() {
        let data = [0b1110_0000];
        let mut br = rbsp_reader(&data);
        assert_eq!(read_signed(&mut br, 3).unwrap(), -1);
    }
}
