//! PES header parsing

use bytes::Bytes;

use crate::constants::PES_START_CODE;
use crate::error::{Error, Result};

/// A reassembled PES packet with its header decoded
#[derive(Debug, Clone)]
pub struct PesPacket {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// PTS_DTS_flags from the optional header
    pub pts_dts_indicator: u8,
    /// From the adaptation field of the first TS packet, if it had one
    pub random_access_indicator: Option<bool>,
    /// Elementary stream bytes after the PES header
    pub data: Bytes,
}

fn has_optional_header(stream_id: u8) -> bool {
    // program_stream_map, padding, private_stream_2, ECM, EMM,
    // program_stream_directory, DSMCC, H.222.1 type E
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xFF | 0xF2 | 0xF8)
}

/// 33-bit timestamp from the 5-byte PTS/DTS field
fn read_timestamp(b: &[u8]) -> u64 {
    (((b[0] >> 1) & 0x07) as u64) << 30
        | (b[1] as u64) << 22
        | ((b[2] >> 1) as u64) << 15
        | (b[3] as u64) << 7
        | (b[4] >> 1) as u64
}

/// Declared PES_packet_length plus the 6 fixed header bytes, `None` when
/// the length is unbounded (0) or not yet visible.
pub fn expected_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 6 || buf[..3] != PES_START_CODE {
        return None;
    }
    match u16::from_be_bytes([buf[4], buf[5]]) {
        0 => None,
        n => Some(6 + n as usize),
    }
}

pub fn parse_pes(pid: u16, rai: Option<bool>, buf: Bytes) -> Result<PesPacket> {
    if buf.len() < 6 || buf[..3] != PES_START_CODE {
        return Err(Error::psi(format!("PID {pid}: PES start code missing")));
    }
    let stream_id = buf[3];
    let end = expected_len(&buf).map_or(buf.len(), |n| n.min(buf.len()));

    let mut pes = PesPacket {
        pid,
        stream_id,
        pts: None,
        dts: None,
        pts_dts_indicator: 0,
        random_access_indicator: rai,
        data: Bytes::new(),
    };
    if !has_optional_header(stream_id) {
        pes.data = buf.slice(6..end);
        return Ok(pes);
    }
    if buf.len() < 9 {
        return Err(Error::psi(format!("PID {pid}: PES header truncated")));
    }
    pes.pts_dts_indicator = (buf[7] >> 6) & 0x03;
    let header_end = 9 + buf[8] as usize;
    if header_end > end {
        return Err(Error::psi(format!("PID {pid}: PES header longer than packet")));
    }
    if pes.pts_dts_indicator & 0x02 != 0 && header_end >= 14 {
        pes.pts = Some(read_timestamp(&buf[9..14]));
    }
    if pes.pts_dts_indicator == 0x03 && header_end >= 19 {
        pes.dts = Some(read_timestamp(&buf[14..19]));
    }
    pes.data = buf.slice(header_end..end);
    Ok(pes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_timestamp(marker: u8, ts: u64) -> [u8; 5] {
        [
            (marker << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
            (ts >> 22) as u8,
            (((ts >> 15) as u8) << 1) | 1,
            (ts >> 7) as u8,
            ((ts as u8) << 1) | 1,
        ]
    }

    #[test]
    fn pts_and_dts() {
        let pts = (1u64 << 33) - 5;
        let dts = 123_456;
        let mut buf = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 10];
        buf.extend_from_slice(&encode_timestamp(0x3, pts));
        buf.extend_from_slice(&encode_timestamp(0x1, dts));
        buf.extend_from_slice(&[0x00, 0x00, 0x01, 0x09]);
        let pes = parse_pes(256, Some(true), Bytes::from(buf)).unwrap();
        assert_eq!(pes.pts, Some(pts));
        assert_eq!(pes.dts, Some(dts));
        assert_eq!(pes.pts_dts_indicator, 3);
        assert_eq!(&pes.data[..], &[0x00, 0x00, 0x01, 0x09]);
    }

    #[test]
    fn packet_length_bounds_data() {
        let mut buf = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x0A, 0x80, 0x80, 5];
        buf.extend_from_slice(&encode_timestamp(0x2, 90_000));
        buf.extend_from_slice(&[0xAA, 0xBB, 0xFF, 0xFF]);
        let pes = parse_pes(300, None, Bytes::from(buf)).unwrap();
        assert_eq!(pes.pts, Some(90_000));
        assert_eq!(pes.dts, None);
        assert_eq!(&pes.data[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn missing_start_code() {
        assert!(parse_pes(1, None, Bytes::from_static(&[0, 0, 2, 0xE0, 0, 0])).is_err());
    }
}
