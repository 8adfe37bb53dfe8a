// psi/section.rs
//! Generic PSI section reader with CRC-32 (MPEG-2) validation, and the
//! per-PID accumulator that reassembles sections spanning TS packets.

use crc::{CRC_32_MPEG_2, Crc};

use crate::constants::{TS_PACKET_SIZE, TS_PAYLOAD_SIZE, TS_SYNC_BYTE};
use crate::error::{Error, Result};

pub(crate) const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Returned by [`SectionReader::new`].
pub struct SectionReader<'a> {
    pub table_id: u8,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section: u8,
    /// program_number (PMT), transport_stream_id (PAT, SDT)
    pub table_id_extension: u16,
    /// bytes between the fixed long-form header and the CRC
    pub body: &'a [u8],
}

impl<'a> SectionReader<'a> {
    /// Validates pointer, length and CRC-32 of a long-form section.
    /// `payload` starts with the pointer field.
    pub fn new(payload: &'a [u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::psi("payload empty"));
        }
        let start = 1 + payload[0] as usize;
        if payload.len() < start + 8 {
            return Err(Error::psi("short section"));
        }

        let sec_len = (((payload[start + 1] & 0x0F) as usize) << 8) | payload[start + 2] as usize;
        if sec_len < 9 {
            return Err(Error::psi("invalid section_length"));
        }
        let end = start + 3 + sec_len;
        if end > payload.len() {
            return Err(Error::psi("truncated section"));
        }

        let crc_calc = CRC_MPEG.checksum(&payload[start..end - 4]);
        let crc_pkt = u32::from_be_bytes([
            payload[end - 4],
            payload[end - 3],
            payload[end - 2],
            payload[end - 1],
        ]);
        if crc_calc != crc_pkt {
            return Err(Error::psi("CRC-32 mismatch"));
        }

        Ok(Self {
            table_id: payload[start],
            table_id_extension: u16::from_be_bytes([payload[start + 3], payload[start + 4]]),
            version: (payload[start + 5] & 0x3E) >> 1,
            current_next: payload[start + 5] & 0x01 != 0,
            section_number: payload[start + 6],
            last_section: payload[start + 7],
            body: &payload[start + 8..end - 4],
        })
    }
}

/// Writes a long-form section: header, `body`, CRC-32. No pointer field.
pub fn build_section(table_id: u8, table_id_extension: u16, version: u8, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut sect = Vec::with_capacity(3 + section_length);
    sect.push(table_id);
    sect.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    sect.push(section_length as u8);
    sect.extend_from_slice(&table_id_extension.to_be_bytes());
    sect.push(0xC1 | ((version & 0x1F) << 1));
    sect.push(0x00); // section_number
    sect.push(0x00); // last_section_number
    sect.extend_from_slice(body);
    let crc = CRC_MPEG.checksum(&sect);
    sect.extend_from_slice(&crc.to_be_bytes());
    sect
}

/// Reassembles one PSI section per PID from TS packet payloads.
///
/// A section starts at a payload_unit_start packet and is complete when
/// `section_length` bytes have been collected. The completed buffer keeps
/// the pointer field so it can go straight into [`SectionReader::new`].
#[derive(Default)]
pub struct SectionAccumulator {
    buf: Vec<u8>,
    started: bool,
}

impl SectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet payload. Returns the section once complete.
    pub fn push(&mut self, pusi: bool, payload: &[u8]) -> Option<Vec<u8>> {
        if pusi {
            self.buf.clear();
            self.buf.extend_from_slice(payload);
            self.started = true;
        } else if self.started {
            self.buf.extend_from_slice(payload);
        } else {
            return None;
        }

        let start = 1 + *self.buf.first()? as usize;
        if self.buf.len() < start + 3 {
            return None;
        }
        let sec_len =
            (((self.buf[start + 1] & 0x0F) as usize) << 8) | self.buf[start + 2] as usize;
        let end = start + 3 + sec_len;
        if self.buf.len() < end {
            return None;
        }
        self.started = false;
        let mut section = std::mem::take(&mut self.buf);
        section.truncate(end);
        Some(section)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.started = false;
    }
}

/// Splits a section into TS packets on `pid`. The first packet carries
/// payload_unit_start and a zero pointer field; the last is padded with
/// 0xFF. `cc` is the continuity counter of the first packet and is left
/// at the value for the packet after the last one written.
pub fn packetize_section(pid: u16, section: &[u8], cc: &mut u8) -> Vec<[u8; TS_PACKET_SIZE]> {
    let mut data = Vec::with_capacity(section.len() + 1);
    data.push(0x00);
    data.extend_from_slice(section);

    data.chunks(TS_PAYLOAD_SIZE)
        .enumerate()
        .map(|(n, chunk)| {
            let mut pkt = [0xFF; TS_PACKET_SIZE];
            pkt[0] = TS_SYNC_BYTE;
            pkt[1] = ((pid >> 8) as u8 & 0x1F) | if n == 0 { 0x40 } else { 0x00 };
            pkt[2] = pid as u8;
            pkt[3] = 0x10 | (*cc & 0x0F);
            pkt[4..4 + chunk.len()].copy_from_slice(chunk);
            *cc = (*cc + 1) & 0x0F;
            pkt
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pointer(sect: &[u8]) -> Vec<u8> {
        let mut v = vec![0x00];
        v.extend_from_slice(sect);
        v
    }

    #[test]
    fn built_section_reads_back() {
        let sect = build_section(0x02, 1, 3, &[0xE1, 0x00, 0xF0, 0x00]);
        let payload = with_pointer(&sect);
        let reader = SectionReader::new(&payload).unwrap();
        assert_eq!(reader.table_id, 0x02);
        assert_eq!(reader.table_id_extension, 1);
        assert_eq!(reader.version, 3);
        assert!(reader.current_next);
        assert_eq!(reader.body, &[0xE1, 0x00, 0xF0, 0x00]);
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let mut payload = with_pointer(&build_section(0x00, 1, 0, &[0, 1, 0xE1, 0x00]));
        payload[10] ^= 0x01;
        assert!(matches!(SectionReader::new(&payload), Err(Error::Psi(_))));
    }

    #[test]
    fn accumulator_spans_packets() {
        let body: Vec<u8> = (0..300u16).map(|v| v as u8).collect();
        let payload = with_pointer(&build_section(0x02, 1, 0, &body));
        let (first, rest) = payload.split_at(184);

        let mut acc = SectionAccumulator::new();
        assert!(acc.push(false, rest).is_none());
        assert!(acc.push(true, first).is_none());
        let section = acc.push(false, rest).unwrap();
        assert_eq!(section, payload);
        assert!(SectionReader::new(&section).is_ok());
    }

    #[test]
    fn packetized_section_reassembles() {
        let body: Vec<u8> = (0..400u16).map(|v| v as u8).collect();
        let sect = build_section(0x02, 1, 0, &body);
        let mut cc = 15;
        let packets = packetize_section(0x1000, &sect, &mut cc);
        assert_eq!(packets.len(), 3);
        assert_eq!(cc, 2);
        assert_eq!(packets[0][1] & 0x40, 0x40);
        assert_eq!(packets[1][3] & 0x0F, 0);

        let mut acc = SectionAccumulator::new();
        let mut done = None;
        for (n, pkt) in packets.iter().enumerate() {
            done = acc.push(n == 0, &pkt[4..]);
        }
        assert_eq!(&done.unwrap()[1..], &sect[..]);
    }

    #[test]
    fn accumulator_drops_stuffing() {
        let mut payload = with_pointer(&build_section(0x00, 1, 0, &[0, 1, 0xE1, 0x00]));
        let len = payload.len();
        payload.resize(184, 0xFF);
        let mut acc = SectionAccumulator::new();
        assert_eq!(acc.push(true, &payload).unwrap().len(), len);
    }
}
