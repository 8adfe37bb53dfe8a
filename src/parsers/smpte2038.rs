//! SMPTE-2038 ancillary data packets carried in PES.

use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;

use super::DecodeError;

/// DID/SDID pairs registered in SMPTE ST 291.
const SMPTE291_REGISTRY: &[((u8, u8), &str)] = &[
    ((0x41, 0x05), "AFD and Bar Data"),
    ((0x41, 0x06), "Pan and Scan Information"),
    ((0x41, 0x07), "ANSI/SCTE 104 messages"),
    ((0x41, 0x08), "DVB/SCTE VBI data"),
    ((0x43, 0x01), "Inter Station Control Packet Data"),
    ((0x43, 0x02), "OP-47 SDP - Subtitling Data"),
    ((0x43, 0x03), "OP-47 Multi Packet ANC Data"),
    ((0x45, 0x01), "Audio Metadata (Single Program)"),
    ((0x45, 0x02), "Audio Metadata Ch 01/02"),
    ((0x45, 0x03), "Audio Metadata Ch 03/04"),
    ((0x45, 0x04), "Audio Metadata Ch 05/06"),
    ((0x45, 0x05), "Audio Metadata Ch 07/08"),
    ((0x45, 0x06), "Audio Metadata Ch 09/10"),
    ((0x45, 0x07), "Audio Metadata Ch 11/12"),
    ((0x45, 0x08), "Audio Metadata Ch 13/14"),
    ((0x45, 0x09), "Audio Metadata Ch 15/16"),
    ((0x50, 0x01), "WSS - Wide Screen Signaling"),
    ((0x50, 0x30), "User Defined"),
    ((0x50, 0x49), "User Defined"),
    ((0x60, 0x60), "ATC - Ancillary Timecode"),
    ((0x61, 0x01), "EIA 708B Data mapping into VANC space"),
    ((0x61, 0x02), "EIA 608 Data mapping into VANC space"),
    ((0x62, 0x01), "DTV Program Description"),
    ((0x62, 0x02), "DTV Data Broadcast"),
    ((0x62, 0x03), "VBI Data"),
];

pub fn did_name(did: u8, sdid: u8) -> &'static str {
    SMPTE291_REGISTRY
        .iter()
        .find(|(key, _)| *key == (did, sdid))
        .map_or("unknown SID/DID", |&(_, name)| name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AncillaryEntry {
    pub line_nr: u8,
    pub hor_offset: u8,
    pub did: u8,
    pub sdid: u8,
    pub data_count: u8,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// All ANC entries of one PES payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AncillaryPacket {
    pub pid: u16,
    pub pts: u64,
    pub entries: Vec<AncillaryEntry>,
}

/// Walk the ANC packets of one PES payload. Stuffing ends the walk; a
/// non-zero reserved field or a truncated entry fails the whole payload.
pub fn parse_anc_entries(payload: &[u8]) -> Result<Vec<AncillaryEntry>, DecodeError> {
    let total_bits = payload.len() as u64 * 8;
    let mut br = BitReader::endian(Cursor::new(payload), BigEndian);
    let mut entries = Vec::new();
    loop {
        let consumed = br.position_in_bits()?;
        if consumed >= total_bits {
            break;
        }
        let reserved = br.read::<6, u8>()?;
        if reserved == 0x3F {
            if br.read::<2, u8>()? != 0b11 {
                return Err(DecodeError::invalid("invalid stuffing"));
            }
            break;
        }
        if reserved != 0 {
            return Err(DecodeError::invalid(format!(
                "reserved bits not zero: {reserved:#x}"
            )));
        }
        br.skip(1)?; // c_not_y_channel_flag
        let line_nr = br.read::<11, u16>()?;
        let hor_offset = br.read::<12, u16>()?;
        let did = (br.read::<10, u16>()? & 0xFF) as u8;
        let sdid = (br.read::<10, u16>()? & 0xFF) as u8;
        let data_count = (br.read::<10, u16>()? & 0xFF) as u8;
        br.skip(data_count as u32 * 10)?; // user_data_words
        br.skip(10)?; // checksum_word
        br.byte_align();
        entries.push(AncillaryEntry {
            line_nr: line_nr as u8,
            hor_offset: hor_offset as u8,
            did,
            sdid,
            data_count,
            type_name: did_name(did, sdid).to_string(),
        });
    }
    Ok(entries)
}
