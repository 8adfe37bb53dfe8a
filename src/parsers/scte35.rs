//! SCTE-35 splice_info_section decoder

use bitstream_io::BitRead;
use serde::Serialize;

use super::DecodeError;
use super::utils::rbsp_reader;
use crate::constants::TABLE_ID_SCTE35;
use crate::psi::section::CRC_MPEG;
use crate::stats::add_pts;

const SPLICE_NULL: u8 = 0x00;
const SPLICE_SCHEDULE: u8 = 0x04;
const SPLICE_INSERT: u8 = 0x05;
const TIME_SIGNAL: u8 = 0x06;
const BANDWIDTH_RESERVATION: u8 = 0x07;
const PRIVATE_COMMAND: u8 = 0xFF;

const SEGMENTATION_DESCRIPTOR_TAG: u8 = 0x02;
const CUEI_IDENTIFIER: u32 = 0x4355_4549;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    Null,
    Schedule,
    Insert(SpliceInsert),
    TimeSignal { pts: Option<u64> },
    BandwidthReservation,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceInsert {
    pub event_id: u32,
    pub cancel: bool,
    pub out_of_network: bool,
    pub immediate: bool,
    pub pts: Option<u64>,
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentationDescriptor {
    pub event_id: u32,
    pub type_id: u8,
    pub segment_number: u8,
    pub duration: Option<u64>,
}

/// A decoded splice_info_section, PTS values already adjusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInfo {
    pub pts_adjustment: u64,
    pub command: SpliceCommand,
    pub segmentation: Vec<SegmentationDescriptor>,
}

impl SpliceCommand {
    pub fn type_name(&self) -> &'static str {
        match self {
            SpliceCommand::Null => "SpliceNull",
            SpliceCommand::Schedule => "SpliceSchedule",
            SpliceCommand::Insert(_) => "SpliceInsert",
            SpliceCommand::TimeSignal { .. } => "TimeSignal",
            SpliceCommand::BandwidthReservation => "BandwidthReservation",
            SpliceCommand::Private => "PrivateCommand",
        }
    }
}

/// Decode a splice_info_section. `payload` starts with the pointer field.
pub fn parse_splice_info(payload: &[u8]) -> Result<SpliceInfo, DecodeError> {
    let pointer = *payload.first().ok_or(DecodeError::Truncated)? as usize;
    let section = payload.get(1 + pointer..).ok_or(DecodeError::Truncated)?;
    if section.len() < 3 {
        return Err(DecodeError::Truncated);
    }
    if section[0] != TABLE_ID_SCTE35 {
        return Err(DecodeError::invalid(format!(
            "table id {:#04x} is not a splice_info_section",
            section[0]
        )));
    }
    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let end = 3 + section_length;
    if section_length < 4 || end > section.len() {
        return Err(DecodeError::Truncated);
    }
    let section = &section[..end];
    let crc_calc = CRC_MPEG.checksum(&section[..end - 4]);
    let crc_sect = u32::from_be_bytes([
        section[end - 4],
        section[end - 3],
        section[end - 2],
        section[end - 1],
    ]);
    if crc_calc != crc_sect {
        return Err(DecodeError::invalid("CRC-32 mismatch"));
    }

    let mut br = rbsp_reader(&section[3..end - 4]);
    br.skip(8)?; // protocol_version
    if br.read_bit()? {
        return Err(DecodeError::invalid("encrypted splice_info_section"));
    }
    br.skip(6)?; // encryption_algorithm
    let pts_adjustment = br.read::<33, u64>()?;
    br.skip(8 + 12)?; // cw_index, tier
    let command_length = br.read::<12, u16>()?;
    let command_type = br.read::<8, u8>()?;

    let command = match command_type {
        SPLICE_NULL => SpliceCommand::Null,
        SPLICE_INSERT => SpliceCommand::Insert(parse_insert(&mut br, pts_adjustment)?),
        TIME_SIGNAL => SpliceCommand::TimeSignal {
            pts: splice_time(&mut br)?.map(|pts| add_pts(pts, pts_adjustment)),
        },
        SPLICE_SCHEDULE | BANDWIDTH_RESERVATION | PRIVATE_COMMAND => {
            if command_length == 0xFFF {
                return Err(DecodeError::invalid(format!(
                    "command {command_type:#04x} without splice_command_length"
                )));
            }
            br.skip(command_length as u32 * 8)?;
            match command_type {
                SPLICE_SCHEDULE => SpliceCommand::Schedule,
                BANDWIDTH_RESERVATION => SpliceCommand::BandwidthReservation,
                _ => SpliceCommand::Private,
            }
        }
        t => return Err(DecodeError::invalid(format!("unknown splice command type {t:#04x}"))),
    };

    let mut loop_len = br.read::<16, u16>()? as usize;
    let mut segmentation = Vec::new();
    while loop_len >= 2 {
        let tag = br.read::<8, u8>()?;
        let len = br.read::<8, u8>()? as usize;
        if len + 2 > loop_len {
            return Err(DecodeError::invalid("splice descriptor exceeds descriptor loop"));
        }
        let mut body = vec![0u8; len];
        br.read_bytes(&mut body)?;
        if tag == SEGMENTATION_DESCRIPTOR_TAG {
            if let Some(desc) = parse_segmentation_descriptor(&body)? {
                segmentation.push(desc);
            }
        }
        loop_len -= len + 2;
    }

    Ok(SpliceInfo {
        pts_adjustment,
        command,
        segmentation,
    })
}

fn splice_time<R: BitRead>(br: &mut R) -> Result<Option<u64>, DecodeError> {
    if br.read_bit()? {
        br.skip(6)?;
        Ok(Some(br.read::<33, u64>()?))
    } else {
        br.skip(7)?;
        Ok(None)
    }
}

fn parse_insert<R: BitRead>(br: &mut R, pts_adjustment: u64) -> Result<SpliceInsert, DecodeError> {
    let mut insert = SpliceInsert {
        event_id: br.read::<32, u32>()?,
        cancel: br.read_bit()?,
        ..Default::default()
    };
    br.skip(7)?;
    if insert.cancel {
        return Ok(insert);
    }
    insert.out_of_network = br.read_bit()?;
    let program_splice = br.read_bit()?;
    let duration_flag = br.read_bit()?;
    insert.immediate = br.read_bit()?;
    br.skip(4)?;
    if program_splice && !insert.immediate {
        insert.pts = splice_time(br)?.map(|pts| add_pts(pts, pts_adjustment));
    }
    if !program_splice {
        let components = br.read::<8, u8>()?;
        for _ in 0..components {
            br.skip(8)?; // component_tag
            if !insert.immediate {
                splice_time(br)?;
            }
        }
    }
    if duration_flag {
        br.skip(7)?; // auto_return, reserved
        insert.duration = Some(br.read::<33, u64>()?);
    }
    br.skip(16 + 8 + 8)?; // unique_program_id, avail_num, avails_expected
    Ok(insert)
}

fn parse_segmentation_descriptor(
    body: &[u8],
) -> Result<Option<SegmentationDescriptor>, DecodeError> {
    let mut br = rbsp_reader(body);
    if br.read::<32, u32>()? != CUEI_IDENTIFIER {
        return Ok(None);
    }
    let mut desc = SegmentationDescriptor {
        event_id: br.read::<32, u32>()?,
        ..Default::default()
    };
    let cancel = br.read_bit()?;
    br.skip(7)?;
    if cancel {
        return Ok(Some(desc));
    }
    let program_segmentation = br.read_bit()?;
    let duration_flag = br.read_bit()?;
    br.skip(6)?; // delivery restrictions
    if !program_segmentation {
        let components = br.read::<8, u8>()?;
        br.skip(components as u32 * 48)?;
    }
    if duration_flag {
        desc.duration = Some(br.read::<40, u64>()?);
    }
    br.skip(8)?; // upid_type
    let upid_length = br.read::<8, u8>()?;
    br.skip(upid_length as u32 * 8)?;
    desc.type_id = br.read::<8, u8>()?;
    desc.segment_number = br.read::<8, u8>()?;
    Ok(Some(desc))
}

pub fn segmentation_type_name(type_id: u8) -> &'static str {
    match type_id {
        0x00 => "Not Indicated",
        0x01 => "Content Identification",
        0x10 => "Program Start",
        0x11 => "Program End",
        0x12 => "Program Early Termination",
        0x13 => "Program Breakaway",
        0x14 => "Program Resumption",
        0x15 => "Program Runover Planned",
        0x16 => "Program Runover Unplanned",
        0x17 => "Program Overlap Start",
        0x18 => "Program Blackout Override",
        0x19 => "Program Start - In Progress",
        0x20 => "Chapter Start",
        0x21 => "Chapter End",
        0x22 => "Break Start",
        0x23 => "Break End",
        0x24 => "Opening Credit Start",
        0x25 => "Opening Credit End",
        0x26 => "Closing Credit Start",
        0x27 => "Closing Credit End",
        0x30 => "Provider Advertisement Start",
        0x31 => "Provider Advertisement End",
        0x32 => "Distributor Advertisement Start",
        0x33 => "Distributor Advertisement End",
        0x34 => "Provider Placement Opportunity Start",
        0x35 => "Provider Placement Opportunity End",
        0x36 => "Distributor Placement Opportunity Start",
        0x37 => "Distributor Placement Opportunity End",
        0x38 => "Provider Overlay Placement Opportunity Start",
        0x39 => "Provider Overlay Placement Opportunity End",
        0x3A => "Distributor Overlay Placement Opportunity Start",
        0x3B => "Distributor Overlay Placement Opportunity End",
        0x40 => "Unscheduled Event Start",
        0x41 => "Unscheduled Event End",
        0x50 => "Network Start",
        0x51 => "Network End",
        _ => "",
    }
}

/// One SCTE-35 output record
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Scte35Info {
    pub pid: u16,
    #[serde(rename = "spliceCommand")]
    pub splice_command: SpliceCommandInfo,
    #[serde(rename = "segmentationDes", skip_serializing_if = "Vec::is_empty")]
    pub segmentation: Vec<SegmentationInfo>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpliceCommandInfo {
    #[serde(rename = "type")]
    pub command_type: String,
    pub event_id: u32,
    pub pts: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub duration: u64,
    #[serde(skip_serializing_if = "is_false")]
    pub out_of_network: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub immediate: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationInfo {
    pub segment_number: u8,
    pub event_id: u32,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub duration: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Scte35Info {
    pub fn new(pid: u16, info: &SpliceInfo) -> Self {
        let mut cmd = SpliceCommandInfo {
            command_type: info.command.type_name().to_string(),
            ..Default::default()
        };
        match &info.command {
            SpliceCommand::Insert(insert) => {
                cmd.event_id = insert.event_id;
                cmd.pts = insert.pts.unwrap_or_default();
                cmd.duration = insert.duration.unwrap_or_default();
                cmd.out_of_network = insert.out_of_network;
                cmd.immediate = insert.immediate;
            }
            SpliceCommand::TimeSignal { pts } => cmd.pts = pts.unwrap_or_default(),
            _ => {}
        }
        Scte35Info {
            pid,
            splice_command: cmd,
            segmentation: info
                .segmentation
                .iter()
                .map(|d| SegmentationInfo {
                    segment_number: d.segment_number,
                    event_id: d.event_id,
                    type_name: segmentation_type_name(d.type_id).to_string(),
                    duration: d.duration.unwrap_or_default(),
                })
                .collect(),
        }
    }
}
