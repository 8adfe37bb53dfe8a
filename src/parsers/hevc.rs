//! H.265/HEVC parameter sets, slice headers and SEI.

use std::collections::BTreeMap;

use bitstream_io::BitRead;
use serde::Serialize;

use super::sei::{self, ClockTimestamp, SeiMessage, read_clock_time, read_signed};
use super::utils::{RbspReader, cropped_size, rbsp_reader, remove_emulation_prevention, se, ue};
use super::{DecodeError, NaluKind, SliceType, VideoCodec};

pub const NALU_IDR_W_RADL: u8 = 19;
pub const NALU_IDR_N_LP: u8 = 20;
pub const NALU_VPS: u8 = 32;
pub const NALU_SPS: u8 = 33;
pub const NALU_PPS: u8 = 34;
pub const NALU_AUD: u8 = 35;
pub const NALU_SEI_PREFIX: u8 = 39;
pub const NALU_SEI_SUFFIX: u8 = 40;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HevcSps {
    pub vps_id: u8,
    pub max_sub_layers_minus1: u8,
    pub general_profile_idc: u8,
    pub general_tier_flag: bool,
    pub general_level_idc: u8,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub width: u32,
    pub height: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HevcPps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp: i32,
}

/// H.265 codec marker for the frame builder.
pub struct Hevc;

impl VideoCodec for Hevc {
    const NAME: &'static str = "HEVC";
    type Sps = HevcSps;
    type Pps = HevcPps;

    fn nalu_type(header: u8) -> u8 {
        (header >> 1) & 0x3F
    }

    fn nalu_kind(nalu_type: u8) -> NaluKind {
        match nalu_type {
            NALU_VPS => NaluKind::Vps,
            NALU_SPS => NaluKind::Sps,
            NALU_PPS => NaluKind::Pps,
            NALU_SEI_PREFIX | NALU_SEI_SUFFIX => NaluKind::Sei,
            NALU_IDR_W_RADL | NALU_IDR_N_LP => NaluKind::Idr,
            0..=9 | 16..=21 => NaluKind::Slice,
            _ => NaluKind::Other,
        }
    }

    fn nalu_type_name(nalu_type: u8) -> String {
        let prefix = match nalu_type {
            0 | 1 => "NonRAP_Trail",
            2 | 3 => "NonRAP_TSA",
            4 | 5 => "NonRAP_STSA",
            6 | 7 => "NonRAP_RADL",
            8 | 9 => "NonRAP_RASL",
            16..=18 => "RAP_BLA",
            NALU_IDR_W_RADL | NALU_IDR_N_LP => "RAP_IDR",
            21 => "RAP_CRA",
            NALU_VPS => "VPS",
            NALU_SPS => "SPS",
            NALU_PPS => "PPS",
            NALU_AUD => "AUD",
            36 => "EOS",
            37 => "EOB",
            38 => "FD",
            NALU_SEI_PREFIX => "SEIPrefix",
            NALU_SEI_SUFFIX => "SEISuffix",
            _ => "Other",
        };
        format!("{prefix}_{nalu_type}")
    }

    fn parse_sps(nalu: &[u8]) -> Result<HevcSps, DecodeError> {
        parse_sps(nalu)
    }

    fn sps_id(sps: &HevcSps) -> u32 {
        sps.sps_id
    }

    fn parse_pps(nalu: &[u8], spss: &BTreeMap<u32, HevcSps>) -> Result<HevcPps, DecodeError> {
        parse_pps(nalu, spss)
    }

    fn pps_id(pps: &HevcPps) -> u32 {
        pps.pic_parameter_set_id
    }

    fn parse_sei(nalu: &[u8]) -> Result<Vec<SeiMessage>, DecodeError> {
        let rbsp = remove_emulation_prevention(nalu.get(2..).unwrap_or_default());
        sei::parse_sei_rbsp(&rbsp)
    }

    fn sei_clocks(
        msg: &SeiMessage,
        _sps: Option<&HevcSps>,
    ) -> Result<Option<Vec<ClockTimestamp>>, DecodeError> {
        if msg.payload_type != sei::SEI_TIME_CODE {
            return Ok(None);
        }
        parse_time_code(&msg.payload).map(Some)
    }

    fn slice_type(
        nalu: &[u8],
        ppss: &BTreeMap<u32, HevcPps>,
    ) -> Result<Option<SliceType>, DecodeError> {
        slice_type(nalu, ppss)
    }
}

fn nalu_rbsp(nalu: &[u8], expected: u8) -> Result<Vec<u8>, DecodeError> {
    if nalu.len() < 2 {
        return Err(DecodeError::Truncated);
    }
    let nalu_type = Hevc::nalu_type(nalu[0]);
    if nalu_type != expected {
        return Err(DecodeError::invalid(format!(
            "NAL unit type {nalu_type} is not {expected}"
        )));
    }
    Ok(remove_emulation_prevention(&nalu[2..]))
}

pub fn parse_sps(nalu: &[u8]) -> Result<HevcSps, DecodeError> {
    let rbsp = nalu_rbsp(nalu, NALU_SPS)?;
    let mut br = rbsp_reader(&rbsp);
    let mut sps = HevcSps {
        vps_id: br.read::<4, u8>()?,
        max_sub_layers_minus1: br.read::<3, u8>()?,
        ..Default::default()
    };
    br.skip(1)?; // sps_temporal_id_nesting_flag
    profile_tier_level(&mut br, &mut sps)?;

    sps.sps_id = ue(&mut br)?;
    if sps.sps_id > 15 {
        return Err(DecodeError::invalid(format!("SPS id {} out of range", sps.sps_id)));
    }
    sps.chroma_format_idc = ue(&mut br)?;
    if sps.chroma_format_idc == 3 {
        sps.separate_colour_plane_flag = br.read_bit()?;
    }
    sps.pic_width_in_luma_samples = ue(&mut br)?;
    sps.pic_height_in_luma_samples = ue(&mut br)?;
    sps.width = sps.pic_width_in_luma_samples;
    sps.height = sps.pic_height_in_luma_samples;
    if br.read_bit()? {
        // conformance_window_flag
        let (left, right, top, bottom) = (ue(&mut br)?, ue(&mut br)?, ue(&mut br)?, ue(&mut br)?);
        let chroma = if sps.separate_colour_plane_flag { 0 } else { sps.chroma_format_idc };
        let sub_width = if chroma == 1 || chroma == 2 { 2 } else { 1 };
        let sub_height = if chroma == 1 { 2 } else { 1 };
        sps.width = cropped_size(sps.width, 1, (left, right), sub_width, "picture width")?;
        sps.height = cropped_size(sps.height, 1, (top, bottom), sub_height, "picture height")?;
    }
    sps.bit_depth_luma_minus8 = ue(&mut br)?;
    sps.bit_depth_chroma_minus8 = ue(&mut br)?;
    sps.log2_max_pic_order_cnt_lsb_minus4 = ue(&mut br)?;
    Ok(sps)
}

fn profile_tier_level(br: &mut RbspReader<'_>, sps: &mut HevcSps) -> Result<(), DecodeError> {
    br.skip(2)?; // general_profile_space
    sps.general_tier_flag = br.read_bit()?;
    sps.general_profile_idc = br.read::<5, u8>()?;
    br.skip(32)?; // general_profile_compatibility_flags
    br.skip(48)?; // source flags, constraint flags, general_inbld/reserved
    sps.general_level_idc = br.read::<8, u8>()?;

    let sub_layers = sps.max_sub_layers_minus1 as usize;
    let mut present = Vec::with_capacity(sub_layers);
    for _ in 0..sub_layers {
        present.push((br.read_bit()?, br.read_bit()?));
    }
    if sub_layers > 0 {
        for _ in sub_layers..8 {
            br.skip(2)?; // reserved_zero_2bits
        }
    }
    for (profile_present, level_present) in present {
        if profile_present {
            br.skip(88)?;
        }
        if level_present {
            br.skip(8)?;
        }
    }
    Ok(())
}

pub fn parse_pps(nalu: &[u8], spss: &BTreeMap<u32, HevcSps>) -> Result<HevcPps, DecodeError> {
    let rbsp = nalu_rbsp(nalu, NALU_PPS)?;
    let mut br = rbsp_reader(&rbsp);
    let mut pps = HevcPps {
        pic_parameter_set_id: ue(&mut br)?,
        seq_parameter_set_id: ue(&mut br)?,
        ..Default::default()
    };
    if !spss.contains_key(&pps.seq_parameter_set_id) {
        return Err(DecodeError::invalid(format!(
            "PPS {} refers to unknown SPS {}",
            pps.pic_parameter_set_id, pps.seq_parameter_set_id
        )));
    }
    pps.dependent_slice_segments_enabled_flag = br.read_bit()?;
    pps.output_flag_present_flag = br.read_bit()?;
    pps.num_extra_slice_header_bits = br.read::<3, u8>()?;
    pps.sign_data_hiding_enabled_flag = br.read_bit()?;
    pps.cabac_init_present_flag = br.read_bit()?;
    pps.num_ref_idx_l0_default_active_minus1 = ue(&mut br)?;
    pps.num_ref_idx_l1_default_active_minus1 = ue(&mut br)?;
    pps.init_qp = 26 + se(&mut br)?;
    Ok(pps)
}

/// Slice type of the first slice segment of a picture. Later segments
/// need the CTB layout to locate the field and yield `None`.
pub fn slice_type(
    nalu: &[u8],
    ppss: &BTreeMap<u32, HevcPps>,
) -> Result<Option<SliceType>, DecodeError> {
    if nalu.len() < 3 {
        return Err(DecodeError::Truncated);
    }
    let nalu_type = Hevc::nalu_type(nalu[0]);
    let head = &nalu[2..nalu.len().min(24)];
    let rbsp = remove_emulation_prevention(head);
    let mut br = rbsp_reader(&rbsp);
    let first_slice_segment = br.read_bit()?;
    if (16..=23).contains(&nalu_type) {
        br.skip(1)?; // no_output_of_prior_pics_flag
    }
    let pps_id = ue(&mut br)?;
    if !first_slice_segment {
        return Ok(None);
    }
    let pps = ppss
        .get(&pps_id)
        .ok_or_else(|| DecodeError::invalid(format!("slice refers to unknown PPS {pps_id}")))?;
    br.skip(pps.num_extra_slice_header_bits as u32)?;
    Ok(Some(match ue(&mut br)? {
        0 => SliceType::B,
        1 => SliceType::P,
        2 => SliceType::I,
        t => return Err(DecodeError::invalid(format!("invalid slice_type {t}"))),
    }))
}

/// Clock timestamps of a time_code SEI payload.
pub fn parse_time_code(payload: &[u8]) -> Result<Vec<ClockTimestamp>, DecodeError> {
    let mut br = rbsp_reader(payload);
    let num_clock_ts = br.read::<2, u8>()?;
    let mut clocks = Vec::with_capacity(num_clock_ts as usize);
    for _ in 0..num_clock_ts {
        if !br.read_bit()? {
            continue;
        }
        br.skip(1 + 5)?; // units_field_based_flag, counting_type
        let mut clock = read_clock_time(&mut br, 9)?;
        let time_offset_length = br.read::<5, u32>()?;
        clock.time_offset = read_signed(&mut br, time_offset_length)?;
        clocks.push(clock);
    }
    Ok(clocks)
}
