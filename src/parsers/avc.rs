//! H.264/AVC parameter sets, slice headers and SEI.

use std::collections::BTreeMap;

use bitstream_io::BitRead;
use serde::Serialize;

use super::sei::{self, ClockTimestamp, SeiMessage, read_clock_time, read_signed};
use super::utils::{
    RbspReader, bit_width, cropped_size, rbsp_reader, remove_emulation_prevention, se, ue,
};
use super::{DecodeError, NaluKind, SliceType, VideoCodec};

pub const NALU_NON_IDR: u8 = 1;
pub const NALU_IDR: u8 = 5;
pub const NALU_SEI: u8 = 6;
pub const NALU_SPS: u8 = 7;
pub const NALU_PPS: u8 = 8;
pub const NALU_AUD: u8 = 9;

/// Decoded sequence parameter set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvcSps {
    pub profile: u8,
    pub profile_compatibility: u8,
    pub level: u8,
    pub parameter_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub max_num_ref_frames: u32,
    pub frame_mbs_only_flag: bool,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vui: Option<AvcVui>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvcVui {
    pub sample_aspect_ratio_width: u16,
    pub sample_aspect_ratio_height: u16,
    pub video_full_range_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
    pub pic_struct_present_flag: bool,
}

/// Decoded picture parameter set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvcPps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
}

/// H.264 codec marker for the frame builder.
pub struct Avc;

impl VideoCodec for Avc {
    const NAME: &'static str = "AVC";
    type Sps = AvcSps;
    type Pps = AvcPps;

    fn nalu_type(header: u8) -> u8 {
        header & 0x1F
    }

    fn nalu_kind(nalu_type: u8) -> NaluKind {
        match nalu_type {
            NALU_SPS => NaluKind::Sps,
            NALU_PPS => NaluKind::Pps,
            NALU_SEI => NaluKind::Sei,
            NALU_IDR => NaluKind::Idr,
            NALU_NON_IDR => NaluKind::Slice,
            _ => NaluKind::Other,
        }
    }

    fn nalu_type_name(nalu_type: u8) -> String {
        match nalu_type {
            NALU_NON_IDR => "NonIDR_1".into(),
            NALU_IDR => "IDR_5".into(),
            NALU_SEI => "SEI_6".into(),
            NALU_SPS => "SPS_7".into(),
            NALU_PPS => "PPS_8".into(),
            NALU_AUD => "AUD_9".into(),
            10 => "EndOfSequence_10".into(),
            11 => "EndOfStream_11".into(),
            12 => "FILL_12".into(),
            t => format!("Other_{t}"),
        }
    }

    fn parse_sps(nalu: &[u8]) -> Result<AvcSps, DecodeError> {
        parse_sps(nalu)
    }

    fn sps_id(sps: &AvcSps) -> u32 {
        sps.parameter_id
    }

    fn parse_pps(nalu: &[u8], spss: &BTreeMap<u32, AvcSps>) -> Result<AvcPps, DecodeError> {
        parse_pps(nalu, spss)
    }

    fn pps_id(pps: &AvcPps) -> u32 {
        pps.pic_parameter_set_id
    }

    fn parse_sei(nalu: &[u8]) -> Result<Vec<SeiMessage>, DecodeError> {
        let rbsp = remove_emulation_prevention(nalu.get(1..).unwrap_or_default());
        sei::parse_sei_rbsp(&rbsp)
    }

    fn sei_clocks(
        msg: &SeiMessage,
        sps: Option<&AvcSps>,
    ) -> Result<Option<Vec<ClockTimestamp>>, DecodeError> {
        if msg.payload_type != sei::SEI_PIC_TIMING {
            return Ok(None);
        }
        match sps.and_then(|s| s.vui.as_ref()) {
            Some(vui) => parse_pic_timing(&msg.payload, vui).map(Some),
            None => Ok(None),
        }
    }

    fn slice_type(
        nalu: &[u8],
        _ppss: &BTreeMap<u32, AvcPps>,
    ) -> Result<Option<SliceType>, DecodeError> {
        slice_type(nalu).map(Some)
    }
}

fn nalu_rbsp(nalu: &[u8], expected: u8) -> Result<Vec<u8>, DecodeError> {
    let header = *nalu.first().ok_or(DecodeError::Truncated)?;
    if header & 0x1F != expected {
        return Err(DecodeError::invalid(format!(
            "NAL unit type {} is not {expected}",
            header & 0x1F
        )));
    }
    Ok(remove_emulation_prevention(&nalu[1..]))
}

/// Parse an SPS NAL unit (header byte included).
pub fn parse_sps(nalu: &[u8]) -> Result<AvcSps, DecodeError> {
    let rbsp = nalu_rbsp(nalu, NALU_SPS)?;
    let mut br = rbsp_reader(&rbsp);
    let mut sps = AvcSps {
        profile: br.read::<8, u8>()?,
        profile_compatibility: br.read::<8, u8>()?,
        level: br.read::<8, u8>()?,
        parameter_id: ue(&mut br)?,
        chroma_format_idc: 1,
        ..Default::default()
    };
    if sps.parameter_id > 31 {
        return Err(DecodeError::invalid(format!(
            "SPS id {} out of range",
            sps.parameter_id
        )));
    }

    if matches!(
        sps.profile,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        sps.chroma_format_idc = ue(&mut br)?;
        if sps.chroma_format_idc == 3 {
            sps.separate_colour_plane_flag = br.read_bit()?;
        }
        sps.bit_depth_luma_minus8 = ue(&mut br)?;
        sps.bit_depth_chroma_minus8 = ue(&mut br)?;
        br.skip(1)?; // qpprime_y_zero_transform_bypass_flag
        if br.read_bit()? {
            let lists = if sps.chroma_format_idc == 3 { 12 } else { 8 };
            for idx in 0..lists {
                if br.read_bit()? {
                    skip_scaling_list(&mut br, if idx < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    sps.log2_max_frame_num_minus4 = ue(&mut br)?;
    sps.pic_order_cnt_type = ue(&mut br)?;
    match sps.pic_order_cnt_type {
        0 => {
            ue(&mut br)?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            br.skip(1)?; // delta_pic_order_always_zero_flag
            se(&mut br)?; // offset_for_non_ref_pic
            se(&mut br)?; // offset_for_top_to_bottom_field
            let cycle = ue(&mut br)?;
            for _ in 0..cycle {
                se(&mut br)?;
            }
        }
        _ => {}
    }
    sps.max_num_ref_frames = ue(&mut br)?;
    br.skip(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = ue(&mut br)? + 1;
    let height_in_map_units = ue(&mut br)? + 1;
    sps.frame_mbs_only_flag = br.read_bit()?;
    if !sps.frame_mbs_only_flag {
        br.skip(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip(1)?; // direct_8x8_inference_flag

    let (crop_l, crop_r, crop_t, crop_b) = if br.read_bit()? {
        (ue(&mut br)?, ue(&mut br)?, ue(&mut br)?, ue(&mut br)?)
    } else {
        (0, 0, 0, 0)
    };
    let field_factor = 2 - sps.frame_mbs_only_flag as u32;
    let (crop_unit_x, crop_unit_y) = match sps.chroma_format_idc {
        _ if sps.separate_colour_plane_flag => (1, field_factor),
        0 => (1, field_factor),
        1 => (2, 2 * field_factor),
        2 => (2, field_factor),
        _ => (1, field_factor),
    };
    sps.width = cropped_size(width_in_mbs, 16, (crop_l, crop_r), crop_unit_x, "picture width")?;
    sps.height = cropped_size(
        height_in_map_units,
        field_factor * 16,
        (crop_t, crop_b),
        crop_unit_y,
        "picture height",
    )?;

    if br.read_bit()? {
        sps.vui = Some(parse_vui(&mut br)?);
    }
    Ok(sps)
}

fn skip_scaling_list(br: &mut RbspReader<'_>, size: usize) -> Result<(), DecodeError> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = se(br)?;
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

fn parse_vui(br: &mut RbspReader<'_>) -> Result<AvcVui, DecodeError> {
    let mut vui = AvcVui::default();
    if br.read_bit()? {
        // aspect_ratio_info_present_flag
        let idc = br.read::<8, u8>()?;
        if idc == 255 {
            vui.sample_aspect_ratio_width = br.read::<16, u16>()?;
            vui.sample_aspect_ratio_height = br.read::<16, u16>()?;
        } else if let Some(&(w, h)) = SAR_TABLE.get(idc as usize) {
            vui.sample_aspect_ratio_width = w;
            vui.sample_aspect_ratio_height = h;
        }
    }
    if br.read_bit()? {
        br.skip(1)?; // overscan_appropriate_flag
    }
    if br.read_bit()? {
        br.skip(3)?; // video_format
        vui.video_full_range_flag = br.read_bit()?;
        if br.read_bit()? {
            vui.colour_primaries = br.read::<8, u8>()?;
            vui.transfer_characteristics = br.read::<8, u8>()?;
            vui.matrix_coefficients = br.read::<8, u8>()?;
        }
    }
    if br.read_bit()? {
        ue(br)?; // chroma_sample_loc_type_top_field
        ue(br)?; // chroma_sample_loc_type_bottom_field
    }
    if br.read_bit()? {
        vui.num_units_in_tick = br.read::<32, u32>()?;
        vui.time_scale = br.read::<32, u32>()?;
        vui.fixed_frame_rate_flag = br.read_bit()?;
    }
    vui.nal_hrd_parameters_present_flag = br.read_bit()?;
    if vui.nal_hrd_parameters_present_flag {
        parse_hrd(br, &mut vui)?;
    }
    vui.vcl_hrd_parameters_present_flag = br.read_bit()?;
    if vui.vcl_hrd_parameters_present_flag {
        parse_hrd(br, &mut vui)?;
    }
    if vui.nal_hrd_parameters_present_flag || vui.vcl_hrd_parameters_present_flag {
        br.skip(1)?; // low_delay_hrd_flag
    }
    vui.pic_struct_present_flag = br.read_bit()?;
    // bitstream_restriction is not needed downstream
    Ok(vui)
}

fn parse_hrd(br: &mut RbspReader<'_>, vui: &mut AvcVui) -> Result<(), DecodeError> {
    let cpb_cnt = ue(br)? + 1;
    if cpb_cnt > 32 {
        return Err(DecodeError::invalid(format!("cpb_cnt {cpb_cnt} out of range")));
    }
    br.skip(8)?; // bit_rate_scale, cpb_size_scale
    for _ in 0..cpb_cnt {
        ue(br)?; // bit_rate_value_minus1
        ue(br)?; // cpb_size_value_minus1
        br.skip(1)?; // cbr_flag
    }
    br.skip(5)?; // initial_cpb_removal_delay_length_minus1
    vui.cpb_removal_delay_length_minus1 = br.read::<5, u8>()?;
    vui.dpb_output_delay_length_minus1 = br.read::<5, u8>()?;
    vui.time_offset_length = br.read::<5, u8>()?;
    Ok(())
}

const SAR_TABLE: [(u16, u16); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// Parse a PPS NAL unit. The referenced SPS must be in `spss`.
pub fn parse_pps(nalu: &[u8], spss: &BTreeMap<u32, AvcSps>) -> Result<AvcPps, DecodeError> {
    let rbsp = nalu_rbsp(nalu, NALU_PPS)?;
    let mut br = rbsp_reader(&rbsp);
    let mut pps = AvcPps {
        pic_parameter_set_id: ue(&mut br)?,
        seq_parameter_set_id: ue(&mut br)?,
        ..Default::default()
    };
    let sps = spss.get(&pps.seq_parameter_set_id).ok_or_else(|| {
        DecodeError::invalid(format!(
            "PPS {} refers to unknown SPS {}",
            pps.pic_parameter_set_id, pps.seq_parameter_set_id
        ))
    })?;
    pps.entropy_coding_mode_flag = br.read_bit()?;
    pps.bottom_field_pic_order_in_frame_present_flag = br.read_bit()?;
    pps.num_slice_groups_minus1 = ue(&mut br)?;
    if pps.num_slice_groups_minus1 > 0 {
        skip_slice_group_map(&mut br, pps.num_slice_groups_minus1, sps)?;
    }
    pps.num_ref_idx_l0_default_active_minus1 = ue(&mut br)?;
    pps.num_ref_idx_l1_default_active_minus1 = ue(&mut br)?;
    pps.weighted_pred_flag = br.read_bit()?;
    pps.weighted_bipred_idc = br.read::<2, u8>()?;
    pps.pic_init_qp = 26 + se(&mut br)?;
    se(&mut br)?; // pic_init_qs_minus26
    pps.chroma_qp_index_offset = se(&mut br)?;
    pps.deblocking_filter_control_present_flag = br.read_bit()?;
    pps.constrained_intra_pred_flag = br.read_bit()?;
    pps.redundant_pic_cnt_present_flag = br.read_bit()?;
    Ok(pps)
}

fn skip_slice_group_map(
    br: &mut RbspReader<'_>,
    num_slice_groups_minus1: u32,
    sps: &AvcSps,
) -> Result<(), DecodeError> {
    match ue(br)? {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                ue(br)?; // run_length_minus1
            }
        }
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                ue(br)?; // top_left
                ue(br)?; // bottom_right
            }
        }
        3..=5 => {
            br.skip(1)?; // slice_group_change_direction_flag
            ue(br)?; // slice_group_change_rate_minus1
        }
        6 => {
            let map_units = ue(br)? + 1;
            let bits = bit_width(num_slice_groups_minus1);
            if u64::from(map_units) > u64::from(sps.width) * u64::from(sps.height) {
                return Err(DecodeError::invalid("slice group map larger than picture"));
            }
            for _ in 0..map_units {
                br.skip(bits)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Slice type of a coded slice NAL unit
pub fn slice_type(nalu: &[u8]) -> Result<SliceType, DecodeError> {
    let header = *nalu.first().ok_or(DecodeError::Truncated)?;
    if !matches!(header & 0x1F, NALU_NON_IDR | NALU_IDR) {
        return Err(DecodeError::invalid("not a coded slice"));
    }
    // first_mb_in_slice and slice_type fit in the first few bytes
    let head = &nalu[1..nalu.len().min(16)];
    let rbsp = remove_emulation_prevention(head);
    let mut br = rbsp_reader(&rbsp);
    ue(&mut br)?; // first_mb_in_slice
    Ok(match ue(&mut br)? % 5 {
        0 => SliceType::P,
        1 => SliceType::B,
        2 => SliceType::I,
        3 => SliceType::Sp,
        _ => SliceType::Si,
    })
}

/// Clock timestamps of a pic_timing SEI payload.
pub fn parse_pic_timing(payload: &[u8], vui: &AvcVui) -> Result<Vec<ClockTimestamp>, DecodeError> {
    let mut br = rbsp_reader(payload);
    if vui.nal_hrd_parameters_present_flag || vui.vcl_hrd_parameters_present_flag {
        br.skip(vui.cpb_removal_delay_length_minus1 as u32 + 1)?;
        br.skip(vui.dpb_output_delay_length_minus1 as u32 + 1)?;
    }
    let mut clocks = Vec::new();
    if !vui.pic_struct_present_flag {
        return Ok(clocks);
    }
    let pic_struct = br.read::<4, u8>()?;
    let num_clock_ts = match pic_struct {
        0..=2 => 1,
        3 | 4 | 7 => 2,
        5 | 6 | 8 => 3,
        _ => {
            return Err(DecodeError::invalid(format!("reserved pic_struct {pic_struct}")));
        }
    };
    for _ in 0..num_clock_ts {
        if !br.read_bit()? {
            continue;
        }
        br.skip(2 + 1 + 5)?; // ct_type, nuit_field_based_flag, counting_type
        let mut clock = read_clock_time(&mut br, 8)?;
        clock.time_offset = read_signed(&mut br, vui.time_offset_length as u32)?;
        clocks.push(clock);
    }
    Ok(clocks)
}
