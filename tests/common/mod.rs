//! Synthetic transport streams for the integration tests
#![allow(dead_code)]

use bitstream_io::{BigEndian, BitWrite, BitWriter};
use crc::{CRC_32_MPEG_2, Crc};
use mp2ts_tools::constants::{TABLE_ID_SDT_ACTUAL, TS_PACKET_SIZE, TS_SYNC_BYTE};
use mp2ts_tools::psi::{
    Descriptor, PatEntry, PatSection, PmtSection, StreamInfo, build_section, packetize_section,
};

pub type Packet = [u8; TS_PACKET_SIZE];

pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;
pub const SCTE35_PID: u16 = 0x1F0;

pub const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];
pub const IDR: [u8; 3] = [0x65, 0x88, 0x80];
pub const P_SLICE: [u8; 2] = [0x41, 0x9A];

pub fn pat(pmt_pid: u16) -> Vec<Packet> {
    let pat = PatSection {
        transport_stream_id: 1,
        version: 0,
        current_next: true,
        programs: vec![PatEntry {
            program_number: 1,
            pmt_pid,
        }],
    };
    let mut cc = 0;
    packetize_section(0, &pat.to_section_bytes(), &mut cc)
}

pub fn es(stream_type: u8, pid: u16) -> StreamInfo {
    StreamInfo {
        stream_type,
        elementary_pid: pid,
        descriptors: Vec::<Descriptor>::new(),
    }
}

pub fn pmt(streams: Vec<StreamInfo>) -> Vec<Packet> {
    let pmt = PmtSection {
        version: 0,
        program_number: 1,
        pcr_pid: VIDEO_PID,
        program_info: Vec::new(),
        streams,
    };
    let mut cc = 0;
    packetize_section(PMT_PID, &pmt.to_section_bytes(), &mut cc)
}

/// SDT with one service named `name` from provider "ACME"
pub fn sdt(name: &str) -> Vec<Packet> {
    let mut desc = vec![0x48, 0, 0x01, 4];
    desc.extend_from_slice(b"ACME");
    desc.push(name.len() as u8);
    desc.extend_from_slice(name.as_bytes());
    desc[1] = (desc.len() - 2) as u8;

    let mut body = vec![0x00, 0x01, 0xFF];
    body.extend_from_slice(&[0x00, 0x01, 0xFC]);
    body.extend_from_slice(&(0x8000 | desc.len() as u16).to_be_bytes());
    body.extend_from_slice(&desc);
    let mut cc = 0;
    packetize_section(0x11, &build_section(TABLE_ID_SDT_ACTUAL, 1, 0, &body), &mut cc)
}

/// splice_info_section carrying a splice_null
pub fn splice_null(pid: u16, cc: &mut u8) -> Vec<Packet> {
    let mut sect = vec![
        0xFC, 0x30, 0x11, // table id, flags, section_length
        0x00, // protocol_version
        0x00, 0x00, 0x00, 0x00, 0x00, // encryption, pts_adjustment
        0x00, // cw_index
        0xFF, 0xF0, 0x00, // tier, splice_command_length
        0x00, // splice_null
        0x00, 0x00, // descriptor_loop_length
    ];
    let crc = Crc::<u32>::new(&CRC_32_MPEG_2).checksum(&sect);
    sect.extend_from_slice(&crc.to_be_bytes());
    packetize_section(pid, &sect, cc)
}

fn timestamp(marker: u8, ts: u64) -> [u8; 5] {
    [
        (marker << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
        (ts >> 22) as u8,
        (((ts >> 15) as u8) << 1) | 1,
        (ts >> 7) as u8,
        ((ts as u8) << 1) | 1,
    ]
}

/// Video PES with unbounded length
pub fn video_pes(pts: u64, dts: Option<u64>, data: &[u8]) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80];
    match dts {
        Some(dts) => {
            pes.extend_from_slice(&[0xC0, 10]);
            pes.extend_from_slice(&timestamp(0x3, pts));
            pes.extend_from_slice(&timestamp(0x1, dts));
        }
        None => {
            pes.extend_from_slice(&[0x80, 5]);
            pes.extend_from_slice(&timestamp(0x2, pts));
        }
    }
    pes.extend_from_slice(data);
    pes
}

/// PES as TS packets. The first packet carries payload_unit_start and, with
/// `rai`, an adaptation field with random_access_indicator set. The last
/// packet is filled with adaptation field stuffing.
pub fn packetize_pes(pid: u16, pes: &[u8], rai: bool, cc: &mut u8) -> Vec<Packet> {
    let mut out = Vec::new();
    let mut rest = pes;
    let mut first = true;
    while first || !rest.is_empty() {
        let mut pkt = [0xFF; TS_PACKET_SIZE];
        pkt[0] = TS_SYNC_BYTE;
        pkt[1] = ((pid >> 8) as u8 & 0x1F) | if first { 0x40 } else { 0x00 };
        pkt[2] = pid as u8;

        let flags = first && rai;
        let room = 184 - if flags { 2 } else { 0 };
        let n = rest.len().min(room);
        let af_len = 184 - n;
        if af_len > 0 {
            pkt[3] = 0x30 | (*cc & 0x0F);
            pkt[4] = (af_len - 1) as u8;
            if af_len > 1 {
                pkt[5] = if flags { 0x40 } else { 0x00 };
            }
        } else {
            pkt[3] = 0x10 | (*cc & 0x0F);
        }
        pkt[4 + af_len..].copy_from_slice(&rest[..n]);

        rest = &rest[n..];
        first = false;
        *cc = (*cc + 1) & 0x0F;
        out.push(pkt);
    }
    out
}

pub fn annexb(nalus: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for n in nalus {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(n);
    }
    out
}

fn write_ue(w: &mut BitWriter<Vec<u8>, BigEndian>, v: u32) {
    let v = v + 1;
    let bits = 32 - v.leading_zeros();
    if bits > 1 {
        w.write_var(bits - 1, 0u32).unwrap();
    }
    w.write_var(bits, v).unwrap();
}

/// Baseline 320x240 SPS with the given id
pub fn sps(id: u32) -> Vec<u8> {
    let mut w = BitWriter::endian(vec![0x67], BigEndian);
    w.write::<8, u8>(66).unwrap();
    w.write::<8, u8>(0xC0).unwrap();
    w.write::<8, u8>(30).unwrap();
    write_ue(&mut w, id);
    write_ue(&mut w, 0); // log2_max_frame_num - 4
    write_ue(&mut w, 2); // pic_order_cnt_type
    write_ue(&mut w, 1); // max_num_ref_frames
    w.write_bit(false).unwrap();
    write_ue(&mut w, 19);
    write_ue(&mut w, 14);
    w.write_bit(true).unwrap(); // frame_mbs_only
    w.write_bit(true).unwrap(); // direct_8x8
    w.write_bit(false).unwrap(); // cropping
    w.write_bit(false).unwrap(); // vui
    w.write_bit(true).unwrap(); // stop bit
    w.byte_align().unwrap();
    w.into_writer()
}

/// PAT, PMT with one AVC stream, then `count` access units spaced `step`
/// ticks apart from `first_pts`. Only the first carries SPS, PPS and IDR
/// and has RAI set.
pub fn avc_stream(first_pts: u64, step: u64, count: usize) -> Vec<Packet> {
    let mut packets = pat(PMT_PID);
    packets.extend(pmt(vec![es(0x1B, VIDEO_PID)]));
    let sps = sps(0);
    let mut cc = 0;
    for i in 0..count {
        let pts = (first_pts + i as u64 * step) % (1 << 33);
        let (au, rai) = if i == 0 {
            (annexb(&[&sps, &PPS, &IDR]), true)
        } else {
            (annexb(&[&P_SLICE]), false)
        };
        packets.extend(packetize_pes(VIDEO_PID, &video_pes(pts, None, &au), rai, &mut cc));
    }
    packets
}

pub fn to_bytes(packets: &[Packet]) -> Vec<u8> {
    packets.iter().flatten().copied().collect()
}

/// One JSON value per output line
pub fn json_lines(out: &[u8]) -> Vec<serde_json::Value> {
    std::str::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
