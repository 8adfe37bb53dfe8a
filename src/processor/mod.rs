//! Analysis runs over a transport stream
//!
//! Each run pulls events from the [`Demuxer`], classifies elementary streams
//! from the first PMT and dispatches PES packets by codec. Records are
//! written as JSON lines through a [`JsonPrinter`].

pub mod frame;
pub mod param_set;

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use tracing::{debug, info, warn};

use crate::constants::{
    ANC_REGISTERED_IDENTIFIER, DESCRIPTOR_TAG_ANC, DESCRIPTOR_TAG_DATA_STREAM_ALIGNMENT,
    DESCRIPTOR_TAG_REGISTRATION, STREAM_TYPE_AAC, STREAM_TYPE_H264, STREAM_TYPE_H265,
    READ_BUFFER_PACKETS, STREAM_TYPE_PRIVATE_DATA, STREAM_TYPE_SCTE35, TS_PACKET_SIZE,
};
use crate::demux::{DemuxEvent, Demuxer, PesPacket};
use crate::error::{Error, ErrorCategory, Result};
use crate::parsers::scte35::{Scte35Info, parse_splice_info};
use crate::parsers::smpte2038::{AncillaryPacket, parse_anc_entries};
use crate::parsers::{Avc, Hevc, VideoCodec};
use crate::psi::{PmtSection, SdtInfo, SdtSection, StreamInfo};
use crate::report::JsonPrinter;
use crate::stats::StatsManager;
use crate::types::{CancelToken, ElementaryStreamInfo, Options};

pub use frame::{FrameOutput, VideoState};
pub use param_set::ParamSets;

/// Per-PID processing state, fixed when the first PMT is seen.
pub enum StreamKind {
    Avc(Option<VideoState<Avc>>),
    Hevc(Option<VideoState<Hevc>>),
    Scte35,
    Ancillary,
    Other,
}

impl StreamKind {
    fn from_codec(codec: &str) -> Self {
        match codec {
            "AVC" => StreamKind::Avc(None),
            "HEVC" => StreamKind::Hevc(None),
            "SCTE35" => StreamKind::Scte35,
            "SMPTE-2038" => StreamKind::Ancillary,
            _ => StreamKind::Other,
        }
    }
}

/// Stream info record for a PMT entry, `None` for stream types that are not
/// analysed. Private data with a `VANC` registration is SMPTE-2038.
pub fn classify_stream(es: &StreamInfo) -> Option<ElementaryStreamInfo> {
    let (codec, kind) = match es.stream_type {
        STREAM_TYPE_H264 => ("AVC", "video"),
        STREAM_TYPE_AAC => ("AAC", "audio"),
        STREAM_TYPE_H265 => ("HEVC", "video"),
        STREAM_TYPE_SCTE35 => ("SCTE35", "cue"),
        STREAM_TYPE_PRIVATE_DATA => ("PrivateData", "data"),
        _ => return None,
    };
    let mut info = ElementaryStreamInfo {
        pid: es.elementary_pid,
        codec: codec.to_string(),
        kind: kind.to_string(),
    };
    let pid = es.elementary_pid;
    for d in &es.descriptors {
        match d.tag {
            DESCRIPTOR_TAG_DATA_STREAM_ALIGNMENT => {
                info!(pid, alignment = d.data.first().copied(), "data stream alignment descriptor");
            }
            DESCRIPTOR_TAG_REGISTRATION => {
                let format_id = d
                    .data
                    .get(..4)
                    .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                if format_id == Some(ANC_REGISTERED_IDENTIFIER) {
                    info.codec = "SMPTE-2038".to_string();
                }
            }
            DESCRIPTOR_TAG_ANC => {
                if info.codec != "SMPTE-2038" {
                    warn!(pid, "descriptor 0xc4 without preceding ANC registration");
                    continue;
                }
                info!(pid, data = %hex::encode(&d.data), "ancillary descriptor");
            }
            _ => {}
        }
    }
    Some(info)
}

/// Classified streams of the first PMT, in PMT order.
fn stream_infos(pmt: &PmtSection) -> Vec<ElementaryStreamInfo> {
    pmt.streams.iter().filter_map(classify_stream).collect()
}

struct Analyzer<'o, W: Write> {
    opts: &'o Options,
    jp: JsonPrinter<W>,
    streams: Option<BTreeMap<u16, StreamKind>>,
    stats: StatsManager,
    nr_pictures: usize,
    sdt_printed: bool,
}

impl<'o, W: Write> Analyzer<'o, W> {
    fn new(w: W, opts: &'o Options) -> Self {
        Self {
            opts,
            jp: JsonPrinter::new(w, opts.indent),
            streams: None,
            stats: StatsManager::new(),
            nr_pictures: 0,
            sdt_printed: false,
        }
    }

    fn on_sdt(&mut self, sdt: &SdtSection) -> Result<()> {
        if !self.sdt_printed {
            self.jp.print(&SdtInfo::from(sdt), self.opts.show_service)?;
            self.sdt_printed = true;
        }
        Ok(())
    }

    fn on_pmt(&mut self, pid: u16, pmt: &PmtSection) -> Result<()> {
        if self.streams.is_some() {
            return Ok(());
        }
        debug!(pid, program = pmt.program_number, "using first PMT");
        let mut streams = BTreeMap::new();
        for info in stream_infos(pmt) {
            self.jp.print(&info, self.opts.show_stream_info)?;
            streams.insert(info.pid, StreamKind::from_codec(&info.codec));
        }
        self.streams = Some(streams);
        Ok(())
    }

    fn on_pes(&mut self, pes: &PesPacket) -> Result<()> {
        let Some(streams) = self.streams.as_mut() else {
            return Ok(());
        };
        let counted = match streams.get_mut(&pes.pid) {
            Some(StreamKind::Avc(state)) => {
                video_pes(state, pes, self.opts, &mut self.stats, &mut self.jp)?
            }
            Some(StreamKind::Hevc(state)) => {
                video_pes(state, pes, self.opts, &mut self.stats, &mut self.jp)?
            }
            Some(StreamKind::Ancillary) if self.opts.show_smpte2038 => {
                if let Some(packet) = ancillary_pes(pes) {
                    self.jp.print(&packet, true)?;
                }
                false
            }
            _ => false,
        };
        if counted {
            self.nr_pictures += 1;
        }
        Ok(())
    }

    fn on_section(&mut self, pid: u16, data: &[u8]) -> Result<()> {
        if self.opts.show_scte35 {
            print_scte35(&mut self.jp, pid, data)?;
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.opts.max_nr_pictures > 0 && self.nr_pictures >= self.opts.max_nr_pictures
    }

    fn finish(mut self) -> Result<()> {
        for s in self.stats.finish() {
            self.jp.print(&s, self.opts.show_statistics)?;
        }
        self.jp.flush()
    }
}

/// Runs the frame builder for one PES. Returns whether an access unit was
/// recorded.
fn video_pes<C: VideoCodec, W: Write>(
    state: &mut Option<VideoState<C>>,
    pes: &PesPacket,
    opts: &Options,
    stats: &mut StatsManager,
    jp: &mut JsonPrinter<W>,
) -> Result<bool> {
    let state = state.get_or_insert_with(|| VideoState::new(pes.pid));
    let stream_stats = stats.stream(pes.pid, C::NAME);
    match state.process_pes(pes, opts, stream_stats) {
        Ok(out) => {
            for ps in &out.param_sets {
                jp.print(ps, opts.show_ps)?;
            }
            jp.print(&out.frame, opts.show_nalu)?;
            Ok(true)
        }
        Err(e) if e.category() == ErrorCategory::RecordSkip => {
            warn!(error = %e, "skipping PES");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Decode the ANC packets of a SMPTE-2038 PES. Failures are logged and
/// yield no record.
fn ancillary_pes(pes: &PesPacket) -> Option<AncillaryPacket> {
    let Some(pts) = pes.pts else {
        debug!(pid = pes.pid, "SMPTE-2038 PES without PTS");
        return None;
    };
    if pes.pts_dts_indicator != 2 {
        warn!(pid = pes.pid, indicator = pes.pts_dts_indicator, "SMPTE-2038: invalid PTS_DTS_indicator");
    }
    match parse_anc_entries(&pes.data) {
        Ok(entries) => Some(AncillaryPacket {
            pid: pes.pid,
            pts,
            entries,
        }),
        Err(source) => {
            let err = Error::Ancillary {
                pid: pes.pid,
                source,
            };
            warn!(error = %err, "dropping ancillary PES");
            None
        }
    }
}

fn print_scte35<W: Write>(jp: &mut JsonPrinter<W>, pid: u16, data: &[u8]) -> Result<()> {
    let info = parse_splice_info(data).map_err(|source| Error::Scte35 { pid, source })?;
    jp.print(&Scte35Info::new(pid, &info), true)
}

/// Full NAL unit analysis: stream info, SDT, parameter sets, access units,
/// SMPTE-2038 and SCTE-35 records, then per-PID statistics.
pub fn parse_all<W: Write, R: Read>(
    w: W,
    input: R,
    opts: &Options,
    cancel: &CancelToken,
) -> Result<()> {
    let mut dmx = Demuxer::new(input);
    let mut an = Analyzer::new(w, opts);
    while let Some(ev) = next_event(&mut dmx, cancel)? {
        match ev {
            DemuxEvent::Sdt(sdt) => an.on_sdt(&sdt)?,
            DemuxEvent::Pmt { pid, pmt } => an.on_pmt(pid, &pmt)?,
            DemuxEvent::Pes(pes) => an.on_pes(&pes)?,
            DemuxEvent::Section { pid, data } => an.on_section(pid, &data)?,
            DemuxEvent::Pat(_) => {}
        }
        if an.done() {
            debug!(pictures = an.nr_pictures, "picture limit reached");
            break;
        }
    }
    an.finish()
}

/// Stream info from the first PMT, then (with `show_service`) the first
/// SDT, then stop.
pub fn parse_info<W: Write, R: Read>(
    w: W,
    input: R,
    opts: &Options,
    cancel: &CancelToken,
) -> Result<()> {
    let mut dmx = Demuxer::new(input);
    let mut jp = JsonPrinter::new(w, opts.indent);
    let mut pmt_seen = false;
    let mut sdt: Option<SdtSection> = None;
    while let Some(ev) = next_event(&mut dmx, cancel)? {
        match ev {
            DemuxEvent::Pmt { pmt, .. } if !pmt_seen => {
                for info in stream_infos(&pmt) {
                    jp.print(&info, opts.show_stream_info)?;
                }
                pmt_seen = true;
            }
            DemuxEvent::Sdt(s) => sdt = Some(s),
            _ => {}
        }
        if !pmt_seen {
            continue;
        }
        if !opts.show_service {
            break;
        }
        if let Some(s) = &sdt {
            jp.print(&SdtInfo::from(s), true)?;
            break;
        }
    }
    jp.flush()
}

/// Every SCTE-35 section on the PIDs announced in the PMTs.
pub fn parse_scte35<W: Write, R: Read>(
    w: W,
    input: R,
    opts: &Options,
    cancel: &CancelToken,
) -> Result<()> {
    let mut dmx = Demuxer::new(input);
    let mut jp = JsonPrinter::new(w, opts.indent);
    let mut pat_seen = false;
    while let Some(ev) = next_event(&mut dmx, cancel)? {
        match ev {
            DemuxEvent::Pat(_) => pat_seen = true,
            DemuxEvent::Section { pid, data } if opts.show_scte35 => {
                print_scte35(&mut jp, pid, &data)?;
            }
            _ => {}
        }
    }
    if !pat_seen && !cancel.is_cancelled() {
        return Err(Error::PatNotFound);
    }
    jp.flush()
}

/// [`parse_info`] and [`parse_scte35`] as two passes over one buffered
/// copy of the input. Buffering stops when `cancel` trips; both passes then
/// run over what was read. Their failures are collected.
pub fn parse_info_and_scte35<W: Write, R: Read>(
    mut w: W,
    input: R,
    opts: &Options,
    cancel: &CancelToken,
) -> Result<()> {
    let mut errors = Vec::new();
    let (buf, read_err) = buffer_input(input, cancel);
    if let Some(e) = read_err {
        errors.push(Error::Io(e));
    }
    // the buffered copy is finite, so the passes run to its end
    let replay = CancelToken::new();
    if let Err(e) = parse_info(&mut w, &buf[..], opts, &replay) {
        errors.push(e);
    }
    match parse_scte35(&mut w, &buf[..], opts, &replay) {
        Ok(()) => {}
        Err(Error::PatNotFound) if cancel.is_cancelled() => {}
        Err(e) => errors.push(e),
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Multiple(errors))
    }
}

/// Reads `input` to its end in chunks, stopping early once `cancel` trips.
/// A read error ends the buffering and is returned with what was read.
fn buffer_input<R: Read>(mut input: R, cancel: &CancelToken) -> (Vec<u8>, Option<io::Error>) {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_BUFFER_PACKETS * TS_PACKET_SIZE];
    loop {
        if cancel.is_cancelled() {
            info!(bytes = buf.len(), "cancelled, stopped buffering input");
            return (buf, None);
        }
        match input.read(&mut chunk) {
            Ok(0) => return (buf, None),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (buf, Some(e)),
        }
    }
}

fn next_event<R: Read>(dmx: &mut Demuxer<R>, cancel: &CancelToken) -> Result<Option<DemuxEvent>> {
    if cancel.is_cancelled() {
        info!("cancelled, stopping");
        return Ok(None);
    }
    dmx.next_event()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::Descriptor;

    fn es(stream_type: u8, descriptors: Vec<Descriptor>) -> StreamInfo {
        StreamInfo {
            stream_type,
            elementary_pid: 0x101,
            descriptors,
        }
    }

    #[test]
    fn classification() {
        let info = classify_stream(&es(STREAM_TYPE_H265, vec![])).unwrap();
        assert_eq!((info.codec.as_str(), info.kind.as_str()), ("HEVC", "video"));
        let info = classify_stream(&es(STREAM_TYPE_SCTE35, vec![])).unwrap();
        assert_eq!((info.codec.as_str(), info.kind.as_str()), ("SCTE35", "cue"));
        assert!(classify_stream(&es(0x02, vec![])).is_none());
    }

    #[test]
    fn vanc_registration_marks_ancillary() {
        let reg = Descriptor {
            tag: DESCRIPTOR_TAG_REGISTRATION,
            data: ANC_REGISTERED_IDENTIFIER.to_be_bytes().to_vec(),
        };
        let anc = Descriptor {
            tag: DESCRIPTOR_TAG_ANC,
            data: vec![0x01],
        };
        let info = classify_stream(&es(STREAM_TYPE_PRIVATE_DATA, vec![reg, anc])).unwrap();
        assert_eq!(info.codec, "SMPTE-2038");
        assert_eq!(info.kind, "data");
        assert!(matches!(StreamKind::from_codec(&info.codec), StreamKind::Ancillary));

        let info = classify_stream(&es(STREAM_TYPE_PRIVATE_DATA, vec![])).unwrap();
        assert_eq!(info.codec, "PrivateData");
    }

    #[test]
    fn ancillary_without_pts_is_skipped() {
        let pes = PesPacket {
            pid: 0x102,
            stream_id: 0xBD,
            pts: None,
            dts: None,
            pts_dts_indicator: 0,
            random_access_indicator: None,
            data: bytes::Bytes::from_static(&[0xFF]),
        };
        assert!(ancillary_pes(&pes).is_none());
    }

    #[test]
    fn cancelled_run_stops_before_reading() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let garbage = [0u8; 1000];
        parse_all(&mut out, &garbage[..], &Options::full(0), &cancel).unwrap();
        assert!(out.is_empty());
    }
}
