//! Transport stream demultiplexer
//!
//! Turns a byte stream into PAT, PMT, SDT, SCTE-35 section and PES events.
//! PSI sections are reassembled per PID and CRC checked; PES packets are
//! reassembled per elementary PID and complete at the next
//! payload_unit_start, when `PES_packet_length` is reached, or at end of
//! stream.

pub mod packet;
pub mod pes;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io::{BufReader, Read};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::constants::{
    PAT_PID, READ_BUFFER_PACKETS, SDT_PID, STREAM_TYPE_SCTE35, TABLE_ID_SDT_ACTUAL, TS_PACKET_SIZE,
};
use crate::error::Result;
use crate::psi::{PatSection, PmtSection, SdtSection, SectionAccumulator, parse_pat, parse_pmt, parse_sdt};

pub use packet::{PacketReader, TsPacket};
pub use pes::PesPacket;

pub enum DemuxEvent {
    Pat(PatSection),
    Pmt { pid: u16, pmt: PmtSection },
    Sdt(SdtSection),
    /// A complete SCTE-35 section, pointer field included
    Section { pid: u16, data: Vec<u8> },
    Pes(PesPacket),
}

struct PesBuffer {
    rai: Option<bool>,
    data: BytesMut,
}

pub struct Demuxer<R> {
    reader: PacketReader<BufReader<R>>,
    events: VecDeque<DemuxEvent>,
    sections: HashMap<u16, SectionAccumulator>,
    /// last section seen per PSI PID, to report tables once per change
    last_tables: HashMap<u16, Vec<u8>>,
    pmt_pids: BTreeSet<u16>,
    scte35_pids: BTreeSet<u16>,
    es_pids: BTreeSet<u16>,
    pes: BTreeMap<u16, PesBuffer>,
    eof: bool,
}

impl<R: Read> Demuxer<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: PacketReader::new(BufReader::with_capacity(
                READ_BUFFER_PACKETS * TS_PACKET_SIZE,
                input,
            )),
            events: VecDeque::new(),
            sections: HashMap::new(),
            last_tables: HashMap::new(),
            pmt_pids: BTreeSet::new(),
            scte35_pids: BTreeSet::new(),
            es_pids: BTreeSet::new(),
            pes: BTreeMap::new(),
            eof: false,
        }
    }

    /// Next event, `None` at end of stream.
    pub fn next_event(&mut self) -> Result<Option<DemuxEvent>> {
        let mut buf = [0u8; TS_PACKET_SIZE];
        loop {
            if let Some(ev) = self.events.pop_front() {
                return Ok(Some(ev));
            }
            if self.eof {
                return Ok(None);
            }
            if self.reader.read_packet(&mut buf)? {
                self.handle_packet(&TsPacket::new(&buf))?;
            } else {
                self.eof = true;
                self.flush_pes();
            }
        }
    }

    fn handle_packet(&mut self, pkt: &TsPacket<'_>) -> Result<()> {
        let pid = pkt.pid();
        if pid == PAT_PID || pid == SDT_PID || self.pmt_pids.contains(&pid) || self.scte35_pids.contains(&pid) {
            return self.handle_section_packet(pid, pkt);
        }
        if self.es_pids.contains(&pid) {
            self.handle_pes_packet(pid, pkt);
        }
        Ok(())
    }

    fn handle_section_packet(&mut self, pid: u16, pkt: &TsPacket<'_>) -> Result<()> {
        let acc = self.sections.entry(pid).or_default();
        let Some(section) = acc.push(pkt.payload_unit_start(), pkt.payload()) else {
            return Ok(());
        };

        if self.scte35_pids.contains(&pid) {
            self.events.push_back(DemuxEvent::Section { pid, data: section });
            return Ok(());
        }
        if self.last_tables.get(&pid) == Some(&section) {
            return Ok(());
        }

        if pid == PAT_PID {
            let pat = parse_pat(&section)?;
            self.pmt_pids = pat.pmt_pids().into_iter().collect();
            debug!(pmt_pids = ?self.pmt_pids, "PAT");
            self.events.push_back(DemuxEvent::Pat(pat));
        } else if self.pmt_pids.contains(&pid) {
            let pmt = parse_pmt(&section)?;
            for es in &pmt.streams {
                if es.stream_type == STREAM_TYPE_SCTE35 {
                    self.scte35_pids.insert(es.elementary_pid);
                } else {
                    self.es_pids.insert(es.elementary_pid);
                }
            }
            self.events.push_back(DemuxEvent::Pmt { pid, pmt });
        } else {
            // SDT PID also carries BAT and SDT other
            if section.get(1 + section[0] as usize) != Some(&TABLE_ID_SDT_ACTUAL) {
                return Ok(());
            }
            match parse_sdt(&section) {
                Ok(sdt) => self.events.push_back(DemuxEvent::Sdt(sdt)),
                Err(e) => warn!(error = %e, "skipping SDT"),
            }
        }
        self.last_tables.insert(pid, section);
        Ok(())
    }

    fn handle_pes_packet(&mut self, pid: u16, pkt: &TsPacket<'_>) {
        let payload = pkt.payload();
        if pkt.payload_unit_start() {
            if let Some(prev) = self.pes.remove(&pid) {
                self.emit_pes(pid, prev);
            }
            let mut data = BytesMut::with_capacity(64 * 1024);
            data.extend_from_slice(payload);
            self.pes.insert(
                pid,
                PesBuffer {
                    rai: pkt.random_access_indicator(),
                    data,
                },
            );
        } else if let Some(buf) = self.pes.get_mut(&pid) {
            buf.data.extend_from_slice(payload);
        } else {
            return; // continuation without a start
        }

        let complete = self
            .pes
            .get(&pid)
            .and_then(|b| pes::expected_len(&b.data).map(|n| b.data.len() >= n))
            .unwrap_or(false);
        if complete {
            if let Some(buf) = self.pes.remove(&pid) {
                self.emit_pes(pid, buf);
            }
        }
    }

    fn emit_pes(&mut self, pid: u16, buf: PesBuffer) {
        match pes::parse_pes(pid, buf.rai, buf.data.freeze()) {
            Ok(p) => self.events.push_back(DemuxEvent::Pes(p)),
            Err(e) => warn!(pid, error = %e, "dropping PES"),
        }
    }

    fn flush_pes(&mut self) {
        for (pid, buf) in std::mem::take(&mut self.pes) {
            self.emit_pes(pid, buf);
        }
    }
}
