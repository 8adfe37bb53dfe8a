//! PID filter and PMT rewriter
//!
//! Works directly on TS packets. Packets before the first PAT are dropped,
//! packets on the PIDs to drop are removed and every PMT that lists one of
//! them is re-serialized without it. Everything else passes through in
//! input order.

use std::collections::{BTreeSet, HashMap};
use std::io::{BufReader, Read, Write};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::{PAT_PID, READ_BUFFER_PACKETS, TS_PACKET_SIZE};
use crate::demux::{PacketReader, TsPacket};
use crate::error::{Error, Result};
use crate::processor::classify_stream;
use crate::psi::{PmtSection, SectionAccumulator, packetize_section, parse_pat, parse_pmt};
use crate::report::JsonPrinter;
use crate::types::{CancelToken, FilterOptions};

type Packet = [u8; TS_PACKET_SIZE];

/// Counters of one filter run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStatistics {
    pub pids_to_drop: Vec<u16>,
    pub total_packets: u32,
    /// PMT packets written after a rewrite
    pub filtered_packets: u32,
    #[serde(rename = "packetsBeforePAT")]
    pub packets_before_pat: u32,
    /// packets removed because their PID is dropped
    pub dropped_packets: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingSync,
    AwaitingPat,
    SteadyState,
}

/// One in-flight PMT: the raw packets seen so far and their reassembly.
#[derive(Default)]
struct PmtAssembly {
    acc: SectionAccumulator,
    packets: Vec<Packet>,
}

pub struct PidFilter {
    drop: BTreeSet<u16>,
    state: State,
    pat_acc: SectionAccumulator,
    pat_packets: Vec<Packet>,
    pmt_pids: BTreeSet<u16>,
    pmts: HashMap<u16, PmtAssembly>,
    /// next continuity counter for rewritten PMT packets
    pmt_cc: HashMap<u16, u8>,
    stream_info_done: bool,
    stats: FilterStatistics,
}

impl PidFilter {
    /// Fails with [`Error::DropPat`] if PID 0 is in the drop set.
    pub fn new(pids_to_drop: &BTreeSet<u16>) -> Result<Self> {
        if pids_to_drop.contains(&PAT_PID) {
            return Err(Error::DropPat);
        }
        Ok(Self {
            drop: pids_to_drop.clone(),
            state: State::SeekingSync,
            pat_acc: SectionAccumulator::new(),
            pat_packets: Vec::new(),
            pmt_pids: BTreeSet::new(),
            pmts: HashMap::new(),
            pmt_cc: HashMap::new(),
            stream_info_done: false,
            stats: FilterStatistics {
                pids_to_drop: pids_to_drop.iter().copied().collect(),
                ..Default::default()
            },
        })
    }

    pub fn statistics(&self) -> &FilterStatistics {
        &self.stats
    }

    pub fn seen_pat(&self) -> bool {
        self.state == State::SteadyState
    }

    /// Feed one sync-aligned packet. Output packets go to `out`; stream info
    /// of the first PMT goes to `jp`.
    pub fn push<O: Write, J: Write>(
        &mut self,
        raw: &Packet,
        out: &mut O,
        jp: &mut JsonPrinter<J>,
        show_stream_info: bool,
    ) -> Result<()> {
        self.stats.total_packets += 1;
        if self.state == State::SeekingSync {
            debug!("in sync, waiting for PAT");
            self.state = State::AwaitingPat;
        }
        let pkt = TsPacket::new(raw);
        let pid = pkt.pid();

        match self.state {
            State::SeekingSync | State::AwaitingPat => {
                if pid != PAT_PID {
                    self.stats.packets_before_pat += 1;
                    return Ok(());
                }
                self.on_first_pat(raw, out)
            }
            State::SteadyState => {
                if self.drop.contains(&pid) {
                    self.stats.dropped_packets += 1;
                    return Ok(());
                }
                if self.pmt_pids.contains(&pid) {
                    return self.on_pmt_packet(raw, out, jp, show_stream_info);
                }
                out.write_all(raw)?;
                Ok(())
            }
        }
    }

    fn on_first_pat<O: Write>(&mut self, raw: &Packet, out: &mut O) -> Result<()> {
        let pkt = TsPacket::new(raw);
        if pkt.payload_unit_start() {
            self.pat_packets.clear();
        }
        self.pat_packets.push(*raw);
        let Some(section) = self.pat_acc.push(pkt.payload_unit_start(), pkt.payload()) else {
            return Ok(());
        };
        let pat = parse_pat(&section)?;
        for pmt_pid in pat.pmt_pids() {
            if self.drop.contains(&pmt_pid) {
                return Err(Error::DropPmt(pmt_pid));
            }
            self.pmt_pids.insert(pmt_pid);
        }
        debug!(
            packets_before_pat = self.stats.packets_before_pat,
            pmt_pids = ?self.pmt_pids,
            "PAT found"
        );
        for p in self.pat_packets.drain(..) {
            out.write_all(&p)?;
        }
        self.state = State::SteadyState;
        Ok(())
    }

    fn on_pmt_packet<O: Write, J: Write>(
        &mut self,
        raw: &Packet,
        out: &mut O,
        jp: &mut JsonPrinter<J>,
        show_stream_info: bool,
    ) -> Result<()> {
        let pkt = TsPacket::new(raw);
        let pid = pkt.pid();
        self.pmt_cc.entry(pid).or_insert(pkt.continuity_counter());

        let asm = self.pmts.entry(pid).or_default();
        if pkt.payload_unit_start() && !asm.packets.is_empty() {
            // previous PMT never completed, pass it on as is
            for p in asm.packets.drain(..) {
                out.write_all(&p)?;
            }
        }
        asm.packets.push(*raw);
        let Some(section) = asm.acc.push(pkt.payload_unit_start(), pkt.payload()) else {
            if asm.packets.len() == 1 && !pkt.payload_unit_start() {
                // continuation without a start
                asm.packets.clear();
                out.write_all(raw)?;
            }
            return Ok(());
        };
        let packets = std::mem::take(&mut asm.packets);

        let mut pmt = parse_pmt(&section)?;
        if pmt.pids().is_empty() {
            warn!(pid, "PMT without elementary streams, restarting reassembly");
            asm.acc.reset();
            for p in &packets {
                out.write_all(p)?;
            }
            return Ok(());
        }

        if !self.stream_info_done {
            for es in &pmt.streams {
                if let Some(info) = classify_stream(es) {
                    jp.print(&info, show_stream_info)?;
                }
            }
            self.stream_info_done = true;
        }

        if !pmt.pids().iter().any(|p| self.drop.contains(p)) {
            for p in &packets {
                out.write_all(p)?;
            }
            return Ok(());
        }
        let rewritten = self.rewrite_pmt(pid, &mut pmt);
        self.stats.filtered_packets += rewritten.len() as u32;
        for p in &rewritten {
            out.write_all(p)?;
        }
        Ok(())
    }

    fn rewrite_pmt(&mut self, pid: u16, pmt: &mut PmtSection) -> Vec<Packet> {
        let keep: Vec<u16> = pmt
            .pids()
            .into_iter()
            .filter(|p| !self.drop.contains(p))
            .collect();
        pmt.retain_pids(&keep);
        debug!(pid, ?keep, "rewriting PMT");
        let cc = self.pmt_cc.entry(pid).or_insert(0);
        packetize_section(pid, &pmt.to_section_bytes(), cc)
    }
}

/// Copy `input` to `out` without the PIDs in `opts.pids_to_drop`, printing
/// stream info and run statistics to `json`.
pub fn filter_pids<O: Write, J: Write, R: Read>(
    mut out: O,
    json: J,
    input: R,
    opts: &FilterOptions,
    cancel: &CancelToken,
) -> Result<FilterStatistics> {
    let mut filter = PidFilter::new(&opts.pids_to_drop)?;
    let mut jp = JsonPrinter::new(json, opts.indent);
    let mut reader = PacketReader::new(BufReader::with_capacity(
        READ_BUFFER_PACKETS * TS_PACKET_SIZE,
        input,
    ));
    let mut buf = [0u8; TS_PACKET_SIZE];
    while reader.read_packet(&mut buf)? {
        if cancel.is_cancelled() {
            info!("cancelled, stopping");
            break;
        }
        filter.push(&buf, &mut out, &mut jp, opts.show_stream_info)?;
    }
    if !filter.seen_pat() && !cancel.is_cancelled() {
        return Err(Error::PatNotFound);
    }
    for asm in filter.pmts.values_mut() {
        for p in asm.packets.drain(..) {
            out.write_all(&p)?;
        }
    }
    out.flush()?;

    let stats = filter.stats;
    jp.print(&stats, opts.show_statistics)?;
    jp.flush()?;
    Ok(stats)
}
