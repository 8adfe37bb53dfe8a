//! Access-unit records for AVC and HEVC PES packets

use tracing::{debug, warn};

use super::param_set::ParamSets;
use crate::demux::PesPacket;
use crate::error::{Error, Result};
use crate::parsers::{NaluKind, SeiMessage, VideoCodec, split_nalus};
use crate::stats::StreamStatistics;
use crate::types::{NaluData, NaluFrameData, Options, PsInfo, SeiOut};

/// What one PES produced: parameter-set records (only when a parameter set
/// arrived in it) followed by the access-unit record.
#[derive(Debug)]
pub struct FrameOutput {
    pub param_sets: Vec<PsInfo>,
    pub frame: NaluFrameData,
}

/// Per-PID video state, created on the first PES of the PID.
pub struct VideoState<C: VideoCodec> {
    pid: u16,
    params: ParamSets<C>,
}

impl<C: VideoCodec> VideoState<C> {
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            params: ParamSets::new(pid),
        }
    }

    pub fn params(&self) -> &ParamSets<C> {
        &self.params
    }

    /// Turn one PES into an access-unit record, updating parameter sets and
    /// the timestamp series in `stats`.
    pub fn process_pes(
        &mut self,
        pes: &PesPacket,
        opts: &Options,
        stats: &mut StreamStatistics,
    ) -> Result<FrameOutput> {
        let pts = pes.pts.ok_or(Error::MissingPts(self.pid))?;
        let rai = pes.random_access_indicator.unwrap_or(false);
        let mut frame = NaluFrameData {
            pid: self.pid,
            rai,
            pts,
            dts: pes.dts,
            ..Default::default()
        };

        stats.timestamps.push(pes.dts.unwrap_or(pts) as i64);
        if rai {
            stats.rai_timestamps.push(pts as i64);
        }
        let nalus = split_nalus(&pes.data);
        let has_idr = nalus
            .iter()
            .filter_map(|n| n.first())
            .any(|&h| C::nalu_kind(C::nalu_type(h)) == NaluKind::Idr);
        if has_idr {
            stats.idr_timestamps.push(pts as i64);
        }

        let mut out = FrameOutput {
            param_sets: Vec::new(),
            frame: NaluFrameData::default(),
        };
        if !opts.show_nalu && !opts.show_ps {
            out.frame = frame;
            return Ok(out);
        }

        // first_ps is set by a VPS or the first SPS of this PES and makes
        // the parameter sets reported; later SPS copies in the same PES are
        // ignored and PPS are only taken after first_ps
        let mut first_ps = false;
        let mut sps_seen = false;
        for nalu in nalus {
            let Some(&header) = nalu.first() else {
                continue;
            };
            let nalu_type = C::nalu_type(header);
            let mut data = None;
            match C::nalu_kind(nalu_type) {
                NaluKind::Vps => {
                    self.params.observe_vps(nalu);
                    first_ps = true;
                }
                NaluKind::Sps if !sps_seen => {
                    self.params.observe_sps(nalu)?;
                    sps_seen = true;
                    first_ps = true;
                }
                NaluKind::Sps => debug!(pid = self.pid, "extra SPS in PES ignored"),
                NaluKind::Pps if first_ps => {
                    self.params.observe_pps(nalu)?;
                }
                NaluKind::Pps => {}
                NaluKind::Sei if opts.show_sei || opts.show_sei_details => {
                    data = Some(self.sei_output(nalu, opts, stats)?);
                }
                NaluKind::Idr | NaluKind::Slice => {
                    match C::slice_type(nalu, self.params.pps_map()) {
                        Ok(Some(t)) => frame.img_type = Some(format!("[{t}]")),
                        Ok(None) => {}
                        Err(e) => debug!(pid = self.pid, error = %e, "slice type not decodable"),
                    }
                }
                NaluKind::Sei | NaluKind::Other => {}
            }
            frame.nalus.push(NaluData {
                nalu_type: C::nalu_type_name(nalu_type),
                len: nalu.len(),
                data,
            });
        }

        if first_ps {
            out.param_sets = self.param_set_records(opts.verbose_ps_info)?;
        }
        out.frame = frame;
        Ok(out)
    }

    fn sei_output(
        &self,
        nalu: &[u8],
        opts: &Options,
        stats: &mut StreamStatistics,
    ) -> Result<Vec<SeiOut>> {
        let msgs = C::parse_sei(nalu).map_err(|source| Error::Sei {
            pid: self.pid,
            source,
        })?;
        let sps = self.params.active_sps();
        let mut out = Vec::with_capacity(msgs.len());
        for msg in &msgs {
            match C::sei_clocks(msg, sps) {
                Ok(Some(clocks)) if !clocks.is_empty() => out.push(SeiOut {
                    msg: msg.type_name().to_string(),
                    payload: Some(
                        clocks
                            .iter()
                            .map(|c| c.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    ),
                }),
                Ok(_) => out.push(plain_sei(msg, opts.show_sei_details)),
                Err(e) => {
                    warn!(pid = self.pid, msg = msg.type_name(), error = %e, "skipping SEI message");
                    stats.sei_messages_skipped += 1;
                }
            }
        }
        Ok(out)
    }

    fn param_set_records(&self, verbose: bool) -> Result<Vec<PsInfo>> {
        let mut records = Vec::new();
        if let Some(vps) = self.params.vps() {
            records.push(ps_info(self.pid, "VPS", 0, vps, None));
        }
        for (id, sps, raw) in self.params.sps() {
            let details = verbose.then(|| serde_json::to_value(sps)).transpose()?;
            records.push(ps_info(self.pid, "SPS", id, raw, details));
        }
        for (id, pps, raw) in self.params.pps() {
            let details = verbose.then(|| serde_json::to_value(pps)).transpose()?;
            records.push(ps_info(self.pid, "PPS", id, raw, details));
        }
        Ok(records)
    }
}

fn plain_sei(msg: &SeiMessage, details: bool) -> SeiOut {
    SeiOut {
        msg: msg.type_name().to_string(),
        payload: details.then(|| hex::encode(&msg.payload)),
    }
}

fn ps_info(
    pid: u16,
    kind: &str,
    nr: u32,
    raw: &[u8],
    details: Option<serde_json::Value>,
) -> PsInfo {
    PsInfo {
        pid,
        parameter_set: kind.to_string(),
        nr,
        hex: hex::encode(raw),
        length: raw.len(),
        details,
    }
}
