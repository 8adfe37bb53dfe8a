//! Parameter-set state of one video PID

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::parsers::VideoCodec;

/// SPS/PPS/VPS lifecycle for one PID.
///
/// At most one SPS id is ever accepted; a repeat of the same id replaces
/// the stored copy. PPS are keyed by their own id and need an active SPS.
pub struct ParamSets<C: VideoCodec> {
    pid: u16,
    spss: BTreeMap<u32, C::Sps>,
    sps_raw: Vec<u8>,
    ppss: BTreeMap<u32, C::Pps>,
    pps_raw: BTreeMap<u32, Vec<u8>>,
    vps_raw: Option<Vec<u8>>,
}

impl<C: VideoCodec> ParamSets<C> {
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            spss: BTreeMap::new(),
            sps_raw: Vec::new(),
            ppss: BTreeMap::new(),
            pps_raw: BTreeMap::new(),
            vps_raw: None,
        }
    }

    /// Decode and store an SPS NAL unit. Returns its id.
    pub fn observe_sps(&mut self, nalu: &[u8]) -> Result<u32> {
        let sps = C::parse_sps(nalu).map_err(|source| Error::MalformedSps {
            pid: self.pid,
            source,
        })?;
        let id = C::sps_id(&sps);
        if let Some(&active) = self.spss.keys().next() {
            if active != id {
                return Err(Error::MultipleSps {
                    pid: self.pid,
                    active,
                    new: id,
                });
            }
            debug!(pid = self.pid, id, "repeated SPS");
        }
        self.spss.insert(id, sps);
        self.sps_raw = nalu.to_vec();
        Ok(id)
    }

    /// Decode and store a PPS NAL unit. `Ok(None)` when no SPS is active yet.
    pub fn observe_pps(&mut self, nalu: &[u8]) -> Result<Option<u32>> {
        if self.spss.is_empty() {
            debug!(pid = self.pid, "PPS before any SPS, ignored");
            return Ok(None);
        }
        let pps = C::parse_pps(nalu, &self.spss).map_err(|source| Error::MalformedPps {
            pid: self.pid,
            source,
        })?;
        let id = C::pps_id(&pps);
        self.ppss.insert(id, pps);
        self.pps_raw.insert(id, nalu.to_vec());
        Ok(Some(id))
    }

    /// Latest VPS wins.
    pub fn observe_vps(&mut self, nalu: &[u8]) {
        self.vps_raw = Some(nalu.to_vec());
    }

    pub fn active_sps(&self) -> Option<&C::Sps> {
        self.spss.values().next()
    }

    pub fn active_sps_id(&self) -> Option<u32> {
        self.spss.keys().next().copied()
    }

    pub fn sps(&self) -> impl Iterator<Item = (u32, &C::Sps, &[u8])> {
        self.spss
            .iter()
            .map(|(&id, sps)| (id, sps, self.sps_raw.as_slice()))
    }

    pub fn pps(&self) -> impl Iterator<Item = (u32, &C::Pps, &[u8])> {
        self.ppss.iter().filter_map(|(&id, pps)| {
            self.pps_raw.get(&id).map(|raw| (id, pps, raw.as_slice()))
        })
    }

    pub fn pps_map(&self) -> &BTreeMap<u32, C::Pps> {
        &self.ppss
    }

    pub fn vps(&self) -> Option<&[u8]> {
        self.vps_raw.as_deref()
    }
}
