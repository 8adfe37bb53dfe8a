use crate::constants::TABLE_ID_PAT;
use crate::error::{Error, Result};
use crate::psi::section::{SectionReader, build_section};

/// ─────────── PAT ───────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub programs: Vec<PatEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

pub fn parse_pat(payload: &[u8]) -> Result<PatSection> {
    let sec = SectionReader::new(payload)?;
    if sec.table_id != TABLE_ID_PAT {
        return Err(Error::psi(format!("table id {:#04x} is not PAT", sec.table_id)));
    }

    let mut programs = Vec::new();
    for entry in sec.body.chunks_exact(4) {
        let pn = u16::from_be_bytes([entry[0], entry[1]]);
        let pid = (((entry[2] & 0x1F) as u16) << 8) | entry[3] as u16;
        // program 0 points at the NIT
        if pn != 0 {
            programs.push(PatEntry { program_number: pn, pmt_pid: pid });
        }
    }
    Ok(PatSection {
        transport_stream_id: sec.table_id_extension,
        version: sec.version,
        current_next: sec.current_next,
        programs,
    })
}

impl PatSection {
    /// PIDs carrying a PMT, in PAT order.
    pub fn pmt_pids(&self) -> Vec<u16> {
        self.programs.iter().map(|p| p.pmt_pid).collect()
    }

    /// Serialized section (no pointer field).
    pub fn to_section_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.programs.len() * 4);
        for p in &self.programs {
            body.extend_from_slice(&p.program_number.to_be_bytes());
            body.extend_from_slice(&(0xE000 | p.pmt_pid).to_be_bytes());
        }
        build_section(TABLE_ID_PAT, self.transport_stream_id, self.version, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pat_round_trip_skips_nit_entry() {
        let pat = PatSection {
            transport_stream_id: 7,
            version: 2,
            current_next: true,
            programs: vec![PatEntry { program_number: 1, pmt_pid: 0x1000 }],
        };
        let mut payload = vec![0x00];
        payload.extend_from_slice(&pat.to_section_bytes());
        assert_eq!(parse_pat(&payload).unwrap(), pat);

        let mut with_nit = vec![0x00];
        let body = [0x00, 0x00, 0xE0, 0x10, 0x00, 0x01, 0xF0, 0x00];
        with_nit.extend_from_slice(&build_section(TABLE_ID_PAT, 1, 0, &body));
        assert_eq!(parse_pat(&with_nit).unwrap().pmt_pids(), vec![0x1000]);
    }
}
