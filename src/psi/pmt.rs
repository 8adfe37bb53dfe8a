use crate::constants::TABLE_ID_PMT;
use crate::error::{Error, Result};
use crate::psi::section::{SectionReader, build_section};

/// ─────────── PMT ───────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtSection {
    pub version: u8,
    pub program_number: u16,
    pub pcr_pid: u16,
    pub program_info: Vec<u8>,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

pub fn parse_pmt(payload: &[u8]) -> Result<PmtSection> {
    let sec = SectionReader::new(payload)?;
    if sec.table_id != TABLE_ID_PMT {
        return Err(Error::psi(format!("table id {:#04x} is not PMT", sec.table_id)));
    }
    let b = sec.body;
    if b.len() < 4 {
        return Err(Error::psi("PMT body too short"));
    }

    let pcr_pid = (((b[0] & 0x1F) as u16) << 8) | b[1] as u16;
    let prog_info_len = (((b[2] & 0x0F) as usize) << 8) | b[3] as usize;
    let mut idx = 4 + prog_info_len;
    let program_info = b
        .get(4..idx)
        .ok_or_else(|| Error::psi("program_info_length exceeds section"))?
        .to_vec();

    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        let stream_type = b[idx];
        let elementary_pid = (((b[idx + 1] & 0x1F) as u16) << 8) | b[idx + 2] as u16;
        let es_len = (((b[idx + 3] & 0x0F) as usize) << 8) | b[idx + 4] as usize;
        let es_info = b
            .get(idx + 5..idx + 5 + es_len)
            .ok_or_else(|| Error::psi(format!("ES_info of PID {elementary_pid} exceeds section")))?;
        streams.push(StreamInfo {
            stream_type,
            elementary_pid,
            descriptors: parse_descriptors(es_info),
        });
        idx += 5 + es_len;
    }

    Ok(PmtSection {
        version: sec.version,
        program_number: sec.table_id_extension,
        pcr_pid,
        program_info,
        streams,
    })
}

/// Tag/length/value descriptor loop. A truncated last descriptor is dropped.
pub fn parse_descriptors(mut data: &[u8]) -> Vec<Descriptor> {
    let mut out = Vec::new();
    while data.len() >= 2 {
        let len = data[1] as usize;
        let Some(value) = data.get(2..2 + len) else {
            break;
        };
        out.push(Descriptor { tag: data[0], data: value.to_vec() });
        data = &data[2 + len..];
    }
    out
}

impl PmtSection {
    pub fn pids(&self) -> Vec<u16> {
        self.streams.iter().map(|s| s.elementary_pid).collect()
    }

    /// Keep only the elementary streams whose PID is in `keep`.
    pub fn retain_pids(&mut self, keep: &[u16]) {
        self.streams.retain(|s| keep.contains(&s.elementary_pid));
    }

    /// Serialized section (no pointer field).
    pub fn to_section_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(0xE000 | self.pcr_pid).to_be_bytes());
        body.extend_from_slice(&(0xF000 | self.program_info.len() as u16).to_be_bytes());
        body.extend_from_slice(&self.program_info);
        for s in &self.streams {
            let es_info_len: usize = s.descriptors.iter().map(|d| 2 + d.data.len()).sum();
            body.push(s.stream_type);
            body.extend_from_slice(&(0xE000 | s.elementary_pid).to_be_bytes());
            body.extend_from_slice(&(0xF000 | es_info_len as u16).to_be_bytes());
            for d in &s.descriptors {
                body.push(d.tag);
                body.push(d.data.len() as u8);
                body.extend_from_slice(&d.data);
            }
        }
        build_section(TABLE_ID_PMT, self.program_number, self.version, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DESCRIPTOR_TAG_REGISTRATION, STREAM_TYPE_H264, STREAM_TYPE_PRIVATE_DATA};

    fn sample() -> PmtSection {
        PmtSection {
            version: 1,
            program_number: 1,
            pcr_pid: 256,
            program_info: vec![],
            streams: vec![
                StreamInfo {
                    stream_type: STREAM_TYPE_H264,
                    elementary_pid: 256,
                    descriptors: vec![],
                },
                StreamInfo {
                    stream_type: STREAM_TYPE_PRIVATE_DATA,
                    elementary_pid: 258,
                    descriptors: vec![Descriptor {
                        tag: DESCRIPTOR_TAG_REGISTRATION,
                        data: b"VANC".to_vec(),
                    }],
                },
            ],
        }
    }

    #[test]
    fn serialized_pmt_parses_back() {
        let pmt = sample();
        let mut payload = vec![0x00];
        payload.extend_from_slice(&pmt.to_section_bytes());
        assert_eq!(parse_pmt(&payload).unwrap(), pmt);
    }

    #[test]
    fn retain_removes_streams() {
        let mut pmt = sample();
        pmt.retain_pids(&[256]);
        assert_eq!(pmt.pids(), vec![256]);
    }

    #[test]
    fn truncated_descriptor_is_dropped() {
        let d = parse_descriptors(&[0x05, 0x04, b'V', b'A', b'N', b'C', 0x0A, 0x09, 0x00]);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].data, b"VANC");
    }
}
