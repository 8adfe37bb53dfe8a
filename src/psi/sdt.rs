// psi/sdt.rs
use serde::Serialize;

use super::pmt::parse_descriptors;
use super::section::SectionReader;
use crate::constants::{DESCRIPTOR_TAG_SERVICE, TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER};
use crate::error::{Error, Result};

pub struct SdtSection {
    pub table_id: u8,
    pub version: u8,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: Vec<Service>,
}

pub struct Service {
    pub service_id: u16,
    pub names: Vec<ServiceName>,
}

/// Content of a service descriptor (tag 0x48)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceName {
    pub service_name: String,
    pub provider_name: String,
}

/// SDT (table_id 0x42 actual / 0x46 other-TS) with CRC check.
pub fn parse_sdt(payload: &[u8]) -> Result<SdtSection> {
    let sec = SectionReader::new(payload)?;
    if sec.table_id != TABLE_ID_SDT_ACTUAL && sec.table_id != TABLE_ID_SDT_OTHER {
        return Err(Error::psi(format!("table id {:#04x} is not SDT", sec.table_id)));
    }

    let b = sec.body;
    if b.len() < 3 {
        return Err(Error::psi("SDT body too short"));
    }
    let original_network_id = u16::from_be_bytes([b[0], b[1]]);

    let mut idx = 3; // start of service loop
    let mut services = Vec::new();
    while idx + 5 <= b.len() {
        let service_id = u16::from_be_bytes([b[idx], b[idx + 1]]);
        let desc_len = (((b[idx + 3] & 0x0F) as usize) << 8) | b[idx + 4] as usize;
        let Some(descriptors) = b.get(idx + 5..idx + 5 + desc_len) else {
            break; // graceful exit on malformed len
        };
        let names = parse_descriptors(descriptors)
            .into_iter()
            .filter(|d| d.tag == DESCRIPTOR_TAG_SERVICE)
            .filter_map(|d| parse_service_descriptor(&d.data))
            .collect();
        services.push(Service { service_id, names });
        idx += 5 + desc_len;
    }

    Ok(SdtSection {
        table_id: sec.table_id,
        version: sec.version,
        transport_stream_id: sec.table_id_extension,
        original_network_id,
        services,
    })
}

fn parse_service_descriptor(data: &[u8]) -> Option<ServiceName> {
    // service_type, provider_name_length, provider, service_name_length, name
    let provider_len = *data.get(1)? as usize;
    let provider = data.get(2..2 + provider_len)?;
    let name_len = *data.get(2 + provider_len)? as usize;
    let name = data.get(3 + provider_len..3 + provider_len + name_len)?;
    Some(ServiceName {
        service_name: dvb_string(name),
        provider_name: dvb_string(provider),
    })
}

/// Strips a leading DVB character table selector and decodes the rest.
fn dvb_string(raw: &[u8]) -> String {
    let text = match raw.first() {
        Some(0x10) => raw.get(3..).unwrap_or_default(),
        Some(0x01..=0x1F) => &raw[1..],
        _ => raw,
    };
    String::from_utf8_lossy(text).into_owned()
}

/// The SDT summary record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdtInfo {
    #[serde(rename = "SDT")]
    pub services: Vec<SdtServiceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdtServiceInfo {
    pub service_id: u16,
    pub descriptors: Vec<ServiceName>,
}

impl From<&SdtSection> for SdtInfo {
    fn from(sdt: &SdtSection) -> Self {
        SdtInfo {
            services: sdt
                .services
                .iter()
                .map(|s| SdtServiceInfo {
                    service_id: s.service_id,
                    descriptors: s.names.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::build_section;

    #[test]
    fn service_names_are_extracted() {
        let mut svc_desc = vec![DESCRIPTOR_TAG_SERVICE, 0, 0x01, 4];
        svc_desc.extend_from_slice(b"ACME");
        svc_desc.push(8);
        svc_desc.extend_from_slice(b"Channel1");
        svc_desc[1] = (svc_desc.len() - 2) as u8;

        let mut body = vec![0x00, 0x01, 0xFF]; // original_network_id, reserved
        body.extend_from_slice(&[0x00, 0x01, 0xFC]); // service_id 1, flags
        body.extend_from_slice(&(0x8000 | svc_desc.len() as u16).to_be_bytes());
        body.extend_from_slice(&svc_desc);

        let mut payload = vec![0x00];
        payload.extend_from_slice(&build_section(TABLE_ID_SDT_ACTUAL, 1, 0, &body));
        let sdt = parse_sdt(&payload).unwrap();
        let info = SdtInfo::from(&sdt);
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"SDT":[{"serviceId":1,"descriptors":[{"serviceName":"Channel1","providerName":"ACME"}]}]}"#
        );
    }
}
