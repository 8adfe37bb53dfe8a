use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::warn;

/// Switches for the analysis runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Stop after this many video access units, 0 for no limit
    pub max_nr_pictures: usize,
    pub indent: bool,
    pub show_stream_info: bool,
    pub show_service: bool,
    pub show_ps: bool,
    pub verbose_ps_info: bool,
    pub show_nalu: bool,
    /// Decode SEI NAL units into message names (and clocks)
    pub show_sei: bool,
    /// Also attach raw payloads of the other SEI messages
    pub show_sei_details: bool,
    pub show_smpte2038: bool,
    pub show_scte35: bool,
    pub show_statistics: bool,
}

impl Options {
    /// Everything on
    pub fn full(max_nr_pictures: usize) -> Self {
        Self {
            max_nr_pictures,
            indent: false,
            show_stream_info: true,
            show_service: true,
            show_ps: true,
            verbose_ps_info: true,
            show_nalu: true,
            show_sei: true,
            show_sei_details: true,
            show_smpte2038: true,
            show_scte35: true,
            show_statistics: true,
        }
    }
}

/// Switches for a PID filter run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub pids_to_drop: BTreeSet<u16>,
    pub indent: bool,
    pub show_stream_info: bool,
    pub show_statistics: bool,
}

/// Parses a whitespace separated PID list such as `"256 257"`.
/// Words that are not PIDs are logged and skipped.
pub fn parse_pid_list(input: &str) -> BTreeSet<u16> {
    input
        .split_whitespace()
        .filter_map(|word| match word.parse::<u16>() {
            Ok(pid) if pid <= 0x1FFF => Some(pid),
            _ => {
                warn!(word, "ignoring invalid PID");
                None
            }
        })
        .collect()
}

/// Cooperative cancellation flag, checked once per event or packet
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stream info record, one per classified elementary stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementaryStreamInfo {
    pub pid: u16,
    pub codec: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Parameter set record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PsInfo {
    pub pid: u16,
    pub parameter_set: String,
    pub nr: u32,
    pub hex: String,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Access unit record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NaluFrameData {
    pub pid: u16,
    pub rai: bool,
    pub pts: u64,
    /// Only set when the PES carried a DTS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nalus: Vec<NaluData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NaluData {
    #[serde(rename = "type")]
    pub nalu_type: String,
    pub len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<SeiOut>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeiOut {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_list_skips_garbage() {
        let pids = parse_pid_list("256 abc 257  9000 256");
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![256, 257]);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn frame_record_omits_absent_dts() {
        let rec = NaluFrameData {
            pid: 256,
            pts: 9000,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&rec).unwrap(),
            r#"{"pid":256,"rai":false,"pts":9000}"#
        );
    }
}
