mod common;

use std::io::{self, Read};

use common::*;
use mp2ts_tools::{CancelToken, Options, parse_all, parse_info, parse_info_and_scte35};
use pretty_assertions::assert_eq;
use serde_json::json;

fn run_all(input: &[u8], opts: &Options) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    parse_all(&mut out, input, opts, &CancelToken::new()).unwrap();
    json_lines(&out)
}

fn nal_options() -> Options {
    Options {
        show_stream_info: true,
        show_ps: true,
        show_nalu: true,
        show_statistics: true,
        ..Default::default()
    }
}

#[test]
fn ten_access_units() {
    let input = to_bytes(&avc_stream(90_000, 3000, 10));
    let records = run_all(&input, &nal_options());

    assert_eq!(records[0], json!({"pid": 256, "codec": "AVC", "type": "video"}));
    let ps: Vec<_> = records.iter().filter(|r| r.get("parameterSet").is_some()).collect();
    assert_eq!(ps.len(), 2);
    assert_eq!(ps[0]["parameterSet"], "SPS");
    assert_eq!(ps[1]["parameterSet"], "PPS");
    assert_eq!(ps[1]["hex"], "68ce3880");

    let frames: Vec<_> = records.iter().filter(|r| r.get("nalus").is_some()).collect();
    assert_eq!(frames.len(), 10);
    assert_eq!(frames[0]["rai"], true);
    assert_eq!(frames[0]["imgType"], "[I]");
    assert_eq!(frames[1]["rai"], false);
    assert_eq!(frames[1]["imgType"], "[P]");
    assert_eq!(frames[9]["pts"], 90_000 + 9 * 3000);
    assert!(frames.iter().all(|f| f.get("dts").is_none()));

    let stats = records.last().unwrap();
    assert_eq!(
        *stats,
        json!({
            "streamType": "AVC",
            "pid": 256,
            "frameRate": 30.0,
            "errors": ["no GoP duration since less than 2 I-frames"]
        })
    );
}

#[test]
fn frame_rate_across_pts_wrap() {
    let first = (1u64 << 33) - 4 * 3600;
    let input = to_bytes(&avc_stream(first, 3600, 8));
    let records = run_all(&input, &nal_options());
    let stats = records.last().unwrap();
    assert_eq!(stats["frameRate"], 25.0);
    assert!(stats.get("minStep").is_none());
}

#[test]
fn picture_limit() {
    let input = to_bytes(&avc_stream(0, 3000, 10));
    let opts = Options {
        max_nr_pictures: 3,
        ..nal_options()
    };
    let records = run_all(&input, &opts);
    let frames = records.iter().filter(|r| r.get("nalus").is_some()).count();
    assert_eq!(frames, 3);
}

#[test]
fn parameter_sets_only() {
    let input = to_bytes(&avc_stream(0, 3000, 4));
    let opts = Options {
        show_ps: true,
        verbose_ps_info: true,
        ..Default::default()
    };
    let records = run_all(&input, &opts);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["details"]["width"], 320);
    assert_eq!(records[0]["details"]["height"], 240);
}

#[test]
fn info_with_service() {
    let mut packets = pat(PMT_PID);
    packets.extend(sdt("Channel1"));
    packets.extend(pmt(vec![es(0x1B, VIDEO_PID), es(0x0F, AUDIO_PID)]));
    let input = to_bytes(&packets);

    let opts = Options {
        show_stream_info: true,
        show_service: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    parse_info(&mut out, &input[..], &opts, &CancelToken::new()).unwrap();
    assert_eq!(
        json_lines(&out),
        vec![
            json!({"pid": 256, "codec": "AVC", "type": "video"}),
            json!({"pid": 257, "codec": "AAC", "type": "audio"}),
            json!({"SDT": [{"serviceId": 1, "descriptors": [
                {"serviceName": "Channel1", "providerName": "ACME"}
            ]}]}),
        ]
    );
}

#[test]
fn info_and_scte35_passes() {
    let mut packets = pat(PMT_PID);
    packets.extend(pmt(vec![es(0x1B, VIDEO_PID), es(0x86, SCTE35_PID)]));
    let mut cc = 0;
    packets.extend(splice_null(SCTE35_PID, &mut cc));
    packets.extend(splice_null(SCTE35_PID, &mut cc));
    let input = to_bytes(&packets);

    let opts = Options {
        show_stream_info: true,
        show_scte35: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    parse_info_and_scte35(&mut out, &input[..], &opts, &CancelToken::new()).unwrap();
    let records = json_lines(&out);
    assert_eq!(records.len(), 4);
    assert_eq!(records[1], json!({"pid": 496, "codec": "SCTE35", "type": "cue"}));
    assert_eq!(
        records[2],
        json!({"pid": 496, "spliceCommand": {"type": "SpliceNull", "eventId": 0, "pts": 0}})
    );
}

#[test]
fn info_and_scte35_collects_both_failures() {
    let input = vec![0u8; 188 * 3];
    let mut out = Vec::new();
    let err = parse_info_and_scte35(&mut out, &input[..], &Options::default(), &CancelToken::new())
        .unwrap_err();
    match err {
        mp2ts_tools::Error::Multiple(errors) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error {other}"),
    }
}

/// Serves `head` then null packets without end, one packet per read,
/// cancelling the token after `trip_after` bytes. Stops at `cap` bytes.
struct CancellingReader {
    head: Vec<u8>,
    served: usize,
    trip_after: usize,
    cap: usize,
    cancel: CancelToken,
}

impl Read for CancellingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served >= self.cap {
            return Ok(0);
        }
        let mut pkt = [0xFFu8; 188];
        let start = self.served % 188;
        let base = self.served - start;
        if base < self.head.len() {
            pkt.copy_from_slice(&self.head[base..base + 188]);
        } else {
            pkt[..4].copy_from_slice(&[0x47, 0x1F, 0xFF, 0x10]);
        }
        let n = (188 - start).min(buf.len());
        buf[..n].copy_from_slice(&pkt[start..start + n]);
        self.served += n;
        if self.served >= self.trip_after {
            self.cancel.cancel();
        }
        Ok(n)
    }
}

#[test]
fn info_and_scte35_stop_buffering_on_cancel() {
    let mut packets = pat(PMT_PID);
    packets.extend(pmt(vec![es(0x1B, VIDEO_PID), es(0x86, SCTE35_PID)]));
    let mut cc = 0;
    packets.extend(splice_null(SCTE35_PID, &mut cc));
    let head = to_bytes(&packets);

    let cancel = CancelToken::new();
    let mut reader = CancellingReader {
        trip_after: head.len() + 10 * 188,
        head,
        served: 0,
        cap: 20 << 20,
        cancel: cancel.clone(),
    };
    let opts = Options {
        show_stream_info: true,
        show_scte35: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    parse_info_and_scte35(&mut out, &mut reader, &opts, &cancel).unwrap();

    assert!(reader.served < 64 * 1024, "read {} bytes after cancel", reader.served);
    let records = json_lines(&out);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], json!({"pid": 256, "codec": "AVC", "type": "video"}));
    assert_eq!(records[1], json!({"pid": 496, "codec": "SCTE35", "type": "cue"}));
    assert_eq!(records[2]["spliceCommand"]["type"], "SpliceNull");
}

#[test]
fn info_and_scte35_cancelled_before_pat_is_quiet() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut out = Vec::new();
    let input = to_bytes(&avc_stream(0, 3000, 3));
    parse_info_and_scte35(&mut out, &input[..], &Options::full(0), &cancel).unwrap();
    assert!(out.is_empty());
}
