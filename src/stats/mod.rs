//! Timestamp statistics for elementary streams

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{PTS_CLOCK_HZ, PTS_WRAP};

const HALF_WRAP: i64 = PTS_WRAP / 2;

/// Difference `p2 - p1` folded into `[-2^32, 2^32)`, so a step across the
/// 33-bit wrap stays small.
pub fn signed_pts_diff(p2: i64, p1: i64) -> i64 {
    (p2 - p1 + 3 * HALF_WRAP).rem_euclid(PTS_WRAP) - HALF_WRAP
}

/// Forward distance from `p1` to `p2` modulo 2^33.
pub fn unsigned_pts_diff(p2: i64, p1: i64) -> i64 {
    (p2 - p1).rem_euclid(PTS_WRAP)
}

/// `pts + delta` modulo 2^33.
pub fn add_pts(pts: u64, delta: u64) -> u64 {
    (pts + delta) % PTS_WRAP as u64
}

/// Wrap-aware steps between consecutive timestamps, empty for fewer than two.
pub fn calculate_steps(timestamps: &[i64]) -> Vec<i64> {
    timestamps
        .windows(2)
        .map(|w| signed_pts_diff(w[1], w[0]))
        .collect()
}

/// Minimum, maximum and integer average. All zero for an empty slice.
pub fn min_max_avg(values: &[i64]) -> (i64, i64, i64) {
    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return (0, 0, 0);
    };
    let avg = values.iter().sum::<i64>() / values.len() as i64;
    (min, max, avg)
}

/// Per-PID timing statistics. Timestamps are collected during the run and
/// turned into frame rate and GoP durations by [`StreamStatistics::finalize`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStatistics {
    #[serde(rename = "streamType")]
    pub stream_type: String,
    pub pid: u16,
    #[serde(rename = "frameRate")]
    pub frame_rate: f64,
    #[serde(skip)]
    pub timestamps: Vec<i64>,
    #[serde(rename = "maxStep", skip_serializing_if = "is_zero")]
    pub max_step: i64,
    #[serde(rename = "minStep", skip_serializing_if = "is_zero")]
    pub min_step: i64,
    #[serde(rename = "avgStep", skip_serializing_if = "is_zero")]
    pub avg_step: i64,
    #[serde(skip)]
    pub rai_timestamps: Vec<i64>,
    #[serde(skip)]
    pub idr_timestamps: Vec<i64>,
    #[serde(rename = "RAIGoPDuration", skip_serializing_if = "is_zero")]
    pub rai_gop_duration: i64,
    #[serde(rename = "IDRGoPDuration", skip_serializing_if = "is_zero")]
    pub idr_gop_duration: i64,
    /// SEI messages that failed to decode and were left out of records
    #[serde(rename = "seiMessagesSkipped", skip_serializing_if = "is_zero_u32")]
    pub sei_messages_skipped: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

impl StreamStatistics {
    pub fn new(stream_type: &str, pid: u16) -> Self {
        Self {
            stream_type: stream_type.to_string(),
            pid,
            ..Default::default()
        }
    }

    /// Derive frame rate and GoP durations. Call once, at end of stream.
    pub fn finalize(&mut self) {
        self.calculate_frame_rate(PTS_CLOCK_HZ);
        self.calculate_gop_duration(PTS_CLOCK_HZ);
    }

    fn calculate_frame_rate(&mut self, timescale: i64) {
        if self.timestamps.len() < 2 {
            self.errors.push("too few timestamps to calculate frame rate".into());
            return;
        }
        let steps = calculate_steps(&self.timestamps);
        let (min_step, max_step, avg_step) = min_max_avg(&steps);
        if min_step != max_step {
            self.errors.push("irregular PTS/DTS steps".into());
            self.min_step = min_step;
            self.max_step = max_step;
            self.avg_step = avg_step;
        }
        if avg_step != 0 {
            self.frame_rate = timescale as f64 / avg_step as f64;
        }
    }

    fn calculate_gop_duration(&mut self, timescale: i64) {
        if self.rai_timestamps.len() < 2 || self.idr_timestamps.len() < 2 {
            self.errors.push("no GoP duration since less than 2 I-frames".into());
        }
        if self.rai_timestamps.len() >= 2 {
            let (_, _, avg) = min_max_avg(&calculate_steps(&self.rai_timestamps));
            self.rai_gop_duration = avg / timescale;
        }
        if self.idr_timestamps.len() >= 2 {
            let (_, _, avg) = min_max_avg(&calculate_steps(&self.idr_timestamps));
            self.idr_gop_duration = avg / timescale;
        }
    }
}

/// Owns the statistics of every analysed PID, in PID order.
#[derive(Default)]
pub struct StatsManager {
    streams: BTreeMap<u16, StreamStatistics>,
}

impl StatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for `pid`, created on first use.
    pub fn stream(&mut self, pid: u16, stream_type: &str) -> &mut StreamStatistics {
        self.streams
            .entry(pid)
            .or_insert_with(|| StreamStatistics::new(stream_type, pid))
    }

    pub fn get(&self, pid: u16) -> Option<&StreamStatistics> {
        self.streams.get(&pid)
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Finalize all streams and hand them out in PID order.
    pub fn finish(self) -> Vec<StreamStatistics> {
        self.streams
            .into_values()
            .map(|mut s| {
                s.finalize();
                s
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_across_wrap() {
        assert_eq!(signed_pts_diff(1, PTS_WRAP - 1), 2);
        assert_eq!(signed_pts_diff(PTS_WRAP - 1, 1), -2);
        assert_eq!(signed_pts_diff(0, PTS_WRAP - 1), 1);
        assert_eq!(unsigned_pts_diff(1, PTS_WRAP - 1), 2);
        assert_eq!(add_pts(PTS_WRAP as u64 - 1, 3), 2);
    }

    #[test]
    fn regular_steps_give_exact_frame_rate() {
        let mut s = StreamStatistics::new("AVC", 256);
        s.timestamps = (0..10).map(|i| 1000 + i * 3600).collect();
        s.finalize();
        assert_eq!(s.frame_rate, 25.0);
        assert_eq!((s.min_step, s.max_step, s.avg_step), (0, 0, 0));
        assert_eq!(s.errors, vec!["no GoP duration since less than 2 I-frames"]);
    }

    #[test]
    fn too_few_timestamps() {
        let mut s = StreamStatistics::new("HEVC", 256);
        s.timestamps = vec![42];
        s.finalize();
        assert_eq!(s.frame_rate, 0.0);
        assert_eq!(s.errors[0], "too few timestamps to calculate frame rate");
    }

    #[test]
    fn irregular_steps_are_reported() {
        let mut s = StreamStatistics::new("AVC", 256);
        s.timestamps = vec![0, 3000, 6000, 10000];
        s.finalize();
        assert_eq!(s.errors[0], "irregular PTS/DTS steps");
        assert_eq!((s.min_step, s.max_step, s.avg_step), (3000, 4000, 3333));
    }

    #[test]
    fn gop_duration_truncates() {
        let mut s = StreamStatistics::new("AVC", 256);
        s.timestamps = vec![0, 3000];
        s.rai_timestamps = vec![0, 180_000, 360_000];
        s.idr_timestamps = vec![0, 170_000];
        s.finalize();
        assert_eq!(s.rai_gop_duration, 2);
        assert_eq!(s.idr_gop_duration, 1);
        assert!(s.errors.is_empty());
    }

    #[test]
    fn zero_fields_are_omitted() {
        let mut s = StreamStatistics::new("AVC", 256);
        s.timestamps = vec![0, 3000, 6000];
        s.finalize();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "streamType": "AVC",
                "pid": 256,
                "frameRate": 30.0,
                "errors": ["no GoP duration since less than 2 I-frames"]
            })
        );
    }
}
