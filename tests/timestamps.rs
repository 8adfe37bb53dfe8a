use mp2ts_tools::constants::PTS_WRAP;
use mp2ts_tools::stats::{StreamStatistics, add_pts, calculate_steps, signed_pts_diff};
use proptest::prelude::*;

proptest! {
    #[test]
    fn small_steps_survive_the_wrap(start in 0..PTS_WRAP, step in -(1i64 << 31)..(1i64 << 31)) {
        let next = (start + step).rem_euclid(PTS_WRAP);
        prop_assert_eq!(signed_pts_diff(next, start), step);
    }

    #[test]
    fn diff_is_antisymmetric(a in 0..PTS_WRAP, b in 0..PTS_WRAP) {
        let d = signed_pts_diff(a, b);
        prop_assert!((-(1i64 << 32)..(1i64 << 32)).contains(&d));
        if d != -(1i64 << 32) {
            prop_assert_eq!(signed_pts_diff(b, a), -d);
        }
    }

    #[test]
    fn constant_step_gives_exact_frame_rate(
        start in 0..PTS_WRAP as u64,
        step in prop::sample::select(vec![1500u64, 1800, 3000, 3600, 3750]),
        count in 2usize..50,
    ) {
        let mut s = StreamStatistics::new("AVC", 256);
        s.timestamps = (0..count as u64)
            .map(|i| add_pts(start, i * step) as i64)
            .collect();
        s.finalize();
        prop_assert_eq!(s.frame_rate, 90_000.0 / step as f64);
        prop_assert!(!s.errors.iter().any(|e| e.contains("irregular")));
    }

    #[test]
    fn short_series_have_no_steps(ts in prop::collection::vec(0..PTS_WRAP, 0..2)) {
        prop_assert!(calculate_steps(&ts).is_empty());
        let mut s = StreamStatistics::new("HEVC", 300);
        s.timestamps = ts;
        s.finalize();
        prop_assert_eq!(s.frame_rate, 0.0);
        prop_assert_eq!(&s.errors[0], "too few timestamps to calculate frame rate");
    }
}

#[test]
fn step_across_wrap_is_two() {
    assert_eq!(signed_pts_diff(1, PTS_WRAP - 1), 2);
    assert_eq!(calculate_steps(&[PTS_WRAP - 1, 1, 3]), vec![2, 2]);
}
