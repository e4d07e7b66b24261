//! Property-based tests for the invariants every run must satisfy.

use leadcast::core::{Month, TimeSeries};
use leadcast::pipeline::{extension_length, select_lags, IsotonicCalibrator, QuantileBand};
use proptest::prelude::*;

fn start() -> Month {
    Month::new(2015, 1).unwrap()
}

/// Bounded values with a small index-dependent offset so series are never
/// exactly constant.
fn values_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (min_len..max_len).prop_flat_map(|len| {
        prop::collection::vec(1.0..500.0_f64, len).prop_map(|mut v| {
            for (i, val) in v.iter_mut().enumerate() {
                *val += i as f64 * 0.001;
            }
            v
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn isotonic_is_monotone_and_clipped(
        pairs in prop::collection::vec((-100.0..100.0_f64, -100.0..100.0_f64), 1..60),
        probes in prop::collection::vec(-200.0..200.0_f64, 2..30),
    ) {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let iso = IsotonicCalibrator::fit(&x, &y).unwrap();
        let (kx, ky) = iso.knots();
        prop_assert!(ky.windows(2).all(|w| w[0] <= w[1] + 1e-9));

        let mut sorted = probes.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let out: Vec<f64> = sorted.iter().map(|&v| iso.predict(v)).collect();
        prop_assert!(out.windows(2).all(|w| w[0] <= w[1] + 1e-9));

        let lo = ky[0];
        let hi = ky[ky.len() - 1];
        prop_assert_eq!(iso.predict(kx[0] - 1.0), lo);
        prop_assert_eq!(iso.predict(kx[kx.len() - 1] + 1.0), hi);
        prop_assert!(out.iter().all(|&v| v >= lo - 1e-9 && v <= hi + 1e-9));
    }

    #[test]
    fn quantile_bands_are_ordered(
        horizon in 1usize..12,
        paths in 1usize..80,
        seed in any::<u64>(),
    ) {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let simulated: Vec<Vec<f64>> = (0..paths)
            .map(|_| (0..horizon).map(|_| rng.gen_range(-50.0..150.0)).collect())
            .collect();
        let months: Vec<Month> = (1..=horizon as i32).map(|h| start() + h).collect();
        let band = QuantileBand::from_paths(&months, &simulated).unwrap();
        prop_assert_eq!(band.len(), horizon);
        for step in 0..horizon {
            let q = band.at(step).unwrap();
            prop_assert!(q.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn lag_table_is_ranked_and_bounded(
        target in values_strategy(30, 60),
        a in values_strategy(30, 70),
        b in values_strategy(30, 70),
        max_lag in 0usize..8,
    ) {
        let target = TimeSeries::monthly(start() + 6, target);
        let pool = vec![
            ("A".to_string(), TimeSeries::monthly(start(), a)),
            ("B".to_string(), TimeSeries::monthly(start(), b)),
        ];
        let table = select_lags(&target, &pool, max_lag, 24);
        for (i, row) in table.iter().enumerate() {
            prop_assert_eq!(row.rank, i + 1);
            prop_assert!(row.best_lag <= max_lag);
            prop_assert!(row.n_obs >= 24);
            prop_assert!(row.correlation.abs() <= 1.0 + 1e-12);
            prop_assert!((0.0..=1.0).contains(&row.p_value));
        }
        prop_assert!(table.windows(2).all(|w| w[0].correlation.abs() >= w[1].correlation.abs()));
    }

    #[test]
    fn extension_covers_every_future_feature_month(
        gap in 0i32..24,
        horizon in 1usize..24,
        lag in 0usize..12,
    ) {
        let origin = start() + 60;
        let last = origin - gap;
        let steps = extension_length(last, origin, horizon, lag);
        prop_assert!(steps >= horizon + lag);
        // Feature month origin + horizon reads the candidate at that month minus lag.
        prop_assert!(last + steps as i32 >= origin + horizon as i32 - lag as i32);
    }
}
