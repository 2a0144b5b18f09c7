//! Reduction of round-trip samples to average latency and jitter

use crate::models::LatencyOutcome;

/// Asymmetric moving average over successive sample deltas.
///
/// The second sample only seeds the first delta. From the third sample on,
/// a jitter estimate above the current delta decays with weights 0.7/0.3,
/// otherwise it climbs with weights 0.8/0.2.
pub fn jitter(samples: &[f64]) -> f64 {
    let mut jitter = 0.0;
    for (idx, pair) in samples.windows(2).enumerate() {
        let inst = (pair[1] - pair[0]).abs();
        if idx == 0 {
            continue;
        }
        if jitter > inst {
            jitter = jitter * 0.7 + inst * 0.3;
        } else {
            jitter = inst * 0.2 + jitter * 0.8;
        }
    }
    jitter
}

/// Arithmetic mean, 0 for no samples
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

pub fn reduce(samples: &[f64]) -> LatencyOutcome {
    LatencyOutcome {
        avg_ms: mean(samples),
        jitter_ms: jitter(samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_steady_samples_have_no_jitter() {
        assert_eq!(jitter(&[10.0, 10.0, 10.0, 10.0]), 0.0);
    }

    #[test]
    fn test_alternating_samples_climb() {
        // 40*0.2 = 8, then 40*0.2 + 8*0.8 = 14.4
        let j = jitter(&[10.0, 50.0, 10.0, 50.0]);
        assert!((j - 14.4).abs() < 1e-9, "jitter was {}", j);

        let longer = jitter(&[10.0, 50.0, 10.0, 50.0, 10.0, 50.0]);
        assert!(longer > j);
        assert!(longer < 40.0);
    }

    #[test]
    fn test_decay_after_spike() {
        // climb to 8 on the spike, then decay towards the small delta
        let j = jitter(&[10.0, 10.0, 50.0, 51.0]);
        assert!((j - (8.0 * 0.7 + 1.0 * 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_short_sequences() {
        assert_eq!(jitter(&[]), 0.0);
        assert_eq!(jitter(&[12.0]), 0.0);
        assert_eq!(jitter(&[12.0, 80.0]), 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[10.0, 20.0, 30.0]), 20.0);
        let outcome = reduce(&[10.0, 10.0, 10.0]);
        assert_eq!(outcome.avg_ms, 10.0);
        assert_eq!(outcome.jitter_ms, 0.0);
    }

    proptest! {
        #[test]
        fn prop_jitter_bounded_by_max_delta(samples in prop::collection::vec(0.0f64..1000.0, 0..50)) {
            let j = jitter(&samples);
            let max_delta = samples
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .fold(0.0, f64::max);
            prop_assert!(j >= 0.0);
            prop_assert!(j <= max_delta + 1e-9);
        }
    }
}
