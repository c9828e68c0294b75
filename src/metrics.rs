use crate::model::{RecoveryCounts, RecoveryPercentages};

/// Percentage of `count` over `total`, rounded to one decimal place. Zero when `total` is zero.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 * 100.0 / total as f64;
    (raw * 10.0).round() / 10.0
}

/// Compute per-outcome percentages of the trial count.
pub fn compute_percentages(counts: &RecoveryCounts) -> RecoveryPercentages {
    RecoveryPercentages {
        automatic: percentage(counts.automatic, counts.trials),
        manual: percentage(counts.manual, counts.trials),
        failed: percentage(counts.failed, counts.trials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trials_yield_zero_percent() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 0), 0.0);
    }

    #[test]
    fn percentages_round_to_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(400, 400), 100.0);
    }

    #[test]
    fn compute_percentages_covers_each_outcome() {
        let counts = RecoveryCounts {
            trials: 8,
            automatic: 5,
            manual: 2,
            failed: 1,
        };
        let p = compute_percentages(&counts);
        assert_eq!(p.automatic, 62.5);
        assert_eq!(p.manual, 25.0);
        assert_eq!(p.failed, 12.5);
    }
}
