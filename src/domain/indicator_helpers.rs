//! Shared window helpers for indicator calculations.
//!
//! Windows are trailing: the value at index `i` only reads `values[..=i]`.

/// Simple rolling mean; `None` until `period` values are available.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(Some(sum / period as f64));
        } else {
            out.push(None);
        }
    }
    out
}

/// Rolling mean over a nullable input; a window containing any `None` is `None`.
pub fn rolling_mean_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let mut sum = 0.0;
            for v in window {
                sum += (*v)?;
            }
            Some(sum / period as f64)
        })
        .collect()
}

/// Rolling sample standard deviation (divisor `period - 1`).
pub fn rolling_sample_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

/// Rolling maximum; `None` until `period` values are available.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            values[i + 1 - period..=i].iter().copied().reduce(f64::max)
        })
        .collect()
}

/// Number of `true` flags in each trailing window of `period`.
pub fn rolling_count(flags: &[bool], period: usize) -> Vec<Option<usize>> {
    if period == 0 {
        return vec![None; flags.len()];
    }

    (0..flags.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            Some(flags[i + 1 - period..=i].iter().filter(|f| **f).count())
        })
        .collect()
}

/// Non-adjusted exponential smoothing with alpha = 2 / (period + 1), seeded
/// with the first value.
pub fn exponential_smoothing(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rolling_mean_warmup_and_values() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 2.0);
        assert_relative_eq!(out[3].unwrap(), 3.0);
    }

    #[test]
    fn rolling_mean_zero_period() {
        assert_eq!(rolling_mean(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn rolling_mean_opt_propagates_gaps() {
        let out = rolling_mean_opt(&[Some(1.0), None, Some(3.0), Some(5.0)], 2);
        assert_eq!(out, vec![None, None, None, Some(4.0)]);
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let out = rolling_sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        // population std is 2.0; sample std is sqrt(32/7)
        assert_relative_eq!(out[7].unwrap(), (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn rolling_max_tracks_window() {
        let out = rolling_max(&[1.0, 5.0, 2.0, 3.0], 2);
        assert_eq!(out, vec![None, Some(5.0), Some(5.0), Some(3.0)]);
    }

    #[test]
    fn rolling_count_counts_flags() {
        let out = rolling_count(&[true, false, true, true], 3);
        assert_eq!(out, vec![None, None, Some(2), Some(2)]);
        assert_eq!(rolling_count(&[true], 0), vec![None]);
    }

    #[test]
    fn smoothing_seeds_with_first_value() {
        let out = exponential_smoothing(&[10.0, 20.0], 3);
        assert_relative_eq!(out[0], 10.0);
        assert_relative_eq!(out[1], 15.0);
    }
}
