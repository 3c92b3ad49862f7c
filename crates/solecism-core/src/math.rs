//! Small numeric helpers shared by the estimators.

/// Natural logarithm with a probability floor.
///
/// Clamps `p` to `floor` before taking the log, so a model probability of
/// exactly zero produces a large-but-finite negative value instead of `-inf`.
#[inline]
pub fn ln_floored(p: f64, floor: f64) -> f64 {
    p.max(floor).ln()
}

/// Sample mean. Returns 0.0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance (divides by n). Returns 0.0 for fewer than 2 values.
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64
}

/// Digamma function ψ(x) = d/dx ln Γ(x).
///
/// Uses the standard recurrence to shift the argument above 10, then the
/// asymptotic series. Accurate to ~1e-12 for x > 0, which is ample for the
/// variational LDA updates that consume it.
pub fn digamma(mut x: f64) -> f64 {
    debug_assert!(x > 0.0, "digamma requires x > 0, got {}", x);
    let mut result = 0.0;
    while x < 10.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result += x.ln() - 0.5 * inv
        - inv2
            * (1.0 / 12.0
                - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0))));
    result
}

/// Normalize a slice in place so it sums to 1. No-op if the sum is not
/// positive.
pub fn normalize(xs: &mut [f64]) {
    let total: f64 = xs.iter().sum();
    if total > 0.0 {
        for x in xs.iter_mut() {
            *x /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_floored_clamps_zero() {
        let v = ln_floored(0.0, 1e-50);
        assert!(v.is_finite(), "floored log must be finite, got {}", v);
        assert!((v - (1e-50f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_ln_floored_passes_through() {
        assert!((ln_floored(0.5, 1e-50) - 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_variance_constant_series() {
        let xs = [3.0, 3.0, 3.0, 3.0];
        assert_eq!(variance(&xs), 0.0);
    }

    #[test]
    fn test_digamma_recurrence() {
        // ψ(x+1) = ψ(x) + 1/x
        for &x in &[0.3, 1.0, 2.5, 7.0] {
            let lhs = digamma(x + 1.0);
            let rhs = digamma(x) + 1.0 / x;
            assert!(
                (lhs - rhs).abs() < 1e-10,
                "recurrence failed at x={}: {} vs {}",
                x,
                lhs,
                rhs
            );
        }
    }

    #[test]
    fn test_digamma_known_value() {
        // ψ(1) = -γ (Euler-Mascheroni)
        assert!((digamma(1.0) + 0.5772156649015329).abs() < 1e-10);
    }

    #[test]
    fn test_normalize() {
        let mut xs = [2.0, 6.0];
        normalize(&mut xs);
        assert!((xs[0] - 0.25).abs() < 1e-12);
        assert!((xs[1] - 0.75).abs() < 1e-12);
    }
}
