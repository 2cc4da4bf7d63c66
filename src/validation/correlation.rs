//! Correlation statistics.
//!
//! Pearson on paired arrays; Spearman by ranking (average ranks on
//! ties) then Pearson on the ranks; direction accuracy as the fraction
//! of pairs whose signs agree.

/// Pearson correlation coefficient. Returns 0.0 for degenerate input
/// (short arrays or zero variance).
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let xs = &xs[..n];
    let ys = &ys[..n];

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Average ranks (1-based); ties share the mean of their rank span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        values[*a]
            .partial_cmp(&values[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        // Extend the tie group.
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation: Pearson on average ranks.
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let rx = average_ranks(&xs[..n]);
    let ry = average_ranks(&ys[..n]);
    pearson(&rx, &ry)
}

/// Fraction of pairs where sign(x) == sign(y). Zeros count as matching
/// zeros only.
pub fn direction_accuracy(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    let matching = (0..n)
        .filter(|i| {
            let sx = xs[*i].signum();
            let sy = ys[*i].signum();
            sx == sy
        })
        .count();
    matching as f64 / n as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pearson_perfect_positive() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_perfect_negative() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [3.0, 2.0, 1.0];
        assert!((pearson(&xs, &ys) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
    }

    #[test]
    fn test_average_ranks_no_ties() {
        let ranks = average_ranks(&[30.0, 10.0, 20.0]);
        assert_eq!(ranks, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        // 10 and 10 occupy ranks 1 and 2 → both get 1.5.
        let ranks = average_ranks(&[10.0, 10.0, 20.0]);
        assert_eq!(ranks, vec![1.5, 1.5, 3.0]);
    }

    #[test]
    fn test_spearman_monotonic_nonlinear() {
        // Monotonic but nonlinear → Spearman 1.0.
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 8.0, 27.0, 64.0];
        assert!((spearman(&xs, &ys) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_accuracy() {
        let xs = [1.0, -2.0, 3.0, -4.0];
        let ys = [0.5, -0.1, -0.2, -0.9];
        // Signs match for pairs 0, 1, 3 → 0.75.
        assert!((direction_accuracy(&xs, &ys) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_direction_accuracy_empty() {
        assert_eq!(direction_accuracy(&[], &[]), 0.0);
    }
}
