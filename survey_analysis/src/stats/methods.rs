//! The hypothesis tests themselves, on plain numbers.
//!
//! Conventions follow the usual statistical packages: Yates' continuity
//! correction for 1-degree-of-freedom chi-square tests, the two-sided Fisher
//! exact test summing all tables at most as likely as the observed one, and
//! the normal approximation with tie and continuity corrections for
//! Mann-Whitney U when the exact distribution is not used.

use crate::stats::distributions::{chi2_sf, ln_choose, normal_sf};

/// Largest sample size for which the exact Mann-Whitney distribution is used.
const MWU_EXACT_LIMIT: usize = 8;

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ChiSquare {
    /// The statistic, with Yates' correction when there is a single degree
    /// of freedom.
    pub statistic: f64,
    /// The statistic without any correction.
    pub uncorrected: f64,
    pub dof: u32,
    pub p_value: f64,
}

/// Pearson's chi-square test of independence. `None` when a row or a column
/// of the table is empty.
pub fn chi_square(counts: &[Vec<u64>]) -> Option<ChiSquare> {
    let rows = counts.len();
    let cols = counts.first().map(|r| r.len()).unwrap_or(0);
    if rows < 2 || cols < 2 {
        return None;
    }
    let row_totals: Vec<f64> = counts.iter().map(|r| r.iter().sum::<u64>() as f64).collect();
    let col_totals: Vec<f64> = (0..cols)
        .map(|j| counts.iter().map(|r| r[j]).sum::<u64>() as f64)
        .collect();
    let n: f64 = row_totals.iter().sum();
    if row_totals.iter().chain(col_totals.iter()).any(|t| *t == 0.0) {
        return None;
    }
    let dof = ((rows - 1) * (cols - 1)) as u32;
    let mut statistic = 0.0;
    let mut uncorrected = 0.0;
    for (i, row) in counts.iter().enumerate() {
        for (j, o) in row.iter().enumerate() {
            let e = row_totals[i] * col_totals[j] / n;
            let diff = (*o as f64 - e).abs();
            uncorrected += diff * diff / e;
            let adjusted = if dof == 1 { diff - diff.min(0.5) } else { diff };
            statistic += adjusted * adjusted / e;
        }
    }
    Some(ChiSquare {
        statistic,
        uncorrected,
        dof,
        p_value: chi2_sf(statistic, dof),
    })
}

/// Cramér's V from an uncorrected chi-square statistic.
pub fn cramers_v(chi2: f64, n: u64, rows: usize, cols: usize) -> Option<f64> {
    let k = rows.min(cols);
    if n == 0 || k < 2 {
        return None;
    }
    Some((chi2 / (n as f64 * (k - 1) as f64)).sqrt())
}

/// Two-sided Fisher exact test on the table `[[a, b], [c, d]]`.
/// Returns the sample odds ratio and the p-value.
pub fn fisher_exact(a: u64, b: u64, c: u64, d: u64) -> (f64, f64) {
    let odds_ratio = if b * c == 0 {
        if a * d == 0 {
            f64::NAN
        } else {
            f64::INFINITY
        }
    } else {
        (a * d) as f64 / (b * c) as f64
    };
    let row1 = a + b;
    let col1 = a + c;
    let n = a + b + c + d;
    let ln_total = ln_choose(n, row1);
    let pmf = |x: u64| (ln_choose(col1, x) + ln_choose(n - col1, row1 - x) - ln_total).exp();
    let observed = pmf(a);
    let lo = (row1 + col1).saturating_sub(n);
    let hi = row1.min(col1);
    let p: f64 = (lo..=hi)
        .map(pmf)
        .filter(|p| *p <= observed * (1.0 + 1e-7))
        .sum();
    (odds_ratio, p.min(1.0))
}

/// Average ranks (starting at 1) and the tie term `sum(t^3 - t)`.
pub fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    let mut ranks = vec![0.0; values.len()];
    let mut ties = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for k in order[i..=j].iter() {
            ranks[*k] = average;
        }
        let t = (j - i + 1) as f64;
        ties += t * t * t - t;
        i = j + 1;
    }
    (ranks, ties)
}

// Number of arrangements of m + n items giving each value of U.
fn mann_whitney_counts(m: usize, n: usize) -> Vec<f64> {
    let max_u = m * n;
    // table[i][j][u]
    let mut table = vec![vec![vec![0.0f64; max_u + 1]; n + 1]; m + 1];
    for i in 0..=m {
        for j in 0..=n {
            if i == 0 || j == 0 {
                table[i][j][0] = 1.0;
                continue;
            }
            for u in 0..=(i * j) {
                let with_last_from_first = if u >= j { table[i - 1][j][u - j] } else { 0.0 };
                table[i][j][u] = with_last_from_first + table[i][j - 1][u];
            }
        }
    }
    table[m][n].clone()
}

/// Two-sided Mann-Whitney U test. Returns the U statistic of the first
/// sample and the p-value, or `None` if the p-value is undefined (empty
/// sample or all values identical).
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n1 = x.len();
    let n2 = y.len();
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let combined: Vec<f64> = x.iter().chain(y.iter()).copied().collect();
    let (ranks, ties) = rank_with_ties(&combined);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u = u1.max(u2);

    let p = if n1 <= MWU_EXACT_LIMIT && n2 <= MWU_EXACT_LIMIT && ties == 0.0 {
        let counts = mann_whitney_counts(n1, n2);
        let total: f64 = counts.iter().sum();
        let from = u.round() as usize;
        let upper: f64 = counts[from.min(counts.len() - 1)..].iter().sum();
        2.0 * upper / total
    } else {
        let n = (n1 + n2) as f64;
        let mu = (n1 * n2) as f64 / 2.0;
        let variance = (n1 * n2) as f64 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)));
        if variance <= 0.0 {
            return None;
        }
        let z = (u - mu - 0.5) / variance.sqrt();
        2.0 * normal_sf(z)
    };
    Some((u1, p.min(1.0)))
}

/// Cohen's d with the pooled standard deviation.
pub fn cohens_d(x: &[f64], y: &[f64]) -> Option<f64> {
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    if x.len() < 2 || y.len() < 2 {
        return None;
    }
    let m1 = x.iter().sum::<f64>() / n1;
    let m2 = y.iter().sum::<f64>() / n2;
    let ss1: f64 = x.iter().map(|v| (v - m1) * (v - m1)).sum();
    let ss2: f64 = y.iter().map(|v| (v - m2) * (v - m2)).sum();
    let pooled = ((ss1 + ss2) / (n1 + n2 - 2.0)).sqrt();
    if pooled == 0.0 {
        return None;
    }
    Some((m1 - m2) / pooled)
}

/// Kruskal-Wallis H test with tie correction. Returns the statistic and the
/// p-value, or `None` when all values are identical.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> Option<(f64, f64)> {
    if groups.len() < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let combined: Vec<f64> = groups.iter().flatten().copied().collect();
    let n = combined.len() as f64;
    let (ranks, ties) = rank_with_ties(&combined);
    let correction = 1.0 - ties / (n * n * n - n);
    if correction <= 0.0 {
        return None;
    }
    let mut offset = 0;
    let mut sum = 0.0;
    for g in groups.iter() {
        let r: f64 = ranks[offset..offset + g.len()].iter().sum();
        sum += r * r / g.len() as f64;
        offset += g.len();
    }
    let h = (12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0)) / correction;
    let dof = (groups.len() - 1) as u32;
    Some((h, chi2_sf(h, dof)))
}
