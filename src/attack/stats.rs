//! Subset statistics over the trace rows.
//!
//! Both stages repeatedly partition the N traces into a handful of subsets
//! keyed by low-order bit patterns, average the measured intensity within
//! each subset, and round fixed finite differences of those averages to small
//! signed integers. The partitions are computed as integer bin indices in a
//! single pass; no per-subset mask arrays are materialized.

/// Mean trace intensity per bin. Rows that fall outside every bin (`None`)
/// are skipped; an empty bin yields NaN, which [`round_to_int`] maps to 0.
pub(crate) fn binned_means(
    bin_count: usize,
    rows: usize,
    mut bin: impl FnMut(usize) -> Option<usize>,
    mut intensity: impl FnMut(usize) -> f64,
) -> Vec<f64> {
    let mut sums = vec![0.0; bin_count];
    let mut counts = vec![0usize; bin_count];
    for row in 0..rows {
        if let Some(bin) = bin(row) {
            sums[bin] += intensity(row);
            counts[bin] += 1;
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| sum / count as f64)
        .collect()
}

/// The "leap" vector: the second finite difference of the subset means,
/// wrapping around the two independent top bits of the subset index. For
/// `averages` of even length 2h, returns h values
///
/// ```text
/// leap[j] = round(avg[j] - avg[j+1] - avg[j+h] + avg[j+h+1])    (mod 2h)
/// ```
///
/// which isolates the contribution of the most significant subset bit to the
/// mean while cancelling everything below it.
pub(crate) fn leaps(averages: &[f64]) -> Vec<i64> {
    let len = averages.len();
    let half = len / 2;
    (0..half)
        .map(|j| {
            round_to_int(
                averages[j] - averages[(j + 1) % len] - averages[(j + half) % len]
                    + averages[(j + half + 1) % len],
            )
        })
        .collect()
}

/// Round to the nearest integer, ties to even. NaN (an empty subset) maps
/// to 0 through the saturating cast and thus reads as "no signal".
pub(crate) fn round_to_int(value: f64) -> i64 {
    value.round_ties_even() as i64
}
