//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm

use num_traits::ToPrimitive;

/// Combine two separately computed means and sums of squared deviations (m2) into a single mean and m2.
pub fn merge_mean_m2(
	n_a: u64,
	mean_a: f64,
	m2_a: f64,
	n_b: u64,
	mean_b: f64,
	m2_b: f64,
) -> (f64, f64) {
	let n_a = n_a.to_f64().unwrap();
	let n_b = n_b.to_f64().unwrap();
	(
		(((n_a * mean_a) + (n_b * mean_b)) / (n_a + n_b)),
		m2_a + m2_b + (mean_b - mean_a) * (mean_b - mean_a) * (n_a * n_b / (n_a + n_b)),
	)
}

#[test]
fn test_merge_mean_m2() {
	// [1, 2, 3] and [4, 5]
	let (mean, m2) = merge_mean_m2(3, 2.0, 2.0, 2, 4.5, 0.5);
	assert!((mean - 3.0).abs() < 1e-12);
	assert!((m2 - 10.0).abs() < 1e-12);
	// The variance of [1, 2, 3, 4, 5] is 2.
	assert!((m2 / 5.0 - 2.0).abs() < 1e-12);
}
