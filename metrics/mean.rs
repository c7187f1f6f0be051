use super::StreamingMetric;
use num_traits::ToPrimitive;

/// The arithmetic mean of a stream of `f32` values, accumulated in `f64`.
#[derive(Debug, Default)]
pub struct Mean {
	n: u64,
	mean: f64,
}

impl StreamingMetric<'_> for Mean {
	type Input = f32;
	type Output = Option<f32>;

	fn update(&mut self, value: f32) {
		self.n += 1;
		self.mean += (value.to_f64().unwrap() - self.mean) / self.n.to_f64().unwrap();
	}

	fn merge(&mut self, other: Self) {
		if other.n == 0 {
			return;
		}
		let n = self.n + other.n;
		self.mean = (self.n.to_f64().unwrap() * self.mean
			+ other.n.to_f64().unwrap() * other.mean)
			/ n.to_f64().unwrap();
		self.n = n;
	}

	/// Returns `None` if no values were seen.
	fn finalize(self) -> Option<f32> {
		if self.n > 0 {
			Some(self.mean.to_f32().unwrap())
		} else {
			None
		}
	}
}

#[test]
fn test_mean_merge() {
	let mut left = Mean::default();
	for value in &[1.0, 2.0, 3.0] {
		left.update(*value);
	}
	let mut right = Mean::default();
	right.update(6.0);
	left.merge(right);
	left.merge(Mean::default());
	assert!((left.finalize().unwrap() - 3.0).abs() < f32::EPSILON);
	assert_eq!(Mean::default().finalize(), None);
}
