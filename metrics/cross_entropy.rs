use super::{mean::Mean, StreamingMetric};
use ndarray::prelude::*;
use num_traits::clamp;

/// CrossEntropy is the loss function used in multiclass classification. [Learn more](https://en.wikipedia.org/wiki/Cross_entropy#Cross-entropy_loss_function_and_logistic_regression).
#[derive(Default)]
pub struct CrossEntropy(Mean);

/// The input to [CrossEntropy](struct.CrossEntropy.html).
pub struct CrossEntropyInput<'a> {
	/// (n_classes)
	pub probabilities: ArrayView1<'a, f32>,
	/// 0-indexed class
	pub label: usize,
}

impl<'a> StreamingMetric<'a> for CrossEntropy {
	type Input = CrossEntropyInput<'a>;
	type Output = Option<f32>;

	fn update(&mut self, value: CrossEntropyInput) {
		let probability = value.probabilities[value.label];
		let probability = clamp(probability, std::f32::EPSILON, 1.0 - std::f32::EPSILON);
		self.0.update(-probability.ln())
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Self::Output {
		self.0.finalize()
	}
}

#[test]
fn test_cross_entropy() {
	let probabilities = arr2(&[[0.5, 0.5], [0.25, 0.75]]);
	let mut metric = CrossEntropy::default();
	metric.update(CrossEntropyInput {
		probabilities: probabilities.row(0),
		label: 0,
	});
	metric.update(CrossEntropyInput {
		probabilities: probabilities.row(1),
		label: 1,
	});
	let expected = (-(0.5f32).ln() - (0.75f32).ln()) / 2.0;
	assert!((metric.finalize().unwrap() - expected).abs() < 1e-6);
}
