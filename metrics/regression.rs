use super::{mean_variance::merge_mean_m2, StreamingMetric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// `RegressionMetrics` computes common metrics used to evaluate regressors.
#[derive(Default)]
pub struct RegressionMetrics {
	mean_variance: Option<MeanVariance>,
	absolute_error: f64,
	squared_error: f64,
}

#[derive(Debug)]
struct MeanVariance {
	pub n: u64,
	pub m2: f64,
	pub mean: f64,
}

pub struct RegressionMetricsInput<'a> {
	pub predictions: ArrayView1<'a, f32>,
	pub labels: ArrayView1<'a, f32>,
}

/// The output from [RegressionMetrics](struct.RegressionMetrics.html).
#[derive(Debug)]
pub struct RegressionMetricsOutput {
	/// The mean squared error is equal to the mean of the squared errors. For a given example, the error is the difference between the true value and the model's predicted value.
	pub mse: f32,
	/// The root mean squared error is equal to the square root of the mean squared error.
	pub rmse: f32,
	/// The mean of the absolute value of the errors.
	pub mae: f32,
	/// The r-squared value. https://en.wikipedia.org/wiki/Coefficient_of_determination. If the labels have zero variance, this is 1.0 for a perfect fit and 0.0 otherwise.
	pub r2: f32,
	/// The mean squared error of always predicting the mean of the labels.
	pub baseline_mse: f32,
	/// The root mean squared error of always predicting the mean of the labels.
	pub baseline_rmse: f32,
}

impl RegressionMetrics {
	pub fn new() -> Self {
		Self::default()
	}
}

impl<'a> StreamingMetric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = RegressionMetricsOutput;

	fn update(&mut self, input: RegressionMetricsInput) {
		let RegressionMetricsInput {
			predictions,
			labels,
		} = input;
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			let label = label.to_f64().unwrap();
			match &mut self.mean_variance {
				Some(mean_variance) => {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						1,
						label,
						0.0,
					);
					mean_variance.n += 1;
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
				}
				None => {
					self.mean_variance = Some(MeanVariance {
						n: 1,
						mean: label,
						m2: 0.0,
					})
				}
			}
			let error = prediction.to_f64().unwrap() - label;
			self.absolute_error += error.abs();
			self.squared_error += error * error;
		}
	}

	fn merge(&mut self, other: Self) {
		match &mut self.mean_variance {
			Some(mean_variance) => {
				if let Some(other) = other.mean_variance {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						other.n,
						other.mean,
						other.m2,
					);
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
					mean_variance.n += other.n;
				}
			}
			None => {
				self.mean_variance = other.mean_variance;
			}
		}
		self.absolute_error += other.absolute_error;
		self.squared_error += other.squared_error;
	}

	fn finalize(self) -> Self::Output {
		let (n, m2) = match self.mean_variance {
			Some(m) => (m.n.to_f64().unwrap(), m.m2),
			None => (0.0, f64::NAN),
		};
		let variance = m2 / n;
		let mae = self.absolute_error / n;
		let mse = self.squared_error / n;
		let rmse = mse.sqrt();
		let r2 = if m2 > 0.0 {
			1.0 - self.squared_error / m2
		} else if self.squared_error == 0.0 {
			1.0
		} else {
			0.0
		};
		let baseline_mse = variance;
		let baseline_rmse = baseline_mse.sqrt();
		RegressionMetricsOutput {
			mae: mae as f32,
			mse: mse as f32,
			r2: r2 as f32,
			rmse: rmse as f32,
			baseline_mse: baseline_mse as f32,
			baseline_rmse: baseline_rmse as f32,
		}
	}
}

#[test]
fn test_regression_metrics() {
	let mut metrics = RegressionMetrics::new();
	let labels = arr1(&[1.0, 3.0]);
	let predictions = arr1(&[1.0, 5.0]);
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let metrics = metrics.finalize();
	insta::assert_debug_snapshot!(metrics, @r###"
 RegressionMetricsOutput {
     mse: 2.0,
     rmse: 1.4142135,
     mae: 1.0,
     r2: -1.0,
     baseline_mse: 1.0,
     baseline_rmse: 1.0,
 }
 "###);
}

#[test]
fn test_r2_merge_matches_single_pass() {
	let labels = arr1(&[0.0, 1.0, 2.0, 1.0, 0.0, 2.0]);
	let predictions = arr1(&[0.0, 1.0, 1.0, 1.0, 0.0, 2.0]);
	let mut single = RegressionMetrics::new();
	single.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let mut left = RegressionMetrics::new();
	left.update(RegressionMetricsInput {
		predictions: predictions.slice(s![..2]),
		labels: labels.slice(s![..2]),
	});
	let mut right = RegressionMetrics::new();
	right.update(RegressionMetricsInput {
		predictions: predictions.slice(s![2..]),
		labels: labels.slice(s![2..]),
	});
	left.merge(right);
	let single = single.finalize();
	let merged = left.finalize();
	// mean is 1, sum of squares is 4, one error of 1.
	assert!((single.r2 - 0.75).abs() < 1e-6);
	assert!((merged.r2 - single.r2).abs() < 1e-6);
}

#[test]
fn test_r2_constant_labels() {
	let labels = arr1(&[2.0, 2.0, 2.0]);
	let mut exact = RegressionMetrics::new();
	exact.update(RegressionMetricsInput {
		predictions: labels.view(),
		labels: labels.view(),
	});
	assert_eq!(exact.finalize().r2, 1.0);
	let predictions = arr1(&[2.0, 1.0, 2.0]);
	let mut inexact = RegressionMetrics::new();
	inexact.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	assert_eq!(inexact.finalize().r2, 0.0);
}
