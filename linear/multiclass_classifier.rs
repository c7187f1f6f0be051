use super::{train_early_stopping_split, EarlyStoppingMonitor, TrainOptions};
use bestfit_metrics::{CrossEntropy, CrossEntropyInput, StreamingMetric};
use itertools::izip;
use ndarray::prelude::*;
use ndarray::Zip;
use num_traits::ToPrimitive;
use rayon::prelude::*;

/// This struct describes a linear multiclass classifier model. Features are standardized with `means` and `std_devs` before the weights are applied.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MulticlassClassifier {
	/// (n_classes)
	pub biases: Array1<f32>,
	/// (n_features, n_classes)
	pub weights: Array2<f32>,
	/// (n_features)
	pub means: Vec<f32>,
	/// (n_features)
	pub std_devs: Vec<f32>,
	/// The early stopping loss after each epoch, if early stopping was enabled.
	pub losses: Option<Vec<f32>>,
}

impl MulticlassClassifier {
	/// Train a linear multiclass classifier. `labels` holds 0-indexed classes.
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &TrainOptions,
	) -> MulticlassClassifier {
		let n_features = features.ncols();
		let (features_train, labels_train, features_early_stopping, labels_early_stopping) =
			match &options.early_stopping_options {
				Some(early_stopping_options) => train_early_stopping_split(
					features,
					labels,
					early_stopping_options.early_stopping_fraction,
					options.seed,
				),
				None => (
					features.to_owned(),
					labels.to_owned(),
					Array2::zeros((0, n_features)),
					Array1::from(Vec::new()),
				),
			};
		let (means, std_devs): (Vec<f32>, Vec<f32>) = features_train
			.axis_iter(Axis(1))
			.into_par_iter()
			.map(compute_mean_and_std_dev)
			.unzip();
		let mut model = MulticlassClassifier {
			biases: Array1::<f32>::zeros(n_classes),
			weights: Array2::<f32>::zeros((n_features, n_classes)),
			means,
			std_devs,
			losses: None,
		};
		let features_train = model.standardize(features_train.view());
		// Early stopping needs at least one held out example.
		let mut early_stopping_monitor = match &options.early_stopping_options {
			Some(early_stopping_options) if features_early_stopping.nrows() > 0 => {
				Some(EarlyStoppingMonitor::new(
					early_stopping_options.min_decrease_in_loss_for_significant_change,
					early_stopping_options.n_epochs_without_improvement_to_stop,
				))
			}
			_ => None,
		};
		let mut losses = Vec::new();
		for _ in 0..options.max_epochs {
			for (features, labels) in izip!(
				features_train.axis_chunks_iter(Axis(0), options.n_examples_per_batch.max(1)),
				labels_train.axis_chunks_iter(Axis(0), options.n_examples_per_batch.max(1))
			) {
				model.train_batch(features, labels, options);
			}
			if let Some(early_stopping_monitor) = early_stopping_monitor.as_mut() {
				let early_stopping_metric_value = model.compute_early_stopping_metric_value(
					features_early_stopping.view(),
					labels_early_stopping.view(),
				);
				losses.push(early_stopping_metric_value);
				let should_stop = early_stopping_monitor.update(early_stopping_metric_value);
				if should_stop {
					break;
				}
			}
		}
		if early_stopping_monitor.is_some() {
			model.losses = Some(losses);
		}
		model
	}

	fn train_batch(
		&mut self,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		options: &TrainOptions,
	) {
		let learning_rate = options.learning_rate;
		let l2_regularization = options.l2_regularization;
		let n_classes = self.weights.ncols();
		let mut logits = features.dot(&self.weights) + &self.biases;
		softmax(logits.view_mut());
		// The gradient of the loss with respect to the logits is the predicted probability minus the one-hot label.
		let mut predictions = logits;
		for (mut predictions, label) in predictions.axis_iter_mut(Axis(0)).zip(labels.iter()) {
			predictions[*label] -= 1.0;
		}
		let py = predictions;
		for class_index in 0..n_classes {
			let weight_gradients = (&features * &py.column(class_index).insert_axis(Axis(1)))
				.mean_axis(Axis(0))
				.unwrap();
			Zip::from(self.weights.column_mut(class_index))
				.and(weight_gradients.view())
				.for_each(|weight, weight_gradient| {
					*weight += -learning_rate * (weight_gradient + l2_regularization * *weight)
				});
			let bias_gradient = py.column(class_index).mean().unwrap();
			self.biases[class_index] += -learning_rate * bias_gradient;
		}
	}

	fn compute_early_stopping_metric_value(
		&self,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
	) -> f32 {
		let mut probabilities = Array2::zeros((features.nrows(), self.biases.len()));
		self.predict(features, probabilities.view_mut());
		let mut metric = CrossEntropy::default();
		for (probabilities, label) in probabilities.axis_iter(Axis(0)).zip(labels.iter()) {
			metric.update(CrossEntropyInput {
				probabilities,
				label: *label,
			});
		}
		metric.finalize().unwrap_or(std::f32::INFINITY)
	}

	/// Write the class probabilities for each row of `features` into `probabilities`, which has shape `(n_examples, n_classes)`.
	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		let features = self.standardize(features);
		for mut row in probabilities.rows_mut() {
			row.assign(&self.biases.view());
		}
		ndarray::linalg::general_mat_mul(1.0, &features, &self.weights, 1.0, &mut probabilities);
		softmax(probabilities);
	}

	/// Invalid values are replaced with the mean, which is zero after standardization.
	fn standardize(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut standardized = features.to_owned();
		for (mut column, mean, std_dev) in izip!(
			standardized.axis_iter_mut(Axis(1)),
			self.means.iter(),
			self.std_devs.iter()
		) {
			column.mapv_inplace(|value| {
				if value.is_finite() {
					(value - mean) / std_dev
				} else {
					0.0
				}
			});
		}
		standardized
	}
}

/// Compute the mean and standard deviation of the finite values in `column`. A standard deviation of zero is replaced with one so constant features standardize to zero.
fn compute_mean_and_std_dev(column: ArrayView1<f32>) -> (f32, f32) {
	let mut n = 0usize;
	let mut sum = 0.0f64;
	let mut sum_of_squares = 0.0f64;
	for value in column.iter().filter(|value| value.is_finite()) {
		let value = value.to_f64().unwrap();
		n += 1;
		sum += value;
		sum_of_squares += value * value;
	}
	if n == 0 {
		return (0.0, 1.0);
	}
	let n = n.to_f64().unwrap();
	let mean = sum / n;
	let variance = (sum_of_squares / n - mean * mean).max(0.0);
	let std_dev = variance.sqrt();
	let std_dev = if std_dev > 0.0 { std_dev } else { 1.0 };
	(mean.to_f32().unwrap(), std_dev.to_f32().unwrap())
}

fn softmax(mut logits: ArrayViewMut2<f32>) {
	for mut logits in logits.rows_mut() {
		let max = logits.iter().fold(std::f32::MIN, |a, &b| a.max(b));
		logits -= max;
		logits.mapv_inplace(|l| l.exp());
		let sum = logits.iter().fold(0.0, |a, b| a + b);
		logits /= sum;
	}
}

#[cfg(test)]
fn clusters(n_examples: usize) -> (Array2<f32>, Array1<usize>) {
	let centers = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
	let mut features = Array2::zeros((n_examples, 2));
	let mut labels = Array1::zeros(n_examples);
	for i in 0..n_examples {
		let label = i % 3;
		let jitter = ((i * 37) % 11) as f32 / 11.0 - 0.5;
		features[(i, 0)] = centers[label][0] + jitter;
		features[(i, 1)] = centers[label][1] - jitter;
		labels[i] = label;
	}
	(features, labels)
}

#[test]
fn test_multiclass_classifier() {
	let (features, labels) = clusters(150);
	let model = MulticlassClassifier::train(features.view(), labels.view(), 3, &TrainOptions::default());
	let losses = model.losses.as_ref().unwrap();
	assert!(!losses.is_empty() && losses.len() <= 100);
	let mut probabilities = Array2::zeros((150, 3));
	model.predict(features.view(), probabilities.view_mut());
	let mut n_correct = 0;
	for (probabilities, label) in probabilities.axis_iter(Axis(0)).zip(labels.iter()) {
		assert!((probabilities.sum() - 1.0).abs() < 1e-5);
		let (prediction, _) = probabilities
			.iter()
			.enumerate()
			.fold((0, std::f32::MIN), |best, (index, probability)| {
				if *probability > best.1 {
					(index, *probability)
				} else {
					best
				}
			});
		if prediction == *label {
			n_correct += 1;
		}
	}
	assert_eq!(n_correct, 150);
}

#[test]
fn test_labels_sorted_by_class() {
	// 45, 45, and 10 examples of classes 0, 1, and 2, in that order.
	let labels: Array1<usize> = (0..100)
		.map(|i| if i < 45 { 0 } else if i < 90 { 1 } else { 2 })
		.collect();
	let mut features = Array2::zeros((100, 2));
	for (i, (mut row, label)) in features.axis_iter_mut(Axis(0)).zip(labels.iter()).enumerate() {
		let label = *label as f32;
		row[0] = label * 3.0 + ((i * 7) % 5) as f32 * 0.1;
		row[1] = label * 2.0 + ((i * 13) % 7) as f32 * 0.1;
	}
	let options = TrainOptions {
		seed: 42,
		..Default::default()
	};
	let model = MulticlassClassifier::train(features.view(), labels.view(), 3, &options);
	let mut probabilities = Array2::zeros((100, 3));
	model.predict(features.view(), probabilities.view_mut());
	for (probabilities, label) in probabilities.axis_iter(Axis(0)).zip(labels.iter()) {
		let prediction = probabilities
			.iter()
			.enumerate()
			.fold((0, std::f32::MIN), |best, (index, probability)| {
				if *probability > best.1 {
					(index, *probability)
				} else {
					best
				}
			})
			.0;
		assert_eq!(prediction, *label);
	}
}

#[test]
fn test_training_is_deterministic() {
	let (features, labels) = clusters(60);
	let options = TrainOptions {
		early_stopping_options: None,
		max_epochs: 5,
		..Default::default()
	};
	let a = MulticlassClassifier::train(features.view(), labels.view(), 3, &options);
	let b = MulticlassClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(a.weights, b.weights);
	assert_eq!(a.biases, b.biases);
	assert!(a.losses.is_none());
}

#[test]
fn test_standardize() {
	let features = arr2(&[[1.0, 5.0], [3.0, 5.0], [f32::NAN, 5.0]]);
	let (mean, std_dev) = compute_mean_and_std_dev(features.column(0));
	assert_eq!((mean, std_dev), (2.0, 1.0));
	let (mean, std_dev) = compute_mean_and_std_dev(features.column(1));
	assert_eq!((mean, std_dev), (5.0, 1.0));
	let model = MulticlassClassifier {
		biases: Array1::zeros(2),
		weights: Array2::zeros((2, 2)),
		means: vec![2.0, 5.0],
		std_devs: vec![1.0, 1.0],
		losses: None,
	};
	assert_eq!(
		model.standardize(features.view()),
		arr2(&[[-1.0, 0.0], [1.0, 0.0], [0.0, 0.0]])
	);
}
