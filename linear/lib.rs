/*!
This crate implements multinomial logistic regression. [`MulticlassClassifier`](struct.MulticlassClassifier.html) trains `n_classes` linear models on standardized features, and their outputs are combined with the `softmax` function.

Training uses mini-batch gradient descent. Batches are processed in order on a single thread, so training the same data with the same options always produces the same model. The loss on a held-out fraction of the training data is monitored after each epoch, and training terminates when it has stabilized.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

mod multiclass_classifier;

pub use multiclass_classifier::MulticlassClassifier;

/// These are the options passed to `MulticlassClassifier::train`.
#[derive(Clone, Debug)]
pub struct TrainOptions {
	/// Specify options for early stopping. If the value is `Some`, early stopping will be enabled. If it is `None`, early stopping will be disabled.
	pub early_stopping_options: Option<EarlyStoppingOptions>,
	/// This is the L2 regularization value to use when updating the model parameters.
	pub l2_regularization: f32,
	/// This is the learning rate to use when updating the model parameters.
	pub learning_rate: f32,
	/// This is the maximum number of epochs to train.
	pub max_epochs: usize,
	/// This is the number of examples to use for each batch of training.
	pub n_examples_per_batch: usize,
	/// The seed for shuffling the examples before they are split into training and early stopping arrays.
	pub seed: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			l2_regularization: 0.0,
			learning_rate: 0.1,
			max_epochs: 100,
			n_examples_per_batch: 32,
			seed: 0,
			early_stopping_options: Some(EarlyStoppingOptions {
				early_stopping_fraction: 0.1,
				n_epochs_without_improvement_to_stop: 3,
				min_decrease_in_loss_for_significant_change: 1e-3,
			}),
		}
	}
}

/// The parameters in this struct control how to determine whether training should stop early after each epoch.
#[derive(Clone, Debug)]
pub struct EarlyStoppingOptions {
	/// This is the fraction of the dataset that is set aside to compute the early stopping metric.
	pub early_stopping_fraction: f32,
	/// If this many epochs pass by without a significant improvement in the early stopping metric over the previous epoch, training will be stopped early.
	pub n_epochs_without_improvement_to_stop: usize,
	/// This is the minimum decrease in the early stopping metric for an epoch to be considered a significant improvement over the previous epoch.
	pub min_decrease_in_loss_for_significant_change: f32,
}

/// This function shuffles the examples with `seed` and splits the `features` and `labels` arrays into training and early stopping arrays, where the size of the early stopping arrays will be `features.nrows() * early_stopping_fraction`, rounded down.
fn train_early_stopping_split<Label: Clone>(
	features: ArrayView2<f32>,
	labels: ArrayView1<Label>,
	early_stopping_fraction: f32,
	seed: u64,
) -> (Array2<f32>, Array1<Label>, Array2<f32>, Array1<Label>) {
	let n_examples = features.nrows();
	let n_early_stopping = (early_stopping_fraction * n_examples.to_f32().unwrap())
		.floor()
		.to_usize()
		.unwrap()
		.min(n_examples);
	if n_early_stopping == 0 {
		return (
			features.to_owned(),
			labels.to_owned(),
			Array2::zeros((0, features.ncols())),
			Array1::from(Vec::new()),
		);
	}
	let mut indexes: Vec<usize> = (0..n_examples).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	indexes.shuffle(&mut rng);
	let (train_indexes, early_stopping_indexes) = indexes.split_at(n_examples - n_early_stopping);
	(
		features.select(Axis(0), train_indexes),
		labels.select(Axis(0), train_indexes),
		features.select(Axis(0), early_stopping_indexes),
		labels.select(Axis(0), early_stopping_indexes),
	)
}

/**
The `EarlyStoppingMonitor` keeps track of the values of an early stopping metric for each epoch, and if enough epochs have passed without a significant improvement in the metric, the `update()` function will return `true` to indicate that training should be stopped.
*/
struct EarlyStoppingMonitor {
	threshold: f32,
	epochs: usize,
	n_epochs_without_observed_improvement: usize,
	previous_epoch_metric_value: Option<f32>,
}

impl EarlyStoppingMonitor {
	pub fn new(threshold: f32, epochs: usize) -> Self {
		EarlyStoppingMonitor {
			threshold,
			epochs,
			previous_epoch_metric_value: None,
			n_epochs_without_observed_improvement: 0,
		}
	}

	/// This function updates the `EarlyStoppingMonitor` with the next epoch's early stopping metric. This function returns true if training should stop.
	pub fn update(&mut self, early_stopping_metric_value: f32) -> bool {
		let result = if let Some(previous_stopping_metric) = self.previous_epoch_metric_value {
			if early_stopping_metric_value > previous_stopping_metric
				|| f32::abs(early_stopping_metric_value - previous_stopping_metric) < self.threshold
			{
				self.n_epochs_without_observed_improvement += 1;
				self.n_epochs_without_observed_improvement >= self.epochs
			} else {
				self.n_epochs_without_observed_improvement = 0;
				false
			}
		} else {
			false
		};
		self.previous_epoch_metric_value = Some(early_stopping_metric_value);
		result
	}
}

#[test]
fn test_train_early_stopping_split() {
	let features = Array2::<f32>::zeros((25, 2));
	let labels = Array1::from((0..25).collect::<Vec<usize>>());
	let (features_train, labels_train, features_early_stopping, labels_early_stopping) =
		train_early_stopping_split(features.view(), labels.view(), 0.1, 0);
	assert_eq!(features_train.nrows(), 23);
	assert_eq!(labels_train.len(), 23);
	assert_eq!(features_early_stopping.nrows(), 2);
	assert_eq!(labels_early_stopping.len(), 2);
	let mut all_labels: Vec<usize> = labels_train
		.iter()
		.chain(labels_early_stopping.iter())
		.cloned()
		.collect();
	all_labels.sort_unstable();
	assert_eq!(all_labels, (0..25).collect::<Vec<usize>>());
	// The same seed gives the same split.
	let (_, labels_train_again, _, _) =
		train_early_stopping_split(features.view(), labels.view(), 0.1, 0);
	assert_eq!(labels_train, labels_train_again);
	// Too few examples to hold any out.
	let (features_train, _, features_early_stopping, _) =
		train_early_stopping_split(features.slice(s![..9, ..]), labels.slice(s![..9]), 0.1, 0);
	assert_eq!(features_train.nrows(), 9);
	assert_eq!(features_early_stopping.nrows(), 0);
}

#[test]
fn test_train_early_stopping_split_with_sorted_labels() {
	let labels: Array1<usize> = (0..100)
		.map(|i| if i < 45 { 0 } else if i < 90 { 1 } else { 2 })
		.collect();
	let features = Array2::<f32>::zeros((100, 1));
	let (_, labels_train, _, labels_early_stopping) =
		train_early_stopping_split(features.view(), labels.view(), 0.1, 42);
	assert_eq!(labels_early_stopping.len(), 10);
	for class in 0..3 {
		assert!(labels_train.iter().any(|label| *label == class));
	}
	assert!(labels_early_stopping.iter().any(|label| *label != 2));
}

#[test]
fn test_early_stopping_monitor() {
	let mut monitor = EarlyStoppingMonitor::new(1e-3, 2);
	assert!(!monitor.update(1.0));
	assert!(!monitor.update(0.5));
	// An increase counts as no improvement.
	assert!(!monitor.update(0.6));
	// A decrease smaller than the threshold also counts as no improvement.
	assert!(monitor.update(0.5999));
	let mut monitor = EarlyStoppingMonitor::new(1e-3, 2);
	monitor.update(1.0);
	monitor.update(1.0);
	// A significant decrease resets the count.
	assert!(!monitor.update(0.9));
	assert!(!monitor.update(0.9));
	assert!(monitor.update(0.9));
}
