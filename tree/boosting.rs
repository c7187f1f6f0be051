/*!
This module contains the softmax boosting loop shared by [`GradientBoostingClassifier`](../struct.GradientBoostingClassifier.html) and [`ObliviousBoostingClassifier`](../struct.ObliviousBoostingClassifier.html). Each round trains `n_classes` trees, one per class, on the gradients and hessians of the cross entropy loss with respect to that class's logit.
*/

use crate::{
	binning::{compute_binned_features, compute_binning_instructions, BinnedFeatures, BinningInstruction},
	oblivious_tree::ObliviousTree,
	Tree,
};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::{clamp, ToPrimitive};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// A tree that outputs a single logit.
pub trait RoundTree: Send + Sync {
	fn predict_logit(&self, features: ArrayView1<f32>) -> f32;
}

impl RoundTree for Tree<f32> {
	fn predict_logit(&self, features: ArrayView1<f32>) -> f32 {
		*self.predict(features)
	}
}

impl RoundTree for ObliviousTree {
	fn predict_logit(&self, features: ArrayView1<f32>) -> f32 {
		self.predict(features)
	}
}

pub struct BoostingOptions {
	pub n_rounds: usize,
	/// The fraction of examples sampled without replacement to train each round.
	pub subsample: f32,
	pub seed: u64,
}

/// Everything a round's tree trainer needs besides its class's gradients and hessians.
pub struct RoundInput<'a> {
	pub binned_features: &'a BinnedFeatures,
	pub binning_instructions: &'a [BinningInstruction],
	pub examples: &'a [usize],
}

/// Train `n_rounds * n_classes` trees. The returned trees are in round-major order.
pub fn train_boosted<T, F>(
	features: ArrayView2<f32>,
	labels: ArrayView1<usize>,
	n_classes: usize,
	options: &BoostingOptions,
	train_tree: F,
) -> (Vec<f32>, Vec<T>)
where
	T: RoundTree,
	F: Fn(&RoundInput, ArrayView1<f32>, ArrayView1<f32>) -> T + Sync,
{
	let n_examples = labels.len();
	let binning_instructions = compute_binning_instructions(features);
	let binned_features = compute_binned_features(features, &binning_instructions);
	let biases = compute_biases(labels, n_classes);
	// (n_examples, n_classes)
	let mut logits = Array2::<f32>::zeros((n_examples, n_classes));
	for mut logits in logits.axis_iter_mut(Axis(0)) {
		logits.assign(&biases);
	}
	// (n_classes, n_examples)
	let mut gradients = Array2::<f32>::zeros((n_classes, n_examples));
	let mut hessians = Array2::<f32>::zeros((n_classes, n_examples));
	let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
	let mut trees = Vec::with_capacity(options.n_rounds * n_classes);
	for _ in 0..options.n_rounds {
		update_gradients_and_hessians(
			gradients.view_mut(),
			hessians.view_mut(),
			labels,
			logits.view(),
		);
		let examples = sample_examples(n_examples, options.subsample, &mut rng);
		let round_input = RoundInput {
			binned_features: &binned_features,
			binning_instructions: &binning_instructions,
			examples: &examples,
		};
		let round: Vec<T> = (0..n_classes)
			.into_par_iter()
			.map(|class_index| {
				train_tree(
					&round_input,
					gradients.row(class_index),
					hessians.row(class_index),
				)
			})
			.collect();
		// Update the logits with the predictions from this round's trees.
		for (mut logits, features) in izip!(logits.axis_iter_mut(Axis(0)), features.axis_iter(Axis(0))) {
			for (logit, tree) in logits.iter_mut().zip(round.iter()) {
				*logit += tree.predict_logit(features);
			}
		}
		trees.extend(round);
	}
	(biases.to_vec(), trees)
}

/// Write class probabilities for each example into `probabilities`.
pub fn predict_boosted<T: RoundTree>(
	biases: &[f32],
	trees: &[T],
	features: ArrayView2<f32>,
	mut probabilities: ArrayViewMut2<f32>,
) {
	let n_classes = biases.len();
	for (features, mut logits) in izip!(
		features.axis_iter(Axis(0)),
		probabilities.axis_iter_mut(Axis(0))
	) {
		for (logit, bias) in logits.iter_mut().zip(biases.iter()) {
			*logit = *bias;
		}
		for round in trees.chunks(n_classes) {
			for (logit, tree) in logits.iter_mut().zip(round.iter()) {
				*logit += tree.predict_logit(features);
			}
		}
		softmax(logits);
	}
}

/// The biases are the logs of the class frequencies in the training labels.
pub fn compute_biases(labels: ArrayView1<usize>, n_classes: usize) -> Array1<f32> {
	let mut biases: Array1<f32> = Array::zeros(n_classes);
	for label in labels {
		biases[*label] += 1.0;
	}
	let n_examples = labels.len().to_f32().unwrap();
	biases.mapv_inplace(|count| {
		let probability = count / n_examples;
		let clamped_probability = clamp(probability, std::f32::EPSILON, 1.0 - std::f32::EPSILON);
		clamped_probability.ln()
	});
	biases
}

/// Compute the gradients and hessians for each example given the labels and logits.
pub fn update_gradients_and_hessians(
	// (n_classes, n_examples)
	mut gradients: ArrayViewMut2<f32>,
	// (n_classes, n_examples)
	mut hessians: ArrayViewMut2<f32>,
	// (n_examples)
	labels: ArrayView1<usize>,
	// (n_examples, n_classes)
	logits: ArrayView2<f32>,
) {
	let mut probabilities = logits.to_owned();
	for probabilities in probabilities.axis_iter_mut(Axis(0)) {
		softmax(probabilities);
	}
	izip!(
		gradients.axis_iter_mut(Axis(1)),
		hessians.axis_iter_mut(Axis(1)),
		probabilities.axis_iter(Axis(0)),
		labels.iter()
	)
	.for_each(|(mut gradients, mut hessians, probabilities, label)| {
		izip!(
			probabilities.iter().enumerate(),
			gradients.iter_mut(),
			hessians.iter_mut()
		)
		.for_each(|((class_index, probability), gradient, hessian)| {
			let target = if *label == class_index { 1.0 } else { 0.0 };
			*gradient = *probability - target;
			*hessian = *probability * (1.0 - *probability);
		});
	});
}

/// Choose which examples train a round. All examples are used unless `subsample` is below 1.
fn sample_examples(n_examples: usize, subsample: f32, rng: &mut Xoshiro256Plus) -> Vec<usize> {
	if subsample >= 1.0 {
		return (0..n_examples).collect();
	}
	let amount = (subsample * n_examples.to_f32().unwrap())
		.round()
		.to_usize()
		.unwrap_or(0)
		.max(1)
		.min(n_examples);
	let mut examples = rand::seq::index::sample(rng, n_examples, amount).into_vec();
	examples.sort_unstable();
	examples
}

pub fn softmax(mut logits: ArrayViewMut1<f32>) {
	let max = logits.iter().fold(std::f32::MIN, |a, &b| a.max(b));
	for logit in logits.iter_mut() {
		*logit = (*logit - max).exp();
	}
	let sum = logits.iter().sum::<f32>();
	logits /= sum;
}

#[test]
fn test_compute_biases() {
	let biases = compute_biases(arr1(&[0, 0, 0, 1]).view(), 2);
	assert!((biases[0] - 0.75f32.ln()).abs() < 1e-6);
	assert!((biases[1] - 0.25f32.ln()).abs() < 1e-6);
}

#[test]
fn test_gradients_and_hessians() {
	let mut gradients = Array2::zeros((2, 2));
	let mut hessians = Array2::zeros((2, 2));
	let labels = arr1(&[0, 1]);
	let logits = arr2(&[[0.0, 0.0], [0.0, 0.0]]);
	update_gradients_and_hessians(gradients.view_mut(), hessians.view_mut(), labels.view(), logits.view());
	assert_eq!(gradients, arr2(&[[-0.5, 0.5], [0.5, -0.5]]));
	assert_eq!(hessians, arr2(&[[0.25, 0.25], [0.25, 0.25]]));
}

#[test]
fn test_sample_examples() {
	let mut rng = Xoshiro256Plus::seed_from_u64(1);
	assert_eq!(sample_examples(4, 1.0, &mut rng), vec![0, 1, 2, 3]);
	let examples = sample_examples(10, 0.6, &mut rng);
	assert_eq!(examples.len(), 6);
	assert!(examples.windows(2).all(|pair| pair[0] < pair[1]));
}
