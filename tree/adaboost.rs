use crate::{
	argmax,
	binning::{compute_binned_features, compute_binning_instructions},
	classification_tree::{train_classification_tree, ClassificationTreeOptions, SplitCriterion},
	Tree,
};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// An AdaBoost classifier trained with SAMME. Each estimator is a shallow classification tree trained on reweighted examples, and its vote is weighted by how well it did.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AdaBoostClassifier {
	pub estimators: Vec<Tree<Vec<f32>>>,
	pub estimator_weights: Vec<f32>,
	pub n_classes: usize,
}

#[derive(Clone, Debug)]
pub struct AdaBoostTrainOptions {
	pub learning_rate: f32,
	pub max_depth: usize,
	pub n_estimators: usize,
	pub seed: u64,
}

impl Default for AdaBoostTrainOptions {
	fn default() -> Self {
		Self {
			learning_rate: 1.0,
			max_depth: 1,
			n_estimators: 50,
			seed: 0,
		}
	}
}

impl AdaBoostClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &AdaBoostTrainOptions,
	) -> Self {
		let n_examples = labels.len();
		let binning_instructions = compute_binning_instructions(features);
		let binned_features = compute_binned_features(features, &binning_instructions);
		let tree_options = ClassificationTreeOptions {
			criterion: SplitCriterion::Gini,
			max_depth: Some(options.max_depth),
			min_examples_per_leaf: 1,
			max_features: None,
		};
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut weights = vec![1.0 / n_examples.to_f32().unwrap(); n_examples];
		let mut incorrect = vec![false; n_examples];
		let chance_error = 1.0 - 1.0 / n_classes.to_f64().unwrap();
		let log_n_classes_minus_one = (n_classes.to_f64().unwrap() - 1.0).max(1.0).ln();
		let mut estimators = Vec::new();
		let mut estimator_weights = Vec::new();
		for _ in 0..options.n_estimators {
			let estimator = train_classification_tree(
				&binned_features,
				&binning_instructions,
				labels,
				&weights,
				n_classes,
				&tree_options,
				&mut rng,
			);
			let mut weighted_error = 0.0f64;
			let mut total_weight = 0.0f64;
			for (incorrect, features, label, weight) in izip!(
				incorrect.iter_mut(),
				features.axis_iter(Axis(0)),
				labels.iter(),
				weights.iter()
			) {
				*incorrect = argmax(estimator.predict(features)) != *label;
				total_weight += weight.to_f64().unwrap();
				if *incorrect {
					weighted_error += weight.to_f64().unwrap();
				}
			}
			let error = weighted_error / total_weight;
			// A perfect estimator gets a unit weight and ends boosting.
			if error <= 0.0 {
				estimators.push(estimator);
				estimator_weights.push(1.0);
				break;
			}
			// An estimator no better than chance ends boosting. It is only kept when there is nothing else to predict with.
			if error >= chance_error {
				if estimators.is_empty() {
					estimators.push(estimator);
					estimator_weights.push(1.0);
				}
				break;
			}
			let estimator_weight = options.learning_rate.to_f64().unwrap()
				* (((1.0 - error) / error).ln() + log_n_classes_minus_one);
			let scale = estimator_weight.exp().to_f32().unwrap();
			for (weight, incorrect) in weights.iter_mut().zip(incorrect.iter()) {
				if *incorrect {
					*weight *= scale;
				}
			}
			let sum: f32 = weights.iter().sum();
			for weight in weights.iter_mut() {
				*weight /= sum;
			}
			estimators.push(estimator);
			estimator_weights.push(estimator_weight.to_f32().unwrap());
		}
		Self {
			estimators,
			estimator_weights,
			n_classes,
		}
	}

	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		let total_weight: f32 = self.estimator_weights.iter().sum();
		let scale = (self.n_classes.to_f32().unwrap() - 1.0).max(1.0);
		for (features, mut probabilities) in izip!(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0))
		) {
			probabilities.fill(0.0);
			for (estimator, weight) in self.estimators.iter().zip(self.estimator_weights.iter()) {
				probabilities[argmax(estimator.predict(features))] += *weight;
			}
			// Normalize the votes and convert them to probabilities with a softmax.
			probabilities.mapv_inplace(|vote| vote / total_weight / scale);
			let max = probabilities.fold(f32::MIN, |a, b| a.max(*b));
			probabilities.mapv_inplace(|decision| (decision - max).exp());
			let sum = probabilities.sum();
			probabilities /= sum;
		}
	}
}

#[test]
fn test_adaboost() {
	use crate::test_data::{accuracy, bands};
	let (features, labels) = bands(120);
	let model = AdaBoostClassifier::train(
		features.view(),
		labels.view(),
		3,
		&AdaBoostTrainOptions::default(),
	);
	assert!(model.estimators.len() > 1);
	assert_eq!(model.estimators.len(), model.estimator_weights.len());
	let mut probabilities = Array2::zeros((120, 3));
	model.predict(features.view(), probabilities.view_mut());
	for row in probabilities.axis_iter(Axis(0)) {
		assert!((row.sum() - 1.0).abs() < 1e-5);
	}
	assert!(accuracy(probabilities.view(), labels.view()) > 0.95);
}

#[test]
fn test_adaboost_stops_on_perfect_estimator() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let labels = arr1(&[0, 0, 1, 1]);
	let model = AdaBoostClassifier::train(
		features.view(),
		labels.view(),
		2,
		&AdaBoostTrainOptions::default(),
	);
	assert_eq!(model.estimators.len(), 1);
	assert_eq!(model.estimator_weights, vec![1.0]);
	let mut probabilities = Array2::zeros((4, 2));
	model.predict(features.view(), probabilities.view_mut());
	assert!(probabilities[(0, 0)] > probabilities[(0, 1)]);
	assert!(probabilities[(3, 1)] > probabilities[(3, 0)]);
}
