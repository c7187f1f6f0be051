use crate::{
	boosting::{predict_boosted, train_boosted, BoostingOptions},
	regression_tree::{train_regression_tree, RegressionTreeOptions},
	Tree,
};
use ndarray::prelude::*;

/// This struct represents a gradient boosted trees classifier. For each round of training, one tree is trained per class, and a prediction's logits are the biases plus the sum of the outputs of the trees for each class.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GradientBoostingClassifier {
	/// The initial logits of the model given no trained trees, which are the logs of the class frequencies in the training labels.
	pub biases: Vec<f32>,
	/// The trees for this model. It has length `n_rounds * n_classes`, in round-major order.
	pub trees: Vec<Tree<f32>>,
	pub n_classes: usize,
}

/// These are the options passed to `GradientBoostingClassifier::train`.
#[derive(Clone, Debug)]
pub struct GradientBoostingTrainOptions {
	/// This option sets the L2 regularization value, which helps avoid overfitting.
	pub l2_regularization: f32,
	/// The learning rate scales the leaf values to control the effect each tree has on the output.
	pub learning_rate: f32,
	/// The depth of a single tree will never exceed this value.
	pub max_depth: usize,
	/// A split will only be considered valid if the number of training examples sent to each of the resulting children is at least this value.
	pub min_examples_per_leaf: usize,
	/// A node will only be split if the best split achieves at least this minimum gain.
	pub min_gain_to_split: f32,
	/// A split will only be considered valid if the sum of hessians in each of the resulting children is at least this value.
	pub min_sum_hessians_per_leaf: f32,
	/// This is the number of rounds of training.
	pub n_rounds: usize,
	/// The fraction of the training examples used to train each round.
	pub subsample: f32,
	pub seed: u64,
}

impl Default for GradientBoostingTrainOptions {
	fn default() -> Self {
		Self {
			l2_regularization: 0.0,
			learning_rate: 0.1,
			max_depth: 3,
			min_examples_per_leaf: 1,
			min_gain_to_split: 0.0,
			min_sum_hessians_per_leaf: 1e-3,
			n_rounds: 100,
			subsample: 1.0,
			seed: 0,
		}
	}
}

impl GradientBoostingClassifier {
	/// Train a gradient boosted trees classifier. `labels` holds 0-indexed classes and there must be at least two classes.
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &GradientBoostingTrainOptions,
	) -> Self {
		let tree_options = RegressionTreeOptions {
			l2_regularization: options.l2_regularization,
			learning_rate: options.learning_rate,
			max_depth: options.max_depth,
			min_examples_per_leaf: options.min_examples_per_leaf,
			min_gain_to_split: options.min_gain_to_split,
			min_sum_hessians_per_leaf: options.min_sum_hessians_per_leaf,
		};
		let boosting_options = BoostingOptions {
			n_rounds: options.n_rounds,
			subsample: options.subsample,
			seed: options.seed,
		};
		let (biases, trees) = train_boosted(
			features,
			labels,
			n_classes,
			&boosting_options,
			|round_input, gradients, hessians| {
				train_regression_tree(
					round_input.binned_features,
					round_input.binning_instructions,
					round_input.examples.to_vec(),
					gradients,
					hessians,
					&tree_options,
				)
			},
		);
		Self {
			biases,
			trees,
			n_classes,
		}
	}

	pub fn predict(&self, features: ArrayView2<f32>, probabilities: ArrayViewMut2<f32>) {
		predict_boosted(&self.biases, &self.trees, features, probabilities)
	}
}

#[test]
fn test_gradient_boosting() {
	use crate::test_data::{accuracy, bands};
	let (features, labels) = bands(120);
	let options = GradientBoostingTrainOptions {
		n_rounds: 20,
		..Default::default()
	};
	let model = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.trees.len(), 60);
	let mut probabilities = Array2::zeros((120, 3));
	model.predict(features.view(), probabilities.view_mut());
	for row in probabilities.axis_iter(Axis(0)) {
		assert!((row.sum() - 1.0).abs() < 1e-5);
	}
	assert!(accuracy(probabilities.view(), labels.view()) > 0.95);
}

#[test]
fn test_gradient_boosting_subsample_is_deterministic() {
	use crate::test_data::bands;
	let (features, labels) = bands(60);
	let options = GradientBoostingTrainOptions {
		n_rounds: 5,
		subsample: 0.7,
		seed: 3,
		..Default::default()
	};
	let a = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &options);
	let b = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &options);
	let mut probabilities_a = Array2::zeros((60, 3));
	let mut probabilities_b = Array2::zeros((60, 3));
	a.predict(features.view(), probabilities_a.view_mut());
	b.predict(features.view(), probabilities_b.view_mut());
	assert_eq!(probabilities_a, probabilities_b);
}
