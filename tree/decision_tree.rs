use crate::{
	binning::{compute_binned_features, compute_binning_instructions},
	classification_tree::{train_classification_tree, ClassificationTreeOptions, SplitCriterion},
	Tree,
};
use itertools::izip;
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// A single classification tree. Each leaf stores the distribution of training classes that reached it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DecisionTreeClassifier {
	pub tree: Tree<Vec<f32>>,
	pub n_classes: usize,
}

#[derive(Clone, Debug)]
pub struct DecisionTreeTrainOptions {
	pub criterion: SplitCriterion,
	/// If `None`, nodes are expanded until they are pure or cannot be split.
	pub max_depth: Option<usize>,
	pub min_examples_per_leaf: usize,
	pub seed: u64,
}

impl Default for DecisionTreeTrainOptions {
	fn default() -> Self {
		Self {
			criterion: SplitCriterion::Gini,
			max_depth: None,
			min_examples_per_leaf: 1,
			seed: 0,
		}
	}
}

impl DecisionTreeClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &DecisionTreeTrainOptions,
	) -> Self {
		let binning_instructions = compute_binning_instructions(features);
		let binned_features = compute_binned_features(features, &binning_instructions);
		let weights = vec![1.0; labels.len()];
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let tree = train_classification_tree(
			&binned_features,
			&binning_instructions,
			labels,
			&weights,
			n_classes,
			&ClassificationTreeOptions {
				criterion: options.criterion,
				max_depth: options.max_depth,
				min_examples_per_leaf: options.min_examples_per_leaf,
				max_features: None,
			},
			&mut rng,
		);
		Self { tree, n_classes }
	}

	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		for (features, mut probabilities) in izip!(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0))
		) {
			let leaf = self.tree.predict(features);
			for (probability, value) in probabilities.iter_mut().zip(leaf.iter()) {
				*probability = *value;
			}
		}
	}
}

#[test]
fn test_decision_tree() {
	use crate::test_data::{accuracy, bands};
	let (features, labels) = bands(90);
	let model = DecisionTreeClassifier::train(
		features.view(),
		labels.view(),
		3,
		&DecisionTreeTrainOptions::default(),
	);
	// Two thresholds on the first feature separate the three bands.
	assert_eq!(model.tree.n_leaves(), 3);
	let mut probabilities = Array2::zeros((90, 3));
	model.predict(features.view(), probabilities.view_mut());
	assert_eq!(accuracy(probabilities.view(), labels.view()), 1.0);
}

#[test]
fn test_decision_tree_max_depth() {
	use crate::test_data::bands;
	let (features, labels) = bands(90);
	let options = DecisionTreeTrainOptions {
		criterion: SplitCriterion::Entropy,
		max_depth: Some(1),
		..Default::default()
	};
	let model = DecisionTreeClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.tree.n_leaves(), 2);
}
