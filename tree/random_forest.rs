use crate::{
	binning::{compute_binned_features, compute_binning_instructions},
	classification_tree::{train_classification_tree, ClassificationTreeOptions, SplitCriterion},
	Tree,
};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// A random forest averages the class probabilities of many classification trees, each trained on a bootstrap sample of the training data and considering a random subset of the features at each split.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RandomForestClassifier {
	pub trees: Vec<Tree<Vec<f32>>>,
	pub n_classes: usize,
}

#[derive(Clone, Debug)]
pub struct RandomForestTrainOptions {
	pub criterion: SplitCriterion,
	/// The number of features considered at each split. If `None`, the square root of the number of features is used.
	pub max_features: Option<usize>,
	pub max_depth: Option<usize>,
	pub min_examples_per_leaf: usize,
	pub n_trees: usize,
	pub seed: u64,
}

impl Default for RandomForestTrainOptions {
	fn default() -> Self {
		Self {
			criterion: SplitCriterion::Gini,
			max_features: None,
			max_depth: None,
			min_examples_per_leaf: 1,
			n_trees: 100,
			seed: 0,
		}
	}
}

impl RandomForestClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &RandomForestTrainOptions,
	) -> Self {
		let n_examples = labels.len();
		let n_features = features.ncols();
		let max_features = options.max_features.unwrap_or_else(|| {
			n_features
				.to_f64()
				.unwrap()
				.sqrt()
				.floor()
				.to_usize()
				.unwrap()
				.max(1)
		});
		let tree_options = ClassificationTreeOptions {
			criterion: options.criterion,
			max_depth: options.max_depth,
			min_examples_per_leaf: options.min_examples_per_leaf,
			max_features: Some(max_features),
		};
		let binning_instructions = compute_binning_instructions(features);
		let binned_features = compute_binned_features(features, &binning_instructions);
		let trees = (0..options.n_trees)
			.into_par_iter()
			.map(|tree_index| {
				let mut rng =
					Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(tree_index.to_u64().unwrap()));
				// A bootstrap sample is expressed as the number of times each example was drawn.
				let mut weights = vec![0.0f32; n_examples];
				for _ in 0..n_examples {
					weights[rng.gen_range(0..n_examples)] += 1.0;
				}
				train_classification_tree(
					&binned_features,
					&binning_instructions,
					labels,
					&weights,
					n_classes,
					&tree_options,
					&mut rng,
				)
			})
			.collect();
		Self { trees, n_classes }
	}

	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		let n_trees = self.trees.len().max(1).to_f32().unwrap();
		for (features, mut probabilities) in izip!(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0))
		) {
			probabilities.fill(0.0);
			for tree in self.trees.iter() {
				let leaf = tree.predict(features);
				for (probability, value) in probabilities.iter_mut().zip(leaf.iter()) {
					*probability += *value;
				}
			}
			probabilities /= n_trees;
		}
	}
}

#[test]
fn test_random_forest() {
	use crate::test_data::{accuracy, bands};
	let (features, labels) = bands(150);
	let options = RandomForestTrainOptions {
		n_trees: 25,
		seed: 7,
		..Default::default()
	};
	let model = RandomForestClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.trees.len(), 25);
	let mut probabilities = Array2::zeros((150, 3));
	model.predict(features.view(), probabilities.view_mut());
	for row in probabilities.axis_iter(Axis(0)) {
		assert!((row.sum() - 1.0).abs() < 1e-5);
	}
	assert!(accuracy(probabilities.view(), labels.view()) > 0.95);
	// Training is deterministic for a given seed.
	let again = RandomForestClassifier::train(features.view(), labels.view(), 3, &options);
	let mut probabilities_again = Array2::zeros((150, 3));
	again.predict(features.view(), probabilities_again.view_mut());
	assert_eq!(probabilities, probabilities_again);
}
