use crate::{
	boosting::{predict_boosted, train_boosted, BoostingOptions},
	oblivious_tree::{train_oblivious_tree, ObliviousTree, ObliviousTreeOptions},
};
use ndarray::prelude::*;

/// This struct represents a boosted classifier made of oblivious trees, in the style of CatBoost. Boosting works exactly as in [`GradientBoostingClassifier`](struct.GradientBoostingClassifier.html), but every tree is symmetric: all nodes at a given depth share the same split.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ObliviousBoostingClassifier {
	pub biases: Vec<f32>,
	/// It has length `n_rounds * n_classes`, in round-major order.
	pub trees: Vec<ObliviousTree>,
	pub n_classes: usize,
}

#[derive(Clone, Debug)]
pub struct ObliviousBoostingTrainOptions {
	/// Each tree has at most this many levels and `2^depth` leaves.
	pub depth: usize,
	pub l2_regularization: f32,
	pub learning_rate: f32,
	pub n_rounds: usize,
	pub subsample: f32,
	pub seed: u64,
}

impl Default for ObliviousBoostingTrainOptions {
	fn default() -> Self {
		Self {
			depth: 6,
			l2_regularization: 3.0,
			learning_rate: 0.1,
			n_rounds: 100,
			subsample: 1.0,
			seed: 0,
		}
	}
}

impl ObliviousBoostingClassifier {
	/// Train an oblivious boosted classifier. `labels` holds 0-indexed classes and there must be at least two classes.
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &ObliviousBoostingTrainOptions,
	) -> Self {
		let tree_options = ObliviousTreeOptions {
			depth: options.depth,
			l2_regularization: options.l2_regularization,
			learning_rate: options.learning_rate,
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
				train_oblivious_tree(
					round_input.binned_features,
					round_input.binning_instructions,
					round_input.examples,
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
fn test_oblivious_boosting() {
	use crate::test_data::{accuracy, bands};
	let (features, labels) = bands(150);
	let options = ObliviousBoostingTrainOptions {
		n_rounds: 30,
		..Default::default()
	};
	let model = ObliviousBoostingClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.trees.len(), 90);
	assert!(model.trees.iter().all(|tree| tree.splits.len() <= 6));
	let mut probabilities = Array2::zeros((150, 3));
	model.predict(features.view(), probabilities.view_mut());
	assert!(accuracy(probabilities.view(), labels.view()) > 0.95);
}
