use crate::{
	binning::{BinnedFeatures, BinningInstruction},
	BranchNode, LeafNode, Node, Tree,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;

/// A split will only be chosen if it decreases the weighted impurity by more than this value.
const MIN_DECREASE_IN_IMPURITY: f64 = 1e-7;

/// The function used to measure the impurity of the class distribution at a node.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
	Gini,
	Entropy,
}

impl SplitCriterion {
	fn impurity(self, class_weights: &[f64], total_weight: f64) -> f64 {
		if total_weight <= 0.0 {
			return 0.0;
		}
		match self {
			SplitCriterion::Gini => {
				1.0 - class_weights
					.iter()
					.map(|weight| {
						let p = weight / total_weight;
						p * p
					})
					.sum::<f64>()
			}
			SplitCriterion::Entropy => class_weights
				.iter()
				.filter(|weight| **weight > 0.0)
				.map(|weight| {
					let p = weight / total_weight;
					-p * p.log2()
				})
				.sum(),
		}
	}
}

pub struct ClassificationTreeOptions {
	pub criterion: SplitCriterion,
	/// If `None`, nodes are expanded until they are pure or too small to split.
	pub max_depth: Option<usize>,
	pub min_examples_per_leaf: usize,
	/// If `Some`, this many randomly chosen features are considered at each split.
	pub max_features: Option<usize>,
}

#[derive(Debug)]
struct Split {
	feature_index: usize,
	bin_index: u8,
	decrease_in_impurity: f64,
}

struct ClassificationTreeTrainer<'a> {
	binned_features: &'a BinnedFeatures,
	binning_instructions: &'a [BinningInstruction],
	labels: ArrayView1<'a, usize>,
	weights: &'a [f32],
	n_classes: usize,
	options: &'a ClassificationTreeOptions,
	nodes: Vec<Node<Vec<f32>>>,
}

/// Train a single classification tree whose leaves hold class probabilities. Examples with a weight of zero are ignored, which lets callers express bootstrap samples as integer weights.
pub fn train_classification_tree(
	binned_features: &BinnedFeatures,
	binning_instructions: &[BinningInstruction],
	labels: ArrayView1<usize>,
	weights: &[f32],
	n_classes: usize,
	options: &ClassificationTreeOptions,
	rng: &mut Xoshiro256Plus,
) -> Tree<Vec<f32>> {
	let examples: Vec<usize> = (0..labels.len()).filter(|i| weights[*i] > 0.0).collect();
	let mut trainer = ClassificationTreeTrainer {
		binned_features,
		binning_instructions,
		labels: labels.view(),
		weights,
		n_classes,
		options,
		nodes: Vec::new(),
	};
	trainer.grow(examples, 0, rng);
	Tree {
		nodes: trainer.nodes,
	}
}

impl<'a> ClassificationTreeTrainer<'a> {
	/// Add the node for `examples` and its descendants, returning the node's index.
	fn grow(&mut self, examples: Vec<usize>, depth: usize, rng: &mut Xoshiro256Plus) -> usize {
		let node_index = self.nodes.len();
		let class_weights = self.compute_class_weights(&examples);
		let total_weight: f64 = class_weights.iter().sum();
		let impurity = self.options.criterion.impurity(&class_weights, total_weight);
		let depth_allows_split = self
			.options
			.max_depth
			.map(|max_depth| depth < max_depth)
			.unwrap_or(true);
		let can_split = depth_allows_split
			&& impurity > 0.0
			&& examples.len() >= 2 * self.options.min_examples_per_leaf.max(1);
		let split = if can_split {
			self.choose_best_split(&examples, &class_weights, impurity, total_weight, rng)
		} else {
			None
		};
		let split = match split {
			Some(split) => split,
			None => {
				self.nodes.push(Node::Leaf(LeafNode {
					value: class_probabilities(&class_weights, total_weight),
				}));
				return node_index;
			}
		};
		// Add the branch now so it precedes its children, and fill in the child indexes once they exist.
		self.nodes.push(Node::Branch(BranchNode {
			feature_index: split.feature_index,
			split_value: self.binning_instructions[split.feature_index].split_value(split.bin_index),
			left_child_index: 0,
			right_child_index: 0,
		}));
		let column = &self.binned_features.columns[split.feature_index];
		let (left_examples, right_examples): (Vec<usize>, Vec<usize>) = examples
			.into_iter()
			.partition(|example| column[*example] <= split.bin_index);
		let left_child_index = self.grow(left_examples, depth + 1, rng);
		let right_child_index = self.grow(right_examples, depth + 1, rng);
		if let Node::Branch(branch) = &mut self.nodes[node_index] {
			branch.left_child_index = left_child_index;
			branch.right_child_index = right_child_index;
		}
		node_index
	}

	fn compute_class_weights(&self, examples: &[usize]) -> Vec<f64> {
		let mut class_weights = vec![0.0; self.n_classes];
		for example in examples {
			class_weights[self.labels[*example]] += self.weights[*example].to_f64().unwrap();
		}
		class_weights
	}

	fn choose_best_split(
		&self,
		examples: &[usize],
		class_weights: &[f64],
		impurity: f64,
		total_weight: f64,
		rng: &mut Xoshiro256Plus,
	) -> Option<Split> {
		let n_features = self.binned_features.columns.len();
		let mut feature_indexes: Vec<usize> = (0..n_features).collect();
		// Features are visited in random order. Once `max_features` have been considered, the search stops at the first feature where a valid split has been found.
		let max_features = match self.options.max_features {
			Some(max_features) if max_features < n_features => {
				feature_indexes.shuffle(rng);
				max_features.max(1)
			}
			_ => n_features,
		};
		let n_classes = self.n_classes;
		let criterion = self.options.criterion;
		let min_examples_per_leaf = self.options.min_examples_per_leaf.max(1);
		let mut best_split: Option<Split> = None;
		for (n_visited, feature_index) in feature_indexes.into_iter().enumerate() {
			if n_visited >= max_features && best_split.is_some() {
				break;
			}
			let column = &self.binned_features.columns[feature_index];
			let n_bins = self.binning_instructions[feature_index].n_bins();
			// Aggregate the class weights and example counts in each bin.
			let mut bin_class_weights = vec![0.0f64; n_bins * n_classes];
			let mut bin_counts = vec![0usize; n_bins];
			for example in examples {
				let bin_index = column[*example].to_usize().unwrap();
				bin_counts[bin_index] += 1;
				bin_class_weights[bin_index * n_classes + self.labels[*example]] +=
					self.weights[*example].to_f64().unwrap();
			}
			// Scan the bins from left to right, moving each bin's statistics into the left child.
			let mut left_class_weights = vec![0.0f64; n_classes];
			let mut right_class_weights = vec![0.0f64; n_classes];
			let mut left_count = 0;
			for bin_index in 0..n_bins - 1 {
				left_count += bin_counts[bin_index];
				for class_index in 0..n_classes {
					left_class_weights[class_index] +=
						bin_class_weights[bin_index * n_classes + class_index];
				}
				// Bin 0 holds invalid values, which always go left, so it cannot be a split point on its own.
				if bin_index == 0 {
					continue;
				}
				let right_count = examples.len() - left_count;
				if left_count < min_examples_per_leaf || right_count < min_examples_per_leaf {
					continue;
				}
				for class_index in 0..n_classes {
					right_class_weights[class_index] =
						(class_weights[class_index] - left_class_weights[class_index]).max(0.0);
				}
				let left_weight: f64 = left_class_weights.iter().sum();
				let right_weight: f64 = right_class_weights.iter().sum();
				let left_impurity = criterion.impurity(&left_class_weights, left_weight);
				let right_impurity = criterion.impurity(&right_class_weights, right_weight);
				let decrease_in_impurity = impurity * total_weight
					- left_impurity * left_weight
					- right_impurity * right_weight;
				if decrease_in_impurity <= MIN_DECREASE_IN_IMPURITY {
					continue;
				}
				let is_better = best_split
					.as_ref()
					.map(|best_split| decrease_in_impurity > best_split.decrease_in_impurity)
					.unwrap_or(true);
				if is_better {
					best_split = Some(Split {
						feature_index,
						bin_index: bin_index.to_u8().unwrap(),
						decrease_in_impurity,
					});
				}
			}
		}
		best_split
	}
}

fn class_probabilities(class_weights: &[f64], total_weight: f64) -> Vec<f32> {
	let n_classes = class_weights.len();
	if total_weight <= 0.0 {
		return vec![1.0 / n_classes.to_f32().unwrap(); n_classes];
	}
	class_weights
		.iter()
		.map(|weight| (weight / total_weight).to_f32().unwrap())
		.collect()
}

#[test]
fn test_impurity() {
	assert!((SplitCriterion::Gini.impurity(&[1.0, 1.0], 2.0) - 0.5).abs() < 1e-12);
	assert!((SplitCriterion::Entropy.impurity(&[1.0, 1.0], 2.0) - 1.0).abs() < 1e-12);
	assert_eq!(SplitCriterion::Gini.impurity(&[3.0, 0.0], 3.0), 0.0);
	assert_eq!(SplitCriterion::Entropy.impurity(&[3.0, 0.0], 3.0), 0.0);
}

#[test]
fn test_weighted_examples() {
	use crate::binning::{compute_binned_features, compute_binning_instructions};
	use rand::SeedableRng;
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let labels = arr1(&[0, 0, 1, 1]);
	let binning_instructions = compute_binning_instructions(features.view());
	let binned_features = compute_binned_features(features.view(), &binning_instructions);
	let options = ClassificationTreeOptions {
		criterion: SplitCriterion::Gini,
		max_depth: None,
		min_examples_per_leaf: 1,
		max_features: None,
	};
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	// The zero-weighted examples are left out, so a single pure leaf remains.
	let tree = train_classification_tree(
		&binned_features,
		&binning_instructions,
		labels.view(),
		&[1.0, 2.0, 0.0, 0.0],
		2,
		&options,
		&mut rng,
	);
	assert_eq!(tree.nodes.len(), 1);
	assert_eq!(tree.predict(arr1(&[4.0]).view()), &vec![1.0, 0.0]);
	// With every example present, one split separates the classes.
	let tree = train_classification_tree(
		&binned_features,
		&binning_instructions,
		labels.view(),
		&[1.0; 4],
		2,
		&options,
		&mut rng,
	);
	assert_eq!(tree.n_leaves(), 2);
	assert_eq!(tree.predict(arr1(&[2.0]).view()), &vec![1.0, 0.0]);
	assert_eq!(tree.predict(arr1(&[3.0]).view()), &vec![0.0, 1.0]);
}
