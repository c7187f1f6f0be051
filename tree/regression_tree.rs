use crate::{
	binning::{BinnedFeatures, BinningInstruction},
	BranchNode, LeafNode, Node, Tree,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// These options control how the boosters grow each tree.
#[derive(Clone, Debug)]
pub struct RegressionTreeOptions {
	pub l2_regularization: f32,
	pub learning_rate: f32,
	pub max_depth: usize,
	pub min_examples_per_leaf: usize,
	pub min_gain_to_split: f32,
	pub min_sum_hessians_per_leaf: f32,
}

#[derive(Debug)]
struct Split {
	feature_index: usize,
	bin_index: u8,
	gain: f32,
}

struct RegressionTreeTrainer<'a> {
	binned_features: &'a BinnedFeatures,
	binning_instructions: &'a [BinningInstruction],
	gradients: ArrayView1<'a, f32>,
	hessians: ArrayView1<'a, f32>,
	options: &'a RegressionTreeOptions,
	nodes: Vec<Node<f32>>,
}

/// Train a tree on the gradients and hessians of the loss for the examples in `examples`. Each leaf holds the Newton step for the examples that reach it, scaled by the learning rate.
pub fn train_regression_tree(
	binned_features: &BinnedFeatures,
	binning_instructions: &[BinningInstruction],
	examples: Vec<usize>,
	gradients: ArrayView1<f32>,
	hessians: ArrayView1<f32>,
	options: &RegressionTreeOptions,
) -> Tree<f32> {
	let mut trainer = RegressionTreeTrainer {
		binned_features,
		binning_instructions,
		gradients: gradients.view(),
		hessians: hessians.view(),
		options,
		nodes: Vec::new(),
	};
	trainer.grow(examples, 0);
	Tree {
		nodes: trainer.nodes,
	}
}

impl<'a> RegressionTreeTrainer<'a> {
	fn grow(&mut self, examples: Vec<usize>, depth: usize) -> usize {
		let node_index = self.nodes.len();
		let (sum_gradients, sum_hessians) = examples.iter().fold((0.0, 0.0), |sums, example| {
			(
				sums.0 + self.gradients[*example].to_f64().unwrap(),
				sums.1 + self.hessians[*example].to_f64().unwrap(),
			)
		});
		let can_split = depth < self.options.max_depth
			&& examples.len() >= 2 * self.options.min_examples_per_leaf.max(1);
		let split = if can_split {
			self.choose_best_split(&examples, sum_gradients, sum_hessians)
		} else {
			None
		};
		let split = match split {
			Some(split) => split,
			None => {
				self.nodes.push(Node::Leaf(LeafNode {
					value: compute_leaf_value(
						sum_gradients,
						sum_hessians,
						self.options.l2_regularization,
						self.options.learning_rate,
					),
				}));
				return node_index;
			}
		};
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
		let left_child_index = self.grow(left_examples, depth + 1);
		let right_child_index = self.grow(right_examples, depth + 1);
		if let Node::Branch(branch) = &mut self.nodes[node_index] {
			branch.left_child_index = left_child_index;
			branch.right_child_index = right_child_index;
		}
		node_index
	}

	fn choose_best_split(
		&self,
		examples: &[usize],
		sum_gradients: f64,
		sum_hessians: f64,
	) -> Option<Split> {
		let l2_regularization = self.options.l2_regularization;
		let min_examples_per_leaf = self.options.min_examples_per_leaf.max(1);
		let min_sum_hessians_per_leaf = self.options.min_sum_hessians_per_leaf.to_f64().unwrap();
		let negative_loss_current_node =
			compute_negative_loss(sum_gradients, sum_hessians, l2_regularization);
		let mut best_split: Option<Split> = None;
		for (feature_index, column) in self.binned_features.columns.iter().enumerate() {
			let n_bins = self.binning_instructions[feature_index].n_bins();
			let mut bin_stats = vec![(0.0f64, 0.0f64, 0usize); n_bins];
			for example in examples {
				let bin_stats = &mut bin_stats[column[*example].to_usize().unwrap()];
				bin_stats.0 += self.gradients[*example].to_f64().unwrap();
				bin_stats.1 += self.hessians[*example].to_f64().unwrap();
				bin_stats.2 += 1;
			}
			let mut left_sum_gradients = 0.0f64;
			let mut left_sum_hessians = 0.0f64;
			let mut left_n_examples = 0usize;
			for (bin_index, (bin_sum_gradients, bin_sum_hessians, bin_n_examples)) in
				bin_stats.iter().enumerate().take(n_bins - 1)
			{
				left_sum_gradients += bin_sum_gradients;
				left_sum_hessians += bin_sum_hessians;
				left_n_examples += bin_n_examples;
				if bin_index == 0 {
					continue;
				}
				let right_n_examples = examples.len() - left_n_examples;
				let right_sum_gradients = sum_gradients - left_sum_gradients;
				let right_sum_hessians = sum_hessians - left_sum_hessians;
				if left_n_examples < min_examples_per_leaf
					|| right_n_examples < min_examples_per_leaf
					|| left_sum_hessians < min_sum_hessians_per_leaf
					|| right_sum_hessians < min_sum_hessians_per_leaf
				{
					continue;
				}
				let gain = compute_gain(
					left_sum_gradients,
					left_sum_hessians,
					right_sum_gradients,
					right_sum_hessians,
					negative_loss_current_node,
					l2_regularization,
				);
				if gain <= self.options.min_gain_to_split {
					continue;
				}
				let is_better = best_split
					.as_ref()
					.map(|best_split| gain > best_split.gain)
					.unwrap_or(true);
				if is_better {
					best_split = Some(Split {
						feature_index,
						bin_index: bin_index.to_u8().unwrap(),
						gain,
					});
				}
			}
		}
		best_split
	}
}

/// The gain of a split is the decrease in loss from replacing the current node with its two children.
pub fn compute_gain(
	sum_gradients_left: f64,
	sum_hessians_left: f64,
	sum_gradients_right: f64,
	sum_hessians_right: f64,
	negative_loss_current_node: f32,
	l2_regularization: f32,
) -> f32 {
	let left = compute_negative_loss(sum_gradients_left, sum_hessians_left, l2_regularization);
	let right = compute_negative_loss(sum_gradients_right, sum_hessians_right, l2_regularization);
	left + right - negative_loss_current_node
}

/// The negative loss is used to compute the gain of a given split.
pub fn compute_negative_loss(sum_gradients: f64, sum_hessians: f64, l2_regularization: f32) -> f32 {
	let denominator = sum_hessians + l2_regularization.to_f64().unwrap();
	if denominator <= 0.0 {
		return 0.0;
	}
	((sum_gradients * sum_gradients) / denominator)
		.to_f32()
		.unwrap()
}

pub fn compute_leaf_value(
	sum_gradients: f64,
	sum_hessians: f64,
	l2_regularization: f32,
	learning_rate: f32,
) -> f32 {
	(-learning_rate.to_f64().unwrap() * sum_gradients
		/ (sum_hessians + l2_regularization.to_f64().unwrap() + std::f64::EPSILON))
		.to_f32()
		.unwrap()
}

#[test]
fn test_regression_tree_splits_on_gradient_sign() {
	use crate::binning::{compute_binned_features, compute_binning_instructions};
	let features = arr2(&[[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [3.0, 5.0]]);
	let gradients = arr1(&[1.0, 1.0, -1.0, -1.0]);
	let hessians = arr1(&[1.0, 1.0, 1.0, 1.0]);
	let binning_instructions = compute_binning_instructions(features.view());
	let binned_features = compute_binned_features(features.view(), &binning_instructions);
	let options = RegressionTreeOptions {
		l2_regularization: 0.0,
		learning_rate: 1.0,
		max_depth: 3,
		min_examples_per_leaf: 1,
		min_gain_to_split: 0.0,
		min_sum_hessians_per_leaf: 1e-3,
	};
	let tree = train_regression_tree(
		&binned_features,
		&binning_instructions,
		(0..4).collect(),
		gradients.view(),
		hessians.view(),
		&options,
	);
	// The only useful split separates the positive and negative gradients, after which every leaf is constant and no further split has positive gain.
	assert_eq!(tree.n_leaves(), 2);
	assert!((tree.predict(arr1(&[0.5, 5.0]).view()) + 1.0).abs() < 1e-6);
	assert!((tree.predict(arr1(&[2.5, 5.0]).view()) - 1.0).abs() < 1e-6);
}
