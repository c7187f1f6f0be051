/*!
This crate implements machine learning models for classification using decision trees and ensembles of them: [`DecisionTreeClassifier`](struct.DecisionTreeClassifier.html), [`RandomForestClassifier`](struct.RandomForestClassifier.html), [`GradientBoostingClassifier`](struct.GradientBoostingClassifier.html), [`ObliviousBoostingClassifier`](struct.ObliviousBoostingClassifier.html), and [`AdaBoostClassifier`](struct.AdaBoostClassifier.html).

Every model bins its features before training. Each feature's values are mapped to at most 255 bins, and splits are chosen by scanning bin statistics instead of sorted values. If a feature has fewer unique values than bins, every unique value gets its own bin and the splits are exact.

Non-finite feature values are "invalid". They are placed in bin 0 during training and are always sent to the left child when making predictions.

Models expect labels to be 0-indexed class indices and write predicted probabilities into an array with shape `(n_examples, n_classes)`.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;

mod adaboost;
mod binning;
mod boosting;
mod classification_tree;
mod decision_tree;
mod gradient_boosting;
mod oblivious_boosting;
mod oblivious_tree;
mod random_forest;
mod regression_tree;

pub use self::adaboost::{AdaBoostClassifier, AdaBoostTrainOptions};
pub use self::classification_tree::SplitCriterion;
pub use self::decision_tree::{DecisionTreeClassifier, DecisionTreeTrainOptions};
pub use self::gradient_boosting::{GradientBoostingClassifier, GradientBoostingTrainOptions};
pub use self::oblivious_boosting::{ObliviousBoostingClassifier, ObliviousBoostingTrainOptions};
pub use self::oblivious_tree::{ObliviousSplit, ObliviousTree};
pub use self::random_forest::{RandomForestClassifier, RandomForestTrainOptions};

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children. The root is at index 0.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Tree<T> {
	pub nodes: Vec<Node<T>>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Node<T> {
	Branch(BranchNode),
	Leaf(LeafNode<T>),
}

/// A `BranchNode` compares the value of a single feature with `split_value`. If the value is <= `split_value` or invalid, the example is sent left, otherwise it is sent right.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BranchNode {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f32,
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
}

/// The leaves in a tree hold the values to output for examples that get sent to them. Classification trees store class probabilities, and the trees trained by the boosters store a single logit.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LeafNode<T> {
	pub value: T,
}

impl<T> Tree<T> {
	/// Find the leaf a single example lands in and return its value.
	pub fn predict(&self, features: ArrayView1<f32>) -> &T {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					feature_index,
					split_value,
					left_child_index,
					right_child_index,
				}) => {
					let value = features[*feature_index];
					node_index = if !value.is_finite() || value <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				Node::Leaf(LeafNode { value }) => return value,
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes
			.iter()
			.filter(|node| matches!(node, Node::Leaf(_)))
			.count()
	}
}

/// Return the index of the first maximum value.
fn argmax(values: &[f32]) -> usize {
	let mut best = 0;
	for (index, value) in values.iter().enumerate() {
		if *value > values[best] {
			best = index;
		}
	}
	best
}

#[cfg(test)]
mod test_data {
	use ndarray::prelude::*;

	/// Three classes arranged in bands along the first feature. The second feature is noise.
	pub fn bands(n_examples: usize) -> (Array2<f32>, Array1<usize>) {
		let mut features = Array2::zeros((n_examples, 2));
		let mut labels = Array1::zeros(n_examples);
		for i in 0..n_examples {
			let x = i as f32 / n_examples as f32;
			features[(i, 0)] = x;
			features[(i, 1)] = ((i * 7919) % 13) as f32;
			labels[i] = if x < 0.33 {
				0
			} else if x < 0.66 {
				1
			} else {
				2
			};
		}
		(features, labels)
	}

	pub fn accuracy(probabilities: ArrayView2<f32>, labels: ArrayView1<usize>) -> f32 {
		let correct = probabilities
			.axis_iter(Axis(0))
			.zip(labels.iter())
			.filter(|(probabilities, label)| {
				super::argmax(probabilities.as_slice().unwrap()) == **label
			})
			.count();
		correct as f32 / labels.len() as f32
	}
}

#[test]
fn test_tree_predict() {
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				feature_index: 1,
				split_value: 0.5,
				left_child_index: 1,
				right_child_index: 2,
			}),
			Node::Leaf(LeafNode { value: -1.0 }),
			Node::Leaf(LeafNode { value: 1.0 }),
		],
	};
	assert_eq!(*tree.predict(arr1(&[9.0, 0.5]).view()), -1.0);
	assert_eq!(*tree.predict(arr1(&[9.0, 0.6]).view()), 1.0);
	assert_eq!(*tree.predict(arr1(&[9.0, f32::NAN]).view()), -1.0);
	assert_eq!(tree.n_leaves(), 2);
}

#[test]
fn test_argmax_takes_first_maximum() {
	assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
	assert_eq!(argmax(&[0.5]), 0);
}
