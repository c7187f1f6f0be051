use crate::{
	binning::{BinnedFeatures, BinningInstruction},
	regression_tree::{compute_gain, compute_leaf_value, compute_negative_loss},
};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// An oblivious tree uses the same split for every node at a given depth, so a tree of depth `d` is a list of `d` splits and `2^d` leaf values. The leaf for an example is found by reading its split directions as the bits of the leaf index, most significant first.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ObliviousTree {
	pub splits: Vec<ObliviousSplit>,
	pub leaf_values: Vec<f32>,
}

/// Values <= `split_value` and invalid values go left (bit 0), all others go right (bit 1).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ObliviousSplit {
	pub feature_index: usize,
	pub split_value: f32,
}

impl ObliviousTree {
	pub fn predict(&self, features: ArrayView1<f32>) -> f32 {
		let mut leaf_index = 0;
		for split in self.splits.iter() {
			let value = features[split.feature_index];
			let goes_right = value.is_finite() && value > split.split_value;
			leaf_index = 2 * leaf_index + if goes_right { 1 } else { 0 };
		}
		self.leaf_values[leaf_index]
	}
}

#[derive(Clone, Debug)]
pub struct ObliviousTreeOptions {
	pub depth: usize,
	pub l2_regularization: f32,
	pub learning_rate: f32,
}

/// Grow an oblivious tree level by level. At each level, the split is the (feature, bin) pair whose gain summed over all current leaves is largest. Growth stops early if no split has positive gain.
pub fn train_oblivious_tree(
	binned_features: &BinnedFeatures,
	binning_instructions: &[BinningInstruction],
	examples: &[usize],
	gradients: ArrayView1<f32>,
	hessians: ArrayView1<f32>,
	options: &ObliviousTreeOptions,
) -> ObliviousTree {
	let l2_regularization = options.l2_regularization;
	// For each example in `examples`, the index of the leaf it is currently in.
	let mut leaf_indexes = vec![0usize; examples.len()];
	let mut splits: Vec<ObliviousSplit> = Vec::with_capacity(options.depth);
	for _ in 0..options.depth {
		let n_leaves = 1 << splits.len();
		let (leaf_sum_gradients, leaf_sum_hessians) =
			compute_leaf_sums(examples, &leaf_indexes, gradients, hessians, n_leaves);
		let negative_loss_leaves: Vec<f32> = leaf_sum_gradients
			.iter()
			.zip(leaf_sum_hessians.iter())
			.map(|(g, h)| compute_negative_loss(*g, *h, l2_regularization))
			.collect();
		let mut best: Option<(usize, u8, f32)> = None;
		for (feature_index, column) in binned_features.columns.iter().enumerate() {
			let n_bins = binning_instructions[feature_index].n_bins();
			// (n_leaves, n_bins) gradient and hessian sums.
			let mut bin_sum_gradients = vec![0.0f64; n_leaves * n_bins];
			let mut bin_sum_hessians = vec![0.0f64; n_leaves * n_bins];
			for (example, leaf_index) in examples.iter().zip(leaf_indexes.iter()) {
				let offset = leaf_index * n_bins + column[*example].to_usize().unwrap();
				bin_sum_gradients[offset] += gradients[*example].to_f64().unwrap();
				bin_sum_hessians[offset] += hessians[*example].to_f64().unwrap();
			}
			let mut left_sum_gradients = vec![0.0f64; n_leaves];
			let mut left_sum_hessians = vec![0.0f64; n_leaves];
			for bin_index in 0..n_bins - 1 {
				for leaf_index in 0..n_leaves {
					left_sum_gradients[leaf_index] += bin_sum_gradients[leaf_index * n_bins + bin_index];
					left_sum_hessians[leaf_index] += bin_sum_hessians[leaf_index * n_bins + bin_index];
				}
				if bin_index == 0 {
					continue;
				}
				let gain: f32 = izip!(
					left_sum_gradients.iter(),
					left_sum_hessians.iter(),
					leaf_sum_gradients.iter(),
					leaf_sum_hessians.iter(),
					negative_loss_leaves.iter()
				)
				.map(|(left_g, left_h, g, h, negative_loss)| {
					compute_gain(
						*left_g,
						*left_h,
						g - left_g,
						h - left_h,
						*negative_loss,
						l2_regularization,
					)
				})
				.sum();
				let is_better = best
					.map(|(_, _, best_gain)| gain > best_gain)
					.unwrap_or(gain > 0.0);
				if is_better {
					best = Some((feature_index, bin_index.to_u8().unwrap(), gain));
				}
			}
		}
		let (feature_index, bin_index) = match best {
			Some((feature_index, bin_index, _)) => (feature_index, bin_index),
			None => break,
		};
		let column = &binned_features.columns[feature_index];
		for (example, leaf_index) in examples.iter().zip(leaf_indexes.iter_mut()) {
			let goes_right = column[*example] > bin_index;
			*leaf_index = 2 * *leaf_index + if goes_right { 1 } else { 0 };
		}
		splits.push(ObliviousSplit {
			feature_index,
			split_value: binning_instructions[feature_index].split_value(bin_index),
		});
	}
	let n_leaves = 1 << splits.len();
	let (leaf_sum_gradients, leaf_sum_hessians) =
		compute_leaf_sums(examples, &leaf_indexes, gradients, hessians, n_leaves);
	let leaf_values = leaf_sum_gradients
		.iter()
		.zip(leaf_sum_hessians.iter())
		.map(|(g, h)| compute_leaf_value(*g, *h, l2_regularization, options.learning_rate))
		.collect();
	ObliviousTree {
		splits,
		leaf_values,
	}
}

fn compute_leaf_sums(
	examples: &[usize],
	leaf_indexes: &[usize],
	gradients: ArrayView1<f32>,
	hessians: ArrayView1<f32>,
	n_leaves: usize,
) -> (Vec<f64>, Vec<f64>) {
	let mut sum_gradients = vec![0.0; n_leaves];
	let mut sum_hessians = vec![0.0; n_leaves];
	for (example, leaf_index) in examples.iter().zip(leaf_indexes.iter()) {
		sum_gradients[*leaf_index] += gradients[*example].to_f64().unwrap();
		sum_hessians[*leaf_index] += hessians[*example].to_f64().unwrap();
	}
	(sum_gradients, sum_hessians)
}

#[test]
fn test_oblivious_tree_predict() {
	let tree = ObliviousTree {
		splits: vec![
			ObliviousSplit {
				feature_index: 0,
				split_value: 0.0,
			},
			ObliviousSplit {
				feature_index: 1,
				split_value: 10.0,
			},
		],
		leaf_values: vec![0.0, 1.0, 2.0, 3.0],
	};
	assert_eq!(tree.predict(arr1(&[-1.0, 5.0]).view()), 0.0);
	assert_eq!(tree.predict(arr1(&[-1.0, 15.0]).view()), 1.0);
	assert_eq!(tree.predict(arr1(&[1.0, 5.0]).view()), 2.0);
	assert_eq!(tree.predict(arr1(&[1.0, f32::NAN]).view()), 2.0);
	assert_eq!(tree.predict(arr1(&[1.0, 15.0]).view()), 3.0);
}

#[test]
fn test_train_oblivious_tree() {
	use crate::binning::{compute_binned_features, compute_binning_instructions};
	// The gradient depends on both features, so two levels are needed to fit it.
	let features = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
	let gradients = arr1(&[-3.0, -1.0, 1.0, 3.0]);
	let hessians = arr1(&[1.0, 1.0, 1.0, 1.0]);
	let binning_instructions = compute_binning_instructions(features.view());
	let binned_features = compute_binned_features(features.view(), &binning_instructions);
	let options = ObliviousTreeOptions {
		depth: 4,
		l2_regularization: 0.0,
		learning_rate: 1.0,
	};
	let tree = train_oblivious_tree(
		&binned_features,
		&binning_instructions,
		&[0, 1, 2, 3],
		gradients.view(),
		hessians.view(),
		&options,
	);
	// Feature 0 explains the most, then feature 1, then nothing is left to split.
	assert_eq!(tree.splits.len(), 2);
	assert_eq!(tree.splits[0].feature_index, 0);
	assert_eq!(tree.splits[1].feature_index, 1);
	for (row, gradient) in features.axis_iter(Axis(0)).zip(gradients.iter()) {
		assert!((tree.predict(row) + gradient).abs() < 1e-6);
	}
}
