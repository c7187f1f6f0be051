/*!
This crate implements a brute-force k-nearest-neighbors classifier, [`KNeighborsClassifier`](struct.KNeighborsClassifier.html).

Training stores a copy of the training data. To predict an example, its Euclidean distance to every training example is computed, and each of the `n_neighbors` closest training examples casts one vote for its class. Ties in distance are broken in favor of the training example that comes first. Rows are predicted in parallel.
*/

#![allow(clippy::tabs_in_doc_comments)]

use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::BinaryHeap;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct KNeighborsClassifier {
	pub n_neighbors: usize,
	pub n_classes: usize,
	/// (n_examples, n_features)
	pub features: Array2<f32>,
	/// (n_examples)
	pub labels: Array1<usize>,
}

#[derive(Clone, Debug)]
pub struct KNeighborsTrainOptions {
	pub n_neighbors: usize,
}

impl Default for KNeighborsTrainOptions {
	fn default() -> Self {
		Self { n_neighbors: 5 }
	}
}

impl KNeighborsClassifier {
	/// If `n_neighbors` exceeds the number of training examples, every training example votes.
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &KNeighborsTrainOptions,
	) -> Self {
		Self {
			n_neighbors: options.n_neighbors.max(1),
			n_classes,
			features: features.to_owned(),
			labels: labels.to_owned(),
		}
	}

	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0)),
		)
			.into_par_iter()
			.for_each(|(features, mut probabilities)| {
				probabilities.fill(0.0);
				let neighbors = self.nearest_neighbors(features);
				let n_neighbors = neighbors.len().max(1).to_f32().unwrap();
				for neighbor_index in neighbors {
					probabilities[self.labels[neighbor_index]] += 1.0;
				}
				probabilities /= n_neighbors;
			});
	}

	/// Return the indexes of the `n_neighbors` training examples closest to `example`.
	fn nearest_neighbors(&self, example: ArrayView1<f32>) -> Vec<usize> {
		// This is a max heap of the closest examples seen so far, so the farthest of them is on top.
		let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> =
			BinaryHeap::with_capacity(self.n_neighbors + 1);
		for (index, training_example) in self.features.axis_iter(Axis(0)).enumerate() {
			let candidate = (OrderedFloat(squared_distance(example, training_example)), index);
			if heap.len() < self.n_neighbors {
				heap.push(candidate);
			} else if heap.peek().map(|top| candidate < *top).unwrap_or(false) {
				heap.pop();
				heap.push(candidate);
			}
		}
		heap.into_sorted_vec()
			.into_iter()
			.map(|(_, index)| index)
			.collect()
	}
}

/// Features where either value is invalid do not contribute to the distance.
fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
	let mut sum = 0.0;
	for (a, b) in izip!(a.iter(), b.iter()) {
		if a.is_finite() && b.is_finite() {
			let difference = a - b;
			sum += difference * difference;
		}
	}
	sum
}

#[cfg(test)]
fn predict_classes(model: &KNeighborsClassifier, features: ArrayView2<f32>) -> Vec<usize> {
	let mut probabilities = Array2::zeros((features.nrows(), model.n_classes));
	model.predict(features, probabilities.view_mut());
	probabilities
		.axis_iter(Axis(0))
		.map(|row| {
			let mut best = 0;
			for (index, probability) in row.iter().enumerate() {
				if *probability > row[best] {
					best = index;
				}
			}
			best
		})
		.collect()
}

#[test]
fn test_k_neighbors_classifier() {
	let features = arr2(&[
		[0.0, 0.0],
		[0.1, 0.0],
		[0.0, 0.1],
		[5.0, 5.0],
		[5.1, 5.0],
		[5.0, 5.1],
	]);
	let labels = arr1(&[0, 0, 0, 1, 1, 1]);
	let model = KNeighborsClassifier::train(
		features.view(),
		labels.view(),
		2,
		&KNeighborsTrainOptions { n_neighbors: 3 },
	);
	let test = arr2(&[[0.2, 0.2], [4.8, 4.9], [f32::NAN, 5.0]]);
	assert_eq!(predict_classes(&model, test.view()), vec![0, 1, 1]);
	let mut probabilities = Array2::zeros((1, 2));
	model.predict(arr2(&[[0.05, 0.05]]).view(), probabilities.view_mut());
	assert_eq!(probabilities, arr2(&[[1.0, 0.0]]));
}

#[test]
fn test_vote_fractions() {
	let features = arr2(&[[0.0], [1.0], [2.0], [10.0], [11.0]]);
	let labels = arr1(&[0, 0, 1, 1, 1]);
	let model = KNeighborsClassifier::train(
		features.view(),
		labels.view(),
		2,
		&KNeighborsTrainOptions::default(),
	);
	// With five neighbors, every training example votes.
	let mut probabilities = Array2::zeros((1, 2));
	model.predict(arr2(&[[0.0]]).view(), probabilities.view_mut());
	assert_eq!(probabilities, arr2(&[[0.4, 0.6]]));
}

#[test]
fn test_distance_ties_prefer_earlier_examples() {
	let features = arr2(&[[1.0], [-1.0], [1.0]]);
	let labels = arr1(&[1, 0, 1]);
	let model = KNeighborsClassifier::train(
		features.view(),
		labels.view(),
		2,
		&KNeighborsTrainOptions { n_neighbors: 1 },
	);
	assert_eq!(model.nearest_neighbors(arr1(&[0.0]).view()), vec![0]);
	let model = KNeighborsClassifier {
		n_neighbors: 2,
		..model
	};
	assert_eq!(model.nearest_neighbors(arr1(&[0.0]).view()), vec![0, 1]);
}
