use itertools::Itertools;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use ordered_float::NotNan;
use rayon::prelude::*;
use std::{cmp::Ordering, collections::BTreeMap};

/// This is the maximum number of bins for valid values. Together with the bin reserved for invalid values, every bin index fits in a `u8`.
pub const MAX_VALID_BINS: usize = 255;

/// This is the maximum number of examples to consider when computing the bin thresholds for a feature.
const MAX_EXAMPLES_FOR_COMPUTING_BIN_THRESHOLDS: usize = 200_000;

/*
This struct specifies how to bin a feature.

The first bin is reserved for invalid values, and after that feature values are binned by comparing them with a set of thresholds. For example, given the thresholds `[0.5, 1.5, 2]`, the bins will be:
0. invalid values
1. (-infinity, 0.5]
2. (0.5, 1.5]
3. (1.5, 2]
4. (2, infinity)

A split at bin `b` sends bins `0..=b` to the left, which is the same as sending values `<= thresholds[b - 1]` to the left.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct BinningInstruction {
	pub thresholds: Vec<f32>,
}

impl BinningInstruction {
	pub fn n_bins(&self) -> usize {
		1 + self.n_valid_bins()
	}

	pub fn n_valid_bins(&self) -> usize {
		self.thresholds.len() + 1
	}

	/// Compute the bin for a single value.
	pub fn bin(&self, value: f32) -> u8 {
		if !value.is_finite() {
			return 0;
		}
		let n_thresholds_below = self
			.thresholds
			.partition_point(|threshold| *threshold < value);
		(n_thresholds_below + 1).to_u8().unwrap()
	}

	/// The split value for a split that sends bins `0..=bin_index` to the left. `bin_index` must be in `1..=thresholds.len()`.
	pub fn split_value(&self, bin_index: u8) -> f32 {
		self.thresholds[bin_index.to_usize().unwrap() - 1]
	}
}

/// Features binned according to their `BinningInstruction`s, stored column major.
#[derive(Debug)]
pub struct BinnedFeatures {
	pub columns: Vec<Vec<u8>>,
}

/// Compute the binning instructions for each column in `features`.
pub fn compute_binning_instructions(features: ArrayView2<f32>) -> Vec<BinningInstruction> {
	features
		.axis_iter(Axis(1))
		.into_par_iter()
		.map(compute_binning_instruction_for_feature)
		.collect()
}

fn compute_binning_instruction_for_feature(column: ArrayView1<f32>) -> BinningInstruction {
	// Create a histogram of values in the feature.
	let mut histogram: BTreeMap<NotNan<f32>, usize> = BTreeMap::new();
	let mut histogram_values_count = 0;
	for value in column.iter().take(MAX_EXAMPLES_FOR_COMPUTING_BIN_THRESHOLDS) {
		if !value.is_finite() {
			continue;
		}
		if let Ok(value) = NotNan::new(*value) {
			*histogram.entry(value).or_insert(0) += 1;
			histogram_values_count += 1;
		}
	}
	// If the number of unique values is less than `MAX_VALID_BINS`, then create one bin per unique value. Otherwise, create bins at quantiles.
	let thresholds = if histogram.len() < MAX_VALID_BINS {
		histogram
			.keys()
			.tuple_windows()
			.map(|(a, b)| (a.into_inner() + b.into_inner()) / 2.0)
			.collect()
	} else {
		compute_thresholds_as_quantiles_from_histogram(histogram, histogram_values_count)
	};
	BinningInstruction { thresholds }
}

/// Compute the thresholds for a feature as quantiles from the histogram of its values.
fn compute_thresholds_as_quantiles_from_histogram(
	histogram: BTreeMap<NotNan<f32>, usize>,
	histogram_values_count: usize,
) -> Vec<f32> {
	let total_values_count = histogram_values_count.to_f32().unwrap();
	let quantiles: Vec<f32> = (1..MAX_VALID_BINS)
		.map(|i| i.to_f32().unwrap() / MAX_VALID_BINS.to_f32().unwrap())
		.collect();
	let quantile_indexes: Vec<usize> = quantiles
		.iter()
		.map(|q| ((total_values_count - 1.0) * q).trunc().to_usize().unwrap())
		.collect();
	let quantile_fracts: Vec<f32> = quantiles
		.iter()
		.map(|q| ((total_values_count - 1.0) * q).fract())
		.collect();
	let mut quantiles: Vec<Option<f32>> = vec![None; quantiles.len()];
	let mut current_count: usize = 0;
	let mut iter = histogram.iter().peekable();
	while let Some((value, count)) = iter.next() {
		let value = value.into_inner();
		current_count += count;
		let quantiles_iter = quantiles
			.iter_mut()
			.zip(quantile_indexes.iter().zip(quantile_fracts.iter()))
			.filter(|(q, (_, _))| q.is_none());
		for (quantile, (index, fract)) in quantiles_iter {
			match (current_count - 1).cmp(index) {
				Ordering::Equal => {
					if *fract > 0.0 {
						let next_value = iter
							.peek()
							.map(|(next_value, _)| next_value.into_inner())
							.unwrap_or(value);
						*quantile = Some(value * (1.0 - fract) + next_value * fract);
					} else {
						*quantile = Some(value);
					}
				}
				Ordering::Greater => *quantile = Some(value),
				Ordering::Less => {}
			}
		}
	}
	let mut thresholds: Vec<f32> = quantiles.into_iter().flatten().collect();
	thresholds.dedup();
	thresholds
}

/// Compute the binned features based on the binning instructions.
pub fn compute_binned_features(
	features: ArrayView2<f32>,
	binning_instructions: &[BinningInstruction],
) -> BinnedFeatures {
	let columns = features
		.axis_iter(Axis(1))
		.into_par_iter()
		.zip(binning_instructions.par_iter())
		.map(|(column, binning_instruction)| {
			column
				.iter()
				.map(|value| binning_instruction.bin(*value))
				.collect()
		})
		.collect();
	BinnedFeatures { columns }
}

#[test]
fn test_bin() {
	let binning_instruction = BinningInstruction {
		thresholds: vec![0.5, 1.5, 2.0],
	};
	assert_eq!(binning_instruction.n_bins(), 5);
	assert_eq!(binning_instruction.bin(f32::NAN), 0);
	assert_eq!(binning_instruction.bin(f32::INFINITY), 0);
	assert_eq!(binning_instruction.bin(-3.0), 1);
	assert_eq!(binning_instruction.bin(0.5), 1);
	assert_eq!(binning_instruction.bin(0.6), 2);
	assert_eq!(binning_instruction.bin(2.0), 3);
	assert_eq!(binning_instruction.bin(2.1), 4);
	// A split at bin 2 sends values <= 1.5 left.
	assert_eq!(binning_instruction.split_value(2), 1.5);
}

#[test]
fn test_thresholds_for_few_unique_values() {
	let features = arr2(&[[1.0], [3.0], [f32::NAN], [3.0], [2.0]]);
	let binning_instructions = compute_binning_instructions(features.view());
	assert_eq!(binning_instructions[0].thresholds, vec![1.5, 2.5]);
	let binned_features = compute_binned_features(features.view(), &binning_instructions);
	assert_eq!(binned_features.columns, vec![vec![1, 3, 0, 3, 2]]);
}

#[test]
fn test_thresholds_for_many_unique_values() {
	let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
	let features = Array2::from_shape_vec((1000, 1), values).unwrap();
	let binning_instructions = compute_binning_instructions(features.view());
	let thresholds = &binning_instructions[0].thresholds;
	assert_eq!(thresholds.len(), MAX_VALID_BINS - 1);
	assert!(thresholds.windows(2).all(|pair| pair[0] < pair[1]));
	let binned_features = compute_binned_features(features.view(), &binning_instructions);
	assert_eq!(binned_features.columns[0][0], 1);
	assert_eq!(binned_features.columns[0][999], 255);
}
