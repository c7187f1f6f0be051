use crate::{
	candidates::{Candidate, Candidates},
	config::ModelTrainerConfig,
	dataset::Dataset,
	grid::{default_search_spaces, expand_search_space, SearchSpace},
	model::Classifier,
};
use anyhow::{Context, Result};
use bestfit_metrics::{Accuracy, StreamingMetric};
use indexmap::IndexMap;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// The score of each evaluated candidate, keyed by name, in registry order. Higher is better.
pub type ScoreReport = IndexMap<String, f32>;

/// The result of evaluating the enabled candidates in a registry. `scores` and `models` have the same keys in the same order.
#[derive(Debug)]
pub struct Evaluation {
	pub scores: ScoreReport,
	pub models: IndexMap<String, Classifier>,
}

/// An `Evaluator` fits every enabled candidate on the training partition of a dataset and scores it on the test partition.
pub trait Evaluator {
	fn evaluate(&self, dataset: &Dataset, candidates: &Candidates) -> Result<Evaluation>;
}

/// Scores candidates by their accuracy on the test partition.
pub struct DefaultEvaluator {
	pub parallel: bool,
	/// The hyperparameters to search for each candidate, keyed by candidate name. Candidates without an entry are trained with their defaults.
	pub search_spaces: IndexMap<String, SearchSpace>,
	/// The seed for shuffling the training partition before the comparison set is held out.
	pub seed: u64,
}

/// The fraction of the training partition held out to compare hyperparameter combinations.
const COMPARISON_FRACTION: f32 = 0.1;

impl DefaultEvaluator {
	pub fn new(config: &ModelTrainerConfig) -> Self {
		let search_spaces = if config.hyperparameter_search {
			default_search_spaces()
		} else {
			IndexMap::new()
		};
		Self {
			parallel: config.parallel,
			search_spaces,
			seed: config.seed,
		}
	}

	fn evaluate_candidate(
		&self,
		name: &str,
		candidate: &Candidate,
		dataset: &Dataset,
	) -> Result<(f32, Classifier)> {
		let candidate = match self.search_spaces.get(name) {
			Some(search_space) => search(name, candidate, dataset, search_space, self.seed)?,
			None => candidate.clone(),
		};
		let classifier = candidate.fit(
			dataset.features_train.view(),
			dataset.labels_train.view(),
			dataset.n_classes(),
		)?;
		let score = accuracy(
			&classifier,
			dataset.features_test.view(),
			dataset.labels_test.view(),
		);
		tracing::debug!(model = name, score, "scored candidate");
		Ok((score, classifier))
	}
}

impl Evaluator for DefaultEvaluator {
	fn evaluate(&self, dataset: &Dataset, candidates: &Candidates) -> Result<Evaluation> {
		let enabled: Vec<(&String, &Candidate)> = candidates
			.iter()
			.filter(|(_, entry)| entry.enabled)
			.map(|(name, entry)| (name, &entry.candidate))
			.collect();
		let evaluate = |(name, candidate): &(&String, &Candidate)| {
			self.evaluate_candidate(name, candidate, dataset)
				.with_context(|| format!("failed to evaluate candidate \"{}\"", name))
		};
		let results: Vec<Result<(f32, Classifier)>> = if self.parallel {
			enabled.par_iter().map(evaluate).collect()
		} else {
			enabled.iter().map(evaluate).collect()
		};
		let mut scores = ScoreReport::new();
		let mut models = IndexMap::new();
		for ((name, _), result) in enabled.iter().zip(results) {
			let (score, classifier) = result?;
			scores.insert((*name).clone(), score);
			models.insert((*name).clone(), classifier);
		}
		Ok(Evaluation { scores, models })
	}
}

/// A split of the training partition into the examples used to fit each hyperparameter combination and the comparison set used to rank them.
struct ComparisonSplit {
	features_train: Array2<f32>,
	labels_train: Array1<usize>,
	features_comparison: Array2<f32>,
	labels_comparison: Array1<usize>,
}

/// Shuffle the training partition with `seed` and hold out `COMPARISON_FRACTION` of it as the comparison set. Returns `None` if either side would be empty.
fn comparison_split(dataset: &Dataset, seed: u64) -> Option<ComparisonSplit> {
	let n_train = dataset.features_train.nrows();
	let n_comparison = (COMPARISON_FRACTION * n_train.to_f32().unwrap())
		.to_usize()
		.unwrap();
	if n_comparison == 0 || n_comparison == n_train {
		return None;
	}
	let mut indexes: Vec<usize> = (0..n_train).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	indexes.shuffle(&mut rng);
	let (train_indexes, comparison_indexes) = indexes.split_at(n_train - n_comparison);
	Some(ComparisonSplit {
		features_train: dataset.features_train.select(Axis(0), train_indexes),
		labels_train: dataset.labels_train.select(Axis(0), train_indexes),
		features_comparison: dataset.features_train.select(Axis(0), comparison_indexes),
		labels_comparison: dataset.labels_train.select(Axis(0), comparison_indexes),
	})
}

/// Choose the combination in `search_space` with the best accuracy on the comparison set. Ties go to the first combination.
fn search(
	name: &str,
	candidate: &Candidate,
	dataset: &Dataset,
	search_space: &SearchSpace,
	seed: u64,
) -> Result<Candidate> {
	let param_sets = expand_search_space(search_space);
	let split = match comparison_split(dataset, seed) {
		Some(split) => split,
		None => {
			tracing::debug!(
				model = name,
				n_train = dataset.features_train.nrows(),
				"too few training examples to search hyperparameters"
			);
			// The parameters are still checked so an invalid search space is always an error.
			for params in param_sets.iter() {
				candidate.with_params(params)?;
			}
			return Ok(candidate.clone());
		}
	};
	let mut best: Option<(f32, Candidate)> = None;
	for params in param_sets.iter() {
		let combination = candidate.with_params(params)?;
		let classifier = combination.fit(
			split.features_train.view(),
			split.labels_train.view(),
			dataset.n_classes(),
		)?;
		let score = accuracy(
			&classifier,
			split.features_comparison.view(),
			split.labels_comparison.view(),
		);
		tracing::debug!(model = name, params = ?params, score, "scored hyperparameter combination");
		let is_better = best
			.as_ref()
			.map(|(best_score, _)| score > *best_score)
			.unwrap_or(true);
		if is_better {
			best = Some((score, combination));
		}
	}
	Ok(best
		.map(|(_, combination)| combination)
		.unwrap_or_else(|| candidate.clone()))
}

fn accuracy(classifier: &Classifier, features: ArrayView2<f32>, labels: ArrayView1<usize>) -> f32 {
	let predictions = classifier.predict_class_indexes(features);
	let mut metric = Accuracy::new();
	for (prediction, label) in predictions.iter().zip(labels.iter()) {
		metric.update((*prediction, *label));
	}
	metric.finalize().unwrap_or(0.0)
}

#[cfg(test)]
fn separable_dataset() -> Dataset {
	let mut train = Array2::zeros((60, 3));
	let mut test = Array2::zeros((15, 3));
	for (i, mut row) in train
		.axis_iter_mut(Axis(0))
		.chain(test.axis_iter_mut(Axis(0)))
		.enumerate()
	{
		let class = (i % 3) as f32;
		row[0] = class * 4.0 + ((i * 7) % 5) as f32 * 0.1;
		row[1] = ((i * 13) % 7) as f32;
		row[2] = class + 1.0;
	}
	Dataset::new(train.view(), test.view()).unwrap()
}

#[test]
fn test_default_evaluator() {
	let dataset = separable_dataset();
	let config = ModelTrainerConfig::default();
	let candidates = crate::candidates::default_candidates(&config);
	let evaluation = DefaultEvaluator::new(&config)
		.evaluate(&dataset, &candidates)
		.unwrap();
	let names: Vec<&str> = evaluation.scores.keys().map(|name| name.as_str()).collect();
	assert_eq!(
		names,
		vec![
			"Random Forest",
			"Decision Tree",
			"Gradient Boosting",
			"Linear Regression",
			"K-Neighbors Classifier",
			"CatBoosting Classifier",
			"AdaBoost Classifier",
		]
	);
	assert!(evaluation.models.keys().eq(evaluation.scores.keys()));
	for (name, score) in evaluation.scores.iter() {
		assert!(*score > 0.9, "{} scored {}", name, score);
	}
}

#[test]
fn test_parallel_and_sequential_agree() {
	let dataset = separable_dataset();
	let config = ModelTrainerConfig::default();
	let candidates = crate::candidates::default_candidates(&config);
	let parallel = DefaultEvaluator::new(&config)
		.evaluate(&dataset, &candidates)
		.unwrap();
	let sequential = DefaultEvaluator::new(&ModelTrainerConfig {
		parallel: false,
		..config
	})
	.evaluate(&dataset, &candidates)
	.unwrap();
	assert_eq!(parallel.scores, sequential.scores);
}

#[test]
fn test_candidate_failure_names_the_candidate() {
	let train = arr2(&[[0.0, 1.0], [1.0, 1.0], [2.0, 1.0]]);
	let test = arr2(&[[0.5, 1.0]]);
	let dataset = Dataset::new(train.view(), test.view()).unwrap();
	let config = ModelTrainerConfig::default();
	let candidates = crate::candidates::default_candidates(&config);
	let error = DefaultEvaluator::new(&config)
		.evaluate(&dataset, &candidates)
		.unwrap_err();
	// Gradient Boosting is the first candidate in the registry that needs two classes.
	assert_eq!(
		error.to_string(),
		"failed to evaluate candidate \"Gradient Boosting\""
	);
}

#[test]
fn test_hyperparameter_search() {
	let dataset = separable_dataset();
	let config = ModelTrainerConfig::default();
	let mut search_spaces = IndexMap::new();
	let mut search_space = SearchSpace::new();
	search_space.insert(
		"n_neighbors".to_owned(),
		vec![
			crate::grid::ParamValue::Int(3),
			crate::grid::ParamValue::Int(5),
		],
	);
	search_spaces.insert("K-Neighbors Classifier".to_owned(), search_space);
	let evaluator = DefaultEvaluator {
		parallel: false,
		search_spaces,
		seed: config.seed,
	};
	let mut candidates = crate::candidates::default_candidates(&config);
	candidates.retain(|name, _| name == "K-Neighbors Classifier");
	let evaluation = evaluator.evaluate(&dataset, &candidates).unwrap();
	assert_eq!(evaluation.scores["K-Neighbors Classifier"], 1.0);
	match &evaluation.models["K-Neighbors Classifier"] {
		// Five neighbors never does better than three on the comparison set, so the first wins.
		Classifier::KNeighbors(model) => assert_eq!(model.n_neighbors, 3),
		_ => panic!(),
	}
	// An unknown hyperparameter is an error.
	let mut search_space = SearchSpace::new();
	search_space.insert(
		"depth".to_owned(),
		vec![crate::grid::ParamValue::Int(3)],
	);
	let mut search_spaces = IndexMap::new();
	search_spaces.insert("K-Neighbors Classifier".to_owned(), search_space);
	let evaluator = DefaultEvaluator {
		parallel: false,
		search_spaces,
		seed: config.seed,
	};
	assert!(evaluator.evaluate(&dataset, &candidates).is_err());
}

#[test]
fn test_comparison_split_with_sorted_labels() {
	// 45, 45, and 10 training examples of classes 0, 1, and 2, in that order.
	let mut train = Array2::zeros((100, 3));
	for (i, mut row) in train.axis_iter_mut(Axis(0)).enumerate() {
		let class = if i < 45 { 0.0 } else if i < 90 { 1.0 } else { 2.0 };
		row[0] = class * 3.0 + (i % 5) as f32 * 0.1;
		row[1] = class;
		row[2] = class;
	}
	let test = train.slice(s![..10, ..]).to_owned();
	let dataset = Dataset::new(train.view(), test.view()).unwrap();
	let split = comparison_split(&dataset, 42).unwrap();
	assert_eq!(split.features_train.nrows(), 90);
	assert_eq!(split.labels_comparison.len(), 10);
	for class in 0..3 {
		assert!(split.labels_train.iter().any(|label| *label == class));
	}
	assert!(split.labels_comparison.iter().any(|label| *label != 2));
	// Each row keeps its label.
	for (row, label) in split
		.features_comparison
		.axis_iter(Axis(0))
		.zip(split.labels_comparison.iter())
	{
		assert_eq!(row[1], *label as f32);
	}
	// The same seed gives the same split.
	let again = comparison_split(&dataset, 42).unwrap();
	assert_eq!(split.labels_comparison, again.labels_comparison);
	// Nine examples are too few to hold any out.
	let small = Dataset::new(train.slice(s![..9, ..]), test.view()).unwrap();
	assert!(comparison_split(&small, 42).is_none());
}
