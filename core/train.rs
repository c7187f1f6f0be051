use crate::{
	candidates::default_candidates,
	config::ModelTrainerConfig,
	dataset::Dataset,
	error::{Error, ErrorKind, InvocationContext},
	evaluate::{DefaultEvaluator, Evaluator, ScoreReport},
	model::Model,
};
use anyhow::format_err;
use bestfit_metrics::{RegressionMetrics, RegressionMetricsInput, StreamingMetric};
use ndarray::prelude::*;

/// The best candidate must score at least this much for a model to be written.
pub const MIN_ACCEPTABLE_SCORE: f32 = 0.6;

/// `ModelTrainer` evaluates the candidate models on a dataset, keeps the best, and writes it to disk.
pub struct ModelTrainer<E = DefaultEvaluator> {
	config: ModelTrainerConfig,
	evaluator: E,
}

impl ModelTrainer<DefaultEvaluator> {
	pub fn new(config: ModelTrainerConfig) -> Self {
		let evaluator = DefaultEvaluator::new(&config);
		ModelTrainer { config, evaluator }
	}
}

impl<E: Evaluator> ModelTrainer<E> {
	pub fn with_evaluator(config: ModelTrainerConfig, evaluator: E) -> Self {
		ModelTrainer { config, evaluator }
	}

	pub fn config(&self) -> &ModelTrainerConfig {
		&self.config
	}

	/**
	Select the best model for the given training and test partitions, write it to the configured artifact path, and return the R² of its predictions on the test partition.

	The last column of `train` and `test` is the target and the preceding columns are the features. The candidates are treated as classifiers, and a candidate's score is its accuracy on `test`. Training fails without writing anything if the best score is below [`MIN_ACCEPTABLE_SCORE`](constant.MIN_ACCEPTABLE_SCORE.html).
	*/
	pub fn train_best(&self, train: ArrayView2<f32>, test: ArrayView2<f32>) -> Result<f32, Error> {
		self.train_best_inner(train, test).map_err(|kind| Error {
			kind,
			context: InvocationContext {
				train_shape: train.dim(),
				test_shape: test.dim(),
				artifact_path: self.config.trained_model_file_path.clone(),
			},
		})
	}

	fn train_best_inner(
		&self,
		train: ArrayView2<f32>,
		test: ArrayView2<f32>,
	) -> Result<f32, ErrorKind> {
		let dataset = Dataset::new(train, test)?;
		tracing::info!(
			n_train = dataset.features_train.nrows(),
			n_test = dataset.features_test.nrows(),
			n_features = dataset.n_features(),
			n_classes = dataset.n_classes(),
			"split training and test input data"
		);

		// Evaluate every enabled candidate.
		let candidates = default_candidates(&self.config);
		let mut evaluation = self
			.evaluator
			.evaluate(&dataset, &candidates)
			.map_err(ErrorKind::Model)?;

		// Choose the best candidate and make sure it is good enough.
		let (name, score) = match choose_best(&evaluation.scores) {
			Some((name, score)) if score >= MIN_ACCEPTABLE_SCORE => (name.to_owned(), score),
			best => {
				return Err(ErrorKind::NoAdequateModel {
					best_model: best.map(|(name, _)| name.to_owned()),
					best_score: best.map(|(_, score)| score),
					threshold: MIN_ACCEPTABLE_SCORE,
				})
			}
		};
		tracing::info!(
			model = name.as_str(),
			score,
			"best found model on both training and testing dataset"
		);
		let classifier = evaluation.models.shift_remove(&name).ok_or_else(|| {
			ErrorKind::Model(format_err!(
				"the evaluator scored \"{}\" but returned no model for it",
				name
			))
		})?;
		let model = Model {
			name,
			score,
			n_features: dataset.n_features(),
			classes: dataset.classes.clone(),
			classifier,
		};

		// Write the model.
		let path = &self.config.trained_model_file_path;
		model
			.to_file(path)
			.map_err(|source| ErrorKind::Persistence {
				path: path.clone(),
				source,
			})?;

		// Compute the R² of the predicted target values on the test partition.
		let predictions = model
			.predict(dataset.features_test.view())
			.map_err(ErrorKind::Model)?;
		let mut metrics = RegressionMetrics::new();
		metrics.update(RegressionMetricsInput {
			predictions: predictions.view(),
			labels: dataset.targets_test.view(),
		});
		let metrics = metrics.finalize();
		tracing::info!(
			r2 = metrics.r2,
			mse = metrics.mse,
			rmse = metrics.rmse,
			mae = metrics.mae,
			baseline_mse = metrics.baseline_mse,
			baseline_rmse = metrics.baseline_rmse,
			"computed test metrics of the best model"
		);
		Ok(metrics.r2)
	}
}

/// Return the name and score of the entry with the highest score. Ties go to the first entry, and entries whose score is NaN are never chosen.
pub fn choose_best(scores: &ScoreReport) -> Option<(&str, f32)> {
	let mut best: Option<(&str, f32)> = None;
	for (name, score) in scores.iter() {
		if score.is_nan() {
			continue;
		}
		let is_better = best
			.map(|(_, best_score)| *score > best_score)
			.unwrap_or(true);
		if is_better {
			best = Some((name.as_str(), *score));
		}
	}
	best
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		candidates::Candidates,
		evaluate::Evaluation,
		model::Classifier,
	};
	use bestfit_tree::{DecisionTreeClassifier, DecisionTreeTrainOptions};
	use indexmap::IndexMap;
	use std::{cell::Cell, path::Path};

	/// An evaluator that reports fixed scores. Every model it returns is a decision tree trained on the dataset.
	struct FixedScores {
		scores: Vec<(&'static str, f32)>,
		n_calls: Cell<usize>,
	}

	impl FixedScores {
		fn new(scores: &[(&'static str, f32)]) -> Self {
			FixedScores {
				scores: scores.to_vec(),
				n_calls: Cell::new(0),
			}
		}
	}

	impl Evaluator for FixedScores {
		fn evaluate(&self, dataset: &Dataset, _: &Candidates) -> anyhow::Result<Evaluation> {
			self.n_calls.set(self.n_calls.get() + 1);
			let mut scores = ScoreReport::new();
			let mut models = IndexMap::new();
			for (name, score) in self.scores.iter() {
				let classifier = DecisionTreeClassifier::train(
					dataset.features_train.view(),
					dataset.labels_train.view(),
					dataset.n_classes(),
					&DecisionTreeTrainOptions::default(),
				);
				scores.insert(name.to_string(), *score);
				models.insert(name.to_string(), Classifier::DecisionTree(classifier));
			}
			Ok(Evaluation { scores, models })
		}
	}

	/// Three classes with target values 1, 2, and 3 that are separable on the first of four features.
	fn partitions(n_train: usize, n_test: usize) -> (Array2<f32>, Array2<f32>) {
		let mut train = Array2::zeros((n_train, 5));
		let mut test = Array2::zeros((n_test, 5));
		for (i, mut row) in train
			.axis_iter_mut(Axis(0))
			.chain(test.axis_iter_mut(Axis(0)))
			.enumerate()
		{
			let class = (i % 3) as f32;
			row[0] = class * 5.0 + ((i * 7) % 5) as f32 * 0.2;
			row[1] = ((i * 13) % 7) as f32;
			row[2] = ((i * 3) % 11) as f32 - 5.0;
			row[3] = 1.0;
			row[4] = class + 1.0;
		}
		(train, test)
	}

	fn config(path: &Path) -> ModelTrainerConfig {
		ModelTrainerConfig {
			trained_model_file_path: path.to_owned(),
			..Default::default()
		}
	}

	#[test]
	fn test_choose_best() {
		let scores: ScoreReport = vec![("A", 0.9), ("B", 0.95), ("C", 0.2)]
			.into_iter()
			.map(|(name, score)| (name.to_owned(), score))
			.collect();
		assert_eq!(choose_best(&scores), Some(("B", 0.95)));
		let scores: ScoreReport = vec![("A", f32::NAN), ("B", 0.7), ("C", 0.7)]
			.into_iter()
			.map(|(name, score)| (name.to_owned(), score))
			.collect();
		assert_eq!(choose_best(&scores), Some(("B", 0.7)));
		assert_eq!(choose_best(&ScoreReport::new()), None);
	}

	#[test]
	fn test_selects_the_highest_score() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("artifacts").join("model.bestfit");
		let (train, test) = partitions(60, 15);
		let trainer = ModelTrainer::with_evaluator(
			config(&path),
			FixedScores::new(&[("A", 0.9), ("B", 0.95), ("C", 0.2)]),
		);
		let r2 = trainer.train_best(train.view(), test.view()).unwrap();
		assert!(r2.is_finite());
		let model = Model::from_path(&path).unwrap();
		assert_eq!(model.name, "B");
		assert_eq!(model.score, 0.95);
		assert_eq!(model.n_features, 4);
		assert_eq!(model.classes, vec![1.0, 2.0, 3.0]);
	}

	#[test]
	fn test_ties_go_to_the_first_candidate() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		let (train, test) = partitions(30, 9);
		let trainer = ModelTrainer::with_evaluator(
			config(&path),
			FixedScores::new(&[("A", 0.8), ("B", 0.8)]),
		);
		for _ in 0..3 {
			trainer.train_best(train.view(), test.view()).unwrap();
			assert_eq!(Model::from_path(&path).unwrap().name, "A");
		}
	}

	#[test]
	fn test_no_adequate_model() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("artifacts").join("model.bestfit");
		let (train, test) = partitions(30, 9);
		let trainer = ModelTrainer::with_evaluator(
			config(&path),
			FixedScores::new(&[("A", 0.5), ("B", 0.4)]),
		);
		let error = trainer.train_best(train.view(), test.view()).unwrap_err();
		match error.kind {
			ErrorKind::NoAdequateModel {
				best_model,
				best_score,
				threshold,
			} => {
				assert_eq!(best_model.as_deref(), Some("A"));
				assert_eq!(best_score, Some(0.5));
				assert_eq!(threshold, MIN_ACCEPTABLE_SCORE);
			}
			kind => panic!("unexpected error {}", kind),
		}
		assert_eq!(error.context.train_shape, (30, 5));
		assert!(!path.exists());
		assert!(!path.parent().unwrap().exists());
	}

	#[test]
	fn test_score_at_the_threshold_is_accepted() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		let (train, test) = partitions(30, 9);
		let trainer = ModelTrainer::with_evaluator(
			config(&path),
			FixedScores::new(&[("A", MIN_ACCEPTABLE_SCORE)]),
		);
		assert!(trainer.train_best(train.view(), test.view()).is_ok());
		assert!(path.exists());
	}

	#[test]
	fn test_mismatched_shapes_fail_before_evaluation() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		let train = Array2::<f32>::zeros((100, 5));
		let test = Array2::<f32>::zeros((20, 4));
		let trainer =
			ModelTrainer::with_evaluator(config(&path), FixedScores::new(&[("A", 1.0)]));
		let error = trainer.train_best(train.view(), test.view()).unwrap_err();
		assert!(matches!(error.kind, ErrorKind::InputShape(_)));
		assert_eq!(error.context.test_shape, (20, 4));
		assert_eq!(trainer.evaluator.n_calls.get(), 0);
		assert!(!path.exists());
	}

	#[test]
	fn test_reinvocation_overwrites_the_artifact() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		let (train, test) = partitions(30, 9);
		ModelTrainer::with_evaluator(config(&path), FixedScores::new(&[("A", 0.9), ("B", 0.7)]))
			.train_best(train.view(), test.view())
			.unwrap();
		assert_eq!(Model::from_path(&path).unwrap().name, "A");
		ModelTrainer::with_evaluator(config(&path), FixedScores::new(&[("A", 0.7), ("B", 0.9)]))
			.train_best(train.view(), test.view())
			.unwrap();
		assert_eq!(Model::from_path(&path).unwrap().name, "B");
	}

	#[test]
	fn test_persistence_failure() {
		let dir = tempfile::tempdir().unwrap();
		// A file where a directory is needed makes the artifact path unwritable.
		let blocker = dir.path().join("blocker");
		std::fs::write(&blocker, b"").unwrap();
		let path = blocker.join("model.bestfit");
		let (train, test) = partitions(30, 9);
		let trainer =
			ModelTrainer::with_evaluator(config(&path), FixedScores::new(&[("A", 0.9)]));
		let error = trainer.train_best(train.view(), test.view()).unwrap_err();
		assert!(matches!(error.kind, ErrorKind::Persistence { .. }));
		assert!(std::error::Error::source(&error).is_some());
	}

	#[test]
	fn test_train_best() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("artifacts").join("model.bestfit");
		let (train, test) = partitions(100, 20);
		let trainer = ModelTrainer::new(config(&path));
		let r2 = trainer.train_best(train.view(), test.view()).unwrap();
		// Every candidate separates the classes, so the predictions are exact.
		assert_eq!(r2, 1.0);
		let model = Model::from_path(&path).unwrap();
		assert_eq!(model.name, "Random Forest");
		assert_eq!(model.score, 1.0);
		let features = test.slice(s![.., ..4]);
		assert_eq!(model.predict(features).unwrap(), test.column(4));
	}

	#[test]
	fn test_constant_targets_fail_in_the_evaluator() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		let (mut train, test) = partitions(30, 9);
		train.column_mut(4).fill(1.0);
		let trainer = ModelTrainer::new(ModelTrainerConfig {
			parallel: false,
			..config(&path)
		});
		let error = trainer.train_best(train.view(), test.view()).unwrap_err();
		assert!(matches!(error.kind, ErrorKind::Model(_)));
		assert!(!path.exists());
	}

	#[test]
	fn test_train_best_two_classes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bestfit");
		// Four features followed by a 0 or 1 target that every feature separates.
		let partition = |n_rows: usize| {
			Array2::from_shape_fn((n_rows, 5), |(i, j)| {
				let class = (i % 2) as f32;
				if j == 4 {
					class
				} else {
					class * 10.0 + j as f32
				}
			})
		};
		let (train, test) = (partition(100), partition(20));
		let trainer = ModelTrainer::new(config(&path));
		let r2 = trainer.train_best(train.view(), test.view()).unwrap();
		assert_eq!(r2, 1.0);
		assert_eq!(Model::from_path(&path).unwrap().classes, vec![0.0, 1.0]);
	}
}
