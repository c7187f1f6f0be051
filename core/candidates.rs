use crate::{
	config::ModelTrainerConfig,
	grid::{ParamSet, ParamValue},
	model::Classifier,
};
use anyhow::{bail, format_err, Result};
use bestfit_linear::MulticlassClassifier;
use bestfit_neighbors::{KNeighborsClassifier, KNeighborsTrainOptions};
use bestfit_tree::{
	AdaBoostClassifier, AdaBoostTrainOptions, DecisionTreeClassifier, DecisionTreeTrainOptions,
	GradientBoostingClassifier, GradientBoostingTrainOptions, ObliviousBoostingClassifier,
	ObliviousBoostingTrainOptions, RandomForestClassifier, RandomForestTrainOptions,
	SplitCriterion,
};
use indexmap::IndexMap;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// An untrained model and the options it will be trained with.
#[derive(Clone, Debug)]
pub enum Candidate {
	RandomForest(RandomForestTrainOptions),
	DecisionTree(DecisionTreeTrainOptions),
	GradientBoosting(GradientBoostingTrainOptions),
	LogisticRegression(bestfit_linear::TrainOptions),
	KNeighbors(KNeighborsTrainOptions),
	/// Gradient boosting configured with the defaults of XGBoost.
	XGBoost(GradientBoostingTrainOptions),
	/// Gradient boosting with oblivious trees, as CatBoost trains them.
	CatBoost(ObliviousBoostingTrainOptions),
	AdaBoost(AdaBoostTrainOptions),
}

#[derive(Clone, Debug)]
pub struct CandidateEntry {
	pub candidate: Candidate,
	/// Disabled entries stay in the registry but are never evaluated.
	pub enabled: bool,
}

/// The model registry, keyed by human readable model name, in evaluation order.
pub type Candidates = IndexMap<String, CandidateEntry>;

/// Build the registry of candidate models with their default options.
pub fn default_candidates(config: &ModelTrainerConfig) -> Candidates {
	let seed = config.seed;
	let entries = vec![
		(
			"Random Forest",
			Candidate::RandomForest(RandomForestTrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
		(
			"Decision Tree",
			Candidate::DecisionTree(DecisionTreeTrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
		(
			"Gradient Boosting",
			Candidate::GradientBoosting(GradientBoostingTrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
		(
			"Linear Regression",
			Candidate::LogisticRegression(bestfit_linear::TrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
		(
			"K-Neighbors Classifier",
			Candidate::KNeighbors(KNeighborsTrainOptions::default()),
			true,
		),
		(
			"XGBClassifier",
			Candidate::XGBoost(GradientBoostingTrainOptions {
				l2_regularization: 1.0,
				learning_rate: 0.3,
				max_depth: 6,
				seed,
				..Default::default()
			}),
			false,
		),
		(
			"CatBoosting Classifier",
			Candidate::CatBoost(ObliviousBoostingTrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
		(
			"AdaBoost Classifier",
			Candidate::AdaBoost(AdaBoostTrainOptions {
				seed,
				..Default::default()
			}),
			true,
		),
	];
	entries
		.into_iter()
		.map(|(name, candidate, enabled)| (name.to_owned(), CandidateEntry { candidate, enabled }))
		.collect()
}

impl Candidate {
	/// Return a copy of this candidate with the hyperparameters in `params` applied. Unknown parameter names and values of the wrong type are errors.
	pub fn with_params(&self, params: &ParamSet) -> Result<Candidate> {
		let mut candidate = self.clone();
		for (name, value) in params.iter() {
			match (&mut candidate, name.as_str()) {
				(Candidate::DecisionTree(options), "criterion") => {
					options.criterion = match text_param(name, value)? {
						"gini" => SplitCriterion::Gini,
						"entropy" => SplitCriterion::Entropy,
						criterion => bail!("unknown criterion \"{}\"", criterion),
					}
				}
				(Candidate::RandomForest(options), "n_estimators") => {
					options.n_trees = usize_param(name, value)?;
				}
				(Candidate::GradientBoosting(options), "learning_rate")
				| (Candidate::XGBoost(options), "learning_rate") => {
					options.learning_rate = f32_param(name, value)?;
				}
				(Candidate::GradientBoosting(options), "subsample")
				| (Candidate::XGBoost(options), "subsample") => {
					options.subsample = f32_param(name, value)?;
				}
				(Candidate::GradientBoosting(options), "n_estimators")
				| (Candidate::XGBoost(options), "n_estimators") => {
					options.n_rounds = usize_param(name, value)?;
				}
				(Candidate::KNeighbors(options), "n_neighbors") => {
					options.n_neighbors = usize_param(name, value)?;
				}
				(Candidate::CatBoost(options), "depth") => {
					options.depth = usize_param(name, value)?;
				}
				(Candidate::CatBoost(options), "learning_rate") => {
					options.learning_rate = f32_param(name, value)?;
				}
				(Candidate::CatBoost(options), "iterations") => {
					options.n_rounds = usize_param(name, value)?;
				}
				(Candidate::AdaBoost(options), "learning_rate") => {
					options.learning_rate = f32_param(name, value)?;
				}
				(Candidate::AdaBoost(options), "n_estimators") => {
					options.n_estimators = usize_param(name, value)?;
				}
				_ => bail!("unknown hyperparameter \"{}\"", name),
			}
		}
		Ok(candidate)
	}

	/// Train this candidate. `labels` holds class indexes less than `n_classes`.
	pub fn fit(
		&self,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
	) -> Result<Classifier> {
		let classifier = match self {
			Candidate::RandomForest(options) => Classifier::RandomForest(
				RandomForestClassifier::train(features, labels, n_classes, options),
			),
			Candidate::DecisionTree(options) => Classifier::DecisionTree(
				DecisionTreeClassifier::train(features, labels, n_classes, options),
			),
			Candidate::GradientBoosting(options) | Candidate::XGBoost(options) => {
				require_two_classes(n_classes)?;
				Classifier::GradientBoosting(GradientBoostingClassifier::train(
					features, labels, n_classes, options,
				))
			}
			Candidate::LogisticRegression(options) => {
				require_two_classes(n_classes)?;
				Classifier::LogisticRegression(MulticlassClassifier::train(
					features, labels, n_classes, options,
				))
			}
			Candidate::KNeighbors(options) => {
				if options.n_neighbors > features.nrows() {
					bail!(
						"n_neighbors is {} but there are only {} training examples",
						options.n_neighbors,
						features.nrows()
					);
				}
				Classifier::KNeighbors(KNeighborsClassifier::train(
					features, labels, n_classes, options,
				))
			}
			Candidate::CatBoost(options) => {
				require_two_classes(n_classes)?;
				Classifier::ObliviousBoosting(ObliviousBoostingClassifier::train(
					features, labels, n_classes, options,
				))
			}
			Candidate::AdaBoost(options) => Classifier::AdaBoost(AdaBoostClassifier::train(
				features, labels, n_classes, options,
			)),
		};
		Ok(classifier)
	}
}

fn require_two_classes(n_classes: usize) -> Result<()> {
	if n_classes < 2 {
		bail!(
			"at least 2 classes are required but the training targets have {}",
			n_classes
		);
	}
	Ok(())
}

fn usize_param(name: &str, value: &ParamValue) -> Result<usize> {
	match value {
		ParamValue::Int(value) if *value > 0 => Ok(value.to_usize().unwrap()),
		_ => Err(format_err!(
			"hyperparameter \"{}\" must be a positive integer, got {}",
			name,
			value
		)),
	}
}

fn f32_param(name: &str, value: &ParamValue) -> Result<f32> {
	let value = match value {
		ParamValue::Float(value) => value.to_f32(),
		ParamValue::Int(value) => value.to_f32(),
		ParamValue::Text(_) => None,
	};
	value
		.filter(|value| value.is_finite() && *value > 0.0)
		.ok_or_else(|| format_err!("hyperparameter \"{}\" must be a positive number", name))
}

fn text_param<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
	match value {
		ParamValue::Text(value) => Ok(value.as_str()),
		_ => Err(format_err!(
			"hyperparameter \"{}\" must be a string, got {}",
			name,
			value
		)),
	}
}

#[test]
fn test_default_candidates() {
	let candidates = default_candidates(&ModelTrainerConfig::default());
	let names: Vec<(&str, bool)> = candidates
		.iter()
		.map(|(name, entry)| (name.as_str(), entry.enabled))
		.collect();
	assert_eq!(
		names,
		vec![
			("Random Forest", true),
			("Decision Tree", true),
			("Gradient Boosting", true),
			("Linear Regression", true),
			("K-Neighbors Classifier", true),
			("XGBClassifier", false),
			("CatBoosting Classifier", true),
			("AdaBoost Classifier", true),
		]
	);
}

#[test]
fn test_with_params() {
	let mut params = ParamSet::new();
	params.insert("learning_rate".to_owned(), ParamValue::Float(0.05));
	params.insert("n_estimators".to_owned(), ParamValue::Int(16));
	let candidate = Candidate::GradientBoosting(GradientBoostingTrainOptions::default());
	match candidate.with_params(&params).unwrap() {
		Candidate::GradientBoosting(options) => {
			assert_eq!(options.learning_rate, 0.05);
			assert_eq!(options.n_rounds, 16);
			assert_eq!(options.max_depth, 3);
		}
		_ => panic!(),
	}
	let mut params = ParamSet::new();
	params.insert("criterion".to_owned(), ParamValue::Text("entropy".to_owned()));
	let candidate = Candidate::DecisionTree(DecisionTreeTrainOptions::default());
	match candidate.with_params(&params).unwrap() {
		Candidate::DecisionTree(options) => assert_eq!(options.criterion, SplitCriterion::Entropy),
		_ => panic!(),
	}
}

#[test]
fn test_with_invalid_params() {
	let candidate = Candidate::KNeighbors(KNeighborsTrainOptions::default());
	let mut params = ParamSet::new();
	params.insert("depth".to_owned(), ParamValue::Int(3));
	assert_eq!(
		candidate.with_params(&params).unwrap_err().to_string(),
		"unknown hyperparameter \"depth\""
	);
	let mut params = ParamSet::new();
	params.insert("n_neighbors".to_owned(), ParamValue::Float(3.0));
	assert!(candidate.with_params(&params).is_err());
	let mut params = ParamSet::new();
	params.insert("n_neighbors".to_owned(), ParamValue::Int(0));
	assert!(candidate.with_params(&params).is_err());
}

#[test]
fn test_fit_preconditions() {
	let features = arr2(&[[0.0], [1.0], [2.0]]);
	let labels = arr1(&[0, 0, 0]);
	let candidates = default_candidates(&ModelTrainerConfig::default());
	for name in &[
		"Gradient Boosting",
		"Linear Regression",
		"XGBClassifier",
		"CatBoosting Classifier",
		"K-Neighbors Classifier",
	] {
		let result = candidates[*name]
			.candidate
			.fit(features.view(), labels.view(), 1);
		assert!(result.is_err(), "{} should fail", name);
	}
	// Models that do not need two classes predict the only class.
	for name in &["Random Forest", "Decision Tree", "AdaBoost Classifier"] {
		let classifier = candidates[*name]
			.candidate
			.fit(features.view(), labels.view(), 1)
			.unwrap();
		assert_eq!(
			classifier.predict_class_indexes(features.view()),
			arr1(&[0, 0, 0])
		);
	}
}

#[test]
fn test_linear_regression_uses_config_seed() {
	let config = ModelTrainerConfig {
		seed: 7,
		..Default::default()
	};
	match &default_candidates(&config)["Linear Regression"].candidate {
		Candidate::LogisticRegression(options) => assert_eq!(options.seed, 7),
		_ => panic!(),
	}
}
