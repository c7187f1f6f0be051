use anyhow::{bail, format_err, Context, Result};
use bestfit_linear::MulticlassClassifier;
use bestfit_neighbors::KNeighborsClassifier;
use bestfit_tree::{
	AdaBoostClassifier, DecisionTreeClassifier, GradientBoostingClassifier,
	ObliviousBoostingClassifier, RandomForestClassifier,
};
use ndarray::prelude::*;
use std::{
	io::{Read, Write},
	path::Path,
};

/// The major version written as the first byte of every model file.
const MAJOR_VERSION: u8 = 0;

/// A fitted classifier from one of the model crates.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Classifier {
	RandomForest(RandomForestClassifier),
	DecisionTree(DecisionTreeClassifier),
	GradientBoosting(GradientBoostingClassifier),
	LogisticRegression(MulticlassClassifier),
	KNeighbors(KNeighborsClassifier),
	ObliviousBoosting(ObliviousBoostingClassifier),
	AdaBoost(AdaBoostClassifier),
}

impl Classifier {
	pub fn n_classes(&self) -> usize {
		match self {
			Classifier::RandomForest(model) => model.n_classes,
			Classifier::DecisionTree(model) => model.n_classes,
			Classifier::GradientBoosting(model) => model.n_classes,
			Classifier::LogisticRegression(model) => model.biases.len(),
			Classifier::KNeighbors(model) => model.n_classes,
			Classifier::ObliviousBoosting(model) => model.n_classes,
			Classifier::AdaBoost(model) => model.n_classes,
		}
	}

	/// Write the probability of each class into `probabilities`, which has shape `(n_examples, n_classes)`.
	pub fn predict_probabilities(
		&self,
		features: ArrayView2<f32>,
		probabilities: ArrayViewMut2<f32>,
	) {
		match self {
			Classifier::RandomForest(model) => model.predict(features, probabilities),
			Classifier::DecisionTree(model) => model.predict(features, probabilities),
			Classifier::GradientBoosting(model) => model.predict(features, probabilities),
			Classifier::LogisticRegression(model) => model.predict(features, probabilities),
			Classifier::KNeighbors(model) => model.predict(features, probabilities),
			Classifier::ObliviousBoosting(model) => model.predict(features, probabilities),
			Classifier::AdaBoost(model) => model.predict(features, probabilities),
		}
	}

	/// Predict the index of the most probable class for each row. Ties go to the lowest index.
	pub fn predict_class_indexes(&self, features: ArrayView2<f32>) -> Array1<usize> {
		let mut probabilities = Array2::zeros((features.nrows(), self.n_classes()));
		self.predict_probabilities(features, probabilities.view_mut());
		probabilities
			.axis_iter(Axis(0))
			.map(|probabilities| {
				let mut best = 0;
				for (class_index, probability) in probabilities.iter().enumerate() {
					if *probability > probabilities[best] {
						best = class_index;
					}
				}
				best
			})
			.collect()
	}
}

/// The model selected by [`ModelTrainer`](struct.ModelTrainer.html), along with what is needed to use it on new data.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Model {
	/// The registry name of the candidate this model was trained from.
	pub name: String,
	/// The test accuracy that won the selection.
	pub score: f32,
	pub n_features: usize,
	/// Maps predicted class indexes back to target values.
	pub classes: Vec<f32>,
	pub classifier: Classifier,
}

impl Model {
	/// Deserialize a `Model` from a slice.
	pub fn from_slice(slice: &[u8]) -> Result<Self> {
		let (major_version, slice) = slice
			.split_first()
			.ok_or_else(|| format_err!("the model is empty"))?;
		if *major_version != MAJOR_VERSION {
			bail!("unknown major version {}", major_version);
		}
		let model: Self = rmp_serde::from_slice(slice)?;
		Ok(model)
	}

	/// Deserialize a `Model` by reading the file at `path`.
	pub fn from_path(path: &Path) -> Result<Self> {
		let file = std::fs::File::open(path)
			.with_context(|| format!("failed to open model file {}", path.display()))?;
		let mut reader = std::io::BufReader::new(file);
		let mut major_version = [0u8; 1];
		reader.read_exact(&mut major_version)?;
		let major_version = major_version[0];
		if major_version != MAJOR_VERSION {
			bail!("unknown major version {}", major_version);
		}
		let model: Model = rmp_serde::from_read(&mut reader)?;
		Ok(model)
	}

	/// Write this model to the file at `path`, creating its parent directories and replacing any existing file.
	pub fn to_file(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent).with_context(|| {
					format!("failed to create directory {}", parent.display())
				})?;
			}
		}
		let file = std::fs::File::create(path)?;
		let mut writer = std::io::BufWriter::new(file);
		writer.write_all(&[MAJOR_VERSION])?;
		rmp_serde::encode::write_named(&mut writer, self)?;
		writer.flush()?;
		Ok(())
	}

	/// Predict the target value for each row of `features`.
	pub fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		if features.ncols() != self.n_features {
			bail!(
				"the model expects {} features but {} were provided",
				self.n_features,
				features.ncols()
			);
		}
		let class_indexes = self.classifier.predict_class_indexes(features);
		Ok(class_indexes.mapv(|class_index| self.classes[class_index]))
	}
}

#[cfg(test)]
fn test_model() -> Model {
	use bestfit_tree::DecisionTreeTrainOptions;
	let features = arr2(&[[0.0], [1.0], [2.0], [3.0]]);
	let labels = arr1(&[0, 0, 1, 1]);
	let classifier = DecisionTreeClassifier::train(
		features.view(),
		labels.view(),
		2,
		&DecisionTreeTrainOptions::default(),
	);
	Model {
		name: "Decision Tree".to_owned(),
		score: 1.0,
		n_features: 1,
		classes: vec![10.0, 20.0],
		classifier: Classifier::DecisionTree(classifier),
	}
}

#[test]
fn test_model_round_trip() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("nested").join("model.bestfit");
	let model = test_model();
	model.to_file(&path).unwrap();
	let bytes = std::fs::read(&path).unwrap();
	assert_eq!(bytes[0], 0);
	let loaded = Model::from_path(&path).unwrap();
	assert_eq!(loaded.name, "Decision Tree");
	assert_eq!(loaded.classes, vec![10.0, 20.0]);
	let features = arr2(&[[0.5], [2.5], [f32::NAN]]);
	assert_eq!(
		loaded.predict(features.view()).unwrap(),
		arr1(&[10.0, 20.0, 10.0])
	);
	assert_eq!(
		Model::from_slice(&bytes).unwrap().predict(features.view()).unwrap(),
		model.predict(features.view()).unwrap()
	);
}

#[test]
fn test_unknown_major_version() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("model.bestfit");
	test_model().to_file(&path).unwrap();
	let mut bytes = std::fs::read(&path).unwrap();
	bytes[0] = 1;
	std::fs::write(&path, &bytes).unwrap();
	let error = Model::from_path(&path).unwrap_err();
	assert_eq!(error.to_string(), "unknown major version 1");
	assert!(Model::from_slice(&bytes).is_err());
	assert!(Model::from_slice(&[]).is_err());
}

#[test]
fn test_predict_checks_feature_count() {
	let model = test_model();
	let error = model.predict(Array2::zeros((2, 3)).view()).unwrap_err();
	assert_eq!(
		error.to_string(),
		"the model expects 1 features but 3 were provided"
	);
}
