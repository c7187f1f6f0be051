/*!
This module defines the `ModelTrainerConfig` struct, which is used to configure [`ModelTrainer`](../struct.ModelTrainer.html). A config can be built in code or loaded from a JSON file, where every field is optional.
*/

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelTrainerConfig {
	/// The selected model is written here. Parent directories are created and an existing file is overwritten.
	pub trained_model_file_path: PathBuf,
	/// Evaluate candidates in parallel on the rayon thread pool.
	pub parallel: bool,
	/// The seed for every model that uses randomness.
	pub seed: u64,
	/// Search each candidate's hyperparameter space instead of training it once with its defaults.
	pub hyperparameter_search: bool,
}

impl Default for ModelTrainerConfig {
	fn default() -> Self {
		Self {
			trained_model_file_path: PathBuf::from("artifacts").join("model.bestfit"),
			parallel: true,
			seed: 42,
			hyperparameter_search: false,
		}
	}
}

impl ModelTrainerConfig {
	/// Load a config from the JSON file at `path`.
	pub fn from_path(path: &Path) -> Result<Self> {
		let config = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		let config = serde_json::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", path.display()))?;
		Ok(config)
	}
}

#[test]
fn test_default_config() {
	let config = ModelTrainerConfig::default();
	assert_eq!(
		config.trained_model_file_path,
		Path::new("artifacts/model.bestfit")
	);
	assert!(config.parallel);
	assert!(!config.hyperparameter_search);
}

#[test]
fn test_config_from_path() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("config.json");
	std::fs::write(
		&path,
		r#"{ "trained_model_file_path": "out/best.bestfit", "parallel": false }"#,
	)
	.unwrap();
	let config = ModelTrainerConfig::from_path(&path).unwrap();
	assert_eq!(config.trained_model_file_path, Path::new("out/best.bestfit"));
	assert!(!config.parallel);
	assert_eq!(config.seed, ModelTrainerConfig::default().seed);
	std::fs::write(&path, r#"{ "paralel": false }"#).unwrap();
	let error = ModelTrainerConfig::from_path(&path).unwrap_err();
	assert!(error.to_string().starts_with("failed to parse config file"));
}
