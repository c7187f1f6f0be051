use std::{fmt, path::PathBuf};

/// The error returned by [`ModelTrainer::train_best`](struct.ModelTrainer.html#method.train_best). It pairs what went wrong with a description of the invocation it went wrong in.
#[derive(Debug)]
pub struct Error {
	pub kind: ErrorKind,
	pub context: InvocationContext,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
	/// The training and test arrays do not have a usable shape.
	#[error("invalid input shape: {0}")]
	InputShape(String),
	/// A candidate failed to train or to be scored.
	#[error("failed to evaluate the candidate models")]
	Model(#[source] anyhow::Error),
	/// Every candidate scored below the acceptance threshold.
	#[error(
		"no adequate model found, the best was {} with a score of {}, below the threshold of {threshold}",
		or_none(.best_model),
		or_none(.best_score)
	)]
	NoAdequateModel {
		best_model: Option<String>,
		best_score: Option<f32>,
		threshold: f32,
	},
	/// The selected model could not be written.
	#[error("failed to write the model to {}", .path.display())]
	Persistence {
		path: PathBuf,
		#[source]
		source: anyhow::Error,
	},
}

/// What `train_best` was asked to do.
#[derive(Clone, Debug)]
pub struct InvocationContext {
	/// (n_rows, n_columns)
	pub train_shape: (usize, usize),
	/// (n_rows, n_columns)
	pub test_shape: (usize, usize),
	pub artifact_path: PathBuf,
}

fn or_none<T: fmt::Display>(value: &Option<T>) -> String {
	match value {
		Some(value) => value.to_string(),
		None => "none".to_owned(),
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.context, self.kind)
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		std::error::Error::source(&self.kind)
	}
}

impl fmt::Display for InvocationContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"model selection with train shape {:?}, test shape {:?}, and artifact path {}",
			self.train_shape,
			self.test_shape,
			self.artifact_path.display()
		)
	}
}

#[test]
fn test_error_display() {
	let context = InvocationContext {
		train_shape: (100, 5),
		test_shape: (20, 4),
		artifact_path: PathBuf::from("artifacts/model.bestfit"),
	};
	let error = Error {
		kind: ErrorKind::InputShape("column counts differ".to_owned()),
		context: context.clone(),
	};
	assert_eq!(
		error.to_string(),
		"model selection with train shape (100, 5), test shape (20, 4), and artifact path artifacts/model.bestfit: invalid input shape: column counts differ"
	);
	let error = Error {
		kind: ErrorKind::NoAdequateModel {
			best_model: Some("Decision Tree".to_owned()),
			best_score: Some(0.5),
			threshold: 0.6,
		},
		context,
	};
	assert!(error.to_string().ends_with(
		"no adequate model found, the best was Decision Tree with a score of 0.5, below the threshold of 0.6"
	));
	assert!(std::error::Error::source(&error).is_none());
}

#[test]
fn test_error_source() {
	let error = Error {
		kind: ErrorKind::Model(anyhow::format_err!("not enough classes")),
		context: InvocationContext {
			train_shape: (1, 2),
			test_shape: (1, 2),
			artifact_path: PathBuf::from("model.bestfit"),
		},
	};
	let source = std::error::Error::source(&error).unwrap();
	assert_eq!(source.to_string(), "not enough classes");
}
