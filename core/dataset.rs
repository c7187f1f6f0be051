use crate::error::ErrorKind;
use ndarray::prelude::*;

/// The training and test partitions split into features and encoded class labels.
///
/// The last column of each partition is the target and the preceding columns are the features. The distinct target values in the training partition, sorted ascending, are the classes, and each target is encoded as the index of its class. A test target that never occurs in the training partition is encoded as `n_classes`, which no model can predict.
#[derive(Clone, Debug)]
pub struct Dataset {
	/// (n_train, n_features)
	pub features_train: Array2<f32>,
	/// (n_train)
	pub labels_train: Array1<usize>,
	/// (n_test, n_features)
	pub features_test: Array2<f32>,
	/// (n_test)
	pub labels_test: Array1<usize>,
	/// The unencoded test targets.
	pub targets_test: Array1<f32>,
	/// The sorted distinct training targets.
	pub classes: Vec<f32>,
}

impl Dataset {
	pub fn new(train: ArrayView2<f32>, test: ArrayView2<f32>) -> Result<Self, ErrorKind> {
		validate_shapes(train, test)?;
		let n_features = train.ncols() - 1;
		let (features_train, targets_train) = train.view().split_at(Axis(1), n_features);
		let (features_test, targets_test) = test.view().split_at(Axis(1), n_features);
		let targets_train = targets_train.index_axis_move(Axis(1), 0);
		let targets_test = targets_test.index_axis_move(Axis(1), 0);
		check_targets("training", targets_train)?;
		check_targets("test", targets_test)?;
		// Adding zero turns -0.0 into 0.0 so both encode to the same class.
		let mut classes: Vec<f32> = targets_train.iter().map(|target| target + 0.0).collect();
		classes.sort_by(|a, b| a.total_cmp(b));
		classes.dedup();
		let labels_train = targets_train.mapv(|target| encode(&classes, target));
		let labels_test = targets_test.mapv(|target| encode(&classes, target));
		Ok(Dataset {
			features_train: features_train.to_owned(),
			labels_train,
			features_test: features_test.to_owned(),
			labels_test,
			targets_test: targets_test.to_owned(),
			classes,
		})
	}

	pub fn n_classes(&self) -> usize {
		self.classes.len()
	}

	pub fn n_features(&self) -> usize {
		self.features_train.ncols()
	}
}

fn validate_shapes(train: ArrayView2<f32>, test: ArrayView2<f32>) -> Result<(), ErrorKind> {
	if train.ncols() != test.ncols() {
		return Err(ErrorKind::InputShape(format!(
			"the training data has {} columns but the test data has {}",
			train.ncols(),
			test.ncols()
		)));
	}
	if train.ncols() < 2 {
		return Err(ErrorKind::InputShape(format!(
			"at least 2 columns are required, one or more features and the target, but there are {}",
			train.ncols()
		)));
	}
	if train.nrows() == 0 {
		return Err(ErrorKind::InputShape(
			"the training data has no rows".to_owned(),
		));
	}
	if test.nrows() == 0 {
		return Err(ErrorKind::InputShape("the test data has no rows".to_owned()));
	}
	Ok(())
}

fn check_targets(partition: &str, targets: ArrayView1<f32>) -> Result<(), ErrorKind> {
	match targets.iter().position(|target| !target.is_finite()) {
		Some(row) => Err(ErrorKind::InputShape(format!(
			"the {} target in row {} is not a finite number",
			partition, row
		))),
		None => Ok(()),
	}
}

fn encode(classes: &[f32], target: f32) -> usize {
	classes
		.binary_search_by(|class| class.total_cmp(&(target + 0.0)))
		.unwrap_or(classes.len())
}

#[test]
fn test_dataset() {
	let train = arr2(&[[0.0, 1.0, 2.0], [1.0, 0.0, -1.0], [2.0, 2.0, 2.0]]);
	let test = arr2(&[[0.5, 0.5, -1.0], [1.5, 1.5, 7.0]]);
	let dataset = Dataset::new(train.view(), test.view()).unwrap();
	assert_eq!(dataset.classes, vec![-1.0, 2.0]);
	assert_eq!(dataset.n_classes(), 2);
	assert_eq!(dataset.n_features(), 2);
	assert_eq!(dataset.labels_train, arr1(&[1, 0, 1]));
	// 7.0 is not a training class, so it is encoded as n_classes.
	assert_eq!(dataset.labels_test, arr1(&[0, 2]));
	assert_eq!(dataset.targets_test, arr1(&[-1.0, 7.0]));
	assert_eq!(dataset.features_test, arr2(&[[0.5, 0.5], [1.5, 1.5]]));
}

#[test]
fn test_invalid_shapes() {
	let train = Array2::<f32>::zeros((100, 5));
	let cases = vec![
		(train.view(), Array2::<f32>::zeros((20, 4))),
		(train.slice(s![.., ..1]), Array2::<f32>::zeros((20, 1))),
		(train.slice(s![..0, ..]), Array2::<f32>::zeros((20, 5))),
		(train.view(), Array2::<f32>::zeros((0, 5))),
	];
	for (train, test) in cases {
		assert!(matches!(
			Dataset::new(train, test.view()),
			Err(ErrorKind::InputShape(_))
		));
	}
	assert!(Dataset::new(train.view(), Array2::<f32>::zeros((20, 5)).view()).is_ok());
}

#[test]
fn test_non_finite_target() {
	let train = arr2(&[[0.0, 1.0], [1.0, f32::NAN]]);
	let test = arr2(&[[0.0, 1.0]]);
	match Dataset::new(train.view(), test.view()) {
		Err(ErrorKind::InputShape(message)) => {
			assert_eq!(message, "the training target in row 1 is not a finite number")
		}
		_ => panic!("expected an input shape error"),
	}
}
