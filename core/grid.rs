use indexmap::IndexMap;
use itertools::Itertools;

/// A single hyperparameter value. In JSON, integers, floats, and strings deserialize to `Int`, `Float`, and `Text` respectively.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
	Int(i64),
	Float(f64),
	Text(String),
}

impl std::fmt::Display for ParamValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ParamValue::Int(value) => write!(f, "{}", value),
			ParamValue::Float(value) => write!(f, "{}", value),
			ParamValue::Text(value) => write!(f, "{}", value),
		}
	}
}

/// The values to try for each hyperparameter of a model, in declaration order.
pub type SearchSpace = IndexMap<String, Vec<ParamValue>>;

/// One value for each hyperparameter in a search space.
pub type ParamSet = IndexMap<String, ParamValue>;

/// The search space for every candidate, keyed by candidate name.
pub fn default_search_spaces() -> IndexMap<String, SearchSpace> {
	let learning_rates = || floats(&[0.1, 0.01, 0.05, 0.001]);
	let n_estimators = || ints(&[8, 16, 32, 64, 128, 256]);
	let mut spaces = IndexMap::new();
	spaces.insert(
		"Decision Tree".to_owned(),
		space(vec![(
			"criterion",
			vec![
				ParamValue::Text("gini".to_owned()),
				ParamValue::Text("entropy".to_owned()),
			],
		)]),
	);
	spaces.insert(
		"Random Forest".to_owned(),
		space(vec![("n_estimators", n_estimators())]),
	);
	spaces.insert(
		"Gradient Boosting".to_owned(),
		space(vec![
			("learning_rate", learning_rates()),
			("subsample", floats(&[0.6, 0.7, 0.9, 1.0])),
			("n_estimators", n_estimators()),
		]),
	);
	spaces.insert("Linear Regression".to_owned(), SearchSpace::new());
	spaces.insert(
		"K-Neighbors Classifier".to_owned(),
		space(vec![("n_neighbors", ints(&[5, 7, 9, 11]))]),
	);
	spaces.insert(
		"XGBClassifier".to_owned(),
		space(vec![
			("learning_rate", learning_rates()),
			("n_estimators", n_estimators()),
		]),
	);
	spaces.insert(
		"CatBoosting Classifier".to_owned(),
		space(vec![
			("depth", ints(&[6, 8, 10])),
			("learning_rate", floats(&[0.01, 0.05, 0.1])),
			("iterations", ints(&[30, 50, 100])),
		]),
	);
	spaces.insert(
		"AdaBoost Classifier".to_owned(),
		space(vec![
			("learning_rate", learning_rates()),
			("n_estimators", n_estimators()),
		]),
	);
	spaces
}

/// Compute the cartesian product of the values in `space`. The last parameter varies fastest. An empty space produces a single empty `ParamSet`, and a parameter with no values is left out.
pub fn expand_search_space(space: &SearchSpace) -> Vec<ParamSet> {
	let params: Vec<(&String, &Vec<ParamValue>)> =
		space.iter().filter(|(_, values)| !values.is_empty()).collect();
	if params.is_empty() {
		return vec![ParamSet::new()];
	}
	params
		.iter()
		.map(|(_, values)| values.iter())
		.multi_cartesian_product()
		.map(|values| {
			params
				.iter()
				.zip(values)
				.map(|((name, _), value)| (name.to_string(), value.clone()))
				.collect()
		})
		.collect()
}

fn space(params: Vec<(&str, Vec<ParamValue>)>) -> SearchSpace {
	params
		.into_iter()
		.map(|(name, values)| (name.to_owned(), values))
		.collect()
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
	values.iter().map(|value| ParamValue::Int(*value)).collect()
}

fn floats(values: &[f64]) -> Vec<ParamValue> {
	values.iter().map(|value| ParamValue::Float(*value)).collect()
}

#[test]
fn test_expand_search_space() {
	let space = space(vec![
		("depth", ints(&[6, 8])),
		("unused", vec![]),
		("learning_rate", floats(&[0.1, 0.01, 0.05])),
	]);
	let param_sets = expand_search_space(&space);
	let rendered: Vec<String> = param_sets
		.iter()
		.map(|param_set| {
			param_set
				.iter()
				.map(|(name, value)| format!("{}={}", name, value))
				.join(",")
		})
		.collect();
	assert_eq!(
		rendered,
		vec![
			"depth=6,learning_rate=0.1",
			"depth=6,learning_rate=0.01",
			"depth=6,learning_rate=0.05",
			"depth=8,learning_rate=0.1",
			"depth=8,learning_rate=0.01",
			"depth=8,learning_rate=0.05",
		]
	);
	assert_eq!(expand_search_space(&SearchSpace::new()), vec![ParamSet::new()]);
}

#[test]
fn test_default_search_spaces() {
	let spaces = default_search_spaces();
	let sizes: Vec<(&str, usize)> = spaces
		.iter()
		.map(|(name, space)| (name.as_str(), expand_search_space(space).len()))
		.collect();
	assert_eq!(
		sizes,
		vec![
			("Decision Tree", 2),
			("Random Forest", 6),
			("Gradient Boosting", 96),
			("Linear Regression", 1),
			("K-Neighbors Classifier", 4),
			("XGBClassifier", 24),
			("CatBoosting Classifier", 27),
			("AdaBoost Classifier", 24),
		]
	);
}

#[test]
fn test_param_value_from_json() {
	let space: SearchSpace =
		serde_json::from_str(r#"{ "n_neighbors": [3, 5], "learning_rate": [0.5], "criterion": ["gini"] }"#)
			.unwrap();
	assert_eq!(space["n_neighbors"], ints(&[3, 5]));
	assert_eq!(space["learning_rate"], floats(&[0.5]));
	assert_eq!(space["criterion"], vec![ParamValue::Text("gini".to_owned())]);
}
