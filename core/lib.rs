/*!
This crate selects the best classifier for a dataset that has already been split into training and test partitions.

[`ModelTrainer::train_best`](struct.ModelTrainer.html#method.train_best) builds a fresh registry of candidate models, asks an [`Evaluator`](trait.Evaluator.html) to fit each one on the training partition and score it on the test partition, and keeps the candidate with the highest score. If that score is below [`MIN_ACCEPTABLE_SCORE`](constant.MIN_ACCEPTABLE_SCORE.html), training fails and nothing is written. Otherwise the winning model is written to the configured artifact path and the R² of its predictions on the test partition is returned.

# Example

```no_run
use bestfit_core::{ModelTrainer, ModelTrainerConfig};
use ndarray::prelude::*;

// Four features followed by the target, which is 0 or 1 and separable by every feature.
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
let train = partition(100);
let test = partition(20);
let trainer = ModelTrainer::new(ModelTrainerConfig::default());
let r2 = trainer.train_best(train.view(), test.view())?;
println!("{}", r2);
# Ok::<(), bestfit_core::Error>(())
```
*/

#![allow(clippy::tabs_in_doc_comments)]

mod candidates;
mod config;
mod dataset;
mod error;
mod evaluate;
mod grid;
mod model;
mod train;

pub use self::candidates::{default_candidates, Candidate, CandidateEntry, Candidates};
pub use self::config::ModelTrainerConfig;
pub use self::dataset::Dataset;
pub use self::error::{Error, ErrorKind, InvocationContext};
pub use self::evaluate::{DefaultEvaluator, Evaluation, Evaluator, ScoreReport};
pub use self::grid::{default_search_spaces, expand_search_space, ParamSet, ParamValue, SearchSpace};
pub use self::model::{Classifier, Model};
pub use self::train::{choose_best, ModelTrainer, MIN_ACCEPTABLE_SCORE};
