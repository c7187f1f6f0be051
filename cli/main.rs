//! This module contains the main entrypoint to the bestfit cli.

use anyhow::{Context, Result};
use bestfit_core::{Model, ModelTrainer, ModelTrainerConfig};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod table;

#[derive(Parser)]
#[clap(
	about = "Train a set of classifiers and keep the best one.",
	disable_help_subcommand = true
)]
enum Options {
	#[clap(name = "train")]
	Train(TrainOptions),
	#[clap(name = "predict")]
	Predict(PredictOptions),
}

#[derive(Parser, Debug)]
#[clap(about = "train the candidate models and write the best one")]
#[clap(
	long_about = "train the candidate models on a training .csv file, score them on a test .csv file, and write the best one. The last column of each file is the target."
)]
struct TrainOptions {
	#[clap(long, help = "the path to your .csv file used for training")]
	file_train: PathBuf,
	#[clap(long, help = "the path to your .csv file used for testing")]
	file_test: PathBuf,
	#[clap(short, long, help = "the path to a .json config file")]
	config: Option<PathBuf>,
	#[clap(short, long, help = "the path to write the .bestfit file to")]
	output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[clap(about = "make predictions with a trained model")]
struct PredictOptions {
	#[clap(short, long, help = "the path to a .bestfit file")]
	model: PathBuf,
	#[clap(short, long, help = "the path to a .csv file with one column per feature")]
	file: PathBuf,
	#[clap(
		short,
		long,
		help = "the path to write the predictions to, defaults to stdout"
	)]
	output: Option<PathBuf>,
}

fn main() {
	setup_tracing();
	let options = Options::parse();
	let result = match options {
		Options::Train(options) => cli_train(options),
		Options::Predict(options) => cli_predict(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

/// Log to stderr, filtered by `RUST_LOG`, showing info and above when it is unset.
fn setup_tracing() {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.init();
}

fn cli_train(options: TrainOptions) -> Result<()> {
	// Load the config from the config file, if provided.
	let mut config = match options.config.as_deref() {
		Some(config_path) => ModelTrainerConfig::from_path(config_path)?,
		None => ModelTrainerConfig::default(),
	};
	if let Some(output) = options.output {
		config.trained_model_file_path = output;
	}

	// Load the training and test partitions.
	let (_, train) = table::load_table(&options.file_train)?;
	let (_, test) = table::load_table(&options.file_test)?;

	let trainer = ModelTrainer::new(config);
	let r2 = trainer.train_best(train.view(), test.view())?;

	println!("{}", r2);
	eprintln!(
		"Your model was written to {}.",
		trainer.config().trained_model_file_path.display()
	);
	Ok(())
}

fn cli_predict(options: PredictOptions) -> Result<()> {
	let model = Model::from_path(&options.model)
		.with_context(|| format!("failed to load model {}", options.model.display()))?;
	tracing::info!(model = %model.name, score = model.score, "loaded model");
	let (_, features) = table::load_table(&options.file)?;
	let predictions = model.predict(features.view())?;
	match options.output {
		Some(output) => {
			let file = std::fs::File::create(&output)
				.with_context(|| format!("failed to create {}", output.display()))?;
			table::write_predictions(file, predictions.view())?;
		}
		None => {
			let stdout = std::io::stdout();
			table::write_predictions(stdout.lock(), predictions.view())?;
		}
	}
	Ok(())
}
