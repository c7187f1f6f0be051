use anyhow::{format_err, Context, Result};
use ndarray::prelude::*;
use std::{
	io::{Read, Write},
	path::Path,
};

/// Cells with these values are read as NaN, which the models treat as invalid.
const INVALID_VALUES: &[&str] = &["", "null", "NULL", "n/a", "N/A", "nan", "NaN", "?"];

/// Load a numeric .csv file with a header row, returning the column names and the values.
pub fn load_table(path: &Path) -> Result<(Vec<String>, Array2<f32>)> {
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open {}", path.display()))?;
	read_table(file).with_context(|| format!("failed to load {}", path.display()))
}

pub fn read_table<R: Read>(reader: R) -> Result<(Vec<String>, Array2<f32>)> {
	let mut reader = csv::Reader::from_reader(reader);
	let column_names: Vec<String> = reader
		.headers()?
		.iter()
		.map(|column_name| column_name.to_owned())
		.collect();
	let mut values = Vec::new();
	let mut n_rows = 0;
	for record in reader.records() {
		let record = record?;
		n_rows += 1;
		for (column_name, cell) in column_names.iter().zip(record.iter()) {
			let value = parse_cell(cell).ok_or_else(|| {
				format_err!(
					"invalid value \"{}\" in row {}, column \"{}\"",
					cell,
					n_rows,
					column_name
				)
			})?;
			values.push(value);
		}
	}
	let values = Array2::from_shape_vec((n_rows, column_names.len()), values)?;
	Ok((column_names, values))
}

fn parse_cell(cell: &str) -> Option<f32> {
	let cell = cell.trim();
	if INVALID_VALUES.contains(&cell) {
		return Some(f32::NAN);
	}
	cell.parse().ok()
}

/// Write one prediction per row under a `prediction` header.
pub fn write_predictions<W: Write>(writer: W, predictions: ArrayView1<f32>) -> Result<()> {
	let mut writer = csv::Writer::from_writer(writer);
	writer.write_record(&["prediction"])?;
	for prediction in predictions.iter() {
		writer.write_record(&[prediction.to_string()])?;
	}
	writer.flush()?;
	Ok(())
}

#[test]
fn test_read_table() {
	let csv = "a,b,target\n1,2.5,0\n?,NaN,1\n,-3,1\n";
	let (column_names, values) = read_table(csv.as_bytes()).unwrap();
	assert_eq!(column_names, vec!["a", "b", "target"]);
	assert_eq!(values.dim(), (3, 3));
	assert_eq!(values.row(0), arr1(&[1.0, 2.5, 0.0]));
	assert!(values[(1, 0)].is_nan());
	assert!(values[(1, 1)].is_nan());
	assert!(values[(2, 0)].is_nan());
	assert_eq!(values[(2, 1)], -3.0);
}

#[test]
fn test_read_table_reports_bad_cells() {
	let csv = "a,b\n1,2\n3,four\n";
	let error = read_table(csv.as_bytes()).unwrap_err();
	assert_eq!(error.to_string(), "invalid value \"four\" in row 2, column \"b\"");
	// Rows must have as many cells as the header.
	assert!(read_table("a,b\n1,2,3\n".as_bytes()).is_err());
}

#[test]
fn test_load_table() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("train.csv");
	std::fs::write(&path, "x,y\n0,1\n").unwrap();
	let (_, values) = load_table(&path).unwrap();
	assert_eq!(values, arr2(&[[0.0, 1.0]]));
	let error = load_table(&dir.path().join("missing.csv")).unwrap_err();
	assert!(error.to_string().starts_with("failed to open"));
}

#[test]
fn test_write_predictions() {
	let mut buffer = Vec::new();
	write_predictions(&mut buffer, arr1(&[1.0, 2.5]).view()).unwrap();
	assert_eq!(String::from_utf8(buffer).unwrap(), "prediction\n1\n2.5\n");
}
