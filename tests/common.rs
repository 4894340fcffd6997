//! Shared functionality between integration tests.

use std::io::Cursor;

use csv::ReaderBuilder;
use ndarray::{Array1, Array2, s};
use ndarray_csv::Array2Reader as _;

/// Load a sample from the first column of a text file.
#[must_use]
pub fn load_sample_fixture(file: &'static str) -> Array1<f64> {
    // Read CSV
    let mut cursor = Cursor::new(file);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(&mut cursor);

    // Convert to array
    let table: Array2<f64> = reader
        .deserialize_array2_dynamic()
        .expect("Error deserializing CSV into array");

    table.slice(s![.., 0]).to_owned()
}

/// Eleven equally spaced values on `[0, 1]`.
#[must_use]
pub fn eleven() -> Vec<f64> {
    (0..=10).map(|index| f64::from(index) / 10.0).collect()
}
