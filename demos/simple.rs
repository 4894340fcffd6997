//! Example of fitting histograms on a 1D txt file.

use std::{error::Error, fs::File};

use csv::ReaderBuilder;
use irrhist::{Criterion, IrregularHistogram};
use ndarray::{Array2, s};
use ndarray_csv::Array2Reader as _;

pub fn main() -> Result<(), Box<dyn Error>> {
    // Try to read each argument as a file
    for arg in std::env::args().skip(1) {
        eprintln!("Reading file '{arg}'");

        // Read CSV file
        let mut file = File::open(arg)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&mut file);

        // Convert to array, only the first column is used
        let table: Array2<f64> = reader.deserialize_array2_dynamic()?;
        let sample = table.slice(s![.., 0]);

        for criterion in [
            Criterion::PenaltyB,
            Criterion::Bayes { concentration: 5.0 },
            Criterion::KullbackLeiblerCv { minimum_length: 0.0 },
        ] {
            eprintln!("{criterion:?}:");
            match IrregularHistogram::new()
                .with_criterion(criterion)
                .fit(sample)
            {
                Ok(histogram) => print!("{histogram}"),
                // Print the error
                Err(err) => eprintln!("Error fitting histogram: {err}"),
            }
        }
    }

    Ok(())
}
