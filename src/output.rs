//! The module responsible for writing the results of a calculated order to disk.
use crate::POINTS;
use crate::finance::{profit, profitability, revenue, total_costs};
use crate::id::ParticipantID;
use crate::order::Order;
use crate::participant::{EnergyUnit, Producer};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "merit_results";

/// The output file name for producer load curves
pub const LOAD_CURVES_FILE_NAME: &str = "load_curves.csv";

/// The output file name for the price curve
pub const PRICE_CURVE_FILE_NAME: &str = "price_curve.csv";

/// The output file name for producer summaries
pub const PRODUCERS_FILE_NAME: &str = "producers.csv";

/// Get the default output directory for the model in the specified directory
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory, with parents.
///
/// An existing, non-empty directory is only reused if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether existing output files will be overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        let is_empty = output_dir.read_dir()?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        return Ok(true);
    }

    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// Represents a row in the price curve CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PriceRow {
    hour: usize,
    price: f64,
}

/// Represents a row in the producers CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ProducerRow {
    key: ParticipantID,
    kind: String,
    marginal_costs: f64,
    position: Option<usize>,
    full_load_hours: f64,
    production: f64,
    revenue: f64,
    total_costs: f64,
    profit: f64,
    profitability: String,
}

impl ProducerRow {
    /// Summarise a producer, valuing its output at `order`'s prices
    fn new(producer: &Producer, order: &Order) -> Self {
        let prices = order.price_curve();
        Self {
            key: producer.key.clone(),
            kind: producer.kind().to_string(),
            marginal_costs: producer.marginal_costs(),
            position: producer.position(),
            full_load_hours: producer.full_load_hours(),
            production: producer.production(EnergyUnit::MWh),
            revenue: revenue(producer, prices),
            total_costs: total_costs(producer),
            profit: profit(producer, prices),
            profitability: profitability(producer, prices).to_string(),
        }
    }
}

/// An object for writing the results of an order to CSV files
pub struct DataWriter {
    load_curves_writer: csv::Writer<File>,
    prices_writer: csv::Writer<File>,
    producers_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(&file_path)
                .with_context(|| format!("Could not create {}", file_path.display()))
        };

        Ok(Self {
            load_curves_writer: new_writer(LOAD_CURVES_FILE_NAME)?,
            prices_writer: new_writer(PRICE_CURVE_FILE_NAME)?,
            producers_writer: new_writer(PRODUCERS_FILE_NAME)?,
        })
    }

    /// Write all results of a calculated order
    pub fn write_order(&mut self, order: &Order) -> Result<()> {
        ensure!(
            order.is_calculated(),
            "Cannot write results of an order which has not been calculated"
        );

        self.write_load_curves(order)?;
        self.write_prices(order)?;
        self.write_producers(order)?;

        Ok(())
    }

    /// Write one column per producer, with a row for each hour
    fn write_load_curves(&mut self, order: &Order) -> Result<()> {
        let producers = order.producers();

        let mut header = vec!["hour"];
        header.extend(producers.iter().map(|producer| producer.key.as_str()));
        self.load_curves_writer.write_record(&header)?;

        for hour in 0..POINTS {
            let mut row = vec![hour.to_string()];
            row.extend(producers.iter().map(|p| p.load_at(hour).to_string()));
            self.load_curves_writer.write_record(&row)?;
        }

        Ok(())
    }

    fn write_prices(&mut self, order: &Order) -> Result<()> {
        for (hour, price) in order.price_curve().iter().enumerate() {
            self.prices_writer.serialize(PriceRow { hour, price })?;
        }

        Ok(())
    }

    fn write_producers(&mut self, order: &Order) -> Result<()> {
        for producer in order.producers() {
            self.producers_writer.serialize(ProducerRow::new(producer, order))?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.load_curves_writer.flush()?;
        self.prices_writer.flush()?;
        self.producers_writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::order;
    use itertools::Itertools;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_write_order(mut order: Order) {
        order.calculate_default().unwrap();
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path()).unwrap();
            writer.write_order(&order).unwrap();
            writer.flush().unwrap();
        }

        let prices: Vec<PriceRow> =
            csv::Reader::from_path(dir.path().join(PRICE_CURVE_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        assert_eq!(prices.len(), POINTS);
        assert_eq!(
            prices[42],
            PriceRow {
                hour: 42,
                price: order.price_at(42)
            }
        );

        let producers: Vec<ProducerRow> =
            csv::Reader::from_path(dir.path().join(PRODUCERS_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        let keys = producers.iter().map(|row| row.key.as_str()).collect_vec();
        assert_eq!(keys, ["volatile", "must_run", "dispatchable"]);
        assert_eq!(producers[2].position, Some(1));
        assert_eq!(producers[0].kind, "volatile");

        let mut reader =
            csv::Reader::from_path(dir.path().join(LOAD_CURVES_FILE_NAME)).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(
            header.iter().collect_vec(),
            ["hour", "volatile", "must_run", "dispatchable"]
        );
        assert_eq!(reader.records().count(), POINTS);
    }

    #[rstest]
    fn test_write_uncalculated_order(order: Order) {
        let dir = tempdir().unwrap();
        let mut writer = DataWriter::create(dir.path()).unwrap();
        assert!(writer.write_order(&order).is_err());
    }

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results").join("simple");

        // New directory, with parents
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());

        // Existing empty directory
        assert!(!create_output_directory(&output_dir, false).unwrap());

        // Existing non-empty directory
        fs::write(output_dir.join("file.txt"), "contents").unwrap();
        assert!(create_output_directory(&output_dir, false).is_err());
        assert!(create_output_directory(&output_dir, true).unwrap());
    }

    #[test]
    fn test_get_output_dir() {
        let dir = tempdir().unwrap();
        let model_dir = dir.path().join("my_model");
        fs::create_dir(&model_dir).unwrap();

        assert_eq!(
            get_output_dir(&model_dir).unwrap(),
            PathBuf::from("merit_results/my_model")
        );
    }
}
