//! Code for loading merit order models from a directory.
//!
//! A model directory contains a `model.toml` file listing the participants and choosing the
//! calculator, plus a `load_profiles` folder holding one CSV file per load profile.
use crate::calculator::{Calculator, CalculatorConfig};
use crate::input::{check_proportion, input_err_msg, read_toml};
use crate::load_profile::{CachingReader, FileReader};
use crate::order::Order;
use crate::participant::{Participant, ParticipantConfig, ParticipantKind};
use anyhow::{Context, Result, ensure};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MODEL_FILE_NAME: &str = "model.toml";

/// The folder, within the model directory, containing load profiles
const LOAD_PROFILES_DIR_NAME: &str = "load_profiles";

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
struct ModelFile {
    #[serde(default)]
    calculator: CalculatorConfig,
    #[serde(default)]
    participants: Vec<ParticipantEntry>,
}

/// A `[[participants]]` entry in the model file
#[derive(Debug, Deserialize, PartialEq)]
struct ParticipantEntry {
    #[serde(rename = "type")]
    kind: ParticipantKind,
    #[serde(flatten)]
    config: ParticipantConfig,
}

/// Model definition
#[derive(Debug)]
pub struct Model {
    /// The folder the model was loaded from
    pub model_dir: PathBuf,
    /// Which calculator dispatches the order
    pub calculator: CalculatorConfig,
    /// Participants, in the order given in the model file
    pub participants: Vec<Participant>,
}

/// Check that numeric attributes of an entry are in range
fn check_entry(entry: &ParticipantEntry) -> Result<()> {
    let config = &entry.config;
    if let Some(availability) = config.availability {
        check_proportion(availability, "availability")?;
    }

    for (name, value) in [
        ("output_capacity_per_unit", config.output_capacity_per_unit),
        ("number_of_units", config.number_of_units),
        ("full_load_hours", config.full_load_hours),
        ("total_consumption", config.total_consumption),
    ] {
        if let Some(value) = value {
            ensure!(value >= 0.0, "{name} cannot be negative (got {value})");
        }
    }

    Ok(())
}

impl ModelFile {
    /// Read a model file from the specified directory.
    fn from_path(model_dir: &Path) -> Result<ModelFile> {
        let file_path = model_dir.join(MODEL_FILE_NAME);
        let model_file: ModelFile = read_toml(&file_path)?;
        ensure!(
            !model_file.participants.is_empty(),
            "{} does not define any participants",
            file_path.display()
        );

        for (idx, entry) in model_file.participants.iter().enumerate() {
            check_entry(entry).with_context(|| {
                format!("Invalid participant {} in {}", idx + 1, file_path.display())
            })?;
        }

        Ok(model_file)
    }
}

impl Model {
    /// Read a model from the specified directory.
    ///
    /// Every participant is built, and its load profile read, so that errors are found before
    /// the model is run.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
        let model_dir = model_dir.as_ref();
        let model_file = ModelFile::from_path(model_dir)?;

        // Check the calculator can be built
        model_file
            .calculator
            .build()
            .with_context(|| input_err_msg(model_dir.join(MODEL_FILE_NAME)))?;

        let reader = CachingReader::new(FileReader::new(&model_dir.join(LOAD_PROFILES_DIR_NAME)));
        let participants = model_file
            .participants
            .iter()
            .map(|entry| {
                Participant::from_config(entry.kind, &entry.config, &reader).with_context(|| {
                    format!(
                        "Could not create {} {}",
                        entry.kind,
                        entry.config.key.as_deref().unwrap_or("(no key)")
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Model {
            model_dir: model_dir.to_path_buf(),
            calculator: model_file.calculator,
            participants,
        })
    }

    /// Create the calculator chosen in the model file
    pub fn calculator(&self) -> Result<Box<dyn Calculator>> {
        Ok(self.calculator.build()?)
    }

    /// Create an uncalculated order holding the model's participants
    pub fn build_order(&self) -> Result<Order> {
        let mut order = Order::new();
        for participant in &self.participants {
            order.add(participant.clone())?;
        }

        Ok(order)
    }

    /// Build the order and calculate it with the chosen calculator
    pub fn run(&self) -> Result<Order> {
        let mut order = self.build_order()?;
        let calculator = self.calculator()?;
        order
            .calculate(calculator.as_ref())
            .context("Failed to calculate the merit order")?;
        info!(
            "Dispatched {} producers against {} MWh of demand",
            order.producers().len(),
            order.demand_curve()?.sum()
        );

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::CalculatorMethod;
    use crate::error::MeritError;
    use crate::fixture::assert_error;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    const MODEL_TOML: &str = r#"
[calculator]
method = "quantizing"
chunk_size = 24

[[participants]]
type = "user"
key = "households"
total_consumption = 3.1536e10

[[participants]]
type = "volatile"
key = "wind"
marginal_costs = 0.0
output_capacity_per_unit = 2.0
number_of_units = 100
availability = 0.95
fixed_costs_per_unit = 1000.0
fixed_om_costs_per_unit = 100.0
full_load_hours = 2500
load_profile = "wind"

[[participants]]
type = "dispatchable"
key = "gas"
marginal_costs = 60.0
output_capacity_per_unit = 500.0
number_of_units = 3
availability = 0.9
fixed_costs_per_unit = 5000.0
fixed_om_costs_per_unit = 500.0
"#;

    /// Create a model directory with the given model file and a flat "wind" profile
    fn write_model(dir: &Path, model_toml: &str) {
        fs::write(dir.join(MODEL_FILE_NAME), model_toml).unwrap();

        let profiles_dir = dir.join(LOAD_PROFILES_DIR_NAME);
        fs::create_dir(&profiles_dir).unwrap();
        let mut file = File::create(profiles_dir.join("wind.csv")).unwrap();
        for _ in 0..24 {
            writeln!(file, "{}", 1.0 / (3600.0 * 8760.0)).unwrap();
        }
    }

    #[test]
    fn test_model_from_path() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), MODEL_TOML);

        let model = Model::from_path(dir.path()).unwrap();
        assert_eq!(model.calculator.method, CalculatorMethod::Quantizing);
        assert_eq!(model.calculator.chunk_size, Some(24));
        assert_eq!(model.participants.len(), 3);
        assert_eq!(model.participants[1].kind(), ParticipantKind::Volatile);

        let wind = model.participants[1].as_producer().unwrap();
        assert_eq!(wind.load_profile().unwrap().key().as_str(), "wind");
        assert_eq!(wind.attributes().full_load_hours, Some(2500.0));
    }

    #[test]
    fn test_model_run() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), MODEL_TOML);

        let order = Model::from_path(dir.path()).unwrap().run().unwrap();
        assert!(order.is_calculated());

        // 1000 MW of demand, of which wind meets 500 MW * 2500 / 8760
        let gas = order.producer("gas").unwrap();
        let expected = 1000.0 - 200.0 * 2500.0 / 8760.0;
        assert!((gas.load_at(100) - expected).abs() < 1e-6);
        assert_eq!(gas.position(), Some(1));
    }

    #[test]
    fn test_model_from_path_no_participants() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), "[calculator]\nmethod = \"exact\"\n");

        let file_path = dir.path().join(MODEL_FILE_NAME);
        assert_error!(
            Model::from_path(dir.path()),
            format!("{} does not define any participants", file_path.display())
        );
    }

    #[test]
    fn test_model_from_path_missing_attribute() {
        let dir = tempdir().unwrap();
        write_model(
            dir.path(),
            "[[participants]]\ntype = \"must_run\"\nkey = \"nuclear\"\nmarginal_costs = 1.0\n",
        );

        let err = Model::from_path(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Could not create must-run producer nuclear");
        assert_eq!(
            err.downcast_ref::<MeritError>(),
            Some(&MeritError::MissingAttribute {
                attribute: "output_capacity_per_unit",
                kind: "must-run producer".into()
            })
        );
    }

    #[test]
    fn test_model_from_path_missing_profile() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), &MODEL_TOML.replace("\"wind\"\n", "\"offshore\"\n"));

        let err = Model::from_path(dir.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MeritError>(),
            Some(&MeritError::MissingLoadProfile("offshore".into()))
        );
    }

    #[test]
    fn test_model_from_path_bad_availability() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), &MODEL_TOML.replace("0.95", "1.95"));

        let err = Model::from_path(dir.path()).unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "availability must be between 0 and 1 (got 1.95)"
        );
    }

    #[test]
    fn test_model_from_path_invalid_chunk_size() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), &MODEL_TOML.replace("chunk_size = 24", "chunk_size = 1"));

        let err = Model::from_path(dir.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MeritError>(),
            Some(&MeritError::InvalidChunkSize(1))
        );
    }

    #[test]
    fn test_model_from_path_unknown_type() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), "[[participants]]\ntype = \"storage\"\nkey = \"battery\"\n");
        assert!(Model::from_path(dir.path()).is_err());
    }
}
