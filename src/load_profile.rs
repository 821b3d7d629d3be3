//! Normalised shapes describing how load varies over the year.
//!
//! Profiles are normalised such that multiplying them with an annual amount of energy (in MJ)
//! yields the load at every point in time in MW. The values of a valid profile therefore sum to
//! 1/3600.
use crate::POINTS;
use crate::error::{MeritError, Result};
use crate::id::LoadProfileID;
use anyhow::Context;
use log::warn;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The file extension used for stored load profiles
const PROFILE_FILE_EXTENSION: &str = "csv";

/// The lower bound (exclusive) for the sum of a valid profile
const MIN_SURFACE: f64 = 1.0 / 3601.0;

/// The upper bound (exclusive) for the sum of a valid profile
const MAX_SURFACE: f64 = 1.0 / 3599.0;

/// A normalised shape with one value for every point in the year
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    key: LoadProfileID,
    values: Vec<f64>,
}

impl LoadProfile {
    /// Create a new profile from `values`.
    ///
    /// Each source value is repeated so that the profile covers the whole year, which requires
    /// the number of source values to be a divisor of [`POINTS`].
    pub fn new(key: impl Into<LoadProfileID>, values: &[f64]) -> Result<Self> {
        let key = key.into();
        let values = scale_to_points(&key, values)?;

        Ok(Self { key, values })
    }

    /// Load a stored profile with the given reader
    pub fn load(key: &str, reader: &dyn ProfileReader) -> Result<Self> {
        let profile = Self::new(key, &reader.read(key)?)?;
        if !profile.is_valid() {
            warn!(
                "Load profile {key} is not normalised (surface {})",
                profile.surface()
            );
        }

        Ok(profile)
    }

    /// Load every profile stored in `dir`
    pub fn all(dir: &Path) -> anyhow::Result<Vec<LoadProfile>> {
        let reader = FileReader::new(dir);
        let mut profiles = Vec::new();
        for key in reader.keys()? {
            profiles.push(Self::load(&key, &reader)?);
        }

        Ok(profiles)
    }

    /// The profile's key
    pub fn key(&self) -> &LoadProfileID {
        &self.key
    }

    /// All values of the profile
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The value at `point`
    pub fn value_at(&self, point: usize) -> f64 {
        self.values.get(point).copied().unwrap_or(0.0)
    }

    /// The sum of the values (the area below the curve)
    pub fn surface(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Whether the profile has a value for every point and sums to 1/3600
    pub fn is_valid(&self) -> bool {
        let surface = self.surface();
        self.values.len() == POINTS && surface > MIN_SURFACE && surface < MAX_SURFACE
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<LoadProfile {} values>", self.values.len())
    }
}

/// Repeat each of `values` so that the result has exactly [`POINTS`] values
fn scale_to_points(key: &LoadProfileID, values: &[f64]) -> Result<Vec<f64>> {
    let length = values.len();
    if length == 0 || POINTS % length != 0 {
        return Err(MeritError::MalformedLoadProfile {
            key: key.to_string(),
            length,
        });
    }

    let repeats = POINTS / length;
    Ok(values
        .iter()
        .flat_map(|value| std::iter::repeat_n(*value, repeats))
        .collect())
}

/// Something which can provide the raw values of a stored load profile
pub trait ProfileReader {
    /// Read the values of the profile with the given key
    fn read(&self, key: &str) -> Result<Vec<f64>>;
}

/// Reads load profiles from a directory containing one `<key>.csv` file per profile.
///
/// Files contain a single column of numbers without a header.
#[derive(Debug, Clone)]
pub struct FileReader {
    dir: PathBuf,
}

impl FileReader {
    /// Create a reader for profiles stored in `dir`
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// The keys of all profiles stored in the directory, sorted
    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Could not read directory {}", self.dir.display()))?;

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == PROFILE_FILE_EXTENSION) {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();

        Ok(keys)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{PROFILE_FILE_EXTENSION}"))
    }
}

impl ProfileReader for FileReader {
    fn read(&self, key: &str) -> Result<Vec<f64>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(MeritError::MissingLoadProfile(key.to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|_| MeritError::MissingLoadProfile(key.to_string()))?;

        let invalid = |line| MeritError::InvalidLoadProfileValue {
            key: key.to_string(),
            line,
        };

        let mut values = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|_| invalid(idx + 1))?;
            let value = record
                .get(0)
                .and_then(|field| field.parse::<f64>().ok())
                .ok_or_else(|| invalid(idx + 1))?;
            values.push(value);
        }

        Ok(values)
    }
}

/// Wraps another reader, keeping the values of each profile after it is first read.
///
/// Callers always receive their own copy of the values.
#[derive(Debug)]
pub struct CachingReader<R> {
    inner: R,
    profiles: RefCell<HashMap<String, Rc<[f64]>>>,
}

impl<R: ProfileReader> CachingReader<R> {
    /// Create a caching reader around `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            profiles: RefCell::new(HashMap::new()),
        }
    }
}

impl<R: ProfileReader> ProfileReader for CachingReader<R> {
    fn read(&self, key: &str) -> Result<Vec<f64>> {
        if let Some(values) = self.profiles.borrow().get(key) {
            return Ok(values.to_vec());
        }

        let values: Rc<[f64]> = self.inner.read(key)?.into();
        self.profiles
            .borrow_mut()
            .insert(key.to_string(), Rc::clone(&values));

        Ok(values.to_vec())
    }
}

/// A reader for profiles held in memory, keyed by profile key
#[derive(Debug, Default, Clone)]
pub struct MemoryReader(HashMap<String, Vec<f64>>);

impl MemoryReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile's values to the reader
    pub fn insert(&mut self, key: &str, values: Vec<f64>) {
        self.0.insert(key.to_string(), values);
    }
}

impl ProfileReader for MemoryReader {
    fn read(&self, key: &str) -> Result<Vec<f64>> {
        self.0
            .get(key)
            .cloned()
            .ok_or_else(|| MeritError::MissingLoadProfile(key.to_string()))
    }
}
