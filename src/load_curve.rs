//! Time series of power values with one value per point in time.
use crate::error::{MeritError, Result};
use itertools::{EitherOrBoth, Itertools};
use std::fmt;
use std::ops::{Add, Sub};

/// A series of power values (MW), one for each point in time.
///
/// Points which have never been set read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadCurve {
    values: Vec<f64>,
}

impl LoadCurve {
    /// Create a new curve with the given values
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Create a curve of `length` zeros
    pub fn zeroed(length: usize) -> Self {
        Self::new(vec![0.0; length])
    }

    /// The value at `point`, or zero if the point has not been set
    pub fn get(&self, point: usize) -> f64 {
        self.values.get(point).copied().unwrap_or(0.0)
    }

    /// Set the value at `point`, growing the curve with zeros if necessary
    pub fn set(&mut self, point: usize, value: f64) {
        if point >= self.values.len() {
            self.values.resize(point + 1, 0.0);
        }

        self.values[point] = value;
    }

    /// The number of points in the curve
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the curve has no points
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the values of the curve
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// The values of the curve as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// The sum of all values
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// The smallest value, or `None` if the curve is empty
    pub fn min(&self) -> Option<f64> {
        self.iter().reduce(f64::min)
    }

    /// The largest value, or `None` if the curve is empty
    pub fn max(&self) -> Option<f64> {
        self.iter().reduce(f64::max)
    }

    /// The sample variance of the values.
    ///
    /// The sum of squared deviations is divided by `len - 1`, so curves with fewer than two
    /// values produce an error.
    pub fn variance(&self) -> Result<f64> {
        let length = self.len();
        if length <= 1 {
            return Err(MeritError::CurveTooShort { length });
        }

        let mean = self.sum() / length as f64;
        let sum: f64 = self.iter().map(|value| (value - mean).powi(2)).sum();

        Ok(sum / (length - 1) as f64)
    }

    /// The sample standard deviation of the values
    pub fn sd(&self) -> Result<f64> {
        Ok(self.variance()?.sqrt())
    }

    /// Combine two curves pointwise, treating the shorter one as padded with zeros
    fn combine<F>(&self, other: &LoadCurve, op: F) -> LoadCurve
    where
        F: Fn(f64, f64) -> f64,
    {
        self.iter()
            .zip_longest(other.iter())
            .map(|pair| match pair {
                EitherOrBoth::Both(lhs, rhs) => op(lhs, rhs),
                EitherOrBoth::Left(lhs) => op(lhs, 0.0),
                EitherOrBoth::Right(rhs) => op(0.0, rhs),
            })
            .collect()
    }
}

impl FromIterator<f64> for LoadCurve {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a LoadCurve {
    type Item = f64;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter().copied()
    }
}

impl Add for &LoadCurve {
    type Output = LoadCurve;

    fn add(self, rhs: &LoadCurve) -> LoadCurve {
        self.combine(rhs, |lhs, rhs| lhs + rhs)
    }
}

impl Sub for &LoadCurve {
    type Output = LoadCurve;

    fn sub(self, rhs: &LoadCurve) -> LoadCurve {
        self.combine(rhs, |lhs, rhs| lhs - rhs)
    }
}

impl Add for LoadCurve {
    type Output = LoadCurve;

    fn add(self, rhs: LoadCurve) -> LoadCurve {
        &self + &rhs
    }
}

impl Sub for LoadCurve {
    type Output = LoadCurve;

    fn sub(self, rhs: LoadCurve) -> LoadCurve {
        &self - &rhs
    }
}

impl fmt::Display for LoadCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<LoadCurve: {} values>", self.len())
    }
}
