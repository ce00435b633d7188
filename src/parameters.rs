//! Parameter Set - static and scale-dependent engine parameters
//!
//! A [`ParameterSet`] is accumulated with `add_*` calls and validated as a
//! single step against the concrete scale points of a build request.
//!
//! ```rust
//! use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
//!
//! let mut params = ParameterSet::new();
//! params.set_scale_variable_names(["Lx", "Ly"]);
//! params.add_static_parameter("temperatures", vec![1.0, 2.0, 3.0])?;
//! params.add_scaling_parameter(
//!     "therm_steps",
//!     [(ScalePoint::uniform(8, 2), 1_000), (ScalePoint::uniform(16, 2), 4_000)],
//! )?;
//!
//! let points = [ScalePoint::uniform(8, 2), ScalePoint::uniform(16, 2)];
//! params.validate(&points)?;
//! assert_eq!(params.resolve("therm_steps", &points[1])?.to_string(), "4000");
//! # Ok::<(), sweep_orchestrator::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Parameter through which the engine learns where to write its artifact.
pub const OUTPUT_FILE_PARAMETER: &str = "outputfile";

/// One concrete combination of scale-variable values.
///
/// Coordinates follow the order of the declared scale-variable names.
/// Scale points are totally ordered so they can key result maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScalePoint(Vec<i64>);

impl ScalePoint {
    /// Create a scale point from its coordinates.
    #[must_use]
    pub const fn new(coordinates: Vec<i64>) -> Self {
        Self(coordinates)
    }

    /// Scale point repeating `value` over `dimensions` coordinates (e.g. a square lattice).
    #[must_use]
    pub fn uniform(value: i64, dimensions: usize) -> Self {
        Self(vec![value; dimensions])
    }

    /// Get the coordinates.
    #[must_use]
    pub fn coordinates(&self) -> &[i64] {
        &self.0
    }

    /// Number of coordinates.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Deterministic run identifier for this scale point.
    ///
    /// Each coordinate is appended as `_<name><value>` in declaration order,
    /// e.g. `ising_Lx16_Ly16`.
    #[must_use]
    pub fn run_id(&self, experiment_name: &str, names: &[String]) -> String {
        let mut id = experiment_name.to_string();
        for (name, value) in names.iter().zip(&self.0) {
            id.push('_');
            id.push_str(name);
            id.push_str(&value.to_string());
        }
        id
    }
}

impl fmt::Display for ScalePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

impl From<i64> for ScalePoint {
    fn from(value: i64) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<i64>> for ScalePoint {
    fn from(coordinates: Vec<i64>) -> Self {
        Self(coordinates)
    }
}

impl<const N: usize> From<[i64; N]> for ScalePoint {
    fn from(coordinates: [i64; N]) -> Self {
        Self(coordinates.to_vec())
    }
}

impl From<(i64, i64)> for ScalePoint {
    fn from((x, y): (i64, i64)) -> Self {
        Self(vec![x, y])
    }
}

/// Value of a single engine parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Boolean flag, rendered `true`/`false`
    Boolean(bool),
    /// Integer scalar
    Integer(i64),
    /// Floating scalar
    Float(f64),
    /// Sequence of floats, rendered joined by `", "`
    Sequence(Vec<f64>),
    /// Free text
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Sequence(values) => {
                let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

impl From<&[f64]> for ParameterValue {
    fn from(values: &[f64]) -> Self {
        Self::Sequence(values.to_vec())
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Static and scaling parameters plus the ordered scale-variable names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    static_parameters: BTreeMap<String, ParameterValue>,
    scaling_parameters: BTreeMap<String, BTreeMap<ScalePoint, ParameterValue>>,
    scale_variable_names: Vec<String>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter shared by every scale point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateParameter`] if the name is already registered.
    pub fn add_static_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) -> Result<()> {
        let name = name.into();
        self.ensure_unregistered(&name)?;
        self.static_parameters.insert(name, value.into());
        Ok(())
    }

    /// Register a parameter with one value per scale point.
    ///
    /// Coverage of the requested scale points is checked by [`Self::validate`],
    /// since the points may be chosen after the parameter is added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateParameter`] if the name is already registered.
    pub fn add_scaling_parameter<I, K, V>(&mut self, name: impl Into<String>, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ScalePoint>,
        V: Into<ParameterValue>,
    {
        let name = name.into();
        self.ensure_unregistered(&name)?;
        let values = values
            .into_iter()
            .map(|(point, value)| (point.into(), value.into()))
            .collect();
        self.scaling_parameters.insert(name, values);
        Ok(())
    }

    /// Declare the ordered scale-variable names.
    pub fn set_scale_variable_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scale_variable_names = names.into_iter().map(Into::into).collect();
    }

    /// Get the ordered scale-variable names.
    #[must_use]
    pub fn scale_variable_names(&self) -> &[String] {
        &self.scale_variable_names
    }

    /// Get the static parameters.
    #[must_use]
    pub const fn static_parameters(&self) -> &BTreeMap<String, ParameterValue> {
        &self.static_parameters
    }

    /// Get the scaling parameters.
    #[must_use]
    pub const fn scaling_parameters(&self) -> &BTreeMap<String, BTreeMap<ScalePoint, ParameterValue>> {
        &self.scaling_parameters
    }

    /// Resolve a parameter for a scale point: static first, then scaling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`] if the name is not registered, or
    /// [`Error::IncompleteScaleCoverage`] if a scaling parameter has no value
    /// for `scale_point`.
    pub fn resolve(&self, name: &str, scale_point: &ScalePoint) -> Result<&ParameterValue> {
        if let Some(value) = self.static_parameters.get(name) {
            return Ok(value);
        }
        let by_point = self
            .scaling_parameters
            .get(name)
            .ok_or_else(|| Error::UnknownParameter {
                name: name.to_string(),
                scale_point: scale_point.clone(),
            })?;
        by_point
            .get(scale_point)
            .ok_or_else(|| Error::IncompleteScaleCoverage {
                parameter: name.to_string(),
                scale_point: scale_point.clone(),
            })
    }

    /// Every parameter resolved for one scale point, in engine order:
    /// scale variables, then static parameters, then scaling parameters.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::resolve`] for any uncovered scaling parameter.
    pub fn resolve_all(&self, scale_point: &ScalePoint) -> Result<Vec<(String, ParameterValue)>> {
        let mut resolved: Vec<(String, ParameterValue)> = self
            .scale_variable_names
            .iter()
            .zip(scale_point.coordinates())
            .map(|(name, &value)| (name.clone(), ParameterValue::Integer(value)))
            .collect();
        for (name, value) in &self.static_parameters {
            resolved.push((name.clone(), value.clone()));
        }
        for name in self.scaling_parameters.keys() {
            resolved.push((name.clone(), self.resolve(name, scale_point)?.clone()));
        }
        Ok(resolved)
    }

    /// Validate the set against the scale points of a build request.
    ///
    /// Checks reserved names, scale point arity and scaling coverage, in
    /// that order, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateParameter`], [`Error::ScaleDimensionMismatch`]
    /// or [`Error::IncompleteScaleCoverage`].
    pub fn validate(&self, scale_points: &[ScalePoint]) -> Result<()> {
        for name in self.static_parameters.keys().chain(self.scaling_parameters.keys()) {
            if name == OUTPUT_FILE_PARAMETER {
                return Err(Error::DuplicateParameter {
                    name: name.clone(),
                    existing: "reserved output parameter",
                });
            }
            if self.scale_variable_names.contains(name) {
                return Err(Error::DuplicateParameter {
                    name: name.clone(),
                    existing: "scale variable",
                });
            }
        }

        let expected = self.scale_variable_names.len();
        for point in scale_points {
            if point.dimensions() != expected {
                return Err(Error::ScaleDimensionMismatch {
                    scale_point: point.clone(),
                    expected,
                    actual: point.dimensions(),
                    names: self.scale_variable_names.join(", "),
                });
            }
        }

        for (name, by_point) in &self.scaling_parameters {
            if let Some(point) = scale_points.iter().find(|p| !by_point.contains_key(*p)) {
                return Err(Error::IncompleteScaleCoverage {
                    parameter: name.clone(),
                    scale_point: point.clone(),
                });
            }
        }
        Ok(())
    }

    fn ensure_unregistered(&self, name: &str) -> Result<()> {
        let existing = if self.static_parameters.contains_key(name) {
            "static parameter"
        } else if self.scaling_parameters.contains_key(name) {
            "scaling parameter"
        } else {
            return Ok(());
        };
        Err(Error::DuplicateParameter {
            name: name.to_string(),
            existing,
        })
    }
}
