//! Observable schemas - the fixed column layout of an artifact's data rows

use serde::{Deserialize, Serialize};

/// Columns written by the thermodynamic variant of the engine.
pub const THERMODYNAMIC_FIELDS: [&str; 6] = [
    "temperature",
    "energy",
    "magnetisation",
    "specific_heat",
    "susceptibility",
    "corr_length",
];

/// Columns written by the magnetization-only variant of the engine.
pub const MAGNETIZATION_FIELDS: [&str; 2] = ["temperature", "magnetization"];

/// Ordered list of named floating fields a data row decodes into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum ObservableSchema {
    /// Temperature, energy, magnetisation, specific heat, susceptibility, correlation length
    #[default]
    Thermodynamic,
    /// Temperature and magnetization
    Magnetization,
    /// Caller-declared field names
    Custom(Vec<String>),
}

impl ObservableSchema {
    /// Custom schema from field names.
    #[must_use]
    pub fn custom<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Custom(fields.into_iter().map(Into::into).collect())
    }

    /// Field names in row order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Thermodynamic => THERMODYNAMIC_FIELDS.to_vec(),
            Self::Magnetization => MAGNETIZATION_FIELDS.to_vec(),
            Self::Custom(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    /// Number of fields a row must provide.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::Thermodynamic => THERMODYNAMIC_FIELDS.len(),
            Self::Magnetization => MAGNETIZATION_FIELDS.len(),
            Self::Custom(fields) => fields.len(),
        }
    }

    /// Position of a field in the row, if the schema has it.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|field| *field == name)
    }
}
