//! Variable types and the per-column type registry.
//!
//! Estimators branch on how a column's values are to be read: a continuous
//! measurement, a binary indicator, or a categorical code. The registry is a
//! plain name → type map declared by the caller alongside the data; nothing
//! here inspects values to guess a type.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FrameError;

/// Statistical type of a column, driving estimator and resampling choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Real-valued measurement.
    Continuous,
    /// Indicator coded 0.0 / 1.0.
    Binary,
    /// Unordered category coded as a small non-negative integer.
    Categorical,
}

impl VariableType {
    /// Whether values of this type are matched exactly (binary/categorical)
    /// rather than by closeness (continuous).
    pub fn is_discrete(&self) -> bool {
        matches!(self, VariableType::Binary | VariableType::Categorical)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableType::Continuous => "continuous",
            VariableType::Binary => "binary",
            VariableType::Categorical => "categorical",
        };
        write!(f, "{name}")
    }
}

impl FromStr for VariableType {
    type Err = FrameError;

    /// Parse a full name or a single-letter column code: `c` continuous,
    /// `b` binary, `d` discrete/categorical.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" | "c" => Ok(VariableType::Continuous),
            "binary" | "b" => Ok(VariableType::Binary),
            "categorical" | "discrete" | "d" => Ok(VariableType::Categorical),
            other => Err(FrameError::UnknownVariableType {
                code: other.to_string(),
            }),
        }
    }
}

/// Registry mapping column names to their declared [`VariableType`].
///
/// # Example
///
/// ```rust
/// use dosample_frame::{Schema, VariableType};
///
/// let schema = Schema::new()
///     .with_variable("z", VariableType::Continuous)
///     .with_variable("d", VariableType::Binary);
///
/// assert_eq!(schema.get("d"), Some(VariableType::Binary));
/// assert!(schema.get("y").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    types: BTreeMap<String, VariableType>,
}

impl Schema {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a declaration, builder-style.
    pub fn with_variable(mut self, name: &str, ty: VariableType) -> Self {
        self.types.insert(name.to_string(), ty);
        self
    }

    /// Add or replace a declaration in place.
    pub fn declare(&mut self, name: &str, ty: VariableType) {
        self.types.insert(name.to_string(), ty);
    }

    /// Look up a declared type.
    pub fn get(&self, name: &str) -> Option<VariableType> {
        self.types.get(name).copied()
    }

    /// Look up a declared type, erroring on missing declarations.
    pub fn require(&self, name: &str) -> Result<VariableType, FrameError> {
        self.get(name).ok_or_else(|| FrameError::UnknownColumn {
            name: name.to_string(),
        })
    }

    /// Whether a declaration exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of declared variables.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, VariableType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_names_and_codes() {
        assert_eq!(
            "continuous".parse::<VariableType>().unwrap(),
            VariableType::Continuous
        );
        assert_eq!("b".parse::<VariableType>().unwrap(), VariableType::Binary);
        assert_eq!(
            "d".parse::<VariableType>().unwrap(),
            VariableType::Categorical
        );
        assert_eq!(
            "discrete".parse::<VariableType>().unwrap(),
            VariableType::Categorical
        );
    }

    #[test]
    fn test_parse_rejects_unknown_code() {
        let err = "q".parse::<VariableType>().unwrap_err();
        assert!(matches!(err, FrameError::UnknownVariableType { .. }));
    }

    #[test]
    fn test_discrete_split() {
        assert!(VariableType::Binary.is_discrete());
        assert!(VariableType::Categorical.is_discrete());
        assert!(!VariableType::Continuous.is_discrete());
    }

    #[test]
    fn test_registry_lookup() {
        let schema = Schema::new()
            .with_variable("z", VariableType::Continuous)
            .with_variable("d", VariableType::Binary);

        assert_eq!(schema.len(), 2);
        assert!(schema.contains("z"));
        assert_eq!(schema.require("d").unwrap(), VariableType::Binary);
        assert!(matches!(
            schema.require("y").unwrap_err(),
            FrameError::UnknownColumn { .. }
        ));
    }

    #[test]
    fn test_redeclaration_replaces() {
        let mut schema = Schema::new().with_variable("d", VariableType::Continuous);
        schema.declare("d", VariableType::Binary);
        assert_eq!(schema.get("d"), Some(VariableType::Binary));
    }

    #[test]
    fn test_serde_round_trip() {
        let schema = Schema::new()
            .with_variable("z", VariableType::Continuous)
            .with_variable("d", VariableType::Binary)
            .with_variable("g", VariableType::Categorical);

        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
