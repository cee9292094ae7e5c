//! The identification contract consumed by the engine.
//!
//! Identification itself (graph analysis, back-door/instrument search) is an
//! external collaborator. Its finished answer arrives here as an
//! [`IdentifiedEstimand`]: which variables are treatments, which are
//! outcomes, which adjustment set blocks the confounding paths, and whether
//! the effect is identified at all. The engine only reads this record; it
//! never second-guesses it.

use serde::{Deserialize, Serialize};

/// Immutable output of an identification procedure.
///
/// # Example
///
/// ```rust
/// use dosample_engine::IdentifiedEstimand;
///
/// let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"]);
/// assert!(estimand.is_identified());
/// assert_eq!(estimand.adjustment_set(), &["z".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedEstimand {
    treatments: Vec<String>,
    outcomes: Vec<String>,
    adjustment_set: Vec<String>,
    instruments: Vec<String>,
    identified: bool,
}

impl IdentifiedEstimand {
    /// An estimand identified through a back-door adjustment set.
    pub fn backdoor(treatments: &[&str], outcomes: &[&str], adjustment_set: &[&str]) -> Self {
        Self {
            treatments: to_owned(treatments),
            outcomes: to_owned(outcomes),
            adjustment_set: to_owned(adjustment_set),
            instruments: Vec::new(),
            identified: true,
        }
    }

    /// An estimand the identifier could not certify (e.g., an unobserved
    /// confounder). Construction of a sampler from this fails unless the
    /// caller opts in to proceeding.
    pub fn unidentified(treatments: &[&str], outcomes: &[&str]) -> Self {
        Self {
            treatments: to_owned(treatments),
            outcomes: to_owned(outcomes),
            adjustment_set: Vec::new(),
            instruments: Vec::new(),
            identified: false,
        }
    }

    /// Attach instrument names, builder-style.
    pub fn with_instruments(mut self, instruments: &[&str]) -> Self {
        self.instruments = to_owned(instruments);
        self
    }

    /// Attach an adjustment set, builder-style.
    pub fn with_adjustment_set(mut self, adjustment_set: &[&str]) -> Self {
        self.adjustment_set = to_owned(adjustment_set);
        self
    }

    /// Treatment variable names.
    pub fn treatments(&self) -> &[String] {
        &self.treatments
    }

    /// Outcome variable names.
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    /// Back-door adjustment set (common causes).
    pub fn adjustment_set(&self) -> &[String] {
        &self.adjustment_set
    }

    /// Instrument names, if the identifier found any.
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Whether the identifier certified the effect as identified.
    pub fn is_identified(&self) -> bool {
        self.identified
    }

    /// All variable names the estimand references, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &String> {
        self.treatments
            .iter()
            .chain(&self.outcomes)
            .chain(&self.adjustment_set)
            .chain(&self.instruments)
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backdoor_is_identified() {
        let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z", "w"]);
        assert!(estimand.is_identified());
        assert_eq!(estimand.treatments(), &["d".to_string()]);
        assert_eq!(estimand.adjustment_set().len(), 2);
        assert!(estimand.instruments().is_empty());
    }

    #[test]
    fn test_unidentified_flag() {
        let estimand = IdentifiedEstimand::unidentified(&["d"], &["y"]);
        assert!(!estimand.is_identified());
        assert!(estimand.adjustment_set().is_empty());
    }

    #[test]
    fn test_variables_covers_all_roles() {
        let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"])
            .with_instruments(&["iv"]);
        let vars: Vec<&str> = estimand.variables().map(String::as_str).collect();
        assert_eq!(vars, vec!["d", "y", "z", "iv"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"]);
        let json = serde_json::to_string(&estimand).unwrap();
        let back: IdentifiedEstimand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, estimand);
    }
}
