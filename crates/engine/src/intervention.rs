//! Intervention targets for `do(T = t)`.
//!
//! An intervention names the value(s) the treatment column(s) are forced to.
//! Three shapes are accepted: one scalar broadcast to every unit and every
//! treatment variable, a named per-treatment map for multi-treatment
//! estimands, and a per-unit vector for single-treatment estimands. Shape
//! checking happens before any stage mutates state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Requested treatment value(s) for an intervention.
///
/// # Example
///
/// ```rust
/// use dosample_engine::Intervention;
///
/// // Force every unit's treatment to 1.
/// let all_on = Intervention::Scalar(1.0);
///
/// // Different value per treatment variable.
/// let mixed = Intervention::per_treatment(&[("price", 9.99), ("promo", 1.0)]);
///
/// assert_ne!(all_on, mixed);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intervention {
    /// One value for all units and all treatment variables.
    Scalar(f64),
    /// One value per unit; only valid for a single treatment variable.
    PerUnit(Vec<f64>),
    /// One value per treatment variable, broadcast to all units.
    PerTreatment(BTreeMap<String, f64>),
}

/// One treatment variable's resolved target series.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TargetSeries<'a> {
    /// The same value for every unit.
    Broadcast(f64),
    /// A value per unit, parallel to the table rows.
    PerUnit(&'a [f64]),
}

impl TargetSeries<'_> {
    pub(crate) fn at(&self, row: usize) -> f64 {
        match self {
            TargetSeries::Broadcast(v) => *v,
            TargetSeries::PerUnit(values) => values[row],
        }
    }
}

impl Intervention {
    /// Build a [`Intervention::PerTreatment`] from name/value pairs.
    pub fn per_treatment(values: &[(&str, f64)]) -> Self {
        Intervention::PerTreatment(
            values
                .iter()
                .map(|(name, v)| (name.to_string(), *v))
                .collect(),
        )
    }

    /// Check shape and finiteness against the estimand, and resolve into one
    /// target series per treatment variable (in `treatments` order).
    ///
    /// # Errors
    /// [`EngineError::InterventionSpec`] on non-finite values, a per-unit
    /// vector whose length disagrees with the table, a per-unit vector with
    /// multiple treatment variables, or a per-treatment map whose keys do not
    /// exactly cover the treatment set.
    pub(crate) fn resolve<'a>(
        &'a self,
        treatments: &[String],
        n_rows: usize,
    ) -> Result<Vec<TargetSeries<'a>>, EngineError> {
        match self {
            Intervention::Scalar(v) => {
                require_finite(*v)?;
                Ok(treatments.iter().map(|_| TargetSeries::Broadcast(*v)).collect())
            }
            Intervention::PerUnit(values) => {
                if treatments.len() != 1 {
                    return Err(EngineError::InterventionSpec {
                        reason: format!(
                            "per-unit intervention requires exactly one treatment variable, estimand has {}",
                            treatments.len()
                        ),
                    });
                }
                if values.len() != n_rows {
                    return Err(EngineError::InterventionSpec {
                        reason: format!(
                            "per-unit intervention has {} values for {} rows",
                            values.len(),
                            n_rows
                        ),
                    });
                }
                for &v in values {
                    require_finite(v)?;
                }
                Ok(vec![TargetSeries::PerUnit(values)])
            }
            Intervention::PerTreatment(map) => {
                for name in map.keys() {
                    if !treatments.iter().any(|t| t == name) {
                        return Err(EngineError::InterventionSpec {
                            reason: format!("`{name}` is not a treatment variable"),
                        });
                    }
                }
                let mut series = Vec::with_capacity(treatments.len());
                for name in treatments {
                    let v = map.get(name).copied().ok_or_else(|| {
                        EngineError::InterventionSpec {
                            reason: format!("no value supplied for treatment `{name}`"),
                        }
                    })?;
                    require_finite(v)?;
                    series.push(TargetSeries::Broadcast(v));
                }
                Ok(series)
            }
        }
    }
}

fn require_finite(v: f64) -> Result<(), EngineError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(EngineError::InterventionSpec {
            reason: format!("intervention value {v} is not finite"),
        })
    }
}
