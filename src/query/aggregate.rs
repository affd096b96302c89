//! Step-wise reductions across runs
//!
//! Every run in the set contributes one value per step; step `i` of the
//! output reduces the values at step `i` of every run. Runs must agree on
//! their number of steps and carry a numeric value for the key at every step.

use tracing::debug;

use crate::root::RunSet;
use crate::{Error, Result};

/// Reduction applied per step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Arithmetic mean
    Mean,
    /// Median (the 0.5 quantile)
    Median,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Quantile `q` in `[0, 1]`, linearly interpolated between order statistics
    Quantile(f64),
}

impl Aggregation {
    /// Name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Quantile(_) => "quantile",
        }
    }

    /// Check parameters.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if a quantile is outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Quantile(q) if !(0.0..=1.0).contains(q) => Err(Error::InvalidInput(format!(
                "quantile must be within [0, 1], got {q}"
            ))),
            _ => Ok(()),
        }
    }

    /// Reduce a non-empty slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` for an out-of-range quantile
    pub fn reduce(&self, values: &[f64]) -> Result<f64> {
        self.validate()?;
        let result = match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Median => quantile(values, 0.5),
            Self::Quantile(q) => quantile(values, *q),
        };
        Ok(result)
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Reduce `key` step by step across every run in `set`.
pub(crate) fn aggregate<S: RunSet + ?Sized>(set: &S, key: &str, aggr: Aggregation) -> Result<Vec<f64>> {
    aggr.validate()?;
    let runs = set.get(None)?.into_runs();
    let Some(first) = runs.first() else {
        return Err(Error::EmptyAggregation(key.to_string()));
    };
    let steps = first.log().len();

    // columns[step] holds one value per run
    let mut columns = vec![Vec::with_capacity(runs.len()); steps];
    for run in &runs {
        if run.log().len() != steps {
            return Err(Error::ShapeMismatch {
                uuid: run.uuid().to_string(),
                expected: steps,
                found: run.log().len(),
            });
        }
        for (step, row) in run.log().iter().enumerate() {
            let value = row.get(key).ok_or_else(|| Error::MissingValue {
                uuid: run.uuid().to_string(),
                key: key.to_string(),
                step,
            })?;
            let number = value.as_f64().ok_or_else(|| Error::NonNumeric {
                uuid: run.uuid().to_string(),
                key: key.to_string(),
                step,
            })?;
            columns[step].push(number);
        }
    }

    debug!(key, aggregation = aggr.as_str(), runs = runs.len(), steps, "aggregating");
    columns.iter().map(|column| aggr.reduce(column)).collect()
}
