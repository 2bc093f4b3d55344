//! Conversion of wait-loop iteration counts into cycles.
//!
//! A [`Calibration`] is bound to one hardware target and, when known, to the
//! fingerprint of the loop body it was taken for. Two providers exist:
//! - [`StaticTable`]: per-target cycles-per-iteration from the instruction
//!   listing of the compiled loop
//! - [`EmpiricalProvider`]: per-target regression of zone cycles on counter
//!   iterations from matched profiler/counter runs
//!
//! The provider is chosen through [`CalibrationSpec`] in the configuration.

mod empirical;
mod target;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

pub use empirical::{fit_pairs, CalibrationPair, RegressionFit, MIN_CALIBRATION_PAIRS};
pub use target::{LoopBody, LoopInstruction, TargetId};

/// How a calibration was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum CalibrationMethod {
    /// Summed instruction costs.
    Static,
    /// Least-squares fit over matched runs.
    Empirical {
        /// Fit details.
        fit: RegressionFit,
    },
}

/// Iteration-count to cycles mapping for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Target the numbers were taken on.
    pub target: TargetId,
    /// Cycles per wait-loop iteration.
    pub cycles_per_iteration: f64,
    /// Loop body the calibration is valid for, when known.
    pub loop_fingerprint: Option<u64>,
    /// Provenance.
    pub method: CalibrationMethod,
}

impl Calibration {
    /// Estimated blocked cycles for `iterations` loop iterations.
    pub fn blocked_cycles(&self, iterations: u32) -> f64 {
        f64::from(iterations) * self.cycles_per_iteration
    }

    /// Check that this calibration still matches the loop body in use.
    pub fn validate(&self, body: &LoopBody) -> Result<(), CalibrationError> {
        match self.loop_fingerprint {
            Some(expected) if expected != body.fingerprint() => Err(CalibrationError::Invalidated {
                target: self.target.key(),
                expected,
                actual: body.fingerprint(),
            }),
            _ => Ok(()),
        }
    }
}

/// Source of calibrations: `target -> cycles-per-iteration`.
pub trait CalibrationProvider: Send + Sync {
    /// Calibration for one target.
    fn calibrate(&self, target: &TargetId) -> Result<Calibration, CalibrationError>;
}

/// One row of a static table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticEntry {
    /// Known constant, fingerprint unknown.
    Cycles(f64),
    /// Loop listing to be costed.
    Body(LoopBody),
}

/// Static per-target lookup table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTable {
    #[serde(deserialize_with = "normalized_keys")]
    entries: BTreeMap<String, StaticEntry>,
}

/// Table keys are stored the way [`TargetId::key`] renders them.
fn normalized_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, StaticEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, StaticEntry>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, entry)| (TargetId::from_key(key.trim()).key(), entry))
        .collect())
}

impl StaticTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering the accelerator generations the device profiler reports.
    pub fn builtin() -> Self {
        let body = LoopBody::counter_poll_loop();
        Self::new()
            .with_body(TargetId::new("grayskull"), body.clone())
            .with_body(TargetId::new("wormhole_b0"), body.clone())
            .with_body(TargetId::new("blackhole"), body)
    }

    /// Add a constant entry.
    pub fn with_cycles(mut self, target: TargetId, cycles_per_iteration: f64) -> Self {
        self.entries.insert(target.key(), StaticEntry::Cycles(cycles_per_iteration));
        self
    }

    /// Add an entry costed from a loop listing.
    pub fn with_body(mut self, target: TargetId, body: LoopBody) -> Self {
        self.entries.insert(target.key(), StaticEntry::Body(body));
        self
    }

    /// Number of targets covered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CalibrationProvider for StaticTable {
    fn calibrate(&self, target: &TargetId) -> Result<Calibration, CalibrationError> {
        // A revision-qualified lookup falls back to the bare architecture.
        let entry = self
            .entries
            .get(&target.key())
            .or_else(|| self.entries.get(&target.arch))
            .ok_or_else(|| CalibrationError::UnknownTarget { target: target.key() })?;

        let (cycles_per_iteration, loop_fingerprint) = match entry {
            StaticEntry::Cycles(c) => (*c, None),
            StaticEntry::Body(body) => (body.cycles_per_iteration(), Some(body.fingerprint())),
        };
        Ok(Calibration {
            target: target.clone(),
            cycles_per_iteration,
            loop_fingerprint,
            method: CalibrationMethod::Static,
        })
    }
}

/// Regression-backed provider holding matched pairs per target.
#[derive(Debug, Clone, Default)]
pub struct EmpiricalProvider {
    pairs: BTreeMap<String, Vec<CalibrationPair>>,
    loop_fingerprint: Option<u64>,
}

impl EmpiricalProvider {
    /// Provider with no pairs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every produced calibration to a loop body.
    pub fn for_loop_body(mut self, body: &LoopBody) -> Self {
        self.loop_fingerprint = Some(body.fingerprint());
        self
    }

    /// Add matched pairs for a target.
    pub fn add_pairs(&mut self, target: &TargetId, pairs: impl IntoIterator<Item = CalibrationPair>) {
        self.pairs.entry(target.key()).or_default().extend(pairs);
    }

    /// Pairs collected for a target.
    pub fn pairs(&self, target: &TargetId) -> &[CalibrationPair] {
        self.pairs.get(&target.key()).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl CalibrationProvider for EmpiricalProvider {
    fn calibrate(&self, target: &TargetId) -> Result<Calibration, CalibrationError> {
        let pairs = self
            .pairs
            .get(&target.key())
            .ok_or_else(|| CalibrationError::UnknownTarget { target: target.key() })?;
        let fit = fit_pairs(pairs)?;
        Ok(Calibration {
            target: target.clone(),
            cycles_per_iteration: fit.slope,
            loop_fingerprint: self.loop_fingerprint,
            method: CalibrationMethod::Empirical { fit },
        })
    }
}

/// Configured calibration strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CalibrationSpec {
    /// Use a static table.
    Static {
        /// Per-target entries.
        table: StaticTable,
    },
    /// Fit from the profiler and counter runs in the input tree.
    Empirical,
}

impl Default for CalibrationSpec {
    fn default() -> Self {
        CalibrationSpec::Static {
            table: StaticTable::builtin(),
        }
    }
}
