//! Hardware targets and the instruction listing of a wait loop.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Silicon a calibration applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
    /// Architecture name as reported by the device log preamble.
    pub arch: String,
    /// Optional silicon revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl TargetId {
    /// Target without a revision qualifier.
    pub fn new(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into().to_ascii_lowercase(),
            revision: None,
        }
    }

    /// Target qualified by revision.
    pub fn with_revision(arch: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            arch: arch.into().to_ascii_lowercase(),
            revision: Some(revision.into()),
        }
    }

    /// Table key: `arch` or `arch/revision`.
    pub fn key(&self) -> String {
        match &self.revision {
            Some(rev) => format!("{}/{}", self.arch, rev),
            None => self.arch.clone(),
        }
    }

    /// Parse a table key.
    pub fn from_key(key: &str) -> Self {
        match key.split_once('/') {
            Some((arch, rev)) => Self::with_revision(arch, rev),
            None => Self::new(key),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One instruction of a compiled loop body with its issue cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopInstruction {
    /// Assembly mnemonic with operands, as listed by the disassembler.
    pub text: String,
    /// Cycles the instruction occupies on the target.
    pub cycles: f64,
}

impl LoopInstruction {
    /// Instruction with a cost.
    pub fn new(text: impl Into<String>, cycles: f64) -> Self {
        Self { text: text.into(), cycles }
    }
}

/// Instruction listing of one wait-loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopBody {
    /// Instructions executed once per iteration.
    pub instructions: Vec<LoopInstruction>,
    /// Pipeline refill cost of a mispredicted back-edge.
    #[serde(default)]
    pub mispredict_penalty_cycles: f64,
    /// Fraction of iterations that mispredict.
    #[serde(default)]
    pub mispredict_rate: f64,
}

impl LoopBody {
    /// Counter-instrumented poll loop on the compute RISC cores:
    /// poll the received-tiles register, compare-and-branch, bump the counter.
    pub fn counter_poll_loop() -> Self {
        Self {
            instructions: vec![
                LoopInstruction::new("lw a5, 0(a4)", 2.0),
                LoopInstruction::new("addi a3, a3, 1", 1.0),
                LoopInstruction::new("bltu a5, a2, .poll", 1.0),
            ],
            mispredict_penalty_cycles: 3.0,
            mispredict_rate: 0.0,
        }
    }

    /// Static cost of one iteration.
    pub fn cycles_per_iteration(&self) -> f64 {
        let issue: f64 = self.instructions.iter().map(|i| i.cycles).sum();
        issue + self.mispredict_penalty_cycles * self.mispredict_rate
    }

    /// Stable hash of the instruction sequence (FNV-1a over the listing).
    ///
    /// Costs are not part of the fingerprint: changing the listing invalidates
    /// a calibration, re-costing the same listing does not.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for instruction in &self.instructions {
            for byte in instruction.text.trim().bytes().chain(std::iter::once(b'\n')) {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_round_trip() {
        let t = TargetId::with_revision("Wormhole_B0", "a0");
        assert_eq!(t.key(), "wormhole_b0/a0");
        assert_eq!(TargetId::from_key(&t.key()), t);
        assert_eq!(TargetId::from_key("blackhole").revision, None);
    }

    #[test]
    fn test_counter_loop_within_cost_target() {
        let body = LoopBody::counter_poll_loop();
        assert!(body.cycles_per_iteration() <= 5.0, "{}", body.cycles_per_iteration());
    }

    #[test]
    fn test_fingerprint_tracks_listing_not_costs() {
        let body = LoopBody::counter_poll_loop();
        let mut recosted = body.clone();
        recosted.instructions[0].cycles = 4.0;
        assert_eq!(body.fingerprint(), recosted.fingerprint());

        let mut changed = body.clone();
        changed.instructions.push(LoopInstruction::new("nop", 1.0));
        assert_ne!(body.fingerprint(), changed.fingerprint());
    }
}
