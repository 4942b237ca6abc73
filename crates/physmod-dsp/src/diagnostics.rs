/// Counters for the numerical guard rails on the per-sample path.
///
/// The sample loop only increments these; the host drains them with
/// `Instrument::take_guard_stats` and reports however it likes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// Implicit solves that missed their iteration budget.
    pub solver_fallbacks: u64,
    /// Interaction forces that came out NaN or infinite and were zeroed.
    pub non_finite_forces: u64,
    /// Modules whose state diverged and was cleared.
    pub divergence_resets: u64,
    /// Output frames that were non-finite and replaced by silence.
    pub non_finite_output: u64,
    /// Staged edits or events that no longer applied when their turn came.
    pub dropped_edits: u64,
}

impl GuardStats {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    /// Add another set of counters into this one.
    pub fn merge(&mut self, other: &GuardStats) {
        self.solver_fallbacks += other.solver_fallbacks;
        self.non_finite_forces += other.non_finite_forces;
        self.divergence_resets += other.divergence_resets;
        self.non_finite_output += other.non_finite_output;
        self.dropped_edits += other.dropped_edits;
    }

    pub fn total(&self) -> u64 {
        self.solver_fallbacks
            + self.non_finite_forces
            + self.divergence_resets
            + self.non_finite_output
            + self.dropped_edits
    }

    /// Log a summary at WARN if anything fired.
    pub fn report(&self) {
        if !self.is_clean() {
            tracing::warn!(
                solver_fallbacks = self.solver_fallbacks,
                non_finite_forces = self.non_finite_forces,
                divergence_resets = self.divergence_resets,
                non_finite_output = self.non_finite_output,
                dropped_edits = self.dropped_edits,
                "numerical guard rails fired"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_and_total() {
        let mut s = GuardStats::default();
        assert!(s.is_clean());
        s.solver_fallbacks = 2;
        s.divergence_resets = 1;
        assert!(!s.is_clean());
        assert_eq!(s.total(), 3);
    }

    #[test]
    fn test_merge_adds_counters() {
        let mut a = GuardStats {
            non_finite_output: 1,
            ..GuardStats::default()
        };
        let b = GuardStats {
            non_finite_output: 2,
            dropped_edits: 4,
            ..GuardStats::default()
        };
        a.merge(&b);
        assert_eq!(a.non_finite_output, 3);
        assert_eq!(a.dropped_edits, 4);
        assert_eq!(a.total(), 7);
    }
}
