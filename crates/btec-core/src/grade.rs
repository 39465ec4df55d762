//! # Grade Aggregator
//!
//! Pure derivation of the overall BTEC grade from per-criterion results.
//!
//! The input is an unordered set of `(level, score)` pairs, one per scored
//! criterion. The output is deterministic and order-independent:
//! - Per level, a tri-state flag: `Absent` (no criteria at that level),
//!   `Met` (criteria exist and none scored zero) or `NotMet`.
//! - A zero cascades upward: a failed Pass criterion fails Merit and
//!   Distinction too, even when those levels have no criteria of their own.
//! - The grade is the highest tier whose flag is `Met` while every lower
//!   tier is `Met` or `Absent`; otherwise `Refer`.

use crate::types::{Grade, Level};

// =============================================================================
// INPUT & FLAGS
// =============================================================================

/// One scored criterion, reduced to the two facts the aggregator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriterionResult {
    pub level: Level,
    /// 0 = not met, nonzero = met.
    pub score: i64,
}

/// Aggregated state of one achievement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFlag {
    /// The definition has no criteria at this level.
    Absent,
    /// Every criterion at this level was met.
    Met,
    /// Some criterion at this level (or a lower one) scored zero.
    NotMet,
}

impl LevelFlag {
    /// True unless the level was explicitly failed.
    #[must_use]
    pub fn met_or_absent(self) -> bool {
        !matches!(self, LevelFlag::NotMet)
    }
}

// =============================================================================
// AGGREGATION
// =============================================================================

/// Compute the per-level flags for a set of results, indexed by
/// [`Level::index`].
///
/// Two passes: presence first, then zero-score cascade. The cascade runs
/// from the failed level upward, so a zero at Pass overrides `Absent` at
/// Merit and Distinction.
#[must_use]
pub fn level_flags(results: &[CriterionResult]) -> [LevelFlag; 3] {
    let mut flags = [LevelFlag::Absent; 3];
    for result in results {
        flags[result.level.index()] = LevelFlag::Met;
    }
    for result in results {
        if result.score == 0 {
            for flag in &mut flags[result.level.index()..] {
                *flag = LevelFlag::NotMet;
            }
        }
    }
    flags
}

/// Reduce a set of criterion results to the overall grade.
///
/// An empty set yields `Refer`: nothing was demonstrated.
#[must_use]
pub fn aggregate(results: &[CriterionResult]) -> Grade {
    let [pass, merit, distinction] = level_flags(results);
    if distinction == LevelFlag::Met && pass.met_or_absent() && merit.met_or_absent() {
        Grade::Distinction
    } else if merit == LevelFlag::Met && pass.met_or_absent() {
        Grade::Merit
    } else if pass == LevelFlag::Met {
        Grade::Pass
    } else {
        Grade::Refer
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(level: Level, score: i64) -> CriterionResult {
        CriterionResult { level, score }
    }

    #[test]
    fn empty_results_refer() {
        assert_eq!(aggregate(&[]), Grade::Refer);
    }

    #[test]
    fn all_pass_met_is_pass() {
        let results = [result(Level::Pass, 1), result(Level::Pass, 1)];
        assert_eq!(aggregate(&results), Grade::Pass);
    }

    #[test]
    fn failed_merit_caps_at_pass() {
        let results = [
            result(Level::Pass, 1),
            result(Level::Merit, 0),
            result(Level::Distinction, 1),
        ];
        assert_eq!(aggregate(&results), Grade::Pass);
    }

    #[test]
    fn failed_pass_cascades_to_refer() {
        let results = [
            result(Level::Pass, 0),
            result(Level::Merit, 1),
            result(Level::Distinction, 1),
        ];
        assert_eq!(aggregate(&results), Grade::Refer);
    }

    #[test]
    fn absent_merit_does_not_block_distinction() {
        let results = [result(Level::Pass, 1), result(Level::Distinction, 1)];
        assert_eq!(aggregate(&results), Grade::Distinction);
    }

    #[test]
    fn failed_distinction_leaves_merit() {
        let results = [
            result(Level::Pass, 1),
            result(Level::Merit, 1),
            result(Level::Distinction, 0),
        ];
        assert_eq!(aggregate(&results), Grade::Merit);
    }

    #[test]
    fn cascade_overrides_absent_levels() {
        // A failed Pass fails Merit even though Merit has no criteria.
        let flags = level_flags(&[result(Level::Pass, 0)]);
        assert_eq!(flags, [LevelFlag::NotMet, LevelFlag::NotMet, LevelFlag::NotMet]);
    }

    #[test]
    fn flags_track_presence() {
        let flags = level_flags(&[result(Level::Merit, 1)]);
        assert_eq!(flags, [LevelFlag::Absent, LevelFlag::Met, LevelFlag::Absent]);
    }
}
