//! # Validation
//!
//! Rule checks for definitions and submitted scores. Violations are not
//! errors: every check runs to completion, all findings accumulate in a
//! report, and the report renders to user-facing text. An operation is
//! blocked only when its report is non-empty.
//!
//! Definition readiness rules:
//! - at least one criterion exists;
//! - every shortname is non-empty after whitespace stripping;
//! - every shortname starts with P, M or D (case-insensitive);
//! - every shortname ends with a digit;
//! - no two shortnames are identical (case-sensitive, stripped).

use std::collections::BTreeMap;

use crate::editor::DefinitionSubmission;
use crate::types::{Criterion, CriterionId, Shortname};

// =============================================================================
// DEFINITION READINESS
// =============================================================================

/// Collected readiness violations, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<String>,
}

impl ValidationReport {
    /// True when no rule was violated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.violations.join("\n"))
    }
}

/// Check every readiness rule against a prepared submission.
#[must_use]
pub fn validate_definition(submission: &DefinitionSubmission) -> ValidationReport {
    let mut report = ValidationReport::default();

    if submission.criteria.is_empty() {
        report
            .violations
            .push("The marking scheme must contain at least one criterion".to_string());
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let shortnames: Vec<Shortname> = submission
        .criteria
        .iter()
        .map(|entry| {
            Shortname::new(entry.fields.get("shortname").map_or("", String::as_str))
        })
        .collect();

    for (index, shortname) in shortnames.iter().enumerate() {
        let position = index.saturating_add(1);
        if shortname.is_empty() {
            report
                .violations
                .push(format!("Criterion {position}: the shortname is empty"));
            continue;
        }
        if shortname.level().is_none() {
            report.violations.push(format!(
                "Criterion {position} ({shortname}): the shortname must start with P, M or D"
            ));
        }
        if !shortname.ends_with_digit() {
            report.violations.push(format!(
                "Criterion {position} ({shortname}): the shortname must end with a number"
            ));
        }
        if let Some(first) = seen.get(shortname.as_str()) {
            report.violations.push(format!(
                "Criterion {position} ({shortname}): duplicate of criterion {first}"
            ));
        } else {
            seen.insert(shortname.as_str(), position);
        }
    }
    report
}

// =============================================================================
// SCORE VALIDATION
// =============================================================================

/// One raw score submission for a criterion, as entered by the marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedScore {
    pub score: String,
    pub remark: String,
}

/// A parsed, rule-clean score ready to become a filling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScore {
    /// Non-negative; 0 = not met.
    pub score: i64,
    pub remark: String,
}

/// Score violations plus the entries that did parse cleanly. Any violation
/// blocks submission; the parsed map is only used when the report is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreReport {
    pub violations: Vec<String>,
    pub parsed: BTreeMap<CriterionId, ParsedScore>,
}

impl ScoreReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.violations.join("\n"))
    }
}

/// Check submitted scores against a definition's criteria. Every criterion
/// must carry a score that parses as a non-negative integer; submissions
/// for unknown criteria are ignored.
#[must_use]
pub fn validate_scores(
    criteria: &[Criterion],
    submitted: &BTreeMap<CriterionId, SubmittedScore>,
) -> ScoreReport {
    let mut report = ScoreReport::default();
    for criterion in criteria {
        let shortname = &criterion.shortname;
        let Some(raw) = submitted.get(&criterion.id) else {
            report
                .violations
                .push(format!("{shortname}: no score was submitted"));
            continue;
        };
        match raw.score.trim().parse::<i64>() {
            Ok(score) if score >= 0 => {
                report.parsed.insert(
                    criterion.id,
                    ParsedScore {
                        score,
                        remark: raw.remark.clone(),
                    },
                );
            }
            Ok(_) => {
                report
                    .violations
                    .push(format!("{shortname}: the score must not be negative"));
            }
            Err(_) => {
                report
                    .violations
                    .push(format!("{shortname}: the score must be a whole number"));
            }
        }
    }
    report
}

// =============================================================================
// TESTS
// =============================================================================
