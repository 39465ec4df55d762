//! # Form Editor
//!
//! Normalization of a submitted definition form into a reconcilable
//! submission. The host delivers the form as ordered entry lists, keyed by
//! string: a decimal stable id for persisted rows, or a `NEWID<n>`
//! placeholder for rows added in the browser. Entries may carry a structural
//! signal from the no-script fallback buttons.
//!
//! Structural edits are explicit commands applied to the ordered sequence,
//! never numeric offset arithmetic on sort orders:
//! - `Delete` drops the entry.
//! - `MoveUp` swaps the entry with the immediately preceding retained entry.
//! - `MoveDown` defers: the NEXT retained entry is placed before this one,
//!   which is the same swap seen from the other side.
//! - An `add` request appends a fresh placeholder-keyed entry.
//!
//! A no-script form can press at most one button per submission, so exactly
//! one relative swap happens per pass. Sort orders are recomputed 1-based
//! and contiguous from the final order, criteria and comments independently.

use std::collections::BTreeMap;

use crate::types::{DefinitionStatus, DisplayOptions};

// =============================================================================
// SUBMITTED FORM
// =============================================================================

/// Structural command attached to one form entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSignal {
    MoveUp,
    MoveDown,
    Delete,
}

/// One raw entry of a submitted list, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormEntry {
    /// Decimal stable id or `NEWID<n>` placeholder.
    pub key: String,
    /// Field name to submitted string value.
    pub fields: BTreeMap<String, String>,
    pub signal: Option<RowSignal>,
}

/// One submitted list (criteria or comments) plus its add button.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormList {
    pub entries: Vec<FormEntry>,
    /// The list-level "add" button was pressed.
    pub add_requested: bool,
}

/// A complete submitted definition form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    /// Definition-level fields: `name`, `description`, `status`, option
    /// flags, `regrade`.
    pub fields: BTreeMap<String, String>,
    pub criteria: FormList,
    pub comments: FormList,
}

// =============================================================================
// ENTRY KEYS
// =============================================================================

const PLACEHOLDER_PREFIX: &str = "NEWID";

/// Parsed identity of a form entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKey {
    /// A persisted row, identified by its stored id.
    Stable(u64),
    /// A row not yet persisted; the store assigns an id on commit.
    Placeholder(u64),
}

impl EntryKey {
    /// Parse a raw form key. Keys that are neither decimal nor
    /// `NEWID<decimal>` are rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(rest) = raw.strip_prefix(PLACEHOLDER_PREFIX) {
            rest.parse().ok().map(EntryKey::Placeholder)
        } else {
            raw.parse().ok().map(EntryKey::Stable)
        }
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKey::Stable(id) => write!(f, "{id}"),
            EntryKey::Placeholder(n) => write!(f, "{PLACEHOLDER_PREFIX}{n}"),
        }
    }
}

// =============================================================================
// PREPARED OUTPUT
// =============================================================================

/// The sort-order field injected into every prepared entry.
pub const FIELD_SORT_ORDER: &str = "sortorder";

/// One normalized entry: parsed key plus fields with `sortorder` injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEntry {
    pub key: EntryKey,
    pub fields: BTreeMap<String, String>,
}

/// A normalized submission, ready for validation and reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionSubmission {
    pub name: String,
    pub description: String,
    pub status: DefinitionStatus,
    pub options: DisplayOptions,
    /// In final order, sort orders 1-based contiguous.
    pub criteria: Vec<PreparedEntry>,
    pub comments: Vec<PreparedEntry>,
    /// The author confirmed a regrade of existing instances.
    pub regrade: bool,
}

/// Result of a preparation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub submission: DefinitionSubmission,
    /// A structural button was pressed; the host must redisplay the form
    /// instead of committing.
    pub signal_pressed: bool,
    /// The pass left no criteria at all.
    pub missing_criteria: bool,
}

// =============================================================================
// PREPARATION
// =============================================================================

/// Normalize a submitted form: resolve structural signals, renumber sort
/// orders, parse definition-level fields.
#[must_use]
pub fn prepare(raw: &FormData) -> Prepared {
    let (criteria, criteria_signal) = prepare_list(&raw.criteria);
    let (comments, comments_signal) = prepare_list(&raw.comments);

    let field = |name: &str| raw.fields.get(name).map(String::as_str);
    let flag = |name: &str, default: bool| field(name).map_or(default, truthy);

    let defaults = DisplayOptions::default();
    let submission = DefinitionSubmission {
        name: field("name").unwrap_or_default().to_string(),
        description: field("description").unwrap_or_default().to_string(),
        status: if field("status").is_some_and(|s| s.eq_ignore_ascii_case("ready")) {
            DefinitionStatus::Ready
        } else {
            DefinitionStatus::Draft
        },
        options: DisplayOptions {
            always_show_definition: flag(
                "alwaysshowdefinition",
                defaults.always_show_definition,
            ),
            show_marks_per_criterion: flag(
                "showmarkspercriterion",
                defaults.show_marks_per_criterion,
            ),
            show_description_to_students: flag(
                "showdescriptionstudents",
                defaults.show_description_to_students,
            ),
        },
        regrade: flag("regrade", false),
        criteria,
        comments,
    };
    let missing_criteria = submission.criteria.is_empty();
    Prepared {
        submission,
        signal_pressed: criteria_signal || comments_signal,
        missing_criteria,
    }
}

/// Resolve one list: signals, placement, renumbering. Returns the prepared
/// entries and whether any structural button fired.
fn prepare_list(list: &FormList) -> (Vec<PreparedEntry>, bool) {
    let mut out: Vec<PreparedEntry> = Vec::new();
    let mut signal_pressed = list.add_requested;
    // Set when a MoveDown defers placement to the next retained entry.
    let mut swap_with_previous = false;

    for entry in &list.entries {
        let Some(key) = EntryKey::parse(&entry.key) else {
            continue;
        };
        let mut place_before_previous = swap_with_previous;
        swap_with_previous = false;
        match entry.signal {
            Some(RowSignal::Delete) => {
                signal_pressed = true;
                continue;
            }
            Some(RowSignal::MoveUp) => {
                signal_pressed = true;
                place_before_previous = true;
            }
            Some(RowSignal::MoveDown) => {
                signal_pressed = true;
                swap_with_previous = true;
            }
            None => {}
        }

        let prepared = PreparedEntry {
            key,
            fields: entry.fields.clone(),
        };
        if place_before_previous && !out.is_empty() {
            let at = out.len() - 1;
            out.insert(at, prepared);
        } else {
            out.push(prepared);
        }
    }

    if list.add_requested {
        out.push(PreparedEntry {
            key: EntryKey::Placeholder(next_placeholder(list)),
            fields: BTreeMap::new(),
        });
    }

    for (position, entry) in out.iter_mut().enumerate() {
        let order = position.saturating_add(1);
        entry
            .fields
            .insert(FIELD_SORT_ORDER.to_string(), order.to_string());
    }
    (out, signal_pressed)
}

/// Allocate the next placeholder number: one past the largest already
/// present in the submission.
fn next_placeholder(list: &FormList) -> u64 {
    list.entries
        .iter()
        .filter_map(|entry| match EntryKey::parse(&entry.key) {
            Some(EntryKey::Placeholder(n)) => Some(n),
            _ => None,
        })
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, signal: Option<RowSignal>) -> FormEntry {
        let mut fields = BTreeMap::new();
        fields.insert("shortname".to_string(), key.to_string());
        FormEntry {
            key: key.to_string(),
            fields,
            signal,
        }
    }

    fn keys(entries: &[PreparedEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key.to_string()).collect()
    }

    fn orders(entries: &[PreparedEntry]) -> Vec<&str> {
        entries
            .iter()
            .map(|e| e.fields[FIELD_SORT_ORDER].as_str())
            .collect()
    }

    #[test]
    fn entry_keys_parse_both_forms() {
        assert_eq!(EntryKey::parse("17"), Some(EntryKey::Stable(17)));
        assert_eq!(EntryKey::parse("NEWID3"), Some(EntryKey::Placeholder(3)));
        assert_eq!(EntryKey::parse("NEWID"), None);
        assert_eq!(EntryKey::parse("bogus"), None);
        assert_eq!(EntryKey::parse("NEWID2").map(|k| k.to_string()), Some("NEWID2".to_string()));
    }

    #[test]
    fn move_up_swaps_with_preceding_entry() {
        let list = FormList {
            entries: vec![
                entry("1", None),
                entry("2", Some(RowSignal::MoveUp)),
                entry("3", None),
            ],
            add_requested: false,
        };
        let (out, signal) = prepare_list(&list);
        assert!(signal);
        assert_eq!(keys(&out), ["2", "1", "3"]);
        assert_eq!(orders(&out), ["1", "2", "3"]);
    }

    #[test]
    fn move_up_on_first_entry_is_a_no_op() {
        let list = FormList {
            entries: vec![entry("1", Some(RowSignal::MoveUp)), entry("2", None)],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["1", "2"]);
    }

    #[test]
    fn move_down_swaps_with_following_entry() {
        let list = FormList {
            entries: vec![
                entry("1", Some(RowSignal::MoveDown)),
                entry("2", None),
                entry("3", None),
            ],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["2", "1", "3"]);
    }

    #[test]
    fn move_down_on_last_entry_is_a_no_op() {
        let list = FormList {
            entries: vec![entry("1", None), entry("2", Some(RowSignal::MoveDown))],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["1", "2"]);
    }

    #[test]
    fn move_skips_over_deleted_entries() {
        let list = FormList {
            entries: vec![
                entry("1", None),
                entry("2", Some(RowSignal::Delete)),
                entry("3", Some(RowSignal::MoveUp)),
            ],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["3", "1"]);
        assert_eq!(orders(&out), ["1", "2"]);
    }

    #[test]
    fn delete_renumbers_contiguously() {
        let list = FormList {
            entries: vec![
                entry("1", None),
                entry("2", Some(RowSignal::Delete)),
                entry("3", None),
            ],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["1", "3"]);
        assert_eq!(orders(&out), ["1", "2"]);
    }

    #[test]
    fn add_appends_next_placeholder() {
        let list = FormList {
            entries: vec![entry("4", None), entry("NEWID2", None)],
            add_requested: true,
        };
        let (out, signal) = prepare_list(&list);
        assert!(signal);
        assert_eq!(keys(&out), ["4", "NEWID2", "NEWID3"]);
    }

    #[test]
    fn add_to_empty_list_starts_at_one() {
        let list = FormList {
            entries: vec![],
            add_requested: true,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["NEWID1"]);
    }

    #[test]
    fn malformed_keys_are_dropped() {
        let list = FormList {
            entries: vec![entry("bogus", None), entry("2", None)],
            add_requested: false,
        };
        let (out, _) = prepare_list(&list);
        assert_eq!(keys(&out), ["2"]);
    }

    #[test]
    fn definition_fields_fall_back_to_defaults() {
        let prepared = prepare(&FormData::default());
        assert!(prepared.missing_criteria);
        assert!(!prepared.signal_pressed);
        assert_eq!(prepared.submission.status, DefinitionStatus::Draft);
        assert_eq!(prepared.submission.options, DisplayOptions::default());
        assert!(!prepared.submission.regrade);
    }

    #[test]
    fn submitted_unchecked_option_clears_the_flag() {
        let mut raw = FormData::default();
        raw.fields
            .insert("showmarkspercriterion".to_string(), "0".to_string());
        raw.fields.insert("status".to_string(), "ready".to_string());
        let prepared = prepare(&raw);
        assert!(!prepared.submission.options.show_marks_per_criterion);
        assert!(prepared.submission.options.always_show_definition);
        assert_eq!(prepared.submission.status, DefinitionStatus::Ready);
    }
}
