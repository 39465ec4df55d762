//! # Form Adaptation Tests
//!
//! JSON payloads through the adapter into the core form model, and on
//! through a preparation pass, the way the CLI drives them.

use btec::form::{form_from_json, scores_from_json, submission_to_json};
use btec_core::{CriterionId, EntryKey, RowSignal, prepare};
use serde_json::json;

#[test]
fn definition_payload_round_trips_into_form_fields() {
    let payload = json!({
        "name": "Unit 5: Networks",
        "description": "Assignment 2",
        "status": "ready",
        "alwaysshowdefinition": false,
        "regrade": "1",
        "criteria": {
            "3": { "shortname": "P1", "description": "Identify protocols" },
            "NEWID1": { "shortname": "M1", "description": "Explain trade-offs" }
        },
        "addcriterion": false,
        "comments": {},
        "addcomment": false
    });
    let form = form_from_json(&payload).expect("adapt");
    assert_eq!(form.fields["name"], "Unit 5: Networks");
    assert_eq!(form.fields["status"], "ready");
    assert_eq!(form.fields["alwaysshowdefinition"], "0");
    assert_eq!(form.criteria.entries.len(), 2);
    assert_eq!(form.criteria.entries[0].key, "3");
    assert_eq!(form.criteria.entries[1].key, "NEWID1");
    assert!(!form.criteria.add_requested);

    let prepared = prepare(&form);
    assert!(!prepared.signal_pressed);
    assert!(prepared.submission.regrade);
    assert!(!prepared.submission.options.always_show_definition);
    assert_eq!(prepared.submission.criteria.len(), 2);
    assert_eq!(prepared.submission.criteria[0].key, EntryKey::Stable(3));
    assert_eq!(
        prepared.submission.criteria[1].key,
        EntryKey::Placeholder(1)
    );
}

#[test]
fn entry_order_follows_the_payload() {
    // Keys deliberately out of lexicographic order.
    let payload = json!({
        "criteria": {
            "10": { "shortname": "P2" },
            "2": { "shortname": "P1" },
            "NEWID3": { "shortname": "M1" }
        }
    });
    let form = form_from_json(&payload).expect("adapt");
    let keys: Vec<&str> = form.criteria.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["10", "2", "NEWID3"]);
}

#[test]
fn signal_members_become_row_signals() {
    let payload = json!({
        "criteria": {
            "1": { "shortname": "P1", "moveup": true },
            "2": { "shortname": "P2", "movedown": "1" },
            "3": { "shortname": "P3", "delete": 1 },
            "4": { "shortname": "P4", "moveup": false }
        }
    });
    let form = form_from_json(&payload).expect("adapt");
    let signals: Vec<Option<RowSignal>> =
        form.criteria.entries.iter().map(|e| e.signal).collect();
    assert_eq!(
        signals,
        [
            Some(RowSignal::MoveUp),
            Some(RowSignal::MoveDown),
            Some(RowSignal::Delete),
            None
        ]
    );
    // A pressed button must block committing.
    assert!(prepare(&form).signal_pressed);
}

#[test]
fn add_button_appends_a_placeholder() {
    let payload = json!({
        "criteria": {
            "NEWID4": { "shortname": "P1" }
        },
        "addcriterion": true
    });
    let form = form_from_json(&payload).expect("adapt");
    let prepared = prepare(&form);
    assert!(prepared.signal_pressed);
    assert_eq!(prepared.submission.criteria.len(), 2);
    assert_eq!(
        prepared.submission.criteria[1].key,
        EntryKey::Placeholder(5)
    );
}

#[test]
fn malformed_payloads_are_rejected() {
    assert!(form_from_json(&json!(42)).is_err());
    assert!(form_from_json(&json!({ "criteria": [1, 2] })).is_err());
    assert!(form_from_json(&json!({ "criteria": { "1": "not an object" } })).is_err());
    assert!(scores_from_json(&json!([1])).is_err());
    assert!(scores_from_json(&json!({ "abc": 1 })).is_err());
}

#[test]
fn scores_accept_both_shapes() {
    let payload = json!({
        "7": 1,
        "8": { "score": "0", "remark": "evidence missing" }
    });
    let scores = scores_from_json(&payload).expect("adapt");
    assert_eq!(scores[&CriterionId(7)].score, "1");
    assert_eq!(scores[&CriterionId(7)].remark, "");
    assert_eq!(scores[&CriterionId(8)].score, "0");
    assert_eq!(scores[&CriterionId(8)].remark, "evidence missing");
}

#[test]
fn exported_submission_reimports_identically() {
    let payload = json!({
        "name": "Unit 5",
        "criteria": {
            "NEWID1": { "shortname": "P1", "description": "Identify protocols" }
        }
    });
    let prepared = prepare(&form_from_json(&payload).expect("adapt"));
    let exported = submission_to_json(&prepared.submission);
    let reimported = prepare(&form_from_json(&exported).expect("re-adapt"));
    assert_eq!(reimported.submission, prepared.submission);
}
