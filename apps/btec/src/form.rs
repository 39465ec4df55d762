//! # Form Payload Adaptation
//!
//! Bridges the host's JSON form payloads to the core form model.
//!
//! A definition payload is a JSON object. Scalar members become
//! definition-level fields; `criteria` and `comments` are objects whose
//! member order is the submission order (the parser preserves it), keyed
//! by a stored id or a `NEWID<n>` placeholder. Inside an entry, the
//! members `moveup`, `movedown` and `delete` are the no-script structural
//! buttons; everything scalar becomes a field.
//!
//! ```json
//! {
//!   "name": "Unit 5",
//!   "status": "ready",
//!   "criteria": {
//!     "12": { "shortname": "P1", "description": "...", "moveup": true },
//!     "NEWID1": { "shortname": "M1" }
//!   },
//!   "addcriterion": false
//! }
//! ```
//!
//! A scores payload maps criterion ids to `{ "score": ..., "remark": ... }`
//! objects, or directly to a bare score.

use btec_core::{
    BtecError, CriterionId, DefinitionSubmission, FormData, FormEntry, RowSignal, SubmittedScore,
};
use btec_core::types::DefinitionStatus;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn malformed(message: impl Into<String>) -> BtecError {
    BtecError::SerializationError(message.into())
}

/// Render a JSON scalar as a form field string. Objects, arrays and null
/// carry no field value.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        Value::String(text) => text == "1" || text.eq_ignore_ascii_case("true"),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

// =============================================================================
// PAYLOAD -> FORM
// =============================================================================

/// Adapt a definition payload to the core form model.
pub fn form_from_json(payload: &Value) -> Result<FormData, BtecError> {
    let object = payload
        .as_object()
        .ok_or_else(|| malformed("the form payload must be a JSON object"))?;

    let mut form = FormData::default();
    for (key, value) in object {
        match key.as_str() {
            "criteria" => form.criteria.entries = entries_from_json(value, "criteria")?,
            "comments" => form.comments.entries = entries_from_json(value, "comments")?,
            "addcriterion" => form.criteria.add_requested = truthy(value),
            "addcomment" => form.comments.add_requested = truthy(value),
            _ => {
                if let Some(text) = scalar(value) {
                    form.fields.insert(key.clone(), text);
                }
            }
        }
    }
    Ok(form)
}

fn entries_from_json(value: &Value, list: &str) -> Result<Vec<FormEntry>, BtecError> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed(format!("\"{list}\" must be a JSON object")))?;

    let mut entries = Vec::with_capacity(object.len());
    for (key, member) in object {
        let member = member
            .as_object()
            .ok_or_else(|| malformed(format!("{list} entry \"{key}\" must be a JSON object")))?;
        let mut fields = BTreeMap::new();
        let mut signal = None;
        for (name, value) in member {
            let pressed = truthy(value);
            match name.as_str() {
                "moveup" if pressed => signal = Some(RowSignal::MoveUp),
                "movedown" if pressed => signal = Some(RowSignal::MoveDown),
                "delete" if pressed => signal = Some(RowSignal::Delete),
                "moveup" | "movedown" | "delete" => {}
                _ => {
                    if let Some(text) = scalar(value) {
                        fields.insert(name.clone(), text);
                    }
                }
            }
        }
        entries.push(FormEntry {
            key: key.clone(),
            fields,
            signal,
        });
    }
    Ok(entries)
}

/// Adapt a scores payload to per-criterion submitted scores.
pub fn scores_from_json(
    payload: &Value,
) -> Result<BTreeMap<CriterionId, SubmittedScore>, BtecError> {
    let object = payload
        .as_object()
        .ok_or_else(|| malformed("the scores payload must be a JSON object"))?;

    let mut scores = BTreeMap::new();
    for (key, value) in object {
        let id: u64 = key
            .parse()
            .map_err(|_| malformed(format!("\"{key}\" is not a criterion id")))?;
        let submitted = match value {
            Value::Object(member) => SubmittedScore {
                score: member.get("score").and_then(scalar).unwrap_or_default(),
                remark: member.get("remark").and_then(scalar).unwrap_or_default(),
            },
            other => SubmittedScore {
                score: scalar(other).unwrap_or_default(),
                remark: String::new(),
            },
        };
        scores.insert(CriterionId(id), submitted);
    }
    Ok(scores)
}

// =============================================================================
// SUBMISSION -> PAYLOAD
// =============================================================================

/// Render a prepared submission back into payload form, e.g. for the
/// `copy` command's output file. Feeding the result to [`form_from_json`]
/// reproduces the submission.
#[must_use]
pub fn submission_to_json(submission: &DefinitionSubmission) -> Value {
    let mut root = Map::new();
    root.insert("name".to_string(), Value::String(submission.name.clone()));
    root.insert(
        "description".to_string(),
        Value::String(submission.description.clone()),
    );
    root.insert(
        "status".to_string(),
        Value::String(
            match submission.status {
                DefinitionStatus::Draft => "draft",
                DefinitionStatus::Ready => "ready",
            }
            .to_string(),
        ),
    );
    root.insert(
        "alwaysshowdefinition".to_string(),
        Value::Bool(submission.options.always_show_definition),
    );
    root.insert(
        "showmarkspercriterion".to_string(),
        Value::Bool(submission.options.show_marks_per_criterion),
    );
    root.insert(
        "showdescriptionstudents".to_string(),
        Value::Bool(submission.options.show_description_to_students),
    );
    root.insert(
        "criteria".to_string(),
        entries_to_json(&submission.criteria),
    );
    root.insert(
        "comments".to_string(),
        entries_to_json(&submission.comments),
    );
    Value::Object(root)
}

fn entries_to_json(entries: &[btec_core::PreparedEntry]) -> Value {
    let mut object = Map::new();
    for entry in entries {
        let mut fields = Map::new();
        for (name, value) in &entry.fields {
            fields.insert(name.clone(), Value::String(value.clone()));
        }
        object.insert(entry.key.to_string(), Value::Object(fields));
    }
    Value::Object(object)
}
