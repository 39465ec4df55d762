//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use btec::form;
use btec_core::{
    BtecError, ChangeSeverity, Definition, DefinitionStatus, GradingStore, InstanceStatus, ItemId,
    Level, RedbStore, ReconcileMode, UserId, instance, prepare, reconcile, validate_definition,
    validate_scores,
};
use btec_core::reconcile::{
    definition_copy_submission, mark_for_regrade, needs_regrade_confirmation,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE HANDLING
// =============================================================================

/// Maximum size of a form or scores payload (10 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_PAYLOAD_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), BtecError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| BtecError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(BtecError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input file path.
///
/// Canonicalizes the path to resolve symlinks and "..", ensures it exists
/// and is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, BtecError> {
    let canonical = path.canonicalize().map_err(|e| {
        BtecError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(BtecError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, BtecError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let canonical_parent = parent.canonicalize().map_err(|e| {
        BtecError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    let filename = path
        .file_name()
        .ok_or_else(|| BtecError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and parse a JSON payload file.
fn read_payload(path: &Path) -> Result<serde_json::Value, BtecError> {
    let canonical = validate_file_path(path)?;
    validate_file_size(&canonical, MAX_PAYLOAD_FILE_SIZE)?;
    let text = std::fs::read_to_string(&canonical)
        .map_err(|e| BtecError::IoError(format!("Cannot read '{}': {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| BtecError::SerializationError(format!("{}: {}", path.display(), e)))
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// The database holds one grading area, so one definition at most.
fn current_definition(store: &RedbStore) -> Result<Option<Definition>, BtecError> {
    Ok(store.definitions()?.into_iter().next())
}

fn require_definition(store: &RedbStore) -> Result<Definition, BtecError> {
    current_definition(store)?.ok_or_else(|| {
        BtecError::IoError("No definition exists yet; run `btec init` first".to_string())
    })
}

fn severity_label(severity: ChangeSeverity) -> &'static str {
    match severity {
        ChangeSeverity::None => "no change",
        ChangeSeverity::TextOrOrder => "text or ordering change",
        ChangeSeverity::LevelAdded => "level added",
        ChangeSeverity::Deletion => "criterion deleted",
        ChangeSeverity::LevelRemoved => "level removed",
        ChangeSeverity::Insertion => "criterion inserted",
    }
}

fn status_label(status: DefinitionStatus) -> &'static str {
    match status {
        DefinitionStatus::Draft => "draft",
        DefinitionStatus::Ready => "ready",
    }
}

fn instance_status_label(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Incomplete => "incomplete",
        InstanceStatus::Active => "active",
        InstanceStatus::NeedsUpdate => "needs update",
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a grading database with a blank Draft definition.
pub fn cmd_init(
    db_path: &Path,
    json_mode: bool,
    force: bool,
    author: UserId,
) -> Result<(), BtecError> {
    if db_path.exists() {
        if !force {
            return Err(BtecError::IoError(format!(
                "Database '{}' already exists (use --force to recreate)",
                db_path.display()
            )));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| BtecError::IoError(format!("Cannot remove database: {}", e)))?;
    }

    let mut store = RedbStore::open(db_path)?;
    let definition = match current_definition(&store)? {
        Some(existing) => existing.id,
        None => store.create_definition(author)?,
    };
    tracing::info!(definition = definition.0, "database initialized");

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "definition": definition.0,
            "status": "draft"
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Initialized grading database {:?}", db_path);
    println!("Definition id: {} (draft)", definition.0);
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Dry-run a form submission and report its change severity.
pub fn cmd_check(
    db_path: &Path,
    json_mode: bool,
    file: &Path,
    author: UserId,
) -> Result<(), BtecError> {
    let mut store = RedbStore::open(db_path)?;
    let definition = current_definition(&store)?.map(|d| d.id);

    let payload = read_payload(file)?;
    let prepared = prepare(&form::form_from_json(&payload)?);
    let outcome = reconcile(
        &mut store,
        definition,
        &prepared.submission,
        ReconcileMode::Check,
        author,
    )?;

    if json_mode {
        let output = serde_json::json!({
            "severity": outcome.severity.value(),
            "label": severity_label(outcome.severity),
            "signal_pressed": prepared.signal_pressed,
            "missing_criteria": prepared.missing_criteria
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Severity: {} ({})",
        outcome.severity.value(),
        severity_label(outcome.severity)
    );
    if prepared.signal_pressed {
        println!("Note: a structural button is still pending; the form would be redisplayed");
    }
    if prepared.missing_criteria {
        println!("Note: the submission contains no criteria");
    }
    Ok(())
}

// =============================================================================
// DEFINE COMMAND
// =============================================================================

/// Commit a form submission to the definition.
pub fn cmd_define(
    db_path: &Path,
    json_mode: bool,
    file: &Path,
    ready: bool,
    force_regrade: bool,
    author: UserId,
) -> Result<(), BtecError> {
    let mut store = RedbStore::open(db_path)?;
    let definition = current_definition(&store)?.map(|d| d.id);

    let payload = read_payload(file)?;
    let prepared = prepare(&form::form_from_json(&payload)?);
    if prepared.signal_pressed {
        println!("Not committed: a structural button is still pending in the submission.");
        println!("Resolve the add/move/delete edit and submit the updated form.");
        std::process::exit(1);
    }

    let mut submission = prepared.submission;
    if ready {
        submission.status = DefinitionStatus::Ready;
    }
    if submission.status == DefinitionStatus::Ready {
        let report = validate_definition(&submission);
        if !report.is_valid() {
            println!("Not committed: the marking scheme is not ready.");
            println!("{report}");
            std::process::exit(1);
        }
    }

    let confirmed = force_regrade || submission.regrade;
    if let Some(severity) =
        needs_regrade_confirmation(&mut store, definition, &submission, author, confirmed)?
    {
        println!(
            "Not committed: this change ({}) affects instances that were already graded.",
            severity_label(severity)
        );
        println!("Re-run with --force-regrade to confirm marking them for regrading.");
        std::process::exit(1);
    }

    let outcome = reconcile(
        &mut store,
        definition,
        &submission,
        ReconcileMode::Commit,
        author,
    )?;
    let committed = outcome
        .definition
        .ok_or_else(|| BtecError::IoError("Commit produced no definition".to_string()))?;

    let mut regraded = 0;
    if outcome.severity != ChangeSeverity::None {
        regraded = mark_for_regrade(&mut store, committed)?;
    }
    tracing::info!(
        definition = committed.0,
        severity = outcome.severity.value(),
        regraded,
        "definition committed"
    );

    if json_mode {
        let output = serde_json::json!({
            "definition": committed.0,
            "severity": outcome.severity.value(),
            "label": severity_label(outcome.severity),
            "status": status_label(submission.status),
            "marked_for_regrade": regraded
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Committed definition {} ({}), severity {} ({})",
        committed.0,
        status_label(submission.status),
        outcome.severity.value(),
        severity_label(outcome.severity)
    );
    if regraded > 0 {
        println!("Marked {} graded instance(s) for regrading", regraded);
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Report readiness violations of a form submission.
pub fn cmd_validate(json_mode: bool, file: &Path) -> Result<(), BtecError> {
    let payload = read_payload(file)?;
    let prepared = prepare(&form::form_from_json(&payload)?);
    let report = validate_definition(&prepared.submission);

    if json_mode {
        let output = serde_json::json!({
            "valid": report.is_valid(),
            "violations": report.violations,
            "signal_pressed": prepared.signal_pressed
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    if report.is_valid() {
        println!("The marking scheme is valid.");
    } else {
        println!("{report}");
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show the definition and instance overview.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), BtecError> {
    let store = RedbStore::open(db_path)?;
    let definition = require_definition(&store)?;
    let criteria = store.criteria(definition.id)?;
    let comments = store.comments(definition.id)?;
    let active = store.active_instances(definition.id)?;

    let mut per_level = [0usize; 3];
    for criterion in &criteria {
        if let Some(level) = criterion.shortname.level() {
            per_level[level.index()] += 1;
        }
    }

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "definition": definition.id.0,
            "name": definition.name,
            "status": status_label(definition.status),
            "criteria": criteria.len(),
            "pass_criteria": per_level[Level::Pass.index()],
            "merit_criteria": per_level[Level::Merit.index()],
            "distinction_criteria": per_level[Level::Distinction.index()],
            "comments": comments.len(),
            "active_instances": active.len()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("BTEC Definition Status");
    println!("======================");
    println!("Database:   {:?}", db_path);
    println!("Definition: {} ({})", definition.id.0, definition.name);
    println!("Status:     {}", status_label(definition.status));
    println!();
    println!(
        "Criteria:   {} (P: {}, M: {}, D: {})",
        criteria.len(),
        per_level[Level::Pass.index()],
        per_level[Level::Merit.index()],
        per_level[Level::Distinction.index()]
    );
    println!("Comments:   {}", comments.len());
    println!("Active instances: {}", active.len());
    Ok(())
}

// =============================================================================
// GRADE COMMAND
// =============================================================================

/// Score an item for a rater and compute the grade.
pub fn cmd_grade(
    db_path: &Path,
    json_mode: bool,
    rater: UserId,
    item: u64,
    file: &Path,
) -> Result<(), BtecError> {
    let mut store = RedbStore::open(db_path)?;
    let definition = require_definition(&store)?;
    if definition.status != DefinitionStatus::Ready {
        println!("Cannot grade: the definition is still a draft.");
        println!("Commit it with `btec define --ready` first.");
        std::process::exit(1);
    }

    let payload = read_payload(file)?;
    let submitted = form::scores_from_json(&payload)?;
    let criteria = store.criteria(definition.id)?;
    let report = validate_scores(&criteria, &submitted);
    if !report.is_valid() {
        println!("Cannot grade: the submitted scores are invalid.");
        println!("{report}");
        std::process::exit(1);
    }

    let item = ItemId(item);
    let resolved = instance::get_or_create(&mut store, definition.id, None, rater, item)?;
    instance::update_fillings(&mut store, resolved.instance.id, &report.parsed)?;
    instance::make_active(&mut store, resolved.instance.id)?;
    let grade = instance::grade(&store, resolved.instance.id)?;
    tracing::info!(
        instance = resolved.instance.id.0,
        grade = grade.name(),
        "item graded"
    );

    if json_mode {
        let output = serde_json::json!({
            "instance": resolved.instance.id.0,
            "resumed": resolved.resumed,
            "grade": grade.name(),
            "scale_value": grade.scale_value()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    if resolved.resumed {
        println!("Resumed an earlier unfinished grading attempt.");
    }
    println!(
        "Grade: {} (scale value {})",
        grade.name(),
        grade.scale_value()
    );
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Display a rater's instance and grade.
pub fn cmd_show(
    db_path: &Path,
    json_mode: bool,
    rater: UserId,
    item: u64,
) -> Result<(), BtecError> {
    let store = RedbStore::open(db_path)?;
    let instances = store.instances_for(rater, ItemId(item))?;
    let Some(shown) = instances
        .iter()
        .find(|i| {
            matches!(
                i.status,
                InstanceStatus::Active | InstanceStatus::NeedsUpdate
            )
        })
        .or_else(|| instances.first())
    else {
        println!("No grading instance for rater {} and item {}.", rater.0, item);
        return Ok(());
    };

    let fillings = store.fillings(shown.id)?;
    let grade = instance::grade(&store, shown.id)?;

    if json_mode {
        let mut rows = Vec::new();
        for filling in &fillings {
            let shortname = store
                .get_criterion(filling.criterion)?
                .map(|c| c.shortname.to_string())
                .unwrap_or_default();
            rows.push(serde_json::json!({
                "criterion": filling.criterion.0,
                "shortname": shortname,
                "met": filling.met(),
                "remark": filling.remark
            }));
        }
        let output = serde_json::json!({
            "instance": shown.id.0,
            "status": instance_status_label(shown.status),
            "fillings": rows,
            "grade": grade.name(),
            "scale_value": grade.scale_value()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Instance {} ({})",
        shown.id.0,
        instance_status_label(shown.status)
    );
    for filling in &fillings {
        let shortname = store
            .get_criterion(filling.criterion)?
            .map(|c| c.shortname.to_string())
            .unwrap_or_else(|| format!("#{}", filling.criterion.0));
        let mark = if filling.met() { "met" } else { "not met" };
        if filling.remark.is_empty() {
            println!("  {:<6} {}", shortname, mark);
        } else {
            println!("  {:<6} {} ({})", shortname, mark, filling.remark);
        }
    }
    println!(
        "Grade: {} (scale value {})",
        grade.name(),
        grade.scale_value()
    );
    Ok(())
}

// =============================================================================
// COPY COMMAND
// =============================================================================

/// Export the definition as a re-keyed clone payload.
pub fn cmd_copy(db_path: &Path, json_mode: bool, output: &Path) -> Result<(), BtecError> {
    let store = RedbStore::open(db_path)?;
    let definition = require_definition(&store)?;
    let submission = definition_copy_submission(&store, definition.id)?;
    let payload = form::submission_to_json(&submission);

    let target = validate_output_path(output)?;
    let text = serde_json::to_string_pretty(&payload)
        .map_err(|e| BtecError::SerializationError(e.to_string()))?;
    std::fs::write(&target, text)
        .map_err(|e| BtecError::IoError(format!("Cannot write '{}': {}", output.display(), e)))?;

    if json_mode {
        let output = serde_json::json!({
            "definition": definition.id.0,
            "criteria": submission.criteria.len(),
            "comments": submission.comments.len(),
            "output": target.to_string_lossy()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Exported {} criteria and {} comments to {:?}",
        submission.criteria.len(),
        submission.comments.len(),
        target
    );
    Ok(())
}

// =============================================================================
// PREFS COMMAND
// =============================================================================

/// Read or set a marker's display preferences.
pub fn cmd_prefs(
    db_path: &Path,
    json_mode: bool,
    user: UserId,
    marker_desc: Option<bool>,
    student_desc: Option<bool>,
) -> Result<(), BtecError> {
    let mut store = RedbStore::open(db_path)?;
    let mut prefs = store.get_prefs(user)?;

    if marker_desc.is_some() || student_desc.is_some() {
        if let Some(flag) = marker_desc {
            prefs.show_marker_desc = flag;
        }
        if let Some(flag) = student_desc {
            prefs.show_student_desc = flag;
        }
        store.set_prefs(user, prefs)?;
    }

    if json_mode {
        let output = serde_json::json!({
            "user": user.0,
            "show_marker_desc": prefs.show_marker_desc,
            "show_student_desc": prefs.show_student_desc
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Preferences for user {}:", user.0);
    println!("  show marker descriptions:  {}", prefs.show_marker_desc);
    println!("  show student descriptions: {}", prefs.show_student_desc);
    Ok(())
}
