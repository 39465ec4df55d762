//! # Property-Based Tests
//!
//! Verification with proptest: the aggregator is order-independent, a
//! committed submission reconciles to no change, and a preparation pass
//! always leaves 1-based contiguous sort orders.

use std::collections::BTreeMap;

use btec_core::{
    ChangeSeverity, CriterionResult, DefinitionSubmission, EntryKey, FormData, FormEntry,
    FormList, GradingStore, Level, MemoryStore, PreparedEntry, ReconcileMode, RowSignal, UserId,
    aggregate, prepare, reconcile,
};
use proptest::collection::vec;
use proptest::prelude::*;

fn arb_level() -> impl Strategy<Value = Level> {
    prop_oneof![
        Just(Level::Pass),
        Just(Level::Merit),
        Just(Level::Distinction)
    ]
}

fn arb_result() -> impl Strategy<Value = CriterionResult> {
    (arb_level(), 0i64..=1).prop_map(|(level, score)| CriterionResult { level, score })
}

fn arb_signal() -> impl Strategy<Value = Option<RowSignal>> {
    prop_oneof![
        Just(None),
        Just(Some(RowSignal::MoveUp)),
        Just(Some(RowSignal::MoveDown)),
        Just(Some(RowSignal::Delete)),
    ]
}

/// A syntactically plausible submitted criterion entry.
fn arb_entry(index: u64) -> impl Strategy<Value = FormEntry> {
    (any::<bool>(), arb_signal(), "[PMD][0-9]{1,2}", ".{0,12}").prop_map(
        move |(placeholder, signal, shortname, description)| {
            let key = if placeholder {
                format!("NEWID{}", index + 1)
            } else {
                format!("{}", index + 1)
            };
            let mut fields = BTreeMap::new();
            fields.insert("shortname".to_string(), shortname);
            fields.insert("description".to_string(), description);
            FormEntry {
                key,
                fields,
                signal,
            }
        },
    )
}

fn arb_form() -> impl Strategy<Value = FormData> {
    (vec(any::<bool>(), 0..8), any::<bool>()).prop_flat_map(|(slots, add)| {
        let entries: Vec<_> = slots
            .iter()
            .enumerate()
            .map(|(i, _)| arb_entry(i as u64))
            .collect();
        entries.prop_map(move |entries| FormData {
            fields: BTreeMap::new(),
            criteria: FormList {
                entries,
                add_requested: add,
            },
            comments: FormList::default(),
        })
    })
}

proptest! {
    /// Shuffling the criterion results never changes the grade.
    #[test]
    fn aggregation_is_order_independent(
        results in vec(arb_result(), 0..20),
        rotation in 0usize..20
    ) {
        let baseline = aggregate(&results);
        let mut rotated = results.clone();
        if !rotated.is_empty() {
            let len = rotated.len();
            rotated.rotate_left(rotation % len);
        }
        prop_assert_eq!(aggregate(&rotated), baseline);
        let mut reversed = results;
        reversed.reverse();
        prop_assert_eq!(aggregate(&reversed), baseline);
    }

    /// Committing any prepared submission, then re-submitting it keyed by
    /// the stored ids, reports no change.
    #[test]
    fn committed_submissions_reconcile_to_no_change(form in arb_form()) {
        let prepared = prepare(&form);
        let mut store = MemoryStore::new();
        let outcome = reconcile(
            &mut store,
            None,
            &prepared.submission,
            ReconcileMode::Commit,
            UserId(1),
        )
        .expect("commit");
        let definition = outcome.definition.expect("definition id");

        let stored = store.criteria(definition).expect("criteria");
        prop_assert_eq!(stored.len(), prepared.submission.criteria.len());

        let mut again = DefinitionSubmission {
            criteria: Vec::new(),
            ..prepared.submission.clone()
        };
        for criterion in &stored {
            let mut fields = BTreeMap::new();
            fields.insert("shortname".to_string(), criterion.shortname.to_string());
            fields.insert("description".to_string(), criterion.description.clone());
            fields.insert("sortorder".to_string(), criterion.sort_order.to_string());
            again.criteria.push(PreparedEntry {
                key: EntryKey::Stable(criterion.id.0),
                fields,
            });
        }
        let second = reconcile(
            &mut store,
            Some(definition),
            &again,
            ReconcileMode::Commit,
            UserId(1),
        )
        .expect("recommit");
        prop_assert_eq!(second.severity, ChangeSeverity::None);
    }

    /// Whatever the signals, a preparation pass renumbers both lists
    /// 1-based and contiguous, and preserves the entry multiset apart from
    /// deletions and additions.
    #[test]
    fn prepared_sort_orders_are_contiguous(form in arb_form()) {
        let prepared = prepare(&form);
        for (position, entry) in prepared.submission.criteria.iter().enumerate() {
            let order: usize = entry.fields["sortorder"].parse().expect("sortorder");
            prop_assert_eq!(order, position + 1);
        }
        // Only the add button introduces entries the input didn't have.
        let input_keys: Vec<EntryKey> = form
            .criteria
            .entries
            .iter()
            .filter_map(|e| EntryKey::parse(&e.key))
            .collect();
        for entry in &prepared.submission.criteria {
            if !input_keys.contains(&entry.key) {
                prop_assert!(form.criteria.add_requested);
                prop_assert!(matches!(entry.key, EntryKey::Placeholder(_)));
            }
        }
    }
}
