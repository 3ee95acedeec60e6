//! Property-based tests for the chain state machine
//!
//! These tests verify key invariants hold across arbitrary chains and
//! arbitrary button payloads, in any delivery order.

use super::state::highest_selected;
use super::*;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ChainContext {
    ChainContext::new("https://site.test")
}

fn is_prefix(selections: &Selections) -> bool {
    let first_gap = selections
        .iter()
        .position(Option::is_none)
        .unwrap_or(Step::COUNT);
    selections[first_gap..].iter().all(Option::is_none)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_step() -> impl Strategy<Value = Step> {
    (0..Step::COUNT).prop_map(|i| Step::from_index(i).unwrap())
}

/// A well-formed payload: ids for every step up to some depth
fn arb_prefix() -> impl Strategy<Value = Selections> {
    (0..=Step::COUNT, proptest::array::uniform6(1i64..50)).prop_map(|(depth, ids)| {
        let mut selections = [None; Step::COUNT];
        for (slot, id) in selections.iter_mut().zip(ids).take(depth) {
            *slot = Some(id);
        }
        selections
    })
}

/// Any combination of present ids, gaps included
fn arb_selections() -> impl Strategy<Value = Selections> {
    proptest::array::uniform6(proptest::option::of(1i64..50))
}

fn arb_open_chain() -> impl Strategy<Value = SelectionChain> {
    arb_prefix().prop_map(|selections| {
        let mut chain = SelectionChain::new(1, ChatRef::new("tb", 1, "c1"), Utc::now());
        if let Some(step) = highest_selected(&selections) {
            chain.select(step, &selections).unwrap();
        }
        chain
    })
}

fn arb_event() -> impl Strategy<Value = ChainEvent> {
    prop_oneof![
        Just(ChainEvent::Start),
        Just(ChainEvent::Expire),
        arb_selections().prop_map(|selections| ChainEvent::Selection { selections }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// After a selection at step i, every step after i is unset
    #[test]
    fn prop_cascade_clears_downstream(chain in arb_open_chain(), payload in arb_prefix()) {
        let Some(step) = highest_selected(&payload) else {
            return Ok(());
        };
        let mut chain = chain;
        chain.select(step, &payload).unwrap();
        for later in Step::ALL.into_iter().skip(step.index() + 1) {
            prop_assert_eq!(chain.selection(later), None);
        }
        prop_assert_eq!(chain.selection(step), payload[step.index()]);
    }

    /// No sequence of events can produce a chain with a gap
    #[test]
    fn prop_prefix_invariant_survives_any_events(
        chain in arb_open_chain(),
        events in proptest::collection::vec(arb_event(), 0..12),
    ) {
        let mut chain = chain;
        for event in events {
            if let Ok(result) = transition(&chain, &test_context(), event) {
                chain = result.new_chain;
            }
            prop_assert!(is_prefix(chain.selections()));
        }
    }

    /// Once finalized, every event is rejected and the chain is unchanged
    #[test]
    fn prop_finalized_is_terminal(chain in arb_open_chain(), event in arb_event()) {
        let mut chain = chain;
        chain.finalize();
        let before = chain.clone();
        let result = transition(&chain, &test_context(), event);
        prop_assert!(matches!(result, Err(TransitionError::Finalized(_))));
        prop_assert_eq!(chain, before);
    }

    /// Finalization only happens through the terminal step or expiry
    #[test]
    fn prop_only_maintenance_or_expiry_finalizes(chain in arb_open_chain(), event in arb_event()) {
        let terminal = match &event {
            ChainEvent::Expire => true,
            ChainEvent::Selection { selections } => selections[Step::Maintenance.index()].is_some(),
            ChainEvent::Start => false,
        };
        if let Ok(result) = transition(&chain, &test_context(), event) {
            prop_assert_eq!(result.new_chain.is_finalized(), terminal);
        }
    }

    /// Repeated retreats reach the city step in at most five moves
    #[test]
    fn prop_retreat_terminates(chain in arb_open_chain(), start in arb_step()) {
        let mut chain = chain;
        let mut step = start;
        let mut moves = 0;
        while let Some(parent) = chain.retreat_from(step) {
            step = parent;
            moves += 1;
            prop_assert!(moves <= 5);
        }
        prop_assert_eq!(step, Step::City);
    }

    /// Applying the same payload twice yields the same chain
    #[test]
    fn prop_selection_is_idempotent(chain in arb_open_chain(), payload in arb_prefix()) {
        let event = ChainEvent::Selection { selections: payload };
        let Ok(once) = transition(&chain, &test_context(), event.clone()) else {
            return Ok(());
        };
        if once.new_chain.is_finalized() {
            return Ok(());
        }
        let twice = transition(&once.new_chain, &test_context(), event).unwrap();
        prop_assert_eq!(once.new_chain, twice.new_chain);
    }
}
