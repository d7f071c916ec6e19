//! Property tests over random command sequences.
//!
//! Whatever sequence of commands arrives, the accounting invariants must
//! hold: the concurrency version counts exactly the committed transitions,
//! the transition log has one record per commit, the business revision
//! advances only on Submit and Reject, and the assignee follows the action.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use drawflow_core::drawing::{Action, ActorId, Role};
use drawflow_core::store::DrawingStore;
use drawflow_testing::{TestHarness, new_drawing};
use proptest::prelude::*;

fn roles() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn actions() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn accounting_invariants_hold_for_any_command_sequence(
        steps in prop::collection::vec((1i64..5, roles(), actions()), 1..25)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let harness = TestHarness::new();
            let drawing = harness
                .create(new_drawing(1, "prop sheet"))
                .await
                .expect("create");

            let mut committed = 0u64;
            let mut expected_revision = 1u32;
            for (actor, role, action) in steps {
                let Ok(updated) = harness.apply(drawing.id, actor, role, action).await else {
                    continue;
                };
                committed += 1;
                if matches!(action, Action::Submit | Action::Reject) {
                    expected_revision += 1;
                }
                prop_assert_eq!(updated.version.value(), committed);
                prop_assert_eq!(updated.revision.value(), expected_revision);
                match action {
                    Action::Claim => {
                        prop_assert_eq!(updated.assignee, Some(ActorId::new(actor)));
                    }
                    Action::Submit | Action::Release | Action::Reject => {
                        prop_assert_eq!(updated.assignee, None);
                    }
                }
            }

            let final_state = harness.store.get(drawing.id).await.expect("get");
            prop_assert_eq!(final_state.version.value(), committed);
            prop_assert_eq!(final_state.revision.value(), expected_revision);

            let log = harness
                .store
                .transition_log(drawing.id)
                .await
                .expect("log");
            prop_assert_eq!(u64::try_from(log.len()).expect("log length fits"), committed);
            Ok(())
        });
        result?;
    }

    #[test]
    fn rejected_commands_never_change_state(
        actor in 1i64..5,
        role in roles(),
        action in actions(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let harness = TestHarness::new();
            let drawing = harness
                .create(new_drawing(1, "prop sheet"))
                .await
                .expect("create");

            let before = harness.store.get(drawing.id).await.expect("get");
            if harness.apply(drawing.id, actor, role, action).await.is_err() {
                let after = harness.store.get(drawing.id).await.expect("get");
                prop_assert_eq!(before, after);
                let log = harness
                    .store
                    .transition_log(drawing.id)
                    .await
                    .expect("log");
                prop_assert!(log.is_empty());
            }
            Ok(())
        });
        result?;
    }
}
