use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::workflows::admissions::repository::ApplicationStore;
use crate::workflows::admissions::conflicts::{
    ResolutionError, ResolutionOutcome, ResolveOptions,
};
use crate::workflows::admissions::domain::{ApplicationId, ApplicationStatus};

const FINAL: ApplicationStatus = ApplicationStatus::Accepted { finalized: true };
const OPEN: ApplicationStatus = ApplicationStatus::Accepted { finalized: false };

#[test]
fn scenario_c_finalizes_winner_and_rejects_loser() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());

    let result = resolver(store.clone())
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("resolution succeeds");

    assert_eq!(result.winning_application, ApplicationId("app-1".to_string()));
    assert_eq!(result.winning_offering, offering(1));
    assert_eq!(result.rejected, vec![ApplicationId("app-2".to_string())]);
    assert_eq!(result.outcome, ResolutionOutcome::Applied);
    assert_eq!(result.resolved_at, resolution_time());

    assert_eq!(store.status_of("app-1"), FINAL);
    assert_eq!(store.status_of("app-2"), ApplicationStatus::Rejected);
    let note = store.row("app-2").resolution.expect("loser carries a note");
    assert_eq!(note.winning_offering, offering(1));
    assert_eq!(note.resolved_at, resolution_time());
    assert!(note.reason.contains("Offering-1"));
}

#[test]
fn scenario_d_auto_resolve_picks_earliest_submission() {
    let store = Arc::new(MemoryStore::with(vec![
        accepted("app-late", "stu-1", offering(1), at(14, 9)),
        accepted("app-early", "stu-1", offering(2), at(3, 9)),
    ]));
    let conflict = detect_single(&store.snapshot());

    let result = resolver(store.clone())
        .auto_resolve(&conflict, ResolveOptions::default())
        .expect("auto resolution succeeds");

    assert_eq!(result.winning_offering, offering(2));
    assert_eq!(store.status_of("app-early"), FINAL);
    assert_eq!(store.status_of("app-late"), ApplicationStatus::Rejected);
}

#[test]
fn auto_resolve_tie_falls_back_to_offering_order() {
    let store = Arc::new(MemoryStore::with(vec![
        accepted("app-x", "stu-1", offering(5), at(3, 9)),
        accepted("app-y", "stu-1", offering(4), at(3, 9)),
    ]));
    let conflict = detect_single(&store.snapshot());

    let result = resolver(store)
        .auto_resolve(&conflict, ResolveOptions::default())
        .expect("auto resolution succeeds");

    assert_eq!(result.winning_offering, offering(4));
}

#[test]
fn selection_outside_conflict_mutates_nothing() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    let before = store.snapshot();

    match resolver(store.clone()).resolve(&conflict, &offering(9), ResolveOptions::default()) {
        Err(ResolutionError::InvalidSelection { offering: chosen, .. }) => {
            assert_eq!(chosen, offering(9))
        }
        other => panic!("expected invalid selection, got {other:?}"),
    }

    assert_eq!(store.write_count(), 0);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn re_resolving_with_same_winner_is_a_no_op() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    let resolver = resolver(store.clone());

    let first = resolver
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("first resolution");
    let after_first = store.snapshot();
    let writes = store.write_count();

    let second = resolver
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("second resolution");

    assert_eq!(second.outcome, ResolutionOutcome::AlreadyFinal);
    assert_eq!(second.winning_application, first.winning_application);
    assert_eq!(second.rejected, first.rejected);
    assert_eq!(second.resolved_at, first.resolved_at);
    assert_eq!(store.snapshot(), after_first);
    assert_eq!(store.write_count(), writes);
}

#[test]
fn different_winner_after_finalization_requires_override() {
    let store = Arc::new(MemoryStore::with(vec![
        accepted("app-1", "stu-1", offering(1), at(10, 9)),
        application("app-2", "stu-1", offering(2), at(12, 9), FINAL),
    ]));
    let conflict = detect_single(&store.snapshot());
    let resolver = resolver(store.clone());

    match resolver.resolve(&conflict, &offering(1), ResolveOptions::default()) {
        Err(ResolutionError::AlreadyResolved {
            finalized_offering, ..
        }) => assert_eq!(finalized_offering, offering(2)),
        other => panic!("expected already resolved, got {other:?}"),
    }
    assert_eq!(store.write_count(), 0);

    let result = resolver
        .resolve(
            &conflict,
            &offering(1),
            ResolveOptions {
                override_finalized: true,
            },
        )
        .expect("override succeeds");

    assert_eq!(result.rejected, vec![ApplicationId("app-2".to_string())]);
    assert_eq!(store.status_of("app-1"), FINAL);
    assert_eq!(store.status_of("app-2"), ApplicationStatus::Rejected);
}

#[test]
fn rejected_members_cannot_be_revived() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    let resolver = resolver(store.clone());
    resolver
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("first resolution");

    match resolver.resolve(&conflict, &offering(2), ResolveOptions::default()) {
        Err(ResolutionError::AlreadyResolved {
            finalized_offering, ..
        }) => assert_eq!(finalized_offering, offering(1)),
        other => panic!("expected already resolved, got {other:?}"),
    }

    let forced = resolver.resolve(
        &conflict,
        &offering(2),
        ResolveOptions {
            override_finalized: true,
        },
    );

    assert!(matches!(
        forced,
        Err(ResolutionError::WinnerNotAccepted { status: "rejected", .. })
    ));
    assert_eq!(store.status_of("app-1"), FINAL);
    assert_eq!(store.status_of("app-2"), ApplicationStatus::Rejected);
}

#[test]
fn partial_failure_reports_both_sides_and_retry_completes() {
    let store = Arc::new(MemoryStore::with(vec![
        accepted("app-1", "stu-1", offering(1), at(10, 9)),
        accepted("app-2", "stu-1", offering(2), at(11, 9)),
        accepted("app-3", "stu-1", offering(3), at(12, 9)),
    ]));
    let conflict = detect_single(&store.snapshot());
    let resolver = resolver(store.clone());
    store.fail_transitions_for("app-3");

    match resolver.resolve(&conflict, &offering(1), ResolveOptions::default()) {
        Err(ResolutionError::PartialCommit { committed, failed }) => {
            let committed: Vec<_> = committed
                .iter()
                .map(|record| record.application_id.0.as_str())
                .collect();
            assert_eq!(committed, vec!["app-1", "app-2"]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].application_id, ApplicationId("app-3".to_string()));
            assert!(failed[0].error.contains("injected failure"));
        }
        other => panic!("expected partial commit, got {other:?}"),
    }
    assert_eq!(store.status_of("app-3"), OPEN);

    store.heal();
    let retry = resolver
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("retry completes");

    assert_eq!(retry.outcome, ResolutionOutcome::Applied);
    assert_eq!(
        retry.rejected,
        vec![
            ApplicationId("app-2".to_string()),
            ApplicationId("app-3".to_string())
        ]
    );
    assert_eq!(store.status_of("app-3"), ApplicationStatus::Rejected);
    assert_eq!(
        store.row("app-3").resolution.map(|note| note.resolved_at),
        store.row("app-1").resolution.map(|note| note.resolved_at)
    );
}

#[test]
fn winner_write_failure_commits_nothing() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    store.fail_transitions_for("app-1");

    let attempt = resolver(store.clone()).resolve(&conflict, &offering(1), ResolveOptions::default());

    assert!(matches!(attempt, Err(ResolutionError::Store(_))));
    assert_eq!(store.write_count(), 0);
    assert_eq!(store.status_of("app-2"), OPEN);
}

#[test]
fn stale_snapshot_is_revalidated_against_the_store() {
    let store = Arc::new(MemoryStore::with(vec![
        accepted("app-1", "stu-1", offering(1), at(10, 9)),
        accepted("app-2", "stu-1", offering(2), at(11, 9)),
        accepted("app-3", "stu-1", offering(3), at(12, 9)),
    ]));
    let conflict = detect_single(&store.snapshot());

    // An administrator withdrew offering 3 after detection ran.
    let mut rows = store.snapshot();
    rows[2].status = ApplicationStatus::Waitlisted;
    let store = Arc::new(MemoryStore::with(rows));

    let result = resolver(store.clone())
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("resolution succeeds");

    assert_eq!(result.rejected, vec![ApplicationId("app-2".to_string())]);
    assert_eq!(store.status_of("app-3"), ApplicationStatus::Waitlisted);
}

#[test]
fn concurrent_resolutions_for_one_applicant_commit_once() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = Arc::new(detect_single(&store.snapshot()));
    let resolver = Arc::new(resolver(store.clone()));

    let handles: Vec<_> = [1_u32, 2]
        .into_iter()
        .map(|n| {
            let resolver = resolver.clone();
            let conflict = conflict.clone();
            thread::spawn(move || resolver.resolve(&conflict, &offering(n), ResolveOptions::default()))
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(ResolutionError::AlreadyResolved { .. })
    )));

    let finals = store
        .snapshot()
        .iter()
        .filter(|application| application.status.is_finalized())
        .count();
    assert_eq!(finals, 1);
}

#[test]
fn acceptance_recorded_after_detection_is_rejected_too() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    store
        .insert(accepted("app-3", "stu-1", offering(3), at(15, 9)))
        .expect("late acceptance stored");

    let result = resolver(store.clone())
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("resolution succeeds");

    assert_eq!(
        result.rejected,
        vec![
            ApplicationId("app-2".to_string()),
            ApplicationId("app-3".to_string())
        ]
    );
    let still_accepted: Vec<_> = store
        .snapshot()
        .into_iter()
        .filter(|application| application.status.is_accepted())
        .map(|application| application.id.0)
        .collect();
    assert_eq!(still_accepted, vec!["app-1".to_string()]);
}

#[test]
fn late_finalized_row_blocks_a_different_winner() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    store
        .insert(application("app-3", "stu-1", offering(3), at(15, 9), FINAL))
        .expect("late row stored");

    match resolver(store.clone()).resolve(&conflict, &offering(1), ResolveOptions::default()) {
        Err(ResolutionError::AlreadyResolved {
            finalized_offering, ..
        }) => assert_eq!(finalized_offering, offering(3)),
        other => panic!("expected already resolved, got {other:?}"),
    }
    assert_eq!(store.write_count(), 0);
}

#[test]
fn lock_entries_are_released_after_resolution() {
    let store = Arc::new(MemoryStore::with(two_way_conflict()));
    let conflict = detect_single(&store.snapshot());
    let resolver = resolver(store.clone());

    resolver
        .resolve(&conflict, &offering(1), ResolveOptions::default())
        .expect("resolution succeeds");
    let _ = resolver.resolve(&conflict, &offering(2), ResolveOptions::default());

    assert_eq!(resolver.tracked_locks(), 0);
}
