use std::sync::Arc;

use chrono::Utc;

use super::{CollectSink, StubBehavior, USER, bare_context, stub_registry};
use crate::core::modules::{ALL_MODULES, ModuleName, ModuleRegistry};
use crate::core::sync::executor::{ExecutionPlan, ModuleExecutor};
use crate::core::sync::types::{ModuleResult, ModuleResultMap, ModuleStatus};

#[test]
fn plan_keeps_fixed_order_and_applies_skips() {
    let plan = ExecutionPlan::select(None, &[]);
    assert_eq!(plan.modules, ALL_MODULES.to_vec());

    let plan = ExecutionPlan::select(None, &[ModuleName::PhotoRanking, ModuleName::DatingContent]);
    assert_eq!(
        plan.modules,
        vec![
            ModuleName::BioGenerator,
            ModuleName::CareerDocuments,
            ModuleName::AestheticGuidance,
        ]
    );

    let plan = ExecutionPlan::select(
        Some(&[ModuleName::DatingContent, ModuleName::BioGenerator]),
        &[],
    );
    // Request order does not matter; launch order follows ALL_MODULES.
    assert_eq!(
        plan.modules,
        vec![ModuleName::BioGenerator, ModuleName::DatingContent]
    );
}

#[tokio::test]
async fn one_failing_module_never_aborts_its_siblings() {
    let registry = stub_registry(&[
        (ModuleName::PhotoRanking, StubBehavior::Succeed { items: 3, delay_ms: 2 }),
        (
            ModuleName::BioGenerator,
            StubBehavior::Fail { message: "model unavailable", delay_ms: 2 },
        ),
        (ModuleName::CareerDocuments, StubBehavior::Succeed { items: 2, delay_ms: 2 }),
    ]);
    let executor = ModuleExecutor::new(registry);
    let sink = CollectSink::default();

    let results = executor
        .run(
            "job-1",
            USER,
            bare_context(USER),
            &[
                ModuleName::PhotoRanking,
                ModuleName::BioGenerator,
                ModuleName::CareerDocuments,
            ],
            &sink,
        )
        .await;

    assert_eq!(results.len(), 3);
    let bio = &results[&ModuleName::BioGenerator];
    assert_eq!(bio.status, ModuleStatus::Failed);
    assert!(bio.error.as_deref().unwrap_or("").contains("model unavailable"));

    for name in [ModuleName::PhotoRanking, ModuleName::CareerDocuments] {
        let result = &results[&name];
        assert_eq!(result.status, ModuleStatus::Completed, "{name} should complete");
        assert!(result.items_processed > 0);
        assert!(result.error.is_none());
    }
}

#[tokio::test]
async fn progress_snapshots_follow_completion_order_not_launch_order() {
    // Launched first, finishes last.
    let registry = stub_registry(&[
        (ModuleName::PhotoRanking, StubBehavior::Succeed { items: 1, delay_ms: 60 }),
        (ModuleName::BioGenerator, StubBehavior::Succeed { items: 1, delay_ms: 5 }),
    ]);
    let executor = ModuleExecutor::new(registry);
    let sink = CollectSink::default();

    executor
        .run(
            "job-1",
            USER,
            bare_context(USER),
            &[ModuleName::PhotoRanking, ModuleName::BioGenerator],
            &sink,
        )
        .await;

    let snapshots = sink.snapshots.into_inner();
    // Two starts and two finishes.
    assert_eq!(snapshots.len(), 4);

    let first_settled = snapshots
        .iter()
        .find(|s| !s.results.is_empty())
        .expect("a settle snapshot");
    assert!(first_settled.results.contains_key(&ModuleName::BioGenerator));
    assert!(!first_settled.results.contains_key(&ModuleName::PhotoRanking));

    // completed_modules is monotonically non-decreasing.
    let counts: Vec<u32> = snapshots.iter().map(|s| s.completed_modules).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "counts: {counts:?}");
    assert_eq!(*counts.last().expect("final count"), 2);
    assert_eq!(snapshots.last().expect("final snapshot").current_module, None);
}

#[tokio::test]
async fn panicking_module_settles_as_failed() {
    let registry = stub_registry(&[
        (ModuleName::PhotoRanking, StubBehavior::Panic),
        (ModuleName::BioGenerator, StubBehavior::Succeed { items: 1, delay_ms: 2 }),
    ]);
    let executor = ModuleExecutor::new(registry);
    let sink = CollectSink::default();

    let results = executor
        .run(
            "job-1",
            USER,
            bare_context(USER),
            &[ModuleName::PhotoRanking, ModuleName::BioGenerator],
            &sink,
        )
        .await;

    let photo = &results[&ModuleName::PhotoRanking];
    assert_eq!(photo.status, ModuleStatus::Failed);
    assert!(photo.error.as_deref().unwrap_or("").contains("panicked"));
    assert_eq!(
        results[&ModuleName::BioGenerator].status,
        ModuleStatus::Completed
    );
}

#[tokio::test]
async fn unregistered_module_is_recorded_as_failed() {
    let executor = ModuleExecutor::new(Arc::new(ModuleRegistry::new()));
    let sink = CollectSink::default();

    let results = executor
        .run(
            "job-1",
            USER,
            bare_context(USER),
            &[ModuleName::PhotoRanking],
            &sink,
        )
        .await;

    let photo = &results[&ModuleName::PhotoRanking];
    assert_eq!(photo.status, ModuleStatus::Failed);
    assert!(photo.error.as_deref().unwrap_or("").contains("not registered"));
}

#[tokio::test]
async fn retry_reruns_only_failed_entries_and_keeps_completed_objects() {
    let started_at = Utc::now() - chrono::Duration::minutes(10);
    let completed_at = started_at + chrono::Duration::seconds(3);
    let original_bio = ModuleResult {
        module: ModuleName::BioGenerator,
        status: ModuleStatus::Completed,
        started_at,
        completed_at,
        items_processed: 4,
        error: None,
    };
    let mut previous = ModuleResultMap::new();
    previous.insert(ModuleName::BioGenerator, original_bio.clone());
    previous.insert(
        ModuleName::PhotoRanking,
        ModuleResult::failed_now(ModuleName::PhotoRanking, "rate limited"),
    );

    let registry = stub_registry(&[
        (ModuleName::PhotoRanking, StubBehavior::Succeed { items: 2, delay_ms: 2 }),
        // Would fail if invoked again; completed entries must pass through.
        (
            ModuleName::BioGenerator,
            StubBehavior::Fail { message: "must not rerun", delay_ms: 0 },
        ),
    ]);
    let executor = ModuleExecutor::new(registry);
    let sink = CollectSink::default();

    let merged = executor
        .retry_failed("job-1", USER, bare_context(USER), &previous, &sink)
        .await;

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[&ModuleName::BioGenerator], original_bio);
    let photo = &merged[&ModuleName::PhotoRanking];
    assert_eq!(photo.status, ModuleStatus::Completed);
    assert_eq!(photo.items_processed, 2);
}
