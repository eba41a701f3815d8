//! End-to-end pipeline runs against a shell stand-in for the renderer

use motion_codegen::GenerationError;
use motion_core::{GenerationOutcome, Stage};
use motion_ledger::{JobLedger, JobStatus, PlanTier, QuotaLedger, StatsLedger};
use motion_test_utils::{
    owner, setup_test_service, setup_test_service_with, FAILS_WITH_TRACEBACK, PRODUCES_NOTHING, PUBLIC_BASE, SCENE,
    WRONG_CLASS_SCENE,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn prompt_to_published_artifact() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");

    let outcome = h
        .service
        .generate(&alice, "Show a circle morphing into a square")
        .await;

    let GenerationOutcome::Completed {
        job_id,
        title,
        artifact_url,
        render_duration,
    } = outcome
    else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(title, "Show a circle morphing into a square");
    assert_eq!(
        artifact_url,
        format!("{PUBLIC_BASE}/alice/{job_id}/GeneratedScene.mp4")
    );
    assert!(render_duration >= 0.0);

    let key = format!("alice/{job_id}/GeneratedScene.mp4");
    let stored = h.store.object(&key).expect("artifact uploaded");
    assert_eq!(stored.body, b"frames");
    assert_eq!(stored.content_type, "video/mp4");

    let job = h.jobs.get(&alice, &job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.artifact_url(), Some(artifact_url.as_str()));
    assert_eq!(job.source_code(), SCENE);
    assert!(job.is_consistent());

    let stats = h.stats.get(&alice).await.unwrap();
    assert_eq!(stats.total_jobs, 1);

    assert_eq!(h.generator.prompts(), vec!["Show a circle morphing into a square".to_string()]);
    assert_eq!(h.leftover_workspaces(), 0);
    assert_eq!(h.workspaces.active(), 0);
}

#[tokio::test]
async fn execution_failure_is_recorded_with_diagnostic() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service_with(root.path(), FAILS_WITH_TRACEBACK);
    let alice = owner("alice");

    let outcome = h.service.generate(&alice, "a circle").await;

    let GenerationOutcome::Failed {
        job_id,
        stage,
        message,
        retryable,
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(stage, Stage::Execution);
    assert!(!retryable);
    assert!(!message.contains("NameError"));

    let job = h.jobs.get(&alice, &job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error_detail().unwrap().contains("NameError"));
    assert_eq!(job.artifact_url(), None);

    assert_eq!(h.quota.today(&alice).await.unwrap().count, 1);
    assert_eq!(h.stats.get(&alice).await.unwrap().total_jobs, 0);
    assert!(h.store.keys().is_empty());
    assert_eq!(h.leftover_workspaces(), 0);
    assert_eq!(h.workspaces.active(), 0);
}

#[tokio::test]
async fn clean_exit_without_video_fails_execution() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service_with(root.path(), PRODUCES_NOTHING);
    let alice = owner("alice");

    let outcome = h.service.generate(&alice, "a circle").await;
    let job_id = outcome.job_id().cloned().unwrap();
    assert!(matches!(outcome, GenerationOutcome::Failed { stage: Stage::Execution, .. }));

    let job = h.jobs.get(&alice, &job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error_detail().unwrap().contains("no output produced"));
    assert_eq!(h.leftover_workspaces(), 0);
}

#[tokio::test]
async fn generation_failure_writes_no_record() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");
    h.generator.push_reply(Err(GenerationError::Transport("connection refused".to_string())));

    let outcome = h.service.generate(&alice, "a circle").await;

    assert!(matches!(
        outcome,
        GenerationOutcome::Failed {
            stage: Stage::Generation,
            retryable: true,
            ..
        }
    ));
    assert!(h.jobs.is_empty());
    assert_eq!(h.quota.today(&alice).await.unwrap().count, 1);
    assert_eq!(h.leftover_workspaces(), 0);
}

#[tokio::test]
async fn supplied_code_without_entry_point_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");

    let outcome = h.service.submit_code(&alice, WRONG_CLASS_SCENE, "intro").await;

    assert!(matches!(
        outcome,
        GenerationOutcome::Failed {
            stage: Stage::Generation,
            retryable: false,
            ..
        }
    ));
    assert!(h.jobs.is_empty());
}

#[tokio::test]
async fn supplied_code_is_unfenced_and_rendered() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");
    let fenced = format!("```python\n{SCENE}```\n");

    let outcome = h.service.submit_code(&alice, &fenced, "  My circle  ").await;

    let GenerationOutcome::Completed { job_id, title, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(title, "My circle");
    let job = h.jobs.get(&alice, &job_id).await.unwrap();
    assert_eq!(job.source_code(), SCENE.trim_end());
}

#[tokio::test]
async fn publish_failure_marks_job_failed_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");
    h.store.fail_uploads(Some(503));

    let outcome = h.service.generate(&alice, "a circle").await;
    let job_id = outcome.job_id().cloned().unwrap();

    assert!(matches!(
        outcome,
        GenerationOutcome::Failed {
            stage: Stage::Publish,
            retryable: true,
            ..
        }
    ));
    let job = h.jobs.get(&alice, &job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error_detail().unwrap().contains("503"));
    assert_eq!(h.leftover_workspaces(), 0);
}

#[tokio::test]
async fn sixth_free_request_is_denied_without_side_effects() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");

    for i in 0..5 {
        let outcome = h.service.generate(&alice, &format!("scene {i}")).await;
        assert!(outcome.is_completed(), "request {i}: {outcome:?}");
    }

    let outcome = h.service.generate(&alice, "one more").await;
    assert_eq!(
        outcome,
        GenerationOutcome::QuotaExceeded {
            used: 5,
            limit: 5,
            plan: PlanTier::Free,
        }
    );
    assert_eq!(h.jobs.len(), 5);
    assert_eq!(h.generator.prompts().len(), 5);
    assert_eq!(h.quota.today(&alice).await.unwrap().count, 5);
}

#[tokio::test]
async fn quota_resets_on_the_next_day() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");

    for _ in 0..5 {
        h.service.generate(&alice, "a circle").await;
    }
    assert!(!h.service.generate(&alice, "a circle").await.is_completed());

    h.clock.advance(chrono::Duration::days(1));
    assert!(h.service.generate(&alice, "a circle").await.is_completed());
}

#[tokio::test]
async fn quotas_are_per_owner() {
    let root = tempfile::tempdir().unwrap();
    let h = setup_test_service(root.path());
    let alice = owner("alice");
    let bob = owner("bob");

    for _ in 0..5 {
        h.service.generate(&alice, "a circle").await;
    }
    assert!(h.service.generate(&bob, "a circle").await.is_completed());
}
