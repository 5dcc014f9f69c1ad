//! Task store tests: upsert semantics and the status compare-and-set

mod helpers;

use helpers::test_pool;
use tunesmith_mg::db::tasks;
use tunesmith_mg::models::{NewTask, StatusUpdate, TaskStatus};

fn new_task(task_id: &str) -> NewTask {
    NewTask {
        task_id: task_id.to_string(),
        title: Some("Test Track".to_string()),
        style: Some("lofi".to_string()),
        prompt: "lofi beat".to_string(),
        instrumental: false,
    }
}

#[tokio::test]
async fn upsert_then_get_round_trips_fields() {
    let pool = test_pool().await;

    let stored = tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    assert_eq!(stored.task_id, "t1");
    assert_eq!(stored.status, TaskStatus::Submitted);
    assert_eq!(stored.title.as_deref(), Some("Test Track"));
    assert_eq!(stored.style.as_deref(), Some("lofi"));
    assert_eq!(stored.prompt.as_deref(), Some("lofi beat"));
    assert!(!stored.instrumental);
    assert!(stored.audio_url.is_none());

    let fetched = tasks::get_task(&pool, "t1").await.unwrap().unwrap();
    assert_eq!(fetched.task_id, stored.task_id);
    assert_eq!(fetched.status, stored.status);
    assert_eq!(fetched.created_at, stored.created_at);
}

#[tokio::test]
async fn get_unknown_task_returns_none() {
    let pool = test_pool().await;
    assert!(tasks::get_task(&pool, "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_submission_updates_instead_of_duplicating() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();

    let mut second = new_task("t1");
    second.title = Some("Renamed".to_string());
    tasks::insert_submitted(&pool, &second).await.unwrap();

    let all = tasks::list_tasks(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title.as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn resubmission_does_not_reopen_a_completed_task() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::complete("http://x/a.mp3".to_string(), None),
    )
    .await
    .unwrap();

    let stored = tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Complete);
    assert_eq!(stored.audio_url.as_deref(), Some("http://x/a.mp3"));
}

#[tokio::test]
async fn in_flight_statuses_progress_normally() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();

    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, None),
    )
    .await
    .unwrap();
    assert_eq!(stored.status, TaskStatus::Processing);

    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::complete("http://x/a.mp3".to_string(), None),
    )
    .await
    .unwrap();
    assert_eq!(stored.status, TaskStatus::Complete);
    assert_eq!(stored.audio_url.as_deref(), Some("http://x/a.mp3"));
}

#[tokio::test]
async fn stale_submitted_observation_does_not_roll_back_processing() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, None),
    )
    .await
    .unwrap();

    // A delayed PENDING poll result lands after a progress callback
    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Submitted, None),
    )
    .await
    .unwrap();
    assert_eq!(stored.status, TaskStatus::Processing);
}

#[tokio::test]
async fn complete_status_never_regresses() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::complete("http://x/a.mp3".to_string(), None),
    )
    .await
    .unwrap();

    // A late "processing" observation must not reopen the task
    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, None),
    )
    .await
    .unwrap();
    assert_eq!(stored.status, TaskStatus::Complete);
    assert_eq!(stored.audio_url.as_deref(), Some("http://x/a.mp3"));
}

#[tokio::test]
async fn first_terminal_status_wins_between_two_terminals() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::apply_update(&pool, "t1", &StatusUpdate::failed("poll_timeout", None))
        .await
        .unwrap();

    // A completion arriving after the failure was recorded does not flap
    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::complete("http://x/late.mp3".to_string(), None),
    )
    .await
    .unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.fail_reason.as_deref(), Some("poll_timeout"));
    assert!(stored.audio_url.is_none());
}

#[tokio::test]
async fn apply_update_creates_row_for_unknown_task() {
    let pool = test_pool().await;

    let stored = tasks::apply_update(
        &pool,
        "never-submitted",
        &StatusUpdate::complete("http://x/u.mp3".to_string(), None),
    )
    .await
    .unwrap();

    assert_eq!(stored.task_id, "never-submitted");
    assert_eq!(stored.status, TaskStatus::Complete);
    assert_eq!(stored.audio_url.as_deref(), Some("http://x/u.mp3"));
}

#[tokio::test]
async fn audio_url_only_set_with_complete() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, None),
    )
    .await
    .unwrap();

    assert_eq!(stored.status, TaskStatus::Processing);
    assert!(stored.audio_url.is_none());
}

#[tokio::test]
async fn raw_payload_keeps_last_seen_response() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, Some("{\"v\":1}".to_string())),
    )
    .await
    .unwrap();

    // An update without a payload keeps the previous one
    let stored = tasks::apply_update(
        &pool,
        "t1",
        &StatusUpdate::progress(TaskStatus::Processing, None),
    )
    .await
    .unwrap();
    assert_eq!(stored.raw_payload.as_deref(), Some("{\"v\":1}"));
}

#[tokio::test]
async fn provider_task_id_is_kept_once_learned() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::set_provider_task_id(&pool, "t1", "prov-1").await.unwrap();

    // A later attempt does not overwrite the recorded id
    tasks::set_provider_task_id(&pool, "t1", "prov-2").await.unwrap();

    let stored = tasks::get_task(&pool, "t1").await.unwrap().unwrap();
    assert_eq!(stored.provider_task_id.as_deref(), Some("prov-1"));

    let by_provider = tasks::get_task_by_provider_id(&pool, "prov-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_provider.task_id, "t1");
}

#[tokio::test]
async fn list_returns_newest_first() {
    let pool = test_pool().await;

    for id in ["a", "b", "c"] {
        tasks::insert_submitted(&pool, &new_task(id)).await.unwrap();
    }

    let all = tasks::list_tasks(&pool).await.unwrap();
    assert_eq!(all.len(), 3);
    let ids: Vec<_> = all.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn set_local_path_records_materialization() {
    let pool = test_pool().await;

    tasks::insert_submitted(&pool, &new_task("t1")).await.unwrap();
    tasks::set_local_path(&pool, "t1", "/audio/t1.mp3").await.unwrap();

    let stored = tasks::get_task(&pool, "t1").await.unwrap().unwrap();
    assert_eq!(stored.local_path.as_deref(), Some("/audio/t1.mp3"));
}
