//! Incremental runs, interrupted passes and per-parent failure carry-over

use crate::common::*;
use tempfile::TempDir;
use thread_harvest::crawler::{harvest, StopFlag};
use thread_harvest::model::Position;
use thread_harvest::output::RunStatus;
use thread_harvest::storage::{CheckpointStore, ProgressState, ProgressTracker};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_second_run_fetches_nothing_new() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");

    let history = || vec![message("20.0", 1), message("10.0", 2)];
    mount_history(&mock_server, history()).await;
    mount_thread(&mock_server, "10.0", &["10.1", "10.2"]).await;
    mount_thread(&mock_server, "20.0", &["20.1"]).await;
    mount_permalinks(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    harvest(config.clone(), StopFlag::new())
        .await
        .expect("First harvest failed");
    let first_export = load_export(&config);

    // The server ignores `oldest` here; the client-side filter still applies
    mock_server.reset().await;
    mount_history(&mock_server, history()).await;

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Second harvest failed");

    assert_eq!(summary.parents_fetched, 0);
    assert_eq!(summary.replies_fetched, 0);
    assert_eq!(request_count(&mock_server, "/conversations.replies").await, 0);
    assert_eq!(request_count(&mock_server, "/chat.getPermalink").await, 0);
    assert_eq!(load_export(&config), first_export);
    assert_eq!(load_checkpoint(&config).unwrap().as_str(), "20.0");
}

#[tokio::test]
async fn test_incremental_run_fetches_only_newer_parents() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");

    mount_history(&mock_server, vec![message("10.0", 1)]).await;
    mount_thread(&mock_server, "10.0", &["10.1"]).await;
    mount_permalinks(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    harvest(config.clone(), StopFlag::new())
        .await
        .expect("First harvest failed");

    mock_server.reset().await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .and(query_param("oldest", "10.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![message("30.0", 1), message("10.0", 1)], None)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_thread(&mock_server, "30.0", &["30.1"]).await;
    mount_permalinks(&mock_server).await;

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Second harvest failed");

    assert_eq!(summary.parents_fetched, 1);
    assert_eq!(summary.replies_fetched, 1);
    assert_eq!(request_count(&mock_server, "/conversations.replies").await, 1);

    let export = load_export(&config);
    assert_eq!(parent_ids(&export), vec!["10.0", "30.0"]);
    assert_eq!(reply_positions(&export), vec!["10.1", "30.1"]);
    assert_eq!(load_checkpoint(&config).unwrap().as_str(), "30.0");
}

#[tokio::test]
async fn test_failed_parent_carried_to_next_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");

    mount_history(
        &mock_server,
        vec![message("3.0", 1), message("2.0", 1), message("1.0", 1)],
    )
    .await;
    mount_thread(&mock_server, "1.0", &["1.1"]).await;
    mount_thread(&mock_server, "3.0", &["3.1"]).await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .and(query_param("ts", "2.0"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    mount_permalinks(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Harvest should survive a per-parent failure");

    // The other parents still complete and the checkpoint still moves
    assert_eq!(summary.status(), RunStatus::Partial);
    assert_eq!(summary.parents_completed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].identity, "2.0");
    assert_eq!(summary.pending, 1);
    assert_eq!(load_checkpoint(&config).unwrap().as_str(), "3.0");

    let progress = load_progress(&config);
    assert_eq!(progress.sequence, vec!["2.0".to_string()]);
    assert_eq!(progress.next_index, 0);
    assert_eq!(progress.attempts.get("2.0"), Some(&1));

    // Next run: nothing new upstream, the failed thread now answers
    mock_server.reset().await;
    mount_history(
        &mock_server,
        vec![message("3.0", 1), message("2.0", 1), message("1.0", 1)],
    )
    .await;
    mount_thread(&mock_server, "2.0", &["2.1"]).await;

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Retry harvest failed");

    assert_eq!(summary.status(), RunStatus::Completed);
    assert_eq!(summary.parents_fetched, 0);
    assert_eq!(summary.parents_completed, 1);
    assert_eq!(request_count(&mock_server, "/conversations.replies").await, 1);
    assert!(load_progress(&config).is_reset());

    let export = load_export(&config);
    assert_eq!(reply_positions(&export), vec!["1.1", "2.1", "3.1"]);
}

#[tokio::test]
async fn test_parent_abandoned_after_attempt_cap() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");

    mount_history(&mock_server, vec![message("1.0", 1)]).await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    mount_permalinks(&mock_server).await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.harvest.max_parent_attempts = Some(1);

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Harvest failed");

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.abandoned, vec!["1.0".to_string()]);
    assert_eq!(summary.pending, 0);
    assert!(load_progress(&config).is_reset());
}

#[tokio::test]
async fn test_resume_interrupted_pass() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), dir.path());

    // State left behind by a run that stopped after settling the first parent
    std::fs::create_dir_all(&config.output.directory).unwrap();
    CheckpointStore::new(config.output.checkpoint_path())
        .store(&Position::new("30.0"))
        .unwrap();
    let mut state = ProgressState::new(vec![
        "10.0".to_string(),
        "20.0".to_string(),
        "30.0".to_string(),
    ]);
    state.advance(true);
    ProgressTracker::new(config.output.progress_path())
        .store(&state)
        .unwrap();

    mount_history(&mock_server, vec![message("30.0", 1), message("20.0", 1)]).await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .and(query_param("ts", "10.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(thread("10.0", &["10.1"])))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_thread(&mock_server, "20.0", &["20.1"]).await;
    mount_thread(&mock_server, "30.0", &["30.1"]).await;

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Resumed harvest failed");

    assert_eq!(summary.parents_fetched, 0);
    assert_eq!(summary.parents_completed, 2);
    assert_eq!(request_count(&mock_server, "/conversations.replies").await, 2);
    assert!(load_progress(&config).is_reset());
    assert_eq!(load_checkpoint(&config).unwrap().as_str(), "30.0");
}

#[tokio::test]
async fn test_checkpoint_never_moves_backwards() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), dir.path());

    std::fs::create_dir_all(&config.output.directory).unwrap();
    CheckpointStore::new(config.output.checkpoint_path())
        .store(&Position::new("500.0"))
        .unwrap();

    // Older history only; nothing qualifies
    mount_history(&mock_server, vec![message("400.0", 1), message("90.0", 1)]).await;

    let summary = harvest(config.clone(), StopFlag::new())
        .await
        .expect("Harvest failed");

    assert_eq!(summary.parents_fetched, 0);
    assert_eq!(load_checkpoint(&config).unwrap().as_str(), "500.0");
}
