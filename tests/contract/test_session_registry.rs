//! Contract Tests for the Session Registry
//!
//! One current session per caller, the replace and reject policies, the
//! global session limit, disconnects and shutdown.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use runterm::{ClientId, EventSink, RunPolicy, SessionManager, SessionStatus, TerminalStatus};
use std::time::Duration;
use tempfile::TempDir;
use test_utils::*;

const LIMIT: Duration = Duration::from_secs(20);
const LONG_RUNNING: &str = "import time\nprint('up', flush=True)\ntime.sleep(60)\n";

async fn start_long_running(
    manager: &SessionManager,
    client: &ClientId,
) -> (EventSink, tokio::sync::mpsc::UnboundedReceiver<runterm::ServerEvent>) {
    let (sink, mut events) = EventSink::channel();
    manager
        .run_code(client, LONG_RUNNING.to_string(), Some("python"), &sink)
        .await
        .expect("launched");
    wait_for_output(&mut events, "up", LIMIT).await;
    (sink, events)
}

#[tokio::test]
async fn test_session_info_while_running() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let client = ClientId::new();

    let (sink, mut events) = start_long_running(&manager, &client).await;

    let info = manager.session_info(&client).await.expect("session");
    assert_eq!(info.status, SessionStatus::Running);
    assert!(info.pid > 0);
    assert!(!info.session_id.is_empty());
    assert_eq!(manager.active_sessions(), 1);
    assert_eq!(manager.client_count().await, 1);

    manager.stop(&client, &sink).await;
    collect_until_status(&mut events, LIMIT).await;
    manager.wait_finished(&client).await;
    assert_eq!(manager.status(&client).await, Some(SessionStatus::Finished));
}

#[tokio::test]
async fn test_replace_policy_retires_previous_session() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let client = ClientId::new();

    let (_first_sink, mut first_events) = start_long_running(&manager, &client).await;
    let first_id = manager.session_info(&client).await.unwrap().session_id;

    let (second_sink, mut second_events) = EventSink::channel();
    let second_id = manager
        .run_code(&client, "print('second')".to_string(), Some("python"), &second_sink)
        .await
        .expect("replacement launched");
    assert_ne!(first_id, second_id);

    // The old run was finalized before the new one launched
    let first = collect_until_status(&mut first_events, Duration::from_millis(100)).await;
    assert_eq!(final_status(&first), Some(TerminalStatus::Finished));

    let second = collect_until_status(&mut second_events, LIMIT).await;
    assert_eq!(joined_output(&second), "second\n");
    assert_eq!(final_status(&second), Some(TerminalStatus::Finished));
    assert!(scratch_entries(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_reject_policy_refuses_second_run() {
    let scratch = TempDir::new().unwrap();
    let mut config = create_test_config(&scratch);
    config.sessions.run_policy = RunPolicy::Reject;
    let manager = SessionManager::new(config);
    let client = ClientId::new();

    let (first_sink, mut first_events) = start_long_running(&manager, &client).await;

    let (second_sink, mut second_events) = EventSink::channel();
    let refused = manager
        .run_code(&client, "print('second')".to_string(), Some("python"), &second_sink)
        .await;
    assert!(refused.is_none());

    let second = collect_until_status(&mut second_events, LIMIT).await;
    assert!(joined_output(&second).contains("still running"));
    assert_eq!(final_status(&second), Some(TerminalStatus::Error));

    // The first run is untouched
    assert_eq!(manager.status(&client).await, Some(SessionStatus::Running));
    manager.stop(&client, &first_sink).await;
    collect_until_status(&mut first_events, LIMIT).await;
}

#[tokio::test]
async fn test_session_limit_applies_across_clients() {
    let scratch = TempDir::new().unwrap();
    let mut config = create_test_config(&scratch);
    config.sessions.max_active = 1;
    let manager = SessionManager::new(config);
    let alice = ClientId::from("alice");
    let bob = ClientId::from("bob");

    let (alice_sink, mut alice_events) = start_long_running(&manager, &alice).await;

    let (bob_sink, mut bob_events) = EventSink::channel();
    assert!(manager
        .run_code(&bob, "print(1)".to_string(), Some("python"), &bob_sink)
        .await
        .is_none());
    let refused = collect_until_status(&mut bob_events, LIMIT).await;
    assert!(joined_output(&refused).contains("busy"));
    assert_eq!(final_status(&refused), Some(TerminalStatus::Error));

    // Once alice's run ends the permit is free again
    manager.stop(&alice, &alice_sink).await;
    collect_until_status(&mut alice_events, LIMIT).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_sessions(), 0);

    manager
        .run_code(&bob, "print(1)".to_string(), Some("python"), &bob_sink)
        .await
        .expect("launched after the limit cleared");
    let ok = collect_until_status(&mut bob_events, LIMIT).await;
    assert_eq!(joined_output(&ok), "1\n");
}

#[tokio::test]
async fn test_clients_are_isolated() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let alice = ClientId::from("alice");
    let bob = ClientId::from("bob");

    let (alice_sink, mut alice_events) = start_long_running(&manager, &alice).await;

    // Stop and input from bob do not reach alice's session
    let (bob_sink, mut bob_events) = EventSink::channel();
    assert!(!manager.stop(&bob, &bob_sink).await);
    assert!(!manager.input(&bob, "hello").await);
    assert!(bob_events.try_recv().is_err());
    assert_eq!(manager.status(&alice).await, Some(SessionStatus::Running));

    manager.stop(&alice, &alice_sink).await;
    collect_until_status(&mut alice_events, LIMIT).await;
}

#[tokio::test]
async fn test_disconnect_stops_live_session() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let client = ClientId::new();

    let (_sink, mut events) = start_long_running(&manager, &client).await;

    manager.disconnect(&client).await;
    assert_eq!(manager.client_count().await, 0);
    assert!(manager.status(&client).await.is_none());

    let events = collect_until_status(&mut events, LIMIT).await;
    assert_eq!(final_status(&events), Some(TerminalStatus::Finished));
    assert!(scratch_entries(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_shutdown_finishes_every_session() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let alice = ClientId::from("alice");
    let bob = ClientId::from("bob");

    let (_a, mut alice_events) = start_long_running(&manager, &alice).await;
    let (_b, mut bob_events) = start_long_running(&manager, &bob).await;
    assert_eq!(manager.active_sessions(), 2);

    manager.shutdown().await;

    for events in [&mut alice_events, &mut bob_events] {
        let collected = collect_until_status(events, Duration::from_millis(500)).await;
        assert_eq!(final_status(&collected), Some(TerminalStatus::Finished));
    }
    assert_eq!(manager.client_count().await, 0);
    assert!(scratch_entries(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_failed_run_after_disconnect_leaves_no_slot() {
    let scratch = TempDir::new().unwrap();
    let mut config = create_test_config(&scratch);
    config.toolchain.compiler = "false".to_string();
    let manager = SessionManager::new(config);
    let client = ClientId::new();
    let (sink, events) = EventSink::channel();

    let run = runterm::ClientEvent::RunCode {
        code: "int main() {}".to_string(),
        lang: Some("cpp".to_string()),
    };
    let launch = manager
        .dispatch(&client, run, &sink)
        .await
        .expect("runs are launched on a task");

    // Connection gone: receiver dropped, then the caller is forgotten
    drop(events);
    manager.disconnect(&client).await;
    launch.await.unwrap();

    assert_eq!(manager.client_count().await, 0);
    assert_eq!(manager.active_sessions(), 0);
    assert!(scratch_entries(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_failed_run_keeps_slot_of_connected_client() {
    let scratch = TempDir::new().unwrap();
    let mut config = create_test_config(&scratch);
    config.toolchain.compiler = "false".to_string();
    let manager = SessionManager::new(config);
    let client = ClientId::new();
    let (sink, mut events) = EventSink::channel();

    assert!(manager
        .run_code(&client, "int main() {}".to_string(), Some("cpp"), &sink)
        .await
        .is_none());
    let collected = collect_until_status(&mut events, LIMIT).await;
    assert_eq!(final_status(&collected), Some(TerminalStatus::Error));
    assert_eq!(manager.client_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_ack_always_precedes_final_status() {
    let scratch = TempDir::new().unwrap();
    let manager = SessionManager::new(create_test_config(&scratch));
    let client = ClientId::new();

    for _ in 0..10 {
        let (sink, mut events) = EventSink::channel();
        manager
            .run_code(
                &client,
                "print('up', flush=True)\nwhile True:\n    pass\n".to_string(),
                Some("python"),
                &sink,
            )
            .await
            .expect("launched");
        wait_for_output(&mut events, "up\n", LIMIT).await;

        assert!(manager.stop(&client, &sink).await);
        let collected = collect_until_status(&mut events, LIMIT).await;
        let ack = collected
            .iter()
            .position(|event| *event == runterm::ServerEvent::output(runterm::protocol::STOP_ACK))
            .expect("ack sent");
        assert!(ack < collected.len() - 1, "events: {:?}", collected);
        assert_eq!(final_status(&collected), Some(TerminalStatus::Finished));
    }
}
