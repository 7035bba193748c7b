/// Observer protocol tests: boot snapshot, event application, resync
mod common;

use askpanel_core::thread_types::{Role, StateEvent, StatusKind};
use common::{coordinator, coordinator_with, settle, ScriptedBackend};
use std::time::Duration;

#[tokio::test]
async fn test_boot_on_empty_store() {
    let coordinator = coordinator(ScriptedBackend::new());
    let observer = coordinator.observe();

    assert!(observer.thread().is_empty());
    assert_eq!(observer.status().kind, StatusKind::Neutral);
    assert_eq!(observer.status().at, 0);
    assert!(observer.last_selection().is_none());
}

#[tokio::test]
async fn test_boot_pulls_existing_state() {
    let coordinator = coordinator(ScriptedBackend::new());
    coordinator.capture_selection("earlier").await.unwrap();
    settle(&coordinator).await;

    // Connected after the fact: nothing is replayed, the snapshot covers it
    let mut observer = coordinator.observe();
    assert_eq!(observer.drain(), 0);
    assert_eq!(observer.thread().len(), 2);
    assert_eq!(observer.status().text, "Done.");
    assert_eq!(observer.last_selection().unwrap().text, "earlier");
}

#[tokio::test]
async fn test_observer_follows_job_lifecycle() {
    let coordinator = coordinator(ScriptedBackend::new());
    let mut observer = coordinator.observe();

    let ack = observer.submit_text("hello", false).await;
    assert!(ack.ok);

    let mut seen = Vec::new();
    while observer.status().text != "Done." {
        let event = tokio::time::timeout(Duration::from_secs(5), observer.next_event())
            .await
            .expect("no event")
            .expect("channel closed");
        seen.push(event);
    }

    // user message, "Sending…", bot message, "Done."
    assert!(matches!(&seen[0], StateEvent::ThreadUpdated { thread } if thread.len() == 1));
    assert!(
        matches!(&seen[1], StateEvent::StatusUpdated { status } if status.text == "Sending…")
    );
    assert!(matches!(&seen[2], StateEvent::ThreadUpdated { thread } if thread.len() == 2));

    assert_eq!(observer.thread()[1].role, Role::Bot);
    assert_eq!(observer.thread()[1].text, "X");
    assert_eq!(observer.status().kind, StatusKind::Ok);
}

#[tokio::test]
async fn test_round_trip_preserves_messages() {
    let coordinator = coordinator(ScriptedBackend::new());
    let mut observer = coordinator.observe();

    let n = 6;
    for i in 0..n {
        assert!(observer.submit_text(&format!("msg {}", i), false).await.ok);
    }
    settle(&coordinator).await;
    observer.drain();

    let state = coordinator.global_state();
    // Broadcast copy and stored copy agree on id, role, text and ts
    assert_eq!(observer.thread(), state.thread.as_slice());

    let asked: Vec<String> = state
        .thread
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text.clone())
        .collect();
    let expected: Vec<String> = (0..n).map(|i| format!("msg {}", i)).collect();
    assert_eq!(asked, expected);
}

#[tokio::test]
async fn test_blank_submission_from_observer() {
    let coordinator = coordinator(ScriptedBackend::new());
    let mut observer = coordinator.observe();

    let ack = observer.submit_text("    ", true).await;
    assert!(!ack.ok);
    assert_eq!(observer.drain(), 0);
    assert!(coordinator.global_state().thread.is_empty());
}

#[tokio::test]
async fn test_include_selection_prefixes_prompt() {
    let backend = ScriptedBackend::new();
    let coordinator = coordinator(backend.clone());
    coordinator.capture_selection("fn main() {}").await.unwrap();
    settle(&coordinator).await;

    let observer = coordinator.observe();
    assert!(observer.submit_text("what does this do?", true).await.ok);
    settle(&coordinator).await;

    let calls = backend.calls();
    assert_eq!(
        calls.last().unwrap(),
        "Selected text:\nfn main() {}\n\nQuestion:\nwhat does this do?"
    );
}

#[tokio::test]
async fn test_clear_resets_observer() {
    let coordinator = coordinator(ScriptedBackend::new());
    coordinator.capture_selection("keep").await.unwrap();
    settle(&coordinator).await;

    let mut observer = coordinator.observe();
    assert_eq!(observer.thread().len(), 2);

    assert!(observer.clear().await.ok);
    observer.drain();

    assert!(observer.thread().is_empty());
    assert_eq!(observer.status().kind, StatusKind::Neutral);
    assert_eq!(observer.last_selection().unwrap().text, "keep");
}

#[tokio::test]
async fn test_lagging_observer_resyncs() {
    // Room for a single event: the observer will fall behind
    let coordinator = coordinator_with(ScriptedBackend::new(), Duration::from_secs(5), 1);
    let mut observer = coordinator.observe();

    for i in 0..3 {
        assert!(coordinator.submit_text(&format!("burst {}", i)).await.is_ok());
    }
    settle(&coordinator).await;
    // Buffered leftovers are older than the snapshot and are skipped
    assert_eq!(observer.drain(), 0);

    let state = coordinator.global_state();
    assert_eq!(state.thread.len(), 6);
    assert_eq!(observer.thread(), state.thread.as_slice());
    assert_eq!(observer.status(), &state.status);
}

#[tokio::test]
async fn test_lagging_observer_waits_for_fresh_event() {
    let coordinator = coordinator_with(ScriptedBackend::new(), Duration::from_secs(5), 4);
    let mut observer = coordinator.observe();

    for i in 0..3 {
        assert!(coordinator.submit_text(&format!("burst {}", i)).await.is_ok());
    }
    settle(&coordinator).await;

    let submitter = coordinator.clone();
    let (event, submitted) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(5), observer.next_event()),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            submitter.submit_text("fresh").await
        }
    );
    assert!(submitted.is_ok());

    // First event after the resync is the new question, not a stale one
    match event.expect("no event").expect("channel closed") {
        StateEvent::ThreadUpdated { thread } => {
            assert_eq!(thread.len(), 7);
            assert_eq!(thread[6].text, "fresh");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(observer.thread().len(), 7);
}

#[tokio::test]
async fn test_many_observers_see_same_state() {
    let coordinator = coordinator(ScriptedBackend::new());
    let mut a = coordinator.observe();
    let mut b = coordinator.observe();
    assert_eq!(coordinator.observer_count(), 2);

    assert!(coordinator.submit_text("shared").await.is_ok());
    settle(&coordinator).await;
    a.drain();
    b.drain();

    assert_eq!(a.view(), b.view());
    assert_eq!(a.thread().len(), 2);

    drop(b);
    assert_eq!(coordinator.observer_count(), 1);
}
