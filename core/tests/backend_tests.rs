/// HTTP answering backend against a stub proxy on a local socket
mod common;

use askpanel_core::backend::{AnswerBackend, HttpBackend};
use askpanel_core::state_store::StateStore;
use askpanel_core::thread_types::{JobKind, StatusKind};
use askpanel_core::utils::EventEmitter;
use askpanel_core::{Config, Coordinator};
use common::settle;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Seen {
    path: String,
    body: serde_json::Value,
}

/// Serve every connection with the same status and body, recording requests.
/// A `None` reply never answers.
async fn stub_proxy(reply: Option<(u16, &'static str)>) -> (SocketAddr, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let log = log.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).await.unwrap();
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("")
                    .to_string();

                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }

                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).await.unwrap();
                log.lock().unwrap().push(Seen {
                    path,
                    body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
                });

                let Some((status, payload)) = reply else {
                    std::future::pending::<()>().await;
                    return;
                };
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    payload.len(),
                    payload
                );
                let stream = reader.get_mut();
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, seen)
}

fn base_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_text_question_posts_to_ask() {
    let (addr, seen) = stub_proxy(Some((200, r#"{"answer":"forty-two"}"#))).await;
    let backend = HttpBackend::new(&base_url(addr)).unwrap();

    let answer = backend.answer_text("meaning of life?").await.unwrap();
    assert_eq!(answer, "forty-two");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/ask");
    assert_eq!(seen[0].body, serde_json::json!({ "text": "meaning of life?" }));
}

#[tokio::test]
async fn test_image_question_posts_to_ask_image() {
    let (addr, seen) = stub_proxy(Some((200, r#"{"answer":"a cat"}"#))).await;
    // Trailing slash on the base is tolerated
    let backend = HttpBackend::new(&format!("{}/", base_url(addr))).unwrap();

    let answer = backend
        .answer_image("https://example.com/cat.png")
        .await
        .unwrap();
    assert_eq!(answer, "a cat");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/ask-image");
    assert_eq!(
        seen[0].body,
        serde_json::json!({ "url": "https://example.com/cat.png" })
    );
}

#[tokio::test]
async fn test_proxy_error_is_surfaced() {
    let (addr, _) = stub_proxy(Some((500, r#"{"error":"quota exceeded"}"#))).await;
    let backend = HttpBackend::new(&base_url(addr)).unwrap();

    let err = backend.answer_text("anything").await.unwrap_err();
    assert_eq!(err.message, "quota exceeded");
    assert_eq!(err.status, Some(500));
}

#[tokio::test]
async fn test_unreachable_proxy_is_network_error() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let backend = HttpBackend::new(&base_url(addr)).unwrap();

    let err = backend.answer_text("anyone there?").await.unwrap_err();
    assert!(err.message.starts_with("Network error"), "{}", err.message);
    assert_eq!(err.status, None);
}

#[tokio::test]
async fn test_silent_proxy_times_out_through_coordinator() {
    let (addr, _) = stub_proxy(None).await;
    let backend = HttpBackend::new(&base_url(addr)).unwrap();

    let config = Config {
        backend_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let store = StateStore::temporary(EventEmitter::default()).unwrap();
    let coordinator = Coordinator::with_store(config, store, Arc::new(backend));

    assert!(coordinator.submit(JobKind::Text, "slow one").await.ok);
    settle(&coordinator).await;

    let state = coordinator.global_state();
    assert_eq!(state.thread.len(), 2);
    assert!(state.thread[1].text.starts_with("Error: Request timed out"));
    assert_eq!(state.status.kind, StatusKind::Error);
}
