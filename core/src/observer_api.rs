/// Observer REST API and SSE stream for presentation views
///
/// Endpoints:
///   GET  /api/state     full snapshot {thread, status, lastSelection}
///   POST /api/text      body: {"text":"...","include_selection":false}
///   POST /api/image     body: {"url":"..."}
///   POST /api/clear
///   GET  /events        SSE stream of StateEvent JSON
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::observer::compose_prompt;
use crate::thread_types::{Ack, JobKind, StateEvent};
use bytes::Bytes;
use futures_util::stream::{unfold, StreamExt};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;
type Resp = Response<BoxBody>;

// ─── Responses ───────────────────────────────────────────────────────────────

/// Every response carries permissive CORS headers
fn respond(status: StatusCode, content_type: Option<&str>, body: BoxBody) -> Resp {
    let mut builder = Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type");
    if let Some(ct) = content_type {
        builder = builder.header("Content-Type", ct);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).boxed()))
}

fn empty_resp(status: StatusCode) -> Resp {
    respond(status, None, Full::new(Bytes::new()).boxed())
}

fn json_resp<T: serde::Serialize>(status: StatusCode, value: &T) -> Resp {
    let body = serde_json::to_vec(value).unwrap_or_default();
    respond(
        status,
        Some("application/json"),
        Full::new(Bytes::from(body)).boxed(),
    )
}

/// 200 for an accepted submission, 400 with the reason otherwise
fn ack_resp(ack: Ack) -> Resp {
    let status = if ack.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    json_resp(status, &ack)
}

// ─── Event stream ────────────────────────────────────────────────────────────

fn event_frame(event: &StateEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_default();
    Bytes::from(format!("data: {}\n\n", json))
}

/// Sent instead of the events a slow view missed; it must re-pull the snapshot
fn resync_frame(missed: u64) -> Bytes {
    let body = serde_json::json!({ "missed": missed, "snapshot": "/api/state" });
    Bytes::from(format!("event: resync\ndata: {}\n\n", body))
}

fn events_resp(rx: broadcast::Receiver<StateEvent>) -> Resp {
    let hello = futures_util::stream::once(async {
        Ok::<_, Infallible>(Frame::data(Bytes::from_static(b": connected\n\n")))
    });

    let events = unfold(rx, |mut rx| async move {
        let bytes = match rx.recv().await {
            Ok(event) => event_frame(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event stream view fell {} events behind", n);
                resync_frame(n)
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        };
        Some((Ok::<_, Infallible>(Frame::data(bytes)), rx))
    });

    let mut resp = respond(
        StatusCode::OK,
        Some("text/event-stream; charset=utf-8"),
        StreamBody::new(hello.chain(events)).boxed(),
    );
    let headers = resp.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    resp
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub async fn start_observer_api(coordinator: Coordinator, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Observer API started on http://{}", addr);
    serve_observer_api(listener, coordinator).await
}

/// Accept loop over an already bound listener
pub async fn serve_observer_api(listener: TcpListener, coordinator: Coordinator) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let io = TokioIo::new(stream);
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let coordinator = coordinator.clone();
                        async move { Ok::<_, Infallible>(handle(req, coordinator).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        // Views closing their SSE stream is normal
                        if !e.is_incomplete_message() {
                            error!("Observer API connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("Observer API accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn handle(req: Request<hyper::body::Incoming>, coordinator: Coordinator) -> Resp {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    if method == Method::OPTIONS {
        return empty_resp(StatusCode::NO_CONTENT);
    }

    match (method, path.as_str()) {
        (Method::GET, "/api/state") => json_resp(StatusCode::OK, &coordinator.global_state()),
        (Method::POST, "/api/text") => post_text(req, &coordinator).await,
        (Method::POST, "/api/image") => post_image(req, &coordinator).await,
        (Method::POST, "/api/clear") => ack_resp(coordinator.clear().await),
        (Method::GET, "/events") => events_resp(coordinator.subscribe()),
        _ => json_resp(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": format!("no route for {}", path) }),
        ),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TextRequest {
    text: String,
    #[serde(default)]
    include_selection: bool,
}

async fn post_text(req: Request<hyper::body::Incoming>, coordinator: &Coordinator) -> Resp {
    let r: TextRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let selection = coordinator.global_state().last_selection;
    let prompt = compose_prompt(&r.text, selection.as_ref(), r.include_selection);
    ack_resp(coordinator.submit(JobKind::Text, &prompt).await)
}

#[derive(Deserialize)]
struct ImageRequest {
    url: String,
}

async fn post_image(req: Request<hyper::body::Incoming>, coordinator: &Coordinator) -> Resp {
    let r: ImageRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    ack_resp(coordinator.submit(JobKind::Image, &r.url).await)
}

// ─── Utilities ────────────────────────────────────────────────────────────────

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<T, Resp> {
    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| ack_resp(Ack::error(format!("body read error: {}", e))))?;
    serde_json::from_slice(&body).map_err(|e| ack_resp(Ack::error(format!("invalid JSON: {}", e))))
}
