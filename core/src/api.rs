/// Command API for the capture surface and the CLI (line-delimited JSON over TCP)
use crate::coordinator::Coordinator;
use crate::error::{AskError, Result};
use crate::job_queue::ExecutorState;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// API request
#[derive(Debug, Deserialize)]
#[serde(tag = "command")]
enum ApiRequest {
    #[serde(rename = "ask")]
    Ask { text: String },
    #[serde(rename = "image")]
    Image { url: String },
    #[serde(rename = "selection")]
    Selection { text: String },
    #[serde(rename = "state")]
    State,
    #[serde(rename = "clear")]
    Clear,
}

/// API response
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(serde_json::json!({ "queued": true })),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Start the command API server
pub async fn start_api_server(coordinator: Coordinator, api_addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(&api_addr).await?;
    info!("Command API listening on {}", api_addr);
    serve_api(listener, coordinator).await
}

/// Accept loop over an already bound listener
pub async fn serve_api(listener: TcpListener, coordinator: Coordinator) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("API client connected from {}", addr);
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_api_client(stream, coordinator).await {
                        error!("Error handling API client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept API connection: {}", e);
            }
        }
    }
}

/// Handle API client connection
async fn handle_api_client(mut stream: TcpStream, coordinator: Coordinator) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("API client disconnected");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match handle_request(trimmed, &coordinator).await {
                    Ok(resp) => resp,
                    Err(e) => ApiResponse::error(e.to_string()),
                };

                let json = serde_json::to_string(&response)?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            Err(e) => {
                error!("Error reading from API client: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Handle API request
async fn handle_request(request: &str, coordinator: &Coordinator) -> Result<ApiResponse> {
    let req: ApiRequest = serde_json::from_str(request)
        .map_err(|e| AskError::Validation(format!("Invalid request: {}", e)))?;

    let response = match req {
        ApiRequest::Ask { text } => ApiResponse::from_result(coordinator.submit_text(&text).await),
        ApiRequest::Image { url } => {
            ApiResponse::from_result(coordinator.submit_image(&url).await)
        }
        ApiRequest::Selection { text } => {
            ApiResponse::from_result(coordinator.capture_selection(&text).await)
        }
        ApiRequest::State => {
            let state = coordinator.global_state();
            let queue = coordinator.queue_status();
            let mut data = serde_json::to_value(&state)?;
            data["pending"] = serde_json::json!(queue.pending);
            data["executing"] = serde_json::json!(queue.state == ExecutorState::Executing);
            ApiResponse::success(data)
        }
        ApiRequest::Clear => {
            let ack = coordinator.clear().await;
            if ack.ok {
                ApiResponse::success(serde_json::json!({ "cleared": true }))
            } else {
                ApiResponse::error(ack.error.unwrap_or_else(|| "Clear failed".to_string()))
            }
        }
    };

    Ok(response)
}
