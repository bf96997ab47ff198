//! HTTP server for the Text2SQL assistant
//! Simple HTTP/1.1 handling on top of tokio

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use text2sql_assistant::config::AppConfig;
use text2sql_assistant::db::QueryHistory;
use text2sql_assistant::render;
use text2sql_assistant::schema_info;
use text2sql_assistant::workflow::{Workflow, WorkflowEvent};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_REQUEST_BYTES: usize = 1_000_000;

struct AppContext {
    workflow: Arc<Workflow>,
    history: Option<QueryHistory>,
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    println!("Starting Text2SQL Assistant API Server...");
    println!("[OK] Model: {} via {} ({})", config.llm.model, config.llm.provider, config.llm.base_url);

    let workflow = Arc::new(Workflow::from_config(&config)?);
    println!("[OK] Database: {}", config.db_path.display());

    let history = match &config.history_db {
        Some(path) => {
            println!("[OK] Recording runs to {}", path.display());
            Some(QueryHistory::open(path)?)
        }
        None => None,
    };
    if config.guardrails_enabled {
        println!("[INFO] Guardrails enabled");
    }

    let context = Arc::new(AppContext { workflow, history });
    let listener = TcpListener::bind(&config.bind_addr).await?;
    println!("[OK] Server listening on {}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&context)));
    }
}

async fn handle_connection(mut stream: TcpStream, context: Arc<AppContext>) {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read(&mut temp_buf).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&temp_buf[..n]);
            if request_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }
    if buffer.is_empty() {
        return;
    }

    let response = match String::from_utf8(buffer) {
        Ok(request) => handle_request(&request, &context).await,
        Err(e) => {
            warn!("Failed to parse request as UTF-8: {}", e);
            create_response(400, "Bad Request", r#"{"error":"request is not valid UTF-8"}"#)
        }
    };
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// Headers are in and, if a body was announced, all of it has arrived.
fn request_complete(buffer: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(buffer) else {
        return false;
    };
    let Some(headers_end) = text.find("\r\n\r\n").map(|i| i + 4) else {
        return false;
    };
    match extract_content_length(&text[..headers_end]) {
        Some(length) => buffer.len() >= headers_end + length,
        None => true,
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    request
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn request_body(request: &str) -> &str {
    request.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

async fn handle_request(request: &str, context: &AppContext) -> String {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let (Some(method), Some(full_path)) = (parts.next(), parts.next()) else {
        return create_response(400, "Bad Request", r#"{"error":"malformed request line"}"#);
    };
    let path = full_path.split('?').next().unwrap_or(full_path);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    info!("Request: {} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/health") | ("GET", "/api/health") => {
            let missing = match context.workflow.executor().table_names() {
                Ok(tables) => schema_info::missing_tables(&tables),
                Err(e) => {
                    error!("Could not list tables: {}", e);
                    schema_info::TABLES.to_vec()
                }
            };
            let status = if missing.is_empty() { "ok" } else { "degraded" };
            let body = json!({
                "status": status,
                "service": "text2sql-assistant",
                "model": context.workflow.model().model_name(),
                "missing_tables": missing,
            });
            create_response(200, "OK", &body.to_string())
        }
        ("GET", "/api/diagram") => {
            let body = json!({ "mermaid": context.workflow.mermaid() });
            create_response(200, "OK", &body.to_string())
        }
        ("POST", "/api/query") => handle_query(request_body(request), context).await,
        _ => {
            warn!("404: {} {} not found", method, path);
            create_response(404, "Not Found", r#"{"error":"not found"}"#)
        }
    }
}

async fn handle_query(body: &str, context: &AppContext) -> String {
    let req: QueryRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => {
            warn!("Failed to parse query request: {}", e);
            let body = json!({ "error": format!("expected {{\"question\": ...}}: {}", e) });
            return create_response(400, "Bad Request", &body.to_string());
        }
    };
    if req.question.trim().is_empty() {
        return create_response(400, "Bad Request", r#"{"error":"question must not be empty"}"#);
    }

    let mut rx = Arc::clone(&context.workflow).stream(req.question.trim());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    match events.last() {
        Some(WorkflowEvent::Final { state }) => {
            if let Some(history) = &context.history {
                if let Err(e) = history.record(state) {
                    warn!("Failed to record run: {}", e);
                }
            }
            let body = json!({
                "events": events,
                "state": state,
                "response": render::final_response(state),
            });
            create_response(200, "OK", &body.to_string())
        }
        Some(WorkflowEvent::Error { message }) => {
            error!("Query failed: {}", message);
            let body = json!({ "error": message, "events": events });
            create_response(500, "Internal Server Error", &body.to_string())
        }
        _ => create_response(
            500,
            "Internal Server Error",
            r#"{"error":"workflow ended without a result"}"#,
        ),
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_complete() {
        let partial = b"POST /api/query HTTP/1.1\r\nContent-Length: 20\r\n\r\n{\"question\"";
        assert!(!request_complete(partial));
        let full = b"POST /api/query HTTP/1.1\r\ncontent-length: 4\r\n\r\n{}  ";
        assert!(request_complete(full));
        assert!(request_complete(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn test_request_body() {
        let req = "POST /api/query HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}";
        assert_eq!(request_body(req), "{}");
        assert_eq!(extract_content_length(req), Some(2));
    }
}
