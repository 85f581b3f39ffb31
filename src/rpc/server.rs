use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use crate::srs::{
    DueQuery, SrsEngine, SrsError, SubmitReviewRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: SrsEngine,
}

fn get_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("mnemos")
}

pub async fn run_http_server(host: &str, port: u16) -> Result<()> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let engine = SrsEngine::open(data_dir)?;
    let state = Arc::new(AppState { engine });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/srs/card/register", post(srs_register_card))
        .route("/api/srs/card/suspend", post(srs_suspend_card))
        .route("/api/srs/review", post(srs_submit_review))
        .route("/api/srs/due", post(srs_due_cards))
        .route("/api/srs/stats", post(srs_statistics))
        .route("/api/srs/progress", post(srs_progress))
        .route("/api/srs/daily-cap", post(srs_set_daily_cap))
        .route("/rpc", post(json_rpc_handler))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run_stdio_server() -> Result<()> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let engine = SrsEngine::open(data_dir)?;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut stdout = stdout;

    tracing::info!("JSON-RPC server running on stdio");

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handle_jsonrpc_request(&engine, line).await;

        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

fn status_for(err: &SrsError) -> StatusCode {
    match err {
        SrsError::CardNotFound(_) => StatusCode::NOT_FOUND,
        SrsError::NotOwner { .. } => StatusCode::FORBIDDEN,
        SrsError::CardSuspended(_)
        | SrsError::InvalidRating(_)
        | SrsError::InvalidResponseTime(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SrsError::Conflict(_) => StatusCode::CONFLICT,
        SrsError::Storage(_) | SrsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &SrsError) -> axum::response::Response {
    (
        status_for(err),
        Json(serde_json::json!({"error": err.to_string(), "code": err.code()})),
    )
        .into_response()
}

async fn srs_register_card(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterCardRequest>,
) -> axum::response::Response {
    match state
        .engine
        .register_card(&request.owner, request.book_id, Utc::now())
    {
        Ok(card) => (StatusCode::OK, Json(serde_json::to_value(card).unwrap())).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_suspend_card(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SuspendCardRequest>,
) -> axum::response::Response {
    match state.engine.set_suspended(
        &request.card_id,
        &request.owner,
        request.suspended,
        Utc::now(),
    ) {
        Ok(card) => (StatusCode::OK, Json(serde_json::to_value(card).unwrap())).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_submit_review(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitReviewRequest>,
) -> axum::response::Response {
    match state.engine.submit_review(&request, Utc::now()) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::to_value(outcome).unwrap()),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_due_cards(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DueQuery>,
) -> axum::response::Response {
    match state.engine.due_cards(&request, Utc::now()) {
        Ok(due) => (StatusCode::OK, Json(serde_json::to_value(due).unwrap())).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_statistics(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StatisticsRequest>,
) -> axum::response::Response {
    match state.engine.statistics(
        &request.owner,
        request.window_days,
        request.book_id.as_deref(),
        Utc::now(),
    ) {
        Ok(stats) => (StatusCode::OK, Json(serde_json::to_value(stats).unwrap())).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_progress(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProgressRequest>,
) -> axum::response::Response {
    match state.engine.progress(&request.owner, Utc::now()) {
        Ok(progress) => (
            StatusCode::OK,
            Json(serde_json::to_value(progress).unwrap()),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn srs_set_daily_cap(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DailyCapRequest>,
) -> axum::response::Response {
    match state
        .engine
        .set_daily_cap(&request.owner, request.daily_cap, Utc::now())
    {
        Ok(stored) => (
            StatusCode::OK,
            Json(
                serde_json::to_value(DailyCapResponse {
                    owner: request.owner,
                    daily_cap: stored,
                })
                .unwrap(),
            ),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn json_rpc_handler(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    let response = handle_jsonrpc_request(&state.engine, &body).await;
    (StatusCode::OK, response)
}

async fn handle_jsonrpc_request(engine: &SrsEngine, request: &str) -> String {
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(request);

    match parsed {
        Ok(json) => {
            let method = json.get("method").and_then(|m| m.as_str()).unwrap_or("");
            let params = json
                .get("params")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let id = json.get("id").cloned().unwrap_or(serde_json::Value::Null);

            let result = dispatch_method(engine, method, params).await;

            match result {
                Ok(value) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "result": value,
                    "id": id
                })
                .to_string(),
                Err(e) => {
                    let code = e
                        .downcast_ref::<SrsError>()
                        .map(|se| se.code())
                        .unwrap_or("internal");
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "error": {
                            "code": -32000,
                            "message": e.to_string(),
                            "data": {"code": code}
                        },
                        "id": id
                    })
                    .to_string()
                }
            }
        }
        Err(e) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32700,
                "message": format!("Parse error: {}", e)
            },
            "id": null
        })
        .to_string(),
    }
}

async fn dispatch_method(
    engine: &SrsEngine,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    match method {
        "srs.register" => {
            let request: RegisterCardRequest = serde_json::from_value(params)?;
            let card = engine.register_card(&request.owner, request.book_id, Utc::now())?;
            Ok(serde_json::to_value(card)?)
        }
        "srs.review" => {
            let request: SubmitReviewRequest = serde_json::from_value(params)?;
            let outcome = engine.submit_review(&request, Utc::now())?;
            Ok(serde_json::to_value(outcome)?)
        }
        "srs.due" => {
            let request: DueQuery = serde_json::from_value(params)?;
            let due = engine.due_cards(&request, Utc::now())?;
            Ok(serde_json::to_value(due)?)
        }
        "srs.stats" => {
            let request: StatisticsRequest = serde_json::from_value(params)?;
            let stats = engine.statistics(
                &request.owner,
                request.window_days,
                request.book_id.as_deref(),
                Utc::now(),
            )?;
            Ok(serde_json::to_value(stats)?)
        }
        "srs.progress" => {
            let request: ProgressRequest = serde_json::from_value(params)?;
            let progress = engine.progress(&request.owner, Utc::now())?;
            Ok(serde_json::to_value(progress)?)
        }
        "health.check" => Ok(serde_json::Value::String("ok".to_string())),
        _ => {
            anyhow::bail!("Method not found: {}", method)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SrsEngine {
        SrsEngine::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_jsonrpc_round_trip() {
        let engine = engine();
        let card = engine
            .register_card("learner-1", None, Utc::now())
            .unwrap();

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "srs.review",
            "params": {
                "card_id": card.id,
                "owner": "learner-1",
                "rating": 3,
                "response_time_ms": 900
            },
            "id": 1
        })
        .to_string();

        let response = handle_jsonrpc_request(&engine, &request).await;
        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["result"]["card"]["repetitions"], 1);
        assert_eq!(parsed["result"]["is_lapse"], false);
    }

    #[tokio::test]
    async fn test_jsonrpc_unknown_method() {
        let response = handle_jsonrpc_request(
            &engine(),
            r#"{"jsonrpc":"2.0","method":"srs.nope","id":2}"#,
        )
        .await;
        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert!(parsed["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Method not found"));
    }

    #[tokio::test]
    async fn test_jsonrpc_parse_error() {
        let response = handle_jsonrpc_request(&engine(), "not json").await;
        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_jsonrpc_carries_stable_error_code() {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "srs.review",
            "params": {
                "card_id": "missing",
                "owner": "learner-1",
                "rating": 3
            },
            "id": 3
        })
        .to_string();

        let response = handle_jsonrpc_request(&engine(), &request).await;
        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["error"]["data"]["code"], "not_found");
    }
}
