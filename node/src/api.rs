//! HTTP API for TALLYBOARD node

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tallyboard_core::{
    BulletinEntry, RunPhase, TallyParams, TallyRecord, TallySnapshot, TallyboardError,
    TimingRecord,
};
use tallyboard_ledger::BulletinBoard;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::runtime::NodeRuntime;

/// API state containing node runtime
pub type ApiState = Arc<NodeRuntime>;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Captured engine output accompanying an engine failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_output: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            engine_output: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            engine_output: None,
        }
    }

    fn from_error(error: &TallyboardError) -> Self {
        Self {
            engine_output: error.engine_output().map(str::to_string),
            ..Self::err(error)
        }
    }
}

/// HTTP status for an error
pub fn error_status(error: &TallyboardError) -> StatusCode {
    match error {
        TallyboardError::Conflict => StatusCode::CONFLICT,
        TallyboardError::Validation(_) => StatusCode::BAD_REQUEST,
        TallyboardError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure<T: Serialize>(error: TallyboardError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = error_status(&error);
    if status.is_server_error() {
        error!("Request failed: {}", error);
    }
    (status, Json(ApiResponse::from_error(&error)))
}

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub voter_id: String,
    #[serde(alias = "h")]
    pub trapdoor_commitment: String,
    /// Accepted for compatibility, not checked
    #[serde(default)]
    pub pk_voter: Option<String>,
    #[serde(default)]
    pub proof: Option<String>,
}

/// Ballot cast request
#[derive(Debug, Deserialize)]
pub struct CastRequest {
    pub voter_id: String,
    #[serde(alias = "h")]
    pub trapdoor_commitment: String,
    #[serde(alias = "enc_vote")]
    pub encrypted_vote: String,
    #[serde(alias = "signed_ballot")]
    pub signature: String,
    #[serde(default)]
    pub proofs: Option<String>,
}

/// Tally request; omitted fields take the configured defaults
#[derive(Debug, Default, Deserialize)]
pub struct TallyRequest {
    pub voter_count: Option<u32>,
    pub teller_count: Option<u32>,
    pub threshold: Option<u32>,
    pub max_vote_value: Option<u32>,
}

impl TallyRequest {
    pub fn into_params(self, defaults: TallyParams) -> TallyParams {
        TallyParams {
            voter_count: self.voter_count.unwrap_or(defaults.voter_count),
            teller_count: self.teller_count.unwrap_or(defaults.teller_count),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            max_vote_value: self.max_vote_value.unwrap_or(defaults.max_vote_value),
        }
    }
}

/// Cast response
#[derive(Serialize)]
pub struct CastResponse {
    pub ballot_id: String,
    pub insertion_index: u64,
}

/// Tally run response
#[derive(Serialize)]
pub struct TallyResponse {
    pub generation: u64,
    pub bulletin_board: Vec<BulletinEntry>,
    pub timings: TimingRecord,
    pub raw_output: String,
    pub placeholder_tally: Vec<TallyRecord>,
}

/// Full snapshot response
#[derive(Serialize)]
pub struct SnapshotResponse {
    pub generation: u64,
    pub params: TallyParams,
    pub bulletin_board: Vec<BulletinEntry>,
    pub timings: TimingRecord,
    pub raw_output: String,
    pub completed_at: u64,
}

impl From<&TallySnapshot> for SnapshotResponse {
    fn from(snapshot: &TallySnapshot) -> Self {
        Self {
            generation: snapshot.generation.0,
            params: snapshot.params,
            bulletin_board: snapshot.bulletin_entries.clone(),
            timings: snapshot.timing.clone(),
            raw_output: snapshot.raw_text.clone(),
            completed_at: snapshot.completed_at.as_millis(),
        }
    }
}

/// Notification response
#[derive(Serialize)]
pub struct NotificationResponse {
    pub voter_id: String,
    pub token: String,
}

/// Node status response
#[derive(Serialize)]
pub struct NodeStatusResponse {
    pub name: String,
    pub running: bool,
    pub run_phase: RunPhase,
    pub last_outcome: Option<RunPhase>,
    pub generation: Option<u64>,
    pub ballot_count: usize,
    pub voter_count: usize,
    pub started_at: u64,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let enable_cors = state.config().api.enable_cors;

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        // Voters and ballots
        .route("/register", post(register))
        .route("/cast", post(cast))
        // Tallying
        .route("/tally", post(tally))
        .route("/tally_results", get(tally_results))
        .route("/timings", get(timings))
        // Bulletin board
        .route("/bb", get(bulletin_board))
        // Notifications
        .route("/notify/:voter_id", get(notify))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let status = runtime.status();
    let response = NodeStatusResponse {
        name: runtime.config().name.clone(),
        running: status.running,
        run_phase: status.run_phase,
        last_outcome: status.last_outcome,
        generation: status.generation,
        ballot_count: status.ballot_count,
        voter_count: status.voter_count,
        started_at: runtime.started_at().as_millis(),
    };

    Json(ApiResponse::ok(response))
}

/// Register a voter
async fn register(
    State(runtime): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    match runtime.register_voter(&req.voter_id, &req.trapdoor_commitment) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!({"status": "ok"}))),
        ),
        Err(e) => failure(e),
    }
}

/// Cast a ballot
async fn cast(State(runtime): State<ApiState>, Json(req): Json<CastRequest>) -> impl IntoResponse {
    match runtime.cast_ballot(
        &req.voter_id,
        &req.trapdoor_commitment,
        &req.encrypted_vote,
        &req.signature,
    ) {
        Ok(receipt) => (
            StatusCode::OK,
            Json(ApiResponse::ok(CastResponse {
                ballot_id: receipt.ballot_id,
                insertion_index: receipt.insertion_index,
            })),
        ),
        Err(e) => failure(e),
    }
}

/// Run the engine. The body is optional.
async fn tally(State(runtime): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TallyRequest::default()
    } else {
        match serde_json::from_slice::<TallyRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return failure::<TallyResponse>(TallyboardError::Validation(format!(
                    "invalid tally request: {}",
                    e
                )))
            }
        }
    };
    let params = request.into_params(runtime.tally_defaults());

    info!("Tally requested: {:?}", params);

    match runtime.run_tally(params).await {
        Ok(outcome) => {
            let snapshot = &outcome.snapshot;
            let response = TallyResponse {
                generation: snapshot.generation.0,
                bulletin_board: snapshot.bulletin_entries.clone(),
                timings: snapshot.timing.clone(),
                raw_output: snapshot.raw_text.clone(),
                placeholder_tally: outcome.placeholder_tally,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response)))
        }
        Err(e) => failure(e),
    }
}

/// Latest full result
async fn tally_results(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.latest_snapshot() {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::ok(SnapshotResponse::from(snapshot.as_ref()))),
        ),
        Err(e) => failure(e),
    }
}

/// Latest timing table
async fn timings(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.latest_timing() {
        Ok(timing) => (StatusCode::OK, Json(ApiResponse::ok(timing))),
        Err(e) => failure(e),
    }
}

/// Bulletin board
async fn bulletin_board(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.bulletin_board() {
        Ok(board) => (StatusCode::OK, Json(ApiResponse::<BulletinBoard>::ok(board))),
        Err(e) => failure(e),
    }
}

/// Notification token for a voter
async fn notify(
    State(runtime): State<ApiState>,
    Path(voter_id): Path<String>,
) -> impl IntoResponse {
    match runtime.get_notification(&voter_id) {
        Ok(token) => (
            StatusCode::OK,
            Json(ApiResponse::ok(NotificationResponse { voter_id, token })),
        ),
        Err(e) => failure(e),
    }
}

/// Start API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    runtime: Arc<NodeRuntime>,
    listen_addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let router = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
