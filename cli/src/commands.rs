//! CLI Commands

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tallyboard_core::{
    Ballot, BulletinEntry, RunPhase, TallyParams, TallyRecord, TimingRecord,
};
use thiserror::Error;

/// Timeout for ordinary requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API Client for interacting with a TALLYBOARD node
pub struct ApiClient {
    base_url: String,
    client: Client,
    tally_timeout: Duration,
}

impl ApiClient {
    /// `tally_timeout` bounds the `/tally` request, which lasts as long as
    /// the engine does
    pub fn new(base_url: &str, tally_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/');
        Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            base_url: base_url.to_string(),
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            tally_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get node status
    pub async fn status(&self) -> Result<NodeStatus, ApiError> {
        self.send(self.client.get(self.url("/status"))).await
    }

    /// Register a voter's trapdoor commitment
    pub async fn register(&self, voter_id: &str, commitment: &str) -> Result<(), ApiError> {
        let req = RegisterRequest {
            voter_id,
            trapdoor_commitment: commitment,
        };
        self.send::<serde_json::Value>(self.client.post(self.url("/register")).json(&req))
            .await?;
        Ok(())
    }

    /// Cast a ballot
    pub async fn cast(&self, req: &CastRequest) -> Result<CastReceipt, ApiError> {
        self.send(self.client.post(self.url("/cast")).json(req)).await
    }

    /// Run a tally. Fields left as `None` take the node's defaults.
    pub async fn tally(&self, req: &TallyRequest) -> Result<TallyResult, ApiError> {
        self.send(
            self.client
                .post(self.url("/tally"))
                .timeout(self.tally_timeout)
                .json(req),
        )
        .await
    }

    /// Get the bulletin board
    pub async fn bulletin_board(&self) -> Result<BoardView, ApiError> {
        self.send(self.client.get(self.url("/bb"))).await
    }

    /// Get the latest tally results
    pub async fn results(&self) -> Result<TallyResults, ApiError> {
        self.send(self.client.get(self.url("/tally_results"))).await
    }

    /// Get a voter's notification token
    pub async fn notify(&self, voter_id: &str) -> Result<Notification, ApiError> {
        let mut url = Url::parse(&self.url("/notify"))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .push(voter_id);

        self.send(self.client.get(url)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|_| ApiError::Server {
            status: status.as_u16(),
            message: body.trim().to_string(),
            engine_output: None,
        })?;

        if parsed.success {
            parsed.data.ok_or(ApiError::EmptyResponse)
        } else {
            Err(ApiError::Server {
                status: status.as_u16(),
                message: parsed.error.unwrap_or_default(),
                engine_output: parsed.engine_output,
            })
        }
    }
}

/// API response wrapper
#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    #[serde(default)]
    engine_output: Option<String>,
}

/// Node status
#[derive(Debug, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub running: bool,
    pub run_phase: RunPhase,
    pub last_outcome: Option<RunPhase>,
    pub generation: Option<u64>,
    pub ballot_count: usize,
    pub voter_count: usize,
    pub started_at: u64,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    voter_id: &'a str,
    trapdoor_commitment: &'a str,
}

/// Ballot cast request
#[derive(Debug, Serialize)]
pub struct CastRequest {
    pub voter_id: String,
    pub trapdoor_commitment: String,
    pub encrypted_vote: String,
    pub signature: String,
}

/// Cast receipt
#[derive(Debug, Deserialize)]
pub struct CastReceipt {
    pub ballot_id: String,
    pub insertion_index: u64,
}

/// Tally request
#[derive(Debug, Default, Serialize)]
pub struct TallyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teller_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vote_value: Option<u32>,
}

/// Result of a tally run
#[derive(Debug, Deserialize)]
pub struct TallyResult {
    pub generation: u64,
    pub bulletin_board: Vec<BulletinEntry>,
    pub timings: TimingRecord,
    pub raw_output: String,
    pub placeholder_tally: Vec<TallyRecord>,
}

/// Latest published results
#[derive(Debug, Deserialize)]
pub struct TallyResults {
    pub generation: u64,
    pub params: TallyParams,
    pub bulletin_board: Vec<BulletinEntry>,
    pub timings: TimingRecord,
    pub raw_output: String,
    pub completed_at: u64,
}

/// Bulletin board as served by the node
#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BoardView {
    Engine {
        generation: u64,
        entries: Vec<BulletinEntry>,
    },
    Cast {
        ballots: Vec<Ballot>,
    },
}

/// Notification token
#[derive(Debug, Deserialize)]
pub struct Notification {
    pub voter_id: String,
    pub token: String,
}

/// API Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Server {
        status: u16,
        message: String,
        engine_output: Option<String>,
    },

    #[error("Empty response")]
    EmptyResponse,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status of a server-side failure
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tallyboard_core::NodeConfig;
    use tallyboard_node::{create_router, NodeRuntime};

    async fn serve(config: NodeConfig) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = create_router(Arc::new(NodeRuntime::new(config)));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        ApiClient::new(&format!("http://{}/", addr), Duration::from_secs(30)).unwrap()
    }

    fn cast_request(voter_id: &str) -> CastRequest {
        CastRequest {
            voter_id: voter_id.to_string(),
            trapdoor_commitment: "hash".to_string(),
            encrypted_vote: "enc".to_string(),
            signature: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_cast_and_read_board() {
        let client = serve(NodeConfig::default()).await;

        client.register("voter1", "hash").await.unwrap();
        let receipt = client.cast(&cast_request("voter1")).await.unwrap();
        assert_eq!(receipt.insertion_index, 0);

        match client.bulletin_board().await.unwrap() {
            BoardView::Cast { ballots } => {
                assert_eq!(ballots.len(), 1);
                assert_eq!(ballots[0].id.to_string(), receipt.ballot_id);
            }
            other => panic!("expected cast ballots, got {other:?}"),
        }

        let status = client.status().await.unwrap();
        assert_eq!(status.ballot_count, 1);
        assert_eq!(status.voter_count, 1);
        assert_eq!(status.run_phase, RunPhase::Idle);
    }

    #[tokio::test]
    async fn test_not_found_is_reported() {
        let client = serve(NodeConfig::default()).await;

        let err = client.notify("nobody").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(client.results().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_tally_rejected() {
        let client = serve(NodeConfig::default()).await;

        let err = client
            .tally(&TallyRequest {
                teller_count: Some(2),
                threshold: Some(5),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    /// Node whose engine is a shell script printing a fixed transcript
    #[cfg(unix)]
    fn scripted_config() -> NodeConfig {
        let script = "cat <<'EOF'
+-------+---------------+
| Setup | Voting (avg.) |
+=======+===============+
| 0.5   | 1.5           |
+-------+---------------+
+-----------------------------+--------+
| Vote                        | Commit |
+=============================+========+
| {'x': 1, 'curve': 'P-256'}  | aa11   |
+-----------------------------+--------+
EOF";
        let mut config = NodeConfig::default();
        config.engine.program = "/bin/sh".to_string();
        config.engine.args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        config
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            ApiClient::new("not a url", REQUEST_TIMEOUT),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_notify_encodes_reserved_characters() {
        let client = serve(scripted_config()).await;

        for voter_id in ["alice", "alice#2", "bob/x?y=1"] {
            client.register(voter_id, "hash").await.unwrap();
        }
        client.cast(&cast_request("alice")).await.unwrap();
        client.cast(&cast_request("bob/x?y=1")).await.unwrap();
        client.tally(&TallyRequest::default()).await.unwrap();

        let alice = client.notify("alice").await.unwrap();

        // Registered without a ballot, so it must not resolve to alice
        let err = client.notify("alice#2").await.unwrap_err();
        assert_eq!(err.status(), Some(404));

        let bob = client.notify("bob/x?y=1").await.unwrap();
        assert_eq!(bob.voter_id, "bob/x?y=1");
        assert_ne!(bob.token, alice.token);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tally_against_scripted_engine() {
        let client = serve(scripted_config()).await;

        client.register("voter1", "hash").await.unwrap();
        client.cast(&cast_request("voter1")).await.unwrap();

        let result = client.tally(&TallyRequest::default()).await.unwrap();
        assert_eq!(result.generation, 1);
        assert_eq!(result.bulletin_board.len(), 1);
        assert_eq!(result.bulletin_board[0].commitment_text, "aa11");
        assert_eq!(result.timings.len(), 2);
        assert_eq!(result.placeholder_tally.len(), 1);

        let results = client.results().await.unwrap();
        assert_eq!(results.generation, 1);
        assert_eq!(results.params, TallyParams::default());

        let notification = client.notify("voter1").await.unwrap();
        assert!(notification.token.starts_with("g_r_"));

        match client.bulletin_board().await.unwrap() {
            BoardView::Engine { generation, entries } => {
                assert_eq!(generation, 1);
                assert_eq!(entries[0].vote_text, "{'x': 1, 'curve': 'P-256'}");
            }
            other => panic!("expected engine entries, got {other:?}"),
        }
    }
}
