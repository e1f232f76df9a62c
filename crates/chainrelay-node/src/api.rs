//! HTTP surface of the node.

use crate::fetcher::HttpChainFetcher;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chainrelay_core::{
    canonical_peer, constants::MINING_REWARD, mine::solve_parallel, pow, Block, ChainSnapshot,
    ConsensusCoordinator, LedgerError, PeerAddressError, SharedLedger, Transaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    pub ledger: SharedLedger,
    pub coordinator: Arc<ConsensusCoordinator<HttpChainFetcher>>,
    pub node_id: String,
    pub parallel_pow: bool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Some elements of the transaction are missing: {0}")]
    MalformedRequest(String),
    #[error("No node addresses were supplied")]
    EmptyPeerList,
    #[error(transparent)]
    InvalidPeerAddress(#[from] PeerAddressError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MalformedRequest(_)
            | ApiError::EmptyPeerList
            | ApiError::InvalidPeerAddress(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize, Deserialize)]
pub struct MinedBlock {
    pub message: String,
    #[serde(flatten)]
    pub block: Block,
}

#[derive(Serialize, Deserialize)]
pub struct Validity {
    pub message: String,
    pub valid: bool,
}

/// Every field is optional so a missing one is reported as a client error
/// instead of a generic extractor rejection.
#[derive(Deserialize)]
struct TxIn {
    sender: Option<String>,
    receiver: Option<String>,
    amount: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct TxReceipt {
    pub message: String,
    pub index: u64,
}

#[derive(Deserialize)]
struct ConnectIn {
    nodes: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
pub struct Connected {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Replacement {
    pub message: String,
    pub replaced: bool,
    pub chain: Vec<Block>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/mine_block", get(mine_block))
        .route("/get_chain", get(get_chain))
        .route("/is_valid", get(is_valid))
        .route("/add_transaction", post(add_transaction))
        .route("/connect_nodes", post(connect_nodes))
        .route("/replace_chain", get(replace_chain))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn mine_block(State(state): State<AppState>) -> Result<Json<MinedBlock>, ApiError> {
    let block = mine_next(&state).await?;
    Ok(Json(MinedBlock {
        message: "Congratulations you just mined a block!".to_string(),
        block,
    }))
}

/// Search off the async runtime, then commit under the write lock. A job whose
/// tip moved meanwhile is redone against the new tip.
async fn mine_next(state: &AppState) -> Result<Block, ApiError> {
    loop {
        let job = state.ledger.read().await.mining_job();
        let search = job.clone();
        let parallel = state.parallel_pow;
        let proof = tokio::task::spawn_blocking(move || {
            if parallel {
                solve_parallel(search.previous_proof, search.difficulty)
            } else {
                pow::solve(search.previous_proof, search.difficulty)
            }
        })
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

        let reward = Transaction::new(state.node_id.clone(), state.node_id.clone(), MINING_REWARD);
        let committed = state.ledger.write().await.commit_mined(&job, proof, Some(reward));
        match committed {
            Ok(block) => {
                info!(
                    index = block.index,
                    proof = block.proof,
                    txs = block.transactions.len(),
                    "mined block"
                );
                return Ok(block);
            }
            Err(LedgerError::StaleTip { expected }) => {
                debug!(expected, "chain tip moved during proof search, retrying");
            }
            Err(err) => return Err(ApiError::Internal(err.to_string())),
        }
    }
}

async fn get_chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    Json(state.ledger.read().await.snapshot())
}

async fn is_valid(State(state): State<AppState>) -> Json<Validity> {
    let valid = state.ledger.read().await.is_valid();
    let message = if valid {
        "The blockchain is valid."
    } else {
        "The blockchain is invalid."
    };
    Json(Validity {
        message: message.to_string(),
        valid,
    })
}

async fn add_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TxIn>, JsonRejection>,
) -> Result<(StatusCode, Json<TxReceipt>), ApiError> {
    let Json(tx) = payload.map_err(|rejection| ApiError::MalformedRequest(rejection.body_text()))?;
    let (Some(sender), Some(receiver), Some(amount)) = (tx.sender, tx.receiver, tx.amount) else {
        return Err(ApiError::MalformedRequest(
            "sender, receiver and amount are required".to_string(),
        ));
    };
    let index = state
        .ledger
        .write()
        .await
        .add_transaction(sender, receiver, amount);
    debug!(index, "queued transaction");
    Ok((
        StatusCode::CREATED,
        Json(TxReceipt {
            message: format!("This transaction will be added to Block {index}"),
            index,
        }),
    ))
}

async fn connect_nodes(
    State(state): State<AppState>,
    payload: Result<Json<ConnectIn>, JsonRejection>,
) -> Result<(StatusCode, Json<Connected>), ApiError> {
    let nodes = payload
        .ok()
        .and_then(|Json(body)| body.nodes)
        .filter(|nodes| !nodes.is_empty())
        .ok_or(ApiError::EmptyPeerList)?;
    // Reject the whole request before registering anything.
    for node in &nodes {
        canonical_peer(node)?;
    }
    for node in &nodes {
        state.coordinator.add_node(node).await?;
    }
    Ok((
        StatusCode::CREATED,
        Json(Connected {
            message: "All the nodes are now connected. The chain now contains the following nodes:"
                .to_string(),
            total_nodes: state.coordinator.peers().await,
        }),
    ))
}

async fn replace_chain(State(state): State<AppState>) -> Json<Replacement> {
    let replaced = state.coordinator.resolve_conflicts().await;
    let message = if replaced {
        "The nodes had different chains so the chain was replaced by the longest one."
    } else {
        "All good, the chain is the largest one."
    };
    let chain = state.ledger.read().await.chain().to_vec();
    Json(Replacement {
        message: message.to_string(),
        replaced,
        chain,
    })
}
