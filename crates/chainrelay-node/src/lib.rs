pub mod api;
pub mod config;
pub mod fetcher;

use anyhow::Result;
use api::AppState;
use chainrelay_core::{ConsensusCoordinator, Ledger};
use config::Args;
use fetcher::HttpChainFetcher;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

/// Build the node state from parsed arguments and register startup peers.
pub async fn build_state(args: &Args) -> Result<AppState> {
    let fetcher = HttpChainFetcher::new(args.fetch_timeout())?;
    let coordinator = Arc::new(ConsensusCoordinator::new(
        Arc::new(RwLock::new(Ledger::with_difficulty(args.difficulty))),
        fetcher,
    ));
    for peer in &args.peers {
        coordinator.add_node(peer).await?;
    }
    let node_id = args.resolve_node_id();
    info!(%node_id, difficulty = args.difficulty, peers = args.peers.len(), "node state ready");
    Ok(AppState {
        ledger: coordinator.ledger().clone(),
        coordinator,
        node_id,
        parallel_pow: args.parallel_pow,
    })
}

/// Serve the API on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = api::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
