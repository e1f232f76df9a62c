use crate::{
    chain,
    error::{FetchError, PeerAddressError},
    ledger::SharedLedger,
    Block, ChainSnapshot,
};
use std::{collections::BTreeSet, future::Future, sync::Arc};
use tokio::{sync::RwLock, task::JoinSet};
use tracing::{debug, info, warn};

/// Capability to pull a peer's chain. The node implements it over HTTP.
pub trait ChainFetcher: Send + Sync + 'static {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainSnapshot, FetchError>> + Send;
}

/// Reduce a peer address to lowercase `host:port`.
///
/// Accepts bare `host:port` as well as URLs; scheme, userinfo, path, query and
/// fragment are dropped.
pub fn canonical_peer(address: &str) -> Result<String, PeerAddressError> {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    if host_port.is_empty() || host_port.starts_with(':') {
        return Err(PeerAddressError::MissingHost(address.to_string()));
    }
    Ok(host_port.to_ascii_lowercase())
}

/// A chain one peer offered during a resolution round.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub peer: String,
    pub snapshot: ChainSnapshot,
}

/// Pick the chain to adopt: strictly longer than `local_length`, consistent
/// with its advertised length, valid, and the longest. Equal-length winners
/// are ordered by tip digest, smallest first.
pub fn select_longest(
    candidates: impl IntoIterator<Item = Candidate>,
    local_length: usize,
    difficulty: usize,
) -> Option<Vec<Block>> {
    candidates
        .into_iter()
        .filter(|candidate| {
            if !candidate.snapshot.is_consistent() {
                warn!(
                    peer = %candidate.peer,
                    advertised = candidate.snapshot.length,
                    actual = candidate.snapshot.chain.len(),
                    "peer length does not match its chain"
                );
                return false;
            }
            candidate.snapshot.chain.len() > local_length
        })
        .filter(
            |candidate| match chain::validate_chain(&candidate.snapshot.chain, difficulty) {
                Ok(()) => true,
                Err(violation) => {
                    warn!(peer = %candidate.peer, %violation, "rejecting peer chain");
                    false
                }
            },
        )
        .map(|candidate| {
            let tip = candidate
                .snapshot
                .chain
                .last()
                .map(Block::hash)
                .unwrap_or_default();
            (candidate.snapshot.chain, tip)
        })
        .fold(None, |best: Option<(Vec<Block>, String)>, (blocks, tip)| match best {
            Some((best_blocks, best_tip))
                if best_blocks.len() > blocks.len()
                    || (best_blocks.len() == blocks.len() && best_tip <= tip) =>
            {
                Some((best_blocks, best_tip))
            }
            _ => Some((blocks, tip)),
        })
        .map(|(blocks, _)| blocks)
}

/// Peer set plus the longest-valid-chain resolution over it.
pub struct ConsensusCoordinator<F> {
    ledger: SharedLedger,
    peers: RwLock<BTreeSet<String>>,
    fetcher: Arc<F>,
}

impl<F: ChainFetcher> ConsensusCoordinator<F> {
    pub fn new(ledger: SharedLedger, fetcher: F) -> Self {
        Self {
            ledger,
            peers: RwLock::new(BTreeSet::new()),
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Register a peer. Returns `false` if it was already known.
    pub async fn add_node(&self, address: &str) -> Result<bool, PeerAddressError> {
        let peer = canonical_peer(address)?;
        let inserted = self.peers.write().await.insert(peer.clone());
        if inserted {
            info!(%peer, "registered peer");
        } else {
            debug!(%peer, "peer already registered");
        }
        Ok(inserted)
    }

    pub async fn peers(&self) -> Vec<String> {
        self.peers.read().await.iter().cloned().collect()
    }

    /// Fetch every peer's chain and adopt the longest valid one that beats the
    /// local chain. Returns whether the local chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let (local_length, difficulty) = {
            let ledger = self.ledger.read().await;
            (ledger.len(), ledger.difficulty())
        };
        let peers = self.peers().await;
        let polled = peers.len();
        let candidates = self.fetch_all(peers).await;
        debug!(polled, answered = candidates.len(), "fetched peer chains");

        let Some(best) = select_longest(candidates, local_length, difficulty) else {
            info!(local_length, "local chain is authoritative");
            return false;
        };

        let mut ledger = self.ledger.write().await;
        // The local chain may have grown while peers were being fetched.
        if best.len() <= ledger.len() {
            info!(
                local_length = ledger.len(),
                candidate = best.len(),
                "local chain caught up during resolution"
            );
            return false;
        }
        let adopted = best.len();
        let replaced = ledger.replace_chain(best);
        if replaced {
            info!(from = local_length, to = adopted, "replaced local chain");
        }
        replaced
    }

    async fn fetch_all(&self, peers: Vec<String>) -> Vec<Candidate> {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move {
                let fetched = fetcher.fetch_chain(&peer).await;
                (peer, fetched)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(snapshot))) => candidates.push(Candidate { peer, snapshot }),
                Ok((peer, Err(err))) => warn!(%peer, error = %err, "skipping peer"),
                Err(err) => warn!(error = %err, "peer fetch task failed"),
            }
        }
        candidates
    }
}
