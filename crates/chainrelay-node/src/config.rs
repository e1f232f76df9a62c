use chainrelay_core::constants::{HASH_HEX_SIZE, POW_DIFFICULTY};
use clap::Parser;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "chainrelay-node")]
#[command(about = "Proof-of-work ledger node reconciling with peers by longest valid chain")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Leading hex zeros a proof digest must have
    #[arg(long, default_value_t = POW_DIFFICULTY, value_parser = parse_difficulty)]
    pub difficulty: usize,

    /// Identifier credited with mining rewards (random when omitted)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Peer to register at startup; repeatable
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Per-request timeout when fetching peer chains
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout_secs: u64,

    /// Search proofs on all cores instead of the calling thread
    #[arg(long)]
    pub parallel_pow: bool,
}

impl Args {
    /// The configured node id, or a fresh dashless UUID v4.
    pub fn resolve_node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_difficulty(raw: &str) -> Result<usize, String> {
    let difficulty: usize = raw.parse().map_err(|err| format!("{err}"))?;
    if (1..=HASH_HEX_SIZE).contains(&difficulty) {
        Ok(difficulty)
    } else {
        Err(format!("difficulty must be between 1 and {HASH_HEX_SIZE}"))
    }
}
