use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod consensus;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod mine;

pub use consensus::{canonical_peer, ChainFetcher, ConsensusCoordinator};
pub use error::{ChainViolation, FetchError, LedgerError, PeerAddressError};
pub use ledger::{Ledger, MiningJob, SharedLedger};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub proof: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hex SHA-256 of the block's canonical JSON form.
    pub fn hash(&self) -> String {
        digest(self)
    }
}

/// Wire shape of a node's chain, as served by `get_chain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }

    /// True when the advertised length matches the blocks actually sent.
    pub fn is_consistent(&self) -> bool {
        self.length == self.chain.len()
    }
}

pub fn digest(block: &Block) -> String {
    let value = serde_json::to_value(block).expect("block fields are plain JSON values");
    sha256_hex(canonical_json(&value).as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compact JSON with object keys sorted at every level, independent of the
/// map implementation backing `Value`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub mod pow {
    use super::sha256_hex;
    use tracing::debug;

    /// Signed decimal form of `proof^2 - previous_proof^2`.
    ///
    /// Squares are taken in `u128`, which holds any `u64` square exactly, and the
    /// sign is rendered separately so negative differences hash as e.g. `"-5"`.
    pub fn proof_operand(proof: u64, previous_proof: u64) -> String {
        let square = u128::from(proof) * u128::from(proof);
        let previous_square = u128::from(previous_proof) * u128::from(previous_proof);
        if square >= previous_square {
            (square - previous_square).to_string()
        } else {
            format!("-{}", previous_square - square)
        }
    }

    pub fn work_digest(proof: u64, previous_proof: u64) -> String {
        sha256_hex(proof_operand(proof, previous_proof).as_bytes())
    }

    pub fn meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
        hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|b| b == b'0')
    }

    pub fn verify(proof: u64, previous_proof: u64, difficulty: usize) -> bool {
        meets_difficulty(&work_digest(proof, previous_proof), difficulty)
    }

    /// Linear search from 1 for the smallest proof accepted against
    /// `previous_proof`. Blocks until a proof is found.
    pub fn solve(previous_proof: u64, difficulty: usize) -> u64 {
        let mut candidate = 1u64;
        while !verify(candidate, previous_proof, difficulty) {
            candidate += 1;
        }
        debug!(previous_proof, proof = candidate, difficulty, "proof found");
        candidate
    }
}

pub mod chain {
    use super::{pow, Block};
    use crate::error::ChainViolation;

    /// Check every block sits at its 1-based position, then walk adjacent pairs
    /// and report the first broken link or failed proof.
    pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainViolation> {
        for (position, block) in chain.iter().enumerate() {
            let expected = position as u64 + 1;
            if block.index != expected {
                return Err(ChainViolation::MisplacedBlock {
                    expected,
                    found: block.index,
                });
            }
        }
        for pair in chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.previous_hash != previous.hash() {
                return Err(ChainViolation::BrokenLink {
                    index: current.index,
                });
            }
            if !pow::verify(current.proof, previous.proof, difficulty) {
                return Err(ChainViolation::InsufficientWork {
                    index: current.index,
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(chain: &[Block], difficulty: usize) -> bool {
        validate_chain(chain, difficulty).is_ok()
    }
}
