use thiserror::Error;

/// Why a candidate chain was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("block {index} does not link to the digest of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} carries a proof that fails the work predicate")]
    InsufficientWork { index: u64 },
    #[error("block at position {expected} is labelled {found}")]
    MisplacedBlock { expected: u64, found: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("chain tip moved away from block {expected} while mining")]
    StaleTip { expected: u64 },
    #[error("proof {proof} does not satisfy the work predicate")]
    InvalidProof { proof: u64 },
}

/// Per-peer failure while fetching a chain. Consensus skips the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer answered with status {0}")]
    Status(u16),
    #[error("peer sent a malformed chain: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerAddressError {
    #[error("peer address `{0}` has no host")]
    MissingHost(String),
}
