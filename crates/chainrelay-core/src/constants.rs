pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Leading hex zeros a proof digest needs.
pub const POW_DIFFICULTY: usize = 4;
/// Candidates scanned per parallel window in `mine::solve_parallel`.
pub const POW_SEARCH_WINDOW: u64 = 1 << 14;
pub const GENESIS_PROOF: u64 = 1;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const MINING_REWARD: f64 = 1.0;
