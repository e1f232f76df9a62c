use crate::{constants::POW_SEARCH_WINDOW, pow::verify};
use rayon::prelude::*;
use tracing::info;

/// Same result as `pow::solve`, searched on the rayon pool.
pub fn solve_parallel(previous_proof: u64, difficulty: usize) -> u64 {
    let proof = solve_in_windows(previous_proof, difficulty, POW_SEARCH_WINDOW);
    info!(previous_proof, proof, difficulty, "proof found in parallel search");
    proof
}

/// Candidates are scanned in consecutive windows; `find_first` keeps the lowest
/// accepting candidate of a window, so the first window that has one yields
/// the smallest proof overall.
fn solve_in_windows(previous_proof: u64, difficulty: usize, window: u64) -> u64 {
    let mut start = 1u64;
    loop {
        let end = start.saturating_add(window);
        let found = (start..end)
            .into_par_iter()
            .find_first(|candidate| verify(*candidate, previous_proof, difficulty));
        if let Some(proof) = found {
            return proof;
        }
        start = end;
    }
}
