//! Proof-of-possession challenges over a byte range of a blob body.
//!
//! The challenger picks `from` in the first half and `to` in the second half
//! of the body, so every window covers the midpoint and spans at least a
//! quarter of the file on average. A prover cannot answer without holding
//! the relevant halves.

use rand::Rng;
use thiserror::Error;

use crate::hashes::ProofDigest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("Challenge range {from}..{to} is outside a body of {size} bytes")]
    OutOfRange { from: u64, to: u64, size: u64 },
}

/// Digest of `body[from..to]`.
pub fn challenge(body: &[u8], from: u64, to: u64) -> Result<ProofDigest, ProofError> {
    let size = body.len() as u64;
    if from > to || to > size {
        return Err(ProofError::OutOfRange { from, to, size });
    }

    Ok(ProofDigest::digest(&body[from as usize..to as usize]))
}

/// Draw a challenge window for a body of `size` bytes.
pub fn draw_range<R: Rng + ?Sized>(rng: &mut R, size: u64) -> (u64, u64) {
    let middle = size / 2;
    let from = rng.gen_range(0..=middle);
    let to = rng.gen_range(middle..=size);
    (from, to)
}
