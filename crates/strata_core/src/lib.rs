pub mod address;
pub mod constants;
pub mod crypto;
pub mod hashes;
pub mod models;
pub mod proof;

pub use address::{Address, Endpoint};
pub use hashes::{BlobHash, ProofDigest};
