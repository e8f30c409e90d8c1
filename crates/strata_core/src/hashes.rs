use std::fmt::{self, Display, Formatter};
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Content address of a stored blob.
pub type BlobHash = TypedHash<private::BlobHashType>;
/// Digest returned for a proof-of-possession challenge.
pub type ProofDigest = TypedHash<private::ProofDigestType>;

type Hash32 = [u8; 32];

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hash length, expected 64 characters")]
    InvalidStringLength,

    #[error("Invalid hash length, expected 32 bytes")]
    InvalidVecLength,

    #[error("Invalid hex string: {0}")]
    InvalidHexString(#[from] hex::FromHexError),
}

pub enum HashTypeName {
    BlobHash,
    ProofDigest,
}

pub trait HashType: Clone + Copy + PartialEq + Eq + Hash {
    const TYPE_NAME: HashTypeName;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TypedHash<T: HashType> {
    bytes: Hash32,
    _hash_type: PhantomData<T>,
}

impl<T: HashType> TypedHash<T> {
    /// Create a new 32-byte hash.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self {
            bytes,
            _hash_type: PhantomData,
        }
    }

    /// Hash arbitrary data with blake3.
    pub fn digest(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Get the hash type.
    pub fn type_name(&self) -> HashTypeName {
        T::TYPE_NAME
    }

    /// Lower-case hex rendering, as used on the wire and in the database.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl<T: HashType> From<blake3::Hash> for TypedHash<T> {
    fn from(value: blake3::Hash) -> Self {
        Self::new(*value.as_bytes())
    }
}

impl<T> Display for TypedHash<T>
where
    T: HashType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl<T> FromStr for TypedHash<T>
where
    T: HashType,
{
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 64 {
            return Err(HashError::InvalidStringLength);
        }

        let bytes = hex::decode(value)?;
        Self::try_from(bytes)
    }
}

impl<T> TryFrom<String> for TypedHash<T>
where
    T: HashType,
{
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl<T> TryFrom<Vec<u8>> for TypedHash<T>
where
    T: HashType,
{
    type Error = HashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() != 32 {
            Err(HashError::InvalidVecLength)
        } else {
            let mut hash = Hash32::default();
            hash.copy_from_slice(&value);
            Ok(Self::new(hash))
        }
    }
}

impl<T> AsRef<[u8]> for TypedHash<T>
where
    T: HashType,
{
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// Hashes travel as hex strings in JSON bodies and URL paths.
impl<T: HashType> Serialize for TypedHash<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, T: HashType> Deserialize<'de> for TypedHash<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

mod private {
    use super::{HashType, HashTypeName};

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
    pub struct BlobHashType;
    impl HashType for BlobHashType {
        const TYPE_NAME: HashTypeName = HashTypeName::BlobHash;
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
    pub struct ProofDigestType;
    impl HashType for ProofDigestType {
        const TYPE_NAME: HashTypeName = HashTypeName::ProofDigest;
    }
}
