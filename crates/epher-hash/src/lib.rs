//! Typed cryptographic digests.
//!
//! A [`Sum`] is the primary key of every object the store ever holds: a
//! `(HashType, digest bytes)` pair. Two sums are equal iff both fields match.

use digest::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The hash algorithms this crate can produce a [`Sum`] with.
///
/// Tag values are part of the wire format (`epher-codec`) and MUST NOT
/// change: `Blake2b512 = 1`, `Sha1 = 2`, `Sha3 = 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum HashType {
    Blake2b512 = 1,
    Sha1 = 2,
    Sha3 = 3,
}

impl HashType {
    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn from_tag(tag: u16) -> Result<Self, HashError> {
        match tag {
            1 => Ok(HashType::Blake2b512),
            2 => Ok(HashType::Sha1),
            3 => Ok(HashType::Sha3),
            other => Err(HashError::UnknownType(other)),
        }
    }

    /// Digest length in bytes for this hash type.
    pub fn digest_len(self) -> usize {
        match self {
            HashType::Blake2b512 => 64,
            HashType::Sha1 => 20,
            HashType::Sha3 => 64,
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashType::Blake2b512 => "blake2b512",
            HashType::Sha1 => "sha1",
            HashType::Sha3 => "sha3-512",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unknown hash type tag {0}")]
    UnknownType(u16),
    #[error("digest length {got} does not match {hash_type} (want {want})")]
    WrongLength {
        hash_type: HashType,
        want: usize,
        got: usize,
    },
}

/// A `(hash-type, digest)` pair naming a blob or a merkle node.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sum {
    hash_type: HashType,
    digest: Vec<u8>,
}

impl Sum {
    /// Builds a `Sum` from raw digest bytes, validating the length against
    /// `hash_type`. Used when decoding a `Sum` read from an untrusted source
    /// (wire, foreign store).
    pub fn new(hash_type: HashType, digest: Vec<u8>) -> Result<Self, HashError> {
        let want = hash_type.digest_len();
        if digest.len() != want {
            return Err(HashError::WrongLength {
                hash_type,
                want,
                got: digest.len(),
            });
        }
        Ok(Self { hash_type, digest })
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn into_digest(self) -> Vec<u8> {
        self.digest
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl fmt::Debug for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sum({}:{})", self.hash_type, self.to_hex())
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_type, self.to_hex())
    }
}

/// Incremental, typed hasher. Wraps one of three concrete RustCrypto
/// digests behind a single enum since each produces a different output
/// size and therefore a different concrete type.
pub enum Hasher {
    Blake2b512(blake2::Blake2b512),
    Sha1(sha1::Sha1),
    Sha3(sha3::Sha3_512),
}

impl Hasher {
    pub fn new(hash_type: HashType) -> Self {
        match hash_type {
            HashType::Blake2b512 => Hasher::Blake2b512(blake2::Blake2b512::new()),
            HashType::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            HashType::Sha3 => Hasher::Sha3(sha3::Sha3_512::new()),
        }
    }

    pub fn hash_type(&self) -> HashType {
        match self {
            Hasher::Blake2b512(_) => HashType::Blake2b512,
            Hasher::Sha1(_) => HashType::Sha1,
            Hasher::Sha3(_) => HashType::Sha3,
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        match self {
            Hasher::Blake2b512(h) => Digest::update(h, data),
            Hasher::Sha1(h) => Digest::update(h, data),
            Hasher::Sha3(h) => Digest::update(h, data),
        }
    }

    pub fn finalize(self) -> Sum {
        let hash_type = self.hash_type();
        let digest = match self {
            Hasher::Blake2b512(h) => h.finalize().to_vec(),
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Sha3(h) => h.finalize().to_vec(),
        };
        Sum { hash_type, digest }
    }
}

/// Hashes a single byte slice in one call.
pub fn sum(hash_type: HashType, data: &[u8]) -> Sum {
    let mut h = Hasher::new(hash_type);
    h.write(data);
    h.finalize()
}

/// Hashes the concatenation of two digests under `hash_type` — the
/// operation used to combine two children's sums into a branch's sum.
pub fn sum_concat(hash_type: HashType, left: &[u8], right: &[u8]) -> Sum {
    let mut h = Hasher::new(hash_type);
    h.write(left);
    h.write(right);
    h.finalize()
}
