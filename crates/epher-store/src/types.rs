use epher_hash::Sum;
use std::fmt;

/// A branch record persisted in a store to describe Merkle tree structure.
///
/// `sum` must equal `H(start.digest ‖ end.digest)` under `sum`'s hash type;
/// `start`/`end`/`sum` must all share the same [`HashType`](epher_hash::HashType).
/// Leaves have no `Node` — the blob itself is the storage.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Node {
    pub sum: Sum,
    pub start: Sum,
    pub end: Sum,
}

/// Derived metadata about a stored blob.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlobInfo {
    pub sum: Sum,
    pub size: i64,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node{{sum={}, start={}, end={}}}", self.sum, self.start, self.end)
    }
}
