//! Builds and retrieves a balanced binary Merkle tree over the blobs of a
//! chunked byte stream, verifying hashes on every read.
//!
//! A tree of `n >= 2` leaves splits at `n / 2`: the left half becomes one
//! subtree, the right half another, and the two subtrees' sums are combined
//! with [`epher_hash::sum_concat`] into a branch [`Node`] that gets
//! persisted. A single leaf (`n == 1`) has no node at all — its sum *is*
//! the subtree's root, and the blob is the only thing ever read back.

use async_recursion::async_recursion;
use epher_hash::{sum, sum_concat, HashType, Sum};
use epher_store::{Node, Store};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::instrument;

#[derive(Debug, Error)]
pub enum MerkleError {
    /// A branch node has exactly one child recorded — the original tree
    /// builder's dead "odd size collapse" case, kept here as a guard
    /// against a store returning a corrupt node shape.
    #[error("tree rooted at {0} is malformed: a branch must have both children or neither")]
    MalformedTree(Sum),

    #[error("leaf {sum} hashed to an unexpected digest")]
    HashMismatch { sum: Sum },

    #[error("no blob or info found for {sum}")]
    DataMissing { sum: Sum },

    #[error(transparent)]
    Store(#[from] epher_store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// Build-time parameters: the hash algorithm blobs and nodes are hashed
/// with, and the chunk size a byte stream is sliced into.
#[derive(Debug, Clone, Copy)]
pub struct MerkleOptions {
    pub hash_type: HashType,
    pub blob_size: i64,
}

impl Default for MerkleOptions {
    fn default() -> Self {
        Self {
            hash_type: HashType::Blake2b512,
            blob_size: 4 << 20,
        }
    }
}

impl MerkleOptions {
    pub fn with_blob_size(mut self, blob_size: i64) -> Self {
        self.blob_size = blob_size;
        self
    }

    pub fn with_hash_type(mut self, hash_type: HashType) -> Self {
        self.hash_type = hash_type;
        self
    }
}

/// An in-memory view of a Merkle tree. Leaves carry no children; every
/// branch's `size_byte` is the sum of its children's.
#[derive(Debug, Clone)]
pub struct Tree {
    pub left: Option<Box<Tree>>,
    pub right: Option<Box<Tree>>,
    pub size_byte: i64,
    pub hash_sum: Sum,
}

impl Tree {
    fn leaf(hash_sum: Sum, size_byte: i64) -> Self {
        Self {
            left: None,
            right: None,
            size_byte,
            hash_sum,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Enforces the both-children-or-neither invariant across the whole
    /// subtree, without touching the store.
    pub fn walk(&self) -> MerkleResult<()> {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => {
                l.walk()?;
                r.walk()
            }
            (None, None) => Ok(()),
            _ => Err(MerkleError::MalformedTree(self.hash_sum.clone())),
        }
    }
}

/// Why a node's stored representation didn't match what the tree expected
/// of it, surfaced by [`retrieve`] alongside the bytes it still managed to
/// write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    HashMismatch,
    DataMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNode {
    pub sum: Sum,
    pub reason: InvalidReason,
}

/// Reads `reader` in chunks of at most `opts.blob_size`, hashing and
/// storing each as a blob, then builds and persists the balanced tree over
/// their sums. Returns `None` for an empty stream — there is no tree over
/// zero blobs.
#[instrument(skip(reader, store))]
pub async fn build<R>(
    mut reader: R,
    store: &Arc<dyn Store>,
    opts: MerkleOptions,
) -> MerkleResult<Option<(Tree, Sum)>>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = opts.blob_size.max(1) as usize;
    let mut buf = vec![0u8; chunk_size];
    let mut infos: Vec<(Sum, i64)> = Vec::new();

    loop {
        let filled = read_chunk(&mut reader, &mut buf).await?;
        if filled == 0 {
            break;
        }
        let chunk = &buf[..filled];
        let leaf_sum = sum(opts.hash_type, chunk);
        store.put_blob(leaf_sum.clone(), chunk.to_vec()).await?;
        infos.push((leaf_sum, filled as i64));
    }

    if infos.is_empty() {
        return Ok(None);
    }

    let tree = build_subtree(store, opts.hash_type, &infos).await?;
    let root = tree.hash_sum.clone();
    Ok(Some((tree, root)))
}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[async_recursion]
async fn build_subtree(
    store: &Arc<dyn Store>,
    hash_type: HashType,
    infos: &[(Sum, i64)],
) -> MerkleResult<Tree> {
    if infos.len() == 1 {
        let (leaf_sum, size) = infos[0].clone();
        return Ok(Tree::leaf(leaf_sum, size));
    }

    let mid = infos.len() / 2;
    let left = build_subtree(store, hash_type, &infos[..mid]).await?;
    let right = build_subtree(store, hash_type, &infos[mid..]).await?;

    let hash_sum = sum_concat(hash_type, left.hash_sum.digest(), right.hash_sum.digest());
    let size_byte = left.size_byte + right.size_byte;
    store
        .put_node(Node {
            sum: hash_sum.clone(),
            start: left.hash_sum.clone(),
            end: right.hash_sum.clone(),
        })
        .await?;

    Ok(Tree {
        left: Some(Box::new(left)),
        right: Some(Box::new(right)),
        size_byte,
        hash_sum,
    })
}

/// Reconstructs the [`Tree`] shape rooted at `root`, following stored
/// [`Node`]s until a sum with no node — a leaf — is reached, and populating
/// `size_byte` along the way (branches sum their children's; leaves ask
/// `info_blob`).
#[instrument(skip(store))]
#[async_recursion]
pub async fn retrieve_tree(store: &Arc<dyn Store>, root: &Sum) -> MerkleResult<Tree> {
    match store.get_node(root).await? {
        Some(node) => {
            let left = retrieve_tree(store, &node.start).await?;
            let right = retrieve_tree(store, &node.end).await?;
            Ok(Tree {
                size_byte: left.size_byte + right.size_byte,
                left: Some(Box::new(left)),
                right: Some(Box::new(right)),
                hash_sum: root.clone(),
            })
        }
        None => {
            let info = store
                .info_blob(root)
                .await?
                .ok_or_else(|| MerkleError::DataMissing { sum: root.clone() })?;
            Ok(Tree::leaf(root.clone(), info.size))
        }
    }
}

/// Materializes `tree`'s bytes into `writer`, post-order, verifying every
/// node as it goes. Always returns the `invalid` list it accumulated,
/// alongside `Ok(())` if every node checked out or the first `Err` that
/// stopped the walk.
pub async fn retrieve<W>(
    tree: &Tree,
    writer: &mut W,
    store: &Arc<dyn Store>,
) -> (MerkleResult<()>, Vec<InvalidNode>)
where
    W: AsyncWrite + Unpin,
{
    let mut invalid = Vec::new();
    let result = retrieve_into(tree, writer, store, &mut invalid).await;
    (result, invalid)
}

#[async_recursion]
async fn retrieve_into<W>(
    tree: &Tree,
    writer: &mut W,
    store: &Arc<dyn Store>,
    invalid: &mut Vec<InvalidNode>,
) -> MerkleResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    match (&tree.left, &tree.right) {
        (Some(left), Some(right)) => {
            retrieve_into(left, writer, store, invalid).await?;
            retrieve_into(right, writer, store, invalid).await?;

            let expect = sum_concat(
                tree.hash_sum.hash_type(),
                left.hash_sum.digest(),
                right.hash_sum.digest(),
            );
            if expect != tree.hash_sum {
                invalid.push(InvalidNode {
                    sum: tree.hash_sum.clone(),
                    reason: InvalidReason::HashMismatch,
                });
            }
            Ok(())
        }
        (None, None) => match store.get_blob(&tree.hash_sum).await? {
            None => {
                invalid.push(InvalidNode {
                    sum: tree.hash_sum.clone(),
                    reason: InvalidReason::DataMissing,
                });
                Err(MerkleError::DataMissing {
                    sum: tree.hash_sum.clone(),
                })
            }
            Some(data) => {
                writer.write_all(&data).await?;
                let got = sum(tree.hash_sum.hash_type(), &data);
                if got != tree.hash_sum {
                    invalid.push(InvalidNode {
                        sum: tree.hash_sum.clone(),
                        reason: InvalidReason::HashMismatch,
                    });
                    return Err(MerkleError::HashMismatch {
                        sum: tree.hash_sum.clone(),
                    });
                }
                Ok(())
            }
        },
        _ => Err(MerkleError::MalformedTree(tree.hash_sum.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epher_store::MemoryStore;
    use std::io::Cursor;

    async fn collect(tree: &Tree, store: &Arc<dyn Store>) -> (MerkleResult<()>, Vec<u8>, Vec<InvalidNode>) {
        let mut out = Vec::new();
        let (result, invalid) = retrieve(tree, &mut out, store).await;
        (result, out, invalid)
    }

    #[tokio::test]
    async fn nine_single_byte_blobs_builds_balanced_tree() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default()
            .with_hash_type(HashType::Blake2b512)
            .with_blob_size(1);
        let (tree, root) = build(Cursor::new(b"123456789"), &store, opts)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tree.size_byte, 9);
        assert_eq!(tree.hash_sum, root);

        let (result, data, invalid) = collect(&tree, &store).await;
        result.unwrap();
        assert_eq!(data, b"123456789");
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn ten_bytes_at_blob_size_four_splits_three_ways() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default().with_blob_size(4);
        let (tree, _root) = build(Cursor::new(b"abcdefghij"), &store, opts)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tree.size_byte, 10);

        let (result, data, invalid) = collect(&tree, &store).await;
        result.unwrap();
        assert_eq!(data, b"abcdefghij");
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn empty_input_builds_no_tree() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let got = build(Cursor::new(b""), &store, MerkleOptions::default())
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn deterministic_root_across_builds() {
        let store_a: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let store_b: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default().with_blob_size(3);
        let (_tree_a, root_a) = build(Cursor::new(b"hello world"), &store_a, opts)
            .await
            .unwrap()
            .unwrap();
        let (_tree_b, root_b) = build(Cursor::new(b"hello world"), &store_b, opts)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root_a, root_b);
    }

    #[tokio::test]
    async fn cross_store_retrieval_via_retrieve_tree() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default().with_blob_size(4);
        let (_tree, root) = build(Cursor::new(b"the quick brown fox"), &store, opts)
            .await
            .unwrap()
            .unwrap();

        let retrieved = retrieve_tree(&store, &root).await.unwrap();
        retrieved.walk().unwrap();
        let (result, data, invalid) = collect(&retrieved, &store).await;
        result.unwrap();
        assert_eq!(data, b"the quick brown fox");
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn tampered_leaf_is_reported_invalid() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default().with_blob_size(4);
        let (tree, _root) = build(Cursor::new(b"tamper me please"), &store, opts)
            .await
            .unwrap()
            .unwrap();

        let mut target = &tree;
        while !target.is_leaf() {
            target = target.left.as_ref().unwrap();
        }
        store
            .put_blob(target.hash_sum.clone(), b"NOPE".to_vec())
            .await
            .unwrap();

        let (result, _data, invalid) = collect(&tree, &store).await;
        assert!(matches!(result, Err(MerkleError::HashMismatch { .. })));
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].sum, target.hash_sum);
        assert_eq!(invalid[0].reason, InvalidReason::HashMismatch);
    }

    #[tokio::test]
    async fn tampered_branch_structure_is_flagged_but_does_not_abort() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let opts = MerkleOptions::default().with_blob_size(1);
        let (tree, root) = build(Cursor::new(b"abcd"), &store, opts)
            .await
            .unwrap()
            .unwrap();

        let node = store.get_node(&root).await.unwrap().unwrap();
        let tampered = Tree {
            left: Some(Box::new(Tree::leaf(node.end.clone(), 1))),
            right: Some(Box::new(Tree::leaf(node.start.clone(), 1))),
            size_byte: tree.size_byte,
            hash_sum: root,
        };

        let (result, _data, invalid) = collect(&tampered, &store).await;
        result.unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].reason, InvalidReason::HashMismatch);
    }

    #[tokio::test]
    async fn missing_blob_surfaces_data_missing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ghost = sum(HashType::Sha1, b"never stored");
        let err = retrieve_tree(&store, &ghost).await.unwrap_err();
        assert!(matches!(err, MerkleError::DataMissing { .. }));
    }

    #[test]
    fn walk_rejects_a_single_child() {
        let leaf = Tree::leaf(sum(HashType::Sha1, b"x"), 1);
        let malformed = Tree {
            left: Some(Box::new(leaf)),
            right: None,
            size_byte: 1,
            hash_sum: sum(HashType::Sha1, b"y"),
        };
        assert!(matches!(malformed.walk(), Err(MerkleError::MalformedTree(_))));
    }
}
