// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-addressed key/value tree.
//!
//! A tree version is identified by its Merkle root over the sorted entries.
//! Every leaf and inner node is stored in the byte store under
//! `node/<hex hash>`, so versions share all nodes they have in common and a
//! save only writes nodes the store does not hold yet. Loading walks down
//! from the root and checks every node against the hash it is stored under,
//! so a root hash pins the exact contents it was derived from.
//!
//! ## Hashing
//!
//! ```text
//! leaf  = SHA-256(0x00 | u32be(len key) | key | u32be(len value) | value)
//! inner = SHA-256(0x01 | left | right)      odd node promoted unchanged
//! empty = SHA-256("")
//! ```
//!
//! Leaf hashes are kept next to their values and the root is cached until
//! the next mutation, so re-hashing after a change costs one leaf hash plus
//! the inner levels.
//!
//! Capabilities are split the same way as the byte store: [`TreeRead`] for
//! every view, [`TreeWrite`] only for trees owned by the write path. The read
//! path works on [`ReadOnlyTree`], which has no way to reach the writer API.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::kv::{KvRead, KvWrite, StoreError, StoreResult};
use crate::crypto::{hash, Hash};

/// Root hash of a tree with no entries: SHA-256 of the empty string.
pub const EMPTY_ROOT: Hash = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
];

/// Byte-store key prefix shared by every tree node.
pub const NODE_KEY_PREFIX: &[u8] = b"node/";

const LEAF_PREFIX: u8 = 0x00;
const INNER_PREFIX: u8 = 0x01;

/// Read capability shared by writer-owned and snapshot trees.
pub trait TreeRead {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has(&self, key: &[u8]) -> bool;

    fn get(&self, key: &[u8]) -> Option<&[u8]>;

    /// Merkle root of the current contents.
    fn hash(&self) -> Hash;
}

/// Mutation and persistence, reserved for the write path.
pub trait TreeWrite: TreeRead {
    /// Returns `true` if an existing value was replaced.
    fn set(&mut self, key: &[u8], value: &[u8]) -> bool;

    fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>>;

    /// Persist this version and return its root hash.
    fn save<S: KvWrite + ?Sized>(&self, store: &mut S) -> StoreResult<Hash>;

    /// Replace the contents with the version stored under `root`.
    fn load<S: KvRead + ?Sized>(&mut self, store: &S, root: &Hash) -> StoreResult<()>;
}

// =============================================================================
// ContentTree
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Leaf {
    value: Vec<u8>,
    hash: Hash,
}

impl Leaf {
    fn new(key: &[u8], value: Vec<u8>) -> Self {
        Self {
            hash: leaf_hash(key, &value),
            value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentTree {
    entries: BTreeMap<Vec<u8>, Leaf>,
    root: OnceLock<Hash>,
}

impl ContentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the version stored under `root`.
    pub fn open<S: KvRead + ?Sized>(store: &S, root: &Hash) -> StoreResult<Self> {
        let mut tree = Self::new();
        tree.load(store, root)?;
        Ok(tree)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(k, leaf)| (k.as_slice(), leaf.value.as_slice()))
    }

    fn leaf_hashes(&self) -> Vec<Hash> {
        self.entries.values().map(|leaf| leaf.hash).collect()
    }
}

impl PartialEq for ContentTree {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ContentTree {}

impl TreeRead for ContentTree {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn has(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|leaf| leaf.value.as_slice())
    }

    fn hash(&self) -> Hash {
        *self.root.get_or_init(|| merkle_root(self.leaf_hashes()))
    }
}

impl TreeWrite for ContentTree {
    fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        self.root = OnceLock::new();
        self.entries
            .insert(key.to_vec(), Leaf::new(key, value.to_vec()))
            .is_some()
    }

    fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let removed = self.entries.remove(key)?;
        self.root = OnceLock::new();
        Some(removed.value)
    }

    fn save<S: KvWrite + ?Sized>(&self, store: &mut S) -> StoreResult<Hash> {
        let root = self.hash();
        if root == EMPTY_ROOT {
            return Ok(root);
        }

        let leaves: Vec<(&Vec<u8>, &Leaf)> = self.entries.iter().collect();
        let levels = merkle_levels(self.leaf_hashes());
        let mut written = 0usize;

        // A stored node implies its whole subtree is stored, so the walk
        // stops wherever this version meets an earlier one
        let mut pending = vec![(levels.len() - 1, 0usize)];
        while let Some((level, index)) = pending.pop() {
            let node = levels[level][index];
            let key = node_key(&node);
            if store.contains(&key)? {
                continue;
            }

            if level == 0 {
                let (k, leaf) = leaves[index];
                let record = NodeRecord::Leaf {
                    key: hex::encode(k),
                    value: hex::encode(&leaf.value),
                };
                store.set(&key, &serde_json::to_vec(&record)?)?;
                written += 1;
                continue;
            }

            let below = &levels[level - 1];
            let left = 2 * index;
            match below.get(left + 1) {
                Some(right) => {
                    let record = NodeRecord::Inner {
                        left: hex::encode(below[left]),
                        right: hex::encode(right),
                    };
                    store.set(&key, &serde_json::to_vec(&record)?)?;
                    written += 1;
                    pending.push((level - 1, left + 1));
                    pending.push((level - 1, left));
                }
                // Promoted odd node: same hash one level down
                None => pending.push((level - 1, left)),
            }
        }

        tracing::trace!(root = %hex::encode(root), written, "Tree version saved");
        Ok(root)
    }

    fn load<S: KvRead + ?Sized>(&mut self, store: &S, root: &Hash) -> StoreResult<()> {
        if *root == EMPTY_ROOT {
            *self = Self::new();
            return Ok(());
        }

        let mut entries = BTreeMap::new();
        let mut pending = vec![*root];
        while let Some(node) = pending.pop() {
            let key = node_key(&node);
            let label = String::from_utf8_lossy(&key).into_owned();
            let bytes = store
                .get(&key)?
                .ok_or_else(|| StoreError::Missing(label.clone()))?;

            let record: NodeRecord = serde_json::from_slice(&bytes)?;
            match record {
                NodeRecord::Leaf {
                    key: raw_key,
                    value,
                } => {
                    let key = decode_hex(&label, &raw_key)?;
                    let leaf = Leaf::new(&key, decode_hex(&label, &value)?);
                    if leaf.hash != node {
                        return Err(corrupt(&label, "leaf does not match its hash"));
                    }
                    entries.insert(key, leaf);
                }
                NodeRecord::Inner { left, right } => {
                    let left = decode_node_hash(&label, &left)?;
                    let right = decode_node_hash(&label, &right)?;
                    if inner_hash(&left, &right) != node {
                        return Err(corrupt(&label, "inner node does not match its hash"));
                    }
                    pending.push(right);
                    pending.push(left);
                }
            }
        }

        let loaded = Self {
            entries,
            root: OnceLock::new(),
        };
        if loaded.hash() != *root {
            return Err(corrupt(
                &String::from_utf8_lossy(&node_key(root)),
                "entries do not rebuild the root hash",
            ));
        }

        *self = loaded;
        Ok(())
    }
}

// =============================================================================
// ReadOnlyTree
// =============================================================================

/// A tree that can only be inspected. Handed out by read snapshots, which
/// may share it with the writer's last published version.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyTree(Arc<ContentTree>);

impl ReadOnlyTree {
    pub fn open<S: KvRead + ?Sized>(store: &S, root: &Hash) -> StoreResult<Self> {
        ContentTree::open(store, root).map(Self::from)
    }
}

impl From<ContentTree> for ReadOnlyTree {
    fn from(tree: ContentTree) -> Self {
        Self(Arc::new(tree))
    }
}

impl From<Arc<ContentTree>> for ReadOnlyTree {
    fn from(tree: Arc<ContentTree>) -> Self {
        Self(tree)
    }
}

impl TreeRead for ReadOnlyTree {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn has(&self, key: &[u8]) -> bool {
        self.0.has(key)
    }

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.0.get(key)
    }

    fn hash(&self) -> Hash {
        self.0.hash()
    }
}

// =============================================================================
// Node Encoding
// =============================================================================

/// Hex keeps arbitrary bytes readable in the JSON record.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NodeRecord {
    Leaf { key: String, value: String },
    Inner { left: String, right: String },
}

fn node_key(node: &Hash) -> Vec<u8> {
    let mut key = NODE_KEY_PREFIX.to_vec();
    key.extend_from_slice(hex::encode(node).as_bytes());
    key
}

fn corrupt(key: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_hex(key: &str, raw: &str) -> StoreResult<Vec<u8>> {
    hex::decode(raw).map_err(|e| corrupt(key, e))
}

fn decode_node_hash(key: &str, raw: &str) -> StoreResult<Hash> {
    decode_hex(key, raw)?
        .try_into()
        .map_err(|_| corrupt(key, "child reference is not a hash"))
}

fn leaf_hash(key: &[u8], value: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len());
    buf.push(LEAF_PREFIX);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value);
    hash(&buf)
}

fn inner_hash(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(1 + 64);
    buf.push(INNER_PREFIX);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    hash(&buf)
}

/// Every level of the tree, leaves first. The last level holds the root.
fn merkle_levels(leaves: Vec<Hash>) -> Vec<Vec<Hash>> {
    let mut levels = vec![leaves];
    while let Some(level) = levels.last().filter(|level| level.len() > 1) {
        let next: Vec<Hash> = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => inner_hash(left, right),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
        levels.push(next);
    }
    levels
}

fn merkle_root(leaves: Vec<Hash>) -> Hash {
    merkle_levels(leaves)
        .last()
        .and_then(|level| level.first().copied())
        .unwrap_or(EMPTY_ROOT)
}

// =============================================================================
// Tests
// =============================================================================
