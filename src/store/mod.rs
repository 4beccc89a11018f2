//! # Store Adapter
//!
//! ## Purpose
//! Narrows the host's key-value API down to exactly the operations the
//! graph layer needs: point `get`/`put`/`delete` plus prefix-ordered
//! `list` with opaque cursors. No atomicity is promised across calls.
//!
//! ## Mental model
//! The store is a flat map from UTF-8 keys to opaque bytes, iterated in
//! ascending lexicographic key order. Everything above this layer (index
//! maintenance, adjacency, multi-key "transactions") is synthesized by
//! the graph layer on top of these four primitives.
//!
//! ## Invariants
//! - `list` returns keys in ascending lexicographic order within `prefix`.
//! - A cursor returned for one `prefix` is only valid when passed back
//!   with that same `prefix`; the reference `InMemoryKvStore` does not
//!   detect misuse, callers must not mix cursors across prefixes.
//! - `delete` never fails because a key is absent.
//!
//! ## Failure modes & recovery
//! Store failures propagate unchanged as [`StoreError::Backend`]; the
//! graph layer never retries or swallows them.

mod memory;

pub use memory::InMemoryKvStore;

use async_trait::async_trait;
use thiserror::Error;

/// Failures surfaced by a [`KvStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// An opaque, prefix-scoped pagination token.
///
/// Cursors carry no guaranteed structure beyond "hand this back with the
/// same prefix to continue where you left off" — callers must not parse
/// or compare them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub(crate) String);

/// One page of a `list` call.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_cursor: Option<Cursor>,
    pub complete: bool,
}

/// Narrow facade over the host key-value store.
///
/// Implementors provide no cross-call atomicity; the graph layer is
/// written assuming none. See module docs for the ordering contract
/// `list` must honor.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Succeeds whether or not `key` existed.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Returns up to `limit` keys with lexicographic prefix `prefix`, in
    /// ascending order, plus either `next_cursor` (more keys exist beyond
    /// what was returned) or `complete = true` (no further keys remain).
    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<ListPage, StoreError>;
}
