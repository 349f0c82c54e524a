//! Content hashing and out-of-line blob storage
//!
//! This module provides the integrity fingerprint used across the engine
//! (SHA-256, hex-encoded) and the [`BlobStore`], which hides the
//! inline-versus-out-of-line storage decision behind a uniform
//! [`ContentRef`]. Call sites always resolve content through
//! [`BlobStore::get`]; they never see whether a payload was small enough to
//! stay inline or was compressed and pushed to a more volatile tier.
//!
//! ## Placement policy
//!
//! - Content at or below the inline threshold (default 100 KB) is carried
//!   inline in the ref itself and costs no extra store key.
//! - Oversized content is lz4-compressed, base64-encoded (the backing store
//!   holds strings) and written through a tier ladder of decreasing
//!   durability. The returned [`WriteReceipt`] tells the caller whether the
//!   write degraded, so a medium-severity warning can be raised.
//! - A missing out-of-line blob resolves to `None` ("unavailable"), never an
//!   error: volatile tiers are allowed to evict, and callers must treat
//!   empty as unavailable rather than "file is empty".
//!
//! # Examples
//!
//! ```rust
//! use keepsake::blob::{checksum, BlobStore};
//! use keepsake::storage::{MemoryStore, StorageTier, TieredStore};
//! use std::sync::Arc;
//!
//! let tiers = TieredStore::new(vec![
//!     StorageTier::new("session", Arc::new(MemoryStore::new())),
//! ]);
//! let blobs = BlobStore::new(tiers, 16);
//!
//! let (small, _) = blobs.put("note", "short").unwrap();
//! let (large, _) = blobs.put("note", &"x".repeat(64)).unwrap();
//! assert!(small.is_inline());
//! assert!(!large.is_inline());
//! assert_eq!(blobs.get(&large).unwrap().unwrap(), "x".repeat(64));
//!
//! assert_eq!(checksum("abc").len(), 64);
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{KeepsakeError, Result};
use crate::storage::{TieredStore, WriteReceipt};

/// Compute the SHA-256 digest of `content`'s UTF-8 bytes, hex-encoded
///
/// Used as an integrity fingerprint throughout the engine; identical input
/// always yields an identical 64-character digest.
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Uniform reference to stored content
///
/// Whether the payload lives inline or out of line is a storage decision;
/// callers resolve either variant the same way through [`BlobStore::get`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// Payload carried directly in the ref
    Inline {
        /// The content itself
        content: String,
    },
    /// Payload compressed and stored under a derived key
    Stored {
        /// Store key of the encoded blob
        key: String,
        /// Original (uncompressed) size in bytes
        size: u64,
    },
}

impl ContentRef {
    /// Whether the payload is carried inline
    pub fn is_inline(&self) -> bool {
        matches!(self, ContentRef::Inline { .. })
    }

    /// Original payload size in bytes
    pub fn size(&self) -> u64 {
        match self {
            ContentRef::Inline { content } => content.len() as u64,
            ContentRef::Stored { size, .. } => *size,
        }
    }
}

/// Blob store hiding the inline/out-of-line duality
///
/// Out-of-line payloads go through a [`TieredStore`] whose first tier is, by
/// convention, the session-scoped store: oversized content is already a
/// durability concession, so it starts one rung down the ladder.
pub struct BlobStore {
    tiers: TieredStore,
    inline_threshold: usize,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("inline_threshold", &self.inline_threshold)
            .field("tiers", &self.tiers)
            .finish()
    }
}

impl BlobStore {
    /// Create a blob store over the given tier ladder
    pub fn new(tiers: TieredStore, inline_threshold: usize) -> Self {
        Self {
            tiers,
            inline_threshold,
        }
    }

    /// Store `content`, returning its ref and - for out-of-line writes -
    /// the receipt describing which tier took the payload
    ///
    /// `hint` only flavors the derived key for debuggability.
    pub fn put(&self, hint: &str, content: &str) -> Result<(ContentRef, Option<WriteReceipt>)> {
        if content.len() <= self.inline_threshold {
            trace!(hint, size = content.len(), "storing content inline");
            return Ok((
                ContentRef::Inline {
                    content: content.to_string(),
                },
                None,
            ));
        }

        let compressed = compress_prepend_size(content.as_bytes());
        let encoded = BASE64.encode(&compressed);
        let key = format!("keepsake:blob:{}:{}", sanitize_hint(hint), Uuid::new_v4());
        let receipt = self.tiers.write_with_fallback(&key, &encoded)?;
        debug!(
            hint,
            key,
            original = content.len(),
            stored = encoded.len(),
            tier = %receipt.tier_name,
            "stored oversized content out of line"
        );
        Ok((
            ContentRef::Stored {
                key,
                size: content.len() as u64,
            },
            Some(receipt),
        ))
    }

    /// Resolve a ref back to its content
    ///
    /// Returns `Ok(None)` when an out-of-line blob has been evicted; callers
    /// must treat that as "unavailable", not as empty content.
    ///
    /// # Errors
    ///
    /// [`KeepsakeError::Decompression`] when a present blob fails to decode,
    /// which indicates corruption rather than eviction.
    pub fn get(&self, content_ref: &ContentRef) -> Result<Option<String>> {
        match content_ref {
            ContentRef::Inline { content } => Ok(Some(content.clone())),
            ContentRef::Stored { key, .. } => {
                let Some(encoded) = self.tiers.read(key) else {
                    debug!(key, "out-of-line blob missing (evicted)");
                    return Ok(None);
                };
                let compressed = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                    KeepsakeError::Decompression(format!("invalid base64 for {key}: {e}"))
                })?;
                let bytes = decompress_size_prepended(&compressed).map_err(|e| {
                    KeepsakeError::Decompression(format!("lz4 failure for {key}: {e}"))
                })?;
                let content = String::from_utf8(bytes).map_err(|e| {
                    KeepsakeError::Decompression(format!("invalid utf-8 for {key}: {e}"))
                })?;
                Ok(Some(content))
            }
        }
    }

    /// Drop the out-of-line payload behind a ref, if any
    pub fn remove(&self, content_ref: &ContentRef) {
        if let ContentRef::Stored { key, .. } = content_ref {
            self.tiers.remove(key);
        }
    }
}

fn sanitize_hint(hint: &str) -> String {
    hint.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            '_'
        })
        .take(48)
        .collect()
}
