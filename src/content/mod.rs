//! Content identity, descriptors, and the per-content piece engine.

pub mod item;

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

pub use self::item::{Content, ContentEvent, ContentEventKind, ContentPhase, PieceState};

/// SHA-1 hash identifying a unique content item.
///
/// 20-byte digest, hex-encoded in the catalog and used as the content's
/// storage directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 20]);

impl ContentId {
    /// Creates ContentId from a 20-byte hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ContentId {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ContentError::InvalidDescriptor {
            reason: format!("content id is not valid hex: {s}"),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ContentError::InvalidDescriptor {
                reason: format!("content id must be 20 bytes: {s}"),
            })?;
        Ok(Self(hash))
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Zero-based index of a piece within a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Expected SHA-1 digest of one piece's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceHash([u8; 20]);

impl PieceHash {
    /// Creates PieceHash from a 20-byte digest.
    pub fn new(digest: [u8; 20]) -> Self {
        Self(digest)
    }

    /// Computes the SHA-1 digest of a piece payload.
    pub fn digest(payload: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// Returns reference to the underlying 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for PieceHash {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ContentError::InvalidDescriptor {
            reason: format!("piece hash is not valid hex: {s}"),
        })?;
        let digest: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ContentError::InvalidDescriptor {
                reason: format!("piece hash must be 20 bytes: {s}"),
            })?;
        Ok(Self(digest))
    }
}

impl Serialize for PieceHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PieceHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Where a content item's pieces come from.
///
/// `Relay` contents are fetched through the node's shared transferer.
/// `Direct` contents open a dedicated transferer to the given address and
/// may carry per-piece integrity digests to verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Relay,
    Direct {
        address: String,
        piece_hashes: Vec<PieceHash>,
    },
}

/// Catalog entry describing one content item.
///
/// Immutable after creation; the catalog replaces the whole entry on add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    content_id: ContentId,
    piece_count: u32,
    source: ContentSource,
}

impl ContentDescriptor {
    /// Creates a validated descriptor.
    ///
    /// # Errors
    /// - `ContentError::InvalidDescriptor` - Zero piece count, or a `Direct`
    ///   source whose digest list does not cover every piece
    pub fn new(
        content_id: ContentId,
        piece_count: u32,
        source: ContentSource,
    ) -> Result<Self, ContentError> {
        if piece_count == 0 {
            return Err(ContentError::InvalidDescriptor {
                reason: format!("content {content_id} has zero pieces"),
            });
        }
        if let ContentSource::Direct { piece_hashes, .. } = &source
            && !piece_hashes.is_empty()
            && piece_hashes.len() != piece_count as usize
        {
            return Err(ContentError::InvalidDescriptor {
                reason: format!(
                    "content {content_id} carries {} piece digests for {piece_count} pieces",
                    piece_hashes.len()
                ),
            });
        }
        Ok(Self {
            content_id,
            piece_count,
            source,
        })
    }

    /// Creates a descriptor served through the shared relay transferer.
    pub fn relay(content_id: ContentId, piece_count: u32) -> Result<Self, ContentError> {
        Self::new(content_id, piece_count, ContentSource::Relay)
    }

    /// Creates a descriptor fetched directly from `address`.
    pub fn direct(
        content_id: ContentId,
        piece_count: u32,
        address: impl Into<String>,
        piece_hashes: Vec<PieceHash>,
    ) -> Result<Self, ContentError> {
        Self::new(
            content_id,
            piece_count,
            ContentSource::Direct {
                address: address.into(),
                piece_hashes,
            },
        )
    }

    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    /// Returns the direct-source address when present.
    pub fn source_address(&self) -> Option<&str> {
        match &self.source {
            ContentSource::Relay => None,
            ContentSource::Direct { address, .. } => Some(address.as_str()),
        }
    }

    /// Returns the expected digest for `index` when the source carries one.
    pub fn expected_hash(&self, index: PieceIndex) -> Option<PieceHash> {
        match &self.source {
            ContentSource::Relay => None,
            ContentSource::Direct { piece_hashes, .. } => {
                piece_hashes.get(index.as_u32() as usize).copied()
            }
        }
    }
}

/// Caller-supplied storage capacity estimate for the space guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
}

/// Errors that can occur while verifying, fetching, or serving content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Invalid content descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Storage access denied, run the node with elevated privileges")]
    AccessDenied,

    #[error("Insufficient disk space: need {needed} bytes, have {available}")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("Piece {index} hash mismatch: expected {expected}, got {actual}")]
    PieceHashMismatch {
        index: PieceIndex,
        expected: PieceHash,
        actual: PieceHash,
    },

    #[error("Piece {index} not found")]
    PieceNotFound { index: PieceIndex },

    #[error("Transferer connection failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Transfer error: {0}")]
    Transfer(#[from] crate::transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
