//! Persisted content catalog with change-diff notifications.
//!
//! The catalog is one JSON file mapping content-id strings to descriptor
//! records, rewritten wholesale on every mutation. There is no in-memory
//! cache: every write re-reads the file first, so the emitted diff is
//! always computed against the latest on-disk state and a crash can never
//! leave a stale snapshot behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::mpsc;

use crate::content::{ContentDescriptor, ContentError, ContentId, ContentSource, PieceHash};

/// Notifications emitted after each catalog mutation.
///
/// `Unchanged` fires when a mutation touched no key; the client uses it to
/// re-trigger verification of still-pending content.
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    Added(ContentDescriptor),
    Removed(ContentId),
    Unchanged(Vec<ContentDescriptor>),
}

/// Errors that can occur reading or writing the persisted catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog access denied, run the node with elevated privileges")]
    AccessDenied,

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("Catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Permission failures get their own variant so callers can tell the user
// to re-run with elevated privileges instead of retrying.
impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            CatalogError::AccessDenied
        } else {
            CatalogError::Io(err)
        }
    }
}

/// Persisted form of one catalog entry.
///
/// Unrecognized fields from older or foreign writers are dropped on read,
/// which keeps the rewritten file limited to the recognized set.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogRecord {
    #[serde(rename = "infoHash")]
    info_hash: ContentId,
    pieces: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(
        rename = "piecesIntegrity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pieces_integrity: Option<Vec<PieceHash>>,
}

type Catalog = BTreeMap<String, CatalogRecord>;

impl CatalogRecord {
    fn from_descriptor(descriptor: &ContentDescriptor) -> Self {
        let (source, pieces_integrity) = match descriptor.source() {
            ContentSource::Relay => (None, None),
            ContentSource::Direct {
                address,
                piece_hashes,
            } => {
                let integrity = if piece_hashes.is_empty() {
                    None
                } else {
                    Some(piece_hashes.clone())
                };
                (Some(address.clone()), integrity)
            }
        };
        Self {
            info_hash: descriptor.content_id(),
            pieces: descriptor.piece_count(),
            source,
            pieces_integrity,
        }
    }

    fn to_descriptor(&self) -> Result<ContentDescriptor, ContentError> {
        let source = match (&self.source, &self.pieces_integrity) {
            (Some(address), integrity) => ContentSource::Direct {
                address: address.clone(),
                piece_hashes: integrity.clone().unwrap_or_default(),
            },
            (None, Some(_)) => {
                // Integrity digests are only checkable on the direct path.
                tracing::warn!(
                    "Content {} carries piece digests without a source address, ignoring them",
                    self.info_hash
                );
                ContentSource::Relay
            }
            (None, None) => ContentSource::Relay,
        };
        ContentDescriptor::new(self.info_hash, self.pieces, source)
    }
}

/// Diff-emitting persisted catalog of content descriptors.
///
/// On open, one `Added` event per existing entry is queued into the
/// subscriber channel, so a subscriber that starts consuming after
/// construction still observes the full catalog.
pub struct CatalogStore {
    path: PathBuf,
    events: mpsc::UnboundedSender<CatalogEvent>,
}

impl CatalogStore {
    /// Opens the catalog at `path`, creating an empty file when absent.
    ///
    /// Unparsable persisted content is treated as an empty catalog, not a
    /// fatal error.
    ///
    /// # Errors
    /// - `CatalogError::AccessDenied` - Permission failure on read/create
    /// - `CatalogError::Io` - Any other file system failure
    pub async fn open(
        path: impl Into<PathBuf>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CatalogEvent>), CatalogError> {
        let (events, receiver) = mpsc::unbounded_channel();
        let store = Self {
            path: path.into(),
            events,
        };

        let catalog = store.read().await?;
        for record in catalog.values() {
            store.emit_added(record);
        }
        Ok((store, receiver))
    }

    /// Adds (or replaces) a descriptor and persists the new catalog.
    ///
    /// # Errors
    /// - `CatalogError::AccessDenied` - Permission failure on read/write
    /// - `CatalogError::Io` - Any other file system failure
    pub async fn add(&self, descriptor: &ContentDescriptor) -> Result<(), CatalogError> {
        let mut catalog = self.read().await?;
        catalog.insert(
            descriptor.content_id().to_string(),
            CatalogRecord::from_descriptor(descriptor),
        );
        self.write(catalog).await
    }

    /// Removes an entry and persists the new catalog.
    ///
    /// # Errors
    /// - `CatalogError::AccessDenied` - Permission failure on read/write
    /// - `CatalogError::Io` - Any other file system failure
    pub async fn remove(&self, content_id: ContentId) -> Result<(), CatalogError> {
        let mut catalog = self.read().await?;
        catalog.remove(&content_id.to_string());
        self.write(catalog).await
    }

    /// Looks up a descriptor by content id.
    ///
    /// # Errors
    /// - `CatalogError::AccessDenied` - Permission failure on read
    /// - `CatalogError::Io` - Any other file system failure
    pub async fn get(&self, content_id: ContentId) -> Result<Option<ContentDescriptor>, CatalogError> {
        let catalog = self.read().await?;
        let Some(record) = catalog.get(&content_id.to_string()) else {
            return Ok(None);
        };
        match record.to_descriptor() {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(err) => {
                tracing::warn!("Dropping invalid catalog entry {content_id}: {err}");
                Ok(None)
            }
        }
    }

    /// Drops every entry and persists an empty catalog.
    ///
    /// # Errors
    /// - `CatalogError::AccessDenied` - Permission failure on read/write
    /// - `CatalogError::Io` - Any other file system failure
    pub async fn clear(&self) -> Result<(), CatalogError> {
        self.write(Catalog::new()).await
    }

    /// Writes the new catalog state, then diffs it against the previous
    /// on-disk state and emits the changes.
    async fn write(&self, catalog: Catalog) -> Result<(), CatalogError> {
        let previous = self.read().await?;
        let json = serde_json::to_vec_pretty(&catalog)?;
        fs::write(&self.path, json).await?;

        let mut changed = false;
        for (key, record) in &catalog {
            if !previous.contains_key(key) {
                changed = true;
                self.emit_added(record);
            }
        }
        for (key, record) in &previous {
            if !catalog.contains_key(key) {
                changed = true;
                let _ = self
                    .events
                    .send(CatalogEvent::Removed(record.info_hash));
            }
        }
        if !changed {
            let descriptors = catalog
                .values()
                .filter_map(|record| record.to_descriptor().ok())
                .collect();
            let _ = self.events.send(CatalogEvent::Unchanged(descriptors));
        }
        Ok(())
    }

    async fn read(&self) -> Result<Catalog, CatalogError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let empty = serde_json::to_vec_pretty(&Catalog::new())?;
                fs::write(&self.path, empty).await?;
                return Ok(Catalog::new());
            }
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(catalog) => Ok(catalog),
            Err(err) => {
                tracing::warn!(
                    "Catalog file {} is unparsable ({err}), starting from an empty catalog",
                    self.path.display()
                );
                Ok(Catalog::new())
            }
        }
    }

    fn emit_added(&self, record: &CatalogRecord) {
        match record.to_descriptor() {
            Ok(descriptor) => {
                let _ = self.events.send(CatalogEvent::Added(descriptor));
            }
            Err(err) => {
                tracing::warn!(
                    "Skipping invalid catalog entry {}: {err}",
                    record.info_hash
                );
            }
        }
    }
}
