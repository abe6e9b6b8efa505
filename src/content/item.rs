//! One content item's on-disk pieces, verification state, and download
//! sequencing.
//!
//! A `Content` owns the piece table for one catalog entry and drives it
//! through `Verifying -> Downloading -> Idle`, requesting missing pieces
//! from its transferer one reservation at a time. Unrecoverable failures
//! (space exhaustion, integrity mismatch, connect failure) delete the
//! content's on-disk state rather than retrying forever.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, mpsc};

use super::{
    ContentDescriptor, ContentError, ContentId, PieceHash, PieceIndex, StorageStats,
};
use crate::client::pacing::RequestPacer;
use crate::transfer::{ContentTransferer, wire};

/// Download state of one piece.
///
/// `reserved` marks an outstanding request; at most one piece per content
/// is reserved at any instant. `verified` is set exactly once and never
/// reverts short of whole-content deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceState {
    pub index: PieceIndex,
    pub expected_hash: Option<PieceHash>,
    pub verified: bool,
    pub reserved: bool,
}

/// Lifecycle phase of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPhase {
    Verifying,
    Downloading,
    Idle,
    Deleted,
}

/// Signal from a `Content` to its owning client.
#[derive(Debug, Clone)]
pub struct ContentEvent {
    pub content_id: ContentId,
    pub kind: ContentEventKind,
}

#[derive(Debug, Clone)]
pub enum ContentEventKind {
    Downloading,
    Downloaded(usize),
    Uploaded(usize),
    Idle,
    ConnectFailed(String),
}

#[derive(Debug)]
struct PieceTable {
    pieces: Vec<PieceState>,
    phase: ContentPhase,
    complete: bool,
}

/// Piece state machine and download orchestrator for one content item.
pub struct Content {
    descriptor: ContentDescriptor,
    transferer: Option<Arc<dyn ContentTransferer>>,
    storage_root: PathBuf,
    events: mpsc::UnboundedSender<ContentEvent>,
    pacer: Arc<RequestPacer>,
    storage_stats: Option<StorageStats>,
    state: Mutex<PieceTable>,
}

impl Content {
    pub fn new(
        descriptor: ContentDescriptor,
        transferer: Option<Arc<dyn ContentTransferer>>,
        storage_root: impl Into<PathBuf>,
        events: mpsc::UnboundedSender<ContentEvent>,
        pacer: Arc<RequestPacer>,
        storage_stats: Option<StorageStats>,
    ) -> Self {
        Self {
            descriptor,
            transferer,
            storage_root: storage_root.into(),
            events,
            pacer,
            storage_stats,
            state: Mutex::new(PieceTable {
                pieces: Vec::new(),
                phase: ContentPhase::Verifying,
                complete: false,
            }),
        }
    }

    pub fn descriptor(&self) -> &ContentDescriptor {
        &self.descriptor
    }

    pub fn content_id(&self) -> ContentId {
        self.descriptor.content_id()
    }

    pub async fn phase(&self) -> ContentPhase {
        self.state.lock().await.phase
    }

    /// Returns a snapshot of the piece table.
    pub async fn piece_states(&self) -> Vec<PieceState> {
        self.state.lock().await.pieces.clone()
    }

    /// Returns the indexes of pieces not yet present on disk.
    pub async fn missing_pieces(&self) -> Vec<PieceIndex> {
        self.state
            .lock()
            .await
            .pieces
            .iter()
            .filter(|piece| !piece.verified)
            .map(|piece| piece.index)
            .collect()
    }

    pub async fn is_complete(&self) -> bool {
        self.state.lock().await.complete
    }

    /// Rebuilds the piece table from what is actually on disk, then either
    /// signals idle (nothing missing) or starts downloading.
    ///
    /// Disk is the single source of truth: a piece counts as verified
    /// exactly when its file exists. Reservation flags survive the rebuild
    /// so a re-verify never duplicates an in-flight request.
    ///
    /// # Errors
    /// - `ContentError::AccessDenied` - Permission failure on the storage tree
    /// - `ContentError::Io` - Any other file system failure
    pub async fn verify(&self) -> Result<(), ContentError> {
        let piece_count = self.descriptor.piece_count();
        if piece_count == 0 {
            tracing::error!(
                "Content {} has an invalid piece count, leaving it inert",
                self.content_id()
            );
            return Ok(());
        }

        let content_dir = self.content_dir();
        fs::create_dir_all(&content_dir)
            .await
            .map_err(map_permission)?;

        let mut pieces = Vec::with_capacity(piece_count as usize);
        for i in 0..piece_count {
            let index = PieceIndex::new(i);
            let verified = fs::try_exists(content_dir.join(i.to_string())).await?;
            pieces.push(PieceState {
                index,
                expected_hash: self.descriptor.expected_hash(index),
                verified,
                reserved: false,
            });
        }

        let missing = {
            let mut state = self.state.lock().await;
            for (piece, previous) in pieces.iter_mut().zip(&state.pieces) {
                if !piece.verified {
                    piece.reserved = previous.reserved;
                }
            }
            state.pieces = pieces;
            state.pieces.iter().filter(|piece| !piece.verified).count()
        };

        if missing == 0 {
            self.mark_complete().await;
            return Ok(());
        }

        tracing::debug!(
            "Content {} is missing {missing} of {piece_count} pieces",
            self.content_id()
        );
        self.download().await
    }

    /// Connects the transferer and dispatches the next single-piece
    /// request.
    ///
    /// A no-op when no transferer is assigned (the content must be seeded
    /// externally) or when a reservation is already outstanding. Connect
    /// failure is unrecoverable: on-disk state is deleted and the failure
    /// reported so the client can drop the catalog entry.
    ///
    /// # Errors
    /// - `ContentError::ConnectFailed` - Transferer could not connect
    pub async fn download(&self) -> Result<(), ContentError> {
        let Some(transferer) = &self.transferer else {
            tracing::info!(
                "Skipping download of {}: no transferer to fetch from",
                self.content_id()
            );
            return Ok(());
        };

        if !transferer.is_connected()
            && let Err(err) = transferer.connect().await
        {
            tracing::warn!(
                "Connection for {} failed, abandoning content: {err}",
                self.content_id()
            );
            if let Err(delete_err) = self.delete_content().await {
                tracing::error!(
                    "Cleanup of {} after connect failure also failed: {delete_err}",
                    self.content_id()
                );
            }
            self.emit(ContentEventKind::ConnectFailed(err.to_string()));
            return Err(ContentError::ConnectFailed {
                reason: err.to_string(),
            });
        }

        let next = {
            let mut state = self.state.lock().await;
            if state.complete || state.pieces.iter().any(|piece| piece.reserved) {
                None
            } else {
                let index = state
                    .pieces
                    .iter_mut()
                    .find(|piece| !piece.verified && !piece.reserved)
                    .map(|piece| {
                        piece.reserved = true;
                        piece.index
                    });
                if index.is_some() {
                    state.phase = ContentPhase::Downloading;
                }
                index
            }
        };

        if let Some(index) = next {
            self.emit(ContentEventKind::Downloading);
            self.spawn_request(Arc::clone(transferer), index, Duration::ZERO);
        }
        Ok(())
    }

    /// Handles a relay-transferer response in the wire layout.
    ///
    /// # Errors
    /// - `ContentError::Transfer` - Undecodable response buffer
    /// - plus everything `accept_piece` can report
    pub async fn handle_relay_response(&self, buffer: &Bytes) -> Result<(), ContentError> {
        let response = wire::decode_response(buffer)?;
        if response.content_id != self.content_id() {
            tracing::warn!(
                "Ignoring response for {} routed to {}",
                response.content_id,
                self.content_id()
            );
            return Ok(());
        }
        self.accept_piece(response.index, &response.payload).await
    }

    /// Handles a structured piece delivery from a direct transferer.
    ///
    /// # Errors
    /// Everything `accept_piece` can report.
    pub async fn handle_direct_piece(
        &self,
        index: PieceIndex,
        payload: &Bytes,
    ) -> Result<(), ContentError> {
        self.accept_piece(index, payload).await
    }

    /// Accepts one delivered piece: space guard, integrity check, write,
    /// then advance the download.
    async fn accept_piece(&self, index: PieceIndex, payload: &[u8]) -> Result<(), ContentError> {
        let expected_hash = {
            let state = self.state.lock().await;
            if state.phase == ContentPhase::Deleted {
                return Ok(());
            }
            match state.pieces.iter().find(|piece| piece.index == index) {
                Some(piece) if piece.verified => {
                    tracing::warn!(
                        "Ignoring duplicate arrival of piece {index} for {}",
                        self.content_id()
                    );
                    return Ok(());
                }
                Some(piece) => piece.expected_hash,
                None => {
                    tracing::warn!(
                        "Ignoring out-of-range piece {index} for {}",
                        self.content_id()
                    );
                    return Ok(());
                }
            }
        };

        if let Err(err) = self.ensure_space(payload.len() as u64) {
            tracing::error!(
                "Not enough space for piece {index} of {}, abandoning content: {err}",
                self.content_id()
            );
            self.delete_content().await?;
            return Err(err);
        }

        if let Some(expected) = expected_hash {
            let actual = PieceHash::digest(payload);
            if actual != expected {
                tracing::error!(
                    "Piece {index} of {} failed verification (expected {expected}, got {actual}), abandoning content",
                    self.content_id()
                );
                self.delete_content().await?;
                return Err(ContentError::PieceHashMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }

        fs::write(self.content_dir().join(index.to_string()), payload)
            .await
            .map_err(map_permission)?;

        let (remaining, next) = {
            let mut state = self.state.lock().await;
            if let Some(piece) = state.pieces.iter_mut().find(|piece| piece.index == index) {
                piece.verified = true;
                piece.reserved = false;
            }
            let remaining = state.pieces.iter().filter(|piece| !piece.verified).count();
            let next = if remaining > 0 && !state.pieces.iter().any(|piece| piece.reserved) {
                state
                    .pieces
                    .iter_mut()
                    .find(|piece| !piece.verified && !piece.reserved)
                    .map(|piece| {
                        piece.reserved = true;
                        piece.index
                    })
            } else {
                None
            };
            (remaining, next)
        };

        tracing::debug!(
            "Stored piece {index} of {} ({} bytes, {remaining} left)",
            self.content_id(),
            payload.len()
        );
        self.emit(ContentEventKind::Downloaded(payload.len()));

        if remaining == 0 {
            self.mark_complete().await;
        } else if let (Some(next_index), Some(transferer)) = (next, &self.transferer) {
            self.spawn_request(
                Arc::clone(transferer),
                next_index,
                self.pacer.download_delay(),
            );
        }
        Ok(())
    }

    /// Reads a byte range out of a stored piece for serving to a peer.
    ///
    /// The effective length is `length` when it is positive and fits the
    /// remainder of the file past `offset`, otherwise the remainder
    /// itself.
    ///
    /// # Errors
    /// - `ContentError::PieceNotFound` - Piece file missing (caller asked
    ///   for an unverified or out-of-range piece)
    /// - `ContentError::Io` - Any other file system failure
    pub async fn piece_data(
        &self,
        index: PieceIndex,
        offset: u32,
        length: u32,
    ) -> Result<wire::PieceResponse, ContentError> {
        let path = self.content_dir().join(index.to_string());
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::PieceNotFound { index });
            }
            Err(err) => return Err(err.into()),
        };

        let size = file.metadata().await?.len();
        let remainder = size.saturating_sub(u64::from(offset));
        let effective = if length > 0 && u64::from(length) <= remainder {
            u64::from(length)
        } else {
            remainder
        };

        file.seek(SeekFrom::Start(u64::from(offset))).await?;
        let mut payload = vec![0u8; effective as usize];
        file.read_exact(&mut payload).await?;

        self.emit(ContentEventKind::Uploaded(payload.len()));
        Ok(wire::PieceResponse {
            content_id: self.content_id(),
            index,
            offset,
            payload: Bytes::from(payload),
        })
    }

    /// Checks that `required` bytes fit in storage.
    ///
    /// The caller-supplied estimate fails fast when present and
    /// insufficient; the live probe must then also pass.
    ///
    /// # Errors
    /// - `ContentError::InsufficientSpace` - Either check failed
    pub fn ensure_space(&self, required: u64) -> Result<(), ContentError> {
        if let Some(stats) = self.storage_stats
            && stats.available < required
        {
            return Err(ContentError::InsufficientSpace {
                needed: required,
                available: stats.available,
            });
        }

        match probe_available_space(&self.storage_root) {
            Some(available) if available < required => Err(ContentError::InsufficientSpace {
                needed: required,
                available,
            }),
            Some(_) => Ok(()),
            None => {
                // No mount covers the storage root (containers, exotic
                // filesystems); unknown capacity is not treated as full.
                tracing::warn!(
                    "No disk found for storage root {}, skipping free-space probe",
                    self.storage_root.display()
                );
                Ok(())
            }
        }
    }

    /// Recursively removes this content's storage directory.
    ///
    /// # Errors
    /// - `ContentError::AccessDenied` - Permission failure on removal
    /// - `ContentError::Io` - Any other file system failure
    pub async fn delete_content(&self) -> Result<(), ContentError> {
        let content_dir = self.content_dir();
        if fs::try_exists(&content_dir).await? {
            fs::remove_dir_all(&content_dir)
                .await
                .map_err(map_permission)?;
            tracing::info!("Deleted stored pieces for {}", self.content_id());
        }
        let mut state = self.state.lock().await;
        state.phase = ContentPhase::Deleted;
        Ok(())
    }

    fn content_dir(&self) -> PathBuf {
        self.storage_root.join(self.content_id().to_string())
    }

    /// Marks the content complete and signals idle, exactly once.
    async fn mark_complete(&self) {
        let mut state = self.state.lock().await;
        if state.complete {
            return;
        }
        state.complete = true;
        state.phase = ContentPhase::Idle;
        drop(state);
        self.emit(ContentEventKind::Idle);
    }

    /// Dispatches one reserved-piece request after the pacing delay.
    ///
    /// The reservation was taken before this is called, so a second
    /// trigger cannot race a duplicate request for the same piece.
    fn spawn_request(
        &self,
        transferer: Arc<dyn ContentTransferer>,
        index: PieceIndex,
        delay: Duration,
    ) {
        let content_id = self.content_id();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = transferer.request_piece(index, content_id).await {
                tracing::warn!("Request for piece {index} of {content_id} failed: {err}");
            }
        });
    }

    fn emit(&self, kind: ContentEventKind) {
        let _ = self.events.send(ContentEvent {
            content_id: self.content_id(),
            kind,
        });
    }
}

fn map_permission(err: std::io::Error) -> ContentError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        ContentError::AccessDenied
    } else {
        ContentError::Io(err)
    }
}

/// Live free-space probe for the filesystem holding `root`.
///
/// Picks the disk whose mount point is the longest prefix of the storage
/// root, which resolves to the drive root on Windows-style paths and the
/// covering mount elsewhere.
fn probe_available_space(root: &std::path::Path) -> Option<u64> {
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| root.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}

#[cfg(test)]
mod tests {
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::transfer::simulation::SimulationTransferer;

    fn test_id() -> ContentId {
        ContentId::new([0x5e; 20])
    }

    fn relay_descriptor(pieces: u32) -> ContentDescriptor {
        ContentDescriptor::relay(test_id(), pieces).unwrap()
    }

    fn content_with(
        descriptor: ContentDescriptor,
        transferer: Option<Arc<dyn ContentTransferer>>,
        dir: &TempDir,
        storage_stats: Option<StorageStats>,
    ) -> (Content, mpsc::UnboundedReceiver<ContentEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let content = Content::new(
            descriptor,
            transferer,
            dir.path(),
            events,
            Arc::new(RequestPacer::new()),
            storage_stats,
        );
        (content, receiver)
    }

    async fn seed_piece(dir: &TempDir, index: u32, payload: &[u8]) {
        let content_dir = dir.path().join(test_id().to_string());
        fs::create_dir_all(&content_dir).await.unwrap();
        fs::write(content_dir.join(index.to_string()), payload)
            .await
            .unwrap();
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<ContentEvent>) -> Vec<ContentEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_verify_reports_missing_pieces_from_disk() {
        let dir = tempdir().unwrap();
        for index in [0, 2, 5] {
            seed_piece(&dir, index, b"present").await;
        }

        let (content, _events) = content_with(relay_descriptor(6), None, &dir, None);
        content.verify().await.unwrap();

        let missing = content.missing_pieces().await;
        assert_eq!(
            missing,
            vec![PieceIndex::new(1), PieceIndex::new(3), PieceIndex::new(4)]
        );
        assert!(!content.is_complete().await);
    }

    #[tokio::test]
    async fn test_verify_with_all_pieces_signals_idle_once() {
        let dir = tempdir().unwrap();
        for index in 0..4 {
            seed_piece(&dir, index, b"present").await;
        }

        let (content, mut events) = content_with(relay_descriptor(4), None, &dir, None);
        content.verify().await.unwrap();
        content.verify().await.unwrap();

        let idle_count = drain(&mut events)
            .iter()
            .filter(|kind| matches!(kind, ContentEventKind::Idle))
            .count();
        assert_eq!(idle_count, 1);
        assert_eq!(content.phase().await, ContentPhase::Idle);
    }

    #[tokio::test]
    async fn test_download_without_transferer_stays_inert() {
        let dir = tempdir().unwrap();
        let (content, mut events) = content_with(relay_descriptor(3), None, &dir, None);
        content.verify().await.unwrap();

        assert!(drain(&mut events).is_empty());
        assert_eq!(content.missing_pieces().await.len(), 3);
    }

    #[tokio::test]
    async fn test_download_reserves_exactly_one_piece() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::new());
        let (content, _events) =
            content_with(relay_descriptor(5), Some(transferer.clone()), &dir, None);

        content.verify().await.unwrap();
        // A re-verify while the request is in flight must not double-reserve.
        content.verify().await.unwrap();

        let reserved = content
            .piece_states()
            .await
            .iter()
            .filter(|piece| piece.reserved)
            .count();
        assert_eq!(reserved, 1);
    }

    #[tokio::test]
    async fn test_piece_arrivals_complete_content_in_any_order() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::new());
        let (content, mut events) =
            content_with(relay_descriptor(3), Some(transferer.clone()), &dir, None);
        content.verify().await.unwrap();

        for index in [2u32, 0, 1] {
            content
                .handle_direct_piece(PieceIndex::new(index), &Bytes::from_static(b"payload"))
                .await
                .unwrap();
        }
        // Late duplicate after completion is ignored.
        content
            .handle_direct_piece(PieceIndex::new(0), &Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert!(content.is_complete().await);
        let kinds = drain(&mut events);
        let idle_count = kinds
            .iter()
            .filter(|kind| matches!(kind, ContentEventKind::Idle))
            .count();
        assert_eq!(idle_count, 1);
        let downloaded = kinds
            .iter()
            .filter(|kind| matches!(kind, ContentEventKind::Downloaded(_)))
            .count();
        assert_eq!(downloaded, 3);
    }

    #[tokio::test]
    async fn test_integrity_mismatch_deletes_content() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::new());
        let good = Bytes::from_static(b"good payload");
        let hashes = vec![PieceHash::digest(&good), PieceHash::digest(b"other")];
        let descriptor =
            ContentDescriptor::direct(test_id(), 2, "wss://source.example", hashes).unwrap();
        let (content, _events) = content_with(descriptor, Some(transferer), &dir, None);
        content.verify().await.unwrap();

        content
            .handle_direct_piece(PieceIndex::new(0), &good)
            .await
            .unwrap();

        let result = content
            .handle_direct_piece(PieceIndex::new(1), &Bytes::from_static(b"tampered"))
            .await;
        assert!(matches!(
            result,
            Err(ContentError::PieceHashMismatch { .. })
        ));
        assert!(!dir.path().join(test_id().to_string()).exists());
        assert_eq!(content.phase().await, ContentPhase::Deleted);
    }

    #[tokio::test]
    async fn test_space_exhaustion_deletes_content_without_writing() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::new());
        let stats = StorageStats {
            total: 100,
            available: 4,
            used: 96,
        };
        let (content, _events) =
            content_with(relay_descriptor(2), Some(transferer), &dir, Some(stats));
        content.verify().await.unwrap();

        let result = content
            .handle_direct_piece(PieceIndex::new(0), &Bytes::from_static(b"way too large"))
            .await;
        assert!(matches!(
            result,
            Err(ContentError::InsufficientSpace { .. })
        ));
        assert!(!dir.path().join(test_id().to_string()).exists());
    }

    #[tokio::test]
    async fn test_connect_failure_abandons_content() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::failing());
        let (content, mut events) =
            content_with(relay_descriptor(2), Some(transferer), &dir, None);

        let result = content.verify().await;
        assert!(matches!(result, Err(ContentError::ConnectFailed { .. })));
        assert!(!dir.path().join(test_id().to_string()).exists());
        assert!(
            drain(&mut events)
                .iter()
                .any(|kind| matches!(kind, ContentEventKind::ConnectFailed(_)))
        );
    }

    #[tokio::test]
    async fn test_relay_response_stores_piece() {
        let dir = tempdir().unwrap();
        let transferer = Arc::new(SimulationTransferer::new());
        let (content, _events) =
            content_with(relay_descriptor(1), Some(transferer), &dir, None);
        content.verify().await.unwrap();

        let buffer = wire::encode_response(test_id(), PieceIndex::new(0), b"relayed bytes");
        content.handle_relay_response(&buffer).await.unwrap();

        let stored = fs::read(dir.path().join(test_id().to_string()).join("0"))
            .await
            .unwrap();
        assert_eq!(stored, b"relayed bytes");
        assert!(content.is_complete().await);
    }

    #[tokio::test]
    async fn test_piece_data_effective_length() {
        let dir = tempdir().unwrap();
        seed_piece(&dir, 0, b"0123456789").await;
        let (content, mut events) = content_with(relay_descriptor(1), None, &dir, None);

        // Positive length within bounds.
        let response = content.piece_data(PieceIndex::new(0), 2, 4).await.unwrap();
        assert_eq!(response.payload.as_ref(), b"2345");
        assert_eq!(response.offset, 2);

        // Zero length falls back to the remainder of the file.
        let response = content.piece_data(PieceIndex::new(0), 6, 0).await.unwrap();
        assert_eq!(response.payload.as_ref(), b"6789");

        // Length past the end also falls back to the remainder.
        let response = content.piece_data(PieceIndex::new(0), 8, 100).await.unwrap();
        assert_eq!(response.payload.as_ref(), b"89");

        let uploads = drain(&mut events)
            .iter()
            .filter(|kind| matches!(kind, ContentEventKind::Uploaded(_)))
            .count();
        assert_eq!(uploads, 3);
    }

    #[tokio::test]
    async fn test_piece_data_missing_piece_is_contract_violation() {
        let dir = tempdir().unwrap();
        let (content, _events) = content_with(relay_descriptor(1), None, &dir, None);

        let result = content.piece_data(PieceIndex::new(0), 0, 0).await;
        assert!(matches!(result, Err(ContentError::PieceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_content_is_idempotent() {
        let dir = tempdir().unwrap();
        seed_piece(&dir, 0, b"data").await;
        let (content, _events) = content_with(relay_descriptor(1), None, &dir, None);

        content.delete_content().await.unwrap();
        assert!(!dir.path().join(test_id().to_string()).exists());
        content.delete_content().await.unwrap();
    }
}
