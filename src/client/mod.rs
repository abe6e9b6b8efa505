//! Top-level contents client.
//!
//! [`ContentsClient`] owns the persistent catalog, a registry of live
//! [`Content`] instances, and a single event loop that routes catalog
//! changes, transfer traffic, and per-content lifecycle signals. The same
//! loop samples the throughput meters once per second and retunes the
//! shared request pacer against the configured bandwidth ceilings.

pub mod pacing;
pub mod speed;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::catalog::{CatalogError, CatalogEvent, CatalogStore};
use crate::config::EbbtideConfig;
use crate::content::{
    Content, ContentDescriptor, ContentError, ContentEvent, ContentEventKind, ContentId,
    StorageStats,
};
use crate::transfer::{ContentTransferer, TransferEvent, TransfererProvider, wire};
use self::pacing::{RequestPacer, SAMPLE_INTERVAL, next_delay};
use self::speed::SpeedEstimator;

/// Errors surfaced by the client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client is not started")]
    NotStarted,

    #[error("Client is destroyed")]
    Destroyed,

    #[error("Access denied to storage directory, try running with elevated privileges")]
    AccessDenied,

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::AccessDenied
        } else {
            Self::Io(err)
        }
    }
}

/// Aggregate notifications emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Current set of fully verified contents, emitted on every change
    Seeding(Vec<ContentId>),
    /// Bytes of a piece stored to disk
    Downloaded(usize),
    /// Bytes of a piece served to a peer
    Uploaded(usize),
    /// Trailing-window download throughput in bytes per second
    DownloadSpeed(f64),
    /// Trailing-window upload throughput in bytes per second
    UploadSpeed(f64),
}

/// Live content instances, split by verification state.
#[derive(Default)]
struct Registry {
    /// Contents still verifying or downloading
    pending: HashMap<ContentId, Arc<Content>>,
    /// Fully verified contents available for serving
    seeding: HashMap<ContentId, Arc<Content>>,
    /// Dedicated transferers for direct-source contents, disconnected on idle
    direct: HashMap<ContentId, Arc<dyn ContentTransferer>>,
}

struct Shared {
    config: EbbtideConfig,
    storage_root: PathBuf,
    metadata_path: PathBuf,
    transferer: Arc<dyn ContentTransferer>,
    provider: Arc<dyn TransfererProvider>,
    storage_stats: Option<StorageStats>,
    registry: RwLock<Registry>,
    store: RwLock<Option<Arc<CatalogStore>>>,
    pacer: Arc<RequestPacer>,
    download_meter: parking_lot::Mutex<SpeedEstimator>,
    upload_meter: parking_lot::Mutex<SpeedEstimator>,
    subscribers: parking_lot::Mutex<Vec<mpsc::UnboundedSender<ClientEvent>>>,
    content_events: parking_lot::Mutex<Option<mpsc::UnboundedSender<ContentEvent>>>,
    transfer_events: parking_lot::Mutex<Option<mpsc::UnboundedSender<TransferEvent>>>,
    destroyed: AtomicBool,
}

/// Registry of contents backed by a persistent catalog.
///
/// Created in a stopped state. [`ContentsClient::start`] prepares the
/// storage directory, opens the catalog (replaying persisted entries as
/// additions), and spawns the event loop. [`ContentsClient::destroy`] is
/// terminal.
pub struct ContentsClient {
    shared: Arc<Shared>,
    loop_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ContentsClient {
    /// Creates a stopped client rooted at `storage_root`.
    ///
    /// `transferer` carries relay traffic for every content; `provider`
    /// builds dedicated transferers for direct-source contents.
    /// `storage_stats` is an optional static estimate of the storage
    /// device, consulted before the live free-space probe.
    pub fn new(
        config: EbbtideConfig,
        storage_root: impl Into<PathBuf>,
        transferer: Arc<dyn ContentTransferer>,
        provider: Arc<dyn TransfererProvider>,
        storage_stats: Option<StorageStats>,
    ) -> Self {
        let storage_root = storage_root.into();
        let metadata_path = storage_root.join(config.storage.metadata_file_name);
        let window = config.transfer.speed_window;

        Self {
            shared: Arc::new(Shared {
                config,
                storage_root,
                metadata_path,
                transferer,
                provider,
                storage_stats,
                registry: RwLock::new(Registry::default()),
                store: RwLock::new(None),
                pacer: Arc::new(RequestPacer::default()),
                download_meter: parking_lot::Mutex::new(SpeedEstimator::new(window)),
                upload_meter: parking_lot::Mutex::new(SpeedEstimator::new(window)),
                subscribers: parking_lot::Mutex::new(Vec::new()),
                content_events: parking_lot::Mutex::new(None),
                transfer_events: parking_lot::Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
            loop_task: parking_lot::Mutex::new(None),
        }
    }

    /// Prepares storage, opens the catalog, and spawns the event loop.
    ///
    /// Contents persisted in the catalog are replayed as additions and
    /// re-verified against the files on disk.
    ///
    /// # Errors
    ///
    /// - `ClientError::Destroyed` - client was destroyed
    /// - `ClientError::AccessDenied` - storage directory is not writable
    /// - `ClientError::Catalog` - catalog could not be opened
    pub async fn start(&self) -> Result<(), ClientError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }

        fs::create_dir_all(&self.shared.storage_root).await?;

        let (store, catalog_rx) = CatalogStore::open(&self.shared.metadata_path).await?;
        *self.shared.store.write().await = Some(Arc::new(store));

        let (content_tx, content_rx) = mpsc::unbounded_channel();
        let (transfer_tx, transfer_rx) = mpsc::unbounded_channel();
        *self.shared.content_events.lock() = Some(content_tx);
        *self.shared.transfer_events.lock() = Some(transfer_tx.clone());

        spawn_transfer_forwarder(self.shared.transferer.clone(), transfer_tx);

        let handle = tokio::spawn(run_event_loop(
            Arc::clone(&self.shared),
            catalog_rx,
            content_rx,
            transfer_rx,
        ));
        if let Some(previous) = self.loop_task.lock().replace(handle) {
            previous.abort();
        }

        tracing::info!(
            storage_root = %self.shared.storage_root.display(),
            "Contents client started"
        );
        Ok(())
    }

    /// Registers a content for download and seeding.
    ///
    /// Persists the descriptor in the catalog; the resulting catalog event
    /// drives verification and download. Re-adding an identical descriptor
    /// re-verifies every pending content instead.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotStarted` - client is not started
    /// - `ClientError::Destroyed` - client was destroyed
    /// - `ClientError::Catalog` - descriptor could not be persisted
    pub async fn add(&self, descriptor: ContentDescriptor) -> Result<(), ClientError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        let store = self.require_store().await?;
        store.add(&descriptor).await?;
        Ok(())
    }

    /// Unregisters a content and deletes its files.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotStarted` - client is not started
    /// - `ClientError::Destroyed` - client was destroyed
    pub async fn remove(&self, content_id: ContentId) -> Result<(), ClientError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        let store = self.require_store().await?;

        let content = {
            let registry = self.shared.registry.read().await;
            registry
                .seeding
                .get(&content_id)
                .or_else(|| registry.pending.get(&content_id))
                .cloned()
        };

        store.remove(content_id).await?;
        if let Some(content) = content {
            content.delete_content().await?;
        }
        Ok(())
    }

    /// Returns the seeding content with the given id, if any.
    ///
    /// # Errors
    ///
    /// - `ClientError::Destroyed` - client was destroyed
    pub async fn content(&self, content_id: &ContentId) -> Result<Option<Arc<Content>>, ClientError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        Ok(self.shared.registry.read().await.seeding.get(content_id).cloned())
    }

    /// Returns the seeding contents matching any of the given ids.
    ///
    /// # Errors
    ///
    /// - `ClientError::Destroyed` - client was destroyed
    pub async fn contents(&self, content_ids: &[ContentId]) -> Result<Vec<Arc<Content>>, ClientError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        let registry = self.shared.registry.read().await;
        Ok(content_ids
            .iter()
            .filter_map(|id| registry.seeding.get(id).cloned())
            .collect())
    }

    /// Returns the ids of all seeding contents.
    ///
    /// Returns an empty list with a warning after destruction, so periodic
    /// reporters keep working during shutdown.
    pub async fn content_ids(&self) -> Vec<ContentId> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            tracing::warn!("Content ids requested after client destruction");
            return Vec::new();
        }
        let registry = self.shared.registry.read().await;
        let mut ids: Vec<_> = registry.seeding.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Trailing-window download throughput in bytes per second.
    pub fn download_speed(&self) -> f64 {
        self.shared.download_meter.lock().bytes_per_second()
    }

    /// Trailing-window upload throughput in bytes per second.
    pub fn upload_speed(&self) -> f64 {
        self.shared.upload_meter.lock().bytes_per_second()
    }

    /// Subscribes to aggregate client events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Stops the event loop and forgets live contents, keeping files and
    /// the persisted catalog intact. The client can be started again.
    pub async fn stop(&self) {
        if let Some(handle) = self.loop_task.lock().take() {
            handle.abort();
        }
        *self.shared.store.write().await = None;
        *self.shared.content_events.lock() = None;
        *self.shared.transfer_events.lock() = None;
        let mut registry = self.shared.registry.write().await;
        registry.pending.clear();
        registry.seeding.clear();
        registry.direct.clear();
        tracing::info!("Contents client stopped");
    }

    /// Stops the client permanently. Subsequent API calls fail with
    /// `ClientError::Destroyed`.
    pub async fn destroy(&self) {
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.stop().await;
        tracing::info!("Contents client destroyed");
    }

    async fn require_store(&self) -> Result<Arc<CatalogStore>, ClientError> {
        self.shared
            .store
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotStarted)
    }
}

impl Drop for ContentsClient {
    fn drop(&mut self) {
        if let Some(handle) = self.loop_task.lock().take() {
            handle.abort();
        }
    }
}

/// Bridges a transferer's event stream into the loop's unified channel.
fn spawn_transfer_forwarder(
    transferer: Arc<dyn ContentTransferer>,
    tx: mpsc::UnboundedSender<TransferEvent>,
) {
    let mut rx = transferer.subscribe();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if tx.send(event).is_err() {
                break;
            }
        }
    });
}

async fn run_event_loop(
    shared: Arc<Shared>,
    mut catalog_rx: mpsc::UnboundedReceiver<CatalogEvent>,
    mut content_rx: mpsc::UnboundedReceiver<ContentEvent>,
    mut transfer_rx: mpsc::UnboundedReceiver<TransferEvent>,
) {
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_download_speed = None;
    let mut last_upload_speed = None;

    loop {
        tokio::select! {
            Some(event) = catalog_rx.recv() => shared.handle_catalog_event(event).await,
            Some(event) = content_rx.recv() => shared.handle_content_event(event).await,
            Some(event) = transfer_rx.recv() => shared.handle_transfer_event(event).await,
            _ = interval.tick() => {
                shared.sample_speeds(&mut last_download_speed, &mut last_upload_speed);
            }
        }
    }
}

impl Shared {
    async fn handle_catalog_event(&self, event: CatalogEvent) {
        match event {
            CatalogEvent::Added(descriptor) => self.handle_added(descriptor).await,
            CatalogEvent::Removed(content_id) => self.handle_removed(content_id).await,
            CatalogEvent::Unchanged(_) => self.reverify_pending().await,
        }
    }

    async fn handle_added(&self, descriptor: ContentDescriptor) {
        if self.destroyed.load(Ordering::SeqCst) {
            tracing::warn!("Ignoring catalog addition after destruction");
            return;
        }
        let Some(content_tx) = self.content_events.lock().clone() else {
            return;
        };
        let content_id = descriptor.content_id();

        let transferer = match descriptor.source_address() {
            Some(address) => {
                let direct = self
                    .provider
                    .direct(address, self.transferer.external_ip());
                if let Some(transfer_tx) = self.transfer_events.lock().clone() {
                    spawn_transfer_forwarder(Arc::clone(&direct), transfer_tx);
                }
                self.registry
                    .write()
                    .await
                    .direct
                    .insert(content_id, Arc::clone(&direct));
                direct
            }
            None => Arc::clone(&self.transferer),
        };

        let content = Arc::new(Content::new(
            descriptor,
            Some(transferer),
            self.storage_root.clone(),
            content_tx,
            Arc::clone(&self.pacer),
            self.storage_stats,
        ));
        self.registry
            .write()
            .await
            .pending
            .insert(content_id, Arc::clone(&content));

        tracing::info!(content_id = %content_id, "Content registered, verifying");
        if let Err(err) = content.verify().await {
            tracing::error!(content_id = %content_id, error = %err, "Verification failed");
            self.abandon(content_id).await;
        }
    }

    async fn handle_removed(&self, content_id: ContentId) {
        if self.destroyed.load(Ordering::SeqCst) {
            tracing::warn!("Ignoring catalog removal after destruction");
            return;
        }
        let mut registry = self.registry.write().await;
        registry.pending.remove(&content_id);
        registry.seeding.remove(&content_id);
        registry.direct.remove(&content_id);
        let ids = seeding_ids(&registry);
        drop(registry);

        tracing::info!(content_id = %content_id, "Content unregistered");
        self.emit(ClientEvent::Seeding(ids));
    }

    /// Re-checks every pending content against the files on disk. Runs
    /// when the catalog is rewritten without a key change, which happens on
    /// duplicate additions.
    async fn reverify_pending(&self) {
        let pending: Vec<_> = self.registry.read().await.pending.values().cloned().collect();
        for content in pending {
            let content_id = content.content_id();
            if let Err(err) = content.verify().await {
                tracing::error!(content_id = %content_id, error = %err, "Re-verification failed");
                self.abandon(content_id).await;
            }
        }
    }

    async fn handle_content_event(&self, event: ContentEvent) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let content_id = event.content_id;
        match event.kind {
            ContentEventKind::Downloading => {
                tracing::debug!(content_id = %content_id, "Content downloading");
            }
            ContentEventKind::Downloaded(bytes) => {
                self.download_meter.lock().record(bytes as u64);
                self.emit(ClientEvent::Downloaded(bytes));
            }
            ContentEventKind::Uploaded(bytes) => {
                self.upload_meter.lock().record(bytes as u64);
                self.emit(ClientEvent::Uploaded(bytes));
            }
            ContentEventKind::Idle => self.promote(content_id).await,
            ContentEventKind::ConnectFailed(reason) => {
                tracing::warn!(content_id = %content_id, reason = %reason, "Peer connection failed");
                self.abandon(content_id).await;
            }
        }
    }

    /// Moves a fully verified content from pending to seeding and tears
    /// down its dedicated transferer.
    async fn promote(&self, content_id: ContentId) {
        let (direct, ids) = {
            let mut registry = self.registry.write().await;
            if let Some(content) = registry.pending.remove(&content_id) {
                registry.seeding.insert(content_id, content);
            }
            (registry.direct.remove(&content_id), seeding_ids(&registry))
        };
        if let Some(transferer) = direct
            && let Err(err) = transferer.disconnect().await
        {
            tracing::warn!(content_id = %content_id, error = %err, "Transferer disconnect failed");
        }

        tracing::info!(content_id = %content_id, "Content seeding");
        self.emit(ClientEvent::Seeding(ids));
    }

    /// Drops a failed content from the registry and the catalog. The
    /// catalog removal feeds back through the event loop, which announces
    /// the updated seeding set.
    async fn abandon(&self, content_id: ContentId) {
        let known = {
            let mut registry = self.registry.write().await;
            let direct = registry.direct.remove(&content_id);
            let pending = registry.pending.remove(&content_id).is_some();
            let seeding = registry.seeding.remove(&content_id).is_some();
            drop(direct);
            pending || seeding
        };
        if !known {
            return;
        }

        let store = self.store.read().await.clone();
        if let Some(store) = store
            && let Err(err) = store.remove(content_id).await
        {
            tracing::error!(content_id = %content_id, error = %err, "Catalog removal failed");
        }
    }

    async fn handle_transfer_event(&self, event: TransferEvent) {
        match event {
            TransferEvent::Connected => {
                tracing::debug!("Transferer connected");
            }
            TransferEvent::Response(payload) => {
                let content_id = match wire::peek_content_id(&payload) {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(error = %err, "Discarding malformed piece response");
                        return;
                    }
                };
                let Some(content) = self.pending_content(&content_id).await else {
                    tracing::debug!(content_id = %content_id, "Response for unknown content");
                    return;
                };
                if let Err(err) = content.handle_relay_response(&payload).await {
                    tracing::error!(content_id = %content_id, error = %err, "Piece rejected");
                    self.abandon(content_id).await;
                }
            }
            TransferEvent::Piece {
                content_id,
                index,
                payload,
            } => {
                let Some(content) = self.pending_content(&content_id).await else {
                    tracing::debug!(content_id = %content_id, "Piece for unknown content");
                    return;
                };
                if let Err(err) = content.handle_direct_piece(index, &payload).await {
                    tracing::error!(content_id = %content_id, error = %err, "Piece rejected");
                    self.abandon(content_id).await;
                }
            }
        }
    }

    async fn pending_content(&self, content_id: &ContentId) -> Option<Arc<Content>> {
        self.registry.read().await.pending.get(content_id).cloned()
    }

    /// Samples both throughput meters, retunes the request pacer against
    /// the configured ceilings, and announces speed changes.
    fn sample_speeds(&self, last_download: &mut Option<f64>, last_upload: &mut Option<f64>) {
        let download = self.download_meter.lock().bytes_per_second();
        let delay = next_delay(
            download,
            self.config.transfer.max_download_bps,
            self.pacer.download_delay(),
        );
        self.pacer.set_download_delay(delay);
        if *last_download != Some(download) {
            self.emit(ClientEvent::DownloadSpeed(download));
        }
        *last_download = Some(download);

        let upload = self.upload_meter.lock().bytes_per_second();
        let delay = next_delay(
            upload,
            self.config.transfer.max_upload_bps,
            self.pacer.upload_delay(),
        );
        self.pacer.set_upload_delay(delay);
        if *last_upload != Some(upload) {
            self.emit(ClientEvent::UploadSpeed(upload));
        }
        *last_upload = Some(upload);
    }

    fn emit(&self, event: ClientEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

fn seeding_ids(registry: &Registry) -> Vec<ContentId> {
    let mut ids: Vec<_> = registry.seeding.keys().copied().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::time::timeout;

    use super::*;
    use crate::content::{PieceHash, PieceIndex};
    use crate::transfer::simulation::{SimulationProvider, SimulationTransferer};

    const WAIT: Duration = Duration::from_secs(10);

    fn test_id(byte: u8) -> ContentId {
        ContentId::new([byte; 20])
    }

    fn piece_payload(index: u32) -> Vec<u8> {
        format!("piece-{index}-payload").into_bytes()
    }

    async fn wait_for_seeding(
        rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
        expected: &[ContentId],
    ) {
        timeout(WAIT, async {
            while let Some(event) = rx.recv().await {
                if let ClientEvent::Seeding(ids) = event
                    && ids == expected
                {
                    return;
                }
            }
            panic!("event stream closed before seeding announcement");
        })
        .await
        .expect("timed out waiting for seeding announcement");
    }

    fn started_client(
        storage: &TempDir,
        transferer: Arc<SimulationTransferer>,
    ) -> ContentsClient {
        ContentsClient::new(
            EbbtideConfig::for_testing(),
            storage.path(),
            transferer,
            Arc::new(SimulationProvider::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_relay_content_downloads_to_seeding() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x11);
        let transferer = Arc::new(SimulationTransferer::new());
        for index in 0..3 {
            transferer.insert_piece(content_id, PieceIndex(index), piece_payload(index));
        }

        let client = started_client(&storage, Arc::clone(&transferer));
        let mut events = client.subscribe();
        client.start().await.unwrap();

        let descriptor = ContentDescriptor::relay(content_id, 3).unwrap();
        client.add(descriptor).await.unwrap();

        wait_for_seeding(&mut events, &[content_id]).await;

        let content = client.content(&content_id).await.unwrap().unwrap();
        assert!(content.is_complete().await);
        assert_eq!(client.content_ids().await, vec![content_id]);
        for index in 0..3 {
            let path = storage.path().join(content_id.to_string()).join(index.to_string());
            assert_eq!(tokio::fs::read(path).await.unwrap(), piece_payload(index));
        }
    }

    #[tokio::test]
    async fn test_direct_content_uses_provider_transferer() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x22);
        let payloads: Vec<_> = (0..2).map(piece_payload).collect();
        let hashes: Vec<_> = payloads.iter().map(|p| PieceHash::digest(p)).collect();

        let provider = Arc::new(SimulationProvider::new());
        for (index, payload) in payloads.iter().enumerate() {
            provider.insert_piece(content_id, PieceIndex(index as u32), payload.clone());
        }

        let client = ContentsClient::new(
            EbbtideConfig::for_testing(),
            storage.path(),
            Arc::new(SimulationTransferer::new()),
            provider,
            None,
        );
        let mut events = client.subscribe();
        client.start().await.unwrap();

        let descriptor =
            ContentDescriptor::direct(content_id, 2, "198.51.100.4:8889".to_string(), hashes)
                .unwrap();
        client.add(descriptor).await.unwrap();

        wait_for_seeding(&mut events, &[content_id]).await;
        assert!(client.content(&content_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_files_verify_without_downloading() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x33);
        let content_dir = storage.path().join(content_id.to_string());
        tokio::fs::create_dir_all(&content_dir).await.unwrap();
        for index in 0..2 {
            tokio::fs::write(content_dir.join(index.to_string()), piece_payload(index))
                .await
                .unwrap();
        }

        let transferer = Arc::new(SimulationTransferer::new());
        let client = started_client(&storage, Arc::clone(&transferer));
        let mut events = client.subscribe();
        client.start().await.unwrap();

        client
            .add(ContentDescriptor::relay(content_id, 2).unwrap())
            .await
            .unwrap();

        wait_for_seeding(&mut events, &[content_id]).await;
        assert!(transferer.requests().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_replay_resumes_content_on_restart() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x44);
        let transferer = Arc::new(SimulationTransferer::new());
        for index in 0..2 {
            transferer.insert_piece(content_id, PieceIndex(index), piece_payload(index));
        }

        {
            let client = started_client(&storage, Arc::clone(&transferer));
            let mut events = client.subscribe();
            client.start().await.unwrap();
            client
                .add(ContentDescriptor::relay(content_id, 2).unwrap())
                .await
                .unwrap();
            wait_for_seeding(&mut events, &[content_id]).await;
            client.stop().await;
        }

        let client = started_client(&storage, Arc::clone(&transferer));
        let mut events = client.subscribe();
        client.start().await.unwrap();

        // Replayed from the persisted catalog, verified from disk.
        wait_for_seeding(&mut events, &[content_id]).await;
    }

    #[tokio::test]
    async fn test_duplicate_add_reverifies_pending_content() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x55);
        // No pieces stocked: the initial download request goes unanswered.
        let transferer = Arc::new(SimulationTransferer::new());
        let client = started_client(&storage, Arc::clone(&transferer));
        let mut events = client.subscribe();
        client.start().await.unwrap();

        let descriptor = ContentDescriptor::relay(content_id, 2).unwrap();
        client.add(descriptor.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.content_ids().await.is_empty());

        // Pieces appear on disk out of band, then a duplicate addition
        // triggers re-verification.
        let content_dir = storage.path().join(content_id.to_string());
        tokio::fs::create_dir_all(&content_dir).await.unwrap();
        for index in 0..2 {
            tokio::fs::write(content_dir.join(index.to_string()), piece_payload(index))
                .await
                .unwrap();
        }
        client.add(descriptor).await.unwrap();

        wait_for_seeding(&mut events, &[content_id]).await;
    }

    #[tokio::test]
    async fn test_connect_failure_abandons_content() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x66);
        let client = started_client(&storage, Arc::new(SimulationTransferer::failing()));
        client.start().await.unwrap();

        client
            .add(ContentDescriptor::relay(content_id, 2).unwrap())
            .await
            .unwrap();

        // The content and its catalog entry are removed once the connection
        // attempt fails.
        timeout(WAIT, async {
            loop {
                let metadata = tokio::fs::read_to_string(
                    storage.path().join("metadata.json"),
                )
                .await
                .unwrap();
                if !metadata.contains(&content_id.to_string()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("catalog entry was not removed");
        assert!(client.content_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_files_and_catalog_entry() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0x77);
        let transferer = Arc::new(SimulationTransferer::new());
        transferer.insert_piece(content_id, PieceIndex(0), piece_payload(0));

        let client = started_client(&storage, transferer);
        let mut events = client.subscribe();
        client.start().await.unwrap();
        client
            .add(ContentDescriptor::relay(content_id, 1).unwrap())
            .await
            .unwrap();
        wait_for_seeding(&mut events, &[content_id]).await;

        client.remove(content_id).await.unwrap();
        wait_for_seeding(&mut events, &[]).await;

        let content_dir = storage.path().join(content_id.to_string());
        assert!(!tokio::fs::try_exists(&content_dir).await.unwrap());
        let metadata =
            tokio::fs::read_to_string(storage.path().join("metadata.json")).await.unwrap();
        assert!(!metadata.contains(&content_id.to_string()));
    }

    #[tokio::test]
    async fn test_destroyed_client_rejects_api_calls() {
        let storage = TempDir::new().unwrap();
        let client = started_client(&storage, Arc::new(SimulationTransferer::new()));
        client.start().await.unwrap();
        client.destroy().await;

        assert!(matches!(client.start().await, Err(ClientError::Destroyed)));
        assert!(matches!(
            client
                .add(ContentDescriptor::relay(test_id(0x88), 1).unwrap())
                .await,
            Err(ClientError::Destroyed)
        ));
        assert!(matches!(
            client.content(&test_id(0x88)).await,
            Err(ClientError::Destroyed)
        ));
        assert!(client.content_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_before_start_fails() {
        let storage = TempDir::new().unwrap();
        let client = started_client(&storage, Arc::new(SimulationTransferer::new()));
        assert!(matches!(
            client
                .add(ContentDescriptor::relay(test_id(0x99), 1).unwrap())
                .await,
            Err(ClientError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_download_speed_reflects_received_pieces() {
        let storage = TempDir::new().unwrap();
        let content_id = test_id(0xaa);
        let transferer = Arc::new(SimulationTransferer::new());
        for index in 0..4 {
            transferer.insert_piece(content_id, PieceIndex(index), piece_payload(index));
        }

        let client = started_client(&storage, transferer);
        let mut events = client.subscribe();
        client.start().await.unwrap();
        client
            .add(ContentDescriptor::relay(content_id, 4).unwrap())
            .await
            .unwrap();
        wait_for_seeding(&mut events, &[content_id]).await;

        assert!(client.download_speed() > 0.0);
    }
}
