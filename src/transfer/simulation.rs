//! In-memory transferer for tests and simulation runs.
//!
//! Serves pieces out of a map without any network, with configurable
//! connect failure and a choice between relay-style wire responses and
//! direct structured deliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ContentTransferer, TransferError, TransferEvent, TransfererProvider, wire};
use crate::content::{ContentId, PieceIndex};

/// How the simulation delivers a served piece to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// `TransferEvent::Response` carrying the relay wire layout.
    Relay,
    /// `TransferEvent::Piece` structured delivery.
    Direct,
}

/// Deterministic in-memory `ContentTransferer`.
pub struct SimulationTransferer {
    connected: AtomicBool,
    fail_connect: bool,
    delivery: DeliveryMode,
    pieces: Mutex<HashMap<(ContentId, PieceIndex), Bytes>>,
    requests: Mutex<Vec<(ContentId, PieceIndex)>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransferEvent>>>,
    external_ip: Option<String>,
}

impl SimulationTransferer {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            fail_connect: false,
            delivery: DeliveryMode::Relay,
            pieces: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            external_ip: Some("203.0.113.7".to_string()),
        }
    }

    /// A transferer whose `connect` always fails.
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }

    /// Switches served pieces to direct structured deliveries.
    pub fn with_direct_delivery(mut self) -> Self {
        self.delivery = DeliveryMode::Direct;
        self
    }

    /// Stocks a piece to be served on request.
    pub fn insert_piece(&self, content_id: ContentId, index: PieceIndex, payload: impl Into<Bytes>) {
        self.pieces.lock().insert((content_id, index), payload.into());
    }

    /// Returns every request seen so far, in order.
    pub fn requests(&self) -> Vec<(ContentId, PieceIndex)> {
        self.requests.lock().clone()
    }

    fn broadcast(&self, event: TransferEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl Default for SimulationTransferer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentTransferer for SimulationTransferer {
    async fn connect(&self) -> Result<(), TransferError> {
        if self.fail_connect {
            return Err(TransferError::ConnectFailed {
                reason: "simulated connect failure".to_string(),
            });
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.broadcast(TransferEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransferError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn request_piece(
        &self,
        index: PieceIndex,
        content_id: ContentId,
    ) -> Result<(), TransferError> {
        if !self.is_connected() {
            return Err(TransferError::NotConnected);
        }
        self.requests.lock().push((content_id, index));

        let Some(payload) = self.pieces.lock().get(&(content_id, index)).cloned() else {
            tracing::debug!("Simulation has no piece {index} for {content_id}");
            return Ok(());
        };

        match self.delivery {
            DeliveryMode::Relay => {
                let buffer = wire::encode_response(content_id, index, &payload);
                self.broadcast(TransferEvent::Response(buffer));
            }
            DeliveryMode::Direct => {
                self.broadcast(TransferEvent::Piece {
                    content_id,
                    index,
                    payload,
                });
            }
        }
        Ok(())
    }

    fn external_ip(&self) -> Option<String> {
        self.external_ip.clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }
}

/// Provider that hands out direct-delivery simulation transferers sharing
/// one piece map seed.
pub struct SimulationProvider {
    pieces: Mutex<HashMap<(ContentId, PieceIndex), Bytes>>,
}

impl SimulationProvider {
    pub fn new() -> Self {
        Self {
            pieces: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_piece(&self, content_id: ContentId, index: PieceIndex, payload: impl Into<Bytes>) {
        self.pieces.lock().insert((content_id, index), payload.into());
    }
}

impl Default for SimulationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TransfererProvider for SimulationProvider {
    fn direct(&self, address: &str, _external_ip: Option<String>) -> Arc<dyn ContentTransferer> {
        tracing::debug!("Simulation provider building direct transferer for {address}");
        let transferer = SimulationTransferer::new().with_direct_delivery();
        for ((content_id, index), payload) in self.pieces.lock().iter() {
            transferer.insert_piece(*content_id, *index, payload.clone());
        }
        Arc::new(transferer)
    }
}
