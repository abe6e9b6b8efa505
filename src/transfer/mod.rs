//! Pluggable transport capability consumed by the content engine.
//!
//! The core never implements a wire protocol; it drives any transport that
//! can connect, accept fire-and-forget piece requests, and deliver piece
//! responses back through an event channel.

#[cfg(any(test, feature = "test-utils"))]
pub mod simulation;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::content::{ContentId, PieceIndex};

/// Signals a transferer delivers to its subscribers.
///
/// `Response` carries the relay wire layout (see [`wire`]); `Piece` is the
/// structured delivery used by direct-source transports. Both converge on
/// the same piece-acceptance path in `Content`.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Connected,
    Response(Bytes),
    Piece {
        content_id: ContentId,
        index: PieceIndex,
        payload: Bytes,
    },
}

/// Transport capability for fetching pieces from a remote source.
///
/// Implementations own the wire protocol and handshake; the core only
/// depends on this shape.
#[async_trait]
pub trait ContentTransferer: Send + Sync {
    /// Establishes the connection. A no-op when already connected.
    ///
    /// # Errors
    /// - `TransferError::ConnectFailed` - Handshake or dial failure
    async fn connect(&self) -> Result<(), TransferError>;

    /// Tears down the connection. A no-op when not connected.
    ///
    /// # Errors
    /// - `TransferError::ConnectFailed` - Transport-level teardown failure
    async fn disconnect(&self) -> Result<(), TransferError>;

    /// Reports whether the transferer currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Sends a fire-and-forget request for one piece.
    ///
    /// # Errors
    /// - `TransferError::NotConnected` - No live connection to send on
    async fn request_piece(
        &self,
        index: PieceIndex,
        content_id: ContentId,
    ) -> Result<(), TransferError>;

    /// Returns the externally visible address of this node, when known.
    fn external_ip(&self) -> Option<String>;

    /// Returns a receiver for this transferer's events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransferEvent>;
}

/// Builds direct-source transferers for descriptors that carry an address.
///
/// The client holds one provider; content items without a source address
/// reuse the client's shared transferer instead.
pub trait TransfererProvider: Send + Sync {
    fn direct(&self, address: &str, external_ip: Option<String>) -> Arc<dyn ContentTransferer>;
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Transferer connection failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Transferer is not connected")]
    NotConnected,

    #[error("Invalid piece response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Request encoding error: {0}")]
    RequestEncoding(#[from] serde_json::Error),
}
