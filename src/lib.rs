//! Ebbtide - Peer-assisted content distribution node
//!
//! This crate provides the download and upload half of a distribution node:
//! a persistent content catalog, per-content piece verification against
//! disk, paced piece fetching over pluggable transferers, and piece serving
//! with throughput metering.

pub mod catalog;
pub mod client;
pub mod config;
pub mod content;
pub mod tracing_setup;
pub mod transfer;

// Re-export main types for convenient access
pub use catalog::{CatalogError, CatalogEvent, CatalogStore};
pub use client::{ClientError, ClientEvent, ContentsClient};
pub use config::EbbtideConfig;
pub use content::{
    Content, ContentDescriptor, ContentError, ContentId, ContentSource, PieceHash, PieceIndex,
    StorageStats,
};
pub use transfer::{ContentTransferer, TransferError, TransferEvent, TransfererProvider};

/// Errors that can bubble up from any Ebbtide subsystem.
#[derive(Debug, thiserror::Error)]
pub enum EbbtideError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EbbtideError>;
