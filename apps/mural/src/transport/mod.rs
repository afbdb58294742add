//! The sync boundary: an abstracted fetch/push request-response contract.
//! Only the contract matters to the engine; the polling HTTP transport and
//! the in-memory mock both satisfy it.

use anyhow::Result;
use async_trait::async_trait;
use mural_proto::{Edit, LinkTarget, TileCoord, TileRefresh};
use thiserror::Error;

use crate::coords::{AbsoluteCell, TileRect};

pub mod http;
pub mod mock;

pub use http::HttpWorldApi;
pub use mock::{ApiCall, MockWorldApi};

/// Why a push failed. Permission denial is the one transport outcome that
/// changes engine state (it demotes write capability); everything else is
/// retried on the normal schedule.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("permission denied")]
    PermissionDenied,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request/response contract with the canvas server.
#[async_trait]
pub trait WorldApi: Send + Sync {
    /// Fetch snapshots for every tile in `bounds` (inclusive).
    async fn fetch_tiles(&self, bounds: TileRect) -> Result<TileRefresh>;

    /// Send a batch of local edits; the response lists the edits the server
    /// accepted, in the same six-field shape.
    async fn push_edits(&self, edits: Vec<Edit>) -> Result<Vec<Edit>, PushError>;

    /// Fire-and-forget; no response is consumed by the engine.
    async fn protect_tile(&self, tile: TileCoord);

    /// Fire-and-forget; no response is consumed by the engine.
    async fn unprotect_tile(&self, tile: TileCoord);

    /// Fire-and-forget; no response is consumed by the engine.
    async fn create_link(&self, at: AbsoluteCell, target: LinkTarget);
}
