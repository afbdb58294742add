//! In-memory api for tests: scripted responses, recorded requests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use mural_proto::{Edit, LinkTarget, TileCoord, TileRefresh};

use super::{PushError, WorldApi};
use crate::coords::{AbsoluteCell, TileRect};

/// Every request the engine made, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Fetch(TileRect),
    Push(Vec<Edit>),
    Protect(TileCoord),
    Unprotect(TileCoord),
    CreateLink { at: AbsoluteCell, target: LinkTarget },
}

#[derive(Default)]
pub struct MockWorldApi {
    fetches: Mutex<VecDeque<Result<TileRefresh>>>,
    pushes: Mutex<VecDeque<Result<Vec<Edit>, PushError>>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl MockWorldApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next fetch response. With nothing queued, fetches return
    /// an empty refresh.
    pub fn queue_fetch(&self, result: Result<TileRefresh>) {
        self.fetches.lock().unwrap().push_back(result);
    }

    /// Script the next push response. With nothing queued, pushes echo the
    /// whole batch back as acknowledged.
    pub fn queue_push(&self, result: Result<Vec<Edit>, PushError>) {
        self.pushes.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WorldApi for MockWorldApi {
    async fn fetch_tiles(&self, bounds: TileRect) -> Result<TileRefresh> {
        self.record(ApiCall::Fetch(bounds));
        match self.fetches.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(TileRefresh::new()),
        }
    }

    async fn push_edits(&self, edits: Vec<Edit>) -> Result<Vec<Edit>, PushError> {
        self.record(ApiCall::Push(edits.clone()));
        match self.pushes.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(edits),
        }
    }

    async fn protect_tile(&self, tile: TileCoord) {
        self.record(ApiCall::Protect(tile));
    }

    async fn unprotect_tile(&self, tile: TileCoord) {
        self.record(ApiCall::Unprotect(tile));
    }

    async fn create_link(&self, at: AbsoluteCell, target: LinkTarget) {
        self.record(ApiCall::CreateLink { at, target });
    }
}
