//! Polling HTTP transport.
//!
//! Fetches are GETs against the world path with the window bounds as query
//! parameters; pushes POST the edit batch form-encoded, one comma-joined
//! value per edit. Protection and link creation go to their own endpoints
//! and their responses are ignored.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mural_proto::{Edit, LinkTarget, PROTOCOL_VERSION, TileCoord, TileRefresh};
use reqwest::StatusCode;
use tracing::warn;
use url::Url;

use super::{PushError, WorldApi};
use crate::coords::{AbsoluteCell, TileRect};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpWorldApi {
    http: reqwest::Client,
    base: Url,
    world: String,
}

impl HttpWorldApi {
    pub fn new(server: &str, world: &str) -> Result<Self> {
        let mut base: Url =
            server.parse().with_context(|| format!("bad server url {server:?}"))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            base,
            world: world.to_string(),
        })
    }

    fn world_url(&self) -> Result<Url> {
        self.base
            .join(&self.world)
            .with_context(|| format!("bad world name {:?}", self.world))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).context("bad endpoint path")
    }

    async fn fire_and_forget(&self, url: Url, form: Vec<(&'static str, String)>) {
        let result = self.http.post(url.clone()).form(&form).send().await;
        match result.and_then(|response| response.error_for_status()) {
            Ok(_) => {}
            Err(err) => warn!(%url, %err, "fire-and-forget request failed"),
        }
    }
}

#[async_trait]
impl WorldApi for HttpWorldApi {
    async fn fetch_tiles(&self, bounds: TileRect) -> Result<TileRefresh> {
        let refresh = self
            .http
            .get(self.world_url()?)
            .query(&[
                ("fetch", "1".to_string()),
                ("min_tileY", bounds.min_y.to_string()),
                ("min_tileX", bounds.min_x.to_string()),
                ("max_tileY", bounds.max_y.to_string()),
                ("max_tileX", bounds.max_x.to_string()),
                ("v", PROTOCOL_VERSION.to_string()),
            ])
            .send()
            .await
            .context("fetch request failed")?
            .error_for_status()
            .context("fetch returned an error status")?
            .json::<TileRefresh>()
            .await
            .context("fetch response was not valid tile data")?;
        Ok(refresh)
    }

    async fn push_edits(&self, edits: Vec<Edit>) -> Result<Vec<Edit>, PushError> {
        let form: Vec<(&str, String)> = edits
            .iter()
            .map(|edit| ("edits", edit.to_form_value()))
            .collect();
        let response = self
            .http
            .post(self.world_url().map_err(PushError::Other)?)
            .form(&form)
            .send()
            .await
            .map_err(|err| PushError::Other(err.into()))?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(PushError::PermissionDenied);
        }
        let acks = response
            .error_for_status()
            .map_err(|err| PushError::Other(err.into()))?
            .json::<Vec<Edit>>()
            .await
            .map_err(|err| PushError::Other(err.into()))?;
        Ok(acks)
    }

    async fn protect_tile(&self, tile: TileCoord) {
        let Ok(url) = self.endpoint("ajax/protect/") else {
            return;
        };
        self.fire_and_forget(
            url,
            vec![
                ("namespace", self.world.clone()),
                ("tileY", tile.y.to_string()),
                ("tileX", tile.x.to_string()),
            ],
        )
        .await;
    }

    async fn unprotect_tile(&self, tile: TileCoord) {
        let Ok(url) = self.endpoint("ajax/unprotect/") else {
            return;
        };
        self.fire_and_forget(
            url,
            vec![
                ("namespace", self.world.clone()),
                ("tileY", tile.y.to_string()),
                ("tileX", tile.x.to_string()),
            ],
        )
        .await;
    }

    async fn create_link(&self, at: AbsoluteCell, target: LinkTarget) {
        let mut form = vec![
            ("namespace", self.world.clone()),
            ("tileY", at.tile.y.to_string()),
            ("tileX", at.tile.x.to_string()),
            ("charY", at.cell.y.to_string()),
            ("charX", at.cell.x.to_string()),
        ];
        let path = match target {
            LinkTarget::Coord { tile_y, tile_x } => {
                form.push(("link_tileY", tile_y.to_string()));
                form.push(("link_tileX", tile_x.to_string()));
                "ajax/coordlink/"
            }
            LinkTarget::Url { url } => {
                form.push(("url", url));
                "ajax/urllink/"
            }
        };
        let Ok(url) = self.endpoint(path) else {
            return;
        };
        self.fire_and_forget(url, form).await;
    }
}
