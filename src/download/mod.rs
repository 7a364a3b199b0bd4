use anyhow::{Context, Result};
use framebuild::mercator::{TileGrid, TILE_SIZE};
use framebuild::session::{Basemap, TileRequest, TileSource};
use framebuild::{FrameError, StatusOr};
use image::{imageops, RgbImage};
use log::{debug, info};
use reqwest::blocking::Client;

use crate::cache::Cache;

/// Slippy-map tile server to download basemaps from
#[derive(Clone, Debug)]
pub struct TileServer {
    /// URL with `{z}`, `{x}` and `{y}` placeholders
    pub url_template: String,
    /// Public tile servers reject requests without an identifying agent
    pub user_agent: String,
}

impl Default for TileServer {
    fn default() -> Self {
        Self {
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            user_agent: format!("photomap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TileServer {
    pub fn tile_url(&self, zoom: u8, x: u32, y: u32) -> String {
        self.url_template
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

/// Tile source that downloads OpenStreetMap tiles through the disk cache
pub struct OsmTileSource {
    cache: Cache,
    client: Client,
    server: TileServer,
}

impl OsmTileSource {
    /// Create a new tile source with the given cache
    pub fn new(cache: Cache, server: TileServer) -> Result<Self> {
        let client = Client::builder()
            .user_agent(server.user_agent.clone())
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            cache,
            client,
            server,
        })
    }

    /// Tile bytes from the cache, downloading them on a miss
    fn tile_bytes(&self, zoom: u8, x: u32, y: u32) -> Result<Vec<u8>> {
        let template = &self.server.url_template;
        if let Some(data) = self.cache.get_cached_tile(template, zoom, x, y) {
            return Ok(data);
        }

        let url = self.server.tile_url(zoom, x, y);
        debug!("Downloading tile {}", url);
        let response = self.client.get(&url)
            .send()
            .context("Failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download {}: HTTP {}", url, response.status());
        }
        let data = response.bytes()
            .context("Failed to read response bytes")?;

        self.cache.save_tile(template, zoom, x, y, &data)
            .context("Failed to save tile to cache")?;
        Ok(data.to_vec())
    }

    /// Stitches every tile of `grid` into one image
    fn stitch(&self, grid: &TileGrid) -> Result<RgbImage> {
        let mut basemap = RgbImage::new(grid.width_px(), grid.height_px());
        for (x, y) in grid.tiles() {
            let data = self.tile_bytes(grid.zoom, x, y)?;
            let tile = image::load_from_memory(&data)
                .with_context(|| format!("Failed to decode tile {}/{}/{}", grid.zoom, x, y))?
                .to_rgb8();
            let left = ((x - grid.x_min) * TILE_SIZE) as i64;
            let top = ((y - grid.y_min) * TILE_SIZE) as i64;
            imageops::replace(&mut basemap, &tile, left, top);
        }
        Ok(basemap)
    }
}

impl TileSource for OsmTileSource {
    fn fetch(&mut self, request: &TileRequest) -> StatusOr<Basemap> {
        let grid = TileGrid::fit(&request.bbox, request.zoom, request.max_tiles);
        info!(
            "Fetching {} tiles at zoom {} ({} x {})",
            grid.tile_count(),
            grid.zoom,
            grid.columns(),
            grid.rows()
        );
        let image = self
            .stitch(&grid)
            .map_err(|e| FrameError::TileError(format!("{:#}", e)))?;
        Ok(Basemap { image, grid })
    }
}
