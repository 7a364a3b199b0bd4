//! Basemap reuse across frames.
//!
//! A [`MapSession`] is either empty or holds one loaded basemap plus the crop
//! rectangle currently displayed. Each frame requests a bounding box; the
//! session decides with [`evaluate`] whether the loaded tiles can be reused or
//! a new basemap must be fetched from the [`TileSource`].

use std::thread;
use std::time::Duration;

use image::RgbImage;
use log::debug;

use crate::mercator::{PixelRect, TileGrid};
use crate::region::BoundingBox;
use crate::StatusOr;

/// A new crop smaller than this fraction of the current one triggers a fetch
pub const SHRINK_RATIO: f64 = 0.975;

/// Stitched tiles and the projection into their pixels
#[derive(Clone, Debug)]
pub struct Basemap {
    pub image: RgbImage,
    pub grid: TileGrid,
}

impl Basemap {
    /// Basemap extent in pixels
    pub fn extent(&self) -> (f64, f64) {
        (self.image.width() as f64, self.image.height() as f64)
    }

    pub fn to_pixels(&self, lat: f64, lon: f64) -> (f64, f64) {
        self.grid.to_pixels(lat, lon)
    }
}

/// What the session asks a tile backend for
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileRequest {
    pub bbox: BoundingBox,
    pub zoom: u8,
    pub max_tiles: u32,
}

/// Capability to download a basemap for a bounding box
pub trait TileSource {
    fn fetch(&mut self, request: &TileRequest) -> StatusOr<Basemap>;
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Zoom the tile backend starts from before fitting the tile budget
    pub zoom: u8,
    pub max_tiles: u32,
    /// Pause owed to the tile server after every fetch
    pub settle_delay: Duration,
    /// Skip the shrinking-area refetch, for requests that only move around
    pub constant_area: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            zoom: 16,
            max_tiles: 16,
            settle_delay: Duration::from_millis(500),
            constant_area: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchReason {
    Empty,
    OutsideExtent,
    AreaShrank,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Fetch(FetchReason),
    Reuse,
}

/// Decides how a loaded session serves `requested`.
///
/// `extent` is the loaded basemap size in pixels, `current` the crop shown for
/// the previous request and `requested` the new box projected with the loaded
/// basemap's projection.
pub fn evaluate(
    extent: (f64, f64),
    current: &PixelRect,
    requested: &PixelRect,
    constant_area: bool,
) -> Decision {
    let (width, height) = extent;
    if requested.x_min <= 0.0
        || requested.y_min <= 0.0
        || requested.x_max >= width
        || requested.y_max >= height
    {
        return Decision::Fetch(FetchReason::OutsideExtent);
    }

    // Numerical noise on constant-size requests would cause needless downloads
    if !constant_area && requested.area() < current.area() * SHRINK_RATIO {
        return Decision::Fetch(FetchReason::AreaShrank);
    }

    Decision::Reuse
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub maps_fetched: u32,
    pub tiles_fetched: u32,
}

/// Basemap and crop to draw the current frame on
pub struct MapView<'a> {
    pub basemap: &'a Basemap,
    pub crop: PixelRect,
}

struct LoadedMap {
    basemap: Basemap,
    crop: PixelRect,
}

enum SessionState {
    Empty,
    Loaded(LoadedMap),
}

pub struct MapSession {
    config: SessionConfig,
    state: SessionState,
    stats: SessionStats,
}

impl MapSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Empty,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SessionState::Loaded(_))
    }

    /// Drops the loaded basemap so the next request fetches
    pub fn force_reset(&mut self) {
        self.state = SessionState::Empty;
    }

    /// Makes `bbox` the displayed region, fetching a basemap if needed
    pub fn request(&mut self, bbox: &BoundingBox, source: &mut dyn TileSource) -> StatusOr<Decision> {
        let decision = match &mut self.state {
            SessionState::Empty => Decision::Fetch(FetchReason::Empty),
            SessionState::Loaded(map) => {
                let requested = map.basemap.grid.project_box(bbox);
                let decision = evaluate(
                    map.basemap.extent(),
                    &map.crop,
                    &requested,
                    self.config.constant_area,
                );
                if decision == Decision::Reuse {
                    map.crop = requested;
                    return Ok(decision);
                }
                decision
            }
        };

        debug!("Fetching basemap: {:?}", decision);
        self.fetch(bbox, source)?;
        Ok(decision)
    }

    /// The loaded basemap with the crop of the last request
    pub fn view(&self) -> Option<MapView<'_>> {
        match &self.state {
            SessionState::Loaded(map) => Some(MapView {
                basemap: &map.basemap,
                crop: map.crop,
            }),
            SessionState::Empty => None,
        }
    }

    fn fetch(&mut self, bbox: &BoundingBox, source: &mut dyn TileSource) -> StatusOr<()> {
        let request = TileRequest {
            bbox: *bbox,
            zoom: self.config.zoom,
            max_tiles: self.config.max_tiles,
        };
        let basemap = source.fetch(&request)?;

        self.stats.maps_fetched += 1;
        self.stats.tiles_fetched += basemap.grid.tile_count();

        let crop = basemap.grid.project_box(bbox);
        self.state = SessionState::Loaded(LoadedMap { basemap, crop });

        // Usage policy of public tile servers
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Tile source producing blank basemaps, counting requests
    #[derive(Default)]
    pub(crate) struct BlankTiles {
        pub requests: Vec<TileRequest>,
    }

    impl TileSource for BlankTiles {
        fn fetch(&mut self, request: &TileRequest) -> StatusOr<Basemap> {
            self.requests.push(*request);
            let grid = TileGrid::fit(&request.bbox, request.zoom, request.max_tiles);
            Ok(Basemap {
                image: RgbImage::from_pixel(grid.width_px(), grid.height_px(), image::Rgb([230, 230, 230])),
                grid,
            })
        }
    }

    pub(crate) fn quick_config(constant_area: bool) -> SessionConfig {
        SessionConfig {
            settle_delay: Duration::ZERO,
            constant_area,
            ..SessionConfig::default()
        }
    }
}
