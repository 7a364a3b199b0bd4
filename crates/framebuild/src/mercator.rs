use std::f64::consts::PI;

use log::info;

use crate::region::BoundingBox;

/// Edge length of a slippy-map tile in pixels
pub const TILE_SIZE: u32 = 256;

/// Fraction of the box span added on each side before choosing tiles
pub const BASEMAP_MARGIN: f64 = 0.05;

/// Converts lat/lng to fractional tile coordinates at `zoom`
pub fn deg_to_tile(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = 2f64.powi(zoom as i32);
    let lat_rad = lat.to_radians();
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Grows a box by `fraction` of its span on each side, never by less than a
/// tenth of a millidegree
pub fn extend_box(bbox: &BoundingBox, fraction: f64) -> BoundingBox {
    let lat_min = bbox.lat_min.min(bbox.lat_max);
    let lat_max = bbox.lat_min.max(bbox.lat_max);
    let lon_min = bbox.lon_min.min(bbox.lon_max);
    let lon_max = bbox.lon_min.max(bbox.lon_max);

    let d_lat = ((lat_max - lat_min) * fraction).max(0.0001);
    let d_lon = ((lon_max - lon_min) * fraction).max(0.0001 / lat_min.to_radians().cos());
    BoundingBox {
        lat_min: lat_min - d_lat,
        lat_max: lat_max + d_lat,
        lon_min: lon_min - d_lon,
        lon_max: lon_max + d_lon,
    }
}

/// Axis-aligned rectangle in basemap pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl PixelRect {
    pub fn width(&self) -> f64 {
        (self.x_max - self.x_min).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y_max - self.y_min).abs()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Block of tiles stitched into one basemap, and the projection into its pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileGrid {
    /// Tiles covering `bbox` at `zoom`, clamped to the world
    pub fn covering(bbox: &BoundingBox, zoom: u8) -> TileGrid {
        let last = (1u32 << zoom) - 1;
        let to_index = |v: f64| -> u32 { v.floor().clamp(0.0, last as f64) as u32 };

        let (x0, y0) = deg_to_tile(bbox.lat_max, bbox.lon_min, zoom);
        let (x1, y1) = deg_to_tile(bbox.lat_min, bbox.lon_max, zoom);
        let (x0, x1) = (to_index(x0), to_index(x1));
        let (y0, y1) = (to_index(y0), to_index(y1));

        TileGrid {
            zoom,
            x_min: x0.min(x1),
            x_max: x0.max(x1),
            y_min: y0.min(y1),
            y_max: y0.max(y1),
        }
    }

    /// Extends `bbox` by [`BASEMAP_MARGIN`] and picks the deepest zoom, starting
    /// at `start_zoom`, whose grid holds fewer than `max_tiles` tiles
    pub fn fit(bbox: &BoundingBox, start_zoom: u8, max_tiles: u32) -> TileGrid {
        let extended = extend_box(bbox, BASEMAP_MARGIN);
        let mut zoom = start_zoom;
        let mut grid = TileGrid::covering(&extended, zoom);
        while zoom > 0 && grid.tile_count() >= max_tiles {
            zoom -= 1;
            grid = TileGrid::covering(&extended, zoom);
        }
        if zoom < start_zoom {
            info!("Lowered zoom from {} to {} to fit {} tiles", start_zoom, zoom, max_tiles);
        }
        grid
    }

    pub fn columns(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    pub fn rows(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    pub fn tile_count(&self) -> u32 {
        self.columns() * self.rows()
    }

    pub fn width_px(&self) -> u32 {
        self.columns() * TILE_SIZE
    }

    pub fn height_px(&self) -> u32 {
        self.rows() * TILE_SIZE
    }

    /// All (x, y) tile indices, row by row
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y_min..=self.y_max).flat_map(move |y| (self.x_min..=self.x_max).map(move |x| (x, y)))
    }

    /// Projects lat/lng into basemap pixels (y grows southwards)
    pub fn to_pixels(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (x, y) = deg_to_tile(lat, lon, self.zoom);
        (
            (x - self.x_min as f64) * TILE_SIZE as f64,
            (y - self.y_min as f64) * TILE_SIZE as f64,
        )
    }

    /// Projects both corners of `bbox` and orders them into a rectangle
    pub fn project_box(&self, bbox: &BoundingBox) -> PixelRect {
        let (x0, y0) = self.to_pixels(bbox.lat_min, bbox.lon_min);
        let (x1, y1) = self.to_pixels(bbox.lat_max, bbox.lon_max);
        PixelRect {
            x_min: x0.min(x1),
            x_max: x0.max(x1),
            y_min: y0.min(y1),
            y_max: y0.max(y1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn madrid() -> BoundingBox {
        BoundingBox {
            lat_min: 40.40,
            lat_max: 40.44,
            lon_min: -3.72,
            lon_max: -3.68,
        }
    }

    #[test]
    fn tile_coordinates_of_known_points() {
        let (x, y) = deg_to_tile(0.0, 0.0, 1);
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);

        let (x, _) = deg_to_tile(0.0, -180.0, 4);
        assert!(x.abs() < 1e-9);
    }

    #[test]
    fn grid_covers_the_box() {
        let grid = TileGrid::covering(&madrid(), 14);
        let rect = grid.project_box(&madrid());
        assert!(rect.x_min >= 0.0 && rect.y_min >= 0.0);
        assert!(rect.x_max <= grid.width_px() as f64);
        assert!(rect.y_max <= grid.height_px() as f64);
        assert_eq!(grid.tiles().count() as u32, grid.tile_count());
    }

    #[test]
    fn fit_lowers_zoom_until_under_budget() {
        let grid = TileGrid::fit(&madrid(), 16, 16);
        assert!(grid.tile_count() < 16);
        assert!(grid.zoom < 16);

        let deeper = TileGrid::covering(&extend_box(&madrid(), BASEMAP_MARGIN), grid.zoom + 1);
        assert!(deeper.tile_count() >= 16);
    }

    #[test]
    fn north_is_up_in_pixels() {
        let grid = TileGrid::covering(&madrid(), 12);
        let (_, y_north) = grid.to_pixels(40.44, -3.7);
        let (_, y_south) = grid.to_pixels(40.40, -3.7);
        assert!(y_north < y_south);
    }

    #[test]
    fn extend_box_has_minimum_margin() {
        let point = BoundingBox {
            lat_min: 10.0,
            lat_max: 10.0,
            lon_min: 20.0,
            lon_max: 20.0,
        };
        let extended = extend_box(&point, BASEMAP_MARGIN);
        assert!((extended.lat_span() - 0.0002).abs() < 1e-12);
        assert!(extended.lon_span() > 0.0002);
    }
}
