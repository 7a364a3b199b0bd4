use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut, text_size};
use rusttype::{Font, Scale};

use crate::mercator::{PixelRect, TileGrid};
use crate::session::MapView;
use crate::{FrameError, StatusOr};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
/// Track drawn for the days before the current photo
pub const DARK_RED: Rgb<u8> = Rgb([0x9a, 0x02, 0x00]);
/// Markers of the photos' own GPS fixes
pub const PHOTO_BLUE: Rgb<u8> = Rgb([0x03, 0x71, 0x9c]);
pub const AXIS_BLUE: Rgb<u8> = Rgb([0x04, 0x85, 0xd1]);

/// Radius in pixels of a marker of `size` square points at 100 dpi
pub fn marker_radius(size: f32) -> f32 {
    size.max(0.0).sqrt() * 100.0 / 72.0 / 2.0
}

fn stamp(image: &mut RgbImage, (x, y): (f32, f32), radius: i32, color: Rgb<u8>) {
    draw_filled_circle_mut(image, (x.round() as i32, y.round() as i32), radius, color);
}

/// Strokes the path through `points` with discs of diameter `width`, so every
/// joint and both ends come out round
fn stroke_path(image: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>, width: f32) {
    let Some(&first) = points.first() else {
        return;
    };
    if width <= 1.0 {
        for pair in points.windows(2) {
            draw_line_segment_mut(image, pair[0], pair[1], color);
        }
        return;
    }

    let radius = (width / 2.0).round().max(1.0) as i32;
    let spacing = (radius as f32 / 2.0).max(0.5);
    stamp(image, first, radius, color);
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        let length = (x1 - x0).hypot(y1 - y0);
        let steps = (length / spacing).ceil() as u32;
        for k in 1..=steps {
            let t = k as f32 / steps as f32;
            stamp(image, (x0 + t * (x1 - x0), y0 + t * (y1 - y0)), radius, color);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Parses the embedded typeface used for every label
pub fn load_font() -> StatusOr<Font<'static>> {
    Font::try_from_bytes(FONT_BYTES)
        .ok_or_else(|| FrameError::FontError("embedded DejaVu Sans".to_string()))
}

/// Width in pixels of `text` laid out at `height` pixels
pub fn text_width(font: &Font<'_>, text: &str, height: f32) -> f32 {
    text_size(Scale::uniform(height), font, text).0.max(0) as f32
}

/// RGB raster with the drawing primitives frames are made of
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, background),
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn line(&mut self, start: (f32, f32), end: (f32, f32), color: Rgb<u8>, width: f32) {
        stroke_path(&mut self.image, &[start, end], color, width);
    }

    pub fn polyline(&mut self, points: &[(f32, f32)], color: Rgb<u8>, width: f32) {
        stroke_path(&mut self.image, points, color, width);
    }

    /// Filled circle of `size` square points with an optional outline
    pub fn marker(&mut self, center: (f32, f32), size: f32, fill: Rgb<u8>, edge: Option<(Rgb<u8>, f32)>) {
        let radius = marker_radius(size);
        let (x, y) = (center.0.round() as i32, center.1.round() as i32);
        if let Some((edge_color, edge_width)) = edge {
            let outer = (radius + edge_width).round() as i32;
            draw_filled_circle_mut(&mut self.image, (x, y), outer.max(1), edge_color);
        }
        draw_filled_circle_mut(&mut self.image, (x, y), (radius.round() as i32).max(1), fill);
    }

    /// Vertical bar centered on `center`
    pub fn tick(&mut self, center: (f32, f32), length: f32, color: Rgb<u8>, width: f32) {
        let half = length / 2.0;
        self.line(
            (center.0, center.1 - half),
            (center.0, center.1 + half),
            color,
            width,
        );
    }

    /// Text with its baseline at `anchor.1`, aligned horizontally on `anchor.0`
    pub fn text(
        &mut self,
        font: &Font<'_>,
        anchor: (f32, f32),
        height: f32,
        text: &str,
        color: Rgb<u8>,
        align: Align,
    ) {
        let scale = Scale::uniform(height);
        let width = text_width(font, text, height);
        let left = match align {
            Align::Left => anchor.0,
            Align::Center => anchor.0 - width / 2.0,
            Align::Right => anchor.0 - width,
        };
        let top = anchor.1 - font.v_metrics(scale).ascent;
        draw_text_mut(&mut self.image, color, left.round() as i32, top.round() as i32, scale, font, text);
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> StatusOr<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Canvas showing the cropped basemap, with lat/lng drawing helpers
pub struct MapFrame {
    canvas: Canvas,
    grid: TileGrid,
    origin: (f64, f64),
    scale: f64,
    offset: (f64, f64),
}

impl MapFrame {
    /// Crops the view's basemap to its crop rectangle and fits it into a canvas
    /// of `size`, keeping the aspect ratio
    pub fn new(view: &MapView<'_>, size: (u32, u32)) -> Self {
        let image = &view.basemap.image;
        let (x, y, w, h) = clamp_crop(&view.crop, image.width(), image.height());
        let cropped = imageops::crop_imm(image, x, y, w, h).to_image();

        let scale = (size.0 as f64 / w as f64).min(size.1 as f64 / h as f64);
        let scaled_w = ((w as f64 * scale).round() as u32).clamp(1, size.0);
        let scaled_h = ((h as f64 * scale).round() as u32).clamp(1, size.1);
        let resized = imageops::resize(&cropped, scaled_w, scaled_h, FilterType::Triangle);

        let offset = (
            ((size.0 - scaled_w) / 2) as f64,
            ((size.1 - scaled_h) / 2) as f64,
        );
        let mut canvas = RgbImage::from_pixel(size.0, size.1, WHITE);
        imageops::overlay(&mut canvas, &resized, offset.0 as i64, offset.1 as i64);

        Self {
            canvas: Canvas::from_image(canvas),
            grid: view.basemap.grid,
            origin: (x as f64, y as f64),
            scale,
            offset,
        }
    }

    /// Canvas position of a lat/lng point
    pub fn project(&self, lat: f64, lon: f64) -> (f32, f32) {
        let (px, py) = self.grid.to_pixels(lat, lon);
        (
            ((px - self.origin.0) * self.scale + self.offset.0) as f32,
            ((py - self.origin.1) * self.scale + self.offset.1) as f32,
        )
    }

    pub fn track(&mut self, points: &[(f64, f64)], color: Rgb<u8>, width: f32) {
        let projected: Vec<(f32, f32)> = points
            .iter()
            .map(|&(lat, lon)| self.project(lat, lon))
            .collect();
        self.canvas.polyline(&projected, color, width);
    }

    pub fn marker(&mut self, lat: f64, lon: f64, size: f32, fill: Rgb<u8>, edge_width: f32) {
        let center = self.project(lat, lon);
        self.canvas.marker(center, size, fill, Some((BLACK, edge_width)));
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> StatusOr<()> {
        self.canvas.save(path)
    }
}

/// Integer crop inside the image, at least one pixel wide and tall
fn clamp_crop(crop: &PixelRect, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x0 = crop.x_min.floor().clamp(0.0, (width - 1) as f64) as u32;
    let y0 = crop.y_min.floor().clamp(0.0, (height - 1) as f64) as u32;
    let x1 = crop.x_max.ceil().clamp((x0 + 1) as f64, width as f64) as u32;
    let y1 = crop.y_max.ceil().clamp((y0 + 1) as f64, height as f64) as u32;
    (x0, y0, x1 - x0, y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Basemap;

    fn count(canvas: &Canvas, color: Rgb<u8>) -> usize {
        canvas.image().pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn polyline_and_marker_paint_pixels() {
        let mut canvas = Canvas::new(100, 100, WHITE);
        canvas.polyline(&[(10.0, 10.0), (90.0, 10.0), (90.0, 90.0)], RED, 3.0);
        assert!(count(&canvas, RED) > 150);

        canvas.marker((50.0, 50.0), 90.0, PHOTO_BLUE, Some((BLACK, 1.0)));
        assert_eq!(*canvas.image().get_pixel(50, 50), PHOTO_BLUE);
        assert!(count(&canvas, BLACK) > 0);
    }

    #[test]
    fn polyline_joints_are_round() {
        let mut canvas = Canvas::new(60, 60, BLACK);
        canvas.polyline(&[(10.0, 30.0), (30.0, 30.0), (30.0, 10.0)], RED, 8.0);
        // Corner outside the joint stays clear, its diagonal neighbour is covered
        assert_eq!(*canvas.image().get_pixel(34, 34), BLACK);
        assert_eq!(*canvas.image().get_pixel(32, 32), RED);
        // Round cap past the first point
        assert_eq!(*canvas.image().get_pixel(7, 30), RED);
        assert_eq!(*canvas.image().get_pixel(10, 30 + 5), BLACK);

        let mut dot = Canvas::new(20, 20, BLACK);
        dot.polyline(&[(10.0, 10.0)], RED, 6.0);
        assert_eq!(*dot.image().get_pixel(10, 10), RED);
    }

    #[test]
    fn longer_labels_cover_more_pixels() {
        let font = load_font().unwrap();
        let mut one = Canvas::new(120, 60, BLACK);
        one.text(&font, (10.0, 50.0), 40.0, "1", WHITE, Align::Left);
        let mut eight = Canvas::new(120, 60, BLACK);
        eight.text(&font, (10.0, 50.0), 40.0, "88", WHITE, Align::Left);
        assert!(count(&one, WHITE) > 0);
        assert!(count(&eight, WHITE) > count(&one, WHITE));
    }

    #[test]
    fn right_aligned_text_ends_at_anchor() {
        let font = load_font().unwrap();
        let mut canvas = Canvas::new(200, 60, BLACK);
        canvas.text(&font, (150.0, 50.0), 30.0, "1234", WHITE, Align::Right);
        let lit: Vec<(u32, u32)> = canvas
            .image()
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != BLACK)
            .map(|(x, y, _)| (x, y))
            .collect();
        let rightmost = lit.iter().map(|&(x, _)| x).max().unwrap();
        let lowest = lit.iter().map(|&(_, y)| y).max().unwrap();
        assert!((145..=151).contains(&rightmost));
        // Digits sit on the baseline
        assert!((48..=51).contains(&lowest));

        let narrow = text_width(&font, "1", 30.0);
        assert!(narrow > 0.0);
        assert!(text_width(&font, "1111", 30.0) > narrow * 3.0);
    }

    #[test]
    fn map_frame_projects_crop_onto_canvas() {
        let grid = TileGrid { zoom: 10, x_min: 500, x_max: 501, y_min: 387, y_max: 388 };
        let basemap = Basemap {
            image: RgbImage::from_pixel(grid.width_px(), grid.height_px(), Rgb([200, 200, 200])),
            grid,
        };
        let crop = PixelRect { x_min: 100.0, x_max: 300.0, y_min: 50.0, y_max: 450.0 };
        let view = MapView { basemap: &basemap, crop };
        let mut frame = MapFrame::new(&view, (400, 400));

        // Crop is twice as tall as wide: scale 1, centered horizontally
        let tile = crate::mercator::TILE_SIZE as f64;
        let n = 2f64.powi(10);
        let lon = (500.0 + 100.0 / tile) / n * 360.0 - 180.0;
        let (x, _) = frame.project(40.0, lon);
        assert!((x - 100.0).abs() < 0.5);

        frame.track(&[(40.0, lon), (40.1, lon)], RED, 2.0);
        assert_eq!(*frame.canvas().image().get_pixel(5, 5), WHITE);
        assert!(count(frame.canvas(), RED) > 0);
    }

    #[test]
    fn saved_frame_is_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.png");
        Canvas::new(20, 10, BLACK).save(&path).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (20, 10));
    }
}
