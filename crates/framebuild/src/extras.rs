//! Decorative frames rendered next to the maps: an analog and digital clock, a
//! 24 hour timeline of the day's photos and a frame counter.

use std::f32::consts::{FRAC_PI_2, PI};
use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use log::info;

use rusttype::Font;

use crate::canvas::{load_font, Align, Canvas, AXIS_BLUE, BLACK, RED, WHITE};
use crate::pipeline::{prepare_output, Progress, RunRange};
use crate::series::{PhotoRecord, TimeSeries};
use crate::{FrameError, StatusOr};

pub const CLOCK_SIZE: (u32, u32) = (1500, 500);
pub const TIMELINE_SIZE: (u32, u32) = (800, 150);
pub const FRAME_COUNT_SIZE: (u32, u32) = (1000, 200);

const HOUR_HAND: f32 = 0.5;
const MINUTE_HAND: f32 = 0.85;
const SECONDS_PER_DAY: f32 = 86_400.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtraPreset {
    Clocks,
    Timeline,
    FrameCount,
}

impl ExtraPreset {
    /// Output folder relative to the project directory
    pub fn folder(&self) -> &'static str {
        match self {
            ExtraPreset::Clocks => "extra/clocks",
            ExtraPreset::Timeline => "extra/timeline",
            ExtraPreset::FrameCount => "extra/frame_count",
        }
    }

    /// Writes `{frame}.png` for every pending photo of `range` into `folder`
    pub fn render(
        &self,
        photos: &TimeSeries<PhotoRecord>,
        range: &RunRange,
        folder: &Path,
    ) -> StatusOr<()> {
        let range = range.resolve(photos.len())?;
        prepare_output(folder, photos, &range)?;
        info!("Rendering {:?} frames into {}", self, folder.display());
        let font = load_font()?;

        let progress = Progress::new(&range);
        for i in range.pending() {
            let iteration_started = Instant::now();
            let photo = photos
                .get(i)
                .ok_or_else(|| FrameError::InvalidRange(format!("no photo at index {}", i)))?;
            let position = range.position(i);

            let canvas = match self {
                ExtraPreset::Clocks => draw_clock(&font, &photo.local),
                ExtraPreset::Timeline => {
                    draw_timeline(&font, &same_day_offsets(photos.samples(), i, range.start))
                }
                ExtraPreset::FrameCount => draw_frame_count(&font, position, range.len()),
            };
            canvas.save(folder.join(format!("{}.png", position)))?;

            progress.report(position, iteration_started, &photo.filename);
        }
        Ok(())
    }
}

/// Seconds since local midnight of photo `i` and of the earlier photos of the
/// same local day, newest first. The scan stops at `floor` and photos taken
/// exactly at midnight count as the previous day.
pub fn same_day_offsets(photos: &[PhotoRecord], i: usize, floor: usize) -> Vec<u32> {
    let Some(current) = photos.get(i) else {
        return Vec::new();
    };
    let midnight = current.local.date().and_time(NaiveTime::MIN);

    let mut offsets = Vec::new();
    for photo in photos[floor.min(i)..=i].iter().rev() {
        if photo.local <= midnight {
            break;
        }
        offsets.push((photo.local - midnight).num_seconds() as u32);
    }
    offsets
}

/// Clock frame: unit circle with hour and minute hands, `HH:MM` and `DD/MM`
pub fn draw_clock(font: &Font<'_>, local: &NaiveDateTime) -> Canvas {
    let (width, height) = CLOCK_SIZE;
    let mut canvas = Canvas::new(width, height, BLACK);

    // Data window of x in [-1.3, 5.5], y in [-1.2, 1.2] with equal axes
    let unit = (width as f32 / 6.8).min(height as f32 / 2.4);
    let left = (width as f32 - 6.8 * unit) / 2.0;
    let to_px = |x: f32, y: f32| (left + (x + 1.3) * unit, height as f32 / 2.0 - y * unit);
    let stroke = 11.0;

    let circle: Vec<(f32, f32)> = (0..=100)
        .map(|k| {
            let theta = k as f32 * PI / 50.0;
            to_px(theta.cos(), theta.sin())
        })
        .collect();
    canvas.polyline(&circle, WHITE, stroke);

    let hour_angle = FRAC_PI_2 - local.hour() as f32 * PI / 6.0;
    let minute_angle = FRAC_PI_2 - local.minute() as f32 * PI / 30.0;
    let center = to_px(0.0, 0.0);
    canvas.line(
        center,
        to_px(HOUR_HAND * hour_angle.cos(), HOUR_HAND * hour_angle.sin()),
        WHITE,
        stroke,
    );
    canvas.line(
        center,
        to_px(MINUTE_HAND * minute_angle.cos(), MINUTE_HAND * minute_angle.sin()),
        WHITE,
        stroke,
    );

    let text_height = 0.5 * unit;
    let time = local.format("%H:%M").to_string();
    let date = local.format("%d/%m").to_string();
    canvas.text(font, to_px(1.3, 0.4), text_height, &time, WHITE, Align::Left);
    canvas.text(font, to_px(3.4, 0.4), text_height, &date, WHITE, Align::Left);
    canvas
}

/// Timeline frame: hourly ticks over 24 hours with a tick per photo of the day.
/// The first offset is the current photo and is drawn in red.
pub fn draw_timeline(font: &Font<'_>, offsets: &[u32]) -> Canvas {
    let (width, height) = TIMELINE_SIZE;
    let mut canvas = Canvas::new(width, height, BLACK);

    // One hour of padding on each side, y in [0, 2]
    let to_px = |seconds: f32, y: f32| {
        (
            (seconds + 3600.0) / (SECONDS_PER_DAY + 7200.0) * width as f32,
            height as f32 * (1.0 - y / 2.0),
        )
    };
    let tick = 20.0;

    for hour in 0..=24 {
        let color = if hour % 12 == 0 { WHITE } else { AXIS_BLUE };
        canvas.tick(to_px(hour as f32 * 3600.0, 0.9), tick, color, 2.0);
    }
    for &offset in offsets.iter().skip(1) {
        canvas.tick(to_px(offset as f32, 1.0), tick, WHITE, 2.0);
    }
    if let Some(&current) = offsets.first() {
        canvas.tick(to_px(current as f32, 1.0), tick, RED, 2.0);
    }

    for hour in (0..=24).step_by(3) {
        let (color, size) = if hour % 12 == 0 { (WHITE, 18.0) } else { (AXIS_BLUE, 16.0) };
        let anchor = to_px(hour as f32 * 3600.0, 0.3);
        canvas.text(font, anchor, size, &hour.to_string(), color, Align::Center);
    }
    canvas
}

/// Frame counter showing `current/total`, right aligned
pub fn draw_frame_count(font: &Font<'_>, current: usize, total: usize) -> Canvas {
    let (width, height) = FRAME_COUNT_SIZE;
    let mut canvas = Canvas::new(width, height, BLACK);
    let anchor = (width as f32 * 0.9, height as f32 * 0.8);
    canvas.text(font, anchor, 100.0, &format!("{}/{}", current, total), WHITE, Align::Right);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testdata::photos;
    use crate::pipeline::SYNC_FILE;
    use chrono::{NaiveDate, TimeZone, Utc};
    use image::Rgb;

    fn count(canvas: &Canvas, color: Rgb<u8>) -> usize {
        canvas.image().pixels().filter(|p| **p == color).count()
    }

    fn photo(local: NaiveDateTime) -> PhotoRecord {
        PhotoRecord {
            index: 0,
            filename: String::new(),
            local,
            utc: Utc.from_utc_datetime(&local),
            coordinates: None,
        }
    }

    fn day(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 7, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn same_day_offsets_stop_at_midnight() {
        let series = vec![
            photo(day(13, 23, 0)),
            photo(day(14, 0, 0)),
            photo(day(14, 8, 30)),
            photo(day(14, 9, 0)),
        ];
        assert_eq!(same_day_offsets(&series, 3, 0), vec![9 * 3600, 8 * 3600 + 1800]);
        assert_eq!(same_day_offsets(&series, 3, 3), vec![9 * 3600]);
        assert!(same_day_offsets(&series, 1, 0).is_empty());
        assert!(same_day_offsets(&series, 9, 0).is_empty());
    }

    #[test]
    fn clock_hands_follow_the_time() {
        let font = load_font().unwrap();
        let three = draw_clock(&font, &day(14, 3, 0));
        let noon = draw_clock(&font, &day(14, 12, 0));
        assert_eq!(three.width(), 1500);
        assert_eq!(three.height(), 500);

        // A point on the hour hand at three o'clock, right of the center
        let unit = (1500.0f32 / 6.8).min(500.0 / 2.4);
        let left = (1500.0 - 6.8 * unit) / 2.0;
        let x = (left + (0.3 + 1.3) * unit) as u32;
        assert_eq!(*three.image().get_pixel(x, 250), WHITE);
        assert_eq!(*noon.image().get_pixel(x, 250), BLACK);
    }

    #[test]
    fn timeline_marks_current_photo_in_red() {
        let font = load_font().unwrap();
        let empty = draw_timeline(&font, &[]);
        assert_eq!(count(&empty, RED), 0);
        assert!(count(&empty, AXIS_BLUE) > 0);

        let marked = draw_timeline(&font, &[9 * 3600, 8 * 3600]);
        assert!(count(&marked, RED) > 0);
        assert!(count(&marked, WHITE) > count(&empty, WHITE));
    }

    #[test]
    fn frame_count_is_right_aligned() {
        let canvas = draw_frame_count(&load_font().unwrap(), 12, 345);
        let image = canvas.image();
        let left_half = image
            .enumerate_pixels()
            .filter(|(x, _, p)| *x < 300 && **p == WHITE)
            .count();
        assert_eq!(left_half, 0);
        assert!(count(&canvas, WHITE) > 0);
    }

    #[test]
    fn extra_presets_write_frames() {
        let dir = tempfile::tempdir().unwrap();
        let photos = photos();
        for preset in [ExtraPreset::Clocks, ExtraPreset::Timeline, ExtraPreset::FrameCount] {
            let folder = dir.path().join(preset.folder());
            preset.render(&photos, &RunRange::default(), &folder).unwrap();
            assert!(folder.join("1.png").is_file());
            assert!(folder.join("3.png").is_file());
            assert!(folder.join(SYNC_FILE).is_file());
        }
    }
}
