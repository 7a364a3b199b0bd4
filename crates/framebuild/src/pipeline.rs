//! Per-photo frame loop shared by every preset, and the map presets.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

use log::info;

use crate::canvas::{MapFrame, DARK_RED, PHOTO_BLUE, RED};
use crate::region::{pad_point, precise_region, square_region, BoundingBox};
use crate::series::{LocationSample, PhotoRecord, TimeSeries};
use crate::session::{MapSession, SessionConfig, SessionStats, TileSource};
use crate::{FrameError, StatusOr};

/// Size in pixels of map frames
pub const MAP_FRAME_SIZE: (u32, u32) = (900, 900);

/// Width of the drawn tracks in pixels
const TRACK_WIDTH: f32 = 3.0;
const MARKER_EDGE: f32 = 1.5;

/// Name of the manifest mapping frame numbers to photo files
pub const SYNC_FILE: &str = "syncfile.txt";

/// Photos to render. `end` defaults to the last photo; `resume` skips that many
/// frames of `[start, end)` without rendering them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunRange {
    pub start: usize,
    pub end: Option<usize>,
    pub resume: usize,
}

impl RunRange {
    /// Checks the range against `total` photos
    pub fn resolve(&self, total: usize) -> StatusOr<FrameRange> {
        let end = self.end.unwrap_or(total);
        if end > total {
            return Err(FrameError::InvalidRange(format!(
                "end {} is past the {} available photos",
                end, total
            )));
        }
        if self.start >= end {
            return Err(FrameError::InvalidRange(format!(
                "start {} must be before end {}",
                self.start, end
            )));
        }
        Ok(FrameRange {
            start: self.start,
            end,
            resume_at: (self.start + self.resume).min(end),
        })
    }
}

/// A validated [`RunRange`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
    pub resume_at: usize,
}

impl FrameRange {
    /// Number of frames of the whole animation, resumed or not
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Photo indices still to render
    pub fn pending(&self) -> Range<usize> {
        self.resume_at..self.end
    }

    /// 1-based frame number of photo `i`
    pub fn position(&self, i: usize) -> usize {
        i - self.start + 1
    }
}

/// Creates `folder` and writes its sync file for every frame of `range`
pub fn prepare_output(
    folder: &Path,
    photos: &TimeSeries<PhotoRecord>,
    range: &FrameRange,
) -> StatusOr<()> {
    fs::create_dir_all(folder)?;

    let mut out = BufWriter::new(File::create(folder.join(SYNC_FILE))?);
    for (offset, photo) in photos.slice(range.start, range.end - 1).iter().enumerate() {
        writeln!(out, "{}/{}, {}", offset + 1, range.len(), photo.filename)?;
    }
    out.flush()?;
    Ok(())
}

/// Timing of a run, reported after every frame
pub struct Progress {
    started: Instant,
    total: usize,
    /// Frames rendered by an earlier run
    skipped: usize,
}

impl Progress {
    pub fn new(range: &FrameRange) -> Self {
        Self {
            started: Instant::now(),
            total: range.len(),
            skipped: range.resume_at - range.start,
        }
    }

    /// Minutes left after frame `position`, from the pace of this run only
    pub fn estimate_minutes(&self, position: usize, elapsed_secs: f64) -> f64 {
        let remaining = self.total.saturating_sub(position) as f64;
        let rendered = position.saturating_sub(self.skipped).max(1) as f64;
        remaining * elapsed_secs / rendered / 60.0
    }

    pub fn report(&self, position: usize, iteration_started: Instant, filename: &str) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let iteration = iteration_started.elapsed().as_secs_f64();
        let estimated_mins = self.estimate_minutes(position, elapsed);
        info!(
            "{}/{} ({}). Elapsed time {:.2}s, Iteration time {:.2}s, estimated {:.2}m remaining",
            position, self.total, filename, elapsed, iteration, estimated_mins
        );
    }
}

/// Map animations, each with its own region policy and tile budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapPreset {
    /// Fixed region covering every location of the run
    RegionAllData,
    /// Constant-size region following the current location
    CenteredOnLocation,
    /// Region growing with the locations of the current day
    RegionExpandingByDay,
    /// Square region over the locations of the last `n` photos
    RegionExpandingByLastN { n: usize },
}

impl MapPreset {
    /// Output folder relative to the project directory
    pub fn folder(&self) -> &'static str {
        match self {
            MapPreset::RegionAllData => "region",
            MapPreset::CenteredOnLocation => "centered",
            MapPreset::RegionExpandingByDay => "region_expanding_day",
            MapPreset::RegionExpandingByLastN { .. } => "region_expanding_last",
        }
    }

    /// Degrees added around the raw region
    pub fn margin(&self) -> f64 {
        match self {
            MapPreset::RegionAllData => 0.1,
            MapPreset::CenteredOnLocation | MapPreset::RegionExpandingByDay => 0.01,
            MapPreset::RegionExpandingByLastN { .. } => 0.005,
        }
    }

    pub fn max_tiles(&self) -> u32 {
        match self {
            MapPreset::RegionAllData => 32,
            MapPreset::CenteredOnLocation => 17,
            _ => 16,
        }
    }

    pub fn session_config(&self, settle_delay: Duration) -> SessionConfig {
        SessionConfig {
            max_tiles: self.max_tiles(),
            settle_delay,
            constant_area: *self == MapPreset::CenteredOnLocation,
            ..SessionConfig::default()
        }
    }

    /// Marker size and outline width of the current location
    fn location_marker(&self) -> (f32, f32) {
        match self {
            MapPreset::RegionAllData => (150.0, 2.0 * MARKER_EDGE),
            MapPreset::RegionExpandingByLastN { .. } => (100.0, MARKER_EDGE),
            _ => (90.0, MARKER_EDGE),
        }
    }

    fn photo_marker_size(&self) -> f32 {
        match self {
            MapPreset::RegionAllData => 50.0,
            _ => 120.0,
        }
    }
}

/// Location indices aligned with one photo
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Alignment {
    /// Location closest to the first photo of the run
    first: usize,
    /// Last location at or before the local midnight of the photo's day
    day_start: usize,
    /// Location closest to the photo
    now: usize,
}

/// Renders map frames of a photo series over its location series
pub struct MapAnimator<'a> {
    photos: &'a TimeSeries<PhotoRecord>,
    locations: &'a TimeSeries<LocationSample>,
    frame_size: (u32, u32),
    settle_delay: Duration,
}

impl<'a> MapAnimator<'a> {
    pub fn new(
        photos: &'a TimeSeries<PhotoRecord>,
        locations: &'a TimeSeries<LocationSample>,
    ) -> StatusOr<Self> {
        if photos.is_empty() {
            return Err(FrameError::EmptySeries("photo"));
        }
        if locations.is_empty() {
            return Err(FrameError::EmptySeries("location"));
        }
        Ok(Self {
            photos,
            locations,
            frame_size: MAP_FRAME_SIZE,
            settle_delay: SessionConfig::default().settle_delay,
        })
    }

    /// Pause after every basemap fetch
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Writes `{frame}.png` for every pending photo of `range` into `folder`.
    /// Each call owns a fresh session; its statistics are returned.
    pub fn render(
        &self,
        preset: MapPreset,
        range: &RunRange,
        folder: &Path,
        source: &mut dyn TileSource,
    ) -> StatusOr<SessionStats> {
        let range = range.resolve(self.photos.len())?;
        prepare_output(folder, self.photos, &range)?;
        info!(
            "Rendering {:?} frames {}..{} into {}",
            preset,
            range.resume_at,
            range.end,
            folder.display()
        );

        let mut session = MapSession::new(preset.session_config(self.settle_delay));
        let first = self.locations.closest_index(self.photo(range.start)?.utc);

        let progress = Progress::new(&range);
        let mut cursor = first;
        for i in range.pending() {
            let iteration_started = Instant::now();
            let photo = self.photo(i)?;
            let position = range.position(i);

            let aligned = self.align(i, first, cursor)?;
            cursor = aligned.now;

            let region = self.region(preset, i, &range, &aligned)?;
            session.request(&region, source)?;
            let view = session
                .view()
                .ok_or_else(|| FrameError::TileError("session holds no basemap".to_string()))?;

            let mut frame = MapFrame::new(&view, self.frame_size);
            self.draw(&mut frame, preset, i, &range, &aligned)?;
            frame.save(folder.join(format!("{}.png", position)))?;

            progress.report(position, iteration_started, &photo.filename);
            let stats = session.stats();
            info!("Downloaded {} tiles in {} maps", stats.tiles_fetched, stats.maps_fetched);
        }

        Ok(session.stats())
    }

    fn photo(&self, i: usize) -> StatusOr<&PhotoRecord> {
        self.photos
            .get(i)
            .ok_or_else(|| FrameError::InvalidRange(format!("no photo at index {}", i)))
    }

    /// Aligns photo `i` with the locations, searching forward from `cursor`
    fn align(&self, i: usize, first: usize, cursor: usize) -> StatusOr<Alignment> {
        let photo = self.photo(i)?;
        let now = self.locations.closest_index_from(photo.utc, cursor);
        Ok(Alignment {
            first,
            day_start: self.locations.previous_index(photo.local_day_start_utc(), now, first),
            now,
        })
    }

    fn location(&self, idx: usize) -> StatusOr<&LocationSample> {
        self.locations
            .get(idx)
            .ok_or(FrameError::EmptySeries("location"))
    }

    fn bounds(&self, from: usize, to: usize) -> StatusOr<BoundingBox> {
        self.locations
            .bounds(from, to)
            .ok_or(FrameError::EmptySeries("location"))
    }

    /// Locations between the first and the last photo of the run
    fn whole_run_region(&self, range: &FrameRange, margin: f64) -> StatusOr<BoundingBox> {
        let first = self.locations.closest_index(self.photo(range.start)?.utc);
        let last = self.locations.closest_index(self.photo(range.end - 1)?.utc);
        Ok(precise_region(&self.bounds(first, last)?, margin))
    }

    fn region(
        &self,
        preset: MapPreset,
        i: usize,
        range: &FrameRange,
        aligned: &Alignment,
    ) -> StatusOr<BoundingBox> {
        let margin = preset.margin();
        let position = range.position(i);
        let region = match preset {
            MapPreset::CenteredOnLocation => {
                let here = self.location(aligned.now)?;
                pad_point(here.lat, here.lng, margin)
            }
            MapPreset::RegionExpandingByDay => {
                if aligned.day_start == aligned.now {
                    let here = self.location(aligned.now)?;
                    pad_point(here.lat, here.lng, margin)
                } else {
                    precise_region(&self.bounds(aligned.day_start, aligned.now)?, margin)
                }
            }
            MapPreset::RegionExpandingByLastN { n } => {
                let n = n.max(2);
                let raw = if position == 1 {
                    let origin = self.location(aligned.first)?;
                    BoundingBox {
                        lat_min: origin.lat,
                        lat_max: origin.lat,
                        lon_min: origin.lng,
                        lon_max: origin.lng,
                    }
                    .padded(margin)
                } else if position <= n {
                    self.bounds(aligned.first, aligned.now)?
                } else {
                    let oldest = self.locations.closest_index(self.photo(i - n)?.utc);
                    self.bounds(oldest, aligned.now)?
                };
                square_region(&raw, margin)
            }
            MapPreset::RegionAllData => self.whole_run_region(range, margin)?,
        };
        Ok(region)
    }

    fn draw(
        &self,
        frame: &mut MapFrame,
        preset: MapPreset,
        i: usize,
        range: &FrameRange,
        aligned: &Alignment,
    ) -> StatusOr<()> {
        let track = |from: usize, to: usize| -> Vec<(f64, f64)> {
            self.locations
                .slice(from, to)
                .iter()
                .map(|s| (s.lat, s.lng))
                .collect()
        };
        frame.track(&track(aligned.first, aligned.day_start), DARK_RED, TRACK_WIDTH);
        frame.track(&track(aligned.day_start, aligned.now), RED, TRACK_WIDTH);

        let here = self.location(aligned.now)?;
        let (size, edge) = preset.location_marker();
        frame.marker(here.lat, here.lng, size, RED, edge);

        for (idx, size) in photo_markers(preset, i, range) {
            if let Some((lat, lon)) = self.photo(idx)?.coordinates {
                frame.marker(lat, lon, size, PHOTO_BLUE, MARKER_EDGE);
            }
        }
        Ok(())
    }
}

/// Photos marked on the frame of photo `i` with their marker sizes. The last-N
/// preset walks back to `range.start`, shrinking each older marker by 1.5.
fn photo_markers(preset: MapPreset, i: usize, range: &FrameRange) -> Vec<(usize, f32)> {
    match preset {
        MapPreset::RegionExpandingByLastN { n } => {
            let mut markers = Vec::new();
            let mut size = 180.0;
            for back in 0..n.max(2) {
                size /= 1.5;
                if i < range.start + back {
                    break;
                }
                markers.push((i - back, size));
            }
            markers
        }
        _ => vec![(i, preset.photo_marker_size())],
    }
}

#[cfg(test)]
pub(crate) mod testdata {
    use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

    use crate::series::{LocationSample, PhotoRecord, TimeSeries};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 7, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    /// Photos at 10:00, 10:30 and 11:00 local time, UTC+1, the last without GPS
    pub(crate) fn photos() -> TimeSeries<PhotoRecord> {
        let fixes = [Some((40.4168, -3.7038)), Some((40.4170, -3.7035)), None];
        TimeSeries::new(
            [(10, 0), (10, 30), (11, 0)]
                .iter()
                .zip(fixes)
                .enumerate()
                .map(|(index, (&(h, m), coordinates))| PhotoRecord {
                    index,
                    filename: format!("IMG_{:03}.jpg", index),
                    local: at(h, m),
                    utc: Utc.from_utc_datetime(&(at(h, m) - Duration::hours(1))),
                    coordinates,
                })
                .collect(),
        )
    }

    /// Five samples around the photos, drifting a few metres
    pub(crate) fn locations() -> TimeSeries<LocationSample> {
        TimeSeries::new(
            [(8, 55), (9, 10), (9, 29), (9, 45), (10, 5)]
                .iter()
                .enumerate()
                .map(|(k, &(h, m))| LocationSample {
                    instant: Utc.from_utc_datetime(&at(h, m)),
                    lat: 40.4168 + k as f64 * 0.0001,
                    lng: -3.7038 + k as f64 * 0.0001,
                    accuracy: 10,
                })
                .collect(),
        )
    }
}
