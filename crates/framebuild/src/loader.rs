use std::path::Path;

use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use log::{error, info, warn};
use serde::Deserialize;

use crate::series::{LocationSample, PhotoRecord, TimeSeries};
use crate::{FrameError, StatusOr};

/// Format of every datetime column in the auxiliary CSV files
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Location samples with an accuracy at or above this are dropped
pub const ACCURACY_LIMIT: i64 = 40;

/// One line of `exif.csv`
#[derive(Debug, Deserialize)]
struct ExifRow {
    local_datetime: String,
    has_gps: u8,
    latitude: f64,
    longitude: f64,
    // Repeats `has_gps`
    _has_gps: u8,
    filename: String,
}

/// One line of `location_history.csv`
#[derive(Debug, Deserialize)]
struct LocationRow {
    datetime: String,
    latitude: f64,
    longitude: f64,
    accuracy: i64,
}

fn parse_datetime(value: &str) -> StatusOr<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
        .map_err(|e| FrameError::ParseError(format!("Bad datetime '{}': {}", value, e)))
}

fn csv_reader<P: AsRef<Path>>(path: P) -> StatusOr<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Loads `exif.csv`, converting capture times to UTC with a fixed offset of
/// `timezone_hours` and validating their order
pub fn load_photos<P: AsRef<Path>>(
    path: P,
    timezone_hours: i32,
    autofix: bool,
) -> StatusOr<TimeSeries<PhotoRecord>> {
    let offset = Duration::hours(i64::from(timezone_hours));
    let mut photos = Vec::new();

    for (index, row) in csv_reader(&path)?.deserialize::<ExifRow>().enumerate() {
        let row = row?;
        let local = parse_datetime(&row.local_datetime)?;
        photos.push(PhotoRecord {
            index,
            filename: row.filename,
            local,
            utc: Utc.from_utc_datetime(&(local - offset)),
            coordinates: (row.has_gps != 0).then_some((row.latitude, row.longitude)),
        });
    }
    info!("Loaded {} photos from {}", photos.len(), path.as_ref().display());

    check_time_order(&mut photos, autofix)?;
    Ok(TimeSeries::new(photos))
}

/// Fails with every photo that is later than its successor. With `autofix` the
/// offending photo takes its successor's time instead. The scan runs backwards
/// so a run of descending photos collapses onto its last one.
pub fn check_time_order(photos: &mut [PhotoRecord], autofix: bool) -> StatusOr<()> {
    if autofix {
        for i in (1..photos.len()).rev() {
            if photos[i].utc < photos[i - 1].utc {
                warn!(
                    "File: {} Exif time {} moved to {}",
                    photos[i - 1].filename,
                    photos[i - 1].local,
                    photos[i].local
                );
                photos[i - 1].utc = photos[i].utc;
                photos[i - 1].local = photos[i].local;
            }
        }
        return Ok(());
    }

    let mut offending = Vec::new();
    for i in 1..photos.len() {
        if photos[i].utc < photos[i - 1].utc {
            error!(
                "File: {} Exif time {}",
                photos[i - 1].filename,
                photos[i - 1].local
            );
            offending.push(photos[i - 1].filename.clone());
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(FrameError::DataIntegrity {
            filenames: offending,
        })
    }
}

/// Loads `location_history.csv`, keeping samples below [`ACCURACY_LIMIT`]
pub fn load_location_history<P: AsRef<Path>>(path: P) -> StatusOr<TimeSeries<LocationSample>> {
    let mut samples = Vec::new();
    let mut dropped = 0;

    for row in csv_reader(&path)?.deserialize::<LocationRow>() {
        let row = row?;
        if row.accuracy >= ACCURACY_LIMIT {
            dropped += 1;
            continue;
        }
        samples.push(LocationSample {
            instant: Utc.from_utc_datetime(&parse_datetime(&row.datetime)?),
            lat: row.latitude,
            lng: row.longitude,
            accuracy: row.accuracy,
        });
    }
    info!(
        "Loaded {} location samples ({} dropped for accuracy) from {}",
        samples.len(),
        dropped,
        path.as_ref().display()
    );

    Ok(TimeSeries::new(samples))
}

/// Location series made of the photos that carry their own GPS fix
pub fn locations_from_photos(photos: &TimeSeries<PhotoRecord>) -> TimeSeries<LocationSample> {
    TimeSeries::new(
        photos
            .iter()
            .filter_map(|photo| {
                photo.coordinates.map(|(lat, lng)| LocationSample {
                    instant: photo.utc,
                    lat,
                    lng,
                    accuracy: 0,
                })
            })
            .collect(),
    )
}
