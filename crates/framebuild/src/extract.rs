//! Builds the auxiliary CSV files from a photo folder and a location history
//! export.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use exif::{In, Tag, Value};
use log::{info, warn};
use serde::Deserialize;

use crate::loader::DATETIME_FORMAT;
use crate::{FrameError, StatusOr};

/// Coordinates written for photos without a GPS fix
pub const NO_GPS: (f64, f64) = (91.0, 181.0);

/// Location samples this far outside the photo time range are not exported
pub const HISTORY_WINDOW_HOURS: i64 = 1;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture metadata of one photo file
#[derive(Clone, Debug, PartialEq)]
pub struct ExifEntry {
    pub filename: String,
    pub local: NaiveDateTime,
    pub coordinates: Option<(f64, f64)>,
}

/// Capture time used when a photo has no readable `DateTime` tag
pub fn fallback_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Degrees from degree/minute/second parts, negated for southern and western
/// references
pub fn dms_to_degrees(parts: &[f64], reference: u8) -> f64 {
    let value = parts.iter().zip([1.0, 60.0, 3600.0]).map(|(p, d)| p / d).sum::<f64>();
    if reference == b'S' || reference == b'W' {
        -value
    } else {
        value
    }
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<Vec<u8>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(values) => values.first().cloned(),
        _ => None,
    }
}

fn coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let reference = ascii_field(exif, ref_tag)?.first().copied()?;
    let parts: Vec<f64> = match &exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(values) => values.iter().map(|r| r.to_f64()).collect(),
        Value::SRational(values) => values.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };
    if parts.len() < 3 {
        return None;
    }
    Some(dms_to_degrees(&parts[..3], reference))
}

fn capture_time(exif: &exif::Exif) -> Option<NaiveDateTime> {
    let raw = ascii_field(exif, Tag::DateTime)?;
    NaiveDateTime::parse_from_str(String::from_utf8_lossy(&raw).trim(), EXIF_DATETIME_FORMAT).ok()
}

/// Reads one photo. Files without readable metadata get the fallback time and
/// no coordinates.
pub fn read_exif_entry(path: &Path) -> ExifEntry {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let exif = File::open(path)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            exif::Reader::new()
                .read_from_container(&mut BufReader::new(file))
                .map_err(|e| e.to_string())
        });

    match exif {
        Ok(exif) => {
            let lat = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
            let lon = coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);
            ExifEntry {
                filename,
                local: capture_time(&exif).unwrap_or_else(fallback_datetime),
                coordinates: lat.zip(lon),
            }
        }
        Err(e) => {
            warn!("No EXIF data in {}: {}", path.display(), e);
            ExifEntry {
                filename,
                local: fallback_datetime(),
                coordinates: None,
            }
        }
    }
}

/// Reads every file in `pics`, sorted by name
pub fn read_exif_folder(pics: &Path) -> StatusOr<Vec<ExifEntry>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(pics)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let entries: Vec<ExifEntry> = paths.iter().map(|path| read_exif_entry(path)).collect();
    let without_gps = entries.iter().filter(|e| e.coordinates.is_none()).count();
    info!("Read {} photos, {} with no gps data", entries.len(), without_gps);
    Ok(entries)
}

/// Writes `entries` in the `exif.csv` layout
pub fn write_exif_csv(entries: &[ExifEntry], out: &Path) -> StatusOr<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(out)?;
    for entry in entries {
        let has_gps = if entry.coordinates.is_some() { "1" } else { "0" };
        let (lat, lon) = entry.coordinates.unwrap_or(NO_GPS);
        writer.write_record([
            entry.local.format(DATETIME_FORMAT).to_string(),
            has_gps.to_string(),
            format!("{:.8}", lat),
            format!("{:.8}", lon),
            has_gps.to_string(),
            entry.filename.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Extracts capture time and GPS of every photo in `pics` into `out`
pub fn extract_exif_folder(pics: &Path, out: &Path) -> StatusOr<usize> {
    info!("Extracting EXIF data from {}", pics.display());
    let entries = read_exif_folder(pics)?;
    write_exif_csv(&entries, out)?;
    Ok(entries.len())
}

#[derive(Debug, Deserialize)]
struct TakeoutHistory {
    locations: Vec<TakeoutLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutLocation {
    timestamp_ms: String,
    latitude_e7: i64,
    longitude_e7: i64,
    #[serde(default)]
    accuracy: i64,
}

impl TakeoutLocation {
    fn instant(&self) -> StatusOr<DateTime<Utc>> {
        let millis: i64 = self.timestamp_ms.trim().parse().map_err(|e| {
            FrameError::ParseError(format!("Bad timestampMs '{}': {}", self.timestamp_ms, e))
        })?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| FrameError::ParseError(format!("timestampMs out of range: {}", millis)))
    }
}

/// Converts a location history export into `location_history.csv`, keeping
/// samples strictly within an hour of the `[from, to]` photo range
pub fn extract_location_history(
    json: &Path,
    out: &Path,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> StatusOr<usize> {
    let window = Duration::hours(HISTORY_WINDOW_HOURS);
    let (from, to) = (from - window, to + window);
    info!("Extracting location history from {} to {} UTC", from, to);

    let history: TakeoutHistory = serde_json::from_reader(BufReader::new(File::open(json)?))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(out)?;
    let mut kept = 0;
    for location in &history.locations {
        let instant = location.instant()?;
        if instant <= from || instant >= to {
            continue;
        }
        writer.write_record([
            instant.format(DATETIME_FORMAT).to_string(),
            format!("{:.8}", location.latitude_e7 as f64 / 1e7),
            format!("{:.8}", location.longitude_e7 as f64 / 1e7),
            location.accuracy.to_string(),
        ])?;
        kept += 1;
    }
    writer.flush()?;

    info!("Kept {} of {} location samples", kept, history.locations.len());
    Ok(kept)
}
