use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::region::BoundingBox;

/// A sample that carries a UTC instant
pub trait Timestamped {
    fn instant(&self) -> DateTime<Utc>;
}

/// A sample that carries a geographic position
pub trait Located {
    /// Latitude, longitude in degrees
    fn lat_lng(&self) -> (f64, f64);
}

/// A single location-history sample
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSample {
    pub instant: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: i64,
}

impl Timestamped for LocationSample {
    fn instant(&self) -> DateTime<Utc> {
        self.instant
    }
}

impl Located for LocationSample {
    fn lat_lng(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Metadata of one photo of the sequence
#[derive(Clone, Debug, PartialEq)]
pub struct PhotoRecord {
    pub index: usize,
    pub filename: String,
    /// Capture time as read from the camera clock
    pub local: NaiveDateTime,
    /// Capture time normalized with the project timezone
    pub utc: DateTime<Utc>,
    pub coordinates: Option<(f64, f64)>,
}

impl PhotoRecord {
    pub fn has_gps(&self) -> bool {
        self.coordinates.is_some()
    }

    /// Local midnight of the capture day, expressed in UTC
    pub fn local_day_start_utc(&self) -> DateTime<Utc> {
        let offset = self.local - self.utc.naive_utc();
        let midnight = self.local.date().and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&(midnight - offset))
    }
}

impl Timestamped for PhotoRecord {
    fn instant(&self) -> DateTime<Utc> {
        self.utc
    }
}

/// Index of the sample closest in time to `target`.
///
/// The first sample at or after `target` is compared with its predecessor and
/// the predecessor wins ties. A target past the last sample resolves to the
/// last index, a target before the first sample to 0.
pub fn closest_index<T: Timestamped>(samples: &[T], target: DateTime<Utc>) -> usize {
    closest_index_from(samples, target, 0)
}

/// Same as [`closest_index`] but starts the forward scan at `from`.
///
/// `from` must not be past the first sample at or after `target`. The index
/// returned for an earlier, smaller target always satisfies this, so callers
/// walking a non-decreasing sequence of targets can carry it forward.
pub fn closest_index_from<T: Timestamped>(
    samples: &[T],
    target: DateTime<Utc>,
    from: usize,
) -> usize {
    if samples.len() <= 1 {
        return 0;
    }

    for idx in from.max(1)..samples.len() {
        let instant = samples[idx].instant();
        if instant >= target {
            let after = instant - target;
            let before = target - samples[idx - 1].instant();
            return if before <= after { idx - 1 } else { idx };
        }
    }
    samples.len() - 1
}

/// Walks backwards from `start` to the first index above `floor` whose instant
/// is at or before `target`. Returns `floor` when nothing above it qualifies or
/// when `start <= floor`.
pub fn previous_index<T: Timestamped>(
    samples: &[T],
    target: DateTime<Utc>,
    start: usize,
    floor: usize,
) -> usize {
    if start <= floor {
        return floor;
    }

    let mut idx = start.min(samples.len().saturating_sub(1));
    while idx > floor {
        if samples[idx].instant() <= target {
            return idx;
        }
        idx -= 1;
    }
    floor
}

/// Chronologically ordered samples, immutable once loaded
#[derive(Clone, Debug)]
pub struct TimeSeries<T> {
    samples: Vec<T>,
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self { samples: Vec::new() }
    }
}

impl<T> TimeSeries<T> {
    pub fn new(samples: Vec<T>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.samples.get(idx)
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.samples.iter()
    }

    /// Samples between `from` and `to`, both included. Out of range indices are
    /// clamped and an inverted range is empty.
    pub fn slice(&self, from: usize, to: usize) -> &[T] {
        if self.samples.is_empty() || from > to {
            return &[];
        }
        let end = to.min(self.samples.len() - 1);
        if from > end {
            return &[];
        }
        &self.samples[from..=end]
    }
}

impl<T: Timestamped> TimeSeries<T> {
    pub fn closest_index(&self, target: DateTime<Utc>) -> usize {
        closest_index(&self.samples, target)
    }

    pub fn closest_index_from(&self, target: DateTime<Utc>, from: usize) -> usize {
        closest_index_from(&self.samples, target, from)
    }

    pub fn previous_index(&self, target: DateTime<Utc>, start: usize, floor: usize) -> usize {
        previous_index(&self.samples, target, start, floor)
    }
}

impl<T: Located> TimeSeries<T> {
    /// Raw min/max bounds of the samples between `from` and `to`, both included
    pub fn bounds(&self, from: usize, to: usize) -> Option<BoundingBox> {
        let slice = self.slice(from, to);
        let (first, rest) = slice.split_first()?;
        let (lat, lng) = first.lat_lng();
        let start = BoundingBox {
            lat_min: lat,
            lat_max: lat,
            lon_min: lng,
            lon_max: lng,
        };
        Some(rest.iter().fold(start, |acc, sample| {
            let (lat, lng) = sample.lat_lng();
            BoundingBox {
                lat_min: acc.lat_min.min(lat),
                lat_max: acc.lat_max.max(lat),
                lon_min: acc.lon_min.min(lng),
                lon_max: acc.lon_max.max(lng),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 7, 14, 8, 0, 0).unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        base() + Duration::minutes(minutes)
    }

    fn sample(minutes: i64, lat: f64, lng: f64) -> LocationSample {
        LocationSample {
            instant: at(minutes),
            lat,
            lng,
            accuracy: 10,
        }
    }

    fn series(minutes: &[i64]) -> Vec<LocationSample> {
        minutes
            .iter()
            .enumerate()
            .map(|(i, m)| sample(*m, 40.0 + i as f64 * 0.001, -3.0))
            .collect()
    }

    fn distance(s: &LocationSample, target: DateTime<Utc>) -> i64 {
        (s.instant - target).num_seconds().abs()
    }

    #[test]
    fn closest_picks_nearest_neighbour() {
        let samples = series(&[0, 10, 20, 30]);
        assert_eq!(closest_index(&samples, at(12)), 1);
        assert_eq!(closest_index(&samples, at(18)), 2);
        assert_eq!(closest_index(&samples, at(30)), 3);
        assert_eq!(closest_index(&samples, at(0)), 0);
    }

    #[test]
    fn closest_breaks_ties_towards_predecessor() {
        let samples = series(&[0, 10, 20]);
        assert_eq!(closest_index(&samples, at(5)), 0);
        assert_eq!(closest_index(&samples, at(15)), 1);
    }

    #[test]
    fn closest_outside_the_series_range() {
        let samples = series(&[0, 10, 20]);
        assert_eq!(closest_index(&samples, at(-30)), 0);
        assert_eq!(closest_index(&samples, at(90)), 2);
    }

    #[test]
    fn closest_on_single_sample_series() {
        let samples = series(&[10]);
        for target in [at(-100), at(10), at(1000)] {
            assert_eq!(closest_index(&samples, target), 0);
        }
    }

    #[test]
    fn closest_has_no_strictly_nearer_sample() {
        let samples = series(&[0, 3, 3, 7, 15, 16, 40, 41, 90]);
        for seconds in (0..=90 * 60).step_by(37) {
            let target = base() + Duration::seconds(seconds);
            let k = closest_index(&samples, target);
            let best = distance(&samples[k], target);
            for (j, s) in samples.iter().enumerate() {
                let d = distance(s, target);
                assert!(d >= best, "index {} nearer than {} for {}", j, k, target);
                if d == best {
                    assert!(j >= k || samples[j].instant == samples[k].instant);
                }
            }
        }
    }

    #[test]
    fn carried_cursor_matches_full_scan() {
        let samples = series(&[0, 2, 9, 11, 30, 31, 32, 60]);
        let mut cursor = 0;
        for minutes in [0, 1, 5, 10, 10, 25, 31, 45, 59, 70] {
            let target = at(minutes);
            let carried = closest_index_from(&samples, target, cursor);
            assert_eq!(carried, closest_index(&samples, target));
            cursor = carried;
        }
    }

    #[test]
    fn previous_returns_floor_when_start_not_above_it() {
        let samples = series(&[0, 10, 20, 30]);
        assert_eq!(previous_index(&samples, at(100), 2, 2), 2);
        assert_eq!(previous_index(&samples, at(100), 1, 3), 3);
    }

    #[test]
    fn previous_scans_back_to_target() {
        let samples = series(&[0, 10, 20, 30, 40]);
        assert_eq!(previous_index(&samples, at(25), 4, 0), 2);
        assert_eq!(previous_index(&samples, at(40), 4, 0), 4);
        // Nothing above the floor is early enough
        assert_eq!(previous_index(&samples, at(-5), 4, 1), 1);
    }

    #[test]
    fn previous_stays_within_floor_and_start() {
        let samples = series(&[0, 10, 20, 30, 40, 50]);
        for floor in 0..samples.len() {
            for start in 0..samples.len() {
                for minutes in [-10, 0, 15, 35, 60] {
                    let idx = previous_index(&samples, at(minutes), start, floor);
                    if start <= floor {
                        assert_eq!(idx, floor);
                    } else {
                        assert!(idx >= floor && idx <= start);
                    }
                }
            }
        }
    }

    #[test]
    fn slice_and_bounds_are_inclusive() {
        let ts = TimeSeries::new(vec![
            sample(0, 40.0, -3.0),
            sample(1, 41.0, -4.0),
            sample(2, 39.5, -2.5),
            sample(3, 45.0, 0.0),
        ]);
        assert_eq!(ts.slice(1, 2).len(), 2);
        assert_eq!(ts.slice(2, 10).len(), 2);
        assert!(ts.slice(3, 1).is_empty());

        let bounds = ts.bounds(0, 2).unwrap();
        assert_eq!(bounds.lat_min, 39.5);
        assert_eq!(bounds.lat_max, 41.0);
        assert_eq!(bounds.lon_min, -4.0);
        assert_eq!(bounds.lon_max, -2.5);
        assert!(TimeSeries::<LocationSample>::default().bounds(0, 0).is_none());
    }

    #[test]
    fn default_series_is_empty() {
        let locations: TimeSeries<LocationSample> = TimeSeries::default();
        let photos: TimeSeries<PhotoRecord> = TimeSeries::default();
        assert!(locations.is_empty());
        assert_eq!(photos.len(), 0);
        assert!(locations.get(0).is_none());
    }

    #[test]
    fn local_midnight_in_utc() {
        let local = NaiveDate::from_ymd_opt(2019, 7, 14)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        let photo = PhotoRecord {
            index: 0,
            filename: "a.jpg".to_string(),
            local,
            utc: Utc.from_utc_datetime(&(local - Duration::hours(2))),
            coordinates: None,
        };
        assert_eq!(
            photo.local_day_start_utc(),
            Utc.with_ymd_and_hms(2019, 7, 13, 22, 0, 0).unwrap()
        );
        assert!(!photo.has_gps());
    }
}
